//! Known composites and reference resolution.

use std::collections::BTreeMap;

use formwork_ids::CompositeId;
use tracing::{debug, warn};

use crate::config::LoadOptions;
use crate::data::{Composite, CompositeRef};
use crate::error::{SchemaError, SchemaResult};

/// Definitions that can be resolved against a [`CompositeRegistry`].
///
/// `load` never modifies its receiver: it returns a copy in which every
/// reference it could follow is resolved. `validate` checks the structural
/// invariants of an already loaded value.
pub trait Loadable: Sized {
    fn load(&self, registry: &CompositeRegistry, options: LoadOptions) -> SchemaResult<Self>;

    fn validate(&self) -> SchemaResult<()>;

    fn load_and_validate(
        &self,
        registry: &CompositeRegistry,
        options: LoadOptions,
    ) -> SchemaResult<Self> {
        let loaded = self.load(registry, options)?;
        loaded.validate()?;
        Ok(loaded)
    }
}

/// An immutable snapshot of the composites a definition may refer to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompositeRegistry {
    composites: BTreeMap<CompositeId, Composite>,
}

impl CompositeRegistry {
    pub fn new(composites: impl IntoIterator<Item = Composite>) -> Self {
        Self {
            composites: composites
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
        }
    }

    pub fn from_slice(composites: &[Composite]) -> Self {
        Self::new(composites.iter().cloned())
    }

    /// A copy of this registry that also knows `composite`.
    pub fn with(&self, composite: Composite) -> Self {
        let mut composites = self.composites.clone();
        composites.insert(composite.id.clone(), composite);
        Self { composites }
    }

    pub fn get(&self, id: &CompositeId) -> Option<&Composite> {
        self.composites.get(id)
    }

    pub fn contains(&self, id: &CompositeId) -> bool {
        self.composites.contains_key(id)
    }

    /// Like [`get`](Self::get), failing with `ReferenceNotFound`.
    pub fn resolve(&self, id: &CompositeId) -> SchemaResult<&Composite> {
        self.get(id).ok_or_else(|| SchemaError::not_found(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Composite> {
        self.composites.values()
    }

    pub fn len(&self) -> usize {
        self.composites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.composites.is_empty()
    }

    /// Load and validate every composite against the others.
    pub fn load_all(&self, options: LoadOptions) -> SchemaResult<Self> {
        let loaded = self
            .iter()
            .map(|c| c.load_and_validate(self, options))
            .collect::<SchemaResult<Vec<_>>>()?;
        debug!(count = loaded.len(), "registry loaded");
        Ok(Self::new(loaded))
    }
}

impl FromIterator<Composite> for CompositeRegistry {
    fn from_iter<I: IntoIterator<Item = Composite>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Resolve a single reference.
///
/// `own` is the id of the composite that holds the reference, if any: a
/// reference to it resolves even when the registry does not contain it yet.
/// The recursion token is returned as-is when `own` is unknown; the caller
/// decides whether it is acceptable.
pub(crate) fn load_reference(
    reference: &CompositeRef,
    registry: &CompositeRegistry,
    own: Option<&CompositeId>,
    options: LoadOptions,
) -> SchemaResult<CompositeRef> {
    let id = match reference {
        CompositeRef::Myself => {
            return Ok(own.map_or(CompositeRef::Myself, |id| CompositeRef::Resolved(id.clone())));
        }
        CompositeRef::Resolved(_) if options.lazy => return Ok(reference.clone()),
        CompositeRef::Resolved(id) | CompositeRef::Unresolved(id) => id,
    };

    if own == Some(id) || registry.contains(id) {
        return Ok(CompositeRef::Resolved(id.clone()));
    }

    if options.allow_not_found {
        warn!(composite = %id, "reference left unresolved");
        Ok(CompositeRef::Unresolved(id.clone()))
    } else {
        Err(SchemaError::not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arity::Arity;
    use crate::data::{DataField, NewComposite};
    use crate::simple::{SimpleField, SimpleType};

    fn identity() -> Composite {
        NewComposite::new(
            "Identity",
            vec![DataField::simple(
                "1",
                1,
                "Name",
                SimpleField::new(SimpleType::Text, Arity::mandatory()),
            )
            .unwrap()],
        )
        .unwrap()
        .create(CompositeId::new(), &CompositeRegistry::default())
        .unwrap()
    }

    #[test]
    fn test_unknown_reference_strict() {
        let id = CompositeId::new();
        let err = load_reference(
            &CompositeRef::to(id.clone()),
            &CompositeRegistry::default(),
            None,
            LoadOptions::strict(),
        )
        .unwrap_err();
        assert_eq!(err, SchemaError::not_found(&id));
    }

    #[test]
    fn test_unknown_reference_partial() {
        let id = CompositeId::new();
        let loaded = load_reference(
            &CompositeRef::to(id.clone()),
            &CompositeRegistry::default(),
            None,
            LoadOptions::partial(),
        )
        .unwrap();
        assert_eq!(loaded, CompositeRef::Unresolved(id));
    }

    #[test]
    fn test_lazy_keeps_resolved() {
        let id = CompositeId::new();
        let resolved = CompositeRef::Resolved(id.clone());
        let empty = CompositeRegistry::default();

        assert_eq!(
            load_reference(&resolved, &empty, None, LoadOptions::default()).unwrap(),
            resolved
        );
        assert!(load_reference(&resolved, &empty, None, LoadOptions::strict()).is_err());
    }

    #[test]
    fn test_known_reference_resolves() {
        let composite = identity();
        let registry = CompositeRegistry::from_slice(&[composite.clone()]);
        let loaded = load_reference(
            &CompositeRef::to(composite.id.clone()),
            &registry,
            None,
            LoadOptions::strict(),
        )
        .unwrap();
        assert!(loaded.is_resolved());
        assert_eq!(registry.resolve(&composite.id).unwrap().name, "Identity");
    }

    #[test]
    fn test_with_does_not_touch_original() {
        let empty = CompositeRegistry::default();
        let one = empty.with(identity());
        assert!(empty.is_empty());
        assert_eq!(one.len(), 1);
        assert_eq!(one.load_all(LoadOptions::strict()).unwrap().len(), 1);
    }
}
