//! Composite data structures: named, ordered, possibly recursive record types.
//!
//! # Lifecycle
//!
//! 1. An author builds a [`NewComposite`]. Fields may point back at the
//!    composite being defined through [`CompositeRef::Myself`].
//! 2. [`NewComposite::create`] resolves references, receives the persisted id
//!    and rewrites every `Myself` into a reference to that id.
//! 3. The resulting [`Composite`] is immutable content; only its `open` flag
//!    may change afterwards.

use formwork_ids::CompositeId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::arity::Arity;
use crate::config::LoadOptions;
use crate::defaults::RECURSION_TOKEN;
use crate::error::{FieldPath, SchemaError, SchemaResult};
use crate::field::{
    check_field_id, check_name, check_order_validity, sorted_by_order, Field, FieldId, FieldKind,
    Ordered,
};
use crate::registry::{load_reference, CompositeRegistry, Loadable};
use crate::simple::SimpleField;

/// A reference from a field to a composite.
///
/// On the wire this is a plain string: the composite id, or
/// [`RECURSION_TOKEN`] for `Myself`. Whether the id was resolved is runtime
/// state and always deserializes as `Unresolved`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CompositeRef {
    /// The composite currently being defined. Only valid before creation.
    Myself,
    /// An id not yet checked against known composites.
    Unresolved(CompositeId),
    /// An id known to exist in the registry it was loaded against.
    Resolved(CompositeId),
}

impl CompositeRef {
    pub fn to(id: CompositeId) -> Self {
        CompositeRef::Unresolved(id)
    }

    pub fn id(&self) -> Option<&CompositeId> {
        match self {
            CompositeRef::Myself => None,
            CompositeRef::Unresolved(id) | CompositeRef::Resolved(id) => Some(id),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, CompositeRef::Resolved(_))
    }

    pub fn is_recursion_token(&self) -> bool {
        matches!(self, CompositeRef::Myself)
    }

    /// Replace the recursion token by a resolved reference to `own`.
    pub fn resolve_recursion(&self, own: &CompositeId) -> Self {
        match self {
            CompositeRef::Myself => CompositeRef::Resolved(own.clone()),
            other => other.clone(),
        }
    }
}

impl std::fmt::Display for CompositeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompositeRef::Myself => write!(f, "{RECURSION_TOKEN}"),
            CompositeRef::Unresolved(id) | CompositeRef::Resolved(id) => write!(f, "{id}"),
        }
    }
}

impl Serialize for CompositeRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            CompositeRef::Myself => serializer.serialize_str(RECURSION_TOKEN),
            CompositeRef::Unresolved(id) | CompositeRef::Resolved(id) => {
                serializer.serialize_str(id.as_str())
            }
        }
    }
}

impl<'de> Deserialize<'de> for CompositeRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if raw == RECURSION_TOKEN {
            return Ok(CompositeRef::Myself);
        }
        CompositeId::parse(&raw)
            .map(CompositeRef::Unresolved)
            .map_err(serde::de::Error::custom)
    }
}

/// How much of the reference state a validation pass insists on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RefCheck {
    /// Only local invariants; references are not looked at.
    Shape,
    /// References must be resolved, or be the recursion token.
    AllowRecursion,
    /// Every reference must be resolved.
    Loaded,
}

/// A field of a composite data structure.
///
/// Composite fields do not nest other composites inline: they reference them
/// by id, which is what makes recursive structures finite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DataField {
    #[serde(rename = "DATA_SIMPLE")]
    Simple {
        id: FieldId,
        order: u32,
        name: String,
        simple: SimpleField,
    },

    #[serde(rename = "DATA_UNION")]
    Union {
        id: FieldId,
        order: u32,
        name: String,
        arity: Arity,
        options: Vec<DataField>,
    },

    #[serde(rename = "DATA_REFERENCE")]
    Composite {
        id: FieldId,
        order: u32,
        name: String,
        arity: Arity,
        composite: CompositeRef,
    },
}

impl DataField {
    pub fn simple(
        id: impl Into<FieldId>,
        order: u32,
        name: impl Into<String>,
        simple: SimpleField,
    ) -> SchemaResult<Self> {
        let field = DataField::Simple {
            id: id.into(),
            order,
            name: name.into(),
            simple,
        };
        field.check(&FieldPath::root(), RefCheck::Shape)?;
        Ok(field)
    }

    pub fn union(
        id: impl Into<FieldId>,
        order: u32,
        name: impl Into<String>,
        arity: Arity,
        options: Vec<DataField>,
    ) -> SchemaResult<Self> {
        let field = DataField::Union {
            id: id.into(),
            order,
            name: name.into(),
            arity,
            options,
        };
        field.check(&FieldPath::root(), RefCheck::Shape)?;
        Ok(field)
    }

    /// A reference to another composite. Its minimum arity must be 0.
    pub fn composite(
        id: impl Into<FieldId>,
        order: u32,
        name: impl Into<String>,
        arity: Arity,
        composite: CompositeRef,
    ) -> SchemaResult<Self> {
        let field = DataField::Composite {
            id: id.into(),
            order,
            name: name.into(),
            arity,
            composite,
        };
        field.check(&FieldPath::root(), RefCheck::Shape)?;
        Ok(field)
    }

    /// A reference to the composite being defined.
    pub fn recursive(
        id: impl Into<FieldId>,
        order: u32,
        name: impl Into<String>,
        arity: Arity,
    ) -> SchemaResult<Self> {
        Self::composite(id, order, name, arity, CompositeRef::Myself)
    }

    /// Copy with another arity. Simple fields go through
    /// [`SimpleField::request_arity`]; composite references keep `min = 0`.
    pub fn with_arity(&self, arity: Arity) -> SchemaResult<Self> {
        let copy = match self {
            DataField::Simple {
                id,
                order,
                name,
                simple,
            } => DataField::Simple {
                id: id.clone(),
                order: *order,
                name: name.clone(),
                simple: simple.request_arity(arity),
            },
            DataField::Union {
                id,
                order,
                name,
                options,
                ..
            } => DataField::Union {
                id: id.clone(),
                order: *order,
                name: name.clone(),
                arity,
                options: options.clone(),
            },
            DataField::Composite {
                id,
                order,
                name,
                composite,
                ..
            } => DataField::Composite {
                id: id.clone(),
                order: *order,
                name: name.clone(),
                arity,
                composite: composite.clone(),
            },
        };
        copy.check(&FieldPath::root(), RefCheck::Shape)?;
        Ok(copy)
    }

    /// The options of a union, `None` for other kinds.
    pub fn options(&self) -> Option<&[DataField]> {
        match self {
            DataField::Union { options, .. } => Some(options),
            _ => None,
        }
    }

    /// The composite referenced by this field, `None` for other kinds.
    pub fn reference(&self) -> Option<&CompositeRef> {
        match self {
            DataField::Composite { composite, .. } => Some(composite),
            _ => None,
        }
    }

    /// Every composite reference in this field and its union options.
    pub fn references(&self) -> Vec<&CompositeRef> {
        match self {
            DataField::Simple { .. } => Vec::new(),
            DataField::Union { options, .. } => {
                options.iter().flat_map(DataField::references).collect()
            }
            DataField::Composite { composite, .. } => vec![composite],
        }
    }

    pub(crate) fn check(&self, path: &FieldPath, refs: RefCheck) -> SchemaResult<()> {
        check_field_id(self.id(), path)?;
        check_name(self.name_str(), path)?;

        match self {
            DataField::Simple { simple, .. } => simple.check(path),
            DataField::Union { options, .. } => {
                if options.is_empty() {
                    return Err(SchemaError::invalid(path, "a union needs at least one option"));
                }
                check_order_validity(options, path)?;
                for option in options {
                    option.check(&path.child(option.id()), refs)?;
                }
                Ok(())
            }
            DataField::Composite {
                arity, composite, ..
            } => {
                if arity.min() != 0 {
                    return Err(SchemaError::invalid(
                        path,
                        format!(
                            "a composite reference must have a minimum arity of 0 to avoid infinite recursion, found {arity}"
                        ),
                    ));
                }
                match (refs, composite) {
                    (RefCheck::Shape, _) => Ok(()),
                    (_, CompositeRef::Resolved(_)) => Ok(()),
                    (RefCheck::AllowRecursion, CompositeRef::Myself) => Ok(()),
                    (RefCheck::Loaded, CompositeRef::Myself) => Err(SchemaError::invalid(
                        path,
                        "the recursion token is only allowed before the composite is created",
                    )),
                    (_, CompositeRef::Unresolved(id)) => Err(SchemaError::invalid(
                        path,
                        format!("the reference to composite {id} has not been loaded"),
                    )),
                }
            }
        }
    }

    /// Resolve composite references against `registry`. `own` is the id of
    /// the composite this field belongs to, if it already has one.
    pub(crate) fn load(
        &self,
        registry: &CompositeRegistry,
        own: Option<&CompositeId>,
        options: LoadOptions,
        path: &FieldPath,
    ) -> SchemaResult<Self> {
        match self {
            DataField::Simple { .. } => Ok(self.clone()),
            DataField::Union {
                id,
                order,
                name,
                arity,
                options: union_options,
            } => {
                let loaded = union_options
                    .iter()
                    .map(|option| option.load(registry, own, options, &path.child(option.id())))
                    .collect::<SchemaResult<Vec<_>>>()?;
                Ok(DataField::Union {
                    id: id.clone(),
                    order: *order,
                    name: name.clone(),
                    arity: *arity,
                    options: loaded,
                })
            }
            DataField::Composite {
                id,
                order,
                name,
                arity,
                composite,
            } => Ok(DataField::Composite {
                id: id.clone(),
                order: *order,
                name: name.clone(),
                arity: *arity,
                composite: load_reference(composite, registry, own, options)?,
            }),
        }
    }

    pub(crate) fn resolve_recursion(&self, own: &CompositeId) -> Self {
        match self {
            DataField::Simple { .. } => self.clone(),
            DataField::Union {
                id,
                order,
                name,
                arity,
                options,
            } => DataField::Union {
                id: id.clone(),
                order: *order,
                name: name.clone(),
                arity: *arity,
                options: options.iter().map(|o| o.resolve_recursion(own)).collect(),
            },
            DataField::Composite {
                id,
                order,
                name,
                arity,
                composite,
            } => DataField::Composite {
                id: id.clone(),
                order: *order,
                name: name.clone(),
                arity: *arity,
                composite: composite.resolve_recursion(own),
            },
        }
    }

    fn name_str(&self) -> &str {
        match self {
            DataField::Simple { name, .. }
            | DataField::Union { name, .. }
            | DataField::Composite { name, .. } => name,
        }
    }
}

impl Ordered for DataField {
    fn id(&self) -> &str {
        match self {
            DataField::Simple { id, .. }
            | DataField::Union { id, .. }
            | DataField::Composite { id, .. } => id,
        }
    }

    fn order(&self) -> u32 {
        match self {
            DataField::Simple { order, .. }
            | DataField::Union { order, .. }
            | DataField::Composite { order, .. } => *order,
        }
    }
}

impl Field for DataField {
    fn name(&self) -> Option<&str> {
        Some(self.name_str())
    }

    fn arity(&self) -> Arity {
        match self {
            DataField::Simple { simple, .. } => simple.arity,
            DataField::Union { arity, .. } | DataField::Composite { arity, .. } => *arity,
        }
    }

    fn kind(&self) -> FieldKind {
        match self {
            DataField::Simple { simple, .. } => FieldKind::Simple(simple.kind),
            DataField::Union { .. } => FieldKind::Union,
            DataField::Composite { .. } => FieldKind::Composite,
        }
    }
}

fn check_fields(fields: &[DataField], path: &FieldPath, refs: RefCheck) -> SchemaResult<()> {
    check_order_validity(fields, path)?;
    for field in fields {
        field.check(&path.child(field.id()), refs)?;
    }
    Ok(())
}

/// A composite being defined, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComposite {
    pub name: String,
    pub fields: Vec<DataField>,
}

impl NewComposite {
    pub fn new(name: impl Into<String>, fields: Vec<DataField>) -> SchemaResult<Self> {
        let composite = Self {
            name: name.into(),
            fields,
        };
        composite.check(RefCheck::Shape)?;
        Ok(composite)
    }

    fn check(&self, refs: RefCheck) -> SchemaResult<()> {
        let path = FieldPath::root();
        check_name(&self.name, &path)?;
        if self.fields.is_empty() {
            return Err(SchemaError::invalid(&path, "a composite must declare at least one field"));
        }
        check_fields(&self.fields, &path, refs)
    }

    /// Resolve references against `registry`, leaving the recursion token in place.
    pub fn load(&self, registry: &CompositeRegistry, options: LoadOptions) -> SchemaResult<Self> {
        let fields = self
            .fields
            .iter()
            .map(|f| f.load(registry, None, options, &FieldPath::root().child(f.id())))
            .collect::<SchemaResult<Vec<_>>>()?;
        Ok(Self {
            name: self.name.clone(),
            fields,
        })
    }

    /// Turn this definition into a persisted composite with the given id.
    ///
    /// Every reference is resolved against `registry` (strictly), then every
    /// occurrence of the recursion token is rewritten to `id`. The input is
    /// not modified.
    pub fn create(&self, id: CompositeId, registry: &CompositeRegistry) -> SchemaResult<Composite> {
        let loaded = self.load(registry, LoadOptions::strict())?;
        loaded.check(RefCheck::AllowRecursion)?;

        let fields = loaded
            .fields
            .iter()
            .map(|f| f.resolve_recursion(&id))
            .collect();
        let composite = Composite {
            id,
            name: loaded.name,
            open: true,
            fields,
        };
        composite.validate()?;

        debug!(composite = %composite.id, name = %composite.name, "composite created");
        Ok(composite)
    }
}

/// A persisted composite data structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Composite {
    pub id: CompositeId,
    pub name: String,
    /// Whether new forms may use this composite.
    #[serde(default = "default_open")]
    pub open: bool,
    pub fields: Vec<DataField>,
}

fn default_open() -> bool {
    true
}

impl Composite {
    /// Copy with another visibility, the only edit a composite accepts.
    pub fn with_open(&self, open: bool) -> Self {
        Self {
            open,
            ..self.clone()
        }
    }

    pub fn field(&self, id: &str) -> Option<&DataField> {
        self.fields.iter().find(|f| f.id() == id)
    }

    pub fn sorted_fields(&self) -> Vec<&DataField> {
        sorted_by_order(&self.fields)
    }

    /// Every composite reference reachable from the fields of this composite
    /// (without following them).
    pub fn references(&self) -> Vec<&CompositeRef> {
        self.fields.iter().flat_map(DataField::references).collect()
    }
}

impl Loadable for Composite {
    /// References to the composite's own id resolve even if the registry does
    /// not know it yet; leftover recursion tokens are replaced by that id.
    fn load(&self, registry: &CompositeRegistry, options: LoadOptions) -> SchemaResult<Self> {
        let fields = self
            .fields
            .iter()
            .map(|f| {
                f.resolve_recursion(&self.id).load(
                    registry,
                    Some(&self.id),
                    options,
                    &FieldPath::root().child(f.id()),
                )
            })
            .collect::<SchemaResult<Vec<_>>>()?;
        Ok(Self {
            fields,
            ..self.clone()
        })
    }

    fn validate(&self) -> SchemaResult<()> {
        let path = FieldPath::root();
        check_name(&self.name, &path)?;
        check_fields(&self.fields, &path, RefCheck::Loaded)
    }
}
