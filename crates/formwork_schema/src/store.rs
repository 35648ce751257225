//! Persistence seams for composites and forms, with an in-memory backend.
//!
//! Composite content is immutable once created; only visibility flags change.
//! That is what lets a form loaded today keep answering submissions against
//! the same structure tomorrow.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use formwork_ids::{CompositeId, FormId};
use thiserror::Error;
use tracing::info;

use crate::config::LoadOptions;
use crate::data::{Composite, NewComposite};
use crate::error::SchemaError;
use crate::form::Form;
use crate::registry::{CompositeRegistry, Loadable};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Composite not found: {0}")]
    CompositeNotFound(CompositeId),

    #[error("Form not found: {0}")]
    FormNotFound(FormId),

    #[error("Cannot create a closed form")]
    ClosedForm,

    #[error("Composite {0} is closed to new forms")]
    ClosedComposite(CompositeId),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Which forms to list. A flag left to `None` does not filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormFilter {
    pub public: Option<bool>,
    pub open: Option<bool>,
}

impl FormFilter {
    pub fn all() -> Self {
        Self::default()
    }

    /// Forms an anonymous user may fill in.
    pub fn available() -> Self {
        Self {
            public: Some(true),
            open: Some(true),
        }
    }

    fn accepts(&self, form: &Form) -> bool {
        self.public.map_or(true, |p| form.public == p) && self.open.map_or(true, |o| form.open == o)
    }
}

pub trait CompositeStore {
    fn list_composites(&self) -> StoreResult<Vec<Composite>>;

    fn find_composite(&self, id: &CompositeId) -> StoreResult<Option<Composite>>;

    /// Validate `composite`, give it a fresh id and persist it.
    fn create_composite(&self, composite: &NewComposite) -> StoreResult<Composite>;

    /// Change whether new forms may use a composite.
    fn set_composite_open(&self, id: &CompositeId, open: bool) -> StoreResult<Composite>;

    /// A snapshot of every stored composite.
    fn registry(&self) -> StoreResult<CompositeRegistry> {
        Ok(CompositeRegistry::new(self.list_composites()?))
    }
}

pub trait FormStore {
    fn list_forms(&self, filter: FormFilter) -> StoreResult<Vec<Form>>;

    fn find_form(&self, id: &FormId) -> StoreResult<Option<Form>>;

    /// Load and validate `form` against the stored composites, then persist
    /// it under a fresh id. Closed forms, and forms using a closed composite,
    /// are rejected.
    fn create_form(&self, form: &Form) -> StoreResult<Form>;

    fn set_form_open(&self, id: &FormId, open: bool) -> StoreResult<Form>;
}

/// Process-local store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    composites: RwLock<BTreeMap<CompositeId, Composite>>,
    forms: RwLock<BTreeMap<FormId, Form>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn composites(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<CompositeId, Composite>>> {
        self.composites.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn composites_mut(
        &self,
    ) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<CompositeId, Composite>>> {
        self.composites.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn forms(&self) -> StoreResult<RwLockReadGuard<'_, BTreeMap<FormId, Form>>> {
        self.forms.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn forms_mut(&self) -> StoreResult<RwLockWriteGuard<'_, BTreeMap<FormId, Form>>> {
        self.forms.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl CompositeStore for MemoryStore {
    fn list_composites(&self) -> StoreResult<Vec<Composite>> {
        Ok(self.composites()?.values().cloned().collect())
    }

    fn find_composite(&self, id: &CompositeId) -> StoreResult<Option<Composite>> {
        Ok(self.composites()?.get(id).cloned())
    }

    fn create_composite(&self, composite: &NewComposite) -> StoreResult<Composite> {
        let mut composites = self.composites_mut()?;
        let registry = CompositeRegistry::new(composites.values().cloned());

        let id = loop {
            let candidate = CompositeId::new();
            if !composites.contains_key(&candidate) {
                break candidate;
            }
        };
        let created = composite.create(id, &registry)?;
        composites.insert(created.id.clone(), created.clone());

        info!(composite = %created.id, name = %created.name, "composite stored");
        Ok(created)
    }

    fn set_composite_open(&self, id: &CompositeId, open: bool) -> StoreResult<Composite> {
        let mut composites = self.composites_mut()?;
        let edited = composites
            .get(id)
            .map(|c| c.with_open(open))
            .ok_or_else(|| StoreError::CompositeNotFound(id.clone()))?;
        composites.insert(id.clone(), edited.clone());

        info!(composite = %id, open, "composite visibility changed");
        Ok(edited)
    }
}

impl FormStore for MemoryStore {
    fn list_forms(&self, filter: FormFilter) -> StoreResult<Vec<Form>> {
        Ok(self
            .forms()?
            .values()
            .filter(|f| filter.accepts(f))
            .cloned()
            .collect())
    }

    fn find_form(&self, id: &FormId) -> StoreResult<Option<Form>> {
        Ok(self.forms()?.get(id).cloned())
    }

    fn create_form(&self, form: &Form) -> StoreResult<Form> {
        if !form.open {
            return Err(StoreError::ClosedForm);
        }
        let registry = self.registry()?;
        let loaded = form.load_and_validate(&registry, LoadOptions::strict())?;
        if let Some(closed) = loaded
            .referenced_composites()
            .into_iter()
            .find(|id| registry.get(id).map_or(false, |c| !c.open))
        {
            return Err(StoreError::ClosedComposite(closed.clone()));
        }

        let mut forms = self.forms_mut()?;
        let id = loop {
            let candidate = FormId::new();
            if !forms.contains_key(&candidate) {
                break candidate;
            }
        };
        let stored = Form { id, ..loaded };
        forms.insert(stored.id.clone(), stored.clone());

        info!(form = %stored.id, name = %stored.name, "form stored");
        Ok(stored)
    }

    fn set_form_open(&self, id: &FormId, open: bool) -> StoreResult<Form> {
        let mut forms = self.forms_mut()?;
        let edited = forms
            .get(id)
            .map(|f| f.with_open(open))
            .ok_or_else(|| StoreError::FormNotFound(id.clone()))?;
        forms.insert(id.clone(), edited.clone());

        info!(form = %id, open, "form visibility changed");
        Ok(edited)
    }
}
