//! Forms: the top-level fields shown to users, and the review actions a
//! submission goes through.
//!
//! A form field that embeds a composite carries a parallel tree of
//! [`DeepFormField`]s. Each deep field narrows the data field with the same
//! id: it may tighten the arity, never widen it, and never change the kind.

use formwork_ids::{CompositeId, FormId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::arity::Arity;
use crate::config::LoadOptions;
use crate::data::{CompositeRef, DataField, RefCheck};
use crate::error::{FieldPath, SchemaError, SchemaResult};
use crate::field::{
    check_field_id, check_name, check_order_validity, sorted_by_order, Field, FieldId, FieldKind,
    Ordered,
};
use crate::registry::{load_reference, CompositeRegistry, Loadable};
use crate::simple::SimpleField;

/// A field nested inside a composite, as seen by one form.
///
/// Deep fields are anonymous: name and kind come from the matching data
/// field, which the loader attaches in `data`. That attachment is runtime
/// state and is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeepFormField {
    #[serde(rename = "FORM_SIMPLE_DEEP")]
    Simple {
        id: FieldId,
        order: u32,
        simple: SimpleField,
        #[serde(skip)]
        data: Option<Box<DataField>>,
    },

    #[serde(rename = "FORM_UNION_DEEP")]
    Union {
        id: FieldId,
        order: u32,
        arity: Arity,
        options: Vec<DeepFormField>,
        #[serde(skip)]
        data: Option<Box<DataField>>,
    },

    #[serde(rename = "FORM_COMPOSITE_DEEP")]
    Composite {
        id: FieldId,
        order: u32,
        arity: Arity,
        fields: Vec<DeepFormField>,
        #[serde(skip)]
        data: Option<Box<DataField>>,
    },
}

impl DeepFormField {
    pub fn simple(id: impl Into<FieldId>, order: u32, simple: SimpleField) -> SchemaResult<Self> {
        let field = DeepFormField::Simple {
            id: id.into(),
            order,
            simple,
            data: None,
        };
        check_field_id(field.id(), &FieldPath::root())?;
        Ok(field)
    }

    pub fn union(
        id: impl Into<FieldId>,
        order: u32,
        arity: Arity,
        options: Vec<DeepFormField>,
    ) -> SchemaResult<Self> {
        let path = FieldPath::root();
        check_order_validity(&options, &path)?;
        let field = DeepFormField::Union {
            id: id.into(),
            order,
            arity,
            options,
            data: None,
        };
        check_field_id(field.id(), &path)?;
        Ok(field)
    }

    pub fn composite(
        id: impl Into<FieldId>,
        order: u32,
        arity: Arity,
        fields: Vec<DeepFormField>,
    ) -> SchemaResult<Self> {
        let path = FieldPath::root();
        check_order_validity(&fields, &path)?;
        let field = DeepFormField::Composite {
            id: id.into(),
            order,
            arity,
            fields,
            data: None,
        };
        check_field_id(field.id(), &path)?;
        Ok(field)
    }

    /// The deep field accepting exactly what `data` accepts.
    ///
    /// Nested composites are expanded from `registry`. A composite already
    /// being expanded higher up is not expanded again: that occurrence is
    /// made forbidden, which keeps the tree finite for recursive structures.
    pub fn matching(data: &DataField, registry: &CompositeRegistry) -> Self {
        Self::matching_within(data, registry, &[])
    }

    fn matching_within(data: &DataField, registry: &CompositeRegistry, visiting: &[CompositeId]) -> Self {
        let attached = Some(Box::new(data.clone()));
        match data {
            DataField::Simple {
                id, order, simple, ..
            } => DeepFormField::Simple {
                id: id.clone(),
                order: *order,
                simple: simple.clone(),
                data: attached,
            },
            DataField::Union {
                id,
                order,
                arity,
                options,
                ..
            } => DeepFormField::Union {
                id: id.clone(),
                order: *order,
                arity: *arity,
                options: options
                    .iter()
                    .map(|o| Self::matching_within(o, registry, visiting))
                    .collect(),
                data: attached,
            },
            DataField::Composite {
                id,
                order,
                arity,
                composite,
                ..
            } => {
                let target = composite
                    .id()
                    .filter(|target| !visiting.contains(target))
                    .and_then(|target| registry.get(target));
                let (arity, fields) = match target {
                    Some(target) => {
                        let mut path = visiting.to_vec();
                        path.push(target.id.clone());
                        let fields = target
                            .fields
                            .iter()
                            .map(|f| Self::matching_within(f, registry, &path))
                            .collect();
                        (*arity, fields)
                    }
                    None => (Arity::forbidden(), Vec::new()),
                };
                DeepFormField::Composite {
                    id: id.clone(),
                    order: *order,
                    arity,
                    fields,
                    data: attached,
                }
            }
        }
    }

    /// The data field this deep field narrows, once loaded.
    pub fn data(&self) -> Option<&DataField> {
        match self {
            DeepFormField::Simple { data, .. }
            | DeepFormField::Union { data, .. }
            | DeepFormField::Composite { data, .. } => data.as_deref(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.data().is_some()
    }

    pub fn options(&self) -> Option<&[DeepFormField]> {
        match self {
            DeepFormField::Union { options, .. } => Some(options),
            _ => None,
        }
    }

    pub fn fields(&self) -> Option<&[DeepFormField]> {
        match self {
            DeepFormField::Composite { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// Attach the data field with the same id among `siblings`, recursively.
    pub(crate) fn load(
        &self,
        siblings: &[DataField],
        registry: &CompositeRegistry,
        options: LoadOptions,
        path: &FieldPath,
    ) -> SchemaResult<Self> {
        if options.lazy && self.is_loaded() {
            return Ok(self.clone());
        }

        let data = siblings
            .iter()
            .find(|d| d.id() == self.id())
            .ok_or_else(|| {
                SchemaError::mismatch(
                    path,
                    format!("the composite has no field with id '{}'", self.id()),
                )
            })?;
        let attached = Some(Box::new(data.clone()));

        match (self, data) {
            (DeepFormField::Simple { id, order, simple, .. }, DataField::Simple { .. }) => {
                Ok(DeepFormField::Simple {
                    id: id.clone(),
                    order: *order,
                    simple: simple.clone(),
                    data: attached,
                })
            }
            (
                DeepFormField::Union {
                    id,
                    order,
                    arity,
                    options: deep_options,
                    ..
                },
                DataField::Union {
                    options: data_options,
                    ..
                },
            ) => {
                let loaded = deep_options
                    .iter()
                    .map(|o| o.load(data_options, registry, options, &path.child(o.id())))
                    .collect::<SchemaResult<Vec<_>>>()?;
                Ok(DeepFormField::Union {
                    id: id.clone(),
                    order: *order,
                    arity: *arity,
                    options: loaded,
                    data: attached,
                })
            }
            (
                DeepFormField::Composite {
                    id,
                    order,
                    arity,
                    fields,
                    ..
                },
                DataField::Composite { composite, .. },
            ) => {
                let fields = load_nested(composite, fields, registry, options, path)?;
                Ok(DeepFormField::Composite {
                    id: id.clone(),
                    order: *order,
                    arity: *arity,
                    fields,
                    data: attached,
                })
            }
            _ => Err(SchemaError::mismatch(
                path,
                format!(
                    "the form field is {} but the data field is {}",
                    self.kind(),
                    data.kind()
                ),
            )),
        }
    }

    pub(crate) fn validate(&self, path: &FieldPath) -> SchemaResult<()> {
        check_field_id(self.id(), path)?;
        let data = self
            .data()
            .ok_or_else(|| SchemaError::invalid(path, "the field has not been loaded"))?;

        if self.kind() != data.kind() {
            return Err(SchemaError::mismatch(
                path,
                format!(
                    "the form field is {} but the data field is {}",
                    self.kind(),
                    data.kind()
                ),
            ));
        }
        if !self.arity().is_within(&data.arity()) {
            return Err(SchemaError::invalid(
                path,
                format!(
                    "the arity {} is wider than the data field's {}",
                    self.arity(),
                    data.arity()
                ),
            ));
        }
        if let DataField::Simple { simple, .. } = data {
            if simple.kind.has_fixed_arity() && self.arity() != simple.arity {
                return Err(SchemaError::invalid(
                    path,
                    format!(
                        "a {} field keeps the arity {} of its data field, found {}",
                        simple.kind,
                        simple.arity,
                        self.arity()
                    ),
                ));
            }
        }

        match self {
            DeepFormField::Simple { simple, .. } => simple.check(path),
            DeepFormField::Union { options, .. } => {
                if options.is_empty() {
                    return Err(SchemaError::invalid(path, "a union needs at least one option"));
                }
                validate_deep_fields(options, path)
            }
            DeepFormField::Composite { fields, .. } => validate_deep_fields(fields, path),
        }
    }
}

impl DataField {
    /// The default form field for this data field, see [`DeepFormField::matching`].
    pub fn create_matching_form_field(&self, registry: &CompositeRegistry) -> DeepFormField {
        DeepFormField::matching(self, registry)
    }
}

fn validate_deep_fields(fields: &[DeepFormField], path: &FieldPath) -> SchemaResult<()> {
    check_order_validity(fields, path)?;
    for field in fields {
        field.validate(&path.child(field.id()))?;
    }
    Ok(())
}

/// Load the deep fields under a composite reference, if the composite is known.
fn load_nested(
    reference: &CompositeRef,
    fields: &[DeepFormField],
    registry: &CompositeRegistry,
    options: LoadOptions,
    path: &FieldPath,
) -> SchemaResult<Vec<DeepFormField>> {
    let reference = load_reference(reference, registry, None, options)?;
    let target = match &reference {
        CompositeRef::Resolved(id) => registry.get(id),
        _ => None,
    };
    match target {
        Some(target) => fields
            .iter()
            .map(|f| f.load(&target.fields, registry, options, &path.child(f.id())))
            .collect(),
        None => Ok(fields.to_vec()),
    }
}

impl Ordered for DeepFormField {
    fn id(&self) -> &str {
        match self {
            DeepFormField::Simple { id, .. }
            | DeepFormField::Union { id, .. }
            | DeepFormField::Composite { id, .. } => id,
        }
    }

    fn order(&self) -> u32 {
        match self {
            DeepFormField::Simple { order, .. }
            | DeepFormField::Union { order, .. }
            | DeepFormField::Composite { order, .. } => *order,
        }
    }
}

impl Field for DeepFormField {
    fn name(&self) -> Option<&str> {
        self.data().and_then(Field::name)
    }

    fn arity(&self) -> Arity {
        match self {
            DeepFormField::Simple { simple, .. } => simple.arity,
            DeepFormField::Union { arity, .. } | DeepFormField::Composite { arity, .. } => *arity,
        }
    }

    fn kind(&self) -> FieldKind {
        match self {
            DeepFormField::Simple { simple, .. } => FieldKind::Simple(simple.kind),
            DeepFormField::Union { .. } => FieldKind::Union,
            DeepFormField::Composite { .. } => FieldKind::Composite,
        }
    }
}

/// A top-level field of a form or of a review action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShallowFormField {
    #[serde(rename = "FORM_SIMPLE_SHALLOW")]
    Simple {
        id: FieldId,
        order: u32,
        name: String,
        simple: SimpleField,
    },

    #[serde(rename = "FORM_UNION_SHALLOW")]
    Union {
        id: FieldId,
        order: u32,
        name: String,
        arity: Arity,
        options: Vec<ShallowFormField>,
    },

    #[serde(rename = "FORM_COMPOSITE_SHALLOW")]
    Composite {
        id: FieldId,
        order: u32,
        name: String,
        arity: Arity,
        composite: CompositeRef,
        fields: Vec<DeepFormField>,
    },
}

impl ShallowFormField {
    pub fn simple(
        id: impl Into<FieldId>,
        order: u32,
        name: impl Into<String>,
        simple: SimpleField,
    ) -> SchemaResult<Self> {
        let field = ShallowFormField::Simple {
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
        options: Vec<ShallowFormField>,
    ) -> SchemaResult<Self> {
        let field = ShallowFormField::Union {
            id: id.into(),
            order,
            name: name.into(),
            arity,
            options,
        };
        field.check(&FieldPath::root(), RefCheck::Shape)?;
        Ok(field)
    }

    /// A field embedding the composite `composite`, narrowed by `fields`.
    pub fn composite(
        id: impl Into<FieldId>,
        order: u32,
        name: impl Into<String>,
        arity: Arity,
        composite: CompositeId,
        fields: Vec<DeepFormField>,
    ) -> SchemaResult<Self> {
        let field = ShallowFormField::Composite {
            id: id.into(),
            order,
            name: name.into(),
            arity,
            composite: CompositeRef::to(composite),
            fields,
        };
        field.check(&FieldPath::root(), RefCheck::Shape)?;
        Ok(field)
    }

    /// A field embedding `composite` with deep fields matching its own
    /// definition, see [`DeepFormField::matching`].
    pub fn from_composite(
        id: impl Into<FieldId>,
        order: u32,
        name: impl Into<String>,
        arity: Arity,
        composite: &crate::data::Composite,
        registry: &CompositeRegistry,
    ) -> SchemaResult<Self> {
        let visiting = [composite.id.clone()];
        let fields = composite
            .fields
            .iter()
            .map(|f| DeepFormField::matching_within(f, registry, &visiting))
            .collect();
        let field = ShallowFormField::Composite {
            id: id.into(),
            order,
            name: name.into(),
            arity,
            composite: CompositeRef::Resolved(composite.id.clone()),
            fields,
        };
        field.check(&FieldPath::root(), RefCheck::Shape)?;
        Ok(field)
    }

    pub fn reference(&self) -> Option<&CompositeRef> {
        match self {
            ShallowFormField::Composite { composite, .. } => Some(composite),
            _ => None,
        }
    }

    pub fn options(&self) -> Option<&[ShallowFormField]> {
        match self {
            ShallowFormField::Union { options, .. } => Some(options),
            _ => None,
        }
    }

    pub fn fields(&self) -> Option<&[DeepFormField]> {
        match self {
            ShallowFormField::Composite { fields, .. } => Some(fields),
            _ => None,
        }
    }

    /// Every composite reference held by this field or its union options.
    pub fn references(&self) -> Vec<&CompositeRef> {
        match self {
            ShallowFormField::Simple { .. } => Vec::new(),
            ShallowFormField::Union { options, .. } => {
                options.iter().flat_map(ShallowFormField::references).collect()
            }
            ShallowFormField::Composite { composite, .. } => vec![composite],
        }
    }

    fn name_str(&self) -> &str {
        match self {
            ShallowFormField::Simple { name, .. }
            | ShallowFormField::Union { name, .. }
            | ShallowFormField::Composite { name, .. } => name,
        }
    }

    pub(crate) fn check(&self, path: &FieldPath, refs: RefCheck) -> SchemaResult<()> {
        check_field_id(self.id(), path)?;
        check_name(self.name_str(), path)?;

        match self {
            ShallowFormField::Simple { simple, .. } => simple.check(path),
            ShallowFormField::Union { options, .. } => {
                if options.is_empty() {
                    return Err(SchemaError::invalid(path, "a union needs at least one option"));
                }
                check_shallow_fields(options, path, refs)
            }
            ShallowFormField::Composite {
                composite, fields, ..
            } => {
                if composite.is_recursion_token() {
                    return Err(SchemaError::invalid(
                        path,
                        "a form field cannot use the recursion token",
                    ));
                }
                if refs == RefCheck::Shape {
                    return check_order_validity(fields, path);
                }
                if let CompositeRef::Unresolved(id) = composite {
                    return Err(SchemaError::invalid(
                        path,
                        format!("the reference to composite {id} has not been loaded"),
                    ));
                }
                validate_deep_fields(fields, path)
            }
        }
    }

    pub(crate) fn load(
        &self,
        registry: &CompositeRegistry,
        options: LoadOptions,
        path: &FieldPath,
    ) -> SchemaResult<Self> {
        match self {
            ShallowFormField::Simple { .. } => Ok(self.clone()),
            ShallowFormField::Union {
                id,
                order,
                name,
                arity,
                options: union_options,
            } => {
                let loaded = union_options
                    .iter()
                    .map(|o| o.load(registry, options, &path.child(o.id())))
                    .collect::<SchemaResult<Vec<_>>>()?;
                Ok(ShallowFormField::Union {
                    id: id.clone(),
                    order: *order,
                    name: name.clone(),
                    arity: *arity,
                    options: loaded,
                })
            }
            ShallowFormField::Composite {
                id,
                order,
                name,
                arity,
                composite,
                fields,
            } => Ok(ShallowFormField::Composite {
                id: id.clone(),
                order: *order,
                name: name.clone(),
                arity: *arity,
                composite: load_reference(composite, registry, None, options)?,
                fields: load_nested(composite, fields, registry, options, path)?,
            }),
        }
    }
}

fn check_shallow_fields(
    fields: &[ShallowFormField],
    path: &FieldPath,
    refs: RefCheck,
) -> SchemaResult<()> {
    check_order_validity(fields, path)?;
    for field in fields {
        field.check(&path.child(field.id()), refs)?;
    }
    Ok(())
}

fn load_shallow_fields(
    fields: &[ShallowFormField],
    registry: &CompositeRegistry,
    options: LoadOptions,
    path: &FieldPath,
) -> SchemaResult<Vec<ShallowFormField>> {
    fields
        .iter()
        .map(|f| f.load(registry, options, &path.child(f.id())))
        .collect()
}

impl Ordered for ShallowFormField {
    fn id(&self) -> &str {
        match self {
            ShallowFormField::Simple { id, .. }
            | ShallowFormField::Union { id, .. }
            | ShallowFormField::Composite { id, .. } => id,
        }
    }

    fn order(&self) -> u32 {
        match self {
            ShallowFormField::Simple { order, .. }
            | ShallowFormField::Union { order, .. }
            | ShallowFormField::Composite { order, .. } => *order,
        }
    }
}

impl Field for ShallowFormField {
    fn name(&self) -> Option<&str> {
        Some(self.name_str())
    }

    fn arity(&self) -> Arity {
        match self {
            ShallowFormField::Simple { simple, .. } => simple.arity,
            ShallowFormField::Union { arity, .. } | ShallowFormField::Composite { arity, .. } => {
                *arity
            }
        }
    }

    fn kind(&self) -> FieldKind {
        match self {
            ShallowFormField::Simple { simple, .. } => FieldKind::Simple(simple.kind),
            ShallowFormField::Union { .. } => FieldKind::Union,
            ShallowFormField::Composite { .. } => FieldKind::Composite,
        }
    }
}

/// A review step. Reviewers of this step may have to fill in `fields`
/// before moving the record forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub order: u32,
    pub name: String,
    /// Who is in charge of this step.
    pub reviewer: String,
    #[serde(default)]
    pub fields: Vec<ShallowFormField>,
}

impl Action {
    pub fn new(
        id: impl Into<String>,
        order: u32,
        name: impl Into<String>,
        reviewer: impl Into<String>,
    ) -> SchemaResult<Self> {
        let action = Self {
            id: id.into(),
            order,
            name: name.into(),
            reviewer: reviewer.into(),
            fields: Vec::new(),
        };
        action.check(&FieldPath::root(), RefCheck::Shape)?;
        Ok(action)
    }

    pub fn with_fields(self, fields: Vec<ShallowFormField>) -> SchemaResult<Self> {
        let action = Self { fields, ..self };
        action.check(&FieldPath::root(), RefCheck::Shape)?;
        Ok(action)
    }

    fn check(&self, path: &FieldPath, refs: RefCheck) -> SchemaResult<()> {
        check_field_id(&self.id, path)?;
        check_name(&self.name, path)?;
        check_name(&self.reviewer, path)?;
        check_shallow_fields(&self.fields, path, refs)
    }
}

impl Ordered for Action {
    fn id(&self) -> &str {
        &self.id
    }

    fn order(&self) -> u32 {
        self.order
    }
}

/// A form definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub id: FormId,
    pub name: String,
    /// Visible to anonymous users.
    #[serde(default)]
    pub public: bool,
    /// Accepts new submissions.
    #[serde(default = "default_open")]
    pub open: bool,
    pub fields: Vec<ShallowFormField>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

fn default_open() -> bool {
    true
}

impl Form {
    /// A new open, non-public form with a fresh id.
    pub fn new(
        name: impl Into<String>,
        fields: Vec<ShallowFormField>,
        actions: Vec<Action>,
    ) -> SchemaResult<Self> {
        let form = Self {
            id: FormId::new(),
            name: name.into(),
            public: false,
            open: true,
            fields,
            actions,
        };
        form.check(RefCheck::Shape)?;
        Ok(form)
    }

    pub fn with_public(&self, public: bool) -> Self {
        Self {
            public,
            ..self.clone()
        }
    }

    pub fn with_open(&self, open: bool) -> Self {
        Self {
            open,
            ..self.clone()
        }
    }

    pub fn field(&self, id: &str) -> Option<&ShallowFormField> {
        self.fields.iter().find(|f| f.id() == id)
    }

    pub fn sorted_fields(&self) -> Vec<&ShallowFormField> {
        sorted_by_order(&self.fields)
    }

    pub fn action(&self, id: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.id == id)
    }

    /// The review step a new record starts in.
    pub fn first_action(&self) -> Option<&Action> {
        self.actions.iter().min_by_key(|a| a.order)
    }

    /// The step following `current`, `None` if it is the last one or unknown.
    pub fn next_action(&self, current: &str) -> Option<&Action> {
        let current = self.action(current)?;
        self.actions
            .iter()
            .filter(|a| a.order > current.order)
            .min_by_key(|a| a.order)
    }

    /// Ids of the composites referenced by top-level fields and action fields.
    pub fn referenced_composites(&self) -> Vec<&CompositeId> {
        let mut ids: Vec<&CompositeId> = self
            .fields
            .iter()
            .chain(self.actions.iter().flat_map(|a| a.fields.iter()))
            .flat_map(ShallowFormField::references)
            .filter_map(CompositeRef::id)
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    fn check(&self, refs: RefCheck) -> SchemaResult<()> {
        let path = FieldPath::root();
        check_name(&self.name, &path)?;
        check_shallow_fields(&self.fields, &path, refs)?;

        let actions = path.child("actions");
        check_order_validity(&self.actions, &actions)?;
        for action in &self.actions {
            action.check(&actions.child(&action.id), refs)?;
        }
        Ok(())
    }
}

impl Loadable for Form {
    fn load(&self, registry: &CompositeRegistry, options: LoadOptions) -> SchemaResult<Self> {
        let root = FieldPath::root();
        let fields = load_shallow_fields(&self.fields, registry, options, &root)?;
        let actions = self
            .actions
            .iter()
            .map(|action| {
                let path = root.child("actions").child(&action.id);
                Ok(Action {
                    fields: load_shallow_fields(&action.fields, registry, options, &path)?,
                    ..action.clone()
                })
            })
            .collect::<SchemaResult<Vec<_>>>()?;

        debug!(form = %self.id, "form loaded");
        Ok(Self {
            fields,
            actions,
            ..self.clone()
        })
    }

    fn validate(&self) -> SchemaResult<()> {
        self.check(RefCheck::Loaded)
    }
}
