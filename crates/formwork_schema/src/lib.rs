//! Composite schemas, forms and submission validation.
//!
//! # Model
//!
//! 1. **Composites** are named record types made of ordered fields. A field
//!    is a simple value, a union of options, or a reference to a composite,
//!    possibly the one being defined.
//! 2. **Forms** expose top-level fields to users. A form field embedding a
//!    composite narrows each of its fields (tighter arity, same kind).
//! 3. **Submissions** are flat maps of colon-joined keys. They are assembled
//!    into a tree and checked against the form, field by field.
//! 4. **Records** carry a checked submission through the review actions of
//!    its form.
//!
//! Definitions are loaded against a [`CompositeRegistry`] before use. Loading
//! and checking never modify their input: they return a new value or an error.
//!
//! # Modules
//!
//! - [`arity`], [`simple`], [`field`]: building blocks shared by all trees
//! - [`data`]: composites and their fields
//! - [`form`]: forms, deep form fields and review actions
//! - [`registry`]: known composites and reference resolution
//! - [`submission`]: the flat-key codec and the submission checker
//! - [`review`]: record states and transitions
//! - [`store`]: persistence traits and the in-memory backend

pub mod arity;
pub mod config;
pub mod data;
pub mod defaults;
pub mod error;
pub mod field;
pub mod form;
pub mod registry;
pub mod review;
pub mod simple;
pub mod store;
pub mod submission;

pub use arity::Arity;
pub use config::{validate_config, CodecConfig, LoadOptions, SubmissionLimits};
pub use data::{Composite, CompositeRef, DataField, NewComposite};
pub use error::{FieldPath, SchemaError, SchemaResult, SubmissionError, SubmissionResult};
pub use field::{Field, FieldId, FieldKind, Ordered};
pub use form::{Action, DeepFormField, Form, ShallowFormField};
pub use registry::{CompositeRegistry, Loadable};
pub use simple::{SimpleField, SimpleType, SimpleValue};
pub use submission::{decode_fields, Answer, AnswerBuilder, FormSubmission};

// Re-export key types from review and store modules
pub use review::{Record, RecordState, RecordStateTransition, ReviewError, ReviewRequest};
pub use store::{CompositeStore, FormFilter, FormStore, MemoryStore, StoreError, StoreResult};

pub use formwork_ids::{CompositeId, FormId, RecordId};
