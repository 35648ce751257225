//! The flat-key submission format and its validation against a form.
//!
//! A submission is a flat map from colon-joined keys to strings. Each key is
//! a path through the form: field ids, union option ids, and for fields that
//! accept several answers, the index of the occurrence. For a form whose
//! field `7` embeds a composite with a list field `5` of composites:
//!
//! ```text
//! 7:2      -> field 2 of the composite in field 7
//! 7:5:0:2  -> field 2 of the first element of list 5
//! 9:10     -> option 10 selected in union 9
//! ```
//!
//! Decoding assembles the keys into an [`Answer`] tree, then walks the form
//! and its composites in declaration order, checking arity, value types and
//! union exclusivity along the way.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use formwork_ids::FormId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{validate_config, CodecConfig};
use crate::data::{CompositeRef, DataField};
use crate::defaults::KEY_SEPARATOR;
use crate::error::{FieldPath, SchemaError, SubmissionError, SubmissionResult};
use crate::field::{sorted_by_order, Field, Ordered};
use crate::form::{DeepFormField, Form, ShallowFormField};
use crate::registry::CompositeRegistry;
use crate::simple::{SimpleType, SimpleValue};

/// A submission as sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormSubmission {
    /// The form this submission answers.
    pub form: FormId,
    pub data: BTreeMap<String, String>,
}

impl FormSubmission {
    pub fn new(form: FormId, data: BTreeMap<String, String>) -> Self {
        Self { form, data }
    }

    /// Parse the JSON wire form. Any parse failure is the submitter's fault.
    pub fn from_json(raw: &str) -> SubmissionResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| SubmissionError::malformed(format!("invalid submission JSON: {e}")))
    }

    pub fn to_json(&self) -> SubmissionResult<String> {
        serde_json::to_string(self)
            .map_err(|e| SubmissionError::malformed(format!("cannot encode submission: {e}")))
    }

    /// Decode and check this submission with the default configuration.
    pub fn decode(&self, form: &Form, registry: &CompositeRegistry) -> SubmissionResult<Answer> {
        self.decode_with(form, registry, &CodecConfig::default())
    }

    /// Decode and check this submission against a loaded `form`.
    ///
    /// `registry` must hold every composite the form reaches, already loaded.
    pub fn decode_with(
        &self,
        form: &Form,
        registry: &CompositeRegistry,
        config: &CodecConfig,
    ) -> SubmissionResult<Answer> {
        if self.form != form.id {
            return Err(SubmissionError::malformed(format!(
                "the submission targets form {}, not {}",
                self.form, form.id
            )));
        }
        decode_fields(&form.fields, &self.data, registry, config)
    }

    /// Only the verdict of [`decode`](Self::decode).
    pub fn check_validity(&self, form: &Form, registry: &CompositeRegistry) -> SubmissionResult<()> {
        self.decode(form, registry).map(|_| ())
    }
}

/// Decode `data` against a list of top-level fields: a form's fields, or the
/// fields of a review action.
pub fn decode_fields(
    fields: &[ShallowFormField],
    data: &BTreeMap<String, String>,
    registry: &CompositeRegistry,
    config: &CodecConfig,
) -> SubmissionResult<Answer> {
    validate_config(config)?;
    let limits = &config.limits;

    if data.len() > limits.max_entries {
        return Err(SubmissionError::malformed(format!(
            "{} entries exceed the limit of {}",
            data.len(),
            limits.max_entries
        )));
    }

    let entries = data
        .iter()
        .map(|(key, value)| {
            if key.len() > limits.max_key_len {
                return Err(SubmissionError::malformed(format!(
                    "a key of {} bytes exceeds the limit of {}",
                    key.len(),
                    limits.max_key_len
                )));
            }
            if value.len() > limits.max_value_len {
                return Err(SubmissionError::malformed(format!(
                    "the value of '{key}' exceeds the limit of {} bytes",
                    limits.max_value_len
                )));
            }
            let segments = split_key(key)?;
            if segments.len() > limits.max_depth {
                return Err(SubmissionError::malformed(format!(
                    "the key '{key}' is nested deeper than {}",
                    limits.max_depth
                )));
            }
            Ok((segments, value.clone()))
        })
        .collect::<SubmissionResult<Vec<_>>>()?;

    let answer = Answer::assemble(entries, &FieldPath::root())?;
    debug!(entries = data.len(), "submission assembled");

    if let Err(err) = (Checker { registry, config }).check_top_level(fields, &answer) {
        warn!(error = %err, client = err.is_client_error(), "submission rejected");
        return Err(err);
    }
    Ok(answer)
}

fn split_key(key: &str) -> SubmissionResult<Vec<String>> {
    let segments: Vec<String> = key.split(KEY_SEPARATOR).map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return Err(SubmissionError::malformed(format!(
            "the key '{key}' has an empty segment"
        )));
    }
    Ok(segments)
}

/// A node of a decoded submission.
///
/// `value` is the string stored at this node's own key; `children` are keyed
/// by the next key segment. The root never carries a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answer {
    value: Option<String>,
    children: BTreeMap<String, Answer>,
}

impl Answer {
    pub fn new(value: Option<String>) -> Self {
        Self {
            value,
            children: BTreeMap::new(),
        }
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn children(&self) -> &BTreeMap<String, Answer> {
        &self.children
    }

    pub fn child(&self, key: &str) -> Option<&Answer> {
        self.children.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    pub fn with_value(self, value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..self
        }
    }

    pub fn with_child(mut self, key: impl Into<String>, child: Answer) -> Self {
        self.children.insert(key.into(), child);
        self
    }

    /// Build the tree of a flat submission map.
    pub fn from_flat(data: &BTreeMap<String, String>) -> SubmissionResult<Self> {
        let entries = data
            .iter()
            .map(|(key, value)| Ok((split_key(key)?, value.clone())))
            .collect::<SubmissionResult<Vec<_>>>()?;
        Self::assemble(entries, &FieldPath::root())
    }

    /// Group split entries by their first segment, one level at a time.
    /// An entry whose segments are exhausted is the value of the node.
    fn assemble(entries: Vec<(Vec<String>, String)>, at: &FieldPath) -> SubmissionResult<Self> {
        let mut value = None;
        let mut groups: BTreeMap<String, Vec<(Vec<String>, String)>> = BTreeMap::new();

        for (segments, raw) in entries {
            let mut segments = segments.into_iter();
            match segments.next() {
                None if value.is_some() => {
                    return Err(SubmissionError::malformed(format!(
                        "several entries share the key '{at}'"
                    )));
                }
                None => value = Some(raw),
                Some(head) => groups.entry(head).or_default().push((segments.collect(), raw)),
            }
        }

        let children = groups
            .into_iter()
            .map(|(key, group)| {
                let child = Self::assemble(group, &at.child(key.as_str()))?;
                Ok((key, child))
            })
            .collect::<SubmissionResult<BTreeMap<_, _>>>()?;

        Ok(Self { value, children })
    }

    /// The flat form of this tree. Nodes without a value produce no key.
    pub fn flatten(&self) -> BTreeMap<String, String> {
        self.children
            .iter()
            .flat_map(|(key, child)| child.flatten_under(key.clone()))
            .collect()
    }

    fn flatten_under(&self, key: String) -> Vec<(String, String)> {
        let nested = self.children.iter().flat_map(|(segment, child)| {
            child.flatten_under(format!("{key}{KEY_SEPARATOR}{segment}"))
        });
        self.value
            .iter()
            .map(|v| (key.clone(), v.clone()))
            .chain(nested)
            .collect()
    }

    /// A copy without the subtrees that hold no value at all.
    pub fn pruned(&self) -> Self {
        Self {
            value: self.value.clone(),
            children: self
                .children
                .iter()
                .map(|(key, child)| (key.clone(), child.pruned()))
                .filter(|(_, child)| !child.is_empty())
                .collect(),
        }
    }
}

struct Checker<'a> {
    registry: &'a CompositeRegistry,
    config: &'a CodecConfig,
}

impl Checker<'_> {
    fn check_top_level(&self, fields: &[ShallowFormField], root: &Answer) -> SubmissionResult<()> {
        let path = FieldPath::root();
        for field in sorted_by_order(fields) {
            debug!(field = field.id(), name = ?field.name(), "checking field");
            let occurrences = self.occurrences(field, root, &path)?;
            for (at, answer) in occurrences {
                self.check_shallow(field, answer, &at)?;
            }
        }
        self.reject_unknown(root, fields.iter().map(Ordered::id), &path)
    }

    /// The answers given to `field` under `parent`, checked against its arity.
    ///
    /// A list field (max > 1) expects one integer-keyed child per occurrence;
    /// other fields expect their value and children directly at their key.
    fn occurrences<'n>(
        &self,
        field: &impl Field,
        parent: &'n Answer,
        path: &FieldPath,
    ) -> SubmissionResult<Vec<(FieldPath, &'n Answer)>> {
        let at = path.child(field.id());
        let arity = field.arity();

        let occurrences = match parent.child(field.id()) {
            None => Vec::new(),
            Some(node) if arity.is_list() => {
                if node.value.is_some() {
                    return Err(SubmissionError::malformed(format!(
                        "the list field '{at}' takes indexed answers, not a value"
                    )));
                }
                node.children
                    .iter()
                    .map(|(index, answer)| {
                        index.parse::<u32>().map_err(|_| {
                            SubmissionError::malformed(format!(
                                "'{index}' is not a valid index for the list field '{at}'"
                            ))
                        })?;
                        Ok((at.child(index.as_str()), answer))
                    })
                    .collect::<SubmissionResult<Vec<_>>>()?
            }
            Some(node) => vec![(at.clone(), node)],
        };

        if !arity.contains(occurrences.len()) {
            return Err(SubmissionError::ArityViolation {
                path: at,
                arity,
                count: occurrences.len(),
            });
        }
        Ok(occurrences)
    }

    fn check_shallow(
        &self,
        field: &ShallowFormField,
        answer: &Answer,
        path: &FieldPath,
    ) -> SubmissionResult<()> {
        match field {
            ShallowFormField::Simple { simple, .. } => check_simple(simple.kind, answer, path),
            ShallowFormField::Union { options, .. } => {
                let (option, chosen, at) = select_option(options, answer, path)?;
                self.check_shallow(option, chosen, &at)
            }
            ShallowFormField::Composite {
                composite, fields, ..
            } => self.check_composite(composite, fields, answer, path),
        }
    }

    fn check_deep(
        &self,
        field: &DeepFormField,
        data: &DataField,
        answer: &Answer,
        path: &FieldPath,
    ) -> SubmissionResult<()> {
        match (field, data) {
            (DeepFormField::Simple { simple, .. }, DataField::Simple { .. }) => {
                check_simple(simple.kind, answer, path)
            }
            (
                DeepFormField::Union { options, .. },
                DataField::Union {
                    options: data_options,
                    ..
                },
            ) => {
                let (option, chosen, at) = select_option(options, answer, path)?;
                let data_option = data_options
                    .iter()
                    .find(|d| d.id() == option.id())
                    .ok_or_else(|| {
                        SchemaError::mismatch(&at, "the union option is not part of the composite")
                    })?;
                self.check_deep(option, data_option, chosen, &at)
            }
            (DeepFormField::Composite { fields, .. }, DataField::Composite { composite, .. }) => {
                self.check_composite(composite, fields, answer, path)
            }
            _ => Err(SchemaError::mismatch(
                path,
                format!(
                    "the form field is {} but the data field is {}",
                    field.kind(),
                    data.kind()
                ),
            )
            .into()),
        }
    }

    /// Walk the fields of the referenced composite, each narrowed by the deep
    /// field with the same id.
    fn check_composite(
        &self,
        reference: &CompositeRef,
        fields: &[DeepFormField],
        answer: &Answer,
        path: &FieldPath,
    ) -> SubmissionResult<()> {
        let composite = reference
            .id()
            .and_then(|id| self.registry.get(id))
            .ok_or_else(|| {
                SchemaError::mismatch(path, format!("the composite {reference} is not available"))
            })?;

        for data in composite.sorted_fields() {
            let deep = fields.iter().find(|f| f.id() == data.id()).ok_or_else(|| {
                SchemaError::mismatch(
                    &path.child(data.id()),
                    format!(
                        "the form does not describe field '{}' of composite '{}'",
                        data.id(),
                        composite.name
                    ),
                )
            })?;
            for (at, occurrence) in self.occurrences(deep, answer, path)? {
                self.check_deep(deep, data, occurrence, &at)?;
            }
        }

        if answer.value.is_some() {
            warn!(path = %path, "value ignored on a composite answer");
        }
        self.reject_unknown(answer, composite.fields.iter().map(Ordered::id), path)
    }

    fn reject_unknown<'k>(
        &self,
        answer: &Answer,
        known: impl Iterator<Item = &'k str>,
        path: &FieldPath,
    ) -> SubmissionResult<()> {
        if !self.config.reject_unknown_fields {
            return Ok(());
        }
        let known: Vec<&str> = known.collect();
        match answer.children.keys().find(|key| !known.contains(&key.as_str())) {
            Some(key) => Err(SubmissionError::UnknownField {
                path: path.clone(),
                key: key.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// The single option chosen in a union answer.
fn select_option<'f, 'a, T: Ordered>(
    options: &'f [T],
    answer: &'a Answer,
    path: &FieldPath,
) -> SubmissionResult<(&'f T, &'a Answer, FieldPath)> {
    let mut chosen = answer.children.iter();
    let (key, child) = match (chosen.next(), chosen.next()) {
        (Some(only), None) => only,
        _ => {
            return Err(SubmissionError::type_mismatch(
                path,
                "UNION",
                format!(
                    "exactly one option must be selected, found {}",
                    answer.children.len()
                ),
            ));
        }
    };

    let option = options.iter().find(|o| o.id() == key).ok_or_else(|| {
        SubmissionError::UnknownUnionOption {
            path: path.clone(),
            option: key.clone(),
            allowed: options.iter().map(|o| o.id().to_string()).collect(),
        }
    })?;
    Ok((option, child, path.child(key.as_str())))
}

fn check_simple(kind: SimpleType, answer: &Answer, path: &FieldPath) -> SubmissionResult<()> {
    if let Some(key) = answer.children.keys().next() {
        return Err(SubmissionError::type_mismatch(
            path,
            kind.as_str(),
            format!("a simple field has no sub-answers, found '{key}'"),
        ));
    }
    kind.validate(answer.value())
        .map(|_| ())
        .map_err(|reason| SubmissionError::type_mismatch(path, kind.as_str(), reason))
}

/// Builds an [`Answer`] field by field, without writing keys by hand.
///
/// ```
/// # use formwork_schema::{AnswerBuilder, Arity, ShallowFormField, SimpleField, SimpleType};
/// let age = ShallowFormField::simple("1", 1, "Age", SimpleField::new(SimpleType::Integer, Arity::mandatory())).unwrap();
/// let mut builder = AnswerBuilder::new();
/// builder.integer(&age, 42);
/// assert_eq!(builder.build().flatten().get("1").map(String::as_str), Some("42"));
/// ```
#[derive(Debug, Default)]
pub struct AnswerBuilder {
    answer: Answer,
}

impl AnswerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value of the node being built.
    pub fn value(&mut self, value: impl Into<String>) -> &mut Self {
        self.answer.value = Some(value.into());
        self
    }

    /// Store `value` under `field`. Messages store nothing.
    pub fn simple(&mut self, field: &impl Ordered, value: SimpleValue) -> &mut Self {
        let node = Answer::new(value.to_wire());
        self.answer.children.insert(field.id().to_string(), node);
        self
    }

    pub fn text(&mut self, field: &impl Ordered, value: impl Into<String>) -> &mut Self {
        self.simple(field, SimpleValue::Text(value.into()))
    }

    pub fn integer(&mut self, field: &impl Ordered, value: i64) -> &mut Self {
        self.simple(field, SimpleValue::Integer(value))
    }

    pub fn decimal(&mut self, field: &impl Ordered, value: f64) -> &mut Self {
        self.simple(field, SimpleValue::Decimal(value))
    }

    pub fn boolean(&mut self, field: &impl Ordered, value: bool) -> &mut Self {
        self.simple(field, SimpleValue::Boolean(value))
    }

    pub fn email(&mut self, field: &impl Ordered, value: impl Into<String>) -> &mut Self {
        self.simple(field, SimpleValue::Email(value.into()))
    }

    pub fn date(&mut self, field: &impl Ordered, value: NaiveDate) -> &mut Self {
        self.simple(field, SimpleValue::Date(value))
    }

    pub fn time(&mut self, field: &impl Ordered, value: NaiveTime) -> &mut Self {
        self.simple(field, SimpleValue::Time(value))
    }

    pub fn upload(&mut self, field: &impl Ordered, upload: impl Into<String>) -> &mut Self {
        self.simple(field, SimpleValue::Upload(upload.into()))
    }

    pub fn message(&mut self, field: &impl Ordered) -> &mut Self {
        self.simple(field, SimpleValue::Message)
    }

    /// Answer a composite field; `build` fills in its sub-fields.
    pub fn composite(
        &mut self,
        field: &impl Ordered,
        build: impl FnOnce(&mut AnswerBuilder),
    ) -> &mut Self {
        self.nested(field.id().to_string(), build)
    }

    /// Answer a list field; `build` adds the occurrences with [`item`](Self::item).
    pub fn list(&mut self, field: &impl Ordered, build: impl FnOnce(&mut AnswerBuilder)) -> &mut Self {
        self.nested(field.id().to_string(), build)
    }

    /// One occurrence of a list.
    pub fn item(&mut self, index: u32, build: impl FnOnce(&mut AnswerBuilder)) -> &mut Self {
        self.nested(index.to_string(), build)
    }

    /// Select `option` in the union `field`.
    pub fn union(
        &mut self,
        field: &impl Ordered,
        option: &impl Ordered,
        build: impl FnOnce(&mut AnswerBuilder),
    ) -> &mut Self {
        self.nested(field.id().to_string(), |union| {
            union.choose(option, build);
        })
    }

    /// Select `option` at the node being built, e.g. inside a list item of
    /// unions. An option left without any answer is stored with an empty
    /// value, so the selection survives flattening.
    pub fn choose(&mut self, option: &impl Ordered, build: impl FnOnce(&mut AnswerBuilder)) -> &mut Self {
        let mut inner = AnswerBuilder::new();
        build(&mut inner);
        let mut chosen = inner.build().pruned();
        if chosen.is_empty() {
            chosen.value = Some(String::new());
        }
        self.answer.children.insert(option.id().to_string(), chosen);
        self
    }

    fn nested(&mut self, key: String, build: impl FnOnce(&mut AnswerBuilder)) -> &mut Self {
        let mut inner = AnswerBuilder::new();
        build(&mut inner);
        self.answer.children.insert(key, inner.build());
        self
    }

    pub fn build(self) -> Answer {
        self.answer
    }

    /// Flatten into a submission for `form`.
    pub fn into_submission(self, form: &Form) -> FormSubmission {
        FormSubmission::new(form.id.clone(), self.build().flatten())
    }
}

impl Form {
    /// Build a submission for this form and check it before returning it.
    pub fn create_submission(
        &self,
        registry: &CompositeRegistry,
        build: impl FnOnce(&mut AnswerBuilder),
    ) -> SubmissionResult<FormSubmission> {
        let mut builder = AnswerBuilder::new();
        build(&mut builder);
        let submission = builder.into_submission(self);
        submission.check_validity(self, registry)?;
        Ok(submission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arity::Arity;
    use crate::simple::SimpleField;

    fn flat(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn simple(id: &str, order: u32, kind: SimpleType, arity: Arity) -> ShallowFormField {
        ShallowFormField::simple(id, order, format!("Field {id}"), SimpleField::new(kind, arity))
            .unwrap()
    }

    fn decode(fields: &[ShallowFormField], pairs: &[(&str, &str)]) -> SubmissionResult<Answer> {
        decode_fields(fields, &flat(pairs), &CompositeRegistry::default(), &CodecConfig::default())
    }

    #[test]
    fn test_assemble_groups_by_segment() {
        let answer = Answer::from_flat(&flat(&[("7:2", "Doe"), ("7:3", "Jane"), ("8", "x")])).unwrap();
        let seven = answer.child("7").unwrap();
        assert_eq!(seven.value(), None);
        assert_eq!(seven.child("2").and_then(Answer::value), Some("Doe"));
        assert_eq!(answer.child("8").and_then(Answer::value), Some("x"));
    }

    #[test]
    fn test_empty_segment_is_malformed() {
        for key in ["7::2", ":7", "7:", ""] {
            let err = Answer::from_flat(&flat(&[(key, "x")])).unwrap_err();
            assert!(matches!(err, SubmissionError::MalformedSubmission { .. }), "{key}");
        }
    }

    #[test]
    fn test_value_and_children_coexist() {
        let answer = Answer::from_flat(&flat(&[("9", ""), ("9:10", "x")])).unwrap();
        let nine = answer.child("9").unwrap();
        assert_eq!(nine.value(), Some(""));
        assert_eq!(nine.children().len(), 1);
    }

    #[test]
    fn test_flatten_drops_empty_nodes() {
        let answer = Answer::default()
            .with_child("1", Answer::new(Some("a".into())))
            .with_child("2", Answer::default().with_child("0", Answer::default()));
        assert_eq!(answer.flatten(), flat(&[("1", "a")]));
        assert_eq!(answer.pruned().children().len(), 1);
    }

    #[test]
    fn test_simple_field_checks() {
        let fields = [simple("1", 1, SimpleType::Integer, Arity::mandatory())];
        decode(&fields, &[("1", "12")]).unwrap();

        let err = decode(&fields, &[("1", "twelve")]).unwrap_err();
        assert!(matches!(err, SubmissionError::TypeMismatch { ref expected, .. } if expected == "INTEGER"));

        let err = decode(&fields, &[]).unwrap_err();
        assert!(matches!(err, SubmissionError::ArityViolation { count: 0, .. }));

        let err = decode(&fields, &[("1", "12"), ("1:0", "13")]).unwrap_err();
        assert!(matches!(err, SubmissionError::TypeMismatch { .. }));
    }

    #[test]
    fn test_list_indices_must_be_integers() {
        let fields = [simple("1", 1, SimpleType::Text, Arity::new(0, 3).unwrap())];
        decode(&fields, &[("1:0", "a"), ("1:4", "b")]).unwrap();

        let err = decode(&fields, &[("1:first", "a")]).unwrap_err();
        assert!(matches!(err, SubmissionError::MalformedSubmission { .. }));

        let err = decode(&fields, &[("1", "a")]).unwrap_err();
        assert!(matches!(err, SubmissionError::MalformedSubmission { .. }));

        let err = decode(&fields, &[("1:0", "a"), ("1:1", "b"), ("1:2", "c"), ("1:3", "d")])
            .unwrap_err();
        assert!(matches!(err, SubmissionError::ArityViolation { count: 4, .. }));
    }

    #[test]
    fn test_message_accepts_missing_value() {
        let fields = [
            ShallowFormField::simple("1", 1, "Notice", SimpleField::message()).unwrap(),
            simple("2", 2, SimpleType::Boolean, Arity::optional()),
        ];
        decode(&fields, &[]).unwrap();
        decode(&fields, &[("1", "ignored"), ("2", "false")]).unwrap();
    }

    #[test]
    fn test_top_level_unknown_key() {
        let fields = [simple("1", 1, SimpleType::Text, Arity::optional())];
        let err = decode(&fields, &[("2", "x")]).unwrap_err();
        assert_eq!(
            err,
            SubmissionError::UnknownField {
                path: FieldPath::root(),
                key: "2".into()
            }
        );
        assert!(err.is_client_error());

        let lenient = CodecConfig {
            reject_unknown_fields: false,
            ..CodecConfig::default()
        };
        decode_fields(&fields, &flat(&[("2", "x")]), &CompositeRegistry::default(), &lenient)
            .unwrap();
    }

    #[test]
    fn test_limits() {
        let fields = [simple("1", 1, SimpleType::Text, Arity::optional())];
        let mut config = CodecConfig::default();
        config.limits.max_value_len = 4;
        let err = decode_fields(&fields, &flat(&[("1", "too long")]), &CompositeRegistry::default(), &config)
            .unwrap_err();
        assert!(matches!(err, SubmissionError::MalformedSubmission { .. }));

        config.limits.max_depth = 0;
        let err = decode_fields(&fields, &flat(&[("1", "x")]), &CompositeRegistry::default(), &config)
            .unwrap_err();
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_wrong_form_is_malformed() {
        let form = Form::new("Form", Vec::new(), Vec::new()).unwrap();
        let submission = FormSubmission::new(FormId::new(), BTreeMap::new());
        let err = submission.check_validity(&form, &CompositeRegistry::default()).unwrap_err();
        assert!(matches!(err, SubmissionError::MalformedSubmission { .. }));
    }

    #[test]
    fn test_from_json() {
        let form = FormId::new();
        let raw = format!(r#"{{"form":"{form}","data":{{"1":"x"}}}}"#);
        let submission = FormSubmission::from_json(&raw).unwrap();
        assert_eq!(submission.form, form);
        assert_eq!(submission.data.get("1").map(String::as_str), Some("x"));

        let err = FormSubmission::from_json("{\"form\": 3}").unwrap_err();
        assert!(matches!(err, SubmissionError::MalformedSubmission { .. }));
    }

    #[test]
    fn test_builder_output_decodes_to_same_tree() {
        let name = simple("1", 1, SimpleType::Text, Arity::mandatory());
        let tags = simple("2", 2, SimpleType::Text, Arity::new(0, 3).unwrap());
        let note = ShallowFormField::simple("3", 3, "Note", SimpleField::message()).unwrap();

        let mut builder = AnswerBuilder::new();
        builder
            .text(&name, "Ada")
            .list(&tags, |list| {
                list.item(0, |i| {
                    i.value("math");
                })
                .item(1, |i| {
                    i.value("engines");
                });
            })
            .message(&note);
        let built = builder.build();

        let fields = [name, tags, note];
        let decoded = decode_fields(
            &fields,
            &built.flatten(),
            &CompositeRegistry::default(),
            &CodecConfig::default(),
        )
        .unwrap();
        assert_eq!(decoded, built.pruned());
        assert!(decoded.child("3").is_none());
    }

    #[test]
    fn test_builder_union_selection_survives() {
        let notice = ShallowFormField::simple("10", 1, "Nothing", SimpleField::message()).unwrap();
        let other = simple("11", 2, SimpleType::Text, Arity::mandatory());
        let union = ShallowFormField::union("9", 1, "Choice", Arity::mandatory(), vec![notice.clone(), other])
            .unwrap();

        let mut builder = AnswerBuilder::new();
        builder.union(&union, &notice, |_| {});
        let data = builder.build().flatten();
        assert_eq!(data, flat(&[("9:10", "")]));

        decode(&[union], &[("9:10", "")]).unwrap();
    }
}
