//! Review of submitted records.
//!
//! A record starts in the first action of its form and moves between actions
//! until it is refused or reaches the last one. Every move is kept in the
//! record history, together with the fields the reviewer had to fill in.

use chrono::{DateTime, Utc};
use formwork_ids::{FormId, RecordId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::CodecConfig;
use crate::error::SubmissionError;
use crate::form::{Action, Form};
use crate::registry::CompositeRegistry;
use crate::submission::{decode_fields, FormSubmission};

/// Where a record stands in the review.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "action", rename_all = "snake_case")]
pub enum RecordState {
    /// Waiting for the reviewers of this action.
    Action(String),
    Refused,
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordState::Action(id) => write!(f, "action '{id}'"),
            RecordState::Refused => write!(f, "refused"),
        }
    }
}

/// One move in the life of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordStateTransition {
    pub timestamp: DateTime<Utc>,
    /// `None` for the transition that opened the record.
    pub previous_state: Option<RecordState>,
    pub next_state: RecordState,
    pub assignee: Option<String>,
    pub reason: Option<String>,
    /// Answers to the fields of the action being left.
    pub fields: Option<FormSubmission>,
}

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Form {0} is closed")]
    FormClosed(FormId),

    #[error("Form {0} declares no review action")]
    NoActions(FormId),

    #[error("Record belongs to form {record}, not {form}")]
    WrongForm { record: FormId, form: FormId },

    #[error("Unknown action '{0}'")]
    UnknownAction(String),

    #[error("A reason is required to refuse a record")]
    ReasonRequired,

    #[error("Action '{0}' requires its fields to be filled in")]
    MissingFields(String),

    #[error("Record is already {0}")]
    AlreadyInState(RecordState),

    #[error("Invalid submission: {0}")]
    Submission(#[from] SubmissionError),
}

impl ReviewError {
    /// Whether the caller can fix the request, as opposed to a broken form.
    pub fn is_client_error(&self) -> bool {
        match self {
            ReviewError::Submission(inner) => inner.is_client_error(),
            ReviewError::NoActions(_) => false,
            _ => true,
        }
    }
}

/// A request to move a record.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRequest {
    pub next_state: RecordState,
    pub assignee: Option<String>,
    pub reason: Option<String>,
    pub fields: Option<FormSubmission>,
}

impl ReviewRequest {
    pub fn move_to(action: impl Into<String>) -> Self {
        Self {
            next_state: RecordState::Action(action.into()),
            assignee: None,
            reason: None,
            fields: None,
        }
    }

    pub fn refuse(reason: impl Into<String>) -> Self {
        Self {
            next_state: RecordState::Refused,
            assignee: None,
            reason: Some(reason.into()),
            fields: None,
        }
    }

    pub fn with_assignee(self, assignee: impl Into<String>) -> Self {
        Self {
            assignee: Some(assignee.into()),
            ..self
        }
    }

    pub fn with_reason(self, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..self
        }
    }

    pub fn with_fields(self, fields: FormSubmission) -> Self {
        Self {
            fields: Some(fields),
            ..self
        }
    }
}

/// A submission under review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub form: FormId,
    pub state: RecordState,
    pub submission: FormSubmission,
    pub history: Vec<RecordStateTransition>,
}

impl Record {
    /// Check `submission` against `form` and open a record in the first action.
    pub fn open(
        form: &Form,
        registry: &CompositeRegistry,
        submission: FormSubmission,
    ) -> Result<Self, ReviewError> {
        if !form.open {
            return Err(ReviewError::FormClosed(form.id.clone()));
        }
        let first = form
            .first_action()
            .ok_or_else(|| ReviewError::NoActions(form.id.clone()))?;
        submission.check_validity(form, registry)?;

        let state = RecordState::Action(first.id.clone());
        let record = Self {
            id: RecordId::new(),
            form: form.id.clone(),
            state: state.clone(),
            submission,
            history: vec![RecordStateTransition {
                timestamp: Utc::now(),
                previous_state: None,
                next_state: state,
                assignee: None,
                reason: None,
                fields: None,
            }],
        };

        info!(record = %record.id, form = %form.id, action = %first.id, "record opened");
        Ok(record)
    }

    /// Apply `request` and return the updated record. `self` is untouched.
    pub fn review(
        &self,
        form: &Form,
        registry: &CompositeRegistry,
        request: ReviewRequest,
    ) -> Result<Self, ReviewError> {
        if self.form != form.id {
            return Err(ReviewError::WrongForm {
                record: self.form.clone(),
                form: form.id.clone(),
            });
        }
        if request.next_state == self.state {
            return Err(ReviewError::AlreadyInState(self.state.clone()));
        }

        match &request.next_state {
            RecordState::Action(id) if form.action(id).is_none() => {
                return Err(ReviewError::UnknownAction(id.clone()));
            }
            RecordState::Refused
                if request.reason.as_deref().map_or(true, |r| r.trim().is_empty()) =>
            {
                return Err(ReviewError::ReasonRequired);
            }
            _ => {}
        }

        if let RecordState::Action(current) = &self.state {
            let action = form
                .action(current)
                .ok_or_else(|| ReviewError::UnknownAction(current.clone()))?;
            let leaving_forward = request.next_state != RecordState::Refused;
            if leaving_forward && !action.fields.is_empty() {
                let fields = request
                    .fields
                    .as_ref()
                    .ok_or_else(|| ReviewError::MissingFields(action.id.clone()))?;
                if fields.form != form.id {
                    return Err(SubmissionError::malformed(format!(
                        "the review fields target form {}, not {}",
                        fields.form, form.id
                    ))
                    .into());
                }
                decode_fields(&action.fields, &fields.data, registry, &CodecConfig::default())?;
            }
        }

        let transition = RecordStateTransition {
            timestamp: Utc::now(),
            previous_state: Some(self.state.clone()),
            next_state: request.next_state.clone(),
            assignee: request.assignee,
            reason: request.reason,
            fields: request.fields,
        };

        info!(
            record = %self.id,
            from = %self.state,
            to = %transition.next_state,
            "record reviewed"
        );

        let mut history = self.history.clone();
        history.push(transition);
        Ok(Self {
            state: request.next_state,
            history,
            ..self.clone()
        })
    }

    /// The action the record waits in, `None` once refused.
    pub fn current_action<'f>(&self, form: &'f Form) -> Option<&'f Action> {
        match &self.state {
            RecordState::Action(id) => form.action(id),
            RecordState::Refused => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arity::Arity;
    use crate::form::ShallowFormField;
    use crate::simple::{SimpleField, SimpleType};
    use std::collections::BTreeMap;

    fn form() -> Form {
        let comment = ShallowFormField::simple(
            "c",
            1,
            "Comment",
            SimpleField::new(SimpleType::Text, Arity::mandatory()),
        )
        .unwrap();
        Form::new(
            "Request",
            vec![ShallowFormField::simple(
                "1",
                1,
                "Name",
                SimpleField::new(SimpleType::Text, Arity::mandatory()),
            )
            .unwrap()],
            vec![
                Action::new("intake", 1, "Intake", "desk")
                    .unwrap()
                    .with_fields(vec![comment])
                    .unwrap(),
                Action::new("done", 2, "Done", "desk").unwrap(),
            ],
        )
        .unwrap()
    }

    fn submission(form: &Form, pairs: &[(&str, &str)]) -> FormSubmission {
        FormSubmission::new(
            form.id.clone(),
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    fn opened(form: &Form) -> Record {
        Record::open(form, &CompositeRegistry::default(), submission(form, &[("1", "Jane")])).unwrap()
    }

    #[test]
    fn test_open_starts_at_first_action() {
        let form = form();
        let record = opened(&form);
        assert_eq!(record.state, RecordState::Action("intake".into()));
        assert_eq!(record.history.len(), 1);
        assert_eq!(record.history[0].previous_state, None);
    }

    #[test]
    fn test_open_rejects_invalid_submission() {
        let form = form();
        let err = Record::open(&form, &CompositeRegistry::default(), submission(&form, &[]))
            .unwrap_err();
        assert!(matches!(err, ReviewError::Submission(SubmissionError::ArityViolation { .. })));

        let closed = form.with_open(false);
        let err = Record::open(&closed, &CompositeRegistry::default(), submission(&closed, &[("1", "x")]))
            .unwrap_err();
        assert!(matches!(err, ReviewError::FormClosed(_)));
    }

    #[test]
    fn test_forward_needs_fields() {
        let form = form();
        let record = opened(&form);
        let registry = CompositeRegistry::default();

        let err = record
            .review(&form, &registry, ReviewRequest::move_to("done"))
            .unwrap_err();
        assert!(matches!(err, ReviewError::MissingFields(ref id) if id == "intake"));

        let err = record
            .review(
                &form,
                &registry,
                ReviewRequest::move_to("done").with_fields(submission(&form, &[("x", "y")])),
            )
            .unwrap_err();
        assert!(matches!(err, ReviewError::Submission(_)));

        let moved = record
            .review(
                &form,
                &registry,
                ReviewRequest::move_to("done")
                    .with_assignee("alice")
                    .with_fields(submission(&form, &[("c", "looks fine")])),
            )
            .unwrap();
        assert_eq!(moved.state, RecordState::Action("done".into()));
        assert_eq!(moved.history.len(), 2);
        assert_eq!(record.history.len(), 1);
    }

    #[test]
    fn test_refusal_needs_reason() {
        let form = form();
        let record = opened(&form);
        let registry = CompositeRegistry::default();

        let err = record
            .review(&form, &registry, ReviewRequest::refuse("  "))
            .unwrap_err();
        assert!(matches!(err, ReviewError::ReasonRequired));

        let refused = record
            .review(&form, &registry, ReviewRequest::refuse("incomplete"))
            .unwrap();
        assert_eq!(refused.state, RecordState::Refused);
        assert!(refused.current_action(&form).is_none());
    }

    #[test]
    fn test_unknown_action() {
        let form = form();
        let record = opened(&form);
        let err = record
            .review(&form, &CompositeRegistry::default(), ReviewRequest::move_to("nowhere"))
            .unwrap_err();
        assert!(matches!(err, ReviewError::UnknownAction(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&RecordState::Action("intake".into())).unwrap();
        assert_eq!(json, r#"{"type":"action","action":"intake"}"#);
        let json = serde_json::to_string(&RecordState::Refused).unwrap();
        assert_eq!(json, r#"{"type":"refused"}"#);
    }
}
