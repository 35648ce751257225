//! End-to-end tests for the review of submitted records.

use formwork_schema::{
    Action, AnswerBuilder, Arity, CompositeStore, Form, FormStore, MemoryStore, Record, RecordState,
    ReviewError, ReviewRequest, ShallowFormField, SimpleField, SimpleType,
};

fn field(id: &str, order: u32, name: &str, kind: SimpleType) -> ShallowFormField {
    ShallowFormField::simple(id, order, name, SimpleField::new(kind, Arity::mandatory())).unwrap()
}

fn permit_form(store: &MemoryStore) -> Form {
    let draft = Form::new(
        "Building permit",
        vec![field("1", 1, "Address", SimpleType::Text)],
        vec![
            Action::new("intake", 1, "Intake", "front desk").unwrap(),
            Action::new("inspection", 2, "Inspection", "inspectors")
                .unwrap()
                .with_fields(vec![field("ok", 1, "Compliant", SimpleType::Boolean)])
                .unwrap(),
            Action::new("granted", 3, "Granted", "archive").unwrap(),
        ],
    )
    .unwrap();
    store.create_form(&draft).unwrap()
}

#[test]
fn test_full_review_path() {
    let store = MemoryStore::new();
    let form = permit_form(&store);
    let registry = store.registry().unwrap();

    let submission = form
        .create_submission(&registry, |b| {
            b.text(&form.fields[0], "1 Main Street");
        })
        .unwrap();
    let record = Record::open(&form, &registry, submission).unwrap();
    assert_eq!(record.current_action(&form).map(|a| a.name.as_str()), Some("Intake"));

    let next = form.next_action("intake").unwrap();
    let record = record
        .review(&form, &registry, ReviewRequest::move_to(next.id.clone()).with_assignee("bob"))
        .unwrap();
    assert_eq!(record.state, RecordState::Action("inspection".into()));

    let inspection = form.action("inspection").unwrap();
    let mut builder = AnswerBuilder::new();
    builder.boolean(&inspection.fields[0], true);
    let review_fields = builder.into_submission(&form);

    let record = record
        .review(
            &form,
            &registry,
            ReviewRequest::move_to("granted").with_fields(review_fields.clone()),
        )
        .unwrap();

    assert_eq!(record.state, RecordState::Action("granted".into()));
    assert_eq!(record.history.len(), 3);
    let last = record.history.last().unwrap();
    assert_eq!(last.previous_state, Some(RecordState::Action("inspection".into())));
    assert_eq!(last.fields.as_ref(), Some(&review_fields));
    assert!(form.next_action("granted").is_none());
}

#[test]
fn test_inspection_fields_checked() {
    let store = MemoryStore::new();
    let form = permit_form(&store);
    let registry = store.registry().unwrap();

    let submission = form
        .create_submission(&registry, |b| {
            b.text(&form.fields[0], "2 Side Road");
        })
        .unwrap();
    let record = Record::open(&form, &registry, submission)
        .and_then(|r| r.review(&form, &registry, ReviewRequest::move_to("inspection")))
        .unwrap();

    let mut bad = AnswerBuilder::new();
    bad.text(&form.action("inspection").unwrap().fields[0], "maybe");
    let err = record
        .review(
            &form,
            &registry,
            ReviewRequest::move_to("granted").with_fields(bad.into_submission(&form)),
        )
        .unwrap_err();
    assert!(matches!(err, ReviewError::Submission(_)));

    // Refusing does not need the inspection fields.
    let refused = record
        .review(&form, &registry, ReviewRequest::refuse("not compliant").with_assignee("eve"))
        .unwrap();
    assert_eq!(refused.state, RecordState::Refused);

    let err = refused
        .review(&form, &registry, ReviewRequest::refuse("again"))
        .unwrap_err();
    assert!(matches!(err, ReviewError::AlreadyInState(RecordState::Refused)));
}

#[test]
fn test_form_without_actions_cannot_open_records() {
    let store = MemoryStore::new();
    let form = store
        .create_form(
            &Form::new("No review", vec![field("1", 1, "Name", SimpleType::Text)], Vec::new()).unwrap(),
        )
        .unwrap();
    let registry = store.registry().unwrap();
    let submission = form
        .create_submission(&registry, |b| {
            b.text(&form.fields[0], "x");
        })
        .unwrap();

    let err = Record::open(&form, &registry, submission).unwrap_err();
    assert!(matches!(err, ReviewError::NoActions(_)));
    assert!(!err.is_client_error());
}
