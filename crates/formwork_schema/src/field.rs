//! Shared view over the three field trees and the sibling invariants they obey.
//!
//! Composite data fields, shallow form fields and deep form fields have the
//! same shape (simple leaf, union of options, composite reference). The
//! [`Field`] trait exposes that shape so the ordering and arity rules are
//! written once.

use std::collections::BTreeSet;

use crate::arity::Arity;
use crate::defaults::KEY_SEPARATOR;
use crate::error::{FieldPath, SchemaError, SchemaResult};
use crate::simple::SimpleType;

/// Id of a field. Unique among siblings only.
pub type FieldId = String;

/// Anything kept in an ordered list of siblings: fields, union options,
/// review actions.
pub trait Ordered {
    fn id(&self) -> &str;
    fn order(&self) -> u32;
}

/// Discriminant of a field, used in messages and kind comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Simple(SimpleType),
    Union,
    Composite,
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Simple(kind) => write!(f, "{kind}"),
            FieldKind::Union => write!(f, "UNION"),
            FieldKind::Composite => write!(f, "COMPOSITE"),
        }
    }
}

/// A node of a field tree.
pub trait Field: Ordered {
    /// Display name. Deep form fields return the name of the data field they
    /// narrow, or `None` before they are loaded.
    fn name(&self) -> Option<&str>;

    fn arity(&self) -> Arity;

    fn kind(&self) -> FieldKind;
}

/// Check that `items` have pairwise distinct ids and pairwise distinct
/// orders. Reports the first offending item.
pub fn check_order_validity<T: Ordered>(items: &[T], path: &FieldPath) -> SchemaResult<()> {
    let mut ids = BTreeSet::new();
    let mut orders = BTreeSet::new();

    for item in items {
        if !ids.insert(item.id()) {
            return Err(SchemaError::invalid(
                &path.child(item.id()),
                format!("the id '{}' appears several times among siblings", item.id()),
            ));
        }
        if !orders.insert(item.order()) {
            return Err(SchemaError::invalid(
                &path.child(item.id()),
                format!("the order {} is shared with another sibling", item.order()),
            ));
        }
    }

    Ok(())
}

/// `items` sorted by their `order`, the display and validation order.
pub fn sorted_by_order<T: Ordered>(items: &[T]) -> Vec<&T> {
    let mut sorted: Vec<&T> = items.iter().collect();
    sorted.sort_by_key(|item| item.order());
    sorted
}

/// Ids end up as submission key segments: they must be non-blank and must
/// not contain the separator.
pub fn check_field_id(id: &str, path: &FieldPath) -> SchemaResult<()> {
    if id.trim().is_empty() {
        return Err(SchemaError::invalid(path, "a field id must not be blank"));
    }
    if id.contains(KEY_SEPARATOR) {
        return Err(SchemaError::invalid(
            path,
            format!("the field id '{id}' must not contain '{KEY_SEPARATOR}'"),
        ));
    }
    Ok(())
}

pub fn check_name(name: &str, path: &FieldPath) -> SchemaResult<()> {
    if name.trim().is_empty() {
        return Err(SchemaError::invalid(
            path,
            format!("the name must not be blank: '{name}'"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item(&'static str, u32);

    impl Ordered for Item {
        fn id(&self) -> &str {
            self.0
        }

        fn order(&self) -> u32 {
            self.1
        }
    }

    #[test]
    fn test_distinct_items_pass() {
        let items = [Item("a", 2), Item("b", 1), Item("c", 3)];
        check_order_validity(&items, &FieldPath::root()).unwrap();

        let sorted: Vec<&str> = sorted_by_order(&items).iter().map(|i| i.id()).collect();
        assert_eq!(sorted, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_duplicate_order_fails() {
        let items = [Item("a", 1), Item("b", 1)];
        let err = check_order_validity(&items, &FieldPath::root()).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidDefinition { ref path, .. } if path.last() == Some("b")));
    }

    #[test]
    fn test_duplicate_id_fails() {
        let items = [Item("a", 1), Item("a", 2)];
        assert!(check_order_validity(&items, &FieldPath::root()).is_err());
    }

    #[test]
    fn test_field_id_rules() {
        let root = FieldPath::root();
        check_field_id("12", &root).unwrap();
        assert!(check_field_id(" ", &root).is_err());
        assert!(check_field_id("a:b", &root).is_err());
        assert!(check_name("", &root).is_err());
    }
}
