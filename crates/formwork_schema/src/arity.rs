//! Cardinality constraints on field occurrences.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::{FieldPath, SchemaError, SchemaResult};

/// A closed interval `[min, max]` of allowed occurrences.
///
/// The invariant `min <= max` holds for every value of this type: it is
/// checked by [`Arity::new`] and on deserialization, and every clamping
/// operation keeps it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawArity", into = "RawArity")]
pub struct Arity {
    min: u32,
    max: u32,
}

#[derive(Serialize, Deserialize)]
struct RawArity {
    min: i64,
    max: i64,
}

impl TryFrom<RawArity> for Arity {
    type Error = SchemaError;

    fn try_from(raw: RawArity) -> Result<Self, Self::Error> {
        let min = u32::try_from(raw.min).map_err(|_| {
            SchemaError::invalid(
                &FieldPath::root(),
                format!("arity bounds must be non-negative, got min={}", raw.min),
            )
        })?;
        let max = u32::try_from(raw.max).map_err(|_| {
            SchemaError::invalid(
                &FieldPath::root(),
                format!("arity bounds must be non-negative, got max={}", raw.max),
            )
        })?;
        Arity::new(min, max)
    }
}

impl From<Arity> for RawArity {
    fn from(arity: Arity) -> Self {
        RawArity {
            min: i64::from(arity.min),
            max: i64::from(arity.max),
        }
    }
}

impl Arity {
    pub fn new(min: u32, max: u32) -> SchemaResult<Self> {
        if min > max {
            return Err(SchemaError::invalid(
                &FieldPath::root(),
                format!("arity min ({min}) must not exceed max ({max})"),
            ));
        }
        Ok(Self { min, max })
    }

    /// Zero occurrences: the field is hidden.
    pub const fn forbidden() -> Self {
        Self { min: 0, max: 0 }
    }

    pub const fn optional() -> Self {
        Self { min: 0, max: 1 }
    }

    pub const fn mandatory() -> Self {
        Self { min: 1, max: 1 }
    }

    /// A repeated field; `max` must be greater than 1.
    pub fn list(min: u32, max: u32) -> SchemaResult<Self> {
        if max <= 1 {
            return Err(SchemaError::invalid(
                &FieldPath::root(),
                format!("a list arity needs max > 1, got {max}"),
            ));
        }
        Self::new(min, max)
    }

    pub fn min(&self) -> u32 {
        self.min
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn range(&self) -> RangeInclusive<u32> {
        self.min..=self.max
    }

    pub fn contains(&self, count: usize) -> bool {
        u32::try_from(count).map_or(false, |n| self.range().contains(&n))
    }

    pub fn is_forbidden(&self) -> bool {
        self.max == 0
    }

    pub fn is_mandatory(&self) -> bool {
        self.min >= 1
    }

    /// Several occurrences are allowed; each one gets its own index segment.
    pub fn is_list(&self) -> bool {
        self.max > 1
    }

    /// `true` if every count allowed by `self` is allowed by `outer`.
    pub fn is_within(&self, outer: &Arity) -> bool {
        outer.min <= self.min && self.max <= outer.max
    }

    /// Lower `min` to at most `value`.
    pub fn expand_min(self, value: u32) -> Self {
        Self {
            min: self.min.min(value),
            max: self.max,
        }
    }

    /// Raise `min` to at least `value`, pushing `max` up if needed.
    pub fn truncate_min(self, value: u32) -> Self {
        let min = self.min.max(value);
        Self {
            min,
            max: self.max.max(min),
        }
    }

    /// Raise `max` to at least `value`.
    pub fn expand_max(self, value: u32) -> Self {
        Self {
            min: self.min,
            max: self.max.max(value),
        }
    }

    /// Lower `max` to at most `value`, pulling `min` down if needed.
    pub fn truncate_max(self, value: u32) -> Self {
        let max = self.max.min(value);
        Self {
            min: self.min.min(max),
            max,
        }
    }

    /// Clamp into `outer`, as done when a data field's arity changes and the
    /// form fields narrowing it must follow.
    pub fn clamp_within(self, outer: &Arity) -> Self {
        self.truncate_min(outer.min).truncate_max(outer.max)
    }
}

impl Default for Arity {
    fn default() -> Self {
        Self::mandatory()
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (0, 0) => write!(f, "forbidden"),
            (0, 1) => write!(f, "optional"),
            (1, 1) => write!(f, "mandatory"),
            (min, max) => write!(f, "[{min}, {max}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_constants() {
        assert_eq!(Arity::forbidden().range(), 0..=0);
        assert_eq!(Arity::optional().range(), 0..=1);
        assert_eq!(Arity::mandatory().range(), 1..=1);
        assert!(Arity::list(0, 5).unwrap().is_list());
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        assert!(Arity::new(3, 1).is_err());
        assert!(Arity::list(0, 1).is_err());
        assert!(serde_json::from_str::<Arity>(r#"{"min":-1,"max":2}"#).is_err());
        assert!(serde_json::from_str::<Arity>(r#"{"min":2,"max":1}"#).is_err());
    }

    #[test]
    fn test_contains() {
        let arity = Arity::new(1, 3).unwrap();
        assert!(!arity.contains(0));
        assert!(arity.contains(1));
        assert!(arity.contains(3));
        assert!(!arity.contains(4));
    }

    #[test]
    fn test_clamping_keeps_invariant() {
        let arity = Arity::new(2, 5).unwrap();
        assert_eq!(arity.truncate_max(1), Arity::new(1, 1).unwrap());
        assert_eq!(arity.truncate_min(7), Arity::new(7, 7).unwrap());
        assert_eq!(arity.expand_min(0), Arity::new(0, 5).unwrap());
        assert_eq!(arity.expand_max(9), Arity::new(2, 9).unwrap());
    }

    #[test]
    fn test_clamp_within_parent() {
        let parent = Arity::new(1, 3).unwrap();
        let child = Arity::new(0, 10).unwrap().clamp_within(&parent);
        assert_eq!(child, parent);
        assert!(child.is_within(&parent));
        assert!(!Arity::new(0, 1).unwrap().is_within(&parent));
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&Arity::optional()).unwrap();
        assert_eq!(json, r#"{"min":0,"max":1}"#);
    }
}
