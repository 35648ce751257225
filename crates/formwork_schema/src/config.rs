//! Explicit configuration for loading definitions and decoding submissions.
//!
//! The core never reads environment variables or files; every knob is passed
//! in by the caller.

use crate::defaults::{
    DEFAULT_MAX_DEPTH, DEFAULT_MAX_ENTRIES, DEFAULT_MAX_KEY_LEN, DEFAULT_MAX_VALUE_LEN,
};
use crate::error::{FieldPath, SchemaError, SchemaResult};

/// How composite references are resolved by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Leave unknown references unresolved instead of failing.
    pub allow_not_found: bool,
    /// Skip nodes that are already resolved.
    pub lazy: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            allow_not_found: false,
            lazy: true,
        }
    }
}

impl LoadOptions {
    /// Fail on any unresolved reference and re-resolve everything.
    pub fn strict() -> Self {
        Self {
            allow_not_found: false,
            lazy: false,
        }
    }

    /// Partial loading: unknown references are kept as-is.
    pub fn partial() -> Self {
        Self {
            allow_not_found: true,
            lazy: true,
        }
    }
}

/// Upper bounds on what the decoder accepts from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionLimits {
    pub max_entries: usize,
    pub max_depth: usize,
    pub max_key_len: usize,
    pub max_value_len: usize,
}

impl Default for SubmissionLimits {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_depth: DEFAULT_MAX_DEPTH,
            max_key_len: DEFAULT_MAX_KEY_LEN,
            max_value_len: DEFAULT_MAX_VALUE_LEN,
        }
    }
}

/// Submission decoding configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfig {
    pub limits: SubmissionLimits,
    /// Reject answers whose key matches no declared field.
    pub reject_unknown_fields: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            limits: SubmissionLimits::default(),
            reject_unknown_fields: true,
        }
    }
}

/// Validate a codec configuration before use.
pub fn validate_config(cfg: &CodecConfig) -> SchemaResult<()> {
    let path = FieldPath::root().child("limits");

    if cfg.limits.max_entries == 0 {
        return Err(SchemaError::invalid(
            &path,
            "max_entries must be greater than zero",
        ));
    }

    if cfg.limits.max_depth == 0 {
        return Err(SchemaError::invalid(
            &path,
            "max_depth must be greater than zero",
        ));
    }

    if cfg.limits.max_key_len == 0 {
        return Err(SchemaError::invalid(
            &path,
            "max_key_len must be greater than zero",
        ));
    }

    Ok(())
}
