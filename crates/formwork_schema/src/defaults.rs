//! Canonical constants shared by definitions and the submission wire format.

/// Reference id meaning "the composite currently being defined".
///
/// It contains the key separator, so it can never collide with a real id.
pub const RECURSION_TOKEN: &str = "special:myself";

/// Separator between segments of a flattened submission key.
pub const KEY_SEPARATOR: char = ':';

pub const DEFAULT_MAX_ENTRIES: usize = 10_000;
pub const DEFAULT_MAX_DEPTH: usize = 64;
pub const DEFAULT_MAX_KEY_LEN: usize = 1_024;
pub const DEFAULT_MAX_VALUE_LEN: usize = 64 * 1024;
