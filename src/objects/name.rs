//! Class name validation
//!
//! Class names are identifiers, optionally namespaced with dots:
//! - One or more segments separated by `.`
//! - Each segment: `[A-Za-z_][A-Za-z0-9_]*`
//! - Max 255 characters total
//! - Case-sensitive, never normalized
//! - Must not shadow an intrinsic type name such as `number` or `table`

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Intrinsic type names a class may not take
pub const INTRINSIC_TYPE_NAMES: &[&str] = &[
    "nil", "boolean", "number", "string", "table", "function", "thread", "userdata",
    "instance",
];

/// Validation errors for class names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// Name is empty
    Empty,
    /// Name is too long (> 255 chars)
    TooLong,
    /// Name contains an empty segment (leading, trailing or doubled dot)
    EmptySegment,
    /// Segment contains invalid characters or starts with a digit
    InvalidSegment(String),
    /// Name collides with an intrinsic type name
    Intrinsic(String),
}

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameError::Empty => write!(f, "Class name cannot be empty"),
            NameError::TooLong => write!(f, "Class name must be 255 characters or less"),
            NameError::EmptySegment => {
                write!(f, "Class name cannot contain empty segments")
            }
            NameError::InvalidSegment(seg) => {
                write!(
                    f,
                    "Segment '{}' is not an identifier (letters, digits, underscores; no leading digit)",
                    seg
                )
            }
            NameError::Intrinsic(name) => {
                write!(f, "'{}' is an intrinsic type name", name)
            }
        }
    }
}

impl std::error::Error for NameError {}

static SEGMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// Validate a class name.
///
/// # Examples
/// ```
/// use classreg::objects::validate_class_name;
///
/// assert!(validate_class_name("Animal").is_ok());
/// assert!(validate_class_name("game.items.Sword").is_ok());
///
/// assert!(validate_class_name("").is_err());
/// assert!(validate_class_name("1st").is_err());
/// assert!(validate_class_name("game..Sword").is_err());
/// assert!(validate_class_name("number").is_err());
/// ```
pub fn validate_class_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }

    if name.len() > 255 {
        return Err(NameError::TooLong);
    }

    if INTRINSIC_TYPE_NAMES.contains(&name) {
        return Err(NameError::Intrinsic(name.to_string()));
    }

    for segment in name.split('.') {
        if segment.is_empty() {
            return Err(NameError::EmptySegment);
        }
        if !SEGMENT_REGEX.is_match(segment) {
            return Err(NameError::InvalidSegment(segment.to_string()));
        }
    }

    Ok(())
}
