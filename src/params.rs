//! Request parameter normalization.
//!
//! Turns an untrusted query bag into a [`TransformDescriptor`]. Malformed
//! input never fails; it degrades to defaults:
//!
//! | Raw | Normalized |
//! |---|---|
//! | `original=1` | bypass; every other field ignored |
//! | `webp=1` | `webp = true`; any other value or absence is `false` |
//! | `width=512` | `Some(512)` |
//! | `width=abc`, `0`, `-5`, `inf`, `12.5` | `None` |

use std::collections::HashMap;

/// Raw, string-typed request parameters as they arrive from a query string.
///
/// Built from the query map rather than deserialized directly, so repeated
/// or unknown keys never reject a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawParams {
    pub original: Option<String>,
    pub webp: Option<String>,
    pub width: Option<String>,
}

impl RawParams {
    pub fn is_original(&self) -> bool {
        self.original.as_deref() == Some("1")
    }
}

impl From<&HashMap<String, String>> for RawParams {
    fn from(map: &HashMap<String, String>) -> Self {
        Self {
            original: map.get("original").cloned(),
            webp: map.get("webp").cloned(),
            width: map.get("width").cloned(),
        }
    }
}

/// Validated transform parameters for one derivative.
///
/// `width: None` means "unspecified": the transcode applies the default
/// width, but the cache key omits the width segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TransformDescriptor {
    pub original: bool,
    pub width: Option<u32>,
    pub webp: bool,
}

impl TransformDescriptor {
    /// Descriptor for a derivative (never the original).
    pub fn derivative(width: Option<u32>, webp: bool) -> Self {
        Self {
            original: false,
            width,
            webp,
        }
    }

    /// The bypass descriptor.
    pub fn original() -> Self {
        Self {
            original: true,
            width: None,
            webp: false,
        }
    }
}

/// Normalize raw parameters. Never fails.
pub fn normalize(raw: &RawParams) -> TransformDescriptor {
    if raw.is_original() {
        return TransformDescriptor::original();
    }
    TransformDescriptor::derivative(
        raw.width.as_deref().and_then(parse_width),
        raw.webp.as_deref() == Some("1"),
    )
}

/// Numeric coercion of a raw width.
///
/// Accepts anything that parses as a finite, strictly positive number with
/// no fractional part and fits in `u32` (`"512"`, `" 512 "`, `"1e3"`).
fn parse_width(raw: &str) -> Option<u32> {
    let value: f64 = raw.trim().parse().ok()?;
    if !value.is_finite() || value <= 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
        return None;
    }
    Some(value as u32)
}
