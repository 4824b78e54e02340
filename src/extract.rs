//! Strict JSON extraction from free-form completion text.
//!
//! Model output is often wrapped in a fenced code block; one leading and one
//! trailing fence marker are stripped before parsing. Nothing else is
//! repaired: no trailing-comma fixup, no brace balancing. Malformed residual
//! text is a hard failure for the caller to handle.

use serde::de::DeserializeOwned;

use crate::error::SynthesisError;

/// Strip one leading and one trailing code-fence marker, if present.
fn strip_code_fence(text: &str) -> &str {
    let mut stripped = text.trim();
    if let Some(rest) = stripped.strip_prefix("```json") {
        stripped = rest;
    } else if let Some(rest) = stripped.strip_prefix("```") {
        stripped = rest;
    }
    if let Some(rest) = stripped.trim_end().strip_suffix("```") {
        stripped = rest;
    }
    stripped.trim()
}

/// Parse completion text into a structured value.
pub fn extract_json<T: DeserializeOwned>(raw: &str) -> Result<T, SynthesisError> {
    let stripped = strip_code_fence(raw);
    serde_json::from_str(stripped).map_err(|e| SynthesisError::malformed(&e, stripped))
}
