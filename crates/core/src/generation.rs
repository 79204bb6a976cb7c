//! Generation request constants and validation.
//!
//! Pure functions shared by the dispatcher and the tool handlers. Kept in
//! `core` so request validation never touches broker state.

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Aspect ratio used when the caller does not supply one.
pub const DEFAULT_RATIO: &str = "2:3";

/// Task type echoed to workers in the dispatch payload.
pub const DEFAULT_TASK_TYPE: &str = "image";

/// How long a dispatched task may stay pending before it times out.
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 120;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a generation prompt.
///
/// The only rule is that it must not be empty or whitespace-only.
pub fn validate_prompt(prompt: &str) -> Result<(), CoreError> {
    if prompt.trim().is_empty() {
        return Err(CoreError::Validation("Prompt cannot be empty".to_string()));
    }
    Ok(())
}

/// Validate a reference image URL for edit-style jobs.
///
/// Rules:
/// - Must not be empty.
/// - Must parse as an absolute URL with an `http` or `https` scheme and a host.
pub fn validate_reference_url(reference: &str) -> Result<(), CoreError> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(CoreError::Validation(
            "Reference picture URL cannot be empty".to_string(),
        ));
    }

    let invalid =
        || CoreError::Validation("Reference picture must be a valid HTTP/HTTPS URL".to_string());

    let parsed = url::Url::parse(reference).map_err(|_| invalid())?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(invalid());
    }
    Ok(())
}

/// Normalise an optional caller-supplied ratio, falling back to [`DEFAULT_RATIO`].
pub fn resolve_ratio(ratio: Option<&str>) -> String {
    match ratio.map(str::trim) {
        Some(r) if !r.is_empty() => r.to_string(),
        _ => DEFAULT_RATIO.to_string(),
    }
}
