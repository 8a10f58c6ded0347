//! Model identifier normalization.
//!
//! The gateway reports provider-specific ids (e.g. `claude-opus-4-5-thinking`)
//! that clients reject. These are mapped to the canonical dated ids.

/// Source id to canonical id. Lookups are exact and case-sensitive.
pub const MODEL_ID_MAP: &[(&str, &str)] = &[
    ("claude-sonnet-4-5-thinking", "claude-sonnet-4-5-20250929"),
    ("claude-opus-4-5-thinking", "claude-opus-4-5-20251101"),
    ("claude-sonnet-4-5", "claude-sonnet-4-5-20250929"),
    ("claude-opus-4-5", "claude-opus-4-5-20251101"),
];

/// Canonical id for `model`, or `model` itself when it is not in the table.
pub fn normalize_model_id(model: &str) -> &str {
    MODEL_ID_MAP
        .iter()
        .find(|(source, _)| *source == model)
        .map_or(model, |&(_, target)| target)
}
