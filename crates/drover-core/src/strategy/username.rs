//! Username candidate generation for the rename smart-retry path.

pub const CANDIDATE_LIMIT: usize = 5;

/// Failure descriptions the provider emits when a handle is unavailable.
/// Matching is substring on the lowercased text; the provider does not
/// document an authoritative catalog.
const TAKEN_NEEDLES: [&str; 3] = [
    "username is already taken",
    "username taken",
    "username not available",
];

pub fn is_taken_desc(desc: &str) -> bool {
    let lowered = desc.to_lowercase();
    TAKEN_NEEDLES.iter().any(|needle| lowered.contains(needle))
}

/// Derives handle candidates from a display name: the squashed lowercase
/// base followed by numbered variants.
pub fn generate_candidates(display_name: &str, limit: usize) -> Vec<String> {
    let base: String = display_name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    if base.is_empty() {
        return Vec::new();
    }
    let mut candidates = Vec::with_capacity(limit + 1);
    candidates.push(base.clone());
    for i in 1..=limit {
        candidates.push(format!("{base}_{i}"));
    }
    candidates
}
