pub mod company;
pub mod conversation;
pub mod employee;

/// Canonical form of an identifier received from outside the process.
///
/// Callers (and the language model in particular) pass ids as numbers,
/// padded strings, or upper-cased UUIDs; every lookup goes through this.
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
