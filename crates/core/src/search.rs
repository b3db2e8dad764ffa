//! Approximate employee-name matching.
//!
//! A name matches a search term when any of these hold (case-insensitive):
//! the full name contains the term, the phonetic key of the full name
//! contains the term's key, the edit distance between the term and the full
//! name is within [`max_edit_distance`], or the edit distance between the
//! term and the first or last name is within [`max_part_distance`].

pub const MIN_EDIT_DISTANCE: usize = 2;

/// Tolerated edit distance against the full name: a third of the term's length, at least 2.
pub fn max_edit_distance(term: &str) -> usize {
    (term.chars().count() / 3).max(MIN_EDIT_DISTANCE)
}

/// Tolerated edit distance against a single name part: a third of the term's length, at least 1.
pub fn max_part_distance(term: &str) -> usize {
    (term.chars().count() / 3).max(1)
}

pub fn levenshtein(left: &str, right: &str) -> usize {
    let left = left.chars().collect::<Vec<_>>();
    let right = right.chars().collect::<Vec<_>>();
    if left.is_empty() {
        return right.len();
    }
    if right.is_empty() {
        return left.len();
    }

    let mut previous = (0..=right.len()).collect::<Vec<_>>();
    let mut current = vec![0; right.len() + 1];
    for (i, left_char) in left.iter().enumerate() {
        current[0] = i + 1;
        for (j, right_char) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(left_char != right_char);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[right.len()]
}

/// Lowercases and folds common spelling variants (`ee`→`i`, `sh`→`s`, `k`→`c`).
pub fn phonetic_key(value: &str) -> String {
    value.to_lowercase().replace("ee", "i").replace("sh", "s").replace('k', "c")
}

pub fn name_matches(first_name: &str, last_name: &str, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return false;
    }
    let first = first_name.trim().to_lowercase();
    let last = last_name.trim().to_lowercase();
    let full = format!("{first} {last}");

    if full.contains(&term) {
        return true;
    }

    let full_key = phonetic_key(&full);
    let term_key = phonetic_key(&term);
    if full_key.contains(&term_key) {
        return true;
    }

    if levenshtein(&term, &full) <= max_edit_distance(&term) {
        return true;
    }

    let part_bound = max_part_distance(&term);
    [first.as_str(), last.as_str()]
        .iter()
        .filter(|part| !part.is_empty())
        .any(|part| levenshtein(&term, part) <= part_bound)
}
