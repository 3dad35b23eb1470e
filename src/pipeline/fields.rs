// src/pipeline/fields.rs

//! Field name normalization and ordering for a contest's `fields` list.
//!
//! Upstream columns arrive in whatever casing a plugin uses ("Penalty",
//! "penalty time"); they are normalized to snake_case before being stored in
//! a Statistics addition. The ordered list kept on the contest follows two
//! rules: a field named `{source}_...` comes after `source`, and the rating
//! triplet always closes the list in `old_rating, rating_change, new_rating`
//! order.

use std::collections::HashSet;

/// Rating columns, in display order.
pub const RATING_TRIPLET: [&str; 3] = ["old_rating", "rating_change", "new_rating"];

/// Row keys that live in typed Statistics columns, not in `fields`.
const RESERVED: [&str; 6] = ["problems", "place", "solving", "upsolving", "member", "members"];

/// Normalize a column name to snake_case.
///
/// Keys starting with `_` are internal and kept verbatim.
pub fn normalize_field(name: &str) -> String {
    if name.starts_with('_') {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len());
    let mut prev_lower = false;
    for ch in name.trim().chars() {
        if ch.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else if ch.is_alphanumeric() {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
            prev_lower = false;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Whether a normalized key belongs in the contest's visible field list.
pub fn is_listed_field(key: &str) -> bool {
    !key.is_empty() && !key.starts_with('_') && !RESERVED.contains(&key)
}

/// `field` is derived from `source` when it extends it with `_`.
fn depends_on(field: &str, source: &str) -> bool {
    field.len() > source.len() + 1
        && field.starts_with(source)
        && field.as_bytes()[source.len()] == b'_'
}

/// Order fields so every derived field follows its source, with the rating
/// triplet moved to the end.
///
/// Greedy: repeatedly take the field with the fewest unplaced predecessors,
/// earliest first on ties. Input duplicates are dropped.
pub fn order_fields<I, S>(fields: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let all: Vec<String> = fields
        .into_iter()
        .map(|f| f.as_ref().to_string())
        .filter(|f| seen.insert(f.clone()))
        .collect();
    let triplet: Vec<String> = RATING_TRIPLET
        .iter()
        .filter(|f| seen.contains(**f))
        .map(|f| f.to_string())
        .collect();
    let mut remaining: Vec<String> = all
        .into_iter()
        .filter(|f| !RATING_TRIPLET.contains(&f.as_str()))
        .collect();

    let mut ordered = Vec::with_capacity(remaining.len() + triplet.len());
    while !remaining.is_empty() {
        let mut best = 0;
        let mut best_count = usize::MAX;
        for (i, field) in remaining.iter().enumerate() {
            let count = remaining
                .iter()
                .filter(|other| depends_on(field, other))
                .count();
            if count < best_count {
                best = i;
                best_count = count;
            }
        }
        ordered.push(remaining.remove(best));
    }
    ordered.extend(triplet);
    ordered
}

/// Append `discovered` to `previous`, keeping first occurrences, then order.
pub fn merge_fields(previous: &[String], discovered: &[String]) -> Vec<String> {
    order_fields(previous.iter().chain(discovered.iter()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_field() {
        assert_eq!(normalize_field("Penalty"), "penalty");
        assert_eq!(normalize_field("penalty time"), "penalty_time");
        assert_eq!(normalize_field("oldRating"), "old_rating");
        assert_eq!(normalize_field("rating-change"), "rating_change");
        assert_eq!(normalize_field("  Score (total) "), "score_total");
        assert_eq!(normalize_field("_members"), "_members");
        assert_eq!(normalize_field("n2"), "n2");
    }

    #[test]
    fn test_listed_fields() {
        assert!(is_listed_field("penalty"));
        assert!(is_listed_field("name"));
        assert!(!is_listed_field("problems"));
        assert!(!is_listed_field("_members"));
        assert!(!is_listed_field("place"));
    }

    #[test]
    fn test_rating_triplet_goes_last_in_order() {
        let ordered = order_fields(["new_rating", "penalty", "rating_change", "old_rating", "name"]);
        assert_eq!(
            ordered,
            ["penalty", "name", "old_rating", "rating_change", "new_rating"]
        );
    }

    #[test]
    fn test_partial_triplet_keeps_relative_order() {
        let ordered = order_fields(["new_rating", "old_rating"]);
        assert_eq!(ordered, ["old_rating", "new_rating"]);
    }

    #[test]
    fn test_derived_field_follows_source() {
        let ordered = order_fields(["penalty_time", "name", "penalty"]);
        assert_eq!(ordered, ["name", "penalty", "penalty_time"]);
    }

    #[test]
    fn test_ordering_is_stable() {
        let first = order_fields(["b_x", "a", "b", "new_rating", "old_rating", "a_y"]);
        let second = order_fields(&first);
        assert_eq!(first, second);
        assert_eq!(first, ["a", "b", "b_x", "a_y", "old_rating", "new_rating"]);
    }

    #[test]
    fn test_merge_keeps_previous_and_dedups() {
        let previous = vec!["name".to_string(), "penalty".to_string()];
        let discovered = vec!["penalty".to_string(), "country".to_string()];
        assert_eq!(
            merge_fields(&previous, &discovered),
            ["name", "penalty", "country"]
        );
    }
}
