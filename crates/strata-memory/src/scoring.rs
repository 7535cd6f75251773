//! Relevance heuristics shared by the indices.
//!
//! These formulas are deliberately simple and are kept exactly as they are:
//! callers depend on their ordering behavior.

use std::cmp::Ordering;

/// Occurrences of `query` in `text` divided by the text length (in chars),
/// case-insensitive. `None` when the query does not occur.
pub fn substring_score(text: &str, query: &str) -> Option<f64> {
    let query = query.to_lowercase();
    if query.is_empty() {
        return None;
    }
    let text = text.to_lowercase();
    let occurrences = text.matches(query.as_str()).count();
    if occurrences == 0 {
        return None;
    }
    let len = text.chars().count();
    Some(occurrences as f64 / len as f64)
}

/// Graph relevance: substring score weighted by `0.5 + importance / 2`.
pub fn weighted_substring_score(text: &str, query: &str, importance: f64) -> Option<f64> {
    substring_score(text, query).map(|s| s * (0.5 + importance / 2.0))
}

/// Importance bucket: importance rounded to the nearest 0.1, stored as tenths.
/// Halfway values round to even, so 0.25 lands in the 0.2 bucket.
pub fn importance_bucket(importance: f64) -> u8 {
    (importance.clamp(0.0, 1.0) * 10.0).round_ties_even() as u8
}

/// The bucket's importance value (tenths back to a fraction).
pub fn bucket_value(bucket: u8) -> f64 {
    f64::from(bucket) / 10.0
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Descending by score; equal scores keep insertion order.
pub fn by_score_desc(a: (f64, u64), b: (f64, u64)) -> Ordering {
    b.0.partial_cmp(&a.0)
        .unwrap_or(Ordering::Equal)
        .then(a.1.cmp(&b.1))
}

/// Ascending by timestamp; equal timestamps keep insertion order.
pub fn by_time_asc(a: (f64, u64), b: (f64, u64)) -> Ordering {
    a.0.partial_cmp(&b.0)
        .unwrap_or(Ordering::Equal)
        .then(a.1.cmp(&b.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_score_counts_case_insensitive() {
        let score = substring_score("Rent rent RENT", "rent").unwrap();
        assert!((score - 3.0 / 14.0).abs() < 1e-12);
        assert!(substring_score("office supplies", "rent").is_none());
        assert!(substring_score("anything", "").is_none());
    }

    #[test]
    fn weighted_score_scales_with_importance() {
        let low = weighted_substring_score("expense", "expense", 0.0).unwrap();
        let high = weighted_substring_score("expense", "expense", 1.0).unwrap();
        assert!((low - 0.5 / 7.0).abs() < 1e-12);
        assert!((high - 1.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn buckets_round_to_nearest_tenth() {
        assert_eq!(importance_bucket(0.0), 0);
        assert_eq!(importance_bucket(0.44), 4);
        assert_eq!(importance_bucket(0.46), 5);
        assert_eq!(importance_bucket(0.25), 2);
        assert_eq!(importance_bucket(1.0), 10);
        assert_eq!(bucket_value(9), 0.9);
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }
}
