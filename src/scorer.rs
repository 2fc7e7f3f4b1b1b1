use std::collections::HashMap;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "is", "are", "was", "were", "be", "been", "being",
    "to", "of", "in", "on", "at", "by", "for", "with", "about", "against", "between", "into",
    "through", "during", "before", "after", "above", "below", "from", "up", "down", "out",
    "off", "over", "under", "again", "further", "then", "once", "here", "there", "when",
    "where", "why", "how", "all", "any", "both", "each", "few", "more", "most", "other",
    "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than", "too", "very",
    "s", "t", "can", "will", "just", "don", "should", "now", "it", "this", "that", "as", "i",
    "you", "he", "she", "we", "they",
];

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

fn bag_of_words(text: &str) -> HashMap<String, f64> {
    let mut counts = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0.0) += 1.0;
    }
    counts
}

fn cosine_similarity(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().map(|(k, v)| v * b.get(k).copied().unwrap_or(0.0)).sum();
    let norm_a = a.values().map(|v| v * v).sum::<f64>().sqrt();
    let norm_b = b.values().map(|v| v * v).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Extract a context window of ±`window_size` characters around the
/// anchor's own text within the parent element's text. Matches
/// `original_source/crawler.py::priority`'s windowing.
pub fn context_window(parent_text: &str, anchor_text: &str, window_size: usize) -> String {
    let Some(index) = parent_text.find(anchor_text) else {
        return parent_text.to_string();
    };
    let start = index.saturating_sub(window_size);
    let end = (index + anchor_text.len() + window_size).min(parent_text.len());
    // find() / slicing work on byte offsets; clamp to char boundaries.
    let start = floor_char_boundary(parent_text, start);
    let end = ceil_char_boundary(parent_text, end);
    parent_text[start..end].to_string()
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Score a newly discovered link: `1 - max(cosine(keyword, window))` across
/// all configured preferential keywords. Lower is higher priority. Ties are
/// broken by insertion order elsewhere (the Frontier's FIFO-stable heap).
pub fn score_link(window_text: &str, keywords: &[String]) -> f64 {
    if keywords.is_empty() {
        return 1.0;
    }
    let window_vec = bag_of_words(window_text);
    let mut max_similarity: f64 = 0.0;
    for keyword in keywords {
        let keyword_vec = bag_of_words(keyword);
        let sim = cosine_similarity(&keyword_vec, &window_vec);
        if sim > max_similarity {
            max_similarity = sim;
        }
    }
    1.0 - max_similarity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_keyword_match_scores_near_zero() {
        let score = score_link("the latest research papers on climate", &["research".to_string()]);
        assert!(score < 0.9, "expected a lower score for a matching window, got {score}");
    }

    #[test]
    fn unrelated_window_scores_near_one() {
        let score = score_link("buy cheap shoes online today", &["research".to_string()]);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn no_keywords_configured_scores_one() {
        let score = score_link("anything at all", &[]);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn context_window_centers_on_anchor() {
        let parent = "this is a long block of surrounding text with a LINK right here in the middle of it all";
        let window = context_window(parent, "LINK", 10);
        assert!(window.contains("LINK"));
        assert!(window.len() <= "LINK".len() + 20 + 2);
    }
}
