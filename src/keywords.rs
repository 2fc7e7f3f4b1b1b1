use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use anyhow::Result;

/// Preferential-keyword matcher, adapted from the teacher's NLP keyword
/// filter. Used by the Frontier for URL-substring preferential biasing —
/// a distinct notion from the Priority Scorer's anchor-context cosine
/// similarity (spec.md §9, Open Question a).
pub struct KeywordMatcher {
    ac: AhoCorasick,
}

impl KeywordMatcher {
    pub fn new(keywords: &[String]) -> Result<Self> {
        let ac = AhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostFirst)
            .ascii_case_insensitive(true)
            .build(keywords)?;
        Ok(KeywordMatcher { ac })
    }

    pub fn contains_any(&self, text: &str) -> bool {
        self.ac.is_match(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_keyword_in_url() {
        let m = KeywordMatcher::new(&["research".to_string()]).unwrap();
        assert!(m.contains_any("https://h/research/x"));
        assert!(!m.contains_any("https://h/about"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let m = KeywordMatcher::new(&["Research".to_string()]).unwrap();
        assert!(m.contains_any("https://h/RESEARCH/paper"));
    }
}
