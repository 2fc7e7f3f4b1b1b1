use std::collections::HashSet;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// A fixed-length MinHash signature over a token set. Two signatures'
/// element-wise equality rate estimates the Jaccard similarity of the
/// underlying sets (spec.md Glossary). Stored here as `Vec<u64>` rather
/// than the source's variable-length base64 string — simpler and directly
/// comparable, per spec.md §9's encoding note.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MinHashSignature(pub Vec<u64>);

impl MinHashSignature {
    /// Estimated Jaccard similarity between two signatures of equal length:
    /// the fraction of permutation slots where the minimum hash agrees.
    pub fn jaccard(&self, other: &MinHashSignature) -> f64 {
        if self.0.is_empty() || other.0.is_empty() || self.0.len() != other.0.len() {
            return 0.0;
        }
        let matches = self
            .0
            .iter()
            .zip(other.0.iter())
            .filter(|(a, b)| a == b)
            .count();
        matches as f64 / self.0.len() as f64
    }

    pub fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(self.0.len() * 8);
        for v in &self.0 {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        base64_encode(&bytes)
    }

    pub fn from_base64(s: &str) -> Option<Self> {
        let bytes = base64_decode(s)?;
        if bytes.len() % 8 != 0 {
            return None;
        }
        let values = bytes
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        Some(MinHashSignature(values))
    }
}

/// Tokenize and hash visible text into a MinHash signature using
/// `permutations` independent hash functions (default 128, per spec.md
/// §4.8's 128-200 range), each implemented as the same xxh3 hash seeded
/// differently rather than pulling in a MinHash crate — xxhash-rust is
/// already part of the teacher's stack.
pub fn compute_signature(text: &str, permutations: usize) -> MinHashSignature {
    let tokens: HashSet<&str> = text.split_whitespace().collect();

    if tokens.is_empty() {
        return MinHashSignature(vec![u64::MAX; permutations]);
    }

    let mut mins = vec![u64::MAX; permutations];
    for token in &tokens {
        for (seed, slot) in mins.iter_mut().enumerate() {
            let h = xxh3_64_with_seed(token.as_bytes(), seed as u64);
            if h < *slot {
                *slot = h;
            }
        }
    }
    MinHashSignature(mins)
}

/// Strip `<script>`/`<style>` contents and collapse tags to whitespace,
/// leaving whitespace-tokenizable visible text for the signature above.
/// Mirrors `original_source/crawler.py::preprocess_html`.
pub fn visible_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let bytes = html.as_bytes();
    let mut i = 0;
    while i < html.len() {
        if html[i..].starts_with("<script") || html[i..].starts_with("<style") {
            let tag_name = if html[i..].starts_with("<script") { "script" } else { "style" };
            let close = format!("</{}>", tag_name);
            if let Some(end) = html[i..].find(&close) {
                i += end + close.len();
                continue;
            } else {
                break;
            }
        }
        if bytes[i] == b'<' {
            if let Some(end) = html[i..].find('>') {
                i += end + 1;
                out.push(' ');
                continue;
            } else {
                break;
            }
        }
        let ch = html[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn base64_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity((data.len() + 2) / 3 * 4);
    for chunk in data.chunks(3) {
        let b0 = chunk[0];
        let b1 = *chunk.get(1).unwrap_or(&0);
        let b2 = *chunk.get(2).unwrap_or(&0);
        let n = ((b0 as u32) << 16) | ((b1 as u32) << 8) | (b2 as u32);
        out.push(ALPHABET[((n >> 18) & 0x3f) as usize] as char);
        out.push(ALPHABET[((n >> 12) & 0x3f) as usize] as char);
        out.push(if chunk.len() > 1 {
            ALPHABET[((n >> 6) & 0x3f) as usize] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            ALPHABET[(n & 0x3f) as usize] as char
        } else {
            '='
        });
    }
    out
}

pub(crate) fn base64_decode(s: &str) -> Option<Vec<u8>> {
    fn val(c: u8) -> Option<u8> {
        match c {
            b'A'..=b'Z' => Some(c - b'A'),
            b'a'..=b'z' => Some(c - b'a' + 26),
            b'0'..=b'9' => Some(c - b'0' + 52),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }
    let clean: Vec<u8> = s.bytes().filter(|&b| b != b'=').collect();
    let mut out = Vec::with_capacity(clean.len() * 3 / 4);
    for chunk in clean.chunks(4) {
        let vals: Vec<u8> = chunk.iter().map(|&b| val(b)).collect::<Option<_>>()?;
        let n = vals.iter().enumerate().fold(0u32, |acc, (idx, &v)| {
            acc | ((v as u32) << (18 - idx * 6))
        });
        out.push((n >> 16) as u8);
        if vals.len() > 2 {
            out.push((n >> 8) as u8);
        }
        if vals.len() > 3 {
            out.push(n as u8);
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_has_similarity_one() {
        let sig_a = compute_signature("the quick brown fox jumps over the lazy dog", 64);
        let sig_b = compute_signature("the quick brown fox jumps over the lazy dog", 64);
        assert_eq!(sig_a.jaccard(&sig_b), 1.0);
    }

    #[test]
    fn near_duplicate_text_scores_above_threshold() {
        let a = "the quick brown fox jumps over the lazy dog near the river bank today";
        let b = "the quick brown fox jumps over the lazy dog near the river bank yesterday";
        let sig_a = compute_signature(a, 128);
        let sig_b = compute_signature(b, 128);
        assert!(sig_a.jaccard(&sig_b) >= 0.8, "similarity too low: {}", sig_a.jaccard(&sig_b));
    }

    #[test]
    fn unrelated_text_scores_low() {
        let a = "quarterly earnings report for the widget manufacturing division";
        let b = "recipe for baking sourdough bread with a rye starter";
        let sig_a = compute_signature(a, 128);
        let sig_b = compute_signature(b, 128);
        assert!(sig_a.jaccard(&sig_b) < 0.5);
    }

    #[test]
    fn visible_text_strips_script_and_style() {
        let html = "<html><head><style>.a{color:red}</style></head><body><script>alert(1)</script><p>Hello world</p></body></html>";
        let text = visible_text(html);
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn base64_roundtrip() {
        let sig = MinHashSignature(vec![1, 2, 3, u64::MAX]);
        let encoded = sig.to_base64();
        let decoded = MinHashSignature::from_base64(&encoded).unwrap();
        assert_eq!(sig, decoded);
    }
}
