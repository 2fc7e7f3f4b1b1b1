use std::sync::Arc;

use crate::error::Result;
use crate::minhash::{self, MinHashSignature};
use crate::storage::Store;

/// Outcome of checking a freshly fetched page against everything already
/// stored, per spec.md §4.8.
pub enum DuplicateVerdict {
    Unique,
    ExactDuplicateOf(i64),
    NearDuplicateOf(i64),
}

/// Exact-hash and MinHash near-duplicate detection, generalizing the
/// teacher's `deduplication.rs::Deduplicator` (which only had a placeholder
/// `sim_hash`) with the source's real MinHash comparison
/// (`original_source/crawler.py::compare_minhash`, 0.8 threshold).
pub struct DuplicateDetector {
    store: Arc<dyn Store>,
    permutations: usize,
    near_dup_threshold: f64,
}

impl DuplicateDetector {
    pub fn new(store: Arc<dyn Store>, permutations: usize, near_dup_threshold: f64) -> Self {
        DuplicateDetector {
            store,
            permutations,
            near_dup_threshold,
        }
    }

    /// Compute the exact-hash (over the raw HTML body, per spec.md §4.8) and
    /// the MinHash signature (over whitespace-tokenized visible text, with
    /// `<script>`/`<style>` stripped), returning both alongside the
    /// duplicate verdict so callers can persist them regardless of outcome.
    pub async fn check(
        &self,
        html: &str,
    ) -> Result<(DuplicateVerdict, u64, MinHashSignature)> {
        let exact_hash = xxhash_rust::xxh3::xxh3_64(html.as_bytes());
        let text = minhash::visible_text(html);
        let signature = minhash::compute_signature(&text, self.permutations);

        let hash_hex = format!("{exact_hash:x}");
        if let Some(existing) = self.store.find_by_hash(&hash_hex).await? {
            return Ok((DuplicateVerdict::ExactDuplicateOf(existing.id), exact_hash, signature));
        }

        let candidates = self.store.find_by_minhash().await?;
        for candidate in candidates {
            let Some(candidate_bytes) = candidate.minhash.as_ref() else {
                continue;
            };
            let Some(candidate_sig) = bytes_to_signature(candidate_bytes) else {
                continue;
            };
            if signature.jaccard(&candidate_sig) >= self.near_dup_threshold {
                return Ok((DuplicateVerdict::NearDuplicateOf(candidate.id), exact_hash, signature));
            }
        }

        Ok((DuplicateVerdict::Unique, exact_hash, signature))
    }
}

pub fn signature_to_bytes(sig: &MinHashSignature) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(sig.0.len() * 8);
    for v in &sig.0 {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn bytes_to_signature(bytes: &[u8]) -> Option<MinHashSignature> {
    if bytes.len() % 8 != 0 {
        return None;
    }
    let values = bytes
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .collect();
    Some(MinHashSignature(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_byte_roundtrip() {
        let sig = MinHashSignature(vec![1, 2, 3, u64::MAX]);
        let bytes = signature_to_bytes(&sig);
        let back = bytes_to_signature(&bytes).unwrap();
        assert_eq!(sig, back);
    }
}
