use std::sync::Arc;

use dashmap::DashMap;
use url::Url;

use crate::canonical;
use crate::error::Result;
use crate::keywords::KeywordMatcher;
use crate::sitemap::is_sitemap_pattern;
use crate::storage::models::{FrontierEntry, PageState};
use crate::storage::Store;

/// The crawl frontier: a thin in-memory dedup/scoring layer over the
/// `Store`'s `pages` table (state `FRONTIER` is the actual queue).
/// Generalizes the teacher's in-memory `PriorityQueue`+`DashMap` design,
/// but makes the store the durable queue of record — a frontier that
/// survives a restart via `warm_start`/`frontier_batch` rather than a
/// `bincode`-serialized blob (spec.md §9).
///
/// Inverts the teacher's "higher score = more urgent" convention: here,
/// lower score means higher priority, per spec.md §4.4. This is an
/// intentional, documented behavior change, not a silent diff.
pub struct Frontier {
    store: Arc<dyn Store>,
    seen: DashMap<String, ()>,
    preferential_keywords: Vec<String>,
    preferential_matcher: Option<KeywordMatcher>,
}

impl Frontier {
    pub fn new(store: Arc<dyn Store>, preferential_keywords: Vec<String>) -> Self {
        let preferential_matcher = if preferential_keywords.is_empty() {
            None
        } else {
            KeywordMatcher::new(&preferential_keywords).ok()
        };
        Frontier {
            store,
            seen: DashMap::new(),
            preferential_keywords,
            preferential_matcher,
        }
    }

    /// Load the current on-disk frontier into the in-memory seen-set so a
    /// restarted process doesn't re-discover and re-insert URLs already
    /// queued. Returns the number of entries loaded.
    pub async fn warm_start(&self, limit: i64) -> Result<usize> {
        let batch = self.store.frontier_batch(limit).await?;
        let count = batch.len();
        for entry in batch {
            self.seen.insert(entry.url, ());
        }
        Ok(count)
    }

    fn is_preferential(&self, url: &str) -> bool {
        match &self.preferential_matcher {
            Some(matcher) => matcher.contains_any(url),
            None => false,
        }
    }

    /// Canonicalize and insert a discovered URL. A no-op (returns `false`)
    /// if the URL is already known, is itself a sitemap document, or the
    /// store already has a page for it. `base_score` is the caller-supplied
    /// priority (0 for seeds, the Priority Scorer's `1 - cosine` for
    /// discovered links, 1.0 for sitemap-discovered URLs with no particular
    /// context). Preferential-keyword URLs get that score reduced by 1
    /// (clamped at 0) so they dequeue first — distinct from the Priority
    /// Scorer's anchor-context cosine score (spec.md §9 Open Question a);
    /// both notions of "preference" are preserved side by side.
    pub async fn add(&self, site_id: i64, url: &Url, base_score: f64) -> Result<bool> {
        let canonical_url = canonical::canonicalize(url);

        if is_sitemap_pattern(&canonical_url) {
            return Ok(false);
        }

        let key = canonical_url.to_string();
        if self.seen.contains_key(&key) {
            return Ok(false);
        }

        let score = if self.is_preferential(&key) {
            (base_score - 1.0).max(0.0)
        } else {
            base_score
        };

        self.seen.insert(key.clone(), ());
        let inserted = self.store.add_frontier(site_id, &key, score).await?;
        Ok(inserted.is_some())
    }

    /// Pop the next entry to crawl: preferential URL-substring matches are
    /// tried first, then the lowest-score entry overall (spec.md §4.4).
    pub async fn next(&self) -> Result<Option<FrontierEntry>> {
        self.store.next_frontier(&self.preferential_keywords).await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.store.count_pages_in_state(PageState::Frontier).await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::{Page, Scope, Site};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockStore {
        frontier: Mutex<Vec<(i64, String, f64)>>,
        next_id: Mutex<i64>,
    }

    #[async_trait]
    impl Store for MockStore {
        async fn init(&self) -> Result<()> {
            Ok(())
        }
        async fn upsert_site(&self, host: &str) -> Result<Site> {
            Ok(Site {
                id: 1,
                host: host.to_string(),
                robots_text: None,
                sitemap_text: None,
                crawl_delay_ms: None,
                robots_fetched_at: None,
                created_at: chrono::Utc::now(),
            })
        }
        async fn update_site_robots(&self, _: i64, _: &str, _: Option<i64>) -> Result<()> {
            Ok(())
        }
        async fn update_site_sitemap(&self, _: i64, _: &str) -> Result<()> {
            Ok(())
        }
        async fn add_frontier(&self, site_id: i64, url: &str, score: f64) -> Result<Option<i64>> {
            let mut frontier = self.frontier.lock().unwrap();
            if frontier.iter().any(|(_, u, _)| u == url) {
                return Ok(None);
            }
            let mut next_id = self.next_id.lock().unwrap();
            *next_id += 1;
            frontier.push((site_id, url.to_string(), score));
            Ok(Some(*next_id))
        }
        async fn next_frontier(&self, preferential_keywords: &[String]) -> Result<Option<FrontierEntry>> {
            let mut frontier = self.frontier.lock().unwrap();
            for keyword in preferential_keywords {
                if let Some(pos) = frontier
                    .iter()
                    .position(|(_, u, _)| u.to_lowercase().contains(&keyword.to_lowercase()))
                {
                    let (_, url, score) = frontier.remove(pos);
                    return Ok(Some(FrontierEntry { page_id: 0, url, score }));
                }
            }
            if frontier.is_empty() {
                return Ok(None);
            }
            let idx = frontier
                .iter()
                .enumerate()
                .min_by(|a, b| a.1 .2.partial_cmp(&b.1 .2).unwrap())
                .map(|(i, _)| i)
                .unwrap();
            let (_, url, score) = frontier.remove(idx);
            Ok(Some(FrontierEntry { page_id: 0, url, score }))
        }
        async fn mark_processing(&self, _: i64) -> Result<()> {
            Ok(())
        }
        async fn requeue(&self, _: i64) -> Result<()> {
            Ok(())
        }
        async fn update_page(
            &self,
            _: i64,
            _: Option<&str>,
            _: Option<&str>,
            _: Option<i32>,
            _: Option<&str>,
            _: Option<i64>,
            _: PageState,
        ) -> Result<()> {
            Ok(())
        }
        async fn update_page_with_hashes(&self, _: i64, _: &str, _: &[u8], _: &str) -> Result<()> {
            Ok(())
        }
        async fn add_link(&self, _: i64, _: &str, _: Option<&str>) -> Result<()> {
            Ok(())
        }
        async fn add_image(
            &self,
            _: i64,
            _: Option<&str>,
            _: &str,
            _: Option<&str>,
            _: Option<&[u8]>,
        ) -> Result<()> {
            Ok(())
        }
        async fn add_binary(&self, _: i64, _: &str, _: Option<i64>, _: &[u8]) -> Result<()> {
            Ok(())
        }
        async fn mark_duplicate(&self, _: i64, _: i64) -> Result<()> {
            Ok(())
        }
        async fn find_by_hash(&self, _: &str) -> Result<Option<Page>> {
            Ok(None)
        }
        async fn find_by_minhash(&self) -> Result<Vec<Page>> {
            Ok(vec![])
        }
        async fn frontier_batch(&self, limit: i64) -> Result<Vec<FrontierEntry>> {
            let frontier = self.frontier.lock().unwrap();
            let mut entries: Vec<FrontierEntry> = frontier
                .iter()
                .map(|(_, url, score)| FrontierEntry { page_id: 0, url: url.clone(), score: *score })
                .collect();
            entries.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap());
            entries.truncate(limit as usize);
            Ok(entries)
        }
        async fn count_pages_in_state(&self, _: PageState) -> Result<i64> {
            Ok(self.frontier.lock().unwrap().len() as i64)
        }
        async fn add_scope(&self, _: &str, _: &str, _: Option<&str>) -> Result<i64> {
            Ok(1)
        }
        async fn list_scopes(&self) -> Result<Vec<Scope>> {
            Ok(vec![])
        }
        async fn get_active_scopes(&self) -> Result<Vec<Scope>> {
            Ok(vec![])
        }
        async fn remove_scope(&self, _: i64) -> Result<bool> {
            Ok(true)
        }
        async fn set_scope_method(&self, _: i64, _: &str) -> Result<bool> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn duplicate_url_is_not_reinserted() {
        let store = Arc::new(MockStore::default());
        let frontier = Frontier::new(store, vec![]);
        let url = Url::parse("https://example.com/a").unwrap();
        assert!(frontier.add(1, &url, 1.0).await.unwrap());
        assert!(!frontier.add(1, &url, 1.0).await.unwrap());
    }

    #[tokio::test]
    async fn sitemap_urls_are_never_enqueued() {
        let store = Arc::new(MockStore::default());
        let frontier = Frontier::new(store, vec![]);
        let url = Url::parse("https://example.com/sitemap.xml").unwrap();
        assert!(!frontier.add(1, &url, 1.0).await.unwrap());
    }

    #[tokio::test]
    async fn preferential_keyword_dequeues_before_plain_entries() {
        let store = Arc::new(MockStore::default());
        let frontier = Frontier::new(store, vec!["research".to_string()]);
        frontier.add(1, &Url::parse("https://example.com/a").unwrap(), 1.0).await.unwrap();
        frontier
            .add(1, &Url::parse("https://example.com/research/paper").unwrap(), 1.0)
            .await
            .unwrap();

        let next = frontier.next().await.unwrap().unwrap();
        assert!(next.url.contains("research"));
    }

    #[tokio::test]
    async fn preferential_keyword_reduces_score() {
        let store = Arc::new(MockStore::default());
        let frontier = Frontier::new(store, vec!["research".to_string()]);
        frontier
            .add(1, &Url::parse("https://example.com/research/paper").unwrap(), 1.0)
            .await
            .unwrap();
        let snapshot = frontier.store.frontier_batch(10).await.unwrap();
        assert_eq!(snapshot[0].score, 0.0);
    }

    #[tokio::test]
    async fn empty_frontier_reports_empty() {
        let store = Arc::new(MockStore::default());
        let frontier = Frontier::new(store, vec![]);
        assert!(frontier.is_empty().await.unwrap());
    }
}
