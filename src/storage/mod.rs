use async_trait::async_trait;
use bb8::Pool;
use bb8_rusqlite::RusqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

use crate::error::Result;

pub mod models;

use models::{FrontierEntry, Page, PageState, Scope, Site};

/// Persistent store for the crawl: sites, pages (the Frontier lives here as
/// `pages` in state `FRONTIER`), links, images, and binary-document
/// metadata. Generalizes the teacher's `Storage` struct into the full
/// operation set spec.md §6 names, as an `async_trait` so `SqliteStore` can
/// be swapped for another backend without touching callers.
#[async_trait]
pub trait Store: Send + Sync {
    async fn init(&self) -> Result<()>;

    async fn upsert_site(&self, host: &str) -> Result<Site>;
    async fn update_site_robots(
        &self,
        site_id: i64,
        robots_text: &str,
        crawl_delay_ms: Option<i64>,
    ) -> Result<()>;
    async fn update_site_sitemap(&self, site_id: i64, sitemap_text: &str) -> Result<()>;

    /// Insert a page into the frontier. Returns `None` if the URL already
    /// exists (idempotent no-op, per spec.md §4.4), `Some(page_id)` if new.
    async fn add_frontier(&self, site_id: i64, url: &str, score: f64) -> Result<Option<i64>>;

    /// Pop the single highest-priority (lowest score) frontier entry,
    /// marking it `PROCESSING` atomically. Preferential keywords (if any)
    /// are tried first as an URL-substring match before falling back to
    /// plain lowest-score selection, per spec.md §9 Open Question (a) and
    /// `original_source/database.py::get_next_frontier_page_preferential`.
    async fn next_frontier(&self, preferential_keywords: &[String]) -> Result<Option<FrontierEntry>>;

    async fn mark_processing(&self, page_id: i64) -> Result<()>;

    /// Transport failure: return a `PROCESSING` page to `FRONTIER` without
    /// touching its classification, per spec.md §4.5/§7 (no fetch-layer
    /// retry; the URL is simply re-enqueued).
    async fn requeue(&self, page_id: i64) -> Result<()>;

    #[allow(clippy::too_many_arguments)]
    async fn update_page(
        &self,
        page_id: i64,
        title: Option<&str>,
        canonical_url: Option<&str>,
        status_code: Option<i32>,
        content_type: Option<&str>,
        content_length: Option<i64>,
        state: PageState,
    ) -> Result<()>;

    /// Persist the exact-hash, MinHash signature and raw body for a page
    /// newly classified `HTML` and found unique (spec.md §3/§4.8). Never
    /// called for a page that turns out to be `DUPLICATE` — `mark_duplicate`
    /// handles that path and clears the body instead.
    async fn update_page_with_hashes(
        &self,
        page_id: i64,
        text_hash: &str,
        minhash: &[u8],
        body: &str,
    ) -> Result<()>;

    async fn add_link(&self, from_page_id: i64, to_url: &str, context: Option<&str>) -> Result<()>;

    #[allow(clippy::too_many_arguments)]
    async fn add_image(
        &self,
        page_id: i64,
        url: Option<&str>,
        filename: &str,
        content_type: Option<&str>,
        bytes: Option<&[u8]>,
    ) -> Result<()>;

    async fn add_binary(
        &self,
        page_id: i64,
        binary_type: &str,
        content_length: Option<i64>,
        bytes: &[u8],
    ) -> Result<()>;

    /// Sets `DUPLICATE`, clears the stored body, and points `duplicate_of`
    /// at the original. Sticky — a page marked `DUPLICATE` is never demoted
    /// back to `HTML` by any other store call.
    async fn mark_duplicate(&self, page_id: i64, duplicate_of: i64) -> Result<()>;

    /// Exact-hash duplicate lookup (spec.md §4.8).
    async fn find_by_hash(&self, text_hash: &str) -> Result<Option<Page>>;

    /// Candidate pages for near-duplicate comparison: all `HTML` pages with
    /// a stored MinHash signature. Jaccard similarity itself is computed in
    /// `dedup.rs`, not in SQL.
    async fn find_by_minhash(&self) -> Result<Vec<Page>>;

    /// Warm-start batch of frontier entries, ordered lowest-score-first,
    /// mirroring `original_source/database.py::get_frontier_batch`.
    async fn frontier_batch(&self, limit: i64) -> Result<Vec<FrontierEntry>>;

    async fn count_pages_in_state(&self, state: PageState) -> Result<i64>;

    async fn add_scope(&self, pattern: &str, method: &str, keywords: Option<&str>) -> Result<i64>;
    async fn list_scopes(&self) -> Result<Vec<Scope>>;
    async fn get_active_scopes(&self) -> Result<Vec<Scope>>;
    async fn remove_scope(&self, id: i64) -> Result<bool>;
    async fn set_scope_method(&self, id: i64, method: &str) -> Result<bool>;
}

/// `Store` backed by SQLite through a `bb8`-pooled `rusqlite` connection,
/// grounded on the teacher's `Storage` struct.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<RusqliteConnectionManager>,
}

impl SqliteStore {
    pub async fn new(path: &str) -> Result<Self> {
        let manager = RusqliteConnectionManager::new(path);
        let pool = Pool::builder().build(manager).await?;
        Ok(SqliteStore { pool })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn init(&self) -> Result<()> {
        let conn = self.pool.get().await?;
        let schema = include_str!("schema.sql");
        conn.execute_batch(schema)?;
        Ok(())
    }

    async fn upsert_site(&self, host: &str) -> Result<Site> {
        let conn = self.pool.get().await?;
        conn.execute(
            "INSERT INTO sites (host) VALUES (?1) ON CONFLICT(host) DO NOTHING",
            params![host],
        )?;
        let site = conn.query_row("SELECT * FROM sites WHERE host = ?1", params![host], Site::from_row)?;
        Ok(site)
    }

    async fn update_site_robots(
        &self,
        site_id: i64,
        robots_text: &str,
        crawl_delay_ms: Option<i64>,
    ) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "UPDATE sites SET robots_text = ?1, crawl_delay_ms = ?2, robots_fetched_at = datetime('now') WHERE id = ?3",
            params![robots_text, crawl_delay_ms, site_id],
        )?;
        Ok(())
    }

    async fn update_site_sitemap(&self, site_id: i64, sitemap_text: &str) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "UPDATE sites SET sitemap_text = ?1 WHERE id = ?2",
            params![sitemap_text, site_id],
        )?;
        Ok(())
    }

    async fn add_frontier(&self, site_id: i64, url: &str, score: f64) -> Result<Option<i64>> {
        let conn = self.pool.get().await?;
        let existing: Option<i64> = conn
            .query_row("SELECT id FROM pages WHERE url = ?1", params![url], |row| row.get(0))
            .optional()?;
        if existing.is_some() {
            return Ok(None);
        }
        conn.execute(
            "INSERT INTO pages (site_id, url, state, score) VALUES (?1, ?2, 'FRONTIER', ?3)",
            params![site_id, url, score],
        )?;
        Ok(Some(conn.last_insert_rowid()))
    }

    async fn next_frontier(&self, preferential_keywords: &[String]) -> Result<Option<FrontierEntry>> {
        let conn = self.pool.get().await?;

        for keyword in preferential_keywords {
            let pattern = format!("%{}%", keyword.to_lowercase());
            let row = conn
                .query_row(
                    "SELECT id, url, score FROM pages
                     WHERE state = 'FRONTIER' AND LOWER(url) LIKE ?1
                     ORDER BY score ASC, id ASC LIMIT 1",
                    params![pattern],
                    |row| {
                        Ok(FrontierEntry {
                            page_id: row.get(0)?,
                            url: row.get(1)?,
                            score: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            if let Some(entry) = row {
                conn.execute(
                    "UPDATE pages SET state = 'PROCESSING' WHERE id = ?1",
                    params![entry.page_id],
                )?;
                return Ok(Some(entry));
            }
        }

        let row = conn
            .query_row(
                "SELECT id, url, score FROM pages
                 WHERE state = 'FRONTIER'
                 ORDER BY score ASC, id ASC LIMIT 1",
                [],
                |row| {
                    Ok(FrontierEntry {
                        page_id: row.get(0)?,
                        url: row.get(1)?,
                        score: row.get(2)?,
                    })
                },
            )
            .optional()?;
        if let Some(entry) = &row {
            conn.execute(
                "UPDATE pages SET state = 'PROCESSING' WHERE id = ?1",
                params![entry.page_id],
            )?;
        }
        Ok(row)
    }

    async fn mark_processing(&self, page_id: i64) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute("UPDATE pages SET state = 'PROCESSING' WHERE id = ?1", params![page_id])?;
        Ok(())
    }

    async fn requeue(&self, page_id: i64) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "UPDATE pages SET state = 'FRONTIER' WHERE id = ?1 AND state = 'PROCESSING'",
            params![page_id],
        )?;
        Ok(())
    }

    async fn update_page(
        &self,
        page_id: i64,
        title: Option<&str>,
        canonical_url: Option<&str>,
        status_code: Option<i32>,
        content_type: Option<&str>,
        content_length: Option<i64>,
        state: PageState,
    ) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "UPDATE pages SET title = ?1, canonical_url = ?2, status_code = ?3, content_type = ?4,
             content_length = ?5, state = ?6, fetched_at = datetime('now') WHERE id = ?7",
            params![
                title,
                canonical_url,
                status_code,
                content_type,
                content_length,
                state.as_str(),
                page_id
            ],
        )?;
        Ok(())
    }

    async fn update_page_with_hashes(
        &self,
        page_id: i64,
        text_hash: &str,
        minhash: &[u8],
        body: &str,
    ) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "UPDATE pages SET text_hash = ?1, minhash = ?2, body = ?3 WHERE id = ?4",
            params![text_hash, minhash, body, page_id],
        )?;
        Ok(())
    }

    async fn add_link(&self, from_page_id: i64, to_url: &str, context: Option<&str>) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "INSERT INTO links (from_page_id, to_url, context) VALUES (?1, ?2, ?3)
             ON CONFLICT(from_page_id, to_url) DO NOTHING",
            params![from_page_id, to_url, context],
        )?;
        Ok(())
    }

    async fn add_image(
        &self,
        page_id: i64,
        url: Option<&str>,
        filename: &str,
        content_type: Option<&str>,
        bytes: Option<&[u8]>,
    ) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "INSERT INTO images (page_id, url, filename, content_type, bytes) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![page_id, url, filename, content_type, bytes],
        )?;
        Ok(())
    }

    async fn add_binary(
        &self,
        page_id: i64,
        binary_type: &str,
        content_length: Option<i64>,
        bytes: &[u8],
    ) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "INSERT INTO binary_blobs (page_id, binary_type, content_length, bytes) VALUES (?1, ?2, ?3, ?4)",
            params![page_id, binary_type, content_length, bytes],
        )?;
        Ok(())
    }

    async fn mark_duplicate(&self, page_id: i64, duplicate_of: i64) -> Result<()> {
        let conn = self.pool.get().await?;
        conn.execute(
            "UPDATE pages SET state = 'DUPLICATE', duplicate_of = ?1, body = NULL WHERE id = ?2",
            params![duplicate_of, page_id],
        )?;
        Ok(())
    }

    async fn find_by_hash(&self, text_hash: &str) -> Result<Option<Page>> {
        let conn = self.pool.get().await?;
        let page = conn
            .query_row(
                "SELECT * FROM pages WHERE text_hash = ?1 AND state = 'HTML' ORDER BY id ASC LIMIT 1",
                params![text_hash],
                Page::from_row,
            )
            .optional()?;
        Ok(page)
    }

    async fn find_by_minhash(&self) -> Result<Vec<Page>> {
        let conn = self.pool.get().await?;
        let mut stmt =
            conn.prepare("SELECT * FROM pages WHERE state = 'HTML' AND minhash IS NOT NULL")?;
        let pages = stmt
            .query_map([], Page::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(pages)
    }

    async fn frontier_batch(&self, limit: i64) -> Result<Vec<FrontierEntry>> {
        let conn = self.pool.get().await?;
        let mut stmt = conn.prepare(
            "SELECT id, url, score FROM pages WHERE state = 'FRONTIER' ORDER BY score ASC, id ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(FrontierEntry {
                    page_id: row.get(0)?,
                    url: row.get(1)?,
                    score: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn count_pages_in_state(&self, state: PageState) -> Result<i64> {
        let conn = self.pool.get().await?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE state = ?1",
            params![state.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    async fn add_scope(&self, pattern: &str, method: &str, keywords: Option<&str>) -> Result<i64> {
        let conn = self.pool.get().await?;
        conn.execute(
            "INSERT INTO scopes (pattern, method, keywords, is_active) VALUES (?1, ?2, ?3, 1)",
            params![pattern, method, keywords],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn list_scopes(&self) -> Result<Vec<Scope>> {
        let conn = self.pool.get().await?;
        let mut stmt = conn.prepare("SELECT * FROM scopes ORDER BY id")?;
        let scopes = stmt
            .query_map([], Scope::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(scopes)
    }

    async fn get_active_scopes(&self) -> Result<Vec<Scope>> {
        let conn = self.pool.get().await?;
        let mut stmt = conn.prepare("SELECT * FROM scopes WHERE is_active = 1 ORDER BY id")?;
        let scopes = stmt
            .query_map([], Scope::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(scopes)
    }

    async fn remove_scope(&self, id: i64) -> Result<bool> {
        let conn = self.pool.get().await?;
        let rows = conn.execute("DELETE FROM scopes WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    async fn set_scope_method(&self, id: i64, method: &str) -> Result<bool> {
        let conn = self.pool.get().await?;
        let rows = conn.execute(
            "UPDATE scopes SET method = ?1 WHERE id = ?2",
            params![method, id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixture() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl.sqlite");
        let store = SqliteStore::new(path.to_str().unwrap()).await.unwrap();
        store.init().await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn upsert_site_is_idempotent() {
        let (_dir, store) = fixture().await;
        let first = store.upsert_site("example.com").await.unwrap();
        let second = store.upsert_site("example.com").await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn add_frontier_rejects_duplicate_url() {
        let (_dir, store) = fixture().await;
        let site = store.upsert_site("example.com").await.unwrap();
        let first = store.add_frontier(site.id, "https://example.com/a", 0.0).await.unwrap();
        let second = store.add_frontier(site.id, "https://example.com/a", 0.0).await.unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn next_frontier_returns_lowest_score_first() {
        let (_dir, store) = fixture().await;
        let site = store.upsert_site("example.com").await.unwrap();
        store.add_frontier(site.id, "https://example.com/high", 5.0).await.unwrap();
        store.add_frontier(site.id, "https://example.com/low", 1.0).await.unwrap();

        let entry = store.next_frontier(&[]).await.unwrap().unwrap();
        assert_eq!(entry.url, "https://example.com/low");
    }

    #[tokio::test]
    async fn next_frontier_prefers_keyword_match_over_lower_score() {
        let (_dir, store) = fixture().await;
        let site = store.upsert_site("example.com").await.unwrap();
        store.add_frontier(site.id, "https://example.com/low", 1.0).await.unwrap();
        store.add_frontier(site.id, "https://example.com/research/paper", 5.0).await.unwrap();

        let entry = store.next_frontier(&["research".to_string()]).await.unwrap().unwrap();
        assert_eq!(entry.url, "https://example.com/research/paper");
    }

    #[tokio::test]
    async fn next_frontier_does_not_redispatch_processing_entry() {
        let (_dir, store) = fixture().await;
        let site = store.upsert_site("example.com").await.unwrap();
        store.add_frontier(site.id, "https://example.com/a", 0.0).await.unwrap();

        let first = store.next_frontier(&[]).await.unwrap();
        assert!(first.is_some());
        let second = store.next_frontier(&[]).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn requeue_returns_processing_entry_to_frontier() {
        let (_dir, store) = fixture().await;
        let site = store.upsert_site("example.com").await.unwrap();
        store.add_frontier(site.id, "https://example.com/a", 0.0).await.unwrap();
        let entry = store.next_frontier(&[]).await.unwrap().unwrap();

        store.requeue(entry.page_id).await.unwrap();
        let redispatched = store.next_frontier(&[]).await.unwrap();
        assert!(redispatched.is_some());
    }

    #[tokio::test]
    async fn add_link_is_idempotent() {
        let (_dir, store) = fixture().await;
        let site = store.upsert_site("example.com").await.unwrap();
        let page_id = store.add_frontier(site.id, "https://example.com/a", 0.0).await.unwrap().unwrap();

        store.add_link(page_id, "https://example.com/b", Some("ctx")).await.unwrap();
        store.add_link(page_id, "https://example.com/b", Some("ctx")).await.unwrap();

        let conn = store.pool.get().await.unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM links WHERE from_page_id = ?1", params![page_id], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn mark_duplicate_clears_body_and_sets_duplicate_of() {
        let (_dir, store) = fixture().await;
        let site = store.upsert_site("example.com").await.unwrap();
        let original_id = store.add_frontier(site.id, "https://example.com/a", 0.0).await.unwrap().unwrap();
        store
            .update_page_with_hashes(original_id, "hash1", &[1, 2, 3], "<html>original</html>")
            .await
            .unwrap();

        let dup_id = store.add_frontier(site.id, "https://example.com/b", 0.0).await.unwrap().unwrap();
        store
            .update_page(dup_id, None, None, Some(200), Some("text/html"), Some(10), PageState::Html)
            .await
            .unwrap();
        store.mark_duplicate(dup_id, original_id).await.unwrap();

        let conn = store.pool.get().await.unwrap();
        let dup_page = conn
            .query_row("SELECT * FROM pages WHERE id = ?1", params![dup_id], Page::from_row)
            .unwrap();
        assert!(matches!(dup_page.state, PageState::Duplicate));
        assert_eq!(dup_page.duplicate_of, Some(original_id));
        assert!(dup_page.body.is_none());
    }

    #[tokio::test]
    async fn find_by_hash_only_returns_html_pages() {
        let (_dir, store) = fixture().await;
        let site = store.upsert_site("example.com").await.unwrap();
        let page_id = store.add_frontier(site.id, "https://example.com/a", 0.0).await.unwrap().unwrap();
        store
            .update_page(page_id, None, None, Some(200), Some("text/html"), Some(10), PageState::Html)
            .await
            .unwrap();
        store
            .update_page_with_hashes(page_id, "abc123", &[1, 2, 3], "<html></html>")
            .await
            .unwrap();

        let found = store.find_by_hash("abc123").await.unwrap();
        assert_eq!(found.unwrap().id, page_id);
        assert!(store.find_by_hash("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scopes_crud_roundtrip() {
        let (_dir, store) = fixture().await;
        let id = store.add_scope("https://example.com/*", "DEFAULT", None).await.unwrap();
        let scopes = store.list_scopes().await.unwrap();
        assert_eq!(scopes.len(), 1);
        assert_eq!(scopes[0].id, id);

        assert!(store.set_scope_method(id, "NLP").await.unwrap());
        let active = store.get_active_scopes().await.unwrap();
        assert!(matches!(active[0].method, crate::storage::models::CrawlMethod::Nlp));

        assert!(store.remove_scope(id).await.unwrap());
        assert!(store.list_scopes().await.unwrap().is_empty());
    }
}
