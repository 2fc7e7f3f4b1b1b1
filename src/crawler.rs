use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use tracing::{debug, info, warn};
use url::Url;

use crate::classifier::{self, Classification};
use crate::config::Config;
use crate::dedup::{self, DuplicateDetector, DuplicateVerdict};
use crate::error::{CrawlifyError, Result};
use crate::frontier::Frontier;
use crate::http::Fetcher;
use crate::monitoring::Metrics;
use crate::parser;
use crate::robots::RobotsCache;
use crate::scorer;
use crate::sitemap::SitemapProcessor;
use crate::storage::models::{FrontierEntry, PageState};
use crate::storage::{SqliteStore, Store};

/// How many consecutive empty dequeues a worker tolerates before assuming
/// the crawl is done, rather than spinning hot on a momentarily-empty
/// frontier while a sibling worker is still expanding it.
const EMPTY_POLL_LIMIT: u32 = 20;
const EMPTY_POLL_BACKOFF: Duration = Duration::from_millis(100);

/// Owns everything a worker needs for the lifetime of a crawl: the store,
/// fetcher, robots cache, frontier, sitemap processor, and duplicate
/// detector, constructed once and handed to every worker by shared
/// reference. Replaces the teacher's process-global DB handle and
/// module-level config with an explicit value, per spec.md §9's design
/// note.
pub struct Engine {
    store: Arc<dyn Store>,
    fetcher: Arc<Fetcher>,
    robots: RobotsCache,
    frontier: Arc<Frontier>,
    sitemaps: SitemapProcessor,
    dedup: DuplicateDetector,
    config: Config,
    metrics: Arc<Metrics>,
    /// Hosts whose robots.txt and sitemaps have already been processed this
    /// run, so only the worker that reaches a host first pays that cost.
    visited_hosts: DashSet<String>,
    /// Populated from the seed list; used to enforce `restrict_to_seed_host`.
    seed_hosts: DashSet<String>,
}

impl Engine {
    pub async fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(&config.db_path).await?);
        store.init().await?;

        let fetcher = Arc::new(Fetcher::new(&config)?);
        let robots = RobotsCache::new(config.http.user_agent.clone());
        let keywords = if config.preferential.enabled {
            config.preferential.keywords.clone()
        } else {
            Vec::new()
        };
        let frontier = Arc::new(Frontier::new(store.clone(), keywords));
        let sitemaps = SitemapProcessor::new(fetcher.client().clone(), config.http.user_agent.clone());
        let dedup = DuplicateDetector::new(
            store.clone(),
            config.minhash_permutations,
            config.near_dup_threshold,
        );

        Ok(Engine {
            store,
            fetcher,
            robots,
            frontier,
            sitemaps,
            dedup,
            config,
            metrics: Arc::new(Metrics::new()),
            visited_hosts: DashSet::new(),
            seed_hosts: DashSet::new(),
        })
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Warm the frontier's in-memory seen-set from whatever is already
    /// queued (a resumed crawl), then enqueue any seed URLs not already
    /// known to the store.
    pub async fn seed(&self, seeds: &[String]) -> Result<()> {
        self.frontier.warm_start(10_000).await?;

        for raw in seeds {
            let url = match Url::parse(raw) {
                Ok(u) => u,
                Err(e) => {
                    warn!(seed = raw, error = %e, "skipping unparseable seed URL");
                    continue;
                }
            };
            let Some(host) = url.host_str().map(|h| h.to_string()) else {
                warn!(seed = raw, "seed URL has no host, skipping");
                continue;
            };
            self.seed_hosts.insert(host.clone());
            let site = self.store.upsert_site(&host).await?;
            if self.frontier.add(site.id, &url, 0.0).await? {
                info!(url = %url, "seeded");
            }
        }
        Ok(())
    }

    /// Run `worker_count` worker loops to completion (frontier drained, or
    /// each worker's `max_pages_per_worker` budget exhausted).
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let monitor = crate::monitoring::Monitor::new(self.metrics.clone());
        tokio::spawn(async move { monitor.run().await });

        let worker_count = self.config.workers.max(1);
        let mut handles = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let engine = self.clone();
            handles.push(tokio::spawn(async move { engine.worker_loop(id).await }));
        }
        for handle in handles {
            handle.await.map_err(CrawlifyError::from)??;
        }
        Ok(())
    }

    async fn worker_loop(&self, worker_id: usize) -> Result<()> {
        let mut pages_done = 0usize;
        let mut empty_polls = 0u32;

        while pages_done < self.config.max_pages_per_worker {
            let entry = match self.frontier.next().await? {
                Some(entry) => entry,
                None => {
                    empty_polls += 1;
                    if empty_polls >= EMPTY_POLL_LIMIT {
                        debug!(worker_id, "frontier drained, worker exiting");
                        break;
                    }
                    tokio::time::sleep(EMPTY_POLL_BACKOFF).await;
                    continue;
                }
            };
            empty_polls = 0;

            if let Err(e) = self.process_entry(&entry).await {
                warn!(worker_id, page_id = entry.page_id, error = %e, "failed to process frontier entry");
            }
            pages_done += 1;
            self.metrics.inc_requests();
        }

        Ok(())
    }

    async fn process_entry(&self, entry: &FrontierEntry) -> Result<()> {
        let url = Url::parse(&entry.url)?;
        let host = url.host_str().unwrap_or_default().to_string();

        self.ensure_host_primed(&host, &url).await?;

        let policy = self.robots.fetch_and_cache(self.fetcher.client(), &url).await;

        if !policy.allowed(&url) {
            self.store
                .update_page(entry.page_id, None, None, None, None, None, PageState::Blocked)
                .await?;
            return Ok(());
        }

        let crawl_delay = if policy.crawl_delay.is_zero() {
            self.config.default_crawl_delay
        } else {
            policy.crawl_delay
        };
        self.fetcher.wait_for_turn(&host, crawl_delay).await;

        let fetched = match self.fetcher.fetch(&url, self.config.max_binary_bytes).await {
            Ok(result) => result,
            Err(e) => {
                warn!(url = %url, error = %e, "transport error, re-enqueueing");
                self.store.requeue(entry.page_id).await?;
                return Ok(());
            }
        };

        self.metrics.add_bytes_in(fetched.body.len() as u64);

        // Non-200 responses are recorded with the actual status and HTML
        // state, body empty — not retried, and not given a bespoke state the
        // source deliberately avoids ("don't mark as ERROR, it's not a valid
        // page type"), per spec.md §7/§8.
        if fetched.status != 200 {
            self.store
                .update_page(entry.page_id, None, None, Some(fetched.status as i32), None, Some(0), PageState::Html)
                .await?;
            return Ok(());
        }

        match classifier::classify(fetched.content_type.as_deref(), &fetched.final_url) {
            Classification::Html => {
                self.handle_html(entry.page_id, &fetched.final_url, &fetched.content_type, &fetched.body)
                    .await
            }
            Classification::Binary(binary_type) => {
                self.store
                    .add_binary(
                        entry.page_id,
                        binary_type.code(),
                        Some(fetched.body.len() as i64),
                        &fetched.body,
                    )
                    .await?;
                self.store
                    .update_page(
                        entry.page_id,
                        None,
                        None,
                        Some(fetched.status as i32),
                        fetched.content_type.as_deref(),
                        Some(fetched.body.len() as i64),
                        PageState::Binary,
                    )
                    .await
            }
            // An unclassifiable content-type is recorded as HTML state with
            // empty content, per spec.md §4.6 rule 4 — not a distinct state.
            Classification::Unknown => {
                self.store
                    .update_page(
                        entry.page_id,
                        None,
                        None,
                        Some(fetched.status as i32),
                        fetched.content_type.as_deref(),
                        Some(0),
                        PageState::Html,
                    )
                    .await
            }
        }
    }

    /// On a worker's first visit to a host this run: fetch and cache its
    /// robots policy, then discover and enqueue its sitemap URLs. Gated by
    /// `visited_hosts` so concurrent workers hitting the same host don't
    /// duplicate the work.
    async fn ensure_host_primed(&self, host: &str, base: &Url) -> Result<()> {
        if !self.visited_hosts.insert(host.to_string()) {
            return Ok(());
        }

        let policy = self.robots.fetch_and_cache(self.fetcher.client(), base).await;
        let site = self.store.upsert_site(host).await?;
        if let Some(text) = &policy.raw_text {
            self.store
                .update_site_robots(site.id, text, Some(policy.crawl_delay.as_millis() as i64))
                .await?;
        }

        let sitemap_urls = self.sitemaps.discover(base, &policy.sitemaps).await?;
        if !sitemap_urls.is_empty() {
            let joined = sitemap_urls
                .iter()
                .map(|s| s.loc.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            self.store.update_site_sitemap(site.id, &joined).await?;
        }
        for sitemap_url in &sitemap_urls {
            self.frontier.add(site.id, &sitemap_url.loc, 1.0).await?;
        }

        Ok(())
    }

    async fn handle_html(
        &self,
        page_id: i64,
        final_url: &Url,
        content_type: &Option<String>,
        body: &[u8],
    ) -> Result<()> {
        let text = String::from_utf8_lossy(body).into_owned();
        let page_data = parser::parse(&text, final_url);

        self.store
            .update_page(
                page_id,
                page_data.title.as_deref(),
                page_data.canonical_url.as_deref(),
                Some(200),
                content_type.as_deref(),
                Some(body.len() as i64),
                PageState::Html,
            )
            .await?;

        // An empty body has nothing to hash or compare: two distinct empty
        // pages are not duplicates of each other, so they get no stored
        // hash at all rather than colliding on the hash of an empty string
        // (spec.md §8's empty-page boundary case).
        if body.is_empty() {
            return Ok(());
        }

        let (verdict, exact_hash, signature) = self.dedup.check(&text).await?;

        match verdict {
            DuplicateVerdict::Unique => {
                let hash_hex = format!("{exact_hash:x}");
                let sig_bytes = dedup::signature_to_bytes(&signature);
                self.store
                    .update_page_with_hashes(page_id, &hash_hex, &sig_bytes, &text)
                    .await?;
                self.expand_links(page_id, final_url, &page_data).await?;
                self.expand_images(page_id, &page_data).await?;
            }
            DuplicateVerdict::ExactDuplicateOf(original) | DuplicateVerdict::NearDuplicateOf(original) => {
                self.store.mark_duplicate(page_id, original).await?;
            }
        }

        Ok(())
    }

    async fn expand_links(&self, page_id: i64, from_url: &Url, page_data: &parser::PageData) -> Result<()> {
        let no_keywords = Vec::new();
        let keywords = if self.config.preferential.enabled {
            &self.config.preferential.keywords
        } else {
            &no_keywords
        };

        for outlink in &page_data.outlinks_with_scores {
            let to_url = match Url::parse(&outlink.url) {
                Ok(u) => u,
                Err(_) => continue,
            };
            let Some(to_host) = to_url.host_str().map(|h| h.to_string()) else {
                continue;
            };

            self.store.add_link(page_id, &outlink.url, Some(outlink.context.as_str())).await?;

            if self.config.restrict_to_seed_host
                && !self.seed_hosts.is_empty()
                && !self.seed_hosts.contains(&to_host)
            {
                continue;
            }

            let site = self.store.upsert_site(&to_host).await?;
            let score = scorer::score_link(&outlink.context, keywords);
            if let Err(e) = self.frontier.add(site.id, &to_url, score).await {
                warn!(url = %to_url, from = %from_url, error = %e, "failed to enqueue discovered link");
            }
        }
        Ok(())
    }

    async fn expand_images(&self, page_id: i64, page_data: &parser::PageData) -> Result<()> {
        for image in &page_data.images {
            if let Some(bytes) = &image.data_uri_bytes {
                let stored = if bytes.len() as u64 <= self.config.max_image_bytes {
                    Some(bytes.as_slice())
                } else {
                    None
                };
                self.store
                    .add_image(page_id, image.url.as_deref(), &image.filename, image.content_type.as_deref(), stored)
                    .await?;
                continue;
            }

            let bytes = match &image.url {
                Some(raw_url) => match Url::parse(raw_url) {
                    Ok(image_url) => match self.fetcher.fetch(&image_url, self.config.max_image_bytes).await {
                        Ok(result) if !result.truncated => Some(result.body),
                        _ => None,
                    },
                    Err(_) => None,
                },
                None => None,
            };

            self.store
                .add_image(page_id, image.url.as_deref(), &image.filename, image.content_type.as_deref(), bytes.as_deref())
                .await?;
        }
        Ok(())
    }
}
