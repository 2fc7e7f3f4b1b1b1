use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};
use url::Url;

use crate::error::Result;

/// Fallback sitemap paths tried (in order, stopping at the first that
/// returns a valid sitemap) when robots.txt declares none. Matches
/// `original_source/crawler.py::process_sitemap`'s `sitemap_paths` list,
/// minus the one site-specific entry (`forum-sitemap.xml`).
pub const FALLBACK_SITEMAP_PATHS: &[&str] = &[
    "sitemap.xml",
    "sitemap_index.xml",
    "sitemap/sitemap.xml",
    "sitemaps/sitemap.xml",
    "wp-sitemap.xml",
    "sitemap-index.xml",
    "wp-sitemap-index.xml",
    "main-sitemap.xml",
];

const MAX_RECURSION_DEPTH: u32 = 3;

#[derive(Debug, Clone)]
pub struct SitemapUrl {
    pub loc: Url,
    pub lastmod: Option<String>,
}

/// True if `url` looks like a sitemap document itself rather than a
/// crawlable page, so it is never re-enqueued as a frontier entry.
pub fn is_sitemap_pattern(url: &Url) -> bool {
    let path = url.path().to_lowercase();
    path.contains("sitemap") && path.ends_with(".xml") || path.contains("/assets/sitemap/")
}

fn looks_like_sitemap(text: &str) -> bool {
    text.contains("<url>") || text.contains("<loc>")
}

fn is_sitemap_index(text: &str) -> bool {
    text.contains("<sitemapindex")
}

/// Extract every `<loc>`/`<lastmod>` pair from a `<url>` or `<sitemap>`
/// entry. Works for both urlset and sitemapindex documents since both use
/// the same child element names.
fn parse_locs(xml: &str) -> Vec<SitemapUrl> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut in_loc = false;
    let mut in_lastmod = false;
    let mut current_loc: Option<Url> = None;
    let mut current_lastmod: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"loc" => in_loc = true,
                b"lastmod" => in_lastmod = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default().into_owned();
                if in_loc {
                    if let Ok(url) = Url::parse(text.trim()) {
                        current_loc = Some(url);
                    }
                    in_loc = false;
                } else if in_lastmod {
                    current_lastmod = Some(text.trim().to_string());
                    in_lastmod = false;
                }
            }
            Ok(Event::End(ref e)) if matches!(e.local_name().as_ref(), b"url" | b"sitemap") => {
                if let Some(loc) = current_loc.take() {
                    entries.push(SitemapUrl {
                        loc,
                        lastmod: current_lastmod.take(),
                    });
                }
                current_lastmod = None;
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
    }

    entries
}

/// Discovers and expands sitemaps for a host, producing the flat list of
/// page URLs they declare. Rewritten from the teacher's placeholder (which
/// hardcoded `https://example.com` and never implemented recursion),
/// grounded on `original_source/crawler.py::process_sitemap`/
/// `process_sitemap_url`.
pub struct SitemapProcessor {
    client: reqwest::Client,
    user_agent: String,
}

impl SitemapProcessor {
    pub fn new(client: reqwest::Client, user_agent: impl Into<String>) -> Self {
        SitemapProcessor {
            client,
            user_agent: user_agent.into(),
        }
    }

    async fn fetch(&self, url: &Url) -> Option<String> {
        let resp = self
            .client
            .get(url.clone())
            .header("User-Agent", &self.user_agent)
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.text().await.ok()
    }

    /// Recursively expand a sitemap (or sitemap index) URL into leaf page
    /// URLs, bounded at `MAX_RECURSION_DEPTH` nested indexes.
    async fn expand(&self, url: &Url, depth: u32, out: &mut Vec<SitemapUrl>) {
        if depth > MAX_RECURSION_DEPTH {
            warn!(%url, depth, "sitemap recursion depth exceeded, stopping");
            return;
        }

        let Some(text) = self.fetch(url).await else {
            debug!(%url, "sitemap fetch failed or non-success status");
            return;
        };

        if !looks_like_sitemap(&text) {
            debug!(%url, "response does not look like a sitemap, skipping");
            return;
        }

        let entries = parse_locs(&text);

        if is_sitemap_index(&text) {
            for entry in entries {
                Box::pin(self.expand(&entry.loc, depth + 1, out)).await;
            }
        } else {
            out.extend(entries);
        }
    }

    /// Discover sitemaps for `base`: robots-declared sitemaps first, and
    /// only if none of those yield URLs, the fallback path list.
    pub async fn discover(&self, base: &Url, robots_sitemaps: &[String]) -> Result<Vec<SitemapUrl>> {
        let mut collected = Vec::new();

        for sitemap_url in robots_sitemaps {
            if let Ok(url) = Url::parse(sitemap_url) {
                self.expand(&url, 0, &mut collected).await;
            }
        }

        if !collected.is_empty() {
            return Ok(collected);
        }

        for path in FALLBACK_SITEMAP_PATHS {
            let Ok(candidate) = base.join(path) else {
                continue;
            };
            let Some(text) = self.fetch(&candidate).await else {
                continue;
            };
            if !looks_like_sitemap(&text) {
                continue;
            }
            self.expand(&candidate, 0, &mut collected).await;
            if !collected.is_empty() {
                break;
            }
        }

        Ok(collected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_urlset() {
        let xml = r#"<?xml version="1.0"?>
            <urlset>
                <url><loc>https://example.com/a</loc><lastmod>2024-01-01</lastmod></url>
                <url><loc>https://example.com/b</loc></url>
            </urlset>"#;
        let entries = parse_locs(xml);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].loc.as_str(), "https://example.com/a");
        assert_eq!(entries[0].lastmod.as_deref(), Some("2024-01-01"));
        assert_eq!(entries[1].lastmod, None);
    }

    #[test]
    fn parses_sitemap_index_entries() {
        let xml = r#"<sitemapindex>
                <sitemap><loc>https://example.com/sitemap-1.xml</loc></sitemap>
                <sitemap><loc>https://example.com/sitemap-2.xml</loc></sitemap>
            </sitemapindex>"#;
        assert!(is_sitemap_index(xml));
        let entries = parse_locs(xml);
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn sitemap_pattern_detection() {
        assert!(is_sitemap_pattern(&Url::parse("https://h/sitemap.xml").unwrap()));
        assert!(is_sitemap_pattern(&Url::parse("https://h/wp-sitemap-1.xml").unwrap()));
        assert!(is_sitemap_pattern(&Url::parse("https://h/assets/sitemap/foo").unwrap()));
        assert!(!is_sitemap_pattern(&Url::parse("https://h/about").unwrap()));
    }

    #[test]
    fn rejects_non_sitemap_text() {
        assert!(!looks_like_sitemap("<html><body>not a sitemap</body></html>"));
    }
}
