use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::classifier::BinaryType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageState {
    Frontier,
    Processing,
    Html,
    Binary,
    Duplicate,
    /// Not named in spec.md's state machine diagram, but explicitly
    /// permitted ("Implementers MAY introduce a BLOCKED state") to give a
    /// robots-disallowed URL a terminal home instead of bouncing back into
    /// FRONTIER and being redispatched in a tight loop.
    Blocked,
}

impl PageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageState::Frontier => "FRONTIER",
            PageState::Processing => "PROCESSING",
            PageState::Html => "HTML",
            PageState::Binary => "BINARY",
            PageState::Duplicate => "DUPLICATE",
            PageState::Blocked => "BLOCKED",
        }
    }
}

impl From<&str> for PageState {
    fn from(s: &str) -> Self {
        match s {
            "PROCESSING" => PageState::Processing,
            "HTML" => PageState::Html,
            "BINARY" => PageState::Binary,
            "DUPLICATE" => PageState::Duplicate,
            "BLOCKED" => PageState::Blocked,
            _ => PageState::Frontier,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub host: String,
    pub robots_text: Option<String>,
    pub sitemap_text: Option<String>,
    pub crawl_delay_ms: Option<i64>,
    pub robots_fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Site {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Site {
            id: row.get("id")?,
            host: row.get("host")?,
            robots_text: row.get("robots_text")?,
            sitemap_text: row.get("sitemap_text")?,
            crawl_delay_ms: row.get("crawl_delay_ms")?,
            robots_fetched_at: row.get("robots_fetched_at")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: i64,
    pub site_id: i64,
    pub url: String,
    pub canonical_url: Option<String>,
    pub title: Option<String>,
    pub state: PageState,
    pub score: f64,
    pub status_code: Option<i32>,
    pub content_type: Option<String>,
    pub content_length: Option<i64>,
    pub body: Option<String>,
    pub text_hash: Option<String>,
    pub minhash: Option<Vec<u8>>,
    pub duplicate_of: Option<i64>,
    pub fetched_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Page {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let state_str: String = row.get("state")?;
        Ok(Page {
            id: row.get("id")?,
            site_id: row.get("site_id")?,
            url: row.get("url")?,
            canonical_url: row.get("canonical_url")?,
            title: row.get("title")?,
            state: PageState::from(state_str.as_str()),
            score: row.get("score")?,
            status_code: row.get("status_code")?,
            content_type: row.get("content_type")?,
            content_length: row.get("content_length")?,
            body: row.get("body")?,
            text_hash: row.get("text_hash")?,
            minhash: row.get("minhash")?,
            duplicate_of: row.get("duplicate_of")?,
            fetched_at: row.get("fetched_at")?,
            created_at: row.get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: i64,
    pub from_page_id: i64,
    pub to_url: String,
    pub context: Option<String>,
}

impl Link {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Link {
            id: row.get("id")?,
            from_page_id: row.get("from_page_id")?,
            to_url: row.get("to_url")?,
            context: row.get("context")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub page_id: i64,
    pub url: Option<String>,
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Option<Vec<u8>>,
}

impl Image {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Image {
            id: row.get("id")?,
            page_id: row.get("page_id")?,
            url: row.get("url")?,
            filename: row.get("filename")?,
            content_type: row.get("content_type")?,
            bytes: row.get("bytes")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryBlob {
    pub id: i64,
    pub page_id: i64,
    pub binary_type: String,
    pub content_length: Option<i64>,
    pub bytes: Option<Vec<u8>>,
}

impl BinaryBlob {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(BinaryBlob {
            id: row.get("id")?,
            page_id: row.get("page_id")?,
            binary_type: row.get("binary_type")?,
            content_length: row.get("content_length")?,
            bytes: row.get("bytes")?,
        })
    }

    pub fn type_code(binary_type: BinaryType) -> &'static str {
        binary_type.code()
    }
}

/// One row handed back by `next_frontier`/`frontier_batch`: enough to
/// dispatch a fetch without a second round trip for the owning site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierEntry {
    pub page_id: i64,
    pub url: String,
    pub score: f64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub enum CrawlMethod {
    Default,
    Nlp,
    Headers,
    Changed,
}

impl CrawlMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlMethod::Default => "DEFAULT",
            CrawlMethod::Nlp => "NLP",
            CrawlMethod::Headers => "HEADERS",
            CrawlMethod::Changed => "CHANGED",
        }
    }
}

impl From<&str> for CrawlMethod {
    fn from(s: &str) -> Self {
        match s {
            "NLP" => CrawlMethod::Nlp,
            "HEADERS" => CrawlMethod::Headers,
            "CHANGED" => CrawlMethod::Changed,
            _ => CrawlMethod::Default,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Scope {
    pub id: i64,
    pub pattern: String,
    pub method: CrawlMethod,
    pub keywords: Option<String>,
    pub is_active: bool,
    pub last_crawled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Scope {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let method_str: String = row.get("method")?;
        Ok(Scope {
            id: row.get("id")?,
            pattern: row.get("pattern")?,
            method: CrawlMethod::from(method_str.as_str()),
            keywords: row.get("keywords")?,
            is_active: row.get("is_active")?,
            last_crawled_at: row.get("last_crawled_at")?,
            created_at: row.get("created_at")?,
        })
    }
}

