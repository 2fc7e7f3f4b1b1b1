use html5ever::tendril::TendrilSink;
use html5ever::tokenizer::{BufferQueue, Token, Tokenizer, TokenizerOpts};
use std::collections::{HashMap, HashSet};
use url::Url;

use crate::scorer::context_window;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OutlinkWithScore {
    pub url: String,
    pub context: String,
    pub nlp_score: Option<u8>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DiscoveredImage {
    pub url: Option<String>,
    pub filename: String,
    pub content_type: Option<String>,
    pub data_uri_bytes: Option<Vec<u8>>,
}

#[derive(Clone)]
pub struct PageData {
    pub title: Option<String>,
    pub canonical_url: Option<String>,
    pub outlinks: Vec<String>,
    pub outlinks_with_scores: Vec<OutlinkWithScore>,
    pub images: Vec<DiscoveredImage>,
}

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "td", "th", "section", "article", "header", "footer", "nav", "aside",
    "h1", "h2", "h3", "h4", "h5", "h6", "body", "blockquote", "ul", "ol", "table", "tr",
];

fn synthesize_data_uri_filename(content_subtype: &str, data: &str) -> String {
    let hash = xxhash_rust::xxh3::xxh3_64(data.as_bytes());
    truncate_filename(&format!("inline-{hash:x}.{content_subtype}"))
}

/// Cap filenames at 50 characters, truncating around an ellipsis while
/// preserving the extension (spec.md §4.7).
pub fn truncate_filename(name: &str) -> String {
    const MAX_LEN: usize = 50;
    if name.len() <= MAX_LEN {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((s, e)) if e.len() <= 10 => (s, Some(e)),
        _ => (name, None),
    };
    match ext {
        Some(ext) => {
            let keep = MAX_LEN.saturating_sub(ext.len() + 1 + 3); // "." + "..." + ext
            let stem_truncated: String = stem.chars().take(keep).collect();
            format!("{stem_truncated}....{ext}")
        }
        None => name.chars().take(MAX_LEN).collect(),
    }
}

/// Parse an `onclick="location.href = '...'"` style attribute value and
/// return the target URL literal, if present. Hand-rolled narrow match
/// rather than pulling in `regex` for one literal pattern — mirrors
/// `original_source/crawler.py::extract_links`'s onclick handling.
fn extract_onclick_href(onclick: &str) -> Option<String> {
    let idx = onclick.find("location.href")?;
    let rest = &onclick[idx + "location.href".len()..];
    let eq_idx = rest.find('=')?;
    let after_eq = rest[eq_idx + 1..].trim_start();
    let quote = after_eq.chars().next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    let body = &after_eq[1..];
    let end = body.find(quote)?;
    Some(body[..end].to_string())
}

fn extract_css_background_image(style: &str) -> Option<String> {
    let idx = style.find("background-image")?;
    let rest = &style[idx..];
    let url_idx = rest.find("url(")?;
    let after = &rest[url_idx + 4..];
    let end = after.find(')')?;
    let inner = after[..end].trim().trim_matches(|c| c == '\'' || c == '"');
    if inner.is_empty() {
        None
    } else {
        Some(inner.to_string())
    }
}

fn is_skippable_href(href: &str) -> bool {
    let trimmed = href.trim();
    trimmed.is_empty()
        || trimmed.starts_with('#')
        || trimmed.to_lowercase().starts_with("javascript:")
        || trimmed.to_lowercase().starts_with("mailto:")
}

struct PendingAnchor {
    href: String,
    text: String,
}

struct PageDataSink<'a> {
    base_url: &'a Url,
    title: Option<String>,
    canonical_url: Option<Url>,
    outlinks: Vec<String>,
    seen_outlinks: HashSet<String>,
    contexts: HashMap<String, String>,
    images: Vec<DiscoveredImage>,
    seen_images: HashSet<String>,
    running_text: String,
    in_title: bool,
    in_script_or_style: bool,
    pending_anchor: Option<PendingAnchor>,
}

impl<'a> PageDataSink<'a> {
    fn new(base_url: &'a Url) -> Self {
        PageDataSink {
            base_url,
            title: None,
            canonical_url: None,
            outlinks: Vec::new(),
            seen_outlinks: HashSet::new(),
            contexts: HashMap::new(),
            images: Vec::new(),
            seen_images: HashSet::new(),
            running_text: String::new(),
            in_title: false,
            in_script_or_style: false,
            pending_anchor: None,
        }
    }

    fn record_link(&mut self, resolved: Url, context: String) {
        let key = resolved.to_string();
        if self.seen_outlinks.insert(key.clone()) {
            self.outlinks.push(key.clone());
        }
        // Later (longer-lived) context for the same link wins — keeps the
        // most complete window if a URL is linked more than once.
        self.contexts.insert(key, context);
    }

    fn record_image(&mut self, resolved: Option<Url>, filename: String, content_type: Option<String>) {
        let key = resolved.as_ref().map(|u| u.to_string()).unwrap_or_else(|| filename.clone());
        if !self.seen_images.insert(key) {
            return;
        }
        self.images.push(DiscoveredImage {
            url: resolved.map(|u| u.to_string()),
            filename,
            content_type,
            data_uri_bytes: None,
        });
    }

    fn record_image_with_bytes(
        &mut self,
        filename: String,
        content_type: Option<String>,
        data_uri_bytes: Option<Vec<u8>>,
    ) {
        if !self.seen_images.insert(filename.clone()) {
            return;
        }
        self.images.push(DiscoveredImage {
            url: None,
            filename,
            content_type,
            data_uri_bytes,
        });
    }

    fn finish_pending_anchor(&mut self) {
        if let Some(anchor) = self.pending_anchor.take() {
            if !is_skippable_href(&anchor.href) {
                if let Ok(resolved) = self.base_url.join(&anchor.href) {
                    let window = context_window(&self.running_text, &anchor.text, 50);
                    self.record_link(resolved, window);
                }
            }
        }
    }

    fn get_page_data(mut self) -> PageData {
        self.finish_pending_anchor();

        let outlinks_with_scores: Vec<OutlinkWithScore> = self
            .outlinks
            .iter()
            .map(|url| OutlinkWithScore {
                url: url.clone(),
                context: self.contexts.get(url).cloned().unwrap_or_default(),
                nlp_score: None,
            })
            .collect();

        PageData {
            title: self.title,
            canonical_url: self.canonical_url.map(|u| u.to_string()),
            outlinks: self.outlinks,
            outlinks_with_scores,
            images: self.images,
        }
    }
}

impl<'a> html5ever::tokenizer::TokenSink for PageDataSink<'a> {
    type Handle = ();

    fn process_token(
        &mut self,
        token: Token,
        _line_num: u64,
    ) -> html5ever::tokenizer::TokenSinkResult<()> {
        match token {
            Token::TagToken(tag) => {
                let tag_name = tag.name.as_ref().to_string();
                match tag.kind {
                    html5ever::tokenizer::TagKind::StartTag => {
                        if BLOCK_TAGS.contains(&tag_name.as_str()) {
                            self.finish_pending_anchor();
                        }

                        if tag_name == "title" {
                            self.in_title = true;
                        } else if tag_name == "script" || tag_name == "style" {
                            self.in_script_or_style = true;
                        } else if tag_name == "link" {
                            let mut rel = None;
                            let mut href = None;
                            for attr in &tag.attrs {
                                if attr.name.local.as_ref() == "rel" {
                                    rel = Some(attr.value.to_string());
                                }
                                if attr.name.local.as_ref() == "href" {
                                    href = Some(attr.value.to_string());
                                }
                            }
                            if let (Some(rel), Some(href)) = (rel, href) {
                                if rel == "canonical" {
                                    self.canonical_url = self.base_url.join(&href).ok();
                                }
                            }
                        } else if tag_name == "a" {
                            self.finish_pending_anchor();
                            if let Some(href) =
                                tag.attrs.iter().find(|a| a.name.local.as_ref() == "href")
                            {
                                self.pending_anchor = Some(PendingAnchor {
                                    href: href.value.to_string(),
                                    text: String::new(),
                                });
                            }
                            for attr in &tag.attrs {
                                if attr.name.local.as_ref() == "onclick" {
                                    if let Some(target) = extract_onclick_href(&attr.value) {
                                        if !is_skippable_href(&target) {
                                            if let Ok(resolved) = self.base_url.join(&target) {
                                                self.record_link(resolved, String::new());
                                            }
                                        }
                                    }
                                }
                            }
                        } else if tag_name == "img" {
                            let mut src = None;
                            let mut alt = None;
                            for attr in &tag.attrs {
                                if attr.name.local.as_ref() == "src" {
                                    src = Some(attr.value.to_string());
                                }
                                if attr.name.local.as_ref() == "alt" {
                                    alt = Some(attr.value.to_string());
                                }
                            }
                            if let Some(src) = src {
                                if let Some(rest) = src.strip_prefix("data:") {
                                    let subtype = rest
                                        .split(&[';', ','][..])
                                        .next()
                                        .unwrap_or("octet-stream")
                                        .split('/')
                                        .nth(1)
                                        .unwrap_or("bin")
                                        .to_string();
                                    let filename = synthesize_data_uri_filename(&subtype, &src);
                                    let bytes = rest
                                        .split_once("base64,")
                                        .and_then(|(_, payload)| crate::minhash::base64_decode(payload));
                                    self.record_image_with_bytes(
                                        filename,
                                        Some(format!("image/{subtype}")),
                                        bytes,
                                    );
                                } else if let Ok(resolved) = self.base_url.join(&src) {
                                    let filename = truncate_filename(
                                        resolved
                                            .path_segments()
                                            .and_then(|mut s| s.next_back())
                                            .filter(|s| !s.is_empty())
                                            .unwrap_or_else(|| alt.as_deref().unwrap_or("image")),
                                    );
                                    self.record_image(Some(resolved), filename, None);
                                }
                            }
                        }

                        if let Some(style) = tag
                            .attrs
                            .iter()
                            .find(|a| a.name.local.as_ref() == "style")
                        {
                            if let Some(bg) = extract_css_background_image(&style.value) {
                                if !bg.starts_with("data:") {
                                    if let Ok(resolved) = self.base_url.join(&bg) {
                                        let filename = truncate_filename(
                                            resolved
                                                .path_segments()
                                                .and_then(|mut s| s.next_back())
                                                .filter(|s| !s.is_empty())
                                                .unwrap_or("background-image"),
                                        );
                                        self.record_image(Some(resolved), filename, None);
                                    }
                                }
                            }
                        }
                    }
                    html5ever::tokenizer::TagKind::EndTag => {
                        if tag_name == "title" {
                            self.in_title = false;
                        } else if tag_name == "script" || tag_name == "style" {
                            self.in_script_or_style = false;
                        } else if tag_name == "a" {
                            self.finish_pending_anchor();
                        } else if BLOCK_TAGS.contains(&tag_name.as_str()) {
                            self.finish_pending_anchor();
                        }
                    }
                }
            }
            Token::CharacterTokens(chars) => {
                let text: &str = &chars;
                if self.in_title {
                    self.title = Some(text.to_string());
                } else if !self.in_script_or_style {
                    if let Some(anchor) = self.pending_anchor.as_mut() {
                        anchor.text.push_str(text);
                    }
                    self.running_text.push_str(text);
                    self.running_text.push(' ');
                }
            }
            _ => {}
        }
        html5ever::tokenizer::TokenSinkResult::Continue
    }
}

/// Extract outbound links (with anchor context), canonical URL, title, and
/// `<img>`/CSS-background image references from an HTML body relative to
/// `base_url`.
pub fn parse(html: &str, base_url: &Url) -> PageData {
    let sink = PageDataSink::new(base_url);
    let mut tokenizer = Tokenizer::new(
        sink,
        TokenizerOpts {
            ..Default::default()
        },
    );

    let mut buffer_queue = BufferQueue::new();
    buffer_queue.push_back(
        html5ever::tendril::Tendril::from(html)
            .try_reinterpret()
            .unwrap_or_else(|_| html5ever::tendril::Tendril::from(String::new())),
    );
    let _ = tokenizer.feed(&mut buffer_queue);
    tokenizer.end();

    tokenizer.sink.get_page_data()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    #[test]
    fn extracts_anchor_links() {
        let html = r#"<html><body><a href="/about">About us</a></body></html>"#;
        let data = parse(html, &base());
        assert_eq!(data.outlinks, vec!["https://example.com/about".to_string()]);
    }

    #[test]
    fn skips_mailto_fragment_and_javascript_links() {
        let html = r#"<a href="mailto:x@y.com">mail</a><a href="#section">jump</a><a href="javascript:void(0)">js</a>"#;
        let data = parse(html, &base());
        assert!(data.outlinks.is_empty());
    }

    #[test]
    fn extracts_onclick_location_href() {
        let html = r#"<a onclick="location.href = '/redirected'">click</a>"#;
        let data = parse(html, &base());
        assert_eq!(data.outlinks, vec!["https://example.com/redirected".to_string()]);
    }

    #[test]
    fn extracts_img_src() {
        let html = r#"<img src="/pic.png">"#;
        let data = parse(html, &base());
        assert_eq!(data.images.len(), 1);
        assert_eq!(data.images[0].url, Some("https://example.com/pic.png".to_string()));
    }

    #[test]
    fn data_uri_image_is_metadata_only() {
        let html = r#"<img src="data:image/png;base64,iVBORw0KGgo=">"#;
        let data = parse(html, &base());
        assert_eq!(data.images.len(), 1);
        assert!(data.images[0].url.is_none());
        assert!(data.images[0].filename.starts_with("inline-"));
    }

    #[test]
    fn dedups_repeated_image() {
        let html = r#"<img src="/a.png"><img src="/a.png">"#;
        let data = parse(html, &base());
        assert_eq!(data.images.len(), 1);
    }

    #[test]
    fn css_background_image_harvested() {
        let html = r#"<div style="background-image:url('/bg.jpg')">content</div>"#;
        let data = parse(html, &base());
        assert_eq!(data.images.len(), 1);
        assert_eq!(data.images[0].url, Some("https://example.com/bg.jpg".to_string()));
    }

    #[test]
    fn canonical_link_extracted() {
        let html = r#"<link rel="canonical" href="/canon">"#;
        let data = parse(html, &base());
        assert_eq!(data.canonical_url, Some("https://example.com/canon".to_string()));
    }

    #[test]
    fn title_extracted() {
        let html = r#"<title>Hello World</title>"#;
        let data = parse(html, &base());
        assert_eq!(data.title, Some("Hello World".to_string()));
    }

    #[test]
    fn filename_truncation_preserves_extension() {
        let long = "a".repeat(80) + ".png";
        let truncated = truncate_filename(&long);
        assert!(truncated.len() <= 50);
        assert!(truncated.ends_with(".png"));
    }
}
