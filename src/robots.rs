use crate::classifier::{url_extension, ALWAYS_ALLOWED_EXTENSIONS};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleType {
    Allow,
    Disallow,
}

#[derive(Debug, Clone)]
struct Rule {
    rule_type: RuleType,
    path_prefix: String,
}

/// Parsed robots.txt policy for one host. Cheap to clone-by-reference
/// (stored behind `Arc` in the cache) since rule lists are typically small.
#[derive(Debug, Clone)]
pub struct RobotsPolicy {
    rules: Vec<Rule>,
    pub sitemaps: Vec<String>,
    pub crawl_delay: Duration,
    pub raw_text: Option<String>,
}

impl Default for RobotsPolicy {
    fn default() -> Self {
        RobotsPolicy {
            rules: Vec::new(),
            sitemaps: Vec::new(),
            crawl_delay: Duration::from_secs(5),
            raw_text: None,
        }
    }
}

impl RobotsPolicy {
    /// Parse robots.txt text, keeping rules for the given user agent and
    /// falling back to the wildcard `*` agent group. Matches
    /// `original_source/crawler.py::CustomRobotsParser.parse_robots_txt`.
    pub fn parse(text: &str, user_agent: &str) -> Self {
        let mut rules = Vec::new();
        let mut sitemaps = Vec::new();
        let mut crawl_delay = Duration::from_secs(5);

        let mut groups_for_us: Vec<Vec<Rule>> = Vec::new();
        let mut current_agent: Option<String> = None;
        let mut current_group: Vec<Rule> = Vec::new();
        let mut current_group_applies = false;
        let mut current_group_delay: Option<Duration> = None;

        let flush_group = |groups_for_us: &mut Vec<Vec<Rule>>,
                            applies: bool,
                            group: Vec<Rule>| {
            if applies && !group.is_empty() {
                groups_for_us.push(group);
            }
        };

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key_raw, value_raw)) = line.split_once(':') else {
                continue;
            };
            let key = key_raw.trim().to_lowercase();
            let value = value_raw.trim();

            match key.as_str() {
                "user-agent" => {
                    flush_group(
                        &mut groups_for_us,
                        current_group_applies,
                        std::mem::take(&mut current_group),
                    );
                    if let Some(d) = current_group_delay.take() {
                        if current_group_applies {
                            crawl_delay = d;
                        }
                    }
                    let agent = value.to_string();
                    current_group_applies =
                        agent == "*" || agent.eq_ignore_ascii_case(user_agent);
                    current_agent = Some(agent);
                }
                "disallow" if current_agent.is_some() => {
                    if !value.is_empty() {
                        current_group.push(Rule {
                            rule_type: RuleType::Disallow,
                            path_prefix: value.to_string(),
                        });
                    }
                }
                "allow" if current_agent.is_some() => {
                    if !value.is_empty() {
                        current_group.push(Rule {
                            rule_type: RuleType::Allow,
                            path_prefix: value.to_string(),
                        });
                    }
                }
                "crawl-delay" if current_agent.is_some() => {
                    if let Ok(secs) = value.parse::<f64>() {
                        current_group_delay = Some(Duration::from_secs_f64(secs));
                    }
                }
                "sitemap" => {
                    sitemaps.push(value.to_string());
                }
                _ => {}
            }
        }
        flush_group(&mut groups_for_us, current_group_applies, current_group);
        if let Some(d) = current_group_delay {
            if current_group_applies {
                crawl_delay = d;
            }
        }

        for group in groups_for_us {
            rules.extend(group);
        }

        RobotsPolicy {
            rules,
            sitemaps,
            crawl_delay,
            raw_text: Some(text.to_string()),
        }
    }

    /// Longest-prefix-match decision: "allow" wins ties with "disallow" only
    /// on equal length; more specific (longer prefix) always wins; absent
    /// rules means allowed. The binary-document extension carve-out is
    /// checked first and always wins, per spec.md §4.2.
    pub fn allowed(&self, url: &Url) -> bool {
        if let Some(ext) = url_extension(url) {
            if ALWAYS_ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
                return true;
            }
        }

        let path = url.path();
        let mut best_len: i64 = -1;
        let mut best_allow = true;

        for rule in &self.rules {
            if path.starts_with(rule.path_prefix.as_str()) {
                let len = rule.path_prefix.len() as i64;
                let is_allow = rule.rule_type == RuleType::Allow;
                if len > best_len || (len == best_len && is_allow) {
                    best_len = len;
                    best_allow = is_allow;
                }
            }
        }

        best_allow
    }
}

/// Per-host robots.txt cache. Fetched lazily on first use per host with a
/// bounded timeout; any fetch error yields the default policy (allow all,
/// 5s delay) rather than blocking the crawl.
#[derive(Clone)]
pub struct RobotsCache {
    policies: Arc<DashMap<String, Arc<RobotsPolicy>>>,
    user_agent: String,
}

impl RobotsCache {
    pub fn new(user_agent: impl Into<String>) -> Self {
        RobotsCache {
            policies: Arc::new(DashMap::new()),
            user_agent: user_agent.into(),
        }
    }

    pub fn get_cached(&self, host: &str) -> Option<Arc<RobotsPolicy>> {
        self.policies.get(host).map(|entry| entry.clone())
    }

    pub async fn fetch_and_cache(
        &self,
        client: &reqwest::Client,
        base: &Url,
    ) -> Arc<RobotsPolicy> {
        let host = base.host_str().unwrap_or_default().to_string();
        if let Some(existing) = self.get_cached(&host) {
            return existing;
        }

        let policy = match base.join("/robots.txt") {
            Ok(robots_url) => {
                match tokio::time::timeout(
                    Duration::from_secs(5),
                    client.get(robots_url).header("User-Agent", &self.user_agent).send(),
                )
                .await
                {
                    Ok(Ok(resp)) if resp.status().is_success() => match resp.text().await {
                        Ok(text) => RobotsPolicy::parse(&text, &self.user_agent),
                        Err(_) => RobotsPolicy::default(),
                    },
                    _ => RobotsPolicy::default(),
                }
            }
            Err(_) => RobotsPolicy::default(),
        };

        let policy = Arc::new(policy);
        self.policies.insert(host, policy.clone());
        policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_prefix_wins() {
        let text = "User-agent: *\nDisallow: /private\nAllow: /private/public\n";
        let policy = RobotsPolicy::parse(text, "crawlify");
        assert!(!policy.allowed(&Url::parse("https://h/private/x").unwrap()));
        assert!(policy.allowed(&Url::parse("https://h/private/public/x").unwrap()));
    }

    #[test]
    fn equal_length_ties_favor_allow() {
        let text = "User-agent: *\nDisallow: /a\nAllow: /a\n";
        let policy = RobotsPolicy::parse(text, "crawlify");
        assert!(policy.allowed(&Url::parse("https://h/a").unwrap()));
    }

    #[test]
    fn absent_rule_is_allowed() {
        let policy = RobotsPolicy::default();
        assert!(policy.allowed(&Url::parse("https://h/anything").unwrap()));
    }

    #[test]
    fn binary_extension_carve_out_overrides_disallow() {
        let text = "User-agent: *\nDisallow: /\n";
        let policy = RobotsPolicy::parse(text, "crawlify");
        assert!(policy.allowed(&Url::parse("https://h/terms.pdf").unwrap()));
        assert!(!policy.allowed(&Url::parse("https://h/page").unwrap()));
    }

    #[test]
    fn crawl_delay_parsed() {
        let text = "User-agent: *\nCrawl-delay: 2\nDisallow: /private\n";
        let policy = RobotsPolicy::parse(text, "crawlify");
        assert_eq!(policy.crawl_delay, Duration::from_secs(2));
    }

    #[test]
    fn sitemaps_collected_regardless_of_agent() {
        let text = "User-agent: *\nDisallow: /\nSitemap: https://h/sitemap.xml\n";
        let policy = RobotsPolicy::parse(text, "crawlify");
        assert_eq!(policy.sitemaps, vec!["https://h/sitemap.xml".to_string()]);
    }
}
