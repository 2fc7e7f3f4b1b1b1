use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub proxy: Option<String>,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 4,
            proxy: None,
            user_agent: "crawlify/0.1".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PreferentialConfig {
    pub enabled: bool,
    pub keywords: Vec<String>,
}

impl Default for PreferentialConfig {
    fn default() -> Self {
        PreferentialConfig {
            enabled: false,
            keywords: Vec::new(),
        }
    }
}

/// Engine-wide options, constructed explicitly and handed to workers by
/// shared reference rather than read from process-global state.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub db_path: String,
    pub workers: usize,
    pub max_pages_per_worker: usize,
    #[serde(with = "humantime_serde")]
    pub default_crawl_delay: Duration,
    pub minhash_permutations: usize,
    pub near_dup_threshold: f64,
    pub max_image_bytes: u64,
    pub max_binary_bytes: u64,
    pub restrict_to_seed_host: bool,
    pub http: HttpConfig,
    pub preferential: PreferentialConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            db_path: "crawlify.sqlite".to_string(),
            workers: 6,
            max_pages_per_worker: 200,
            default_crawl_delay: Duration::from_secs(5),
            minhash_permutations: 128,
            near_dup_threshold: 0.8,
            max_image_bytes: 1024 * 1024,
            max_binary_bytes: 20 * 1024 * 1024,
            restrict_to_seed_host: false,
            http: HttpConfig::default(),
            preferential: PreferentialConfig::default(),
        }
    }
}

impl Config {
    pub fn from_path(path: &str) -> Result<Self, anyhow::Error> {
        if !std::path::Path::new(path).exists() {
            return Ok(Config::default());
        }
        let file = std::fs::File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        Ok(config)
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        if !keywords.is_empty() {
            self.preferential.enabled = true;
            self.preferential.keywords = keywords;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_politeness() {
        let cfg = Config::default();
        assert_eq!(cfg.default_crawl_delay, Duration::from_secs(5));
        assert!(!cfg.restrict_to_seed_host);
    }

    #[test]
    fn with_keywords_enables_preferential() {
        let cfg = Config::default().with_keywords(vec!["research".to_string()]);
        assert!(cfg.preferential.enabled);
        assert_eq!(cfg.preferential.keywords, vec!["research".to_string()]);
    }
}
