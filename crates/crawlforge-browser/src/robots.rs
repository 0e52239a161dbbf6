//! robots.txt cache (§5: "robots cache is read-mostly with copy-on-write
//! updates"). Per-host entries are fetched once, parsed, and cached for
//! `ttl`; refreshes replace the whole `Arc<RobotsEntry>` rather than
//! mutating it in place, so readers never observe a half-updated ruleset.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use crawlforge_types::CrawlError;
use dashmap::DashMap;

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Fetches the raw contents of `https://{host}/robots.txt`. Implemented by
/// the crawler's HTTP client port at the composition root; kept as a small
/// trait here so the cache can be unit tested without real network access.
#[async_trait]
pub trait RobotsFetcher: Send + Sync {
    async fn fetch(&self, host: &str) -> Result<Option<String>, CrawlError>;
}

#[derive(Debug, Clone)]
struct RobotsEntry {
    rules: Vec<Rule>,
    fetched_at: Instant,
}

#[derive(Debug, Clone)]
struct Rule {
    user_agent: String,
    disallow: Vec<String>,
    allow: Vec<String>,
}

impl RobotsEntry {
    fn empty() -> Self {
        Self { rules: Vec::new(), fetched_at: Instant::now() }
    }

    fn parse(body: &str) -> Self {
        let mut rules = Vec::new();
        let mut current: Option<Rule> = None;

        for line in body.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else { continue };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim().to_string();

            match key.as_str() {
                "user-agent" => {
                    if let Some(rule) = current.take() {
                        rules.push(rule);
                    }
                    current = Some(Rule { user_agent: value, disallow: Vec::new(), allow: Vec::new() });
                }
                "disallow" if !value.is_empty() => {
                    if let Some(rule) = current.as_mut() {
                        rule.disallow.push(value);
                    }
                }
                "allow" if !value.is_empty() => {
                    if let Some(rule) = current.as_mut() {
                        rule.allow.push(value);
                    }
                }
                _ => {}
            }
        }
        if let Some(rule) = current.take() {
            rules.push(rule);
        }

        Self { rules, fetched_at: Instant::now() }
    }

    fn is_stale(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() >= ttl
    }

    /// Longest-matching-prefix rule wins, scoped to rules that apply to
    /// `user_agent` (exact match or the `*` wildcard group).
    fn allows(&self, path: &str, user_agent: &str) -> bool {
        let applicable: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|r| r.user_agent == "*" || r.user_agent.eq_ignore_ascii_case(user_agent))
            .collect();

        let mut best_len = -1i64;
        let mut best_allow = true;

        for rule in applicable {
            for pattern in &rule.disallow {
                if path.starts_with(pattern.as_str()) && pattern.len() as i64 > best_len {
                    best_len = pattern.len() as i64;
                    best_allow = false;
                }
            }
            for pattern in &rule.allow {
                if path.starts_with(pattern.as_str()) && pattern.len() as i64 > best_len {
                    best_len = pattern.len() as i64;
                    best_allow = true;
                }
            }
        }
        best_allow
    }
}

pub struct RobotsCache {
    fetcher: Arc<dyn RobotsFetcher>,
    ttl: Duration,
    entries: DashMap<String, Arc<RobotsEntry>>,
}

impl RobotsCache {
    pub fn new(fetcher: Arc<dyn RobotsFetcher>) -> Self {
        Self { fetcher, ttl: DEFAULT_TTL, entries: DashMap::new() }
    }

    pub fn with_ttl(fetcher: Arc<dyn RobotsFetcher>, ttl: Duration) -> Self {
        Self { fetcher, ttl, entries: DashMap::new() }
    }

    /// Returns whether `path` on `host` is allowed for `user_agent`. A
    /// missing or unfetchable robots.txt is treated as allow-all.
    pub async fn is_allowed(&self, host: &str, path: &str, user_agent: &str) -> Result<bool, CrawlError> {
        let entry = self.entry(host).await?;
        Ok(entry.allows(path, user_agent))
    }

    async fn entry(&self, host: &str) -> Result<Arc<RobotsEntry>, CrawlError> {
        if let Some(entry) = self.entries.get(host) {
            if !entry.is_stale(self.ttl) {
                return Ok(entry.clone());
            }
        }

        let fresh = match self.fetcher.fetch(host).await? {
            Some(body) => Arc::new(RobotsEntry::parse(&body)),
            None => Arc::new(RobotsEntry::empty()),
        };
        self.entries.insert(host.to_string(), fresh.clone());
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticFetcher(Option<String>);

    #[async_trait]
    impl RobotsFetcher for StaticFetcher {
        async fn fetch(&self, _host: &str) -> Result<Option<String>, CrawlError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn missing_robots_allows_everything() {
        let cache = RobotsCache::new(Arc::new(StaticFetcher(None)));
        assert!(cache.is_allowed("example.com", "/private", "crawlforge").await.unwrap());
    }

    #[tokio::test]
    async fn disallow_blocks_matching_prefix() {
        let body = "User-agent: *\nDisallow: /private\n";
        let cache = RobotsCache::new(Arc::new(StaticFetcher(Some(body.into()))));
        assert!(!cache.is_allowed("example.com", "/private/x", "crawlforge").await.unwrap());
        assert!(cache.is_allowed("example.com", "/public", "crawlforge").await.unwrap());
    }

    #[tokio::test]
    async fn longest_match_wins_between_allow_and_disallow() {
        let body = "User-agent: *\nDisallow: /a\nAllow: /a/b\n";
        let cache = RobotsCache::new(Arc::new(StaticFetcher(Some(body.into()))));
        assert!(cache.is_allowed("example.com", "/a/b/c", "crawlforge").await.unwrap());
        assert!(!cache.is_allowed("example.com", "/a/x", "crawlforge").await.unwrap());
    }

    #[tokio::test]
    async fn specific_user_agent_rule_takes_precedence_group() {
        let body = "User-agent: crawlforge\nDisallow: /only-us\nUser-agent: *\nDisallow: /all\n";
        let cache = RobotsCache::new(Arc::new(StaticFetcher(Some(body.into()))));
        assert!(!cache.is_allowed("example.com", "/only-us", "crawlforge").await.unwrap());
        assert!(!cache.is_allowed("example.com", "/all", "crawlforge").await.unwrap());
    }
}
