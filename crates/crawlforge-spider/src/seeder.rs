//! URL Seeder (§4.8): discovers candidate URLs for a domain via sitemap
//! mining and a Common Crawl index query, then normalizes, filters, scores,
//! and optionally liveness-checks them.
//!
//! Failure of any one source is a warning, not a seeder failure — callers
//! get whatever sources succeeded.

use std::collections::HashSet;
use std::time::Duration;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crawlforge_content::bm25::{normalize, Bm25Corpus};
use crawlforge_reliability::rate_limiter::{HostRateLimiter, RateLimiterConfig};
use crawlforge_types::ports::HttpClient;

#[derive(Debug, Clone, PartialEq)]
pub struct SitemapEntry {
    pub url: String,
    pub last_modified: Option<String>,
    pub change_frequency: Option<String>,
    pub priority: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct HeadMeta {
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct SeedCandidate {
    pub url: String,
    pub head: Option<HeadMeta>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct SeederConfig {
    /// Glob pattern (`*`/`?`) the candidate URL must match; `None` accepts
    /// everything.
    pub pattern: Option<String>,
    /// Query used for BM25 scoring against fetched head metadata; also the
    /// Common Crawl index name to query, e.g. `CC-MAIN-2024-10`, when set.
    pub query: Option<String>,
    pub common_crawl_index: Option<String>,
    pub fetch_head: bool,
    pub liveness_check: bool,
    pub concurrency: usize,
    pub hits_per_sec: f64,
    pub max_urls: usize,
    /// Recursion bound for sitemap indexes (spec: "recursive including
    /// sitemap indexes").
    pub sitemap_max_depth: usize,
    pub fetch_timeout: Duration,
}

impl Default for SeederConfig {
    fn default() -> Self {
        Self {
            pattern: None,
            query: None,
            common_crawl_index: None,
            fetch_head: false,
            liveness_check: false,
            concurrency: 5,
            hits_per_sec: 5.0,
            max_urls: 1000,
            sitemap_max_depth: 5,
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

enum ParsedSitemap {
    UrlSet(Vec<SitemapEntry>),
    Index(Vec<String>),
}

/// Parses one sitemap document, distinguishing a `<urlset>` from a
/// `<sitemapindex>`. Namespace-tolerant: `xml-rs` strips the namespace
/// prefix into `local_name`, so `<ns:loc>` and `<loc>` are both matched by
/// tracking only the unprefixed tag stack.
fn parse_sitemap_xml(content: &str) -> Result<ParsedSitemap, String> {
    use xml::reader::{EventReader, XmlEvent};

    let parser = EventReader::from_str(content);
    let mut stack: Vec<String> = Vec::new();
    let mut is_index = false;

    let mut entries = Vec::new();
    let mut children = Vec::new();

    let mut cur_loc: Option<String> = None;
    let mut cur_lastmod: Option<String> = None;
    let mut cur_changefreq: Option<String> = None;
    let mut cur_priority: Option<f64> = None;

    for event in parser {
        match event.map_err(|e| format!("malformed sitemap xml: {e}"))? {
            XmlEvent::StartElement { name, .. } => {
                if name.local_name == "sitemapindex" {
                    is_index = true;
                }
                stack.push(name.local_name);
            }
            XmlEvent::Characters(data) | XmlEvent::CData(data) => {
                let text = data.trim();
                if text.is_empty() {
                    continue;
                }
                match stack.last().map(String::as_str) {
                    Some("loc") => cur_loc = Some(text.to_string()),
                    Some("lastmod") => cur_lastmod = Some(text.to_string()),
                    Some("changefreq") => cur_changefreq = Some(text.to_string()),
                    Some("priority") => cur_priority = text.parse().ok(),
                    _ => {}
                }
            }
            XmlEvent::EndElement { name } => {
                match name.local_name.as_str() {
                    "url" => {
                        if let Some(loc) = cur_loc.take() {
                            entries.push(SitemapEntry {
                                url: loc,
                                last_modified: cur_lastmod.take(),
                                change_frequency: cur_changefreq.take(),
                                priority: cur_priority.take(),
                            });
                        }
                        cur_lastmod = None;
                        cur_changefreq = None;
                        cur_priority = None;
                    }
                    "sitemap" => {
                        if let Some(loc) = cur_loc.take() {
                            children.push(loc);
                        }
                        cur_lastmod = None;
                    }
                    _ => {}
                }
                stack.pop();
            }
            _ => {}
        }
    }

    Ok(if is_index { ParsedSitemap::Index(children) } else { ParsedSitemap::UrlSet(entries) })
}

/// Recursively fetches and parses sitemaps, following `<sitemapindex>`
/// children up to `max_depth`. One unreachable or malformed sitemap is
/// skipped, not fatal to the others.
async fn mine_sitemaps(
    http: &dyn HttpClient,
    start_urls: Vec<String>,
    timeout: Duration,
    max_depth: usize,
) -> Vec<SitemapEntry> {
    let mut entries = Vec::new();
    let mut visited = HashSet::new();
    let mut frontier: Vec<(String, usize)> = start_urls.into_iter().map(|u| (u, 0)).collect();

    while let Some((url, depth)) = frontier.pop() {
        if depth > max_depth || !visited.insert(url.clone()) {
            continue;
        }

        let body = match http.get(&url, timeout).await {
            Ok(resp) => resp.body,
            Err(e) => {
                tracing::warn!(sitemap = %url, error = %e, "url seeder: sitemap fetch failed, skipping");
                continue;
            }
        };
        let content = String::from_utf8_lossy(&body);

        match parse_sitemap_xml(&content) {
            Ok(ParsedSitemap::UrlSet(mut found)) => entries.append(&mut found),
            Ok(ParsedSitemap::Index(children)) => {
                frontier.extend(children.into_iter().map(|c| (c, depth + 1)));
            }
            Err(e) => {
                tracing::warn!(sitemap = %url, error = %e, "url seeder: sitemap parse failed, skipping");
            }
        }
    }

    entries
}

/// Scans `robots.txt` for `Sitemap:` directives (RFC 9309), case-insensitive.
async fn discover_sitemaps_from_robots(http: &dyn HttpClient, domain: &str, timeout: Duration) -> Vec<String> {
    let robots_url = format!("https://{domain}/robots.txt");
    let body = match http.get(&robots_url, timeout).await {
        Ok(resp) => resp.body,
        Err(e) => {
            tracing::warn!(%domain, error = %e, "url seeder: robots.txt fetch failed");
            return Vec::new();
        }
    };
    let text = String::from_utf8_lossy(&body);

    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            let lower = line.to_lowercase();
            lower.strip_prefix("sitemap:").map(|_| line[9..].trim().to_string())
        })
        .collect()
}

/// Queries the Common Crawl CDX index for URLs under `domain`. Best-effort:
/// any failure (network, non-JSON line, missing index name) yields an empty
/// result and a warning rather than failing the whole seed.
async fn query_common_crawl(http: &dyn HttpClient, domain: &str, index: &str, timeout: Duration) -> Vec<String> {
    let api = format!(
        "https://index.commoncrawl.org/{index}-index?url={domain}/*&output=json",
        index = index,
        domain = domain
    );
    let body = match http.get(&api, timeout).await {
        Ok(resp) => resp.body,
        Err(e) => {
            tracing::warn!(%domain, %index, error = %e, "url seeder: common crawl query failed");
            return Vec::new();
        }
    };
    let text = String::from_utf8_lossy(&body);

    text.lines()
        .filter_map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).ok()?;
            value.get("url").and_then(|u| u.as_str()).map(|s| s.to_string())
        })
        .collect()
}

/// Lowercases the host, drops the default port for the scheme, and collapses
/// an empty path to `/`.
pub(crate) fn normalize_url(raw: &str) -> Option<String> {
    let mut parsed = Url::parse(raw).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    parsed.set_host(Some(&host)).ok()?;

    let default_port = match parsed.scheme() {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    };
    if parsed.port() == default_port {
        let _ = parsed.set_port(None);
    }

    if parsed.path().is_empty() {
        parsed.set_path("/");
    }

    Some(parsed.to_string())
}

/// Translates a `*`/`?` glob into an anchored regex and matches `url`
/// against it.
fn glob_match(pattern: &str, url: &str) -> bool {
    let mut regex_str = String::from("^");
    for ch in pattern.chars() {
        match ch {
            '*' => regex_str.push_str(".*"),
            '?' => regex_str.push('.'),
            c => regex_str.push_str(&regex::escape(&c.to_string())),
        }
    }
    regex_str.push('$');
    Regex::new(&regex_str).map(|re| re.is_match(url)).unwrap_or(false)
}

fn meta_selector(name: &str) -> Option<Selector> {
    Selector::parse(&format!(r#"meta[name="{name}"]"#)).ok()
}

async fn fetch_head_meta(http: &dyn HttpClient, url: &str, timeout: Duration) -> Option<HeadMeta> {
    let resp = http.get(url, timeout).await.ok()?;
    let body = String::from_utf8_lossy(&resp.body);
    let doc = Html::parse_document(&body);

    let title_sel = Selector::parse("title").ok()?;
    let title = doc.select(&title_sel).next().map(|el| el.text().collect::<String>().trim().to_string());

    let description = meta_selector("description")
        .and_then(|sel| doc.select(&sel).next().and_then(|el| el.value().attr("content")))
        .map(|s| s.to_string());

    let keywords = meta_selector("keywords")
        .and_then(|sel| doc.select(&sel).next().and_then(|el| el.value().attr("content")))
        .map(|s| s.split(',').map(|k| k.trim().to_string()).filter(|k| !k.is_empty()).collect());

    Some(HeadMeta { title, description, keywords })
}

async fn liveness_filter(
    http: &dyn HttpClient,
    candidates: Vec<SeedCandidate>,
    cfg: &SeederConfig,
) -> Vec<SeedCandidate> {
    let limiter = HostRateLimiter::new(RateLimiterConfig {
        base_delay_min: Duration::from_secs_f64(1.0 / cfg.hits_per_sec.max(0.001)),
        base_delay_max: Duration::from_secs_f64(1.0 / cfg.hits_per_sec.max(0.001)),
        ..RateLimiterConfig::default()
    });

    let mut alive = Vec::with_capacity(candidates.len());
    for chunk in candidates.chunks(cfg.concurrency.max(1)) {
        for candidate in chunk {
            let host = Url::parse(&candidate.url).ok().and_then(|u| u.host_str().map(|h| h.to_string()));
            if let Some(host) = &host {
                limiter.acquire(host).await;
            }
            match http.head(&candidate.url, cfg.fetch_timeout).await {
                Ok(resp) if resp.status_code < 400 => {
                    if let Some(host) = &host {
                        limiter.on_success(host);
                    }
                    alive.push(candidate.clone());
                }
                _ => {
                    tracing::debug!(url = %candidate.url, "url seeder: liveness check failed, dropping candidate");
                }
            }
        }
    }
    alive
}

/// Runs the full URL Seeder pipeline (§4.8): union of sources → normalize →
/// dedupe → glob filter → optional head/meta fetch → optional BM25 scoring
/// → optional liveness check → sort by score descending, truncate.
pub async fn seed(domain: &str, cfg: &SeederConfig, http: &dyn HttpClient) -> Vec<SeedCandidate> {
    let sitemap_starts = discover_sitemaps_from_robots(http, domain, cfg.fetch_timeout).await;
    let sitemap_entries = if sitemap_starts.is_empty() {
        Vec::new()
    } else {
        mine_sitemaps(http, sitemap_starts, cfg.fetch_timeout, cfg.sitemap_max_depth).await
    };

    let common_crawl_urls = if let Some(index) = &cfg.common_crawl_index {
        query_common_crawl(http, domain, index, cfg.fetch_timeout).await
    } else {
        Vec::new()
    };

    let mut seen = HashSet::new();
    let mut normalized = Vec::new();
    for raw in sitemap_entries.into_iter().map(|e| e.url).chain(common_crawl_urls) {
        if let Some(url) = normalize_url(&raw) {
            if seen.insert(url.clone()) {
                normalized.push(url);
            }
        }
    }

    let filtered: Vec<String> = match &cfg.pattern {
        Some(pattern) => normalized.into_iter().filter(|u| glob_match(pattern, u)).collect(),
        None => normalized,
    };

    let mut candidates: Vec<SeedCandidate> = Vec::with_capacity(filtered.len());
    for url in filtered {
        let head = if cfg.fetch_head {
            fetch_head_meta(http, &url, cfg.fetch_timeout).await
        } else {
            None
        };
        candidates.push(SeedCandidate { url, head, score: None });
    }

    if let Some(query) = &cfg.query {
        let docs: Vec<String> = candidates
            .iter()
            .map(|c| {
                c.head
                    .as_ref()
                    .map(|h| format!("{} {}", h.title.clone().unwrap_or_default(), h.description.clone().unwrap_or_default()))
                    .unwrap_or_default()
            })
            .collect();
        let doc_refs: Vec<&str> = docs.iter().map(String::as_str).collect();
        let corpus = Bm25Corpus::new(&doc_refs);
        let scores = corpus.scores(query);
        for (candidate, raw_score) in candidates.iter_mut().zip(scores) {
            candidate.score = Some(normalize(raw_score));
        }
    }

    let mut candidates = if cfg.liveness_check {
        liveness_filter(http, candidates, cfg).await
    } else {
        candidates
    };

    candidates.sort_by(|a, b| b.score.unwrap_or(0.0).partial_cmp(&a.score.unwrap_or(0.0)).unwrap());
    candidates.truncate(cfg.max_urls);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_urlset_tracking_element_context() {
        let xml = r#"<?xml version="1.0"?>
            <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
              <url>
                <loc>https://example.com/a</loc>
                <lastmod>2024-01-01</lastmod>
                <priority>0.8</priority>
              </url>
              <url><loc>https://example.com/b</loc></url>
            </urlset>"#;
        match parse_sitemap_xml(xml).unwrap() {
            ParsedSitemap::UrlSet(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].url, "https://example.com/a");
                assert_eq!(entries[0].priority, Some(0.8));
                assert!(entries[1].priority.is_none());
            }
            ParsedSitemap::Index(_) => panic!("expected a urlset"),
        }
    }

    #[test]
    fn parses_sitemap_index_children() {
        let xml = r#"<sitemapindex>
            <sitemap><loc>https://example.com/sitemap-a.xml</loc></sitemap>
            <sitemap><loc>https://example.com/sitemap-b.xml</loc></sitemap>
        </sitemapindex>"#;
        match parse_sitemap_xml(xml).unwrap() {
            ParsedSitemap::Index(children) => assert_eq!(children.len(), 2),
            ParsedSitemap::UrlSet(_) => panic!("expected an index"),
        }
    }

    #[test]
    fn namespaced_loc_tags_are_still_matched() {
        let xml = r#"<ns:urlset xmlns:ns="http://www.sitemaps.org/schemas/sitemap/0.9">
            <ns:url><ns:loc>https://example.com/c</ns:loc></ns:url>
        </ns:urlset>"#;
        match parse_sitemap_xml(xml).unwrap() {
            ParsedSitemap::UrlSet(entries) => assert_eq!(entries[0].url, "https://example.com/c"),
            ParsedSitemap::Index(_) => panic!("expected a urlset"),
        }
    }

    #[test]
    fn mismatched_tags_are_a_parse_error() {
        assert!(parse_sitemap_xml("<urlset><url><loc>https://example.com/a</loc></not-url></urlset>").is_err());
    }

    #[test]
    fn normalizes_host_case_default_port_and_empty_path() {
        assert_eq!(normalize_url("HTTPS://Example.COM:443").unwrap(), "https://example.com/");
        assert_eq!(normalize_url("http://example.com:8080/x").unwrap(), "http://example.com:8080/x");
    }

    #[test]
    fn glob_matches_wildcards() {
        assert!(glob_match("https://example.com/blog/*", "https://example.com/blog/post-1"));
        assert!(!glob_match("https://example.com/blog/*", "https://example.com/docs/post-1"));
    }
}
