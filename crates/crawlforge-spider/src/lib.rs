//! URL seeder, deep crawl strategies, and the adaptive crawler (§4.8-§4.10).
//!
//! None of these modules own a dispatcher or browser fleet directly — they
//! consume capabilities (`HttpClient` for the seeder, `PageCrawler` for the
//! two crawl strategies) injected by the root facade, the same
//! capability-injection pattern as the rest of the workspace (§6, §9).

pub mod adaptive;
pub mod deep_crawl;
pub mod seeder;

pub use adaptive::{AdaptiveConfig, ScoringBackend};
pub use deep_crawl::{DeepCrawlConfig, FilterContext, PageCrawler, Strategy, UrlFilter};
pub use seeder::{HeadMeta, SeedCandidate, SeederConfig, SitemapEntry};
