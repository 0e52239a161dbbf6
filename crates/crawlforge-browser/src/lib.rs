//! Browser Fleet Manager (§4.1) and Page Session (§4.2).
//!
//! The fleet manager owns browser lifecycle (tiered checkout/return, a
//! janitor, robots.txt caching); the page session drives the fixed
//! navigate/wait/script/scroll/capture pipeline against one checked-out
//! page. Neither module knows about content filtering or extraction —
//! those are `crawlforge-content`/`crawlforge-extraction` concerns that
//! consume a `PageSession`'s output.

pub mod fleet;
pub mod robots;
pub mod session;
pub mod stealth;
pub mod tier;

pub use fleet::{Checkout, FleetManager};
pub use robots::{RobotsCache, RobotsFetcher};
pub use session::{PageSession, PageSessionOutcome};
pub use stealth::{evasion_script, StealthPreset};
pub use tier::{FleetConfig, ManagedBrowser, Tier};
