//! Deterministic fingerprinting of browser-affecting configuration.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::config::BrowserConfig;

/// A deterministic hash of the fields of a [`BrowserConfig`] that affect how
/// the browser process is launched. Used as the fleet's tier-map key (§4.1)
/// and as part of the cache key (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of_browser_config(cfg: &BrowserConfig) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!("{:?}", cfg.engine).as_bytes());
        hasher.update([cfg.headless as u8]);
        hasher.update(cfg.viewport_width.to_le_bytes());
        hasher.update(cfg.viewport_height.to_le_bytes());
        hasher.update(cfg.proxy.as_deref().unwrap_or("").as_bytes());
        hasher.update(cfg.user_agent.as_deref().unwrap_or("").as_bytes());
        hasher.update([cfg.persistent as u8]);
        hasher.update(cfg.user_data_dir.as_deref().unwrap_or("").as_bytes());
        hasher.update([cfg.stealth as u8]);
        for arg in &cfg.extra_args {
            hasher.update(arg.as_bytes());
        }
        for cookie in &cfg.cookies {
            hasher.update(cookie.name.as_bytes());
            hasher.update(cookie.value.as_bytes());
        }
        let mut header_keys: Vec<_> = cfg.headers.keys().collect();
        header_keys.sort();
        for key in header_keys {
            hasher.update(key.as_bytes());
            hasher.update(cfg.headers[key].as_bytes());
        }
        Self(hasher.finalize().into())
    }

    /// The default (no-op) fingerprint, i.e. `BrowserConfig::default()`'s.
    /// The permanent tier always serves this fingerprint.
    pub fn default_config() -> Self {
        Self::of_browser_config(&BrowserConfig::default())
    }

    pub fn as_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_configs_fingerprint_identically() {
        let a = BrowserConfig::default();
        let b = BrowserConfig::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn differing_user_agent_changes_fingerprint() {
        let a = BrowserConfig::default();
        let mut b = BrowserConfig::default();
        b.user_agent = Some("custom-ua".into());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn default_config_fingerprint_is_stable() {
        assert_eq!(Fingerprint::default_config(), BrowserConfig::default().fingerprint());
    }
}
