//! Anti-detection countermeasures applied to a freshly created page
//! (§4.1 `BrowserConfig.stealth`). Scaled down from the teacher's
//! multi-module stealth controller to the one thing that's cheap and
//! portable across CDP/WebDriver backends: an init-time JS injection that
//! patches the handful of `navigator`/`window` properties headless
//! Chromium otherwise leaves as automation tells.

/// Stealth strength. `BrowserConfig.stealth` is a single on/off switch
/// (§3), so `true` maps to `Medium` -- the teacher's own preset default --
/// rather than exposing a level the config doesn't have a field for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StealthPreset {
    None,
    Low,
    Medium,
    High,
}

impl StealthPreset {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            StealthPreset::Medium
        } else {
            StealthPreset::None
        }
    }
}

/// Builds the evasion script for `preset`. Each tier adds more patches on
/// top of the previous one; `None` returns an empty string so callers can
/// skip the `evaluate` call entirely.
pub fn evasion_script(preset: StealthPreset) -> String {
    if preset == StealthPreset::None {
        return String::new();
    }

    let mut parts = vec![WEBDRIVER_PATCH.to_string()];

    if preset == StealthPreset::Medium || preset == StealthPreset::High {
        parts.push(PLUGINS_AND_LANGUAGES_PATCH.to_string());
        parts.push(CHROME_OBJECT_PATCH.to_string());
    }

    if preset == StealthPreset::High {
        parts.push(PERMISSIONS_PATCH.to_string());
        parts.push(WEBGL_VENDOR_PATCH.to_string());
    }

    parts.join("\n")
}

const WEBDRIVER_PATCH: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
"#;

const PLUGINS_AND_LANGUAGES_PATCH: &str = r#"
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
"#;

const CHROME_OBJECT_PATCH: &str = r#"
window.chrome = window.chrome || { runtime: {} };
"#;

const PERMISSIONS_PATCH: &str = r#"
const originalQuery = window.navigator.permissions.query;
window.navigator.permissions.query = (parameters) => (
    parameters.name === 'notifications'
        ? Promise.resolve({ state: Notification.permission })
        : originalQuery(parameters)
);
"#;

const WEBGL_VENDOR_PATCH: &str = r#"
const getParameter = WebGLRenderingContext.prototype.getParameter;
WebGLRenderingContext.prototype.getParameter = function (parameter) {
    if (parameter === 37445) { return 'Intel Inc.'; }
    if (parameter === 37446) { return 'Intel Iris OpenGL Engine'; }
    return getParameter.apply(this, [parameter]);
};
"#;
