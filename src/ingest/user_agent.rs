use regex::Regex;
use std::sync::OnceLock;

use crate::model::contexts::{BrowserContext, DeviceContext, OsContext};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserAgentInfo {
    pub browser: Option<BrowserContext>,
    pub os: Option<OsContext>,
    pub device: Option<DeviceContext>,
}

static BROWSER_PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
static OS_PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
static ANDROID_MODEL_RE: OnceLock<Regex> = OnceLock::new();

// Order matters: Edge and Opera advertise Chrome, Chrome advertises Safari.
fn browser_patterns() -> &'static [(&'static str, Regex)] {
    BROWSER_PATTERNS.get_or_init(|| {
        [
            ("Edge", r"(?:Edg|EdgA|EdgiOS|Edge)/([0-9][0-9.]*)"),
            ("Opera", r"(?:OPR|Opera)/([0-9][0-9.]*)"),
            ("Samsung Internet", r"SamsungBrowser/([0-9][0-9.]*)"),
            ("Firefox", r"(?:Firefox|FxiOS)/([0-9][0-9.]*)"),
            ("Chrome", r"(?:Chrome|CriOS)/([0-9][0-9.]*)"),
            ("Safari", r"Version/([0-9][0-9.]*)[^)]*Safari"),
        ]
        .into_iter()
        .map(|(name, pattern)| (name, Regex::new(pattern).expect("valid regex")))
        .collect()
    })
}

fn os_patterns() -> &'static [(&'static str, Regex)] {
    OS_PATTERNS.get_or_init(|| {
        [
            ("Windows", r"Windows NT ([0-9.]+)"),
            ("iOS", r"(?:iPhone|iPad|iPod).*OS ([0-9_]+)"),
            ("Mac OS X", r"Mac OS X ([0-9_.]+)"),
            ("Android", r"Android ([0-9.]+)"),
            ("Chrome OS", r"CrOS [a-z0-9_]+ ([0-9.]+)"),
            ("Linux", r"\(([Xx]11|Linux)[;)]"),
        ]
        .into_iter()
        .map(|(name, pattern)| (name, Regex::new(pattern).expect("valid regex")))
        .collect()
    })
}

fn android_model_re() -> &'static Regex {
    ANDROID_MODEL_RE.get_or_init(|| {
        Regex::new(r"Android [0-9.]+; ([^;)]+?)(?: Build|\))").expect("valid regex")
    })
}

/// Best-effort parse of a User-Agent header. Unknown agents simply yield no
/// contexts rather than a placeholder family.
pub fn parse(user_agent: &str) -> UserAgentInfo {
    UserAgentInfo {
        browser: parse_browser(user_agent),
        os: parse_os(user_agent),
        device: parse_device(user_agent),
    }
}

fn parse_browser(user_agent: &str) -> Option<BrowserContext> {
    for (name, pattern) in browser_patterns() {
        if let Some(captures) = pattern.captures(user_agent) {
            let version = captures.get(1).map(|m| m.as_str().to_owned());
            return Some(BrowserContext {
                name: (*name).to_owned(),
                version,
            });
        }
    }
    None
}

fn parse_os(user_agent: &str) -> Option<OsContext> {
    for (name, pattern) in os_patterns() {
        if let Some(captures) = pattern.captures(user_agent) {
            let version = captures
                .get(1)
                .map(|m| m.as_str().replace('_', "."))
                .filter(|v| v.chars().next().is_some_and(|c| c.is_ascii_digit()));
            return Some(OsContext {
                name: (*name).to_owned(),
                version,
            });
        }
    }
    None
}

fn parse_device(user_agent: &str) -> Option<DeviceContext> {
    if user_agent.contains("iPhone") {
        return Some(apple_device("iPhone"));
    }
    if user_agent.contains("iPad") {
        return Some(apple_device("iPad"));
    }
    if let Some(captures) = android_model_re().captures(user_agent) {
        let model = captures.get(1)?.as_str().trim();
        // Generic locale or platform tokens are not device models.
        if model.is_empty() || model.contains('/') || model.chars().count() <= 2 {
            return None;
        }
        return Some(DeviceContext {
            family: Some(model.to_owned()),
            model: Some(model.to_owned()),
            brand: None,
        });
    }
    None
}

fn apple_device(model: &str) -> DeviceContext {
    DeviceContext {
        family: Some(model.to_owned()),
        model: Some(model.to_owned()),
        brand: Some("Apple".to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1";
    const FIREFOX_LINUX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0";
    const CHROME_ANDROID: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Mobile Safari/537.36";
    const EDGE_WINDOWS: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36 Edg/126.0.2592.81";

    #[test]
    fn chrome_on_windows() {
        let info = parse(CHROME_WINDOWS);
        let browser = info.browser.unwrap();
        assert_eq!(browser.name, "Chrome");
        assert_eq!(browser.version.as_deref(), Some("126.0.0.0"));
        let os = info.os.unwrap();
        assert_eq!(os.name, "Windows");
        assert_eq!(os.version.as_deref(), Some("10.0"));
        assert!(info.device.is_none());
    }

    #[test]
    fn safari_on_iphone() {
        let info = parse(SAFARI_IPHONE);
        let browser = info.browser.unwrap();
        assert_eq!(browser.name, "Safari");
        assert_eq!(browser.version.as_deref(), Some("17.4"));
        let os = info.os.unwrap();
        assert_eq!(os.name, "iOS");
        assert_eq!(os.version.as_deref(), Some("17.4"));
        let device = info.device.unwrap();
        assert_eq!(device.model.as_deref(), Some("iPhone"));
        assert_eq!(device.brand.as_deref(), Some("Apple"));
    }

    #[test]
    fn firefox_on_linux() {
        let info = parse(FIREFOX_LINUX);
        assert_eq!(info.browser.unwrap().name, "Firefox");
        let os = info.os.unwrap();
        assert_eq!(os.name, "Linux");
        assert!(os.version.is_none());
    }

    #[test]
    fn android_device_model_is_extracted() {
        let info = parse(CHROME_ANDROID);
        assert_eq!(info.os.unwrap().name, "Android");
        let device = info.device.unwrap();
        assert_eq!(device.model.as_deref(), Some("Pixel 8"));
    }

    #[test]
    fn edge_wins_over_embedded_chrome_token() {
        let info = parse(EDGE_WINDOWS);
        let browser = info.browser.unwrap();
        assert_eq!(browser.name, "Edge");
        assert_eq!(browser.version.as_deref(), Some("126.0.2592.81"));
    }

    #[test]
    fn unknown_agent_yields_nothing() {
        let info = parse("curl/8.5.0");
        assert!(info.browser.is_none());
        assert!(info.os.is_none());
        assert!(info.device.is_none());
    }
}
