//! Device fingerprinting and human-readable device descriptions.
//!
//! A fingerprint is a stable SHA-256 digest over the raw attributes a
//! client reports. Each attribute is length-prefixed before hashing so
//! that no two distinct attribute tuples can produce the same input.

use coursegate_core::models::device::DeviceAttributes;
use sha2::{Digest, Sha256};

/// Compute the fingerprint of a device, as 64 lowercase hex characters.
pub fn fingerprint(attrs: &DeviceAttributes) -> String {
    let fields = [
        &attrs.user_agent,
        &attrs.platform,
        &attrs.browser,
        &attrs.screen_resolution,
        &attrs.timezone,
        &attrs.language,
        &attrs.color_depth,
        &attrs.hardware_concurrency,
        &attrs.max_touch_points,
        &attrs.canvas,
        &attrs.webgl,
    ];

    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update((field.len() as u64).to_be_bytes());
        hasher.update(field.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
}

impl DeviceClass {
    /// Classify by substring matching on the user agent.
    pub fn from_user_agent(user_agent: &str) -> Self {
        let ua = user_agent.to_ascii_lowercase();
        if ua.contains("ipad") || ua.contains("tablet") || (ua.contains("android") && !ua.contains("mobile")) {
            Self::Tablet
        } else if ua.contains("mobi") || ua.contains("iphone") || ua.contains("android") {
            Self::Mobile
        } else {
            Self::Desktop
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
            Self::Desktop => "desktop",
        }
    }
}

/// Describe a device as `"<Browser> on <Platform> (<class>)"`,
/// e.g. `"Firefox on Linux (desktop)"`.
pub fn describe(attrs: &DeviceAttributes) -> String {
    format!(
        "{} on {} ({})",
        capitalize(&attrs.browser),
        capitalize(&attrs.platform),
        DeviceClass::from_user_agent(&attrs.user_agent).as_str()
    )
}

fn capitalize(word: &str) -> String {
    let word = word.trim();
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Unknown".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn laptop() -> DeviceAttributes {
        DeviceAttributes {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0".into(),
            platform: "linux".into(),
            browser: "firefox".into(),
            screen_resolution: "1920x1080".into(),
            timezone: "Europe/Berlin".into(),
            language: "de-DE".into(),
            color_depth: "24".into(),
            hardware_concurrency: "8".into(),
            max_touch_points: "0".into(),
            canvas: "c4nv4s".into(),
            webgl: "w3bgl".into(),
        }
    }

    #[test]
    fn fingerprint_is_deterministic_hex() {
        let fp = fingerprint(&laptop());
        assert_eq!(fp, fingerprint(&laptop()));
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn any_attribute_change_alters_fingerprint() {
        let base = fingerprint(&laptop());
        let mut other = laptop();
        other.timezone = "Europe/Paris".into();
        assert_ne!(base, fingerprint(&other));
    }

    #[test]
    fn shifted_boundaries_do_not_collide() {
        let mut a = DeviceAttributes::default();
        a.user_agent = "ab".into();
        a.platform = "c".into();
        let mut b = DeviceAttributes::default();
        b.user_agent = "a".into();
        b.platform = "bc".into();
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn describes_desktop_browser() {
        assert_eq!(describe(&laptop()), "Firefox on Linux (desktop)");
    }

    #[test]
    fn classifies_mobile_and_tablet() {
        assert_eq!(
            DeviceClass::from_user_agent("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0) Mobile/15E148"),
            DeviceClass::Mobile
        );
        assert_eq!(
            DeviceClass::from_user_agent("Mozilla/5.0 (Linux; Android 14; Pixel 8) Mobile Safari"),
            DeviceClass::Mobile
        );
        assert_eq!(
            DeviceClass::from_user_agent("Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X)"),
            DeviceClass::Tablet
        );
        assert_eq!(
            DeviceClass::from_user_agent("Mozilla/5.0 (Linux; Android 14; SM-X710) Safari"),
            DeviceClass::Tablet
        );
    }

    #[test]
    fn missing_names_read_as_unknown() {
        assert_eq!(
            describe(&DeviceAttributes::default()),
            "Unknown on Unknown (desktop)"
        );
    }
}
