//! Client-reported device attributes.

use serde::{Deserialize, Serialize};

/// Raw attributes a client reports about its browser and device.
///
/// Every field defaults to the empty string so that partially populated
/// payloads still deserialize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceAttributes {
    pub user_agent: String,
    pub platform: String,
    pub browser: String,
    pub screen_resolution: String,
    pub timezone: String,
    pub language: String,
    pub color_depth: String,
    pub hardware_concurrency: String,
    pub max_touch_points: String,
    /// Opaque canvas rendering signature.
    pub canvas: String,
    /// Opaque WebGL renderer signature.
    pub webgl: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_to_empty() {
        let attrs: DeviceAttributes =
            serde_json::from_str(r#"{"userAgent":"Mozilla/5.0","screenResolution":"1920x1080"}"#)
                .unwrap();
        assert_eq!(attrs.user_agent, "Mozilla/5.0");
        assert_eq!(attrs.screen_resolution, "1920x1080");
        assert!(attrs.webgl.is_empty());
        assert!(attrs.platform.is_empty());
    }
}
