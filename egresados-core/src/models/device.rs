use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

/// Snapshot of the submitting device, captured once at session start and
/// immutable afterwards. Browser clients fill every field; the host
/// constructor fills what a headless process can know and leaves the rest
/// as `None`/`"unknown"`, matching the legacy payload's fallbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub user_agent: String,
    pub platform: String,
    pub language: String,
    pub screen_resolution: Option<ScreenSize>,
    pub viewport: Option<ScreenSize>,
    pub touch_support: bool,
    pub device_memory: String,
    pub hardware_concurrency: String,
    pub timezone: String,
}

impl DeviceInfo {
    /// Build a snapshot from what the current process can observe.
    pub fn from_host() -> Self {
        Self {
            user_agent: format!("egresados/{}", env!("CARGO_PKG_VERSION")),
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            language: std::env::var("LANG").unwrap_or_else(|_| "unknown".to_string()),
            screen_resolution: None,
            viewport: None,
            touch_support: false,
            device_memory: "unknown".to_string(),
            hardware_concurrency: num_cpus::get().to_string(),
            timezone: std::env::var("TZ").unwrap_or_else(|_| "unknown".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_snapshot_has_concurrency() {
        let info = DeviceInfo::from_host();
        let n: usize = info.hardware_concurrency.parse().expect("cpu count");
        assert!(n >= 1);
        assert!(info.platform.contains(std::env::consts::OS));
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let info = DeviceInfo::from_host();
        let v = serde_json::to_value(&info).unwrap();
        assert!(v.get("userAgent").is_some());
        assert!(v.get("touchSupport").is_some());
        assert!(v.get("hardwareConcurrency").is_some());
        assert!(v.get("user_agent").is_none());
    }
}
