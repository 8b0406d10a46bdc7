// Privacy Guard — Store data models

use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-package, per-category monitor setting for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorPolicy {
    pub user_id: i32,
    pub package_id: String,
    pub privacy_id: String,
    /// 0 = monitoring off, anything else = on.
    pub monitor_policy: i32,
}

impl MonitorPolicy {
    pub fn is_enabled(&self) -> bool {
        self.monitor_policy != 0
    }

    /// `user|package|category`, the key format of the bulk policy listing.
    pub fn composite_key(&self) -> String {
        format!("{}|{}|{}", self.user_id, self.package_id, self.privacy_id)
    }
}

impl fmt::Display for MonitorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {} = {}",
            self.package_id,
            self.user_id,
            self.privacy_id,
            if self.is_enabled() { "on" } else { "off" }
        )
    }
}

/// One recorded privacy access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub user_id: i32,
    pub package_id: String,
    pub privacy_id: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
}

/// An aggregate row of a usage report: a package or category name and how
/// many accesses fell inside the requested window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCount {
    pub name: String,
    pub count: i32,
}

impl UsageCount {
    pub fn new(name: impl Into<String>, count: i32) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

/// Inclusive time window, in seconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: i64,
    pub end: i64,
}

impl DateRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_key_format() {
        let policy = MonitorPolicy {
            user_id: 1,
            package_id: "org.example.app".to_string(),
            privacy_id: "http://tizen.org/privacy/location".to_string(),
            monitor_policy: 1,
        };
        assert_eq!(
            policy.composite_key(),
            "1|org.example.app|http://tizen.org/privacy/location"
        );
        assert!(policy.is_enabled());
        assert!(policy.to_string().ends_with("= on"));
    }
}
