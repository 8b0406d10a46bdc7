// Privacy Guard — Privilege to Privacy Category Mapping
//
// Many capability identifiers (privileges) map onto one privacy category.
// The table is configurable; the built-in defaults cover the categories the
// daemon reports on.

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Resolves privileges to privacy categories.
pub trait PrivacyMapper: Send + Sync {
    /// The category a privilege belongs to, if it is privacy-relevant.
    fn privacy_id(&self, privilege: &str) -> Option<&str>;

    /// Whether `privacy_id` names a known category.
    fn is_valid_privacy_id(&self, privacy_id: &str) -> bool;

    /// Every known category, sorted.
    fn privacy_ids(&self) -> Vec<String>;

    /// Map a list of privileges to the distinct categories they cover,
    /// sorted. Unmapped privileges are dropped.
    fn privacy_ids_for(&self, privileges: &[String]) -> Vec<String> {
        privileges
            .iter()
            .filter_map(|p| self.privacy_id(p))
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Default category → privilege table.
pub fn default_privacy_map() -> BTreeMap<String, Vec<String>> {
    const PRIVACY: &str = "http://tizen.org/privacy/";
    const PRIVILEGE: &str = "http://tizen.org/privilege/";

    let table: [(&str, &[&str]); 5] = [
        ("location", &["location"]),
        ("contact", &["contact.read", "contact.write"]),
        ("calendar", &["calendar.read", "calendar.write"]),
        (
            "messaging",
            &[
                "messaging.read",
                "messaging.write",
                "messaging.send",
                "messaging.sms",
                "messaging.mms",
                "messaging.email",
            ],
        ),
        ("callhistory", &["callhistory.read", "callhistory.write"]),
    ];

    table
        .iter()
        .map(|(category, privileges)| {
            (
                format!("{}{}", PRIVACY, category),
                privileges
                    .iter()
                    .map(|p| format!("{}{}", PRIVILEGE, p))
                    .collect(),
            )
        })
        .collect()
}

/// In-memory lookup table built from a category → privileges map.
#[derive(Debug, Clone)]
pub struct StaticPrivacyMap {
    by_privilege: HashMap<String, String>,
    categories: BTreeSet<String>,
}

impl StaticPrivacyMap {
    pub fn new(table: &BTreeMap<String, Vec<String>>) -> Self {
        let mut by_privilege = HashMap::new();
        let mut categories = BTreeSet::new();
        for (category, privileges) in table {
            categories.insert(category.clone());
            for privilege in privileges {
                if let Some(previous) = by_privilege.insert(privilege.clone(), category.clone()) {
                    tracing::warn!(
                        %privilege,
                        %previous,
                        %category,
                        "Privilege mapped to more than one category; keeping the last"
                    );
                }
            }
        }
        Self {
            by_privilege,
            categories,
        }
    }
}

impl Default for StaticPrivacyMap {
    fn default() -> Self {
        Self::new(&default_privacy_map())
    }
}

impl PrivacyMapper for StaticPrivacyMap {
    fn privacy_id(&self, privilege: &str) -> Option<&str> {
        self.by_privilege.get(privilege).map(String::as_str)
    }

    fn is_valid_privacy_id(&self, privacy_id: &str) -> bool {
        self.categories.contains(privacy_id)
    }

    fn privacy_ids(&self) -> Vec<String> {
        self.categories.iter().cloned().collect()
    }
}
