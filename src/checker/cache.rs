// Privacy Guard — Decision Cache
//
// Per-package map of category → monitor flag, plus the set of categories
// that were invalidated by a change notification and must be re-read one by
// one. A package absent from the map has never been loaded (or was evicted).
// The generation counter moves on every notification and every clear, so a
// reader that fetched without the lock can tell whether its rows may predate
// a change.

use std::collections::{HashMap, HashSet};

use crate::notify::PolicyEvent;

/// Lookup result for one (package, category).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cached {
    /// The package has not been loaded.
    PackageMissing,
    /// The entry was invalidated and needs a single-entry re-fetch.
    Stale,
    /// Loaded map has no row for the category.
    Absent,
    Flag(bool),
}

#[derive(Debug, Default)]
struct PackageEntry {
    decisions: HashMap<String, bool>,
    invalidated: HashSet<String>,
}

#[derive(Debug, Default)]
pub(crate) struct DecisionCache {
    packages: HashMap<String, PackageEntry>,
    generation: u64,
}

impl DecisionCache {
    pub fn lookup(&self, package: &str, category: &str) -> Cached {
        let Some(entry) = self.packages.get(package) else {
            return Cached::PackageMissing;
        };
        if entry.invalidated.contains(category) {
            return Cached::Stale;
        }
        match entry.decisions.get(category) {
            Some(flag) => Cached::Flag(*flag),
            None => Cached::Absent,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace a package's map with freshly loaded rows.
    pub fn load_package(&mut self, package: &str, rows: Vec<(String, i32)>) {
        let decisions = rows
            .into_iter()
            .map(|(category, policy)| (category, policy != 0))
            .collect();
        self.packages.insert(
            package.to_string(),
            PackageEntry {
                decisions,
                invalidated: HashSet::new(),
            },
        );
    }

    /// Store the result of a single-entry re-fetch.
    pub fn refresh(&mut self, package: &str, category: &str, policy: i32) {
        if let Some(entry) = self.packages.get_mut(package) {
            entry.invalidated.remove(category);
            entry.decisions.insert(category.to_string(), policy != 0);
        }
    }

    /// Apply a change notification. Returns whether anything was touched.
    pub fn apply(&mut self, event: &PolicyEvent) -> bool {
        self.generation += 1;
        match event {
            PolicyEvent::CategoryChanged { package, category } => {
                match self.packages.get_mut(package) {
                    Some(entry) => {
                        entry.decisions.remove(category);
                        entry.invalidated.insert(category.clone());
                        true
                    }
                    None => false,
                }
            }
            PolicyEvent::PackageRemoved { package } => self.packages.remove(package).is_some(),
        }
    }

    pub fn clear(&mut self) {
        self.generation += 1;
        self.packages.clear();
    }

    pub fn package_count(&self) -> usize {
        self.packages.len()
    }
}
