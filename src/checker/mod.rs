// Privacy Guard — Privacy Checker
//
// Client-side allow/deny decisions backed by a cache of the daemon's monitor
// policies. A package's policies are loaded with one call on first use and
// kept current by a listener thread that applies change notifications.
// Categories missing from a loaded package are denied.

mod cache;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;

use crate::error::{GuardError, Result};
use crate::notify::{EventSource, EventSubscriber, NotifyError};
use crate::privacy::PrivacyMapper;

use cache::{Cached, DecisionCache};

/// How long the listener waits for an event before checking its stop flag.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Where cached policies are loaded from. Implemented by the RPC client;
/// tests and in-process callers can supply their own.
pub trait PolicySource: Send + Sync {
    /// Every (category, flag) row for a package.
    fn package_policies(&self, user_id: i32, package: &str) -> Result<Vec<(String, i32)>>;

    /// The flag for one (package, category); 0 when no row exists.
    fn monitor_policy(&self, user_id: i32, package: &str, privacy_id: &str) -> Result<i32>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Self::Allow
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => write!(f, "allow"),
            Self::Deny => write!(f, "deny"),
        }
    }
}

struct Shared {
    cache: Mutex<DecisionCache>,
    events_applied: AtomicU64,
}

impl Shared {
    fn cache(&self) -> MutexGuard<'_, DecisionCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct Listener {
    stop: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Listener {
    fn shutdown(self) {
        self.stop.store(true, Ordering::SeqCst);
        if self.handle.join().is_err() {
            tracing::warn!("Policy listener thread panicked");
        }
    }
}

pub struct PrivacyChecker {
    user_id: i32,
    source: Arc<dyn PolicySource>,
    mapper: Arc<dyn PrivacyMapper>,
    subscriber: Arc<dyn EventSubscriber>,
    local_package: Option<String>,
    poll_interval: Duration,
    shared: Arc<Shared>,
    /// `Some` once initialized.
    listener: Mutex<Option<Listener>>,
}

impl PrivacyChecker {
    pub fn new(
        user_id: i32,
        source: Arc<dyn PolicySource>,
        mapper: Arc<dyn PrivacyMapper>,
        subscriber: Arc<dyn EventSubscriber>,
    ) -> Self {
        Self {
            user_id,
            source,
            mapper,
            subscriber,
            local_package: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            shared: Arc::new(Shared {
                cache: Mutex::new(DecisionCache::default()),
                events_applied: AtomicU64::new(0),
            }),
            listener: Mutex::new(None),
        }
    }

    /// The package `check_local` answers for.
    pub fn with_local_package(mut self, package: impl Into<String>) -> Self {
        self.local_package = Some(package.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.lock_listener().is_some()
    }

    /// Number of change notifications the listener has applied.
    pub fn events_applied(&self) -> u64 {
        self.shared.events_applied.load(Ordering::SeqCst)
    }

    pub fn cached_packages(&self) -> usize {
        self.shared.cache().package_count()
    }

    /// Decide whether `package` may use `capability`. Capabilities that map
    /// to no privacy category are always allowed.
    pub fn check_allowed(&self, package: &str, capability: &str) -> Result<Decision> {
        let Some(category) = self.mapper.privacy_id(capability) else {
            tracing::trace!(capability, "Capability is not privacy-relevant");
            return Ok(Decision::Allow);
        };
        self.check_category(package, category)
    }

    /// Decide on a category directly, without privilege mapping.
    pub fn check_category(&self, package: &str, category: &str) -> Result<Decision> {
        self.ensure_initialized()?;
        self.decide(package, category)
    }

    /// Check for the local package. Does not initialize the checker.
    pub fn check_local(&self, capability: &str) -> Result<Decision> {
        if !self.is_initialized() {
            return Err(GuardError::NotInitialized);
        }
        let package = self.local_package.as_deref().ok_or_else(|| {
            GuardError::InvalidParameter("no local package configured".to_string())
        })?;
        let Some(category) = self.mapper.privacy_id(capability) else {
            return Ok(Decision::Allow);
        };
        self.decide(package, category)
    }

    /// Drop every cached decision and stop the listener. A later check
    /// initializes again.
    pub fn finalize(&self) {
        let listener = self.lock_listener().take();
        if let Some(listener) = listener {
            listener.shutdown();
            tracing::debug!("Privacy checker finalized");
        }
        self.shared.cache().clear();
    }

    // Source calls run without the cache lock. Fetched rows are stored only
    // if no notification arrived meanwhile; otherwise they answer this call
    // and the next check fetches again.
    fn decide(&self, package: &str, category: &str) -> Result<Decision> {
        let (cached, generation) = {
            let cache = self.shared.cache();
            (cache.lookup(package, category), cache.generation())
        };

        let allowed = match cached {
            Cached::Flag(flag) => flag,
            Cached::Absent => false,
            Cached::PackageMissing => {
                let rows = self.source.package_policies(self.user_id, package)?;
                let flag = rows
                    .iter()
                    .find(|(c, _)| c == category)
                    .map_or(false, |(_, policy)| *policy != 0);
                let mut cache = self.shared.cache();
                if cache.generation() == generation {
                    tracing::debug!(package, rows = rows.len(), "Loaded package policies");
                    cache.load_package(package, rows);
                } else {
                    tracing::debug!(package, "Policies changed during load, not caching");
                }
                flag
            }
            Cached::Stale => {
                let policy = self.source.monitor_policy(self.user_id, package, category)?;
                let mut cache = self.shared.cache();
                if cache.generation() == generation {
                    tracing::debug!(package, category, policy, "Refreshed policy entry");
                    cache.refresh(package, category, policy);
                }
                policy != 0
            }
        };

        Ok(if allowed { Decision::Allow } else { Decision::Deny })
    }

    fn ensure_initialized(&self) -> Result<()> {
        let mut guard = self.lock_listener();
        if let Some(listener) = guard.as_ref() {
            if listener.alive.load(Ordering::SeqCst) {
                return Ok(());
            }
            tracing::warn!("Policy listener stopped, reinitializing");
        }
        if let Some(dead) = guard.take() {
            dead.shutdown();
        }
        self.shared.cache().clear();

        let source = self.subscriber.subscribe()?;
        let stop = Arc::new(AtomicBool::new(false));
        let alive = Arc::new(AtomicBool::new(true));
        let handle = std::thread::Builder::new()
            .name("privacy-checker-listener".to_string())
            .spawn({
                let shared = Arc::clone(&self.shared);
                let stop = Arc::clone(&stop);
                let alive = Arc::clone(&alive);
                let interval = self.poll_interval;
                move || listen(source, shared, stop, alive, interval)
            })?;

        *guard = Some(Listener { stop, alive, handle });
        tracing::debug!(user_id = self.user_id, "Privacy checker initialized");
        Ok(())
    }

    fn lock_listener(&self) -> MutexGuard<'_, Option<Listener>> {
        self.listener.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for PrivacyChecker {
    fn drop(&mut self) {
        self.finalize();
    }
}

fn listen(
    mut source: Box<dyn EventSource>,
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    interval: Duration,
) {
    while !stop.load(Ordering::SeqCst) {
        match source.next_event(interval) {
            Ok(Some(event)) => {
                let touched = shared.cache().apply(&event);
                shared.events_applied.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(signal = event.signal(), package = event.package(), touched, "Policy change applied");
            }
            Ok(None) => {}
            Err(NotifyError::Closed) => {
                tracing::warn!("Notification channel closed");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Notification stream failed");
                break;
            }
        }
    }
    // Without notifications the cache can go stale; drop it so the next
    // check starts over.
    shared.cache().clear();
    alive.store(false, Ordering::SeqCst);
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::mpsc;
    use std::time::Instant;

    use rand::Rng;

    use crate::notify::{EventPublisher, InMemoryBus, PolicyEvent};
    use crate::privacy::StaticPrivacyMap;

    const LOCATION: &str = "http://tizen.org/privacy/location";
    const CONTACT: &str = "http://tizen.org/privacy/contact";
    const CALENDAR: &str = "http://tizen.org/privacy/calendar";
    const LOCATION_PRIV: &str = "http://tizen.org/privilege/location";

    #[derive(Default)]
    struct FakeSource {
        rows: Mutex<HashMap<(String, String), i32>>,
        package_loads: AtomicU64,
        entry_fetches: AtomicU64,
    }

    impl FakeSource {
        fn set(&self, package: &str, category: &str, policy: i32) {
            self.rows
                .lock()
                .unwrap()
                .insert((package.to_string(), category.to_string()), policy);
        }

        fn remove_package(&self, package: &str) {
            self.rows.lock().unwrap().retain(|(p, _), _| p != package);
        }

        fn loads(&self) -> u64 {
            self.package_loads.load(Ordering::SeqCst)
        }

        fn fetches(&self) -> u64 {
            self.entry_fetches.load(Ordering::SeqCst)
        }
    }

    impl PolicySource for FakeSource {
        fn package_policies(&self, _user_id: i32, package: &str) -> Result<Vec<(String, i32)>> {
            self.package_loads.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .rows
                .lock()
                .unwrap()
                .iter()
                .filter(|((p, _), _)| p == package)
                .map(|((_, c), v)| (c.clone(), *v))
                .collect())
        }

        fn monitor_policy(&self, _user_id: i32, package: &str, privacy_id: &str) -> Result<i32> {
            self.entry_fetches.fetch_add(1, Ordering::SeqCst);
            Ok(*self
                .rows
                .lock()
                .unwrap()
                .get(&(package.to_string(), privacy_id.to_string()))
                .unwrap_or(&0))
        }
    }

    fn setup() -> (Arc<FakeSource>, Arc<InMemoryBus>, PrivacyChecker) {
        let source = Arc::new(FakeSource::default());
        let bus = Arc::new(InMemoryBus::new());
        let checker = PrivacyChecker::new(
            1,
            source.clone(),
            Arc::new(StaticPrivacyMap::default()),
            bus.clone(),
        )
        .with_poll_interval(Duration::from_millis(10));
        (source, bus, checker)
    }

    fn wait_for_events(checker: &PrivacyChecker, count: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while checker.events_applied() < count {
            assert!(Instant::now() < deadline, "listener did not catch up");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_unmapped_capability_allowed_without_loading() {
        let (source, _bus, checker) = setup();
        let decision = checker
            .check_allowed("app", "http://tizen.org/privilege/internet")
            .unwrap();
        assert_eq!(decision, Decision::Allow);
        assert_eq!(source.loads(), 0);
        assert!(!checker.is_initialized());
    }

    #[test]
    fn test_first_check_loads_package_once() {
        let (source, _bus, checker) = setup();
        source.set("app", LOCATION, 1);
        source.set("app", CONTACT, 0);

        assert_eq!(checker.check_allowed("app", LOCATION_PRIV).unwrap(), Decision::Allow);
        assert_eq!(checker.check_category("app", CONTACT).unwrap(), Decision::Deny);
        assert_eq!(checker.check_category("app", LOCATION).unwrap(), Decision::Allow);
        assert_eq!(source.loads(), 1);
        assert!(checker.is_initialized());
    }

    #[test]
    fn test_missing_category_fails_closed() {
        let (source, _bus, checker) = setup();
        source.set("app", LOCATION, 1);
        assert_eq!(checker.check_category("app", CALENDAR).unwrap(), Decision::Deny);
        assert_eq!(checker.check_category("never.stored", LOCATION).unwrap(), Decision::Deny);
    }

    #[test]
    fn test_category_change_refetches_single_entry() {
        let (source, bus, checker) = setup();
        source.set("app", LOCATION, 1);
        source.set("app", CONTACT, 1);
        assert_eq!(checker.check_category("app", LOCATION).unwrap(), Decision::Allow);

        source.set("app", LOCATION, 0);
        bus.publish(PolicyEvent::CategoryChanged {
            package: "app".to_string(),
            category: LOCATION.to_string(),
        });
        wait_for_events(&checker, 1);

        assert_eq!(checker.check_category("app", LOCATION).unwrap(), Decision::Deny);
        assert_eq!(checker.check_category("app", CONTACT).unwrap(), Decision::Allow);
        assert_eq!(source.loads(), 1);
        assert_eq!(source.fetches(), 1);
    }

    #[test]
    fn test_package_removed_evicts_and_reloads() {
        let (source, bus, checker) = setup();
        source.set("app", LOCATION, 1);
        assert_eq!(checker.check_category("app", LOCATION).unwrap(), Decision::Allow);

        source.remove_package("app");
        bus.publish(PolicyEvent::PackageRemoved {
            package: "app".to_string(),
        });
        wait_for_events(&checker, 1);
        assert_eq!(checker.cached_packages(), 0);

        assert_eq!(checker.check_category("app", LOCATION).unwrap(), Decision::Deny);
        assert_eq!(source.loads(), 2);
    }

    /// Holds the first load of `slow` until released.
    struct GatedSource {
        inner: FakeSource,
        entered: Mutex<Option<mpsc::Sender<()>>>,
        release: Mutex<Option<mpsc::Receiver<()>>>,
    }

    impl PolicySource for GatedSource {
        fn package_policies(&self, user_id: i32, package: &str) -> Result<Vec<(String, i32)>> {
            let rows = self.inner.package_policies(user_id, package)?;
            if package == "slow" {
                if let Some(entered) = self.entered.lock().unwrap().take() {
                    entered.send(()).unwrap();
                    let release = self.release.lock().unwrap().take().unwrap();
                    release.recv().unwrap();
                }
            }
            Ok(rows)
        }

        fn monitor_policy(&self, user_id: i32, package: &str, privacy_id: &str) -> Result<i32> {
            self.inner.monitor_policy(user_id, package, privacy_id)
        }
    }

    #[test]
    fn test_load_does_not_block_other_checks() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let source = Arc::new(GatedSource {
            inner: FakeSource::default(),
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(Some(release_rx)),
        });
        source.inner.set("slow", LOCATION, 1);
        source.inner.set("fast", LOCATION, 1);
        let bus = Arc::new(InMemoryBus::new());
        let checker = Arc::new(
            PrivacyChecker::new(1, source.clone(), Arc::new(StaticPrivacyMap::default()), bus.clone())
                .with_poll_interval(Duration::from_millis(10)),
        );

        let slow = std::thread::spawn({
            let checker = Arc::clone(&checker);
            move || checker.check_category("slow", LOCATION).unwrap()
        });
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // The slow load is in flight; other packages still get answers.
        assert_eq!(checker.check_category("fast", LOCATION).unwrap(), Decision::Allow);

        // A change lands while the slow rows are in flight.
        source.inner.set("slow", LOCATION, 0);
        bus.publish(PolicyEvent::CategoryChanged {
            package: "slow".to_string(),
            category: LOCATION.to_string(),
        });
        wait_for_events(&checker, 1);
        release_tx.send(()).unwrap();

        // The in-flight answer predates the change and is not cached.
        assert_eq!(slow.join().unwrap(), Decision::Allow);
        assert_eq!(checker.cached_packages(), 1);
        assert_eq!(checker.check_category("slow", LOCATION).unwrap(), Decision::Deny);
        assert_eq!(source.inner.loads(), 3);
    }

    #[test]
    fn test_check_local_requires_initialization() {
        let (source, _bus, checker) = setup();
        let checker = checker.with_local_package("app.local");
        source.set("app.local", LOCATION, 1);

        let err = checker.check_local(LOCATION_PRIV).unwrap_err();
        assert!(matches!(err, GuardError::NotInitialized));

        checker.check_category("other", LOCATION).unwrap();
        assert_eq!(checker.check_local(LOCATION_PRIV).unwrap(), Decision::Allow);
    }

    #[test]
    fn test_finalize_clears_and_reinitializes() {
        let (source, bus, checker) = setup();
        source.set("app", LOCATION, 1);
        checker.check_category("app", LOCATION).unwrap();
        assert_eq!(bus.subscriber_count(), 1);

        checker.finalize();
        assert!(!checker.is_initialized());
        assert_eq!(checker.cached_packages(), 0);
        assert_eq!(bus.subscriber_count(), 0);

        checker.check_category("app", LOCATION).unwrap();
        assert!(checker.is_initialized());
        assert_eq!(source.loads(), 2);
    }

    #[test]
    fn test_concurrent_first_checks_start_one_listener() {
        let (source, bus, checker) = setup();
        source.set("app", LOCATION, 1);
        let checker = Arc::new(checker);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let checker = Arc::clone(&checker);
                std::thread::spawn(move || checker.check_category("app", LOCATION).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Decision::Allow);
        }
        assert_eq!(bus.subscriber_count(), 1);

        // Racing first checks may each load; afterwards the cache answers.
        let loads = source.loads();
        assert!(loads >= 1);
        assert_eq!(checker.check_category("app", LOCATION).unwrap(), Decision::Allow);
        assert_eq!(source.loads(), loads);
    }

    #[test]
    fn test_cache_converges_with_store() {
        let (source, bus, checker) = setup();
        let packages = ["app.a", "app.b", "app.c"];
        let categories = [LOCATION, CONTACT, CALENDAR];
        for package in packages {
            for category in categories {
                source.set(package, category, 1);
            }
        }

        let mut rng = rand::thread_rng();
        let mut published = 0;
        for _ in 0..200 {
            let package = packages[rng.gen_range(0..packages.len())];
            let category = categories[rng.gen_range(0..categories.len())];
            if rng.gen_bool(0.5) {
                source.set(package, category, rng.gen_range(0..2));
                // Zero receivers until the checker has subscribed.
                published += bus.publish(PolicyEvent::CategoryChanged {
                    package: package.to_string(),
                    category: category.to_string(),
                }) as u64;
            } else {
                checker.check_category(package, category).unwrap();
            }
        }
        wait_for_events(&checker, published);

        for package in packages {
            for category in categories {
                let stored = source.monitor_policy(1, package, category).unwrap();
                let expected = if stored != 0 { Decision::Allow } else { Decision::Deny };
                assert_eq!(checker.check_category(package, category).unwrap(), expected);
            }
        }
    }
}
