// Privacy Guard — Notification Module
//
// Publish/subscribe of policy-change events. Inside the daemon, events go
// through an in-memory broadcast bus; client processes receive them over a
// Unix socket bridge. Delivery is best-effort and at-most-once: a
// subscriber that falls behind skips what it missed, and there is no replay.

mod bus;
mod socket;

use std::io::{Read, Write};
use std::time::Duration;

use thiserror::Error;

use crate::gateway::{CodecError, Shape, Value};

pub use bus::{BusSubscription, InMemoryBus, DEFAULT_BUS_CAPACITY};
pub use socket::{
    NotificationServer, SocketNotifier, SocketSubscription, DEFAULT_HANDSHAKE_TIMEOUT,
};

/// Signal name for a per-category policy change.
pub const SIGNAL_SETTING_CHANGED: &str = "privacy_setting_changed";
/// Signal name for a package whose policy rows were removed.
pub const SIGNAL_PACKAGE_REMOVED: &str = "privacy_pkg_removed";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel closed")]
    Closed,

    #[error("notification handshake failed: {0}")]
    Handshake(String),

    #[error("unknown signal: {0}")]
    UnknownSignal(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("notification socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// A policy change observed by the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyEvent {
    CategoryChanged { package: String, category: String },
    PackageRemoved { package: String },
}

impl PolicyEvent {
    pub fn package(&self) -> &str {
        match self {
            Self::CategoryChanged { package, .. } | Self::PackageRemoved { package } => package,
        }
    }

    pub fn signal(&self) -> &'static str {
        match self {
            Self::CategoryChanged { .. } => SIGNAL_SETTING_CHANGED,
            Self::PackageRemoved { .. } => SIGNAL_PACKAGE_REMOVED,
        }
    }

    /// Frames: signal name, package, and the category for setting changes.
    pub fn encode<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        Value::from(self.signal()).encode(w)?;
        match self {
            Self::CategoryChanged { package, category } => {
                Value::from(package.as_str()).encode(w)?;
                Value::from(category.as_str()).encode(w)
            }
            Self::PackageRemoved { package } => Value::from(package.as_str()).encode(w),
        }
    }

    pub fn decode<R: Read>(r: &mut R) -> Result<Self, NotifyError> {
        let signal = Value::decode(&Shape::Str, r)?.into_string()?;
        let package = Value::decode(&Shape::Str, r)?.into_string()?;
        match signal.as_str() {
            SIGNAL_SETTING_CHANGED => {
                let category = Value::decode(&Shape::Str, r)?.into_string()?;
                Ok(Self::CategoryChanged { package, category })
            }
            SIGNAL_PACKAGE_REMOVED => Ok(Self::PackageRemoved { package }),
            _ => Err(NotifyError::UnknownSignal(signal)),
        }
    }
}

/// Sending side of the notification channel.
pub trait EventPublisher: Send + Sync {
    /// Publish to all current subscribers. Returns how many received it.
    fn publish(&self, event: PolicyEvent) -> usize;
}

/// A blocking stream of events, consumed on a dedicated thread.
pub trait EventSource: Send {
    /// Wait up to `timeout` for the next event. `Ok(None)` means the wait
    /// timed out; `Err(NotifyError::Closed)` means no more events will come.
    fn next_event(&mut self, timeout: Duration) -> Result<Option<PolicyEvent>, NotifyError>;
}

/// Anything a client can subscribe to.
pub trait EventSubscriber: Send + Sync {
    fn subscribe(&self) -> Result<Box<dyn EventSource>, NotifyError>;
}
