// Privacy Guard — Library root
//
// Daemon side: policy store, RPC service, notification bus and access-log
// ingestion. Client side: RPC client and cached privacy checker.

pub mod checker;
pub mod cli;
pub mod client;
pub mod config;
pub mod daemon;
pub mod error;
pub mod gateway;
pub mod ingest;
pub mod notify;
pub mod privacy;
pub mod service;
pub mod store;

pub use checker::{Decision, PrivacyChecker};
pub use client::PrivacyGuardClient;
pub use daemon::PrivacyGuardDaemon;
pub use error::{GuardError, ResultCode, Result};
