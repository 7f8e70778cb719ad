//! Runtime text substitution for hosted applications.
//!
//! Discovers the host's text-producing call sites, wraps them so every
//! string passes through a translation dictionary, and periodically rescans
//! live text widgets for anything the wrappers missed. The host itself is
//! reached only through the traits in [`host`].

pub mod boundary;
pub mod collector;
pub mod config;
pub mod dictionary;
pub mod discovery;
pub mod error;
pub mod host;
pub mod intercept;
pub mod logging;
pub mod normalize;
pub mod plugin;
pub mod rescan;
pub mod service;
pub mod util;

// Re-export types for integration tests and the rehearsal binary
pub use config::AppConfig;
pub use dictionary::Dictionary;
pub use discovery::{DiscoveryPolicy, DiscoveryState, ManualScheduler, Scheduler, ThreadScheduler};
pub use plugin::TextSwap;
pub use service::TranslationService;
