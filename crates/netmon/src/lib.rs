//! Network validation engine
//!
//! Decides, for each attached network, whether it provides working Internet
//! access, sits behind a captive portal, offers only partial connectivity,
//! or has no connectivity at all. Once a network validates, the engine keeps
//! watching it for data stalls.
//!
//! - **Probe orchestration**: DNS, HTTP, HTTPS, fallback, capport API and
//!   private DNS probes run concurrently and fold into one verdict
//! - **Captive portal handling**: one sign-in notification per portal,
//!   launch parameters for the sign-in UI, and the UI's answer
//! - **Data stall detection**: consecutive DNS timeouts and TCP failure rate
//! - **Dependency facade**: every clock, resolver, socket and setting is
//!   injected, so the engine runs unchanged against fakes in tests
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                         Host (connectivity service)               │
//! └───────────┬───────────────────────────────────────▲───────────────┘
//!             │ MonitorHandle commands                │ MonitorEvent
//!   ┌─────────▼───────────────────────────────────────┴─────────┐
//!   │                 NetworkMonitor (one per network)          │
//!   │   state machine · sign-in controller · stall detector     │
//!   └─────────┬──────────────────────────────────────────────────┘
//!             │ ProbeConfig + EvaluationContext
//!   ┌─────────▼──────────────────────────────────────────────────┐
//!   │                     ProbeOrchestrator                      │
//!   │   private DNS → capport API → DNS → HTTPS/HTTP → fallback  │
//!   └─────────┬──────────────────────────────────────────────────┘
//!             │ Dependencies
//!   ┌─────────▼──────────────────────────────────────────────────┐
//!   │  DnsResolver · HttpClient · Clock · ConfigStore · TcpStats │
//!   └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use netmon::{
//!     Dependencies, InMemoryConfig, LinkProperties, MonitorSettings, NetworkCapabilities,
//!     NetworkId, NetworkMonitor,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let deps = Dependencies::system(Arc::new(InMemoryConfig::new()), Duration::from_secs(5))?;
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//! let monitor = NetworkMonitor::spawn(NetworkId(100), deps, MonitorSettings::default(), tx);
//! monitor.notify_network_connected(LinkProperties::default(), NetworkCapabilities::default());
//! while let Some(event) = rx.recv().await {
//!     println!("{:?}", event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod deps;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod orchestrator;
pub mod portal;
pub mod probe;
pub mod selection;
pub mod stall;
pub mod transport;
pub mod types;
pub mod verdict;

#[cfg(test)]
mod test_support;

pub use config::{CaptivePortalMode, ConfigStore, InMemoryConfig, MonitorSettings, ProbeConfig};
pub use deps::Dependencies;
pub use error::{ConfigError, ProbeError};
pub use monitor::{MonitorEvent, MonitorHandle, MonitorStatus, NetworkMonitor};
pub use orchestrator::{EvaluationContext, EvaluationOutcome, ProbeOrchestrator, ProbeVerdict};
pub use portal::{AppResult, SignInLaunch};
pub use stall::report::StallReport;
pub use types::{LinkProperties, NetworkCapabilities, NetworkId, PrivateDnsConfig, Transport};
pub use verdict::{NetworkTestResult, ProbeKind, ProbeSet, ValidationResult, ValidationState};
