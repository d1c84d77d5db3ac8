//! Probe primitives.
//!
//! Each probe is a plain async function over the dependency facade. Probes
//! never return errors to their caller: transport failures and timeouts
//! become failed results.

pub mod bandwidth;
pub mod capport;
pub mod dns;
pub mod http;
pub mod private_dns;
pub mod result;
pub mod spec;

pub use capport::CaptivePortalData;
pub use result::{PortalProbeResult, ProbeStatus};
pub use spec::FallbackSpec;
