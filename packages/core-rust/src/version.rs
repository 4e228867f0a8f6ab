//! Driver identification reported in handshake metadata.

/// Library version, taken from the crate manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Release stability of this version.
pub const STABILITY: &str = "stable";

/// Driver name reported to servers.
pub const DRIVER_NAME: &str = "nodelink";
