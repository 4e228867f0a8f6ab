//! Node-state snapshot types.
//!
//! A [`ServerDescription`] is a frozen copy of what the topology knew about one
//! node when it was fetched. It is never mutated after being handed out.

use std::fmt;

use bson::{RawDocument, RawDocumentBuf};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ServerType
// ---------------------------------------------------------------------------

/// Type classification of a node. Discriminants are the public numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServerType {
    Unknown = 0,
    Standalone = 1,
    Mongos = 2,
    PossiblePrimary = 3,
    #[serde(rename = "RSPrimary")]
    RsPrimary = 4,
    #[serde(rename = "RSSecondary")]
    RsSecondary = 5,
    #[serde(rename = "RSArbiter")]
    RsArbiter = 6,
    #[serde(rename = "RSOther")]
    RsOther = 7,
    #[serde(rename = "RSGhost")]
    RsGhost = 8,
    LoadBalancer = 9,
}

impl ServerType {
    pub const ALL: [ServerType; 10] = [
        Self::Unknown,
        Self::Standalone,
        Self::Mongos,
        Self::PossiblePrimary,
        Self::RsPrimary,
        Self::RsSecondary,
        Self::RsArbiter,
        Self::RsOther,
        Self::RsGhost,
        Self::LoadBalancer,
    ];

    /// Canonical type name as reported by the topology.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Standalone => "Standalone",
            Self::Mongos => "Mongos",
            Self::PossiblePrimary => "PossiblePrimary",
            Self::RsPrimary => "RSPrimary",
            Self::RsSecondary => "RSSecondary",
            Self::RsArbiter => "RSArbiter",
            Self::RsOther => "RSOther",
            Self::RsGhost => "RSGhost",
            Self::LoadBalancer => "LoadBalancer",
        }
    }

    /// Exact, case-sensitive lookup by canonical name; anything else is `Unknown`.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == name)
            .unwrap_or(Self::Unknown)
    }

    #[must_use]
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// HostAddress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostAddress {
    pub host: String,
    pub port: u16,
}

impl HostAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostAddress {
    /// `host:port`, with IPv6 literals bracketed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// ---------------------------------------------------------------------------
// ServerDescription
// ---------------------------------------------------------------------------

/// Round-trip time of a node that has not been measured yet.
pub const RTT_UNSET: i64 = -1;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerDescription {
    server_id: u32,
    host: HostAddress,
    type_name: String,
    hello_response: RawDocumentBuf,
    round_trip_time_ms: i64,
}

impl ServerDescription {
    /// An unmeasured snapshot with an empty handshake response.
    pub fn new(server_id: u32, host: HostAddress, server_type: ServerType) -> Self {
        Self {
            server_id,
            host,
            type_name: server_type.name().to_string(),
            hello_response: RawDocumentBuf::new(),
            round_trip_time_ms: RTT_UNSET,
        }
    }

    /// Overrides the reported type string verbatim.
    #[must_use]
    pub fn with_type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    #[must_use]
    pub fn with_hello_response(mut self, hello_response: RawDocumentBuf) -> Self {
        self.hello_response = hello_response;
        self
    }

    #[must_use]
    pub fn with_round_trip_time(mut self, round_trip_time_ms: i64) -> Self {
        self.round_trip_time_ms = round_trip_time_ms;
        self
    }

    #[must_use]
    pub fn server_id(&self) -> u32 {
        self.server_id
    }

    #[must_use]
    pub fn host(&self) -> &HostAddress {
        &self.host
    }

    #[must_use]
    pub fn host_and_port(&self) -> String {
        self.host.to_string()
    }

    /// Type string exactly as reported.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn server_type(&self) -> ServerType {
        ServerType::from_name(&self.type_name)
    }

    #[must_use]
    pub fn hello_response(&self) -> &RawDocument {
        &self.hello_response
    }

    /// Measured round-trip time in milliseconds; `None` while unmeasured.
    #[must_use]
    pub fn round_trip_time(&self) -> Option<i64> {
        (self.round_trip_time_ms != RTT_UNSET).then_some(self.round_trip_time_ms)
    }
}
