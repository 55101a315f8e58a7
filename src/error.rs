//! Error types for the DHCP client engine.
//!
//! All fallible operations in this crate return [`Result<T>`], which uses
//! the [`Error`] enum for error variants.

/// Errors that can occur while acquiring or maintaining a lease.
///
/// Per-transaction faults are handled inside the client's worker (logged,
/// then retried after a short delay); they surface to callers only through
/// the library API (`Transaction`, packet parsing, configuration loading).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network or file system I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (config files).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed DHCP packet.
    ///
    /// Covers packets that are too short, have an invalid magic cookie, or
    /// carry truncated option framing. Frames that are not DHCP at all are
    /// not errors; they are silently discarded at the framing layer.
    #[error("Invalid DHCP packet: {0}")]
    InvalidPacket(String),

    /// Socket creation or configuration error.
    ///
    /// Opening an `AF_PACKET` socket requires `CAP_NET_RAW` (typically
    /// root); this is the variant you will see without it, and also when
    /// the configured interface does not exist.
    #[error("Socket error: {0}")]
    Socket(String),

    /// Invalid client configuration.
    ///
    /// Returned by [`ClientConfig::validate`](crate::ClientConfig::validate)
    /// when the configuration contains invalid values (e.g., a zero
    /// response timeout or a reserved option code).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No matching server response arrived before the response timeout.
    #[error("Timed out waiting for a server response")]
    ResponseTimeout,

    /// The server answered the request with a NAK.
    ///
    /// Any held lease has been dropped; the client restarts from discovery.
    #[error("Server refused the request (NAK)")]
    Nak,

    /// An ACK arrived without the renewal, rebinding, or lease-time option.
    ///
    /// A lease without all three timers cannot be scheduled and is rejected
    /// as malformed rather than adopted.
    #[error("Lease is missing required timing options")]
    MissingLeaseTimers,
}

/// A specialized Result type for DHCP client operations.
pub type Result<T> = std::result::Result<T, Error>;
