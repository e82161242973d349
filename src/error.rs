//! Unified error types for the RoverLink bridge.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! control loop's error handling uniform. All variants are `Copy` so they can
//! be passed around freely without allocation. Every error reduces to a state
//! flag or a log entry at its detection site; none propagate as a crash. The
//! only deliberate restarts are a completed OTA update and an explicit
//! credential clear.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level bridge error
// ---------------------------------------------------------------------------

/// Every fallible operation in the bridge funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The serial link to the motor unit failed an exchange.
    Link(LinkError),
    /// A reply or payload could not be parsed.
    Protocol(ProtocolError),
    /// An outbound HTTP call (backend registration, OTA fetch) failed.
    Transport(TransportError),
    /// The firmware-update pipeline aborted an attempt.
    Ota(OtaError),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Ota(e) => write!(f, "ota: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Serial link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// No complete reply line arrived inside the bounded wait window.
    /// Downgrades `LinkState`; never retried by the link itself.
    Timeout,
    /// The underlying serial transport returned an I/O error.
    Io,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "reply timeout"),
            Self::Io => write!(f, "serial I/O failed"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Protocol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError {
    /// A reply line did not match any known grammar. Prior telemetry
    /// fields are left untouched.
    MalformedReply,
    /// The OTA version-check response was not valid JSON.
    MalformedManifest,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedReply => write!(f, "unparseable reply line"),
            Self::MalformedManifest => write!(f, "unparseable update manifest"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

// ---------------------------------------------------------------------------
// Outbound transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// TCP connect or request setup failed.
    ConnectFailed,
    /// The connection dropped mid-request or mid-stream.
    Io,
    /// The server answered with a non-OK status.
    Status(u16),
    /// Request body could not be serialised.
    Encode,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "connect failed"),
            Self::Io => write!(f, "connection I/O failed"),
            Self::Status(code) => write!(f, "HTTP status {code}"),
            Self::Encode => write!(f, "body encode failed"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// OTA errors
// ---------------------------------------------------------------------------

/// OTA failures abort the running attempt and leave the active firmware
/// untouched; the pipeline reports `Failed` and the bridge keeps serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    /// No inactive partition, or not enough space for the declared size.
    BeginFailed,
    /// The flash write call itself errored.
    WriteFailed,
    /// The flash accepted fewer bytes than were offered.
    WriteMismatch,
    /// The transport ended before the declared content length was met.
    ShortImage,
    /// Image verification or boot-partition switch failed.
    VerifyFailed,
    /// A chunk/finish call arrived with no session in progress.
    NotActive,
    /// A begin call arrived while a session was already in progress.
    AlreadyActive,
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeginFailed => write!(f, "begin failed (space or partition)"),
            Self::WriteFailed => write!(f, "flash write failed"),
            Self::WriteMismatch => write!(f, "flash accepted fewer bytes than offered"),
            Self::ShortImage => write!(f, "stream ended before declared length"),
            Self::VerifyFailed => write!(f, "image verification failed"),
            Self::NotActive => write!(f, "no update session in progress"),
            Self::AlreadyActive => write!(f, "update session already in progress"),
        }
    }
}

impl From<OtaError> for Error {
    fn from(e: OtaError) -> Self {
        Self::Ota(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Bridge-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
