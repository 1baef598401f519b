use thiserror::Error;

/// Errors surfaced by the twin core.
///
/// Ingestion never propagates these past a single line: parse failures are
/// logged and counted, transport failures tear down the link and trigger a
/// reconnect. Only the command and snapshot boundary hands them to callers.
#[derive(Debug, Error)]
pub enum TwinError {
    /// Wrapper around IO errors from the transport (read, write, flush).
    #[error("transport io error: {0}")]
    Transport(#[from] std::io::Error),

    /// Serial port could not be opened or configured.
    #[cfg(feature = "serial")]
    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),

    /// Port auto-detection found no candidate device.
    #[error("no serial port found")]
    NoPortFound,

    /// A command was requested while no transport is open.
    #[error("serial port not connected")]
    TransportUnavailable,

    /// Addressed identity is not part of the configured device set.
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// Command text was rejected before reaching the transport.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A single inbound line could not be interpreted.
    #[error("parse error: {reason} (line: {line})")]
    Parse { line: String, reason: String },
}

impl TwinError {
    /// HTTP-equivalent status code for the web boundary.
    pub fn http_status(&self) -> u16 {
        match self {
            TwinError::UnknownDevice(_) => 404,
            TwinError::TransportUnavailable => 503,
            TwinError::InvalidCommand(_) => 400,
            _ => 500,
        }
    }

    /// True for failures that should close the transport and reconnect.
    pub fn is_transport(&self) -> bool {
        match self {
            TwinError::Transport(_) | TwinError::NoPortFound => true,
            #[cfg(feature = "serial")]
            TwinError::Serial(_) => true,
            _ => false,
        }
    }
}

pub type TwinResult<T> = Result<T, TwinError>;
