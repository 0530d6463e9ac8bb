//! Process exit codes
//!
//! Scripts driving the CLI branch on these, so the numbers are stable.

use crate::config::ConfigError;
use crate::core::codec::CodecError;
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Command completed
    pub const SUCCESS: u8 = 0;
    /// Unclassified failure
    pub const ERROR: u8 = 1;
    /// Bad hex or other malformed operator input
    pub const INVALID_ARGS: u8 = 2;
    /// Device could not be opened, or the link failed mid-write
    pub const CONNECTION_FAILED: u8 = 3;
    /// Write attempted without a connection
    pub const NOT_CONNECTED: u8 = 4;
    /// The OS refused access to the device
    pub const PERMISSION_DENIED: u8 = 7;
    /// Config file unreadable or invalid
    pub const CONFIG_ERROR: u8 = 8;
    /// No such serial device
    pub const PORT_NOT_FOUND: u8 = 14;
    /// Bug in the tool itself
    pub const INTERNAL_ERROR: u8 = 127;

    const TABLE: [(u8, &'static str); 9] = [
        (Self::SUCCESS, "Success"),
        (Self::ERROR, "General error"),
        (Self::INVALID_ARGS, "Invalid arguments"),
        (Self::CONNECTION_FAILED, "Connection failed"),
        (Self::NOT_CONNECTED, "Not connected"),
        (Self::PERMISSION_DENIED, "Permission denied"),
        (Self::CONFIG_ERROR, "Configuration error"),
        (Self::PORT_NOT_FOUND, "Port not found"),
        (Self::INTERNAL_ERROR, "Internal error"),
    ];
}

/// Outcome of one CLI invocation
#[derive(Debug)]
pub enum CliResult {
    /// Finished, with an optional note for the operator
    Success(Option<String>),
    /// Failed with an exit code and message
    Error(u8, String),
}

impl CliResult {
    /// Finished without a note
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Failure with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Pick the exit code for an error bubbled up through `anyhow`.
    ///
    /// The chain's root error decides: transport errors map by kind, config
    /// errors to [`ExitCodes::CONFIG_ERROR`], codec errors to
    /// [`ExitCodes::INVALID_ARGS`]. Context layers are kept in the message.
    pub fn from_error(err: &anyhow::Error) -> Self {
        let code = if let Some(e) = err.downcast_ref::<TransportError>() {
            transport_code(e)
        } else if err.downcast_ref::<ConfigError>().is_some() {
            ExitCodes::CONFIG_ERROR
        } else if err.downcast_ref::<CodecError>().is_some() {
            ExitCodes::INVALID_ARGS
        } else {
            ExitCodes::ERROR
        };
        Self::Error(code, format!("{err:#}"))
    }

    /// Numeric exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Note or error text, if any
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Process exit code to return from `main`
    pub fn to_exit_code(&self) -> ExitCode {
        self.code().into()
    }

    /// Whether the command succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

fn transport_code(err: &TransportError) -> u8 {
    match err {
        TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
        TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
        TransportError::LinkOpen(_) | TransportError::Io(_) => ExitCodes::CONNECTION_FAILED,
        TransportError::NotConnected => ExitCodes::NOT_CONNECTED,
    }
}

impl From<TransportError> for CliResult {
    fn from(err: TransportError) -> Self {
        Self::Error(transport_code(&err), err.to_string())
    }
}

/// Short description of an exit code
pub fn exit_code_description(code: u8) -> &'static str {
    ExitCodes::TABLE
        .iter()
        .find(|(c, _)| *c == code)
        .map_or("Unknown error", |&(_, desc)| desc)
}

/// Print every exit code with its description
pub fn print_exit_codes() {
    println!("Exit codes:");
    for (code, desc) in ExitCodes::TABLE {
        println!("  {code:>3}  {desc}");
    }
}
