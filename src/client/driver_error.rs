//! Classification of driver failures into the harness error taxonomy.
//!
//! Driver errors are first reduced to a [`DriverFault`] so the mapping into
//! [`ConnectionError`] and [`CommandError`] stays a pure function.

use std::io;

use bson::Document;
use mongodb::error::ErrorKind;
use mongodb::error::WriteFailure;

use crate::CommandError;
use crate::ConnectionError;
use crate::Error;

/// Server error codes meaning the connection is going away
const INTERRUPTED_AT_SHUTDOWN: i32 = 11600;
const SHUTDOWN_IN_PROGRESS: i32 = 91;
const AUTHENTICATION_FAILED: i32 = 18;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DriverFault {
    /// Peer closed or reset the socket
    ConnectionClosed(String),
    Authentication(String),
    Tls(String),
    /// No member matched the read preference within the timeout
    ServerSelection(String),
    Command {
        code: i32,
        code_name: String,
        message: String,
    },
    Io {
        kind: io::ErrorKind,
        message: String,
    },
    Other(String),
}

impl DriverFault {
    fn message(&self) -> String {
        match self {
            DriverFault::ConnectionClosed(m)
            | DriverFault::Authentication(m)
            | DriverFault::Tls(m)
            | DriverFault::ServerSelection(m)
            | DriverFault::Other(m) => m.clone(),
            DriverFault::Command { message, .. } | DriverFault::Io { message, .. } => {
                message.clone()
            }
        }
    }
}

fn io_fault(err: &io::Error) -> DriverFault {
    match err.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => DriverFault::ConnectionClosed(err.to_string()),
        kind => DriverFault::Io {
            kind,
            message: err.to_string(),
        },
    }
}

fn command_fault(
    code: i32,
    code_name: String,
    message: String,
) -> DriverFault {
    match code {
        SHUTDOWN_IN_PROGRESS | INTERRUPTED_AT_SHUTDOWN => DriverFault::ConnectionClosed(message),
        _ => DriverFault::Command {
            code,
            code_name,
            message,
        },
    }
}

impl From<&mongodb::error::Error> for DriverFault {
    fn from(err: &mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            ErrorKind::Io(io_err) => io_fault(io_err),
            ErrorKind::ConnectionPoolCleared { message, .. } => {
                DriverFault::ConnectionClosed(message.clone())
            }
            ErrorKind::Authentication { message, .. } => {
                DriverFault::Authentication(message.clone())
            }
            ErrorKind::InvalidTlsConfig { message, .. } => DriverFault::Tls(message.clone()),
            ErrorKind::ServerSelection { message, .. } => {
                DriverFault::ServerSelection(message.clone())
            }
            ErrorKind::Command(c) => command_fault(c.code, c.code_name.clone(), c.message.clone()),
            ErrorKind::Write(WriteFailure::WriteError(e)) => command_fault(
                e.code,
                e.code_name.clone().unwrap_or_default(),
                e.message.clone(),
            ),
            ErrorKind::Write(WriteFailure::WriteConcernError(e)) => {
                command_fault(e.code, e.code_name.clone(), e.message.clone())
            }
            _ => DriverFault::Other(err.to_string()),
        }
    }
}

/// Failure while opening a handle or running its reachability ping
pub(crate) fn connect_error(
    address: &str,
    fault: DriverFault,
) -> Error {
    let address = address.to_string();
    let err = match fault {
        DriverFault::Authentication(message) => ConnectionError::Authentication { address, message },
        DriverFault::Command {
            code: AUTHENTICATION_FAILED,
            message,
            ..
        } => ConnectionError::Authentication { address, message },
        DriverFault::Tls(message)
        | DriverFault::Io {
            kind: io::ErrorKind::InvalidData,
            message,
        } => ConnectionError::Tls { address, message },
        other => ConnectionError::Unreachable {
            address,
            message: other.message(),
        },
    };
    err.into()
}

/// Failure of a command sent on an established handle
pub(crate) fn command_error(
    command: &str,
    address: &str,
    fault: DriverFault,
) -> Error {
    let command = command.to_string();
    match fault {
        DriverFault::ConnectionClosed(_) => CommandError::ConnectionTerminated {
            command,
            address: address.to_string(),
        }
        .into(),
        DriverFault::Command {
            code,
            code_name,
            message,
        } => CommandError::Rejected {
            command,
            code,
            code_name,
            message,
        }
        .into(),
        fault @ (DriverFault::Authentication(_) | DriverFault::Tls(_) | DriverFault::ServerSelection(_)) => {
            connect_error(address, fault)
        }
        DriverFault::Io { message, .. } | DriverFault::Other(message) => {
            CommandError::Transport { command, message }.into()
        }
    }
}

/// Name of a command document, its first key
pub(crate) fn command_name(command: &Document) -> String {
    command
        .keys()
        .next()
        .cloned()
        .unwrap_or_else(|| "<empty>".to_string())
}
