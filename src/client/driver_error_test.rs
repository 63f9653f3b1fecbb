use std::io;

use bson::doc;

use super::command_error;
use super::command_name;
use super::connect_error;
use super::DriverFault;
use crate::CommandError;
use crate::ConnectionError;
use crate::Error;

fn driver_io_error(kind: io::ErrorKind) -> mongodb::error::Error {
    mongodb::error::Error::from(io::Error::new(kind, "socket went away"))
}

#[test]
fn end_of_stream_is_a_closed_connection() {
    for kind in [
        io::ErrorKind::UnexpectedEof,
        io::ErrorKind::ConnectionReset,
        io::ErrorKind::ConnectionAborted,
        io::ErrorKind::BrokenPipe,
    ] {
        let fault = DriverFault::from(&driver_io_error(kind));
        assert!(matches!(fault, DriverFault::ConnectionClosed(_)), "{kind:?}");
    }
}

#[test]
fn other_io_errors_are_kept_with_their_kind() {
    let fault = DriverFault::from(&driver_io_error(io::ErrorKind::TimedOut));
    assert!(matches!(
        fault,
        DriverFault::Io {
            kind: io::ErrorKind::TimedOut,
            ..
        }
    ));
}

#[test]
fn closed_connection_during_command_is_terminated() {
    let err = command_error(
        "shutdown",
        "db-0:27017",
        DriverFault::ConnectionClosed("eof".into()),
    );
    assert!(matches!(
        err,
        Error::Command(CommandError::ConnectionTerminated { ref command, ref address })
            if command == "shutdown" && address == "db-0:27017"
    ));
}

#[test]
fn server_refusal_is_rejected_with_code() {
    let err = command_error(
        "shardCollection",
        "router:27017",
        DriverFault::Command {
            code: 20,
            code_name: "IllegalOperation".into(),
            message: "already sharded".into(),
        },
    );
    match err {
        Error::Command(CommandError::Rejected { code, code_name, .. }) => {
            assert_eq!(code, 20);
            assert_eq!(code_name, "IllegalOperation");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn selection_failure_during_command_is_unreachable() {
    let err = command_error(
        "count",
        "a:1,b:2",
        DriverFault::ServerSelection("no primary".into()),
    );
    assert!(matches!(
        err,
        Error::Connection(ConnectionError::Unreachable { .. })
    ));
}

#[test]
fn connect_failures_are_classified() {
    assert!(matches!(
        connect_error("a:1", DriverFault::Authentication("bad password".into())),
        Error::Connection(ConnectionError::Authentication { .. })
    ));
    assert!(matches!(
        connect_error(
            "a:1",
            DriverFault::Command {
                code: 18,
                code_name: "AuthenticationFailed".into(),
                message: "auth failed".into(),
            }
        ),
        Error::Connection(ConnectionError::Authentication { .. })
    ));
    assert!(matches!(
        connect_error(
            "a:1",
            DriverFault::Io {
                kind: io::ErrorKind::InvalidData,
                message: "invalid peer certificate".into(),
            }
        ),
        Error::Connection(ConnectionError::Tls { .. })
    ));
    assert!(matches!(
        connect_error("a:1", DriverFault::ServerSelection("timed out".into())),
        Error::Connection(ConnectionError::Unreachable { .. })
    ));
}

#[test]
fn command_name_is_the_first_key() {
    assert_eq!(command_name(&doc! { "isMaster": 1, "comment": "x" }), "isMaster");
    assert_eq!(command_name(&doc! {}), "<empty>");
}
