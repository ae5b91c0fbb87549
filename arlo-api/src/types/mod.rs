//! Defines fundamental types used throughout the workspace.

use std::fmt;
use tokio::sync::{mpsc, oneshot};

/// Enumerates all the errors that can be reported by the client
/// library or the daemon. Code talking to the cloud service should
/// map transport and payload problems into one of these values rather
/// than define service-specific errors. The associated description
/// strings carry the details.

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Error {
    /// Returned whenever a resource cannot be found.
    NotFound,

    /// Reported when the peer of a communication channel has closed
    /// its handle.
    MissingPeer(String),

    /// A type mismatch is preventing the operation from continuing.
    TypeError,

    /// An invalid value was provided.
    InvArgument(String),

    /// Communication was disrupted because one end didn't follow the
    /// cloud protocol.
    ProtocolError(String),

    /// The cloud service rejected our credentials or our session
    /// token has expired.
    AuthenticationError,

    /// An operation didn't complete in a timely fashion.
    TimeoutError,

    /// The requested operation couldn't complete. The description
    /// field will have more information for the user.
    OperationError(String),

    /// A bad parameter was given in a configuration or a
    /// configuration was missing a required parameter.
    ConfigError(String),

    /// There was a problem parsing a string. The associated string
    /// will describe how the parsing failed.
    ParseError(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NotFound => write!(f, "item not found"),
            Error::MissingPeer(detail) => {
                write!(f, "{} is missing peer", detail)
            }
            Error::TypeError => write!(f, "incorrect type"),
            Error::InvArgument(v) => write!(f, "{}", &v),
            Error::ProtocolError(v) => write!(f, "protocol error: {}", &v),
            Error::AuthenticationError => write!(f, "permission error"),
            Error::TimeoutError => write!(f, "timeout"),
            Error::OperationError(v) => {
                write!(f, "couldn't complete operation: {}", &v)
            }
            Error::ConfigError(v) => write!(f, "config error: {}", &v),
            Error::ParseError(v) => write!(f, "parse error: {}", &v),
        }
    }
}

// Defining these trait implementations allows any code that sends
// requests over an `mpsc` channel and expects the reply in a
// `oneshot` to easily translate the channel errors into our error
// type.

impl<T> From<mpsc::error::SendError<T>> for Error {
    fn from(_error: mpsc::error::SendError<T>) -> Self {
        Error::MissingPeer(String::from("request channel is closed"))
    }
}

impl From<oneshot::error::RecvError> for Error {
    fn from(_error: oneshot::error::RecvError) -> Self {
        Error::MissingPeer(String::from("request dropped"))
    }
}

pub mod device;
