//! Types shared between the Arlo cloud client library and the `arlod`
//! daemon.
//!
//! The interfaces defined here are deliberately small: the error
//! catalog used across the workspace, the typed attribute values that
//! device state is reduced to, and the identifiers under which
//! discovered devices are exposed to the host.

mod types;

// Pull types down to the `arlo-api` namespace.

pub use types::device;
pub use types::Error;

/// A specialization of `std::result::Result<>` where the error value
/// is `types::Error`.

pub type Result<T> = std::result::Result<T, Error>;
