//! This module defines types related to exposed devices.
use std::time;

mod value;
pub use value::Value;

/// A timestamped attribute value, as reported to the host.

#[derive(Debug, PartialEq, Clone)]
pub struct Reading {
    pub ts: time::SystemTime,
    pub value: Value,
}

mod id;
pub use id::Id;
