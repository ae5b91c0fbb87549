//! Client library for the Arlo cloud camera platform.
//!
//! The [`ArloClient`] authenticates against the vendor cloud,
//! discovers the account's base stations, cameras, doorbells and
//! lights, subscribes to the server-sent event feed, and reduces
//! everything -- event stream, periodic polls, the recording library
//! -- to a stream of typed attribute updates a host can expose.
//!
//! The wire format lives in [`constant`] and [`payload`]; nothing
//! outside those modules spells a cloud path or JSON field name.

pub mod backend;
pub mod client;
pub mod config;
pub mod constant;
pub mod device;
pub mod media;
pub mod modes;
pub mod payload;
pub mod stream;

pub use client::ArloClient;
pub use config::{ClientOptions, ModeApi};
