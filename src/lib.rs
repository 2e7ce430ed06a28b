//! rawecho - diagnostic HTTP listener that echoes the raw request bytes
//!
//! Every accepted connection records what it reads; the request handler
//! answers with exactly those bytes.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod error;
pub mod network;
pub mod recording;

#[cfg(test)]
mod test_support;

pub use error::{RawEchoError, Result};
