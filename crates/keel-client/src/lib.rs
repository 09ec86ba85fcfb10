//! # Keel Client
//!
//! The high-level operations a front-end maps its subcommands onto:
//! init/clone/add/commit/log through push/pull, over a repository rooted in
//! a local working directory, with the smart-HTTP transport on reqwest.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod error;
mod transport;

pub use client::KeelClient;
pub use error::{ClientError, Result};
pub use transport::HttpTransport;
