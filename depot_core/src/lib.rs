//! Core library for depot, a minimal package distribution tool for
//! setting up machines on a local network.
//!
//! This crate provides:
//! - the length-prefixed binary wire protocol (`protocol`)
//! - streaming SHA-256 digests (`hash`)
//! - the server-side flat file store (`store`)
//! - `.tar.gz` packaging and safe extraction (`archive`)
//! - the one-shot transfer client (`client`)
//! - the accept-loop transfer server (`server`)

pub mod archive;
pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod hash;
pub mod protocol;
pub mod server;
pub mod store;

// Re-export public API
pub use client::DepotClient;
pub use constants::TRANSFER_PORT;
pub use error::TransferError;
pub use hash::{Digest, digest_file};
pub use server::run_server;
pub use store::{FileStore, StoreEntry};
