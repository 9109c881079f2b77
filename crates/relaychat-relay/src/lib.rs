//! # relaychat-relay
//!
//! Standalone relay service. Chat servers push one bundle per message they
//! create and pull every bundle pushed after their cursor. Bundles live in
//! memory for the life of the process.

pub mod api;
pub mod config;
pub mod error;
