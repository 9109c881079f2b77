//! # relaychat-server
//!
//! A chat server core that keeps users, conversations and messages in
//! memory, writes them through to SQLite, and stays loosely consistent with
//! other servers by exchanging bundles through a relay.
//!
//! All state is owned by one [`server::Server`] loop fed by a
//! [`timeline::Timeline`]; HTTP handlers only submit events to it.

pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod generator;
pub mod index;
pub mod model;
pub mod relay;
pub mod server;
pub mod sync;
pub mod timeline;
pub mod view;
