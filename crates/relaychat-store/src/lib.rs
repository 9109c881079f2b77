//! # relaychat-store
//!
//! Durable write-through storage for a chat server, backed by SQLite.
//!
//! The in-memory indices of the server stay authoritative while it runs;
//! this crate records every admitted user, conversation, message and
//! membership so that the history survives the process. It exposes a
//! synchronous [`Database`] handle that wraps a `rusqlite::Connection`,
//! typed helpers per table, and an implementation of
//! [`relaychat_shared::PersistenceSink`].

pub mod conversations;
pub mod database;
pub mod history;
pub mod messages;
pub mod migrations;
pub mod sink;
pub mod users;

mod error;

pub use database::Database;
pub use history::History;
pub use error::{Result, StoreError};
