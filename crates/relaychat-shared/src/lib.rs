// Types and contracts shared by chat servers, the relay and the store.

pub mod constants;
pub mod entities;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod sink;
pub mod types;

pub use entities::{Conversation, ConversationSummary, Message, User};
pub use error::{IdentifierParseError, PersistenceError, RelayError};
pub use relay::{Bundle, Component, MemoryRelay, Relay};
pub use sink::{MemorySink, PersistenceSink};
pub use types::Uuid;
