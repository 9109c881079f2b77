//! Write-through contract to the durability layer.
//!
//! The server calls the sink once per admitted entity, before the entity
//! becomes visible in memory. A failing sink turns into a "not created"
//! answer for the request that triggered the write.

use std::sync::{Arc, Mutex};

use crate::entities::{Conversation, Message, User};
use crate::error::PersistenceError;
use crate::types::Uuid;

pub trait PersistenceSink: Send {
    fn write_user(&self, user: &User) -> Result<(), PersistenceError>;

    fn write_conversation(&self, conversation: &Conversation) -> Result<(), PersistenceError>;

    fn write_message(&self, message: &Message) -> Result<(), PersistenceError>;

    fn write_membership(&self, user: &Uuid, conversation: &Uuid) -> Result<(), PersistenceError>;
}

/// One write-through call as recorded by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkRecord {
    User(Uuid),
    Conversation(Uuid),
    Message(Uuid),
    Membership { user: Uuid, conversation: Uuid },
}

#[derive(Debug, Default)]
struct Journal {
    records: Vec<SinkRecord>,
    failing: bool,
}

/// Sink that journals calls in memory. Clones share the same journal, so a
/// caller can keep a handle after giving the sink away.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    journal: Arc<Mutex<Journal>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following write fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut journal) = self.journal.lock() {
            journal.failing = failing;
        }
    }

    pub fn records(&self) -> Vec<SinkRecord> {
        self.journal
            .lock()
            .map(|journal| journal.records.clone())
            .unwrap_or_default()
    }

    fn record(&self, record: SinkRecord) -> Result<(), PersistenceError> {
        let mut journal = self
            .journal
            .lock()
            .map_err(|_| PersistenceError::Unavailable("journal lock poisoned".to_string()))?;
        if journal.failing {
            return Err(PersistenceError::Unavailable("sink set to fail".to_string()));
        }
        journal.records.push(record);
        Ok(())
    }
}

impl PersistenceSink for MemorySink {
    fn write_user(&self, user: &User) -> Result<(), PersistenceError> {
        self.record(SinkRecord::User(user.id.clone()))
    }

    fn write_conversation(&self, conversation: &Conversation) -> Result<(), PersistenceError> {
        self.record(SinkRecord::Conversation(conversation.id.clone()))
    }

    fn write_message(&self, message: &Message) -> Result<(), PersistenceError> {
        self.record(SinkRecord::Message(message.id.clone()))
    }

    fn write_membership(&self, user: &Uuid, conversation: &Uuid) -> Result<(), PersistenceError> {
        self.record(SinkRecord::Membership {
            user: user.clone(),
            conversation: conversation.clone(),
        })
    }
}
