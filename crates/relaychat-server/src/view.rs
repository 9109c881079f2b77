//! Read side of the model. Every query returns fresh copies.

use chrono::{DateTime, Utc};

use relaychat_shared::{Conversation, ConversationSummary, Message, User, Uuid};

use crate::index::Order;
use crate::model::Model;

pub struct View<'a> {
    model: &'a Model,
}

impl<'a> View<'a> {
    pub fn new(model: &'a Model) -> Self {
        Self { model }
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    pub fn user(&self, id: &Uuid) -> Option<User> {
        self.model.users().get(id).cloned()
    }

    /// Users named in `ids`, in request order. Unknown ids are skipped.
    pub fn users_by_id(&self, ids: &[Uuid]) -> Vec<User> {
        ids.iter()
            .filter_map(|id| self.model.users().get(id))
            .cloned()
            .collect()
    }

    /// Every user not named in `ids`, in identifier order.
    pub fn users_excluding(&self, ids: &[Uuid]) -> Vec<User> {
        self.model
            .users()
            .all(Order::Ascending)
            .into_iter()
            .filter(|user| !ids.contains(&user.id))
            .cloned()
            .collect()
    }

    pub fn user_generation(&self) -> Uuid {
        self.model.user_generation().clone()
    }

    pub fn is_user_taken(&self, name: &str) -> bool {
        !self.model.users().with_text(name).is_empty()
    }

    // -----------------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------------

    pub fn conversation(&self, id: &Uuid) -> Option<Conversation> {
        self.model.conversations().get(id).cloned()
    }

    /// Every conversation with the ends of its chain, oldest first.
    pub fn conversation_summaries(&self) -> Vec<ConversationSummary> {
        self.model
            .conversations()
            .by_time(None, None, Order::Ascending)
            .into_iter()
            .map(|conversation| ConversationSummary {
                id: conversation.id.clone(),
                owner: conversation.owner.clone(),
                creation: conversation.creation,
                title: conversation.title.clone(),
                first_message: self.model.first_message(&conversation.id).cloned(),
                last_message: self.model.last_message(&conversation.id).cloned(),
            })
            .collect()
    }

    pub fn conversations_by_id(&self, ids: &[Uuid]) -> Vec<Conversation> {
        ids.iter()
            .filter_map(|id| self.model.conversations().get(id))
            .cloned()
            .collect()
    }

    /// Conversations created within `[start, end]`, oldest first.
    pub fn conversations_by_time(
        &self,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> Vec<Conversation> {
        self.model
            .conversations()
            .by_time(Some(start), Some(end), Order::Ascending)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Conversations whose title contains `filter`, ignoring case.
    pub fn conversations_by_title(&self, filter: &str) -> Vec<Conversation> {
        self.model
            .conversations()
            .containing(filter)
            .into_iter()
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    pub fn message(&self, id: &Uuid) -> Option<Message> {
        self.model.messages().get(id).cloned()
    }

    /// Messages named in `ids`, oldest first.
    pub fn messages_by_id(&self, ids: &[Uuid]) -> Vec<Message> {
        let mut messages: Vec<Message> = ids
            .iter()
            .filter_map(|id| self.model.messages().get(id))
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.creation.cmp(&b.creation));
        messages
    }

    /// Messages of `conversation` created within `[start, end]`, oldest first.
    pub fn messages_by_time(
        &self,
        conversation: &Uuid,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> Vec<Message> {
        self.model
            .messages()
            .by_time(Some(start), Some(end), Order::Ascending)
            .into_iter()
            .filter(|message| &message.conversation == conversation)
            .cloned()
            .collect()
    }

    /// Walk the chain around `root`.
    ///
    /// A positive `range` yields `root` and up to `range` following messages,
    /// a negative one up to `|range|` preceding messages and then `root`.
    /// Results are oldest first. An unknown root yields nothing.
    pub fn messages_by_range(&self, root: &Uuid, range: i32) -> Vec<Message> {
        let messages = self.model.messages();
        let Some(start) = messages.get(root) else {
            return Vec::new();
        };

        let steps = range.unsigned_abs() as usize;
        let step = |message: &Message| {
            if range > 0 {
                message.next.clone()
            } else {
                message.previous.clone()
            }
        };

        let mut walked = vec![start.clone()];
        let mut cursor = step(start);
        while walked.len() <= steps {
            let Some(message) = cursor.as_ref().and_then(|id| messages.get(id)) else {
                break;
            };
            cursor = step(message);
            walked.push(message.clone());
        }

        if range < 0 {
            walked.reverse();
        }
        walked
    }
}
