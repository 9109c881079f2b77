//! Entity creation.
//!
//! Every write to the model goes through the [`Controller`], whether it was
//! requested by a client or learned from the relay. The persistence sink is
//! written first; an entity that could not be persisted is never admitted.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use relaychat_shared::constants::{ADMIN_NAME, ADMIN_PASSWORD, MAX_ID_ATTEMPTS};
use relaychat_shared::{Conversation, Message, PersistenceSink, User, Uuid};
use relaychat_store::History;

use crate::error::CoreError;
use crate::generator::UuidGenerator;
use crate::model::Model;
use crate::view::View;

/// Where a creation request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A client of this server.
    Local,
    /// A bundle merged from the relay.
    Relay,
}

pub struct Controller {
    model: Model,
    ids: Box<dyn UuidGenerator>,
    sink: Box<dyn PersistenceSink>,
}

impl Controller {
    /// Build a controller over an empty model and bootstrap the admin user.
    pub fn new(
        ids: Box<dyn UuidGenerator>,
        sink: Box<dyn PersistenceSink>,
    ) -> Result<Self, CoreError> {
        Self::restore(ids, sink, History::default())
    }

    /// Build a controller whose model holds `history`, as read back from the
    /// sink's storage. Restored entities are not written again. The admin
    /// user is created only if the history has none.
    pub fn restore(
        ids: Box<dyn UuidGenerator>,
        sink: Box<dyn PersistenceSink>,
        history: History,
    ) -> Result<Self, CoreError> {
        let mut controller = Self {
            model: Model::new(),
            ids,
            sink,
        };

        for user in history.users {
            controller.admit(|model| model.add_user(user))?;
        }
        for conversation in history.conversations {
            controller.admit(|model| model.add_conversation(conversation))?;
        }
        for (user, conversation) in history.memberships {
            if controller.model.users().contains(&user)
                && controller.model.conversations().contains(&conversation)
            {
                controller.model.add_member(user, conversation);
            } else {
                warn!(user = %user, conversation = %conversation, "dangling membership skipped");
            }
        }
        controller.restore_chains(history.messages)?;

        if controller.model.users().with_text(ADMIN_NAME).is_empty() {
            let admin = controller.new_user(ADMIN_NAME, ADMIN_PASSWORD)?;
            info!(user.id = %admin.id, "admin user created");
        }

        Ok(controller)
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn view(&self) -> View<'_> {
        View::new(&self.model)
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Create a user for a client. Names are unique, ignoring case.
    pub fn new_user(&mut self, name: &str, password: &str) -> Result<User, CoreError> {
        let id = self.create_id()?;
        self.new_user_with_id(id, name, password, Utc::now(), Origin::Local)
    }

    pub fn new_user_with_id(
        &mut self,
        id: Uuid,
        name: &str,
        password: &str,
        creation: DateTime<Utc>,
        origin: Origin,
    ) -> Result<User, CoreError> {
        self.ensure_free(&id)?;

        if !self.model.users().with_text(name).is_empty() {
            match origin {
                Origin::Local => return Err(CoreError::NameTaken(name.to_string())),
                Origin::Relay => warn!(user.id = %id, user.name = name, "relay user shares a local name"),
            }
        }

        let user = User {
            id,
            name: name.to_string(),
            creation,
            password: password.to_string(),
        };

        self.sink.write_user(&user).map_err(|e| {
            error!(user.id = %user.id, "failed to persist user: {e}");
            CoreError::from(e)
        })?;
        self.admit(|model| model.add_user(user.clone()))?;

        debug!(user.id = %user.id, ?origin, "user created");
        Ok(user)
    }

    // -----------------------------------------------------------------------
    // Conversations
    // -----------------------------------------------------------------------

    pub fn new_conversation(&mut self, title: &str, owner: &Uuid) -> Result<Conversation, CoreError> {
        let id = self.create_id()?;
        self.new_conversation_with_id(id, title, owner, Utc::now())
    }

    pub fn new_conversation_with_id(
        &mut self,
        id: Uuid,
        title: &str,
        owner: &Uuid,
        creation: DateTime<Utc>,
    ) -> Result<Conversation, CoreError> {
        self.ensure_free(&id)?;
        if !self.model.users().contains(owner) {
            return Err(CoreError::UnknownUser(owner.clone()));
        }

        let conversation = Conversation {
            id,
            owner: owner.clone(),
            creation,
            title: title.to_string(),
        };

        self.sink.write_conversation(&conversation).map_err(|e| {
            error!(conversation.id = %conversation.id, "failed to persist conversation: {e}");
            CoreError::from(e)
        })?;
        self.admit(|model| model.add_conversation(conversation.clone()))?;

        debug!(conversation.id = %conversation.id, owner = %owner, "conversation created");
        Ok(conversation)
    }

    /// Let `issuer` add `user` to `conversation`. Only members (the owner
    /// included) may add others. Returns whether `user` is a member afterwards.
    pub fn add_user_to_conversation(
        &mut self,
        issuer: &Uuid,
        user: &Uuid,
        conversation: &Uuid,
    ) -> Result<bool, CoreError> {
        if !self.model.conversations().contains(conversation) {
            return Err(CoreError::UnknownConversation(conversation.clone()));
        }
        for id in [issuer, user] {
            if !self.model.users().contains(id) {
                return Err(CoreError::UnknownUser(id.clone()));
            }
        }

        if !self.model.is_member(issuer, conversation) {
            debug!(issuer = %issuer, conversation = %conversation, "issuer is not a member");
            return Ok(false);
        }
        if self.model.is_member(user, conversation) {
            return Ok(true);
        }

        self.sink.write_membership(user, conversation)?;
        self.model.add_member(user.clone(), conversation.clone());

        debug!(user = %user, conversation = %conversation, "member added");
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    pub fn new_message(
        &mut self,
        author: &Uuid,
        conversation: &Uuid,
        body: &str,
    ) -> Result<Message, CoreError> {
        let id = self.create_id()?;
        self.new_message_with_id(id, author, conversation, body, Utc::now())
    }

    /// Create a message at the tail of `conversation`. The previous tail's
    /// `next` link is set to the new message.
    pub fn new_message_with_id(
        &mut self,
        id: Uuid,
        author: &Uuid,
        conversation: &Uuid,
        body: &str,
        creation: DateTime<Utc>,
    ) -> Result<Message, CoreError> {
        self.ensure_free(&id)?;
        if !self.model.users().contains(author) {
            return Err(CoreError::UnknownUser(author.clone()));
        }
        if !self.model.conversations().contains(conversation) {
            return Err(CoreError::UnknownConversation(conversation.clone()));
        }

        let message = Message {
            id,
            author: author.clone(),
            conversation: conversation.clone(),
            content: body.to_string(),
            creation,
            next: None,
            previous: self.model.last_message(conversation).cloned(),
        };

        self.sink.write_message(&message).map_err(|e| {
            error!(message.id = %message.id, "failed to persist message: {e}");
            CoreError::from(e)
        })?;
        self.admit(|model| model.append_message(message.clone()))?;

        debug!(message.id = %message.id, conversation = %conversation, "message created");
        Ok(message)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Draw identifiers until one is unused by any entity type.
    fn create_id(&mut self) -> Result<Uuid, CoreError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = self.ids.make()?;
            if !self.model.id_in_use(&candidate) {
                return Ok(candidate);
            }
            debug!(candidate = %candidate, "identifier collision, drawing again");
        }
        Err(CoreError::IdentifierSpaceExhausted(MAX_ID_ATTEMPTS))
    }

    /// Append stored messages chain by chain, following `previous` links
    /// from each conversation's head.
    fn restore_chains(&mut self, messages: Vec<Message>) -> Result<(), CoreError> {
        let mut links: HashMap<Uuid, HashMap<Option<Uuid>, Message>> = HashMap::new();
        for mut message in messages {
            message.next = None;
            let chain = links.entry(message.conversation.clone()).or_default();
            if chain.contains_key(&message.previous) {
                warn!(message.id = %message.id, "message forks its chain, skipped");
                continue;
            }
            chain.insert(message.previous.clone(), message);
        }

        for (conversation, mut chain) in links {
            if !self.model.conversations().contains(&conversation) {
                warn!(conversation = %conversation, "messages of unknown conversation skipped");
                continue;
            }

            let mut tail = None;
            while let Some(message) = chain.remove(&tail) {
                tail = Some(message.id.clone());
                self.admit(|model| model.append_message(message))?;
            }
            if !chain.is_empty() {
                warn!(conversation = %conversation, skipped = chain.len(), "unlinked messages skipped");
            }
        }
        Ok(())
    }

    fn ensure_free(&self, id: &Uuid) -> Result<(), CoreError> {
        if self.model.id_in_use(id) {
            return Err(CoreError::IdInUse(id.clone()));
        }
        Ok(())
    }

    fn admit(
        &mut self,
        insert: impl FnOnce(&mut Model) -> Result<(), CoreError>,
    ) -> Result<(), CoreError> {
        insert(&mut self.model).map_err(|e| {
            error!("entity persisted but not admitted: {e}");
            e
        })
    }
}
