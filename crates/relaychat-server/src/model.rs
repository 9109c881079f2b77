//! In-memory model: one multi-index table per entity type plus the
//! per-conversation bookkeeping (chain ends, members) and the user
//! generation marker.
//!
//! Rows live in an arena (`Vec<T>`) and every index maps its key to a slot,
//! so the in-place update of a message's `next` link is a write to one slot
//! and is seen by every index at once.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use relaychat_shared::{Conversation, Message, User, Uuid};

use crate::error::CoreError;
use crate::generator::{LinearUuidGenerator, UuidGenerator};
use crate::index::{Order, OrderedIndex, TextKey};

/// Fields every table indexes on.
pub trait Entity {
    fn id(&self) -> &Uuid;
    fn creation(&self) -> DateTime<Utc>;
    fn text(&self) -> &str;
}

impl Entity for User {
    fn id(&self) -> &Uuid {
        &self.id
    }
    fn creation(&self) -> DateTime<Utc> {
        self.creation
    }
    fn text(&self) -> &str {
        &self.name
    }
}

impl Entity for Conversation {
    fn id(&self) -> &Uuid {
        &self.id
    }
    fn creation(&self) -> DateTime<Utc> {
        self.creation
    }
    fn text(&self) -> &str {
        &self.title
    }
}

impl Entity for Message {
    fn id(&self) -> &Uuid {
        &self.id
    }
    fn creation(&self) -> DateTime<Utc> {
        self.creation
    }
    fn text(&self) -> &str {
        &self.content
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Entity set indexed by identifier (unique), creation time and text.
#[derive(Debug)]
pub struct Table<T> {
    rows: Vec<T>,
    by_id: OrderedIndex<Uuid, usize>,
    by_time: OrderedIndex<DateTime<Utc>, usize>,
    by_text: OrderedIndex<TextKey, usize>,
}

impl<T: Entity> Default for Table<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> Table<T> {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            by_id: OrderedIndex::unique(),
            by_time: OrderedIndex::with_duplicates(),
            by_text: OrderedIndex::with_duplicates(),
        }
    }

    /// Admit `entity` to all three indices. A taken identifier fails with
    /// [`CoreError::DuplicateKey`] and leaves the table untouched.
    pub fn add(&mut self, entity: T) -> Result<(), CoreError> {
        let slot = self.rows.len();
        let id = entity.id().clone();
        let time = entity.creation();
        let text = TextKey::new(entity.text());

        self.by_id.insert(id.clone(), slot)?;

        if let Err(err) = self.by_time.insert(time, slot) {
            self.by_id.remove(&id, &slot);
            return Err(CoreError::StoreInconsistency(format!(
                "time index rejected {id}: {err}"
            )));
        }
        if let Err(err) = self.by_text.insert(text, slot) {
            self.by_time.remove(&time, &slot);
            self.by_id.remove(&id, &slot);
            return Err(CoreError::StoreInconsistency(format!(
                "text index rejected {id}: {err}"
            )));
        }

        self.rows.push(entity);
        Ok(())
    }

    pub fn get(&self, id: &Uuid) -> Option<&T> {
        self.by_id.get(id).and_then(|slot| self.rows.get(*slot))
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.by_id.contains_key(id)
    }

    /// Mutate the row stored under `id` in place. `f` must not change the
    /// identifier, creation time or text of the row.
    pub fn update<R>(&mut self, id: &Uuid, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let slot = *self.by_id.get(id)?;
        self.rows.get_mut(slot).map(f)
    }

    /// Rows created within `[lower, upper]`.
    pub fn by_time(
        &self,
        lower: Option<&DateTime<Utc>>,
        upper: Option<&DateTime<Utc>>,
        order: Order,
    ) -> Vec<&T> {
        self.resolve(self.by_time.range(lower, upper, order))
    }

    /// Rows whose text equals `text`, ignoring case.
    pub fn with_text(&self, text: &str) -> Vec<&T> {
        self.by_text
            .get_all(&TextKey::new(text))
            .iter()
            .filter_map(|slot| self.rows.get(*slot))
            .collect()
    }

    /// Rows whose text contains `needle`, ignoring case, in text order.
    pub fn containing(&self, needle: &str) -> Vec<&T> {
        let needle = TextKey::new(needle);
        self.by_text
            .iter()
            .filter(|(key, _)| key.contains(&needle))
            .filter_map(|(_, slot)| self.rows.get(*slot))
            .collect()
    }

    /// Rows matching `predicate`, in text order.
    pub fn filter_text(&self, predicate: impl Fn(&T) -> bool) -> Vec<&T> {
        self.by_text
            .iter()
            .filter_map(|(_, slot)| self.rows.get(*slot))
            .filter(|row| predicate(row))
            .collect()
    }

    /// Every row in identifier order.
    pub fn all(&self, order: Order) -> Vec<&T> {
        self.resolve(self.by_id.range(None, None, order))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn resolve(&self, slots: Vec<&usize>) -> Vec<&T> {
        slots
            .into_iter()
            .filter_map(|slot| self.rows.get(*slot))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Model
// ---------------------------------------------------------------------------

pub struct Model {
    users: Table<User>,
    conversations: Table<Conversation>,
    messages: Table<Message>,
    /// Conversation id -> first message id.
    heads: HashMap<Uuid, Uuid>,
    /// Conversation id -> most recently created message id.
    tails: HashMap<Uuid, Uuid>,
    members: HashMap<Uuid, BTreeSet<Uuid>>,
    generations: LinearUuidGenerator,
    user_generation: Uuid,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        Self {
            users: Table::new(),
            conversations: Table::new(),
            messages: Table::new(),
            heads: HashMap::new(),
            tails: HashMap::new(),
            members: HashMap::new(),
            generations: LinearUuidGenerator::new(None, 1, u32::MAX),
            user_generation: Uuid::top(0),
        }
    }

    pub fn users(&self) -> &Table<User> {
        &self.users
    }

    pub fn conversations(&self) -> &Table<Conversation> {
        &self.conversations
    }

    pub fn messages(&self) -> &Table<Message> {
        &self.messages
    }

    /// Users, conversations and messages share one identifier space.
    pub fn id_in_use(&self, id: &Uuid) -> bool {
        self.users.contains(id) || self.conversations.contains(id) || self.messages.contains(id)
    }

    /// Marker that changes every time a user is admitted.
    pub fn user_generation(&self) -> &Uuid {
        &self.user_generation
    }

    pub fn add_user(&mut self, user: User) -> Result<(), CoreError> {
        // The marker only advances once the user is in.
        let mut generations = self.generations.clone();
        let generation = generations.make()?;
        self.users.add(user)?;
        self.generations = generations;
        self.user_generation = generation;
        Ok(())
    }

    /// Admit a conversation. Its owner becomes its first member.
    pub fn add_conversation(&mut self, conversation: Conversation) -> Result<(), CoreError> {
        let id = conversation.id.clone();
        let owner = conversation.owner.clone();
        self.conversations.add(conversation)?;
        self.members.entry(id).or_default().insert(owner);
        Ok(())
    }

    /// Append `message` to the tail of its conversation's chain.
    ///
    /// `message.previous` must name the current tail. The previous tail's
    /// `next` link is patched right before the message is admitted and
    /// restored if admission fails.
    pub fn append_message(&mut self, message: Message) -> Result<(), CoreError> {
        if self.tails.get(&message.conversation) != message.previous.as_ref() {
            return Err(CoreError::StoreInconsistency(format!(
                "message {} does not extend the tail of conversation {}",
                message.id, message.conversation
            )));
        }

        let id = message.id.clone();
        let conversation = message.conversation.clone();
        let previous = message.previous.clone();

        if let Some(previous) = &previous {
            self.messages
                .update(previous, |tail| tail.next = Some(id.clone()))
                .ok_or_else(|| {
                    CoreError::StoreInconsistency(format!("chain tail {previous} is not stored"))
                })?;
        }

        if let Err(err) = self.messages.add(message) {
            if let Some(previous) = &previous {
                self.messages.update(previous, |tail| tail.next = None);
            }
            return Err(err);
        }

        self.heads.entry(conversation.clone()).or_insert_with(|| id.clone());
        self.tails.insert(conversation, id);
        Ok(())
    }

    pub fn first_message(&self, conversation: &Uuid) -> Option<&Uuid> {
        self.heads.get(conversation)
    }

    pub fn last_message(&self, conversation: &Uuid) -> Option<&Uuid> {
        self.tails.get(conversation)
    }

    pub fn is_member(&self, user: &Uuid, conversation: &Uuid) -> bool {
        self.members
            .get(conversation)
            .is_some_and(|members| members.contains(user))
    }

    /// Returns `false` if `user` already was a member.
    pub fn add_member(&mut self, user: Uuid, conversation: Uuid) -> bool {
        self.members.entry(conversation).or_default().insert(user)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(seconds)
    }

    fn user(id: u32, name: &str, seconds: i64) -> User {
        User {
            id: Uuid::top(id),
            name: name.to_string(),
            creation: at(seconds),
            password: "pw".to_string(),
        }
    }

    fn conversation(id: u32, owner: u32, title: &str) -> Conversation {
        Conversation {
            id: Uuid::top(id),
            owner: Uuid::top(owner),
            creation: at(0),
            title: title.to_string(),
        }
    }

    fn message(id: u32, conversation: u32, previous: Option<u32>) -> Message {
        Message {
            id: Uuid::top(id),
            author: Uuid::top(1),
            conversation: Uuid::top(conversation),
            content: format!("message {id}"),
            creation: at(i64::from(id)),
            next: None,
            previous: previous.map(Uuid::top),
        }
    }

    #[test]
    fn test_duplicate_id_leaves_table_unchanged() {
        let mut users = Table::new();
        users.add(user(1, "alice", 0)).unwrap();

        let err = users.add(user(1, "bob", 5)).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey));
        assert_eq!(users.len(), 1);
        assert!(users.with_text("bob").is_empty());
        assert_eq!(users.by_time(None, None, Order::Ascending).len(), 1);
    }

    #[test]
    fn test_time_and_text_views_agree_with_id_view() {
        let mut users = Table::new();
        users.add(user(3, "Carol", 2)).unwrap();
        users.add(user(1, "alice", 0)).unwrap();
        users.add(user(2, "Bob", 1)).unwrap();

        let by_time: Vec<&str> = users
            .by_time(Some(&at(1)), None, Order::Descending)
            .iter()
            .map(|u| u.name.as_str())
            .collect();
        assert_eq!(by_time, vec!["Carol", "Bob"]);

        let by_id: Vec<u32> = users.all(Order::Ascending).iter().map(|u| u.id.id()).collect();
        assert_eq!(by_id, vec![1, 2, 3]);

        assert_eq!(users.with_text("BOB").len(), 1);
        let containing: Vec<&str> = users
            .containing("O")
            .iter()
            .map(|u| u.name.as_str())
            .collect();
        assert_eq!(containing, vec!["Bob", "Carol"]);
        assert_eq!(users.filter_text(|u| u.name.len() == 5).len(), 2);
    }

    #[test]
    fn test_update_is_visible_through_every_index() {
        let mut messages = Table::new();
        messages.add(message(1, 9, None)).unwrap();
        messages.update(&Uuid::top(1), |m| m.next = Some(Uuid::top(2)));

        let expected = Some(Uuid::top(2));
        assert_eq!(messages.get(&Uuid::top(1)).unwrap().next, expected);
        assert_eq!(messages.by_time(None, None, Order::Ascending)[0].next, expected);
        assert_eq!(messages.with_text("MESSAGE 1")[0].next, expected);
        assert!(messages.update(&Uuid::top(7), |_| ()).is_none());
    }

    #[test]
    fn test_identifier_space_is_shared() {
        let mut model = Model::new();
        model.add_user(user(1, "alice", 0)).unwrap();
        model.add_conversation(conversation(2, 1, "room")).unwrap();
        model.append_message(message(3, 2, None)).unwrap();

        for id in 1..=3 {
            assert!(model.id_in_use(&Uuid::top(id)));
        }
        assert!(!model.id_in_use(&Uuid::top(4)));
    }

    #[test]
    fn test_user_generation_advances_only_on_admission() {
        let mut model = Model::new();
        assert_eq!(model.user_generation(), &Uuid::top(0));

        model.add_user(user(1, "alice", 0)).unwrap();
        let first = model.user_generation().clone();
        assert!(first > Uuid::top(0));

        assert!(model.add_user(user(1, "again", 0)).is_err());
        assert_eq!(model.user_generation(), &first);

        model.add_user(user(2, "bob", 0)).unwrap();
        assert!(model.user_generation() > &first);
    }

    #[test]
    fn test_append_links_chain_and_tracks_ends() {
        let mut model = Model::new();
        model.add_conversation(conversation(10, 1, "room")).unwrap();

        model.append_message(message(1, 10, None)).unwrap();
        model.append_message(message(2, 10, Some(1))).unwrap();
        model.append_message(message(3, 10, Some(2))).unwrap();

        let conv = Uuid::top(10);
        assert_eq!(model.first_message(&conv), Some(&Uuid::top(1)));
        assert_eq!(model.last_message(&conv), Some(&Uuid::top(3)));

        let mut walk = Vec::new();
        let mut cursor = model.first_message(&conv).cloned();
        while let Some(id) = cursor {
            let m = model.messages().get(&id).unwrap();
            walk.push(id.id());
            cursor = m.next.clone();
        }
        assert_eq!(walk, vec![1, 2, 3]);
    }

    #[test]
    fn test_append_rejects_stale_previous_and_keeps_links() {
        let mut model = Model::new();
        model.append_message(message(1, 10, None)).unwrap();
        model.append_message(message(2, 10, Some(1))).unwrap();

        let err = model.append_message(message(3, 10, Some(1))).unwrap_err();
        assert!(matches!(err, CoreError::StoreInconsistency(_)));

        // Reusing an id fails after the tail was patched; the patch is undone.
        let err = model.append_message(message(1, 10, Some(2))).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey));
        assert_eq!(model.messages().get(&Uuid::top(2)).unwrap().next, None);
        assert_eq!(model.last_message(&Uuid::top(10)), Some(&Uuid::top(2)));
    }

    #[test]
    fn test_owner_is_member() {
        let mut model = Model::new();
        model.add_conversation(conversation(2, 1, "room")).unwrap();

        assert!(model.is_member(&Uuid::top(1), &Uuid::top(2)));
        assert!(!model.add_member(Uuid::top(1), Uuid::top(2)));
        assert!(model.add_member(Uuid::top(5), Uuid::top(2)));
        assert!(model.is_member(&Uuid::top(5), &Uuid::top(2)));
        assert!(!model.is_member(&Uuid::top(5), &Uuid::top(99)));
    }
}
