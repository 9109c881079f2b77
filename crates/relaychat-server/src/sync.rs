//! Relay synchronization.
//!
//! A server polls the relay for bundles after its cursor and merges each one
//! through the same [`Controller`] paths a client uses. Merging is
//! idempotent: a component whose identifier is already known is skipped, so
//! overlapping or redelivered batches are harmless. Locally created messages
//! travel the other way as an [`Outbound`] bundle.

use tracing::{debug, info, warn};

use relaychat_shared::constants::{RELAY_BATCH_SIZE, RELAY_USER_PASSWORD};
use relaychat_shared::{Bundle, Component, Relay, Uuid};

use crate::controller::{Controller, Origin};
use crate::error::CoreError;
use crate::model::Model;

/// Entities created by merging one bundle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub users: usize,
    pub conversations: usize,
    pub messages: usize,
}

impl MergeOutcome {
    /// True if the bundle was already fully known.
    pub fn is_empty(&self) -> bool {
        self.users + self.conversations + self.messages == 0
    }
}

/// Poll state of one server: the cursor and the batch size.
#[derive(Debug)]
pub struct RelaySync {
    cursor: Option<Uuid>,
    batch_size: usize,
}

impl Default for RelaySync {
    fn default() -> Self {
        Self::new(RELAY_BATCH_SIZE)
    }
}

impl RelaySync {
    pub fn new(batch_size: usize) -> Self {
        Self {
            cursor: None,
            batch_size,
        }
    }

    /// Last bundle merged successfully.
    pub fn cursor(&self) -> Option<&Uuid> {
        self.cursor.as_ref()
    }

    /// Pull one batch and merge it in relay order. Returns the number of
    /// bundles merged.
    ///
    /// The first failing bundle stops the batch. The cursor then stays at
    /// the last bundle that merged, and the next poll starts over from there.
    pub async fn poll(
        &mut self,
        relay: &dyn Relay,
        team: &Uuid,
        secret: &[u8],
        controller: &mut Controller,
    ) -> Result<usize, CoreError> {
        let bundles = relay
            .pull(team, secret, self.cursor.as_ref(), self.batch_size)
            .await?;

        let mut merged = 0;
        for bundle in &bundles {
            if self.cursor.as_ref().is_some_and(|cursor| &bundle.id <= cursor) {
                debug!(bundle = %bundle.id, "bundle at or before cursor, skipping");
                continue;
            }

            let outcome = merge_bundle(controller, bundle).map_err(|e| {
                warn!(bundle = %bundle.id, "bundle merge failed: {e}");
                e
            })?;
            if outcome.is_empty() {
                debug!(bundle = %bundle.id, "bundle already known");
            }

            self.cursor = Some(bundle.id.clone());
            merged += 1;
        }

        if merged > 0 {
            info!(
                merged,
                cursor = ?self.cursor.as_ref().map(ToString::to_string),
                "relay batch merged"
            );
        }
        Ok(merged)
    }
}

/// Apply one bundle: user first, then conversation, then message.
///
/// A conversation learned this way is owned by the bundle's user, since the
/// relay does not carry ownership.
pub fn merge_bundle(controller: &mut Controller, bundle: &Bundle) -> Result<MergeOutcome, CoreError> {
    let mut outcome = MergeOutcome::default();

    let user = &bundle.user;
    if !controller.model().users().contains(&user.id) {
        controller.new_user_with_id(
            user.id.clone(),
            &user.text,
            RELAY_USER_PASSWORD,
            user.time,
            Origin::Relay,
        )?;
        outcome.users += 1;
    }

    let Some(conversation) = &bundle.conversation else {
        if bundle.message.is_some() {
            return Err(CoreError::MalformedBundle {
                bundle: bundle.id.clone(),
                reason: "message without conversation".to_string(),
            });
        }
        return Ok(outcome);
    };

    if !controller.model().conversations().contains(&conversation.id) {
        controller.new_conversation_with_id(
            conversation.id.clone(),
            &conversation.text,
            &user.id,
            conversation.time,
        )?;
        outcome.conversations += 1;
    }

    if let Some(message) = &bundle.message {
        if !controller.model().messages().contains(&message.id) {
            controller.new_message_with_id(
                message.id.clone(),
                &user.id,
                &conversation.id,
                &message.text,
                message.time,
            )?;
            outcome.messages += 1;
        }
    }

    Ok(outcome)
}

/// Snapshot of a locally created message, ready to push.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub user: Component,
    pub conversation: Component,
    pub message: Component,
}

impl Outbound {
    pub fn collect(
        model: &Model,
        user: &Uuid,
        conversation: &Uuid,
        message: &Uuid,
    ) -> Result<Self, CoreError> {
        let user = model
            .users()
            .get(user)
            .ok_or_else(|| CoreError::UnknownUser(user.clone()))?;
        let conversation = model
            .conversations()
            .get(conversation)
            .ok_or_else(|| CoreError::UnknownConversation(conversation.clone()))?;
        let message = model
            .messages()
            .get(message)
            .ok_or_else(|| CoreError::UnknownMessage(message.clone()))?;

        Ok(Self {
            user: Component::pack(user.id.clone(), &user.name, user.creation),
            conversation: Component::pack(
                conversation.id.clone(),
                &conversation.title,
                conversation.creation,
            ),
            message: Component::pack(message.id.clone(), &message.content, message.creation),
        })
    }

    /// Publish to the relay. Returns the bundle id the relay assigned.
    pub async fn push(self, relay: &dyn Relay, team: &Uuid, secret: &[u8]) -> Result<Uuid, CoreError> {
        let message = self.message.id.clone();
        let bundle = relay
            .push(team, secret, self.user, self.conversation, self.message)
            .await?;
        debug!(message = %message, bundle = %bundle, "message pushed to relay");
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    use relaychat_shared::{MemoryRelay, MemorySink, RelayError};

    use super::*;
    use crate::generator::RandomUuidGenerator;

    /// Relay that answers every pull with the same batch.
    struct ScriptedRelay {
        batch: Mutex<Result<Vec<Bundle>, RelayError>>,
    }

    impl ScriptedRelay {
        fn new(batch: Vec<Bundle>) -> Self {
            Self {
                batch: Mutex::new(Ok(batch)),
            }
        }

        fn fail(&self) {
            *self.batch.lock().unwrap() = Err(RelayError::Unreachable("down".to_string()));
        }
    }

    #[async_trait]
    impl Relay for ScriptedRelay {
        async fn pull(
            &self,
            _team: &Uuid,
            _secret: &[u8],
            _after: Option<&Uuid>,
            max: usize,
        ) -> Result<Vec<Bundle>, RelayError> {
            match &*self.batch.lock().unwrap() {
                Ok(batch) => Ok(batch.iter().take(max).cloned().collect()),
                Err(err) => Err(err.clone()),
            }
        }

        async fn push(
            &self,
            _team: &Uuid,
            _secret: &[u8],
            _user: Component,
            _conversation: Component,
            _message: Component,
        ) -> Result<Uuid, RelayError> {
            Err(RelayError::Unreachable("read only".to_string()))
        }
    }

    fn remote(id: u32) -> Uuid {
        Uuid::new(Some(Uuid::top(2)), id)
    }

    fn component(id: u32, text: &str, offset: i64) -> Component {
        Component::pack(remote(id), text, Utc::now() + Duration::milliseconds(offset))
    }

    fn bundle(
        id: u32,
        user: Component,
        conversation: Option<Component>,
        message: Option<Component>,
    ) -> Bundle {
        Bundle {
            id: Uuid::top(id),
            team: Uuid::top(2),
            time: Utc::now(),
            user,
            conversation,
            message,
        }
    }

    fn controller(server: u32) -> Controller {
        let ids = RandomUuidGenerator::new(Uuid::top(server), u64::from(server));
        Controller::new(Box::new(ids), Box::new(MemorySink::new())).unwrap()
    }

    fn counts(controller: &Controller) -> (usize, usize, usize) {
        let model = controller.model();
        (
            model.users().len(),
            model.conversations().len(),
            model.messages().len(),
        )
    }

    #[tokio::test]
    async fn test_batch_with_duplicate_and_redelivery() {
        let u1 = component(1, "ursula", 0);
        let b1 = bundle(1, u1.clone(), None, None);
        let b2 = bundle(
            2,
            u1.clone(),
            Some(component(10, "C1", 1)),
            Some(component(20, "M1", 2)),
        );
        let relay = ScriptedRelay::new(vec![b1, b2.clone(), b2]);

        let mut controller = controller(1);
        let mut sync = RelaySync::default();
        let before = counts(&controller);

        let merged = sync
            .poll(&relay, &Uuid::top(1), b"s", &mut controller)
            .await
            .unwrap();
        assert_eq!(merged, 2);
        assert_eq!(sync.cursor(), Some(&Uuid::top(2)));
        assert_eq!(counts(&controller), (before.0 + 1, 1, 1));

        let c1 = controller.model().conversations().get(&remote(10)).unwrap();
        assert_eq!(c1.owner, remote(1));
        let m1 = controller.model().messages().get(&remote(20)).unwrap();
        assert_eq!(m1.author, remote(1));
        assert_eq!(m1.content, "M1");

        // Redelivery of the same batch.
        let merged = sync
            .poll(&relay, &Uuid::top(1), b"s", &mut controller)
            .await
            .unwrap();
        assert_eq!(merged, 0);
        assert_eq!(sync.cursor(), Some(&Uuid::top(2)));
        assert_eq!(counts(&controller), (before.0 + 1, 1, 1));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut controller = controller(1);
        let b = bundle(
            7,
            component(1, "ursula", 0),
            Some(component(10, "C1", 1)),
            Some(component(20, "M1", 2)),
        );

        let first = merge_bundle(&mut controller, &b).unwrap();
        assert_eq!(
            first,
            MergeOutcome {
                users: 1,
                conversations: 1,
                messages: 1
            }
        );
        let after_first = counts(&controller);

        assert!(merge_bundle(&mut controller, &b).unwrap().is_empty());
        assert_eq!(counts(&controller), after_first);
    }

    #[test]
    fn test_first_writer_owns_replicated_conversation() {
        let mut controller = controller(1);
        let conv = component(10, "C1", 0);

        let first = bundle(
            1,
            component(1, "author", 0),
            Some(conv.clone()),
            Some(component(20, "hello", 1)),
        );
        let second = bundle(
            2,
            component(2, "replier", 0),
            Some(conv),
            Some(component(21, "hi back", 2)),
        );
        merge_bundle(&mut controller, &first).unwrap();
        merge_bundle(&mut controller, &second).unwrap();

        let model = controller.model();
        assert_eq!(model.conversations().get(&remote(10)).unwrap().owner, remote(1));
        assert_eq!(
            model.messages().get(&remote(20)).unwrap().next,
            Some(remote(21))
        );
        assert_eq!(
            model.messages().get(&remote(21)).unwrap().previous,
            Some(remote(20))
        );
    }

    #[test]
    fn test_replayed_and_local_messages_share_one_chain() {
        let mut controller = controller(1);
        merge_bundle(
            &mut controller,
            &bundle(
                1,
                component(1, "remote", 0),
                Some(component(10, "C1", 0)),
                Some(component(20, "from afar", 1)),
            ),
        )
        .unwrap();

        let local_user = controller.new_user("local", "pw").unwrap();
        let local = controller
            .new_message(&local_user.id, &remote(10), "from here")
            .unwrap();
        merge_bundle(
            &mut controller,
            &bundle(
                2,
                component(1, "remote", 0),
                Some(component(10, "C1", 0)),
                Some(component(21, "again", 3)),
            ),
        )
        .unwrap();

        let view = controller.view();
        let chain: Vec<String> = view
            .messages_by_range(&remote(20), 10)
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(chain, vec!["from afar", "from here", "again"]);
        assert_eq!(local.previous, Some(remote(20)));
    }

    #[tokio::test]
    async fn test_failures_leave_cursor_in_place() {
        let good = bundle(3, component(1, "ursula", 0), None, None);
        let malformed = bundle(4, component(1, "ursula", 0), None, Some(component(20, "M", 1)));
        let after = bundle(5, component(5, "never", 0), None, None);
        let relay = ScriptedRelay::new(vec![good, malformed, after]);

        let mut controller = controller(1);
        let mut sync = RelaySync::new(32);

        let err = sync
            .poll(&relay, &Uuid::top(1), b"s", &mut controller)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::MalformedBundle { .. }));
        assert_eq!(sync.cursor(), Some(&Uuid::top(3)));
        assert!(!controller.model().users().contains(&remote(5)));

        relay.fail();
        let err = sync
            .poll(&relay, &Uuid::top(1), b"s", &mut controller)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Relay(RelayError::Unreachable(_))));
        assert_eq!(sync.cursor(), Some(&Uuid::top(3)));
    }

    #[tokio::test]
    async fn test_batch_size_bounds_each_poll() {
        let bundles = (1..=5)
            .map(|n| bundle(n, component(n, &format!("user{n}"), 0), None, None))
            .collect();
        let relay = ScriptedRelay::new(bundles);

        let mut controller = controller(1);
        let mut sync = RelaySync::new(2);
        let merged = sync
            .poll(&relay, &Uuid::top(1), b"s", &mut controller)
            .await
            .unwrap();
        assert_eq!(merged, 2);
        assert_eq!(sync.cursor(), Some(&Uuid::top(2)));
    }

    #[tokio::test]
    async fn test_two_servers_converge_through_memory_relay() {
        let relay = MemoryRelay::new();
        let (team_a, team_b) = (Uuid::top(100), Uuid::top(200));
        relay.register(team_a.clone(), b"alpha".to_vec()).await;
        relay.register(team_b.clone(), b"beta".to_vec()).await;

        let mut server_a = controller(100);
        let mut server_b = controller(200);

        let alice = server_a.new_user("alice", "pw").unwrap();
        let room = server_a.new_conversation("room", &alice.id).unwrap();
        for body in ["hi", "there"] {
            let message = server_a.new_message(&alice.id, &room.id, body).unwrap();
            Outbound::collect(server_a.model(), &alice.id, &room.id, &message.id)
                .unwrap()
                .push(&relay, &team_a, b"alpha")
                .await
                .unwrap();
        }

        let mut sync_b = RelaySync::default();
        let merged = sync_b
            .poll(&relay, &team_b, b"beta", &mut server_b)
            .await
            .unwrap();
        assert_eq!(merged, 2);

        let view = server_b.view();
        let replicated = view.conversation(&room.id).unwrap();
        assert_eq!(replicated.owner, alice.id);
        assert_eq!(view.user(&alice.id).unwrap().password, RELAY_USER_PASSWORD);

        let first = view.conversation_summaries()[0].first_message.clone().unwrap();
        let bodies: Vec<String> = view
            .messages_by_range(&first, 5)
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(bodies, vec!["hi", "there"]);

        // Server A sees its own bundles come back and changes nothing.
        let mut sync_a = RelaySync::default();
        let before = counts(&server_a);
        sync_a
            .poll(&relay, &team_a, b"alpha", &mut server_a)
            .await
            .unwrap();
        assert_eq!(counts(&server_a), before);
        assert_eq!(sync_a.cursor(), sync_b.cursor());
    }

    #[tokio::test]
    async fn test_polling_resumes_after_restart_on_same_database() {
        let relay = MemoryRelay::new();
        let (team_a, team_b) = (Uuid::top(100), Uuid::top(200));
        relay.register(team_a.clone(), b"alpha".to_vec()).await;
        relay.register(team_b.clone(), b"beta".to_vec()).await;

        let mut server_a = controller(100);
        let alice = server_a.new_user("alice", "pw").unwrap();
        let room = server_a.new_conversation("room", &alice.id).unwrap();
        let hi = server_a.new_message(&alice.id, &room.id, "hi").unwrap();
        Outbound::collect(server_a.model(), &alice.id, &room.id, &hi.id)
            .unwrap()
            .push(&relay, &team_a, b"alpha")
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.db");
        let open_b = || {
            let db = relaychat_store::Database::open_at(&path).unwrap();
            let history = db.load_history().unwrap();
            let ids = RandomUuidGenerator::new(Uuid::top(200), 200);
            Controller::restore(Box::new(ids), Box::new(db), history).unwrap()
        };

        {
            let mut server_b = open_b();
            let mut sync = RelaySync::default();
            let merged = sync.poll(&relay, &team_b, b"beta", &mut server_b).await.unwrap();
            assert_eq!(merged, 1);
        }

        // Fresh cursor, same file: the redelivered bundle is recognised.
        let mut server_b = open_b();
        let before = counts(&server_b);
        assert_eq!(before, (2, 1, 1));

        let mut sync = RelaySync::default();
        for _ in 0..2 {
            let merged = sync.poll(&relay, &team_b, b"beta", &mut server_b).await.unwrap();
            assert!(merged <= 1);
            assert_eq!(sync.cursor(), Some(&Uuid::top(1)));
        }
        assert_eq!(counts(&server_b), before);

        // New traffic still flows in.
        let there = server_a.new_message(&alice.id, &room.id, "there").unwrap();
        Outbound::collect(server_a.model(), &alice.id, &room.id, &there.id)
            .unwrap()
            .push(&relay, &team_a, b"alpha")
            .await
            .unwrap();
        let merged = sync.poll(&relay, &team_b, b"beta", &mut server_b).await.unwrap();
        assert_eq!(merged, 1);
        assert_eq!(sync.cursor(), Some(&Uuid::top(2)));
        assert_eq!(
            server_b.model().messages().get(&there.id).unwrap().previous,
            Some(hi.id)
        );
    }
}
