//! The single owner of chat state.
//!
//! [`Server::run`] drains the timeline and handles one [`Event`] at a time:
//! client requests, relay polls and relay pushes. Nothing else touches the
//! controller, so no locking is needed around it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use relaychat_shared::protocol::{Request, Response};
use relaychat_shared::{Relay, Uuid};

use crate::controller::Controller;
use crate::error::CoreError;
use crate::sync::{Outbound, RelaySync};
use crate::timeline::{Timeline, TimelineHandle};

/// Work items submitted to the timeline.
#[derive(Debug)]
pub enum Event {
    /// Pull and merge one relay batch, then re-arm.
    PollRelay,
    /// Publish a locally created message.
    PushToRelay {
        user: Uuid,
        conversation: Uuid,
        message: Uuid,
    },
    /// A client request and where to send the answer.
    Request {
        request: Request,
        reply: oneshot::Sender<Response>,
    },
}

/// Connection of one server to the relay.
pub struct RelayLink {
    relay: Arc<dyn Relay>,
    team: Uuid,
    secret: Vec<u8>,
    sync: RelaySync,
    interval: Duration,
}

impl RelayLink {
    pub fn new(
        relay: Arc<dyn Relay>,
        team: Uuid,
        secret: Vec<u8>,
        batch_size: usize,
        interval: Duration,
    ) -> Self {
        Self {
            relay,
            team,
            secret,
            sync: RelaySync::new(batch_size),
            interval,
        }
    }

    pub fn cursor(&self) -> Option<&Uuid> {
        self.sync.cursor()
    }
}

pub struct Server {
    controller: Controller,
    link: Option<RelayLink>,
    timeline: TimelineHandle<Event>,
}

impl Server {
    pub fn new(controller: Controller, timeline: TimelineHandle<Event>) -> Self {
        Self {
            controller,
            link: None,
            timeline,
        }
    }

    /// Synchronize through `link`.
    pub fn with_relay(mut self, link: RelayLink) -> Self {
        self.link = Some(link);
        self
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn relay_link(&self) -> Option<&RelayLink> {
        self.link.as_ref()
    }

    /// Handle events until every timeline handle is gone.
    pub async fn run(mut self, mut timeline: Timeline<Event>) {
        if self.link.is_some() && self.timeline.schedule_now(Event::PollRelay).is_err() {
            error!("timeline closed before start");
            return;
        }
        info!(relay = self.link.is_some(), "server loop started");

        while let Some(event) = timeline.next().await {
            self.handle(event).await;
        }

        info!("server loop stopped");
    }

    pub async fn handle(&mut self, event: Event) {
        match event {
            Event::PollRelay => self.poll_relay().await,
            Event::PushToRelay {
                user,
                conversation,
                message,
            } => self.push_to_relay(&user, &conversation, &message).await,
            Event::Request { request, reply } => {
                let response = self.dispatch(request);
                if reply.send(response).is_err() {
                    debug!("client left before the answer");
                }
            }
        }
    }

    async fn poll_relay(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };

        if let Err(e) = link
            .sync
            .poll(&*link.relay, &link.team, &link.secret, &mut self.controller)
            .await
        {
            warn!("relay poll failed, retrying in {:?}: {e}", link.interval);
        }

        if self
            .timeline
            .schedule_in(link.interval, Event::PollRelay)
            .is_err()
        {
            debug!("timeline closed, relay polling stops");
        }
    }

    async fn push_to_relay(&mut self, user: &Uuid, conversation: &Uuid, message: &Uuid) {
        let Some(link) = &self.link else {
            return;
        };

        let outbound = match Outbound::collect(self.controller.model(), user, conversation, message)
        {
            Ok(outbound) => outbound,
            Err(e) => {
                warn!(message = %message, "cannot build relay bundle: {e}");
                return;
            }
        };

        if let Err(e) = outbound.push(&*link.relay, &link.team, &link.secret).await {
            warn!(message = %message, "relay push failed: {e}");
        }
    }

    // -----------------------------------------------------------------------
    // Request handlers
    // -----------------------------------------------------------------------

    /// Answer one client request.
    pub fn dispatch(&mut self, request: Request) -> Response {
        match request {
            Request::NewUser { name, password } => self.on_new_user(&name, &password),
            Request::NewConversation { title, owner } => self.on_new_conversation(&title, &owner),
            Request::NewMessage {
                author,
                conversation,
                body,
            } => self.on_new_message(&author, &conversation, &body),
            Request::AddUserToConversation {
                issuer,
                user,
                conversation,
            } => self.on_add_user_to_conversation(&issuer, &user, &conversation),
            Request::GetUsersById { ids } => Response::Users(self.controller.view().users_by_id(&ids)),
            Request::GetUsersExcluding { ids } => {
                Response::Users(self.controller.view().users_excluding(&ids))
            }
            Request::GetUserGeneration => {
                Response::UserGeneration(self.controller.view().user_generation())
            }
            Request::CheckUsername { name } => {
                Response::UsernameTaken(self.controller.view().is_user_taken(&name))
            }
            Request::GetAllConversations => {
                Response::Summaries(self.controller.view().conversation_summaries())
            }
            Request::GetConversationsById { ids } => {
                Response::Conversations(self.controller.view().conversations_by_id(&ids))
            }
            Request::GetConversationsByTime { start, end } => {
                Response::Conversations(self.controller.view().conversations_by_time(&start, &end))
            }
            Request::GetConversationsByTitle { filter } => {
                Response::Conversations(self.controller.view().conversations_by_title(&filter))
            }
            Request::GetMessagesById { ids } => {
                Response::Messages(self.controller.view().messages_by_id(&ids))
            }
            Request::GetMessagesByTime {
                conversation,
                start,
                end,
            } => Response::Messages(
                self.controller
                    .view()
                    .messages_by_time(&conversation, &start, &end),
            ),
            Request::GetMessagesByRange { root, range } => {
                Response::Messages(self.controller.view().messages_by_range(&root, range))
            }
        }
    }

    fn on_new_user(&mut self, name: &str, password: &str) -> Response {
        match self.controller.new_user(name, password) {
            Ok(user) => {
                info!(user.id = %user.id, "user registered");
                Response::User(user)
            }
            Err(e) => not_created(e),
        }
    }

    fn on_new_conversation(&mut self, title: &str, owner: &Uuid) -> Response {
        match self.controller.new_conversation(title, owner) {
            Ok(conversation) => Response::Conversation(conversation),
            Err(e) => not_created(e),
        }
    }

    fn on_new_message(&mut self, author: &Uuid, conversation: &Uuid, body: &str) -> Response {
        let message = match self.controller.new_message(author, conversation, body) {
            Ok(message) => message,
            Err(e) => return not_created(e),
        };

        if self.link.is_some() {
            let push = Event::PushToRelay {
                user: author.clone(),
                conversation: conversation.clone(),
                message: message.id.clone(),
            };
            if self.timeline.schedule_now(push).is_err() {
                warn!(message = %message.id, "timeline closed, message not pushed");
            }
        }

        Response::Message(message)
    }

    fn on_add_user_to_conversation(
        &mut self,
        issuer: &Uuid,
        user: &Uuid,
        conversation: &Uuid,
    ) -> Response {
        match self
            .controller
            .add_user_to_conversation(issuer, user, conversation)
        {
            Ok(added) => Response::Added(added),
            Err(e) => not_created(e),
        }
    }
}

fn not_created(e: CoreError) -> Response {
    debug!("request refused: {e}");
    Response::NotCreated {
        reason: e.to_string(),
    }
}
