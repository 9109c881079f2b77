use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{Conversation, ConversationSummary, Message, User};
use crate::types::Uuid;

/// All requests a client can send to a chat server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    NewUser {
        name: String,
        password: String,
    },
    NewConversation {
        title: String,
        owner: Uuid,
    },
    NewMessage {
        author: Uuid,
        conversation: Uuid,
        body: String,
    },
    AddUserToConversation {
        issuer: Uuid,
        user: Uuid,
        conversation: Uuid,
    },
    GetUsersById {
        ids: Vec<Uuid>,
    },
    GetUsersExcluding {
        ids: Vec<Uuid>,
    },
    GetUserGeneration,
    CheckUsername {
        name: String,
    },
    GetAllConversations,
    GetConversationsById {
        ids: Vec<Uuid>,
    },
    GetConversationsByTime {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    GetConversationsByTitle {
        filter: String,
    },
    GetMessagesById {
        ids: Vec<Uuid>,
    },
    GetMessagesByTime {
        conversation: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Messages around `root`: `range` successors when positive,
    /// `|range|` predecessors when negative.
    GetMessagesByRange {
        root: Uuid,
        range: i32,
    },
}

/// Server answers, one shape per request family
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum Response {
    User(User),
    Conversation(Conversation),
    Message(Message),
    /// A creation request was refused; nothing was admitted.
    NotCreated {
        reason: String,
    },
    Added(bool),
    Users(Vec<User>),
    UserGeneration(Uuid),
    UsernameTaken(bool),
    Summaries(Vec<ConversationSummary>),
    Conversations(Vec<Conversation>),
    Messages(Vec<Message>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_is_tagged() {
        let request = Request::GetMessagesByRange {
            root: Uuid::new(Some(Uuid::top(1)), 9),
            range: -3,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "get_messages_by_range");
        assert_eq!(json["root"], "1.9");

        let back: Request = serde_json::from_value(json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_user_response_hides_password() {
        let response = Response::User(User {
            id: Uuid::top(4),
            name: "ada".to_string(),
            creation: Utc::now(),
            password: "hunter2".to_string(),
        });
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("hunter2"));
    }
}
