//! # Conversations
//!
//! Message retrieval, sending and read-marking between two known users.
//!
//! Fetching a conversation consumes its unread state: after the history is
//! read, every message the peer sent to the requester is marked read.

use std::sync::Arc;

use chrono::Utc;
use domains::{
    AppError, AuthContext, DirectoryRepository, Message, MessageRepository, NewMessage,
};
use serde::Deserialize;
use uuid::Uuid;

/// Body of a send request. Fields are optional so validation can name what is missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub receiver_id: Option<Uuid>,
    pub content: Option<String>,
    #[serde(rename = "type")]
    pub message_type: Option<String>,
    pub context_id: Option<String>,
}

pub struct ConversationService {
    directory: Arc<dyn DirectoryRepository>,
    messages: Arc<dyn MessageRepository>,
}

impl ConversationService {
    pub fn new(
        directory: Arc<dyn DirectoryRepository>,
        messages: Arc<dyn MessageRepository>,
    ) -> Self {
        Self {
            directory,
            messages,
        }
    }

    /// Returns the history with `contact_id`, oldest first, as it stood before
    /// the contact's messages were marked read.
    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn get_messages(
        &self,
        ctx: &AuthContext,
        contact_id: Uuid,
    ) -> domains::Result<Vec<Message>> {
        if self.directory.find_user(contact_id).await?.is_none() {
            return Err(AppError::not_found("User", contact_id));
        }

        let history = self.messages.list_between(ctx.user_id, contact_id).await?;
        let marked = self.messages.mark_read(contact_id, ctx.user_id).await?;
        if marked > 0 {
            tracing::debug!(marked, "marked conversation read");
        }
        Ok(history)
    }

    #[tracing::instrument(skip(self, ctx, req), fields(user_id = %ctx.user_id))]
    pub async fn send_message(
        &self,
        ctx: &AuthContext,
        req: SendMessage,
    ) -> domains::Result<Message> {
        let (receiver_id, content) = match (req.receiver_id, req.content) {
            (Some(receiver_id), Some(content)) if !content.is_empty() => (receiver_id, content),
            _ => {
                return Err(AppError::ValidationError(
                    "receiverId and content are required".into(),
                ))
            }
        };

        let sender = self
            .directory
            .find_user(ctx.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User", ctx.user_id))?;
        let receiver = self
            .directory
            .find_user(receiver_id)
            .await?
            .ok_or_else(|| AppError::not_found("User", receiver_id))?;

        let school_id = match ctx.school_id.or(sender.school_id).or(receiver.school_id) {
            Some(id) => Some(id),
            None => self.first_child_school(sender.id).await?,
        };

        let message = self
            .messages
            .insert_message(NewMessage {
                sender_id: sender.id,
                receiver_id,
                school_id,
                content,
                message_type: req
                    .message_type
                    .unwrap_or_else(|| Message::DEFAULT_TYPE.to_string()),
                context_id: req.context_id,
                created_at: Utc::now(),
            })
            .await?;

        tracing::info!(message_id = %message.id, receiver_id = %receiver_id, "message sent");
        Ok(message)
    }

    /// Marks one message read on behalf of its receiver.
    pub async fn mark_message_read(
        &self,
        ctx: &AuthContext,
        message_id: Uuid,
    ) -> domains::Result<Message> {
        self.messages
            .mark_message_read(message_id, ctx.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Message", message_id))
    }

    pub async fn unread_total(&self, ctx: &AuthContext) -> domains::Result<u64> {
        Ok(self.messages.count_unread_total(ctx.user_id).await?)
    }

    async fn first_child_school(&self, user_id: Uuid) -> domains::Result<Option<Uuid>> {
        let children = self.directory.children_of(user_id).await?;
        Ok(children
            .into_iter()
            .find_map(|child| child.class.map(|class| class.school_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{
        ChildPlacement, Class, MockDirectoryRepository, MockMessageRepository, Role, Student, User,
    };

    fn user(role: Role, school_id: Option<Uuid>) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Someone".into(),
            role,
            school_id,
            is_active: true,
            is_online: false,
            last_seen_at: None,
            is_available_to_chat: true,
        }
    }

    fn directory_with(users: Vec<User>) -> MockDirectoryRepository {
        let mut dir = MockDirectoryRepository::new();
        dir.expect_find_user()
            .returning(move |id| Ok(users.iter().find(|u| u.id == id).cloned()));
        dir
    }

    fn echoing_messages() -> MockMessageRepository {
        let mut msgs = MockMessageRepository::new();
        msgs.expect_insert_message().returning(|m| {
            Ok(Message {
                id: Uuid::new_v4(),
                sender_id: m.sender_id,
                receiver_id: m.receiver_id,
                school_id: m.school_id,
                content: m.content,
                message_type: m.message_type,
                context_id: m.context_id,
                is_read: false,
                created_at: m.created_at,
            })
        });
        msgs
    }

    fn ctx(user: &User) -> AuthContext {
        AuthContext {
            user_id: user.id,
            school_id: None,
        }
    }

    fn stranger() -> AuthContext {
        AuthContext {
            user_id: Uuid::new_v4(),
            school_id: None,
        }
    }

    #[tokio::test]
    async fn missing_content_is_rejected_before_any_write() {
        let mut msgs = MockMessageRepository::new();
        msgs.expect_insert_message().never();
        let svc =
            ConversationService::new(Arc::new(MockDirectoryRepository::new()), Arc::new(msgs));

        let req = SendMessage {
            receiver_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        let err = svc.send_message(&stranger(), req).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));

        let req = SendMessage {
            content: Some("hello".into()),
            ..Default::default()
        };
        let err = svc.send_message(&stranger(), req).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn empty_content_counts_as_missing() {
        let svc = ConversationService::new(
            Arc::new(MockDirectoryRepository::new()),
            Arc::new(MockMessageRepository::new()),
        );
        let req = SendMessage {
            receiver_id: Some(Uuid::new_v4()),
            content: Some(String::new()),
            ..Default::default()
        };
        let err = svc.send_message(&stranger(), req).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn schoolless_sender_takes_receiver_school_and_default_type() {
        let school = Uuid::new_v4();
        let parent = user(Role::Parent, None);
        let teacher = user(Role::Teacher, Some(school));
        let svc = ConversationService::new(
            Arc::new(directory_with(vec![parent.clone(), teacher.clone()])),
            Arc::new(echoing_messages()),
        );

        let req = SendMessage {
            receiver_id: Some(teacher.id),
            content: Some("Is homework due Friday?".into()),
            ..Default::default()
        };
        let msg = svc.send_message(&ctx(&parent), req).await.unwrap();
        assert_eq!(msg.school_id, Some(school));
        assert_eq!(msg.message_type, "general");
        assert!(!msg.is_read);
    }

    #[tokio::test]
    async fn falls_back_to_school_of_senders_child() {
        let school = Uuid::new_v4();
        let parent = user(Role::Parent, None);
        let other_parent = user(Role::Parent, None);
        let mut dir = directory_with(vec![parent.clone(), other_parent.clone()]);
        dir.expect_children_of().returning(move |_| {
            Ok(vec![
                ChildPlacement {
                    student: Student {
                        id: Uuid::new_v4(),
                        name: "Unplaced".into(),
                        class_id: None,
                    },
                    class: None,
                },
                ChildPlacement {
                    student: Student {
                        id: Uuid::new_v4(),
                        name: "Placed".into(),
                        class_id: None,
                    },
                    class: Some(Class {
                        id: Uuid::new_v4(),
                        name: "2C".into(),
                        teacher_id: Uuid::new_v4(),
                        school_id: school,
                    }),
                },
            ])
        });
        let svc = ConversationService::new(Arc::new(dir), Arc::new(echoing_messages()));

        let req = SendMessage {
            receiver_id: Some(other_parent.id),
            content: Some("Carpool?".into()),
            message_type: Some("event".into()),
            context_id: Some("field-trip".into()),
        };
        let msg = svc.send_message(&ctx(&parent), req).await.unwrap();
        assert_eq!(msg.school_id, Some(school));
        assert_eq!(msg.message_type, "event");
        assert_eq!(msg.context_id.as_deref(), Some("field-trip"));
    }

    #[tokio::test]
    async fn unknown_receiver_is_not_found() {
        let sender = user(Role::Teacher, Some(Uuid::new_v4()));
        let mut msgs = MockMessageRepository::new();
        msgs.expect_insert_message().never();
        let svc = ConversationService::new(
            Arc::new(directory_with(vec![sender.clone()])),
            Arc::new(msgs),
        );

        let req = SendMessage {
            receiver_id: Some(Uuid::new_v4()),
            content: Some("hi".into()),
            ..Default::default()
        };
        let err = svc.send_message(&ctx(&sender), req).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_, _)));
    }

    #[tokio::test]
    async fn get_messages_marks_peer_direction_read() {
        let me = user(Role::Teacher, None);
        let peer = user(Role::Parent, None);
        let (me_id, peer_id) = (me.id, peer.id);

        let mut msgs = MockMessageRepository::new();
        msgs.expect_list_between().returning(|_, _| Ok(vec![]));
        msgs.expect_mark_read()
            .withf(move |sender, receiver| *sender == peer_id && *receiver == me_id)
            .times(1)
            .returning(|_, _| Ok(2));
        let svc = ConversationService::new(
            Arc::new(directory_with(vec![me.clone(), peer])),
            Arc::new(msgs),
        );

        svc.get_messages(&ctx(&me), peer_id).await.unwrap();
    }

    #[tokio::test]
    async fn mark_read_failure_surfaces_as_internal() {
        let me = user(Role::Teacher, None);
        let peer = user(Role::Parent, None);
        let peer_id = peer.id;

        let mut msgs = MockMessageRepository::new();
        msgs.expect_list_between().returning(|_, _| Ok(vec![]));
        msgs.expect_mark_read()
            .returning(|_, _| Err(anyhow::anyhow!("deadlock detected")));
        let svc = ConversationService::new(
            Arc::new(directory_with(vec![me.clone(), peer])),
            Arc::new(msgs),
        );

        let err = svc.get_messages(&ctx(&me), peer_id).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}
