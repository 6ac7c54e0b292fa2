//! # Ports
//!
//! Any storage or session backend must implement these traits to be wired
//! into the services. Lookups that find nothing return `Ok(None)` or an
//! empty collection; `Err` is reserved for infrastructure failures.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AuthContext, ChildPlacement, Class, Guardianship, Message, NewMessage, Role, User,
};

/// Read access to the school relationship graph.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>>;

    /// Users for the given ids; unknown ids are skipped.
    async fn find_users(&self, ids: &[Uuid]) -> anyhow::Result<Vec<User>>;

    /// Children linked to a parent, each with its class when enrolled.
    async fn children_of(&self, parent_id: Uuid) -> anyhow::Result<Vec<ChildPlacement>>;

    async fn classes_taught_by(&self, teacher_id: Uuid) -> anyhow::Result<Vec<Class>>;

    async fn classes_in_school(&self, school_id: Uuid) -> anyhow::Result<Vec<Class>>;

    /// Every (parent, student) pair where the student sits in one of `class_ids`.
    /// Only `PARENT`-role users count as guardians, whatever else is linked.
    async fn guardians_in_classes(&self, class_ids: &[Uuid]) -> anyhow::Result<Vec<Guardianship>>;

    /// Users of the given schools holding one of `roles`, ordered by name.
    async fn school_members(
        &self,
        school_ids: &[Uuid],
        roles: &[Role],
    ) -> anyhow::Result<Vec<User>>;
}

/// Conversation persistence.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert_message(&self, message: NewMessage) -> anyhow::Result<Message>;

    /// Full bidirectional history between two users, oldest first.
    async fn list_between(&self, user_a: Uuid, user_b: Uuid) -> anyhow::Result<Vec<Message>>;

    /// Flips every unread sender -> receiver message to read. Returns how many changed.
    async fn mark_read(&self, sender_id: Uuid, receiver_id: Uuid) -> anyhow::Result<u64>;

    /// Flips one message to read if `receiver_id` is its receiver.
    async fn mark_message_read(
        &self,
        id: Uuid,
        receiver_id: Uuid,
    ) -> anyhow::Result<Option<Message>>;

    async fn count_unread(&self, sender_id: Uuid, receiver_id: Uuid) -> anyhow::Result<u64>;

    /// Unread messages addressed to `receiver_id` from anyone.
    async fn count_unread_total(&self, receiver_id: Uuid) -> anyhow::Result<u64>;

    async fn last_message(&self, user_a: Uuid, user_b: Uuid) -> anyhow::Result<Option<Message>>;

    /// Grouped form of `count_unread`: one entry per sender with unread messages.
    async fn unread_counts(
        &self,
        receiver_id: Uuid,
        sender_ids: &[Uuid],
    ) -> anyhow::Result<HashMap<Uuid, u64>>;

    /// Grouped form of `last_message`, keyed by peer id.
    async fn last_messages(
        &self,
        user_id: Uuid,
        peer_ids: &[Uuid],
    ) -> anyhow::Result<HashMap<Uuid, Message>>;
}

/// Presence writes. Reads go through `DirectoryRepository::find_user`.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PresenceRepository: Send + Sync {
    /// Sets `is_online` and stamps `last_seen_at`. `None` if the user is unknown.
    async fn set_online(
        &self,
        user_id: Uuid,
        online: bool,
        seen_at: DateTime<Utc>,
    ) -> anyhow::Result<Option<User>>;

    async fn set_availability(
        &self,
        user_id: Uuid,
        available: bool,
    ) -> anyhow::Result<Option<User>>;
}

/// Session verification contract.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait TokenVerifier: Send + Sync {
    /// Resolves a bearer token to the identity it was issued for.
    fn verify(&self, token: &str) -> crate::Result<AuthContext>;
}
