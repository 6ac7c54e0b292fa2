//! # Domain Models
//!
//! Entities of the school relationship graph and the messaging records
//! that hang off it. Persistence layout is an adapter concern; these are
//! the shapes every port speaks.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// The role a user holds inside a school.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Parent,
    Teacher,
    Admin,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Parent => "PARENT",
            Role::Teacher => "TEACHER",
            Role::Admin => "ADMIN",
            Role::Student => "STUDENT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PARENT" => Ok(Role::Parent),
            "TEACHER" => Ok(Role::Teacher),
            "ADMIN" => Ok(Role::Admin),
            "STUDENT" => Ok(Role::Student),
            other => Err(AppError::Internal(format!("unknown role {other:?}"))),
        }
    }
}

/// A person with a login. Presence lives on the user row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub role: Role,
    /// Absent for parents bound to a school only through their children.
    pub school_id: Option<Uuid>,
    pub is_active: bool,
    pub is_online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub is_available_to_chat: bool,
}

impl User {
    pub fn presence(&self) -> Presence {
        Presence {
            id: self.id,
            is_online: self.is_online,
            last_seen_at: self.last_seen_at,
            is_available_to_chat: self.is_available_to_chat,
            role: self.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: Uuid,
    pub name: String,
}

/// A class is owned by exactly one teacher and belongs to one school.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: Uuid,
    pub name: String,
    pub teacher_id: Uuid,
    pub school_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    pub class_id: Option<Uuid>,
}

/// Many-to-many link between a parent user and a student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentChildRelation {
    pub parent_id: Uuid,
    pub student_id: Uuid,
}

/// A parent's child together with the class it is enrolled in, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildPlacement {
    pub student: Student,
    pub class: Option<Class>,
}

/// A parent reached through one of their children.
#[derive(Debug, Clone, PartialEq)]
pub struct Guardianship {
    pub parent: User,
    pub student: Student,
}

/// A stored direct message. Only `is_read` ever changes, and only false -> true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub school_id: Option<Uuid>,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub context_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub const DEFAULT_TYPE: &'static str = "general";

    /// True when the message travels between `a` and `b` in either direction.
    pub fn is_between(&self, a: Uuid, b: Uuid) -> bool {
        (self.sender_id == a && self.receiver_id == b)
            || (self.sender_id == b && self.receiver_id == a)
    }
}

/// Everything needed to insert a message; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub school_id: Option<Uuid>,
    pub content: String,
    pub message_type: String,
    pub context_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for LastMessage {
    fn from(m: &Message) -> Self {
        Self {
            content: m.content.clone(),
            created_at: m.created_at,
        }
    }
}

/// A peer the requester may message. Derived per request, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    /// Display label such as `Teacher (3B)` or `School Admin`.
    pub role: String,
    pub avatar: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_name: Option<String>,
    pub unread_count: u64,
    pub last_message: Option<LastMessage>,
    pub is_online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub is_available_to_chat: bool,
}

/// Upper-cased first character of a display name, `?` for empty names.
pub fn avatar_initial(name: &str) -> String {
    name.trim()
        .chars()
        .next()
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_else(|| "?".to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub id: Uuid,
    pub is_online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub is_available_to_chat: bool,
    pub role: Role,
}

/// Identity resolved by the session layer before a request reaches a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub school_id: Option<Uuid>,
}
