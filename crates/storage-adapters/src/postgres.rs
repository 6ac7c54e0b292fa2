//! # Postgres store
//!
//! Maps the relational schema in `migrations/` onto the domain ports.
//! Enrichment lookups are grouped queries so contact resolution costs a
//! fixed number of round trips regardless of how many contacts it finds.

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    ChildPlacement, Class, DirectoryRepository, Guardianship, Message, MessageRepository,
    NewMessage, PresenceRepository, Role, Student, User,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

const USER_COLUMNS: &str =
    "u.id, u.name, u.role, u.school_id, u.is_active, u.is_online, u.last_seen_at, \
     u.is_available_to_chat";

const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, school_id, content, type, context_id, is_read, created_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .context("connecting to postgres")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("running migrations")?;
        tracing::info!("database migrations applied");
        Ok(())
    }
}

fn user_from_row(row: &PgRow) -> anyhow::Result<User> {
    let role: String = row.try_get("role")?;
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        role: role.parse::<Role>()?,
        school_id: row.try_get("school_id")?,
        is_active: row.try_get("is_active")?,
        is_online: row.try_get("is_online")?,
        last_seen_at: row.try_get("last_seen_at")?,
        is_available_to_chat: row.try_get("is_available_to_chat")?,
    })
}

fn class_from_row(row: &PgRow) -> anyhow::Result<Class> {
    Ok(Class {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        teacher_id: row.try_get("teacher_id")?,
        school_id: row.try_get("school_id")?,
    })
}

fn message_from_row(row: &PgRow) -> anyhow::Result<Message> {
    Ok(Message {
        id: row.try_get("id")?,
        sender_id: row.try_get("sender_id")?,
        receiver_id: row.try_get("receiver_id")?,
        school_id: row.try_get("school_id")?,
        content: row.try_get("content")?,
        message_type: row.try_get("type")?,
        context_id: row.try_get("context_id")?,
        is_read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
    })
}

fn role_names(roles: &[Role]) -> Vec<String> {
    roles.iter().map(|r| r.as_str().to_string()).collect()
}

#[async_trait]
impl DirectoryRepository for PgStore {
    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("loading user")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_users(&self, ids: &[Uuid]) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = ANY($1)"))
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .context("loading users")?;
        let mut by_id: HashMap<Uuid, User> = rows
            .iter()
            .map(|row| user_from_row(row).map(|u| (u.id, u)))
            .collect::<anyhow::Result<_>>()?;
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn children_of(&self, parent_id: Uuid) -> anyhow::Result<Vec<ChildPlacement>> {
        let rows = sqlx::query(
            "SELECT s.id, s.name, s.class_id, c.name AS class_name, c.teacher_id, c.school_id \
             FROM parent_children pc \
             JOIN students s ON s.id = pc.student_id \
             LEFT JOIN classes c ON c.id = s.class_id \
             WHERE pc.parent_id = $1 \
             ORDER BY s.name",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await
        .context("loading children")?;

        rows.iter()
            .map(|row| -> anyhow::Result<ChildPlacement> {
                let student = Student {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    class_id: row.try_get("class_id")?,
                };
                let class = match student.class_id {
                    Some(id) => Some(Class {
                        id,
                        name: row.try_get("class_name")?,
                        teacher_id: row.try_get("teacher_id")?,
                        school_id: row.try_get("school_id")?,
                    }),
                    None => None,
                };
                Ok(ChildPlacement { student, class })
            })
            .collect()
    }

    async fn classes_taught_by(&self, teacher_id: Uuid) -> anyhow::Result<Vec<Class>> {
        let rows = sqlx::query(
            "SELECT id, name, teacher_id, school_id FROM classes \
             WHERE teacher_id = $1 ORDER BY name",
        )
        .bind(teacher_id)
        .fetch_all(&self.pool)
        .await
        .context("loading classes by teacher")?;
        rows.iter().map(class_from_row).collect()
    }

    async fn classes_in_school(&self, school_id: Uuid) -> anyhow::Result<Vec<Class>> {
        let rows = sqlx::query(
            "SELECT id, name, teacher_id, school_id FROM classes \
             WHERE school_id = $1 ORDER BY name",
        )
        .bind(school_id)
        .fetch_all(&self.pool)
        .await
        .context("loading classes by school")?;
        rows.iter().map(class_from_row).collect()
    }

    async fn guardians_in_classes(&self, class_ids: &[Uuid]) -> anyhow::Result<Vec<Guardianship>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS}, s.id AS student_id, s.name AS student_name, s.class_id \
             FROM students s \
             JOIN parent_children pc ON pc.student_id = s.id \
             JOIN users u ON u.id = pc.parent_id \
             WHERE s.class_id = ANY($1) AND u.role = 'PARENT' \
             ORDER BY s.name, u.name"
        ))
        .bind(class_ids)
        .fetch_all(&self.pool)
        .await
        .context("loading guardians")?;

        rows.iter()
            .map(|row| -> anyhow::Result<Guardianship> {
                Ok(Guardianship {
                    parent: user_from_row(row)?,
                    student: Student {
                        id: row.try_get("student_id")?,
                        name: row.try_get("student_name")?,
                        class_id: row.try_get("class_id")?,
                    },
                })
            })
            .collect()
    }

    async fn school_members(
        &self,
        school_ids: &[Uuid],
        roles: &[Role],
    ) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users u \
             WHERE u.school_id = ANY($1) AND u.role = ANY($2) \
             ORDER BY u.name"
        ))
        .bind(school_ids)
        .bind(role_names(roles))
        .fetch_all(&self.pool)
        .await
        .context("loading school members")?;
        rows.iter().map(user_from_row).collect()
    }
}

#[async_trait]
impl MessageRepository for PgStore {
    async fn insert_message(&self, new: NewMessage) -> anyhow::Result<Message> {
        let row = sqlx::query(&format!(
            "INSERT INTO messages \
                 (id, sender_id, receiver_id, school_id, content, type, context_id, \
                  is_read, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, $8) \
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new.sender_id)
        .bind(new.receiver_id)
        .bind(new.school_id)
        .bind(new.content)
        .bind(new.message_type)
        .bind(new.context_id)
        .bind(new.created_at)
        .fetch_one(&self.pool)
        .await
        .context("inserting message")?;
        message_from_row(&row)
    }

    async fn list_between(&self, user_a: Uuid, user_b: Uuid) -> anyhow::Result<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE (sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1) \
             ORDER BY created_at ASC"
        ))
        .bind(user_a)
        .bind(user_b)
        .fetch_all(&self.pool)
        .await
        .context("loading conversation")?;
        rows.iter().map(message_from_row).collect()
    }

    async fn mark_read(&self, sender_id: Uuid, receiver_id: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "UPDATE messages SET is_read = TRUE \
             WHERE sender_id = $1 AND receiver_id = $2 AND is_read = FALSE",
        )
        .bind(sender_id)
        .bind(receiver_id)
        .execute(&self.pool)
        .await
        .context("marking conversation read")?;
        Ok(result.rows_affected())
    }

    async fn mark_message_read(
        &self,
        id: Uuid,
        receiver_id: Uuid,
    ) -> anyhow::Result<Option<Message>> {
        let row = sqlx::query(&format!(
            "UPDATE messages SET is_read = TRUE WHERE id = $1 AND receiver_id = $2 \
             RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(id)
        .bind(receiver_id)
        .fetch_optional(&self.pool)
        .await
        .context("marking message read")?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn count_unread(&self, sender_id: Uuid, receiver_id: Uuid) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages \
             WHERE sender_id = $1 AND receiver_id = $2 AND is_read = FALSE",
        )
        .bind(sender_id)
        .bind(receiver_id)
        .fetch_one(&self.pool)
        .await
        .context("counting unread")?;
        Ok(count as u64)
    }

    async fn count_unread_total(&self, receiver_id: Uuid) -> anyhow::Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE receiver_id = $1 AND is_read = FALSE",
        )
        .bind(receiver_id)
        .fetch_one(&self.pool)
        .await
        .context("counting unread total")?;
        Ok(count as u64)
    }

    async fn last_message(&self, user_a: Uuid, user_b: Uuid) -> anyhow::Result<Option<Message>> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE (sender_id = $1 AND receiver_id = $2) OR (sender_id = $2 AND receiver_id = $1) \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(user_a)
        .bind(user_b)
        .fetch_optional(&self.pool)
        .await
        .context("loading last message")?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn unread_counts(
        &self,
        receiver_id: Uuid,
        sender_ids: &[Uuid],
    ) -> anyhow::Result<HashMap<Uuid, u64>> {
        let rows = sqlx::query(
            "SELECT sender_id, COUNT(*) AS unread FROM messages \
             WHERE receiver_id = $1 AND is_read = FALSE AND sender_id = ANY($2) \
             GROUP BY sender_id",
        )
        .bind(receiver_id)
        .bind(sender_ids)
        .fetch_all(&self.pool)
        .await
        .context("grouping unread counts")?;

        rows.iter()
            .map(|row| -> anyhow::Result<(Uuid, u64)> {
                let sender: Uuid = row.try_get("sender_id")?;
                let unread: i64 = row.try_get("unread")?;
                Ok((sender, unread as u64))
            })
            .collect()
    }

    async fn last_messages(
        &self,
        user_id: Uuid,
        peer_ids: &[Uuid],
    ) -> anyhow::Result<HashMap<Uuid, Message>> {
        let rows = sqlx::query(&format!(
            "SELECT DISTINCT ON (peer_id) \
                 CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END AS peer_id, \
                 {MESSAGE_COLUMNS} \
             FROM messages \
             WHERE (sender_id = $1 AND receiver_id = ANY($2)) \
                OR (receiver_id = $1 AND sender_id = ANY($2)) \
             ORDER BY peer_id, created_at DESC"
        ))
        .bind(user_id)
        .bind(peer_ids)
        .fetch_all(&self.pool)
        .await
        .context("loading latest messages")?;

        rows.iter()
            .map(|row| -> anyhow::Result<(Uuid, Message)> {
                let peer: Uuid = row.try_get("peer_id")?;
                Ok((peer, message_from_row(row)?))
            })
            .collect()
    }
}

#[async_trait]
impl PresenceRepository for PgStore {
    async fn set_online(
        &self,
        user_id: Uuid,
        online: bool,
        seen_at: DateTime<Utc>,
    ) -> anyhow::Result<Option<User>> {
        let row = sqlx::query(&format!(
            "UPDATE users u SET is_online = $2, last_seen_at = $3 \
             WHERE u.id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(online)
        .bind(seen_at)
        .fetch_optional(&self.pool)
        .await
        .context("updating presence")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn set_availability(
        &self,
        user_id: Uuid,
        available: bool,
    ) -> anyhow::Result<Option<User>> {
        let row = sqlx::query(&format!(
            "UPDATE users u SET is_available_to_chat = $2 WHERE u.id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(available)
        .fetch_optional(&self.pool)
        .await
        .context("updating availability")?;
        row.as_ref().map(user_from_row).transpose()
    }
}
