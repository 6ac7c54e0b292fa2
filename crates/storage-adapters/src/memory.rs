//! # In-memory store
//!
//! Implements every repository port over `DashMap`s. Used by the test
//! suites and by the `memory` storage backend for local runs.
//!
//! Iteration order of a `DashMap` is arbitrary, so every list is sorted
//! before it is returned, matching the `ORDER BY` of the Postgres adapter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use domains::{
    ChildPlacement, Class, DirectoryRepository, Guardianship, Message, MessageRepository,
    NewMessage, ParentChildRelation, PresenceRepository, Role, School, Student, User,
};
use uuid::Uuid;

/// A stored message plus its insertion sequence, used to break timestamp ties.
#[derive(Debug, Clone)]
struct Stored {
    seq: u64,
    message: Message,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    schools: DashMap<Uuid, School>,
    users: DashMap<Uuid, User>,
    classes: DashMap<Uuid, Class>,
    students: DashMap<Uuid, Student>,
    links: DashSet<ParentChildRelation>,
    messages: DashMap<Uuid, Stored>,
    next_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_school(&self, school: School) {
        self.schools.insert(school.id, school);
    }

    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn insert_class(&self, class: Class) {
        self.classes.insert(class.id, class);
    }

    pub fn insert_student(&self, student: Student) {
        self.students.insert(student.id, student);
    }

    pub fn link_parent(&self, parent_id: Uuid, student_id: Uuid) {
        self.links.insert(ParentChildRelation {
            parent_id,
            student_id,
        });
    }

    /// Stores a fully-formed message as-is, including its read flag.
    pub fn seed_message(&self, message: Message) {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.messages.insert(message.id, Stored { seq, message });
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    fn sorted_messages<F>(&self, keep: F) -> Vec<Stored>
    where
        F: Fn(&Message) -> bool,
    {
        let mut found: Vec<Stored> = self
            .messages
            .iter()
            .filter(|e| keep(&e.value().message))
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| {
            a.message
                .created_at
                .cmp(&b.message.created_at)
                .then(a.seq.cmp(&b.seq))
        });
        found
    }

    fn classes_where<F>(&self, keep: F) -> Vec<Class>
    where
        F: Fn(&Class) -> bool,
    {
        let mut found: Vec<Class> = self
            .classes
            .iter()
            .filter(|e| keep(e.value()))
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    fn update_user<F>(&self, id: Uuid, apply: F) -> Option<User>
    where
        F: FnOnce(&mut User),
    {
        let mut entry = self.users.get_mut(&id)?;
        apply(entry.value_mut());
        Some(entry.value().clone())
    }
}

#[async_trait]
impl DirectoryRepository for MemoryStore {
    async fn find_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    async fn find_users(&self, ids: &[Uuid]) -> anyhow::Result<Vec<User>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.users.get(id).map(|u| u.value().clone()))
            .collect())
    }

    async fn children_of(&self, parent_id: Uuid) -> anyhow::Result<Vec<ChildPlacement>> {
        let mut children: Vec<ChildPlacement> = self
            .links
            .iter()
            .filter(|link| link.parent_id == parent_id)
            .filter_map(|link| self.students.get(&link.student_id).map(|s| s.value().clone()))
            .map(|student| {
                let class = student
                    .class_id
                    .and_then(|id| self.classes.get(&id).map(|c| c.value().clone()));
                ChildPlacement { student, class }
            })
            .collect();
        children.sort_by(|a, b| a.student.name.cmp(&b.student.name));
        Ok(children)
    }

    async fn classes_taught_by(&self, teacher_id: Uuid) -> anyhow::Result<Vec<Class>> {
        Ok(self.classes_where(|c| c.teacher_id == teacher_id))
    }

    async fn classes_in_school(&self, school_id: Uuid) -> anyhow::Result<Vec<Class>> {
        Ok(self.classes_where(|c| c.school_id == school_id))
    }

    async fn guardians_in_classes(&self, class_ids: &[Uuid]) -> anyhow::Result<Vec<Guardianship>> {
        let mut found: Vec<Guardianship> = self
            .links
            .iter()
            .filter_map(|link| {
                let student = self.students.get(&link.student_id)?.value().clone();
                if !student.class_id.is_some_and(|id| class_ids.contains(&id)) {
                    return None;
                }
                let parent = self.users.get(&link.parent_id)?.value().clone();
                if parent.role != Role::Parent {
                    return None;
                }
                Some(Guardianship { parent, student })
            })
            .collect();
        found.sort_by(|a, b| {
            a.student
                .name
                .cmp(&b.student.name)
                .then_with(|| a.parent.name.cmp(&b.parent.name))
        });
        Ok(found)
    }

    async fn school_members(
        &self,
        school_ids: &[Uuid],
        roles: &[Role],
    ) -> anyhow::Result<Vec<User>> {
        let mut found: Vec<User> = self
            .users
            .iter()
            .filter(|e| {
                let u = e.value();
                u.school_id.is_some_and(|id| school_ids.contains(&id)) && roles.contains(&u.role)
            })
            .map(|e| e.value().clone())
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn insert_message(&self, new: NewMessage) -> anyhow::Result<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            school_id: new.school_id,
            content: new.content,
            message_type: new.message_type,
            context_id: new.context_id,
            is_read: false,
            created_at: new.created_at,
        };
        self.seed_message(message.clone());
        Ok(message)
    }

    async fn list_between(&self, user_a: Uuid, user_b: Uuid) -> anyhow::Result<Vec<Message>> {
        Ok(self
            .sorted_messages(|m| m.is_between(user_a, user_b))
            .into_iter()
            .map(|s| s.message)
            .collect())
    }

    async fn mark_read(&self, sender_id: Uuid, receiver_id: Uuid) -> anyhow::Result<u64> {
        let mut changed = 0;
        for mut entry in self.messages.iter_mut() {
            let m = &mut entry.value_mut().message;
            if m.sender_id == sender_id && m.receiver_id == receiver_id && !m.is_read {
                m.is_read = true;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn mark_message_read(
        &self,
        id: Uuid,
        receiver_id: Uuid,
    ) -> anyhow::Result<Option<Message>> {
        let Some(mut entry) = self.messages.get_mut(&id) else {
            return Ok(None);
        };
        let m = &mut entry.value_mut().message;
        if m.receiver_id != receiver_id {
            return Ok(None);
        }
        m.is_read = true;
        Ok(Some(m.clone()))
    }

    async fn count_unread(&self, sender_id: Uuid, receiver_id: Uuid) -> anyhow::Result<u64> {
        Ok(self
            .messages
            .iter()
            .filter(|e| {
                let m = &e.value().message;
                m.sender_id == sender_id && m.receiver_id == receiver_id && !m.is_read
            })
            .count() as u64)
    }

    async fn count_unread_total(&self, receiver_id: Uuid) -> anyhow::Result<u64> {
        Ok(self
            .messages
            .iter()
            .filter(|e| {
                let m = &e.value().message;
                m.receiver_id == receiver_id && !m.is_read
            })
            .count() as u64)
    }

    async fn last_message(&self, user_a: Uuid, user_b: Uuid) -> anyhow::Result<Option<Message>> {
        Ok(self
            .sorted_messages(|m| m.is_between(user_a, user_b))
            .pop()
            .map(|s| s.message))
    }

    async fn unread_counts(
        &self,
        receiver_id: Uuid,
        sender_ids: &[Uuid],
    ) -> anyhow::Result<HashMap<Uuid, u64>> {
        let mut counts = HashMap::new();
        for e in self.messages.iter() {
            let m = &e.value().message;
            if m.receiver_id == receiver_id && !m.is_read && sender_ids.contains(&m.sender_id) {
                *counts.entry(m.sender_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn last_messages(
        &self,
        user_id: Uuid,
        peer_ids: &[Uuid],
    ) -> anyhow::Result<HashMap<Uuid, Message>> {
        let involved = self.sorted_messages(|m| {
            (m.sender_id == user_id && peer_ids.contains(&m.receiver_id))
                || (m.receiver_id == user_id && peer_ids.contains(&m.sender_id))
        });
        // Ascending order, so later inserts overwrite earlier ones.
        let mut latest = HashMap::new();
        for stored in involved {
            let m = stored.message;
            let peer = if m.sender_id == user_id { m.receiver_id } else { m.sender_id };
            latest.insert(peer, m);
        }
        Ok(latest)
    }
}

#[async_trait]
impl PresenceRepository for MemoryStore {
    async fn set_online(
        &self,
        user_id: Uuid,
        online: bool,
        seen_at: DateTime<Utc>,
    ) -> anyhow::Result<Option<User>> {
        Ok(self.update_user(user_id, |u| {
            u.is_online = online;
            u.last_seen_at = Some(seen_at);
        }))
    }

    async fn set_availability(
        &self,
        user_id: Uuid,
        available: bool,
    ) -> anyhow::Result<Option<User>> {
        Ok(self.update_user(user_id, |u| u.is_available_to_chat = available))
    }
}
