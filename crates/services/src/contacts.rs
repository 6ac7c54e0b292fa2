//! # Contact resolution
//!
//! Derives who a user may message from the school relationship graph:
//!
//! - parents reach the teachers of their children's classes;
//! - anyone with a school scope reaches that scope's admins;
//! - teachers reach the parents of their pupils and their school's staff;
//! - admins reach every parent with a child in the school and all staff.
//!
//! Derivations accumulate into one set keyed by user id. A later derivation
//! of the same user replaces the earlier label but keeps its position.

use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use domains::{
    avatar_initial, AppError, AuthContext, Contact, DirectoryRepository, LastMessage,
    MessageRepository, Role, User,
};
use uuid::Uuid;

const ADMIN_LABEL: &str = "School Admin";
const TEACHER_LABEL: &str = "Teacher";

pub struct ContactResolver {
    directory: Arc<dyn DirectoryRepository>,
    messages: Arc<dyn MessageRepository>,
}

impl ContactResolver {
    pub fn new(
        directory: Arc<dyn DirectoryRepository>,
        messages: Arc<dyn MessageRepository>,
    ) -> Self {
        Self {
            directory,
            messages,
        }
    }

    /// Computes the requester's contacts, most recent conversation first.
    ///
    /// Read-only. Any store failure fails the whole call.
    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn resolve(&self, ctx: &AuthContext) -> domains::Result<Vec<Contact>> {
        let requester = self
            .directory
            .find_user(ctx.user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User", ctx.user_id))?;
        let school_id = ctx.school_id.or(requester.school_id);

        let mut set = ContactSet::new(requester.id);
        let mut reached_schools = Vec::new();

        if requester.role == Role::Parent {
            reached_schools = self
                .add_children_teachers(&requester, &mut set)
                .await?;
        }

        let scope = match school_id {
            Some(id) => vec![id],
            None => reached_schools,
        };
        if !scope.is_empty() {
            let admins = self
                .directory
                .school_members(&scope, &[Role::Admin])
                .await?;
            for admin in &admins {
                set.add(admin, ADMIN_LABEL.to_string(), None);
            }
        }

        match (requester.role, school_id) {
            (Role::Teacher, Some(school_id)) => {
                self.add_teacher_contacts(&requester, school_id, &mut set).await?
            }
            (Role::Admin, Some(school_id)) => self.add_admin_contacts(school_id, &mut set).await?,
            _ => {}
        }

        let contacts = self.enrich(requester.id, set).await?;
        tracing::debug!(count = contacts.len(), "resolved contacts");
        Ok(contacts)
    }

    /// Adds each child's class teacher. Returns the distinct schools reached.
    async fn add_children_teachers(
        &self,
        parent: &User,
        set: &mut ContactSet,
    ) -> domains::Result<Vec<Uuid>> {
        let children = self.directory.children_of(parent.id).await?;

        let mut teacher_ids = Vec::new();
        let mut schools = Vec::new();
        for class in children.iter().filter_map(|c| c.class.as_ref()) {
            push_unique(&mut teacher_ids, class.teacher_id);
            push_unique(&mut schools, class.school_id);
        }
        if teacher_ids.is_empty() {
            return Ok(schools);
        }

        let teachers: HashMap<Uuid, User> = self
            .directory
            .find_users(&teacher_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        for child in &children {
            let Some(class) = &child.class else { continue };
            if let Some(teacher) = teachers.get(&class.teacher_id) {
                set.add(
                    teacher,
                    format!("Teacher ({})", class.name),
                    Some(child.student.name.clone()),
                );
            }
        }
        Ok(schools)
    }

    async fn add_teacher_contacts(
        &self,
        teacher: &User,
        school_id: Uuid,
        set: &mut ContactSet,
    ) -> domains::Result<()> {
        let class_ids: Vec<Uuid> = self
            .directory
            .classes_taught_by(teacher.id)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();

        if !class_ids.is_empty() {
            for g in self.directory.guardians_in_classes(&class_ids).await? {
                set.add(
                    &g.parent,
                    format!("Parent ({})", g.student.name),
                    Some(g.student.name),
                );
            }
        }

        let staff = self
            .directory
            .school_members(&[school_id], &[Role::Teacher, Role::Admin])
            .await?;
        for member in &staff {
            set.add(member, staff_label(member.role).to_string(), None);
        }
        Ok(())
    }

    async fn add_admin_contacts(
        &self,
        school_id: Uuid,
        set: &mut ContactSet,
    ) -> domains::Result<()> {
        let class_ids: Vec<Uuid> = self
            .directory
            .classes_in_school(school_id)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();

        if !class_ids.is_empty() {
            // One entry per parent, listing every child they have in this school.
            let mut parents: Vec<(User, Vec<String>)> = Vec::new();
            for g in self.directory.guardians_in_classes(&class_ids).await? {
                match parents.iter_mut().find(|(p, _)| p.id == g.parent.id) {
                    Some((_, names)) => names.push(g.student.name),
                    None => parents.push((g.parent, vec![g.student.name])),
                }
            }
            for (parent, names) in parents {
                let names = names.join(", ");
                set.add(&parent, format!("Parent ({names})"), Some(names));
            }
        }

        let teachers = self
            .directory
            .school_members(&[school_id], &[Role::Teacher])
            .await?;
        for teacher in &teachers {
            set.add(teacher, TEACHER_LABEL.to_string(), None);
        }
        let admins = self
            .directory
            .school_members(&[school_id], &[Role::Admin])
            .await?;
        for admin in &admins {
            set.add(admin, ADMIN_LABEL.to_string(), None);
        }
        Ok(())
    }

    /// Attaches unread counts, last messages and presence, then orders by recency.
    async fn enrich(&self, requester_id: Uuid, set: ContactSet) -> domains::Result<Vec<Contact>> {
        let ids = set.order.clone();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let unread = self.messages.unread_counts(requester_id, &ids).await?;
        let last = self.messages.last_messages(requester_id, &ids).await?;

        let mut contacts: Vec<Contact> = set
            .into_candidates()
            .map(|c| Contact {
                id: c.user.id,
                avatar: avatar_initial(&c.user.name),
                name: c.user.name,
                role: c.label,
                child_name: c.child_name,
                unread_count: unread.get(&c.user.id).copied().unwrap_or(0),
                last_message: last.get(&c.user.id).map(LastMessage::from),
                is_online: c.user.is_online,
                last_seen_at: c.user.last_seen_at,
                is_available_to_chat: c.user.is_available_to_chat,
            })
            .collect();

        contacts.sort_by(by_recency);
        Ok(contacts)
    }
}

fn staff_label(role: Role) -> &'static str {
    match role {
        Role::Admin => ADMIN_LABEL,
        _ => TEACHER_LABEL,
    }
}

fn push_unique(ids: &mut Vec<Uuid>, id: Uuid) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

/// Newest conversation first; contacts without messages last, in insertion order.
fn by_recency(a: &Contact, b: &Contact) -> Ordering {
    match (&a.last_message, &b.last_message) {
        (Some(a), Some(b)) => b.created_at.cmp(&a.created_at),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

struct Candidate {
    user: User,
    label: String,
    child_name: Option<String>,
}

/// Insertion-ordered set of candidates keyed by user id.
struct ContactSet {
    requester_id: Uuid,
    order: Vec<Uuid>,
    entries: HashMap<Uuid, Candidate>,
}

impl ContactSet {
    fn new(requester_id: Uuid) -> Self {
        Self {
            requester_id,
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }

    /// Skips the requester and inactive users.
    fn add(&mut self, user: &User, label: String, child_name: Option<String>) {
        if user.id == self.requester_id || !user.is_active {
            return;
        }
        let candidate = Candidate {
            user: user.clone(),
            label,
            child_name,
        };
        match self.entries.entry(user.id) {
            Entry::Occupied(mut e) => {
                e.insert(candidate);
            }
            Entry::Vacant(e) => {
                self.order.push(user.id);
                e.insert(candidate);
            }
        }
    }

    fn into_candidates(mut self) -> impl Iterator<Item = Candidate> {
        let order = std::mem::take(&mut self.order);
        order.into_iter().filter_map(move |id| self.entries.remove(&id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use domains::{
        Class, Guardianship, Message, MockDirectoryRepository, MockMessageRepository, Student,
    };

    fn user(name: &str, role: Role, school_id: Option<Uuid>) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            role,
            school_id,
            is_active: true,
            is_online: false,
            last_seen_at: None,
            is_available_to_chat: true,
        }
    }

    fn message_at(from: Uuid, to: Uuid, secs: i64) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: from,
            receiver_id: to,
            school_id: None,
            content: format!("at {secs}"),
            message_type: Message::DEFAULT_TYPE.into(),
            context_id: None,
            is_read: false,
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    fn ctx_for(user: &User) -> AuthContext {
        AuthContext {
            user_id: user.id,
            school_id: user.school_id,
        }
    }

    fn resolver(dir: MockDirectoryRepository, msgs: MockMessageRepository) -> ContactResolver {
        ContactResolver::new(Arc::new(dir), Arc::new(msgs))
    }

    fn quiet_messages() -> MockMessageRepository {
        let mut msgs = MockMessageRepository::new();
        msgs.expect_unread_counts().returning(|_, _| Ok(HashMap::new()));
        msgs.expect_last_messages().returning(|_, _| Ok(HashMap::new()));
        msgs
    }

    /// Admin of `school` whose school has the given teachers and no classes.
    fn admin_directory(admin: &User, teachers: Vec<User>) -> MockDirectoryRepository {
        let mut dir = MockDirectoryRepository::new();
        let a = admin.clone();
        dir.expect_find_user().returning(move |_| Ok(Some(a.clone())));
        dir.expect_classes_in_school().returning(|_| Ok(vec![]));
        let admins = vec![admin.clone()];
        dir.expect_school_members().returning(move |_, roles| {
            if roles == [Role::Teacher] {
                Ok(teachers.clone())
            } else {
                Ok(admins.clone())
            }
        });
        dir
    }

    #[tokio::test]
    async fn missing_requester_is_not_found() {
        let mut dir = MockDirectoryRepository::new();
        dir.expect_find_user().returning(|_| Ok(None));
        let ctx = AuthContext {
            user_id: Uuid::new_v4(),
            school_id: None,
        };

        let err = resolver(dir, MockMessageRepository::new())
            .resolve(&ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(entity, _) if entity == "User"));
    }

    #[tokio::test]
    async fn sorts_by_last_message_then_insertion_order() {
        let school = Uuid::new_v4();
        let admin = user("Ada", Role::Admin, Some(school));
        let c1 = user("Cleo", Role::Teacher, Some(school));
        let c2 = user("Dan", Role::Teacher, Some(school));
        let c3 = user("Eve", Role::Teacher, Some(school));
        let dir = admin_directory(&admin, vec![c1.clone(), c2.clone(), c3.clone()]);

        let mut msgs = MockMessageRepository::new();
        msgs.expect_unread_counts().returning(|_, _| Ok(HashMap::new()));
        let (admin_id, c1_id, c2_id) = (admin.id, c1.id, c2.id);
        msgs.expect_last_messages().returning(move |_, _| {
            Ok(HashMap::from([
                (c1_id, message_at(c1_id, admin_id, 100)),
                (c2_id, message_at(admin_id, c2_id, 200)),
            ]))
        });

        let contacts = resolver(dir, msgs).resolve(&ctx_for(&admin)).await.unwrap();

        let order: Vec<Uuid> = contacts.iter().map(|c| c.id).collect();
        assert_eq!(order, vec![c2.id, c1.id, c3.id]);
        assert_eq!(contacts[0].last_message.as_ref().unwrap().content, "at 200");
    }

    #[tokio::test]
    async fn requester_and_inactive_users_are_skipped() {
        let school = Uuid::new_v4();
        let admin = user("Ada", Role::Admin, Some(school));
        let mut retired = user("Rita", Role::Teacher, Some(school));
        retired.is_active = false;
        let dir = admin_directory(&admin, vec![retired]);

        let contacts = resolver(dir, quiet_messages())
            .resolve(&ctx_for(&admin))
            .await
            .unwrap();
        assert!(contacts.is_empty());
    }

    #[tokio::test]
    async fn admin_sees_parent_with_all_children_named() {
        let school = Uuid::new_v4();
        let admin = user("Ada", Role::Admin, Some(school));
        let parent = user("Paula", Role::Parent, None);
        let class = Class {
            id: Uuid::new_v4(),
            name: "1A".into(),
            teacher_id: Uuid::new_v4(),
            school_id: school,
        };
        let kid = |name: &str| Student {
            id: Uuid::new_v4(),
            name: name.into(),
            class_id: Some(class.id),
        };
        let guardians = vec![
            Guardianship {
                parent: parent.clone(),
                student: kid("Ana"),
            },
            Guardianship {
                parent: parent.clone(),
                student: kid("Ben"),
            },
        ];

        let mut dir = MockDirectoryRepository::new();
        let a = admin.clone();
        dir.expect_find_user().returning(move |_| Ok(Some(a.clone())));
        let c = class.clone();
        dir.expect_classes_in_school().returning(move |_| Ok(vec![c.clone()]));
        dir.expect_guardians_in_classes().returning(move |_| Ok(guardians.clone()));
        dir.expect_school_members().returning(|_, _| Ok(vec![]));

        let contacts = resolver(dir, quiet_messages())
            .resolve(&ctx_for(&admin))
            .await
            .unwrap();

        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].id, parent.id);
        assert_eq!(contacts[0].role, "Parent (Ana, Ben)");
        assert_eq!(contacts[0].avatar, "P");
    }

    #[tokio::test]
    async fn store_failure_during_enrichment_fails_the_call() {
        let school = Uuid::new_v4();
        let admin = user("Ada", Role::Admin, Some(school));
        let dir = admin_directory(&admin, vec![user("Tom", Role::Teacher, Some(school))]);

        let mut msgs = MockMessageRepository::new();
        msgs.expect_unread_counts()
            .returning(|_, _| Err(anyhow::anyhow!("pool timed out")));

        let err = resolver(dir, msgs)
            .resolve(&ctx_for(&admin))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(msg) if msg.contains("pool timed out")));
    }

    #[tokio::test]
    async fn student_without_school_gets_empty_list() {
        let student = user("Sam", Role::Student, None);
        let mut dir = MockDirectoryRepository::new();
        let s = student.clone();
        dir.expect_find_user().returning(move |_| Ok(Some(s.clone())));

        let contacts = resolver(dir, MockMessageRepository::new())
            .resolve(&ctx_for(&student))
            .await
            .unwrap();
        assert!(contacts.is_empty());
    }
}
