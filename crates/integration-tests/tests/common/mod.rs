#![allow(dead_code)]

use std::sync::Arc;

use api_adapters::{build_router, AppState};
use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use domains::{AppError, AuthContext, Class, Message, Role, School, Student, TokenVerifier, User};
use serde_json::Value;
use services::Services;
use storage_adapters::MemoryStore;
use tower::ServiceExt;
use uuid::Uuid;

/// A school graph built up in a `MemoryStore`, with services wired over it.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub services: Services,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let services = Services::from_store(store.clone());
        Self { store, services }
    }

    pub fn school(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.store.insert_school(School {
            id,
            name: name.into(),
        });
        id
    }

    pub fn user(&self, name: &str, role: Role, school_id: Option<Uuid>) -> User {
        let user = User {
            id: Uuid::new_v4(),
            name: name.into(),
            role,
            school_id,
            is_active: true,
            is_online: false,
            last_seen_at: None,
            is_available_to_chat: true,
        };
        self.store.insert_user(user.clone());
        user
    }

    pub fn inactive_user(&self, name: &str, role: Role, school_id: Option<Uuid>) -> User {
        let mut user = self.user(name, role, school_id);
        user.is_active = false;
        self.store.insert_user(user.clone());
        user
    }

    pub fn class(&self, name: &str, teacher: &User, school_id: Uuid) -> Class {
        let class = Class {
            id: Uuid::new_v4(),
            name: name.into(),
            teacher_id: teacher.id,
            school_id,
        };
        self.store.insert_class(class.clone());
        class
    }

    /// Adds a student to `class` and links every given parent to them.
    pub fn child(&self, name: &str, class: Option<&Class>, parents: &[&User]) -> Student {
        let student = Student {
            id: Uuid::new_v4(),
            name: name.into(),
            class_id: class.map(|c| c.id),
        };
        self.store.insert_student(student.clone());
        for parent in parents {
            self.store.link_parent(parent.id, student.id);
        }
        student
    }

    /// Full HTTP router over this fixture's services.
    pub fn app(&self) -> Router {
        self.app_with(Arc::new(PlainTokenVerifier))
    }

    pub fn app_with(&self, verifier: Arc<dyn TokenVerifier>) -> Router {
        build_router(AppState::new(self.services.clone(), verifier), &[])
    }

    /// Stores a message at `secs` past the epoch.
    pub fn message_at(&self, from: &User, to: &User, secs: i64) -> Message {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: from.id,
            receiver_id: to.id,
            school_id: None,
            content: format!("{} -> {} at {secs}", from.name, to.name),
            message_type: Message::DEFAULT_TYPE.into(),
            context_id: None,
            is_read: false,
            created_at: at(secs),
        };
        self.store.seed_message(message.clone());
        message
    }
}

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

pub fn ctx(user: &User) -> AuthContext {
    AuthContext {
        user_id: user.id,
        school_id: user.school_id,
    }
}

/// Accepts `<user-uuid>` or `<user-uuid>:<school-uuid>` as a bearer token.
pub struct PlainTokenVerifier;

impl TokenVerifier for PlainTokenVerifier {
    fn verify(&self, token: &str) -> domains::Result<AuthContext> {
        let invalid = || AppError::Unauthorized("invalid token".into());
        let mut parts = token.splitn(2, ':');
        let user_id = parts
            .next()
            .and_then(|p| Uuid::parse_str(p).ok())
            .ok_or_else(invalid)?;
        let school_id = match parts.next() {
            Some(p) => Some(Uuid::parse_str(p).map_err(|_| invalid())?),
            None => None,
        };
        Ok(AuthContext { user_id, school_id })
    }
}

pub fn bearer(user: &User) -> String {
    match user.school_id {
        Some(school) => format!("Bearer {}:{}", user.id, school),
        None => format!("Bearer {}", user.id),
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub text: String,
}

/// Sends one request through the router. `auth` is a full header value.
pub async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> Reply {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        req = req.header(header::AUTHORIZATION, auth);
    }
    let req = match body {
        Some(json) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string())),
        None => req.body(Body::empty()),
    }
    .unwrap();

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Reply {
        status,
        headers,
        body,
        text,
    }
}
