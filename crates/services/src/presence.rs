//! # Presence
//!
//! Online/availability state per user. Online state only changes on an
//! explicit update or heartbeat; nothing expires it.

use std::sync::Arc;

use chrono::Utc;
use domains::{AppError, AuthContext, DirectoryRepository, Presence, PresenceRepository};

pub struct PresenceService {
    directory: Arc<dyn DirectoryRepository>,
    presence: Arc<dyn PresenceRepository>,
}

impl PresenceService {
    pub fn new(
        directory: Arc<dyn DirectoryRepository>,
        presence: Arc<dyn PresenceRepository>,
    ) -> Self {
        Self {
            directory,
            presence,
        }
    }

    pub async fn me(&self, ctx: &AuthContext) -> domains::Result<Presence> {
        self.directory
            .find_user(ctx.user_id)
            .await?
            .map(|u| u.presence())
            .ok_or_else(|| AppError::not_found("User", ctx.user_id))
    }

    /// Sets the online flag (default `true`) and stamps `last_seen_at`.
    #[tracing::instrument(skip(self, ctx), fields(user_id = %ctx.user_id))]
    pub async fn update(
        &self,
        ctx: &AuthContext,
        online: Option<bool>,
    ) -> domains::Result<Presence> {
        let online = online.unwrap_or(true);
        let user = self
            .presence
            .set_online(ctx.user_id, online, Utc::now())
            .await?
            .ok_or_else(|| AppError::not_found("User", ctx.user_id))?;
        tracing::info!(online, "presence updated");
        Ok(user.presence())
    }

    /// Sets `is_available_to_chat` (default `true`); online state is untouched.
    pub async fn set_availability(
        &self,
        ctx: &AuthContext,
        available: Option<bool>,
    ) -> domains::Result<Presence> {
        let available = available.unwrap_or(true);
        let user = self
            .presence
            .set_availability(ctx.user_id, available)
            .await?
            .ok_or_else(|| AppError::not_found("User", ctx.user_id))?;
        tracing::info!(user_id = %ctx.user_id, available, "availability updated");
        Ok(user.presence())
    }

    /// Forces online and refreshes `last_seen_at`.
    pub async fn heartbeat(&self, ctx: &AuthContext) -> domains::Result<()> {
        self.presence
            .set_online(ctx.user_id, true, Utc::now())
            .await?
            .ok_or_else(|| AppError::not_found("User", ctx.user_id))?;
        Ok(())
    }
}
