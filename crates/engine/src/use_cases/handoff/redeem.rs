//! Redeem launch token use case

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rphud_domain::common::{pst_timestamp_after, sanitize_token};
use rphud_domain::{HudSession, LaunchToken, Player, SessionId};
use tokio::sync::Semaphore;

use super::{HandoffError, HUD_SESSION_KEY, PLAYER_KEY};
use crate::infrastructure::config::{AppConfig, TokenMode};
use crate::infrastructure::database::{decode_single, Database, LockClause, Select, Update};
use crate::infrastructure::ports::{ClockPort, SessionData, SessionStore};
use crate::infrastructure::session::{
    expired_session_cookie, session_cookie, RequestContext, ResponseCommitted,
};
use crate::use_cases::identity::find_player;

/// Progress of one redemption, logged at every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffState {
    TokenPresented,
    TokenValidated,
    SessionResolved,
    SessionRotated,
    PlayerLoaded,
    CookieIssued,
}

impl HandoffState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TokenPresented => "token_presented",
            Self::TokenValidated => "token_validated",
            Self::SessionResolved => "session_resolved",
            Self::SessionRotated => "session_rotated",
            Self::PlayerLoaded => "player_loaded",
            Self::CookieIssued => "cookie_issued",
        }
    }
}

impl fmt::Display for HandoffState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HandoffSettings {
    pub token_mode: TokenMode,
    pub session_ttl: chrono::Duration,
    /// Longest wait for a redemption permit.
    pub lock_wait: Duration,
    pub interface_path: String,
}

impl HandoffSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            token_mode: config.token_mode,
            session_ttl: config.session_ttl(),
            lock_wait: config.handoff.lock_wait_timeout,
            interface_path: config.hud_interface_path.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffOutcome {
    pub redirect_to: String,
}

/// Redeems a launch token and binds the browser to the player's session.
pub struct RedeemLaunchToken {
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn ClockPort>,
    permits: Arc<Semaphore>,
    settings: HandoffSettings,
}

impl RedeemLaunchToken {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn ClockPort>,
        permits: Arc<Semaphore>,
        settings: HandoffSettings,
    ) -> Self {
        Self {
            sessions,
            clock,
            permits,
            settings,
        }
    }

    pub async fn execute(
        &self,
        db: &mut Database,
        ctx: &mut RequestContext,
    ) -> Result<HandoffOutcome, HandoffError> {
        self.teardown(ctx).await?;

        let token = sanitize_token(ctx.param("token").unwrap_or_default());
        if token.is_empty() {
            return Err(HandoffError::MissingToken);
        }
        transition(HandoffState::TokenPresented);

        let _permit = tokio::time::timeout(self.settings.lock_wait, self.permits.acquire())
            .await
            .map_err(|_| HandoffError::Busy)?
            .map_err(|_| HandoffError::Busy)?;

        db.begin_transaction().await?;
        let redeemed = self.redeem(db, &token).await;
        let (session_id, player) = db.finish(redeemed).await?;

        self.issue_session(ctx, session_id, &player).await?;

        Ok(HandoffOutcome {
            redirect_to: self.settings.interface_path.clone(),
        })
    }

    /// Drops whatever session the browser arrived with.
    async fn teardown(&self, ctx: &mut RequestContext) -> Result<(), HandoffError> {
        if ctx.response.is_committed() {
            return Err(ResponseCommitted.into());
        }

        ctx.session.clear();
        if let Some(old_id) = ctx.session_id.take() {
            self.sessions.persist(&old_id, &ctx.session).await;
            self.sessions.destroy(&old_id).await;
            tracing::debug!("Previous browser session destroyed");
        }
        ctx.response.add_cookie(expired_session_cookie(ctx.https))?;
        Ok(())
    }

    /// Steps that run inside the transaction. Returns the live session and its player.
    async fn redeem(
        &self,
        db: &mut Database,
        token: &str,
    ) -> Result<(SessionId, Player), HandoffError> {
        let rows = db
            .select_query(
                &Select::table("launch_tokens")
                    .filter("token", token)
                    .filter("used", 0i64)
                    .lock(LockClause::ForUpdate),
            )
            .await?;
        let launch: LaunchToken =
            decode_single(rows, "launch token")?.ok_or(HandoffError::InvalidToken)?;
        transition(HandoffState::TokenValidated);

        match self.settings.token_mode {
            TokenMode::SingleUse => {
                db.update_query(
                    &Update::table("launch_tokens")
                        .set("used", 1i64)
                        .filter("token", token),
                )
                .await?;
            }
            TokenMode::Reusable => {
                tracing::warn!(
                    session_id = %launch.session_id,
                    "Token test mode active, launch token left reusable"
                );
            }
        }

        let rows = db
            .select_query(
                &Select::table("sessions")
                    .filter("id", launch.session_id)
                    .filter("revoked", 0i64)
                    .lock(LockClause::ForUpdate),
            )
            .await?;
        let session: HudSession =
            decode_single(rows, "session")?.ok_or(HandoffError::SessionNotFound)?;
        transition(HandoffState::SessionResolved);

        let expires = pst_timestamp_after(self.clock.now(), self.settings.session_ttl);
        db.update_query(
            &Update::table("sessions")
                .set("expires", expires.as_str())
                .filter("id", session.id),
        )
        .await?;
        let revoked = db
            .update_query(
                &Update::table("sessions")
                    .set("revoked", 1i64)
                    .filter("uuid", session.uuid.as_str())
                    .exclude("id", session.id),
            )
            .await?;
        tracing::debug!(
            state = %HandoffState::SessionRotated,
            session_id = %session.id,
            expires = %expires,
            revoked,
            "Handoff transition"
        );

        let player = find_player(db, &session.uuid, Some(LockClause::ForUpdate))
            .await?
            .ok_or(HandoffError::PlayerNotFound)?;
        transition(HandoffState::PlayerLoaded);

        Ok((session.id, player))
    }

    async fn issue_session(
        &self,
        ctx: &mut RequestContext,
        session_id: SessionId,
        player: &Player,
    ) -> Result<(), HandoffError> {
        let player_value =
            serde_json::to_value(player).map_err(|e| HandoffError::Decode(e.to_string()))?;

        let started = self.sessions.new_id();
        let mut data = SessionData::new();
        self.sessions.persist(&started, &data).await;

        // The id handed to the browser is never the one first allocated.
        let id = self.sessions.new_id();
        self.sessions.destroy(&started).await;

        data.insert(PLAYER_KEY, player_value);
        data.insert(HUD_SESSION_KEY, session_id.get().into());
        self.sessions.persist(&id, &data).await;

        let cookie = session_cookie(&id, ctx.https, self.settings.session_ttl.num_seconds());
        ctx.response.add_cookie(cookie)?;
        ctx.session = data;
        ctx.session_id = Some(id);

        tracing::info!(
            state = %HandoffState::CookieIssued,
            player_id = %player.player_id,
            "Launch token redeemed"
        );
        Ok(())
    }
}

fn transition(state: HandoffState) {
    tracing::debug!(state = %state, "Handoff transition");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FrozenClock;
    use crate::infrastructure::database::testing::temp_registry;
    use crate::infrastructure::database::{ConnectionRegistry, Row};
    use crate::infrastructure::session::InMemorySessionStore;
    use serde_json::Value;
    use std::collections::HashMap;

    const NOW_PLUS_TTL: &str = "2024-01-16 02:30:00";
    const ORIGINAL_EXPIRY: &str = "2024-01-01 00:00:00";

    struct Fixture {
        _dir: tempfile::TempDir,
        registry: Arc<ConnectionRegistry>,
        store: Arc<InMemorySessionStore>,
    }

    fn clock() -> Arc<FrozenClock> {
        Arc::new(FrozenClock::at(2024, 1, 15, 10, 30))
    }

    fn settings(token_mode: TokenMode) -> HandoffSettings {
        HandoffSettings {
            token_mode,
            session_ttl: chrono::Duration::hours(24),
            lock_wait: Duration::from_millis(100),
            interface_path: "/hud".to_string(),
        }
    }

    async fn fixture() -> Fixture {
        let (dir, registry) = temp_registry().await;
        let mut db = registry.database();

        db.insert(
            "players",
            &[
                "player_uuid",
                "player_name",
                "player_created",
                "player_last_online",
            ],
            vec![
                "U1".into(),
                "Resident One".into(),
                ORIGINAL_EXPIRY.into(),
                ORIGINAL_EXPIRY.into(),
            ],
        )
        .await
        .unwrap();

        // Sessions 5 and 6 belong to U1; 7 and 8 to U2, who has no player row.
        for (id, uuid) in [(5i64, "U1"), (6, "U1"), (7, "U2"), (8, "U2")] {
            db.insert(
                "sessions",
                &["id", "uuid", "expires"],
                vec![id.into(), uuid.into(), ORIGINAL_EXPIRY.into()],
            )
            .await
            .unwrap();
        }
        for (token, session_id) in [("abc123", 5i64), ("orphan", 7)] {
            db.insert(
                "launch_tokens",
                &["token", "session_id"],
                vec![token.into(), session_id.into()],
            )
            .await
            .unwrap();
        }

        Fixture {
            _dir: dir,
            registry,
            store: Arc::new(InMemorySessionStore::new(chrono::Duration::hours(24), clock())),
        }
    }

    fn use_case(fx: &Fixture, mode: TokenMode) -> RedeemLaunchToken {
        RedeemLaunchToken::new(
            fx.store.clone(),
            clock(),
            Arc::new(Semaphore::new(4)),
            settings(mode),
        )
    }

    fn ctx(token: &str) -> RequestContext {
        RequestContext::new(
            HashMap::from([("token".to_string(), token.to_string())]),
            None,
            false,
        )
    }

    async fn session_row(fx: &Fixture, id: i64) -> Row {
        let mut db = fx.registry.database();
        let mut rows = db
            .select(&["expires", "revoked"], "sessions", &["id"], vec![id.into()], None)
            .await
            .unwrap();
        rows.remove(0)
    }

    async fn token_used(fx: &Fixture, token: &str) -> i64 {
        let mut db = fx.registry.database();
        let rows = db
            .select(&["used"], "launch_tokens", &["token"], vec![token.into()], None)
            .await
            .unwrap();
        rows[0]["used"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn redeems_token_and_rotates_sessions() {
        let fx = fixture().await;
        let mut db = fx.registry.database();
        let mut ctx = ctx("abc123");

        let outcome = use_case(&fx, TokenMode::SingleUse)
            .execute(&mut db, &mut ctx)
            .await
            .unwrap();

        assert_eq!(outcome.redirect_to, "/hud");
        assert_eq!(token_used(&fx, "abc123").await, 1);

        let current = session_row(&fx, 5).await;
        assert_eq!(current["expires"], NOW_PLUS_TTL);
        assert_eq!(current["revoked"], Value::from(0));
        assert_eq!(session_row(&fx, 6).await["revoked"], Value::from(1));
        // Other uuids are untouched.
        assert_eq!(session_row(&fx, 7).await["revoked"], Value::from(0));

        let id = ctx.session_id.clone().unwrap();
        let cookies = ctx.response.cookies();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].contains("Max-Age=0"));
        assert_eq!(
            cookies[1],
            format!("RPHUDSESSID={id}; Path=/; Max-Age=86400; HttpOnly; SameSite=Lax")
        );

        let stored = fx.store.load(&id).await.unwrap();
        assert_eq!(stored.get("player").unwrap()["player_uuid"], "U1");
        assert_eq!(stored.get("hud_session"), Some(&Value::from(5)));
        assert_eq!(fx.store.len(), 1);
    }

    #[tokio::test]
    async fn token_is_single_use() {
        let fx = fixture().await;
        let redeem = use_case(&fx, TokenMode::SingleUse);

        let mut db = fx.registry.database();
        redeem.execute(&mut db, &mut ctx("abc123")).await.unwrap();

        let err = redeem
            .execute(&mut db, &mut ctx("abc123"))
            .await
            .unwrap_err();
        assert!(matches!(err, HandoffError::InvalidToken));
        assert_eq!(err.to_string(), "invalid or already used token");
    }

    #[tokio::test]
    async fn test_mode_leaves_token_reusable() {
        let fx = fixture().await;
        let redeem = use_case(&fx, TokenMode::Reusable);
        let mut db = fx.registry.database();

        redeem.execute(&mut db, &mut ctx("abc123")).await.unwrap();
        redeem.execute(&mut db, &mut ctx("abc123")).await.unwrap();

        assert_eq!(token_used(&fx, "abc123").await, 0);
    }

    #[tokio::test]
    async fn failure_after_validation_leaves_no_mutation() {
        let fx = fixture().await;
        let mut db = fx.registry.database();
        let mut ctx = ctx("orphan");

        let err = use_case(&fx, TokenMode::SingleUse)
            .execute(&mut db, &mut ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, HandoffError::PlayerNotFound));
        assert!(!db.in_transaction());
        assert_eq!(token_used(&fx, "orphan").await, 0);
        assert_eq!(session_row(&fx, 7).await["expires"], ORIGINAL_EXPIRY);
        assert_eq!(session_row(&fx, 8).await["revoked"], Value::from(0));
        assert_eq!(ctx.session_id, None);
        assert_eq!(ctx.response.cookies().len(), 1);
    }

    #[tokio::test]
    async fn revoked_session_is_not_resolved() {
        let fx = fixture().await;
        let mut db = fx.registry.database();
        db.update_query(
            &Update::table("sessions")
                .set("revoked", 1i64)
                .filter("id", 5i64),
        )
        .await
        .unwrap();

        let err = use_case(&fx, TokenMode::SingleUse)
            .execute(&mut db, &mut ctx("abc123"))
            .await
            .unwrap_err();
        assert!(matches!(err, HandoffError::SessionNotFound));
        assert_eq!(token_used(&fx, "abc123").await, 0);
    }

    #[tokio::test]
    async fn missing_token_still_tears_down_session() {
        let fx = fixture().await;
        let mut data = SessionData::new();
        data.insert("player", Value::from("stale"));
        fx.store.persist("old-session", &data).await;

        let mut db = fx.registry.database();
        let mut ctx = RequestContext::new(
            HashMap::from([("token".to_string(), "';--".to_string())]),
            Some("old-session".to_string()),
            true,
        );

        let err = use_case(&fx, TokenMode::SingleUse)
            .execute(&mut db, &mut ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, HandoffError::MissingToken));
        assert!(fx.store.load("old-session").await.is_none());
        assert!(ctx.session.is_empty());
        assert_eq!(
            ctx.response.cookies(),
            ["RPHUDSESSID=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax; Secure".to_string()]
        );
    }

    #[tokio::test]
    async fn committed_response_fails_fast() {
        let fx = fixture().await;
        let mut db = fx.registry.database();
        let mut ctx = ctx("abc123");
        ctx.response.commit();

        let err = use_case(&fx, TokenMode::SingleUse)
            .execute(&mut db, &mut ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, HandoffError::ResponseCommitted(_)));
        assert_eq!(token_used(&fx, "abc123").await, 0);
    }

    #[tokio::test]
    async fn exhausted_permits_report_busy() {
        let fx = fixture().await;
        let redeem = RedeemLaunchToken::new(
            fx.store.clone(),
            clock(),
            Arc::new(Semaphore::new(0)),
            settings(TokenMode::SingleUse),
        );
        let mut db = fx.registry.database();

        let err = redeem
            .execute(&mut db, &mut ctx("abc123"))
            .await
            .unwrap_err();
        assert!(matches!(err, HandoffError::Busy));
        assert_eq!(token_used(&fx, "abc123").await, 0);
    }

    #[test]
    fn states_have_stable_names() {
        assert_eq!(HandoffState::TokenPresented.to_string(), "token_presented");
        assert_eq!(HandoffState::CookieIssued.as_str(), "cookie_issued");
    }
}
