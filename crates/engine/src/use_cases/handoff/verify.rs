//! Verify HUD session use case

use std::sync::Arc;

use rphud_domain::common::parse_pst_timestamp;
use rphud_domain::{HudSession, Player};
use serde_json::Value;

use super::{HandoffError, HUD_SESSION_KEY, PLAYER_KEY};
use crate::infrastructure::database::{decode_single, Database, Select};
use crate::infrastructure::ports::{ClockPort, SessionData};
use crate::use_cases::identity::find_player;

/// Confirms a browser session still maps to a live handoff session.
///
/// A later handoff for the same avatar revokes older sessions, so holding
/// the cookie alone is not enough.
pub struct VerifyHudSession {
    clock: Arc<dyn ClockPort>,
}

impl VerifyHudSession {
    pub fn new(clock: Arc<dyn ClockPort>) -> Self {
        Self { clock }
    }

    /// Fresh player row for the session, or `None` when it is revoked,
    /// expired or was never issued by a handoff.
    pub async fn execute(
        &self,
        db: &mut Database,
        data: &SessionData,
    ) -> Result<Option<Player>, HandoffError> {
        let Some(session_id) = data.get(HUD_SESSION_KEY).and_then(Value::as_i64) else {
            return Ok(None);
        };
        let Some(stored) = data
            .get(PLAYER_KEY)
            .and_then(|v| serde_json::from_value::<Player>(v.clone()).ok())
        else {
            return Ok(None);
        };

        let rows = db
            .select_query(
                &Select::table("sessions")
                    .filter("id", session_id)
                    .filter("revoked", 0i64),
            )
            .await?;
        let Some(session) = decode_single::<HudSession>(rows, "session")? else {
            tracing::debug!(session_id, "HUD session revoked or gone");
            return Ok(None);
        };

        let expires = parse_pst_timestamp(&session.expires)
            .map_err(|e| HandoffError::Decode(format!("session expiry: {e}")))?;
        if expires <= self.clock.now() {
            tracing::debug!(session_id, expires = %session.expires, "HUD session expired");
            return Ok(None);
        }

        if session.uuid != stored.player_uuid {
            tracing::warn!(session_id, "HUD session belongs to another avatar");
            return Ok(None);
        }

        Ok(find_player(db, &session.uuid, None).await?)
    }
}
