//! HUD registration - stores the callback URLs of a player's in-world objects.

use std::sync::Arc;

use rphud_domain::Player;
use serde_json::json;

use crate::infrastructure::database::{Database, DbError, Update};
use crate::infrastructure::ports::{CallbackPort, CallbackRequest};

#[derive(Debug, thiserror::Error)]
pub enum HudError {
    #[error("invalid callback url: {0}")]
    InvalidUrl(String),
    #[error("no callback url given")]
    NothingToRegister,
    #[error(transparent)]
    Db(#[from] DbError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HudRegistration {
    /// Every registered object answered the ping.
    pub verified: bool,
}

pub struct RegisterHud {
    callbacks: Arc<dyn CallbackPort>,
}

impl RegisterHud {
    pub fn new(callbacks: Arc<dyn CallbackPort>) -> Self {
        Self { callbacks }
    }

    pub async fn execute(
        &self,
        db: &mut Database,
        player: &Player,
        titler_url: Option<&str>,
        hud_url: Option<&str>,
    ) -> Result<HudRegistration, HudError> {
        let titler_url = titler_url.map(validate_url).transpose()?;
        let hud_url = hud_url.map(validate_url).transpose()?;
        if titler_url.is_none() && hud_url.is_none() {
            return Err(HudError::NothingToRegister);
        }

        let mut update = Update::table("players").filter("player_id", player.player_id);
        if let Some(url) = &titler_url {
            update = update.set("player_titler_url", url.as_str());
        }
        if let Some(url) = &hud_url {
            update = update.set("player_hud_url", url.as_str());
        }

        db.begin_transaction().await?;
        let updated = db.update_query(&update).await;
        db.finish(updated).await?;

        let mut verified = true;
        for url in titler_url.iter().chain(hud_url.iter()) {
            let ping = CallbackRequest::new(url.as_str(), json!({ "cmd": "ping" }));
            verified &= self.callbacks.deliver(ping).await;
        }

        tracing::info!(
            player_id = %player.player_id,
            titler = titler_url.is_some(),
            hud = hud_url.is_some(),
            verified,
            "Registered HUD callback urls"
        );
        Ok(HudRegistration { verified })
    }
}

/// Accepts absolute `http`/`https` URLs only.
fn validate_url(raw: &str) -> Result<String, HudError> {
    let raw = raw.trim();
    let url = reqwest::Url::parse(raw).map_err(|_| HudError::InvalidUrl(raw.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url.to_string()),
        _ => Err(HudError::InvalidUrl(raw.to_string())),
    }
}
