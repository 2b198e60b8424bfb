//! Select character use case - switches the current character and pushes its
//! titler to the player's in-world titler object.

use std::sync::Arc;

use rphud_domain::{CharacterRef, Player};
use serde_json::json;

use super::{CharacterError, CharacterView, LoadCharacter};
use crate::infrastructure::database::{Database, Update};
use crate::infrastructure::ports::{CallbackPort, CallbackRequest};

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedCharacter {
    pub view: CharacterView,
    /// Whether the titler object acknowledged the push.
    pub titler_notified: bool,
}

pub struct SelectCharacter {
    load: Arc<LoadCharacter>,
    callbacks: Arc<dyn CallbackPort>,
}

impl SelectCharacter {
    pub fn new(load: Arc<LoadCharacter>, callbacks: Arc<dyn CallbackPort>) -> Self {
        Self { load, callbacks }
    }

    pub async fn execute(
        &self,
        db: &mut Database,
        player: &Player,
        character: CharacterRef,
    ) -> Result<SelectedCharacter, CharacterError> {
        db.begin_transaction().await?;
        let switched = self.switch(db, player, character).await;
        let view = db.finish(switched).await?;

        let titler_notified = match player.titler_url() {
            Some(url) => self.callbacks.deliver(titler_push(url, &view)).await,
            None => {
                tracing::debug!(
                    player_id = %player.player_id,
                    "No titler registered, skipping push"
                );
                false
            }
        };

        Ok(SelectedCharacter {
            view,
            titler_notified,
        })
    }

    async fn switch(
        &self,
        db: &mut Database,
        player: &Player,
        character: CharacterRef,
    ) -> Result<CharacterView, CharacterError> {
        let view = self.load.load_in_transaction(db, player, character).await?;
        db.update_query(
            &Update::table("players")
                .set("player_current_character", view.character_id)
                .filter("player_id", player.player_id),
        )
        .await?;
        tracing::info!(
            player_id = %player.player_id,
            character_id = %view.character_id,
            "Switched current character"
        );
        Ok(view)
    }
}

fn titler_push(url: &str, view: &CharacterView) -> CallbackRequest {
    CallbackRequest::new(
        url,
        json!({
            "cmd": "titler",
            "character_id": view.character_id,
            "titler": view.titler,
            "settings": view.settings,
            "attach_point": view.attach_point,
        }),
    )
}
