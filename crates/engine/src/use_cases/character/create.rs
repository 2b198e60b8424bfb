//! Create character use case

use std::sync::Arc;

use rphud_domain::common::collapse_whitespace;
use rphud_domain::{CharacterId, CharacterRef, Player, TemplateKind};
use serde_json::Value;

use super::load::encode;
use super::{
    CharacterAssets, CharacterError, CharacterView, LoadCharacter, MAX_CHARACTER_NAME_CHARS,
};
use crate::infrastructure::database::{Database, Update};

const NAME_FIELD: &str = "Name";

/// Creates a character from the default templates and makes it current.
pub struct CreateCharacter {
    assets: Arc<CharacterAssets>,
    load: Arc<LoadCharacter>,
}

impl CreateCharacter {
    pub fn new(assets: Arc<CharacterAssets>, load: Arc<LoadCharacter>) -> Self {
        Self { assets, load }
    }

    pub async fn execute(
        &self,
        db: &mut Database,
        player: &Player,
        name: &str,
    ) -> Result<CharacterView, CharacterError> {
        let name = collapse_whitespace(name, MAX_CHARACTER_NAME_CHARS);
        if name.is_empty() {
            return Err(CharacterError::validation("character name cannot be empty"));
        }

        db.begin_transaction().await?;
        let created = self.insert(db, player, &name).await;
        let character_id = db.finish(created).await?;

        tracing::info!(
            player_id = %player.player_id,
            character_id = %character_id,
            "Created character"
        );

        self.load
            .execute(db, player, CharacterRef::Current(character_id))
            .await
    }

    async fn insert(
        &self,
        db: &mut Database,
        player: &Player,
        name: &str,
    ) -> Result<CharacterId, CharacterError> {
        let templates = &self.assets.templates;
        let titler_template = templates.get(TemplateKind::Titler);
        let mut titler = titler_template.defaults();
        let name_field = titler_template.find_field(NAME_FIELD).unwrap_or(NAME_FIELD);
        titler.insert(name_field.to_string(), Value::String(name.to_string()));

        let id = db
            .insert(
                "player_characters",
                &[
                    "player_id",
                    "character_name",
                    "character_titler",
                    "character_options",
                    "character_stats",
                    "legacy",
                ],
                vec![
                    player.player_id.into(),
                    name.into(),
                    encode(&titler).into(),
                    encode(&templates.get(TemplateKind::Settings).defaults()).into(),
                    encode(&templates.get(TemplateKind::Stats).defaults()).into(),
                    0i64.into(),
                ],
            )
            .await?;
        let character_id = CharacterId::new(id);

        db.update_query(
            &Update::table("players")
                .set("player_current_character", character_id)
                .filter("player_id", player.player_id),
        )
        .await?;

        Ok(character_id)
    }
}
