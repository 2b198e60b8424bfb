//! Update character field use case

use std::sync::Arc;

use rphud_domain::common::collapse_whitespace;
use rphud_domain::{coerce_value, CharacterRef, Player, TemplateKind};
use serde_json::Value;

use super::load::{encode, resolve_attach_point};
use super::{
    CharacterAssets, CharacterError, CharacterView, LoadCharacter, MAX_CHARACTER_NAME_CHARS,
};
use crate::infrastructure::database::{Database, Update};

const MAX_FIELD_CHARS: usize = 255;

/// Sets one template field, coercing the raw text to the field's type.
pub struct UpdateCharacterField {
    assets: Arc<CharacterAssets>,
    load: Arc<LoadCharacter>,
}

impl UpdateCharacterField {
    pub fn new(assets: Arc<CharacterAssets>, load: Arc<LoadCharacter>) -> Self {
        Self { assets, load }
    }

    pub async fn execute(
        &self,
        db: &mut Database,
        player: &Player,
        character: CharacterRef,
        kind: TemplateKind,
        field: &str,
        raw_value: &str,
    ) -> Result<CharacterView, CharacterError> {
        let template = self.assets.templates.get(kind);
        let field = template
            .find_field(field)
            .ok_or_else(|| CharacterError::UnknownField(field.trim().to_string()))?
            .to_string();
        let default = template
            .default_for(&field)
            .ok_or_else(|| CharacterError::UnknownField(field.clone()))?;

        let value = match coerce_value(default, raw_value) {
            Value::String(text) => Value::String(collapse_whitespace(&text, MAX_FIELD_CHARS)),
            other => other,
        };

        if kind == TemplateKind::Titler && field == "Name" && value.as_str() == Some("") {
            return Err(CharacterError::validation("character name cannot be empty"));
        }
        if kind == TemplateKind::Settings && field == "attach_point" {
            let name = value.as_str().unwrap_or_default();
            if self.assets.attach_points.resolve(name).is_none() {
                return Err(CharacterError::validation(format!(
                    "unknown attach point: {name}"
                )));
            }
        }

        db.begin_transaction().await?;
        let applied = self.apply(db, player, character, kind, &field, value).await;
        db.finish(applied).await
    }

    async fn apply(
        &self,
        db: &mut Database,
        player: &Player,
        character: CharacterRef,
        kind: TemplateKind,
        field: &str,
        value: Value,
    ) -> Result<CharacterView, CharacterError> {
        let mut view = self.load.load_in_transaction(db, player, character).await?;
        let blob = view.blob_mut(kind);
        blob.insert(field.to_string(), value.clone());
        let encoded = encode(blob);

        let mut update = Update::table("player_characters")
            .set(kind.column(), encoded)
            .filter("character_id", view.character_id);

        if kind == TemplateKind::Titler && field == "Name" {
            let name =
                collapse_whitespace(value.as_str().unwrap_or_default(), MAX_CHARACTER_NAME_CHARS);
            update = update.set("character_name", name.as_str());
            view.character_name = name;
        }
        if kind == TemplateKind::Settings {
            view.attach_point = resolve_attach_point(&self.assets, &view.settings)?;
        }

        db.update_query(&update).await?;
        tracing::info!(
            character_id = %view.character_id,
            template = kind.name(),
            field = %field,
            "Updated character field"
        );
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::testing::temp_registry;
    use crate::use_cases::character::testing::{assets, seed_character, seed_player, stored_blob};
    use serde_json::Map;

    fn use_case() -> UpdateCharacterField {
        let assets = assets();
        UpdateCharacterField::new(assets.clone(), Arc::new(LoadCharacter::new(assets)))
    }

    #[tokio::test]
    async fn coerces_to_the_default_type() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();
        let player = seed_player(&mut db, "U1").await;
        let id = seed_character(&mut db, &player, "Bob", None, None, None, 0).await;
        let update = use_case();
        let target = CharacterRef::Current(id);

        let view = update
            .execute(&mut db, &player, target, TemplateKind::Stats, "STRENGTH", " 14 ")
            .await
            .unwrap();
        assert_eq!(view.stats["strength"], 14);

        let view = update
            .execute(&mut db, &player, target, TemplateKind::Settings, "afk", "yes")
            .await
            .unwrap();
        assert_eq!(view.settings["afk"], true);

        let stored = stored_blob(&mut db, id, "character_stats").await.unwrap();
        let stored: Map<String, Value> = serde_json::from_str(&stored).unwrap();
        assert_eq!(stored["strength"], 14);
    }

    #[tokio::test]
    async fn renaming_updates_character_name() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();
        let player = seed_player(&mut db, "U1").await;
        let id = seed_character(&mut db, &player, "Bob", None, None, None, 0).await;

        let view = use_case()
            .execute(
                &mut db,
                &player,
                CharacterRef::Current(id),
                TemplateKind::Titler,
                "name",
                "Robert",
            )
            .await
            .unwrap();
        assert_eq!(view.character_name, "Robert");
        assert_eq!(view.titler["Name"], "Robert");

        let rows = db
            .select(
                &["character_name"],
                "player_characters",
                &["character_id"],
                vec![id.into()],
                None,
            )
            .await
            .unwrap();
        assert_eq!(rows[0]["character_name"], "Robert");
    }

    #[tokio::test]
    async fn discriminator_and_unknown_fields_are_rejected() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();
        let player = seed_player(&mut db, "U1").await;
        let id = seed_character(&mut db, &player, "Bob", None, None, None, 0).await;
        let update = use_case();

        for field in ["template", "wings"] {
            let err = update
                .execute(
                    &mut db,
                    &player,
                    CharacterRef::Current(id),
                    TemplateKind::Titler,
                    field,
                    "x",
                )
                .await
                .unwrap_err();
            assert!(matches!(err, CharacterError::UnknownField(_)), "{field}");
        }
    }

    #[tokio::test]
    async fn attach_point_is_validated_before_writing() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();
        let player = seed_player(&mut db, "U1").await;
        let id = seed_character(&mut db, &player, "Bob", None, None, None, 0).await;
        let update = use_case();
        let target = CharacterRef::Current(id);

        let err = update
            .execute(&mut db, &player, target, TemplateKind::Settings, "attach_point", "tail")
            .await
            .unwrap_err();
        assert!(matches!(err, CharacterError::Validation(_)));
        assert_eq!(stored_blob(&mut db, id, "character_options").await, None);

        let view = update
            .execute(&mut db, &player, target, TemplateKind::Settings, "attach_point", "chest")
            .await
            .unwrap();
        assert_eq!(view.attach_point, 1);
    }
}
