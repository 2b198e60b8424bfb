//! Import legacy characters use case
//!
//! Characters from the predecessor system live in a separate database as
//! `key=>value;key=>value` strings. Imports convert them into template
//! shape and store the negated legacy id so they stay addressable.

use std::collections::HashSet;
use std::sync::Arc;

use rphud_domain::common::collapse_whitespace;
use rphud_domain::{legacy_to_template, LegacyId, Player, TemplateKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::load::encode;
use super::{CharacterAssets, CharacterError, MAX_CHARACTER_NAME_CHARS};
use crate::infrastructure::database::{
    decode, Database, QueryOutput, Select, DEFAULT_CONNECTION, LEGACY_CONNECTION,
};

const LEGACY_ROWS_SQL: &str = "SELECT legacy_id, name, titler, settings, stats \
     FROM legacy_characters WHERE owner_uuid = ? ORDER BY legacy_id";

/// One character as stored by the predecessor system.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LegacyCharacterRow {
    pub legacy_id: i64,
    pub name: String,
    #[serde(default)]
    pub titler: Option<String>,
    #[serde(default)]
    pub settings: Option<String>,
    #[serde(default)]
    pub stats: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

pub struct ImportLegacyCharacters {
    assets: Arc<CharacterAssets>,
}

impl ImportLegacyCharacters {
    pub fn new(assets: Arc<CharacterAssets>) -> Self {
        Self { assets }
    }

    /// Reads `uuid`'s characters from the legacy connection.
    ///
    /// The handle is switched back to the default connection afterwards,
    /// also when the lookup fails.
    pub async fn fetch_rows(
        &self,
        db: &mut Database,
        uuid: &str,
    ) -> Result<Vec<LegacyCharacterRow>, CharacterError> {
        if !db.has_connection(LEGACY_CONNECTION) {
            return Err(CharacterError::LegacyUnavailable);
        }

        db.use_connection(LEGACY_CONNECTION)?;
        let output = db.manual_query(LEGACY_ROWS_SQL, vec![uuid.into()]).await;
        let restored = db.use_connection(DEFAULT_CONNECTION);
        let output = output?;
        restored?;

        match output {
            QueryOutput::Rows(rows) => Ok(rows
                .into_iter()
                .map(decode)
                .collect::<Result<Vec<LegacyCharacterRow>, _>>()?),
            QueryOutput::Affected(_) => Ok(Vec::new()),
        }
    }

    /// Imports `rows` for `player` in one transaction.
    pub async fn execute(
        &self,
        db: &mut Database,
        player: &Player,
        rows: &[LegacyCharacterRow],
    ) -> Result<ImportReport, CharacterError> {
        db.begin_transaction().await?;
        let imported = self.import_all(db, player, rows).await;
        let report = db.finish(imported).await?;

        tracing::info!(
            player_id = %player.player_id,
            imported = report.imported,
            skipped = report.skipped,
            "Legacy character import finished"
        );
        Ok(report)
    }

    /// Fetches and imports everything the legacy database holds for `player`.
    pub async fn import_for(
        &self,
        db: &mut Database,
        player: &Player,
    ) -> Result<ImportReport, CharacterError> {
        let rows = self.fetch_rows(db, &player.player_uuid).await?;
        self.execute(db, player, &rows).await
    }

    async fn import_all(
        &self,
        db: &mut Database,
        player: &Player,
        rows: &[LegacyCharacterRow],
    ) -> Result<ImportReport, CharacterError> {
        let mut existing = self.imported_ids(db, player).await?;
        let mut report = ImportReport::default();

        for row in rows {
            let Some(legacy_id) = u64::try_from(row.legacy_id)
                .ok()
                .and_then(|id| LegacyId::new(id).ok())
            else {
                tracing::debug!(legacy_id = row.legacy_id, "Skipping legacy row with reserved id");
                report.skipped += 1;
                continue;
            };
            if !existing.insert(legacy_id.column_value()) {
                report.skipped += 1;
                continue;
            }

            let (name, blobs) = self.convert(row, legacy_id);
            db.insert(
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
                    blobs[0].clone().into(),
                    blobs[1].clone().into(),
                    blobs[2].clone().into(),
                    legacy_id.column_value().into(),
                ],
            )
            .await?;
            report.imported += 1;
        }
        Ok(report)
    }

    async fn imported_ids(
        &self,
        db: &mut Database,
        player: &Player,
    ) -> Result<HashSet<i64>, CharacterError> {
        let rows = db
            .select_query(
                &Select::table("player_characters")
                    .columns(["legacy"])
                    .filter("player_id", player.player_id)
                    .exclude("legacy", 0i64),
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("legacy").and_then(Value::as_i64))
            .collect())
    }

    /// Character name plus the encoded titler, settings and stats blobs.
    fn convert(&self, row: &LegacyCharacterRow, legacy_id: LegacyId) -> (String, [String; 3]) {
        let templates = &self.assets.templates;
        let mut titler = legacy_to_template(
            row.titler.as_deref().unwrap_or_default(),
            templates.get(TemplateKind::Titler),
        );
        let settings = legacy_to_template(
            row.settings.as_deref().unwrap_or_default(),
            templates.get(TemplateKind::Settings),
        );
        let stats = legacy_to_template(
            row.stats.as_deref().unwrap_or_default(),
            templates.get(TemplateKind::Stats),
        );

        let titler_name = titler
            .get("Name")
            .and_then(Value::as_str)
            .map(|n| collapse_whitespace(n, MAX_CHARACTER_NAME_CHARS))
            .unwrap_or_default();
        let mut name = collapse_whitespace(&row.name, MAX_CHARACTER_NAME_CHARS);
        if name.is_empty() {
            name = titler_name.clone();
        }
        if name.is_empty() {
            name = format!("Legacy {legacy_id}");
        }
        if titler_name.is_empty() && titler.contains_key("Name") {
            titler.insert("Name".to_string(), Value::String(name.clone()));
        }

        (name, [encode(&titler), encode(&settings), encode(&stats)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::testing::{temp_registry, with_legacy};
    use crate::use_cases::character::testing::{assets, seed_character, seed_player};
    use crate::use_cases::character::LoadCharacter;
    use rphud_domain::CharacterRef;

    fn row(id: i64, name: &str, titler: &str, stats: &str) -> LegacyCharacterRow {
        LegacyCharacterRow {
            legacy_id: id,
            name: name.to_string(),
            titler: Some(titler.to_string()),
            settings: None,
            stats: Some(stats.to_string()),
        }
    }

    #[tokio::test]
    async fn imports_rows_in_template_shape() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();
        let player = seed_player(&mut db, "U1").await;
        let import = ImportLegacyCharacters::new(assets());

        let report = import
            .execute(
                &mut db,
                &player,
                &[row(12, "Old Bob", "mood=>grumpy;SPECIES=>Elf", "strength=>15;luck=>3")],
            )
            .await
            .unwrap();
        assert_eq!(report, ImportReport { imported: 1, skipped: 0 });

        let view = LoadCharacter::new(assets())
            .execute(&mut db, &player, CharacterRef::Legacy(LegacyId::new(12).unwrap()))
            .await
            .unwrap();
        assert_eq!(view.character_name, "Old Bob");
        assert_eq!(view.titler["Name"], "Old Bob");
        assert_eq!(view.titler["Mood"], "grumpy");
        assert_eq!(view.titler["Species"], "Elf");
        assert_eq!(view.stats["strength"], 15);
        assert!(!view.stats.contains_key("luck"));
        assert_eq!(view.settings["attach_point"], "head");
    }

    #[tokio::test]
    async fn skips_reserved_and_already_imported_ids() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();
        let player = seed_player(&mut db, "U1").await;
        seed_character(&mut db, &player, "Existing", None, None, None, -7).await;

        let report = ImportLegacyCharacters::new(assets())
            .execute(
                &mut db,
                &player,
                &[
                    row(0, "Zero", "", ""),
                    row(7, "Again", "", ""),
                    row(8, "Fresh", "", ""),
                    row(8, "Duplicate", "", ""),
                ],
            )
            .await
            .unwrap();

        assert_eq!(report, ImportReport { imported: 1, skipped: 3 });
    }

    #[tokio::test]
    async fn failed_row_rolls_back_whole_batch() {
        let (_dir, registry) = temp_registry().await;
        let pool = registry.pool(DEFAULT_CONNECTION).unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_legacy_two BEFORE INSERT ON player_characters \
             WHEN NEW.legacy = -2 BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(pool)
        .await
        .unwrap();

        let mut db = registry.database();
        let player = seed_player(&mut db, "U1").await;

        let err = ImportLegacyCharacters::new(assets())
            .execute(
                &mut db,
                &player,
                &[row(1, "One", "", ""), row(2, "Two", "", ""), row(3, "Three", "", "")],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CharacterError::Db(_)));
        assert!(!db.in_transaction());

        let rows = db
            .select_query(
                &Select::table("player_characters").filter("player_id", player.player_id),
            )
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn fetch_requires_legacy_connection() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();

        let err = ImportLegacyCharacters::new(assets())
            .fetch_rows(&mut db, "U1")
            .await
            .unwrap_err();
        assert!(matches!(err, CharacterError::LegacyUnavailable));
    }

    #[tokio::test]
    async fn imports_from_legacy_database() {
        let (dir, registry) = temp_registry().await;
        let registry = with_legacy(&dir, &registry).await;
        let mut db = registry.database();
        let player = seed_player(&mut db, "U1").await;

        db.use_connection(LEGACY_CONNECTION).unwrap();
        for (id, owner, name) in [(3i64, "U1", "Ann"), (4, "U1", "Cy"), (5, "U2", "Other")] {
            db.manual_query(
                "INSERT INTO legacy_characters (legacy_id, owner_uuid, name, titler) \
                 VALUES (?, ?, ?, ?)",
                vec![id.into(), owner.into(), name.into(), "mood=>calm".into()],
            )
            .await
            .unwrap();
        }
        db.use_connection(DEFAULT_CONNECTION).unwrap();

        let import = ImportLegacyCharacters::new(assets());
        let report = import.import_for(&mut db, &player).await.unwrap();
        assert_eq!(report, ImportReport { imported: 2, skipped: 0 });
        assert_eq!(db.current_connection(), DEFAULT_CONNECTION);

        // A second run finds nothing new.
        let report = import.import_for(&mut db, &player).await.unwrap();
        assert_eq!(report, ImportReport { imported: 0, skipped: 2 });
    }
}
