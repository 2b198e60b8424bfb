//! Load character use case

use std::sync::Arc;

use rphud_domain::{
    reconcile, CharacterRef, DomainError, Player, PlayerCharacter, Reconciled, Template,
    TemplateKind,
};
use serde_json::{Map, Value};

use super::{find_character, CharacterAssets, CharacterError, CharacterView};
use crate::infrastructure::database::{Database, LockClause, Update};

const ATTACH_POINT_FIELD: &str = "attach_point";

/// Loads one character, reconciling and re-persisting its template blobs.
pub struct LoadCharacter {
    assets: Arc<CharacterAssets>,
}

impl LoadCharacter {
    pub fn new(assets: Arc<CharacterAssets>) -> Self {
        Self { assets }
    }

    pub async fn execute(
        &self,
        db: &mut Database,
        player: &Player,
        character: CharacterRef,
    ) -> Result<CharacterView, CharacterError> {
        db.begin_transaction().await?;
        let loaded = self.load_in_transaction(db, player, character).await;
        db.finish(loaded).await
    }

    /// Load steps for callers that already hold a transaction.
    pub(crate) async fn load_in_transaction(
        &self,
        db: &mut Database,
        player: &Player,
        character: CharacterRef,
    ) -> Result<CharacterView, CharacterError> {
        let row = find_character(db, player.player_id, character, Some(LockClause::ForUpdate))
            .await?
            .ok_or(CharacterError::NotFound)?;

        let titler = self.reconcile_column(&row, TemplateKind::Titler)?;
        let settings = self.reconcile_column(&row, TemplateKind::Settings)?;
        let stats = self.reconcile_column(&row, TemplateKind::Stats)?;

        let mut update =
            Update::table("player_characters").filter("character_id", row.character_id);
        let mut stale = Vec::new();
        for (kind, reconciled) in [
            (TemplateKind::Titler, &titler),
            (TemplateKind::Settings, &settings),
            (TemplateKind::Stats, &stats),
        ] {
            if reconciled.changed {
                update = update.set(kind.column(), encode(&reconciled.fields));
                stale.push(kind.column());
            }
        }
        if !stale.is_empty() {
            db.update_query(&update).await?;
            tracing::info!(
                character_id = %row.character_id,
                columns = ?stale,
                "Re-persisted reconciled character data"
            );
        }

        let attach_point = resolve_attach_point(&self.assets, &settings.fields)?;

        Ok(CharacterView {
            character_id: row.character_id,
            character_name: row.character_name.clone(),
            legacy: row.legacy_id().map(|id| id.get()),
            titler: titler.fields,
            settings: settings.fields,
            stats: stats.fields,
            attach_point,
        })
    }

    fn reconcile_column(
        &self,
        row: &PlayerCharacter,
        kind: TemplateKind,
    ) -> Result<Reconciled, CharacterError> {
        reconcile_blob(row.blob(kind), self.assets.templates.get(kind)).map_err(|e| {
            tracing::error!(
                character_id = %row.character_id,
                column = kind.column(),
                error = %e,
                "Stored character data does not match its template"
            );
            CharacterError::Integrity(e)
        })
    }
}

/// Reconciles one stored blob. A missing blob becomes the template defaults.
pub(crate) fn reconcile_blob(
    raw: Option<&str>,
    template: &Template,
) -> Result<Reconciled, DomainError> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Ok(Reconciled {
            fields: template.defaults(),
            changed: true,
        });
    };

    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(data)) => reconcile(&data, template),
        Ok(_) => Err(DomainError::parse(format!(
            "{} column is not a JSON object",
            template.kind().column()
        ))),
        Err(e) => Err(DomainError::parse(format!(
            "{} column is not valid JSON: {e}",
            template.kind().column()
        ))),
    }
}

/// Viewer code for the settings' attach point.
pub(crate) fn resolve_attach_point(
    assets: &CharacterAssets,
    settings: &Map<String, Value>,
) -> Result<i64, CharacterError> {
    let name = match settings.get(ATTACH_POINT_FIELD) {
        Some(Value::String(name)) => name.as_str(),
        Some(other) => return Err(CharacterError::UnknownAttachPoint(other.to_string())),
        None => return Err(CharacterError::UnknownAttachPoint(String::new())),
    };
    assets
        .attach_points
        .resolve(name)
        .ok_or_else(|| CharacterError::UnknownAttachPoint(name.to_string()))
}

pub(crate) fn encode(fields: &Map<String, Value>) -> String {
    Value::Object(fields.clone()).to_string()
}
