//! Character use cases.
//!
//! Characters store three template-shaped JSON blobs. Every load reconciles
//! them against the canonical templates and writes back anything that drifted.

use std::sync::Arc;

use rphud_domain::{CharacterRef, DomainError, PlayerId, PlayerCharacter, TemplateSet};

use crate::infrastructure::assets::AttachPointTable;
use crate::infrastructure::database::{decode_single, Database, DbError, LockClause, Select};

mod create;
mod import;
mod list;
mod load;
mod select;
mod update;
mod view;

pub use create::CreateCharacter;
pub use import::{ImportLegacyCharacters, ImportReport, LegacyCharacterRow};
pub use list::ListCharacters;
pub use load::LoadCharacter;
pub use select::{SelectCharacter, SelectedCharacter};
pub use update::UpdateCharacterField;
pub use view::CharacterView;

/// Longest character name kept after whitespace collapsing.
pub const MAX_CHARACTER_NAME_CHARS: usize = 64;

/// Canonical templates and attach-point codes shared by the character use cases.
#[derive(Debug, Clone)]
pub struct CharacterAssets {
    pub templates: TemplateSet,
    pub attach_points: AttachPointTable,
}

impl CharacterAssets {
    pub fn new(templates: TemplateSet, attach_points: AttachPointTable) -> Self {
        Self {
            templates,
            attach_points,
        }
    }
}

/// Container for character use cases.
pub struct CharacterUseCases {
    pub create: Arc<CreateCharacter>,
    pub load: Arc<LoadCharacter>,
    pub list: Arc<ListCharacters>,
    pub select: Arc<SelectCharacter>,
    pub update: Arc<UpdateCharacterField>,
    pub import: Arc<ImportLegacyCharacters>,
}

impl CharacterUseCases {
    pub fn new(
        create: Arc<CreateCharacter>,
        load: Arc<LoadCharacter>,
        list: Arc<ListCharacters>,
        select: Arc<SelectCharacter>,
        update: Arc<UpdateCharacterField>,
        import: Arc<ImportLegacyCharacters>,
    ) -> Self {
        Self {
            create,
            load,
            list,
            select,
            update,
            import,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CharacterError {
    #[error("character not found")]
    NotFound,
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("unknown attach point: {0}")]
    UnknownAttachPoint(String),
    /// Stored data does not fit its template.
    #[error("character data integrity error: {0}")]
    Integrity(DomainError),
    #[error("legacy database is not configured")]
    LegacyUnavailable,
    #[error(transparent)]
    Db(#[from] DbError),
}

impl CharacterError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Finds a character owned by `player_id`.
pub(crate) async fn find_character(
    db: &mut Database,
    player_id: PlayerId,
    character: CharacterRef,
    lock: Option<LockClause>,
) -> Result<Option<PlayerCharacter>, DbError> {
    let select = Select::table("player_characters").filter("player_id", player_id);
    let mut select = match character {
        CharacterRef::Current(id) => select.filter("character_id", id),
        CharacterRef::Legacy(legacy) => select.filter("legacy", legacy.column_value()),
    };
    if let Some(lock) = lock {
        select = select.lock(lock);
    }
    let rows = db.select_query(&select).await?;
    decode_single(rows, "character")
}
