//! Player Character entity - role-play characters owned by a player

use serde::{Deserialize, Serialize};

use crate::ids::{CharacterId, LegacyId, PlayerId};
use crate::template::TemplateKind;

/// A stored character row.
///
/// The three JSON columns hold template-shaped objects. They are kept as raw
/// strings here; reconciliation against the canonical templates happens in
/// the character use cases on every load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerCharacter {
    pub character_id: CharacterId,
    pub player_id: PlayerId,
    pub character_name: String,
    #[serde(default)]
    pub character_titler: Option<String>,
    #[serde(default)]
    pub character_options: Option<String>,
    #[serde(default)]
    pub character_stats: Option<String>,
    /// `0` for native rows, the negated legacy id for imports.
    #[serde(default)]
    pub legacy: i64,
}

impl PlayerCharacter {
    /// Raw JSON stored for the given template.
    pub fn blob(&self, kind: TemplateKind) -> Option<&str> {
        match kind {
            TemplateKind::Titler => self.character_titler.as_deref(),
            TemplateKind::Settings => self.character_options.as_deref(),
            TemplateKind::Stats => self.character_stats.as_deref(),
        }
    }

    pub fn legacy_id(&self) -> Option<LegacyId> {
        if self.legacy < 0 {
            LegacyId::new(self.legacy.unsigned_abs()).ok()
        } else {
            None
        }
    }
}

/// Name and id pair used for character pickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSummary {
    pub character_id: CharacterId,
    pub character_name: String,
    #[serde(default)]
    pub legacy: i64,
}
