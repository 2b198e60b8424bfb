//! Player entity - one row per external avatar identity

use serde::{Deserialize, Serialize};

use crate::ids::{CharacterId, PlayerId};

/// A player, keyed externally by the virtual-world avatar UUID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub player_id: PlayerId,
    pub player_uuid: String,
    pub player_name: String,
    pub player_created: String,
    pub player_last_online: String,
    #[serde(default)]
    pub player_current_character: Option<CharacterId>,
    #[serde(default)]
    pub player_titler_url: Option<String>,
    #[serde(default)]
    pub player_hud_url: Option<String>,
}

impl Player {
    pub fn titler_url(&self) -> Option<&str> {
        self.player_titler_url
            .as_deref()
            .and_then(crate::common::none_if_blank)
    }

    pub fn hud_url(&self) -> Option<&str> {
        self.player_hud_url
            .as_deref()
            .and_then(crate::common::none_if_blank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_columns_may_be_null_or_absent() {
        let player: Player = serde_json::from_value(json!({
            "player_id": 1,
            "player_uuid": "U1",
            "player_name": "Resident",
            "player_created": "2024-01-01 00:00:00",
            "player_last_online": "2024-01-01 00:00:00",
            "player_current_character": null,
            "player_titler_url": ""
        }))
        .unwrap();

        assert_eq!(player.player_current_character, None);
        assert_eq!(player.titler_url(), None);
        assert_eq!(player.hud_url(), None);
    }
}
