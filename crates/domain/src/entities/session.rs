//! Launch tokens and HUD sessions

use serde::{Deserialize, Deserializer, Serialize};

use crate::ids::SessionId;

/// A one-time credential binding a waiting session to a browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchToken {
    pub token: String,
    pub session_id: SessionId,
    #[serde(deserialize_with = "int_flag")]
    pub used: bool,
}

/// A HUD session row. At most one per uuid stays unrevoked after a handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HudSession {
    pub id: SessionId,
    pub uuid: String,
    pub expires: String,
    #[serde(deserialize_with = "int_flag")]
    pub revoked: bool,
}

/// SQLite stores flags as `0`/`1` integers.
fn int_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Int(i64),
        Bool(bool),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Int(v) => v != 0,
        Flag::Bool(v) => v,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flags_decode_from_integers() {
        let token: LaunchToken =
            serde_json::from_value(json!({"token": "abc123", "session_id": 5, "used": 0}))
                .unwrap();
        assert!(!token.used);
        assert_eq!(token.session_id, SessionId::new(5));

        let session: HudSession = serde_json::from_value(json!({
            "id": 5, "uuid": "U1", "expires": "2024-01-01 00:00:00", "revoked": 1
        }))
        .unwrap();
        assert!(session.revoked);
    }

    #[test]
    fn flags_decode_from_booleans() {
        let token: LaunchToken =
            serde_json::from_value(json!({"token": "t", "session_id": 1, "used": true})).unwrap();
        assert!(token.used);
    }
}
