use rphud_domain::{CharacterSummary, Player};

use super::CharacterError;
use crate::infrastructure::database::{decode, Database, Order, Select};

/// Lists a player's characters by name.
#[derive(Default)]
pub struct ListCharacters;

impl ListCharacters {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(
        &self,
        db: &mut Database,
        player: &Player,
    ) -> Result<Vec<CharacterSummary>, CharacterError> {
        let rows = db
            .select_query(
                &Select::table("player_characters")
                    .columns(["character_id", "character_name", "legacy"])
                    .filter("player_id", player.player_id)
                    .order_by("character_name", Order::Asc)
                    .order_by("character_id", Order::Asc),
            )
            .await?;

        let summaries = rows
            .into_iter()
            .map(decode)
            .collect::<Result<Vec<CharacterSummary>, _>>()?;
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::testing::temp_registry;
    use crate::use_cases::character::testing::{seed_character, seed_player};

    #[tokio::test]
    async fn lists_only_own_characters_sorted_by_name() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();
        let owner = seed_player(&mut db, "U1").await;
        let other = seed_player(&mut db, "U2").await;
        seed_character(&mut db, &owner, "Zed", None, None, None, 0).await;
        seed_character(&mut db, &owner, "Ann", None, None, None, -4).await;
        seed_character(&mut db, &other, "Bob", None, None, None, 0).await;

        let summaries = ListCharacters::new().execute(&mut db, &owner).await.unwrap();

        let names: Vec<&str> = summaries.iter().map(|s| s.character_name.as_str()).collect();
        assert_eq!(names, ["Ann", "Zed"]);
        assert_eq!(summaries[0].legacy, -4);
    }
}
