//! Check user exists use case - registers new avatars and keeps names in sync.

use std::sync::Arc;

use rphud_domain::common::pst_timestamp;
use rphud_domain::Player;

use super::find_player;
use crate::infrastructure::database::{Database, DbError, Update};
use crate::infrastructure::ports::ClockPort;

/// Verifies an external identity against the `players` table.
///
/// Unknown identities are registered; known identities get their display
/// name updated when it changed. Infrastructure failures are logged and
/// reported as `false`.
pub struct CheckUserExists {
    clock: Arc<dyn ClockPort>,
}

impl CheckUserExists {
    pub fn new(clock: Arc<dyn ClockPort>) -> Self {
        Self { clock }
    }

    pub async fn execute(&self, db: &mut Database, uuid: &str, name: &str) -> bool {
        match self.check(db, uuid, name).await {
            Ok(exists) => exists,
            Err(e) => {
                db.rollback_quietly().await;
                tracing::error!(uuid = %uuid, error = %e, "User check failed");
                false
            }
        }
    }

    async fn check(&self, db: &mut Database, uuid: &str, name: &str) -> Result<bool, DbError> {
        match find_player(db, uuid, None).await? {
            None => self.register(db, uuid, name).await,
            Some(player) if player.player_name != name => {
                self.rename(db, &player, name).await?;
                Ok(true)
            }
            Some(_) => Ok(true),
        }
    }

    async fn register(&self, db: &mut Database, uuid: &str, name: &str) -> Result<bool, DbError> {
        let now = pst_timestamp(self.clock.now());

        db.begin_transaction().await?;
        let inserted = db
            .insert(
                "players",
                &[
                    "player_uuid",
                    "player_name",
                    "player_created",
                    "player_last_online",
                ],
                vec![uuid.into(), name.into(), now.clone().into(), now.into()],
            )
            .await;
        let player_id = db.finish(inserted).await?;

        // Re-read so a silently dropped insert is reported, not assumed.
        match find_player(db, uuid, None).await? {
            Some(player) => {
                tracing::info!(
                    uuid = %uuid,
                    player_id = %player.player_id,
                    "Registered new player"
                );
                Ok(true)
            }
            None => {
                tracing::error!(uuid = %uuid, player_id, "Player insert could not be verified");
                Ok(false)
            }
        }
    }

    async fn rename(&self, db: &mut Database, player: &Player, name: &str) -> Result<(), DbError> {
        db.begin_transaction().await?;
        let updated = db
            .update_query(
                &Update::table("players")
                    .set("player_name", name)
                    .filter("player_id", player.player_id),
            )
            .await;
        db.finish(updated).await?;
        tracing::info!(
            player_id = %player.player_id,
            old_name = %player.player_name,
            new_name = %name,
            "Updated player name"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FrozenClock;
    use crate::infrastructure::database::testing::temp_registry;
    use crate::infrastructure::ports::MockClockPort;
    use chrono::TimeZone;

    fn use_case() -> CheckUserExists {
        CheckUserExists::new(Arc::new(FrozenClock::at(2024, 1, 15, 10, 30)))
    }

    #[tokio::test]
    async fn registers_unknown_identity() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();

        assert!(use_case().execute(&mut db, "U1", "Resident One").await);

        let player = find_player(&mut db, "U1", None).await.unwrap().unwrap();
        assert_eq!(player.player_name, "Resident One");
        assert_eq!(player.player_created, "2024-01-15 02:30:00");
        assert_eq!(player.player_last_online, "2024-01-15 02:30:00");
        assert_eq!(player.player_current_character, None);
    }

    #[tokio::test]
    async fn existing_identity_is_not_duplicated() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();
        let check = use_case();

        assert!(check.execute(&mut db, "U1", "Resident").await);
        assert!(check.execute(&mut db, "U1", "Resident").await);

        let rows = db
            .select(&["player_id"], "players", &["player_uuid"], vec!["U1".into()], None)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn syncs_changed_display_name() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();
        let check = use_case();

        check.execute(&mut db, "U1", "Old Name").await;
        assert!(check.execute(&mut db, "U1", "New Name").await);

        let player = find_player(&mut db, "U1", None).await.unwrap().unwrap();
        assert_eq!(player.player_name, "New Name");
    }

    #[tokio::test]
    async fn infrastructure_failure_is_reported_as_false() {
        let (_dir, registry) = temp_registry().await;
        let mut db = registry.database();
        // An open transaction makes the registration's BEGIN fail.
        db.begin_transaction().await.unwrap();

        let mut clock = MockClockPort::new();
        clock
            .expect_now()
            .returning(|| chrono::Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let check = CheckUserExists::new(Arc::new(clock));

        assert!(!check.execute(&mut db, "U1", "Resident").await);
        assert!(!db.in_transaction());
    }
}
