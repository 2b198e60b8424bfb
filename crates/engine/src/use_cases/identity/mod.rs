//! Identity use cases.
//!
//! Maps the virtual-world avatar UUID onto `players` rows.

use std::sync::Arc;

use rphud_domain::Player;

use crate::infrastructure::database::{decode_single, Database, DbError, LockClause, Select};

mod check_user_exists;

pub use check_user_exists::CheckUserExists;

/// Container for identity use cases.
pub struct IdentityUseCases {
    pub check_user_exists: Arc<CheckUserExists>,
    pub load_player: Arc<LoadPlayer>,
}

impl IdentityUseCases {
    pub fn new(check_user_exists: Arc<CheckUserExists>, load_player: Arc<LoadPlayer>) -> Self {
        Self {
            check_user_exists,
            load_player,
        }
    }
}

/// Loads a player record by avatar UUID.
#[derive(Default)]
pub struct LoadPlayer;

impl LoadPlayer {
    pub fn new() -> Self {
        Self
    }

    pub async fn by_uuid(&self, db: &mut Database, uuid: &str) -> Result<Option<Player>, DbError> {
        find_player(db, uuid, None).await
    }
}

pub(crate) async fn find_player(
    db: &mut Database,
    uuid: &str,
    lock: Option<LockClause>,
) -> Result<Option<Player>, DbError> {
    let mut select = Select::table("players").filter("player_uuid", uuid);
    if let Some(lock) = lock {
        select = select.lock(lock);
    }
    let rows = db.select_query(&select).await?;
    decode_single(rows, "player")
}
