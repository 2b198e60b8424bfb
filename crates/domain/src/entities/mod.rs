//! Domain entities - rows with identity

mod player;
mod player_character;
mod session;

pub use player::Player;
pub use player_character::{CharacterSummary, PlayerCharacter};
pub use session::{HudSession, LaunchToken};
