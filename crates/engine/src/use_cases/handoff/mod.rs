//! Launch-token handoff.
//!
//! Turns a one-time launch token minted for an in-world session into a
//! cookie-backed browser session for the web HUD.

mod redeem;
mod verify;

pub use redeem::{HandoffOutcome, HandoffSettings, HandoffState, RedeemLaunchToken};
pub use verify::VerifyHudSession;

use crate::infrastructure::database::DbError;
use crate::infrastructure::session::ResponseCommitted;

/// Session data key holding the serialized player.
pub const PLAYER_KEY: &str = "player";
/// Session data key holding the id of the `sessions` row behind the cookie.
pub const HUD_SESSION_KEY: &str = "hud_session";

#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("missing launch token")]
    MissingToken,
    #[error("cannot change session: {0}")]
    ResponseCommitted(#[from] ResponseCommitted),
    #[error("invalid or already used token")]
    InvalidToken,
    #[error("session not found or revoked")]
    SessionNotFound,
    #[error("player not found")]
    PlayerNotFound,
    #[error("too many concurrent redemptions")]
    Busy,
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("failed to encode session data: {0}")]
    Decode(String),
}
