//! Use cases - user-story orchestration.
//!
//! Each use case takes the per-request [`Database`](crate::infrastructure::database::Database)
//! handle explicitly and owns its transaction boundaries.

pub mod character;
pub mod handoff;
pub mod hud;
pub mod identity;

// Re-export commonly used types
pub use character::{CharacterAssets, CharacterError, CharacterUseCases, CharacterView};
pub use handoff::{HandoffError, RedeemLaunchToken};
pub use hud::{HudError, RegisterHud};
pub use identity::IdentityUseCases;
