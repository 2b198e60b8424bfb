//! RPHUD Engine library.
//!
//! ## Structure
//!
//! - `use_cases/` - Player, character, handoff and HUD operations
//! - `infrastructure/` - Query layer, config, assets, sessions and callbacks
//! - `api/` - HTTP entry points
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod use_cases;

pub use app::App;
