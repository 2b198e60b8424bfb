//! RPHUD domain: players, characters, canonical templates and dialog menus.
//!
//! Everything here is synchronous and free of I/O.

pub mod common;
pub mod dialog;
pub mod entities;
pub mod error;
pub mod ids;
pub mod legacy;
pub mod template;

pub use entities::{CharacterSummary, HudSession, LaunchToken, Player, PlayerCharacter};

pub use error::DomainError;

// Re-export ID types
pub use ids::{CharacterId, CharacterRef, LegacyId, PlayerId, SessionId};

pub use dialog::{DialogButton, DialogMenu, MenuOption};
pub use legacy::{legacy_to_template, parse_legacy_string};
pub use template::{
    coerce_value, populate_and_order_fields, reconcile, Reconciled, Template, TemplateKind,
    TemplateSet, DISCRIMINATOR,
};
