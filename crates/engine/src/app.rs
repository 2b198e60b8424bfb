//! Application state and composition.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::infrastructure::config::AppConfig;
use crate::infrastructure::database::{ConnectionRegistry, Database};
use crate::infrastructure::ports::{CallbackPort, ClockPort, SessionStore};
use crate::use_cases;
use crate::use_cases::character::{
    CharacterAssets, CreateCharacter, ImportLegacyCharacters, ListCharacters, LoadCharacter,
    SelectCharacter, UpdateCharacterField,
};
use crate::use_cases::handoff::{HandoffSettings, RedeemLaunchToken, VerifyHudSession};
use crate::use_cases::hud::RegisterHud;
use crate::use_cases::identity::{CheckUserExists, LoadPlayer};

/// Main application state.
///
/// Built once at startup and passed to HTTP handlers via Axum state.
pub struct App {
    pub config: AppConfig,
    pub database: Arc<ConnectionRegistry>,
    pub sessions: Arc<dyn SessionStore>,
    pub use_cases: UseCases,
}

/// Container for all use cases.
pub struct UseCases {
    pub identity: use_cases::IdentityUseCases,
    pub handoff: Arc<RedeemLaunchToken>,
    pub verify_session: Arc<VerifyHudSession>,
    pub character: use_cases::CharacterUseCases,
    pub hud: Arc<RegisterHud>,
}

impl App {
    /// Create a new App with all dependencies wired up.
    pub fn new(
        config: AppConfig,
        database: Arc<ConnectionRegistry>,
        assets: CharacterAssets,
        sessions: Arc<dyn SessionStore>,
        callbacks: Arc<dyn CallbackPort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        let assets = Arc::new(assets);

        let identity = use_cases::IdentityUseCases::new(
            Arc::new(CheckUserExists::new(clock.clone())),
            Arc::new(LoadPlayer::new()),
        );

        let permits = Arc::new(Semaphore::new(
            config.handoff.max_concurrent_redemptions.max(1),
        ));
        let verify_session = Arc::new(VerifyHudSession::new(clock.clone()));
        let handoff = Arc::new(RedeemLaunchToken::new(
            sessions.clone(),
            clock,
            permits,
            HandoffSettings::from_config(&config),
        ));

        // Load is shared by every use case that returns a reconciled character.
        let load = Arc::new(LoadCharacter::new(assets.clone()));
        let character = use_cases::CharacterUseCases::new(
            Arc::new(CreateCharacter::new(assets.clone(), load.clone())),
            load.clone(),
            Arc::new(ListCharacters::new()),
            Arc::new(SelectCharacter::new(load.clone(), callbacks.clone())),
            Arc::new(UpdateCharacterField::new(assets.clone(), load)),
            Arc::new(ImportLegacyCharacters::new(assets)),
        );

        let hud = Arc::new(RegisterHud::new(callbacks));

        Self {
            config,
            database,
            sessions,
            use_cases: UseCases {
                identity,
                handoff,
                verify_session,
                character,
                hud,
            },
        }
    }

    /// A fresh per-request database handle.
    pub fn database(&self) -> Database {
        self.database.database()
    }
}
