//! API layer - HTTP entry points.
//!
//! - `auth` - in-world identity headers and request signatures
//! - `modules` - `/api` command dispatch
//! - `hud` - web HUD launch and interface
//! - `http` - router assembly

pub mod auth;
pub mod error;
pub mod http;
pub mod hud;
pub mod modules;

pub use error::ApiError;
pub use http::routes;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use crate::app::App;
    use crate::infrastructure::clock::FrozenClock;
    use crate::infrastructure::config::AppConfig;
    use crate::infrastructure::database::testing::temp_registry;
    use crate::infrastructure::ports::MockCallbackPort;
    use crate::infrastructure::session::InMemorySessionStore;
    use crate::use_cases::character::testing::assets;

    pub const TEST_SECRET: &str = "test-secret";

    /// An app over a temp database, frozen clock and always-answering callbacks.
    pub async fn test_app() -> (tempfile::TempDir, Arc<App>) {
        let (dir, registry) = temp_registry().await;
        let config = AppConfig::from_lookup(|key| match key {
            "RPHUD_SHARED_SECRET" => Some(TEST_SECRET.to_string()),
            _ => None,
        })
        .unwrap();

        let clock = Arc::new(FrozenClock::at(2024, 1, 15, 10, 30));
        let sessions = Arc::new(InMemorySessionStore::new(config.session_ttl(), clock.clone()));
        let mut callbacks = MockCallbackPort::new();
        callbacks.expect_deliver().returning(|_| true);

        let app = App::new(
            config,
            registry,
            (*assets()).clone(),
            sessions,
            Arc::new(callbacks),
            clock,
        );
        (dir, Arc::new(app))
    }
}
