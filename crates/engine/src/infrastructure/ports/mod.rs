//! Port traits for infrastructure boundaries.
//!
//! Ports exist for:
//! - Outbound callbacks to in-world objects (could swap HTTP -> queue)
//! - Server-side session storage (could swap memory -> database)
//! - Clock (for testing)
//!
//! Database access goes through the concrete query layer.

mod external;
mod session;
mod testing;

pub use external::{CallbackPort, CallbackRequest};
pub use session::{SessionData, SessionStore};
pub use testing::ClockPort;

#[cfg(test)]
pub use external::MockCallbackPort;
#[cfg(test)]
pub use testing::MockClockPort;
