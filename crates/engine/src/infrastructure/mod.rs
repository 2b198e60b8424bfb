//! Infrastructure implementations.
//!
//! Contains the query layer, configuration, assets and port implementations.

pub mod assets;
pub mod callback;
pub mod clock;
pub mod config;
pub mod database;
pub mod ports;
pub mod session;
