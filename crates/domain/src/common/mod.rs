//! Common utility functions shared across the domain and engine crates.
//!
//! Pure functions only: no side effects, no I/O.

pub mod datetime;
pub mod string;

pub use datetime::{parse_pst_timestamp, pst_timestamp, pst_timestamp_after, TIMESTAMP_FORMAT};
pub use string::{
    collapse_whitespace, none_if_blank, sanitize_label, sanitize_token, MAX_LABEL_CHARS,
};
