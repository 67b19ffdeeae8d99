//! Pure, deterministic controller logic. No I/O.

pub mod exit;
pub mod history;
pub mod modes;
pub mod settings;
pub mod tasks;
pub mod test_patterns;
pub mod types;
