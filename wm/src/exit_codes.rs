//! Stable exit codes for `wm` commands.

/// Command succeeded; for `wm can-exit`, the session may stop.
pub const OK: i32 = 0;
/// `wm can-exit` found reasons the session may not stop.
pub const BLOCKED: i32 = 1;
/// Invalid input or state: bad session id, malformed state, unknown mode, I/O failure.
pub const INVALID: i32 = 2;
