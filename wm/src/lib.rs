//! Session-lifecycle controller for AI coding agents.
//!
//! `wm` tracks which workflow mode a session is in, persists per-session
//! state, and answers the host runtime's lifecycle hooks (session start,
//! prompt submit, tool use, task completion, stop). The architecture keeps a
//! strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (data model, tier merge, task
//!   dependencies, the exit validator). No I/O.
//! - **[`io`]**: Side-effecting adapters (stores, git, subprocesses, stdin,
//!   templates).
//!
//! [`hooks`], [`exit_check`], and [`lifecycle`] coordinate the two to
//! implement hook events and CLI commands.

pub mod core;
pub mod exit_check;
pub mod exit_codes;
pub mod hooks;
pub mod io;
pub mod lifecycle;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod workspace;
