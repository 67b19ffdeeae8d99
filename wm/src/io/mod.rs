//! Side-effecting adapters: filesystem stores, git, subprocesses, stdin, templates.

pub mod config;
pub mod evidence;
pub mod git;
pub mod guidance;
pub mod paths;
pub mod process;
pub mod session_store;
pub mod signals;
pub mod stdin;
pub mod task_store;
pub mod verify;
