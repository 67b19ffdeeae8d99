//! Mode state machine over `currentMode` and the append-only `modeHistory`.
//!
//! States are the configured mode names plus `default`. The only transition is
//! [`enter_mode`]; the queries below read history to test invariants.

use chrono::{DateTime, Utc};

use crate::core::types::{DEFAULT_MODE, ModeEntry, SessionState};

/// Transition `state` into `mode` at `now`.
///
/// Appends to history, moves `currentMode`, and records the mode as the
/// session type. Re-entering the current mode still appends an entry.
pub fn enter_mode(state: &mut SessionState, mode: &str, now: DateTime<Utc>) {
    state.mode_history.push(ModeEntry {
        mode: mode.to_string(),
        entered_at: now,
    });
    state.current_mode = mode.to_string();
    state.session_type = mode.to_string();
}

/// True if `mode` appears anywhere in history.
pub fn visited(history: &[ModeEntry], mode: &str) -> bool {
    history.iter().any(|entry| entry.mode == mode)
}

/// True if `mode` was entered and, from its first entry on, only `mode` or
/// `default` appear.
pub fn stayed_in(history: &[ModeEntry], mode: &str) -> bool {
    let Some(first) = history.iter().position(|entry| entry.mode == mode) else {
        return false;
    };
    history[first..]
        .iter()
        .all(|entry| entry.mode == mode || entry.mode == DEFAULT_MODE)
}

/// Modes in the order they were first entered.
pub fn visited_modes(history: &[ModeEntry]) -> Vec<&str> {
    let mut seen: Vec<&str> = Vec::new();
    for entry in history {
        if !seen.contains(&entry.mode.as_str()) {
            seen.push(entry.mode.as_str());
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn history(modes: &[&str]) -> Vec<ModeEntry> {
        modes
            .iter()
            .enumerate()
            .map(|(i, mode)| ModeEntry {
                mode: mode.to_string(),
                entered_at: Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap(),
            })
            .collect()
    }

    #[test]
    fn enter_mode_appends_in_order() {
        let mut state = SessionState::new("sid");
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        enter_mode(&mut state, "planning", t0);
        enter_mode(&mut state, "implementation", t0 + chrono::Duration::seconds(5));
        assert_eq!(state.current_mode, "implementation");
        assert_eq!(state.session_type, "implementation");
        let modes: Vec<&str> = state.mode_history.iter().map(|e| e.mode.as_str()).collect();
        assert_eq!(modes, vec!["planning", "implementation"]);
    }

    #[test]
    fn stayed_in_allows_default_interludes() {
        assert!(stayed_in(&history(&["planning", "impl", "default", "impl"]), "impl"));
        assert!(!stayed_in(&history(&["impl", "research", "impl"]), "impl"));
        assert!(!stayed_in(&history(&["planning"]), "impl"));
    }

    #[test]
    fn visited_checks_anywhere_in_history() {
        let h = history(&["planning", "impl", "planning"]);
        assert!(visited(&h, "impl"));
        assert!(!visited(&h, "research"));
        assert_eq!(visited_modes(&h), vec!["planning", "impl"]);
    }
}
