pub mod completions;
pub mod replicate;

use console::Style;
use imgrelay_core::TagState;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_PREREQ_MISSING: u8 = 3;

/// Prefix of every error message that maps to [`EXIT_CONFIG_ERROR`].
pub const CONFIG_ERROR_PREFIX: &str = "configuration error:";

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn colorize_state(state: TagState) -> String {
    let text = state.to_string();
    match state {
        TagState::Pushed => Style::new().green().apply_to(text).to_string(),
        TagState::Skipped => Style::new().dim().apply_to(text).to_string(),
        TagState::Tagged => Style::new().yellow().apply_to(text).to_string(),
        TagState::Failed => Style::new().red().bold().apply_to(text).to_string(),
        TagState::Pending | TagState::Transferring => text,
    }
}

/// Exit code for an error message produced by a command.
pub fn exit_code_for(message: &str) -> u8 {
    if message.starts_with(CONFIG_ERROR_PREFIX) {
        EXIT_CONFIG_ERROR
    } else {
        EXIT_FAILURE
    }
}
