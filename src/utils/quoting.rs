//! Host-OS argument quoting.
//!
//! POSIX hosts hand arguments to the child verbatim (the exec family takes
//! an argv, not a command line). Windows child processes re-parse a single
//! command line, so values containing spaces or double quotes must be
//! wrapped. Both shapes are exported as pure functions so the Windows rules
//! stay testable on any host.

/// True when the value is already wrapped in matching single or double
/// quotes; such values pass through unchanged.
fn is_already_quoted(value: &str) -> bool {
    (value.starts_with('"') && value.ends_with('"') && value.len() >= 2)
        || (value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2)
}

/// Windows quoting: wrap in double quotes when the value contains spaces or
/// double quotes, escaping internal `"` to `\"`.
pub fn quote_for_exec_windows(value: &str) -> String {
    if is_already_quoted(value) {
        return value.to_string();
    }
    if value.contains(' ') || value.contains('"') {
        return format!("\"{}\"", value.replace('"', "\\\""));
    }
    value.to_string()
}

/// POSIX quoting: arguments are passed verbatim.
pub fn quote_for_exec_posix(value: &str) -> String {
    value.to_string()
}

/// Applies the current host's quoting convention.
pub fn quote_for_exec(value: &str) -> String {
    #[cfg(windows)]
    {
        quote_for_exec_windows(value)
    }
    #[cfg(not(windows))]
    {
        quote_for_exec_posix(value)
    }
}
