//! Repositories over the registry database
//!
//! Thin query wrappers; each returns `aedpics_common::Result` and leaves
//! permission checks to the handlers.

pub mod audit;
pub mod auth_sessions;
pub mod dashboard;
pub mod devices;
pub mod inspections;
pub mod notifications;
pub mod organizations;
pub mod push;
pub mod schedules;
pub mod sessions;
pub mod targets;
pub mod users;

/// Escape `%`, `_` and `\` for a `LIKE ? ESCAPE '\'` pattern
pub(crate) fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("SN-1"), "SN-1");
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }
}
