//! Tag and file name helpers

use std::sync::OnceLock;

use chrono::{DateTime, Local};
use regex::Regex;

/// Prefix of generated tag names
pub const TAG_PREFIX: &str = "gsb";

/// Generate a tag name for a backup taken at `now` that is not in `existing`
///
/// Format: `gsbYYYY.MM.DD+HHMMSS`, with `-2`, `-3`, ... appended on collision
pub fn generate_tag_name(now: DateTime<Local>, existing: &[String]) -> String {
    let base = format!("{}{}", TAG_PREFIX, now.format("%Y.%m.%d+%H%M%S"));
    if !existing.contains(&base) {
        return base;
    }

    (2..)
        .map(|suffix| format!("{}-{}", base, suffix))
        .find(|candidate| !existing.contains(candidate))
        .unwrap_or(base)
}

fn forbidden_sequences() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\.\.|@\{|//|\.lock$|\.lock/|/\.|^\.|^/|/$|\.$)").ok())
        .as_ref()
}

/// Check that `name` can be used as a git tag
///
/// Mirrors the rules of `git check-ref-format`: no whitespace or control
/// characters, none of `~^:?*[\`, no `..`, `@{`, `//`, no leading `.` or `/`,
/// no trailing `/` `.` or `.lock`, and not `@` on its own.
pub fn validate_tag_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Tag names must not be empty".to_string());
    }
    if name == "@" {
        return Err("\"@\" is not a valid tag name".to_string());
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || "~^:?*[\\".contains(*c))
    {
        return Err(format!("Tag name {:?} may not contain {:?}", name, c));
    }
    if forbidden_sequences().is_some_and(|re| re.is_match(name)) {
        return Err(format!("{:?} is not a valid tag name", name));
    }
    Ok(())
}

/// Make `input` safe to use as part of a file name
///
/// Anything but ASCII alphanumerics, `-`, `_` and `.` becomes `_`.
pub fn sanitize_filename(input: &str) -> String {
    let sanitized: String = input
        .trim()
        .chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() || c == '-' || c == '.' => c,
            _ => '_',
        })
        .collect();
    let sanitized = sanitized.trim_matches(|c| c == '_' || c == '.');
    if sanitized.is_empty() {
        "save".to_string()
    } else {
        sanitized.to_string()
    }
}
