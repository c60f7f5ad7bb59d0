//! Shell-quoting helpers for strings interpolated into probe scripts.

use std::sync::LazyLock;

use regex::Regex;

static SAFE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._+\-/]+$").expect("valid regex"));

/// Whether a tool or path name is safe to interpolate at all. Names going
/// into container shells must pass this before quoting.
pub fn is_safe_name(name: &str) -> bool {
    SAFE_NAME.is_match(name)
}

/// Single-quote a string for POSIX sh: `'` becomes `'\''`.
pub fn single_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}
