//! Subject syntax: dot-separated tokens; `*` matches one token, `>` matches the rest.

/// Checks that `subject` is non-empty, has no empty tokens or whitespace and,
/// if `wildcards` is set, uses `*`/`>` only as whole tokens (`>` last).
pub(crate) fn is_valid(subject: &str, wildcards: bool) -> bool {
    if subject.is_empty() || subject.chars().any(char::is_whitespace) {
        return false;
    }
    let tokens: Vec<&str> = subject.split('.').collect();
    let last = tokens.len() - 1;
    tokens.iter().enumerate().all(|(i, tok)| match *tok {
        "" => false,
        "*" => wildcards,
        ">" => wildcards && i == last,
        t => !t.contains('*') && !t.contains('>'),
    })
}

/// Returns true if the concrete `subject` is selected by `pattern`.
pub(crate) fn matches(pattern: &str, subject: &str) -> bool {
    let mut pat = pattern.split('.');
    let mut sub = subject.split('.');
    loop {
        match (pat.next(), sub.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
