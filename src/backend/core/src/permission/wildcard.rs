//! `*` wildcard matching for permission strings.
//!
//! `*` matches any run of characters, including none. There is no other
//! metacharacter, so a pattern without `*` only matches itself.

/// Whether `value` matches `pattern`.
///
/// ```rust,ignore
/// assert!(simple_match("sys:user:*", "sys:user:add"));
/// assert!(simple_match("*:query", "sys:role:query"));
/// assert!(!simple_match("sys:user:*", "sys:role:add"));
/// ```
pub fn simple_match(pattern: &str, value: &str) -> bool {
    let Some(first) = pattern.find('*') else {
        return pattern == value;
    };

    if first == 0 {
        if pattern.len() == 1 {
            return true;
        }
        let rest = &pattern[1..];
        let Some(next) = rest.find('*') else {
            return value.ends_with(rest);
        };
        let part = &rest[..next];
        let tail = &rest[next..];
        if part.is_empty() {
            return simple_match(tail, value);
        }
        return value
            .char_indices()
            .filter(|(i, _)| value[*i..].starts_with(part))
            .any(|(i, _)| simple_match(tail, &value[i + part.len()..]));
    }

    match value.get(..first) {
        Some(head) if head == &pattern[..first] => simple_match(&pattern[first..], &value[first..]),
        _ => false,
    }
}

/// Whether any of `granted` matches `required`.
pub fn any_match<'a, I>(granted: I, required: &str) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    granted.into_iter().any(|p| simple_match(p, required))
}
