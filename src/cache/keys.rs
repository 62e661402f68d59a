//! Cache key templates. Everything cached for a user lives under
//! `todos:{user_id}:`, so a single pattern clears it.

pub fn todo_list(user_id: i64) -> String {
    format!("todos:{user_id}:all")
}

pub fn user_pattern(user_id: i64) -> String {
    format!("todos:{user_id}:*")
}

/// Glob match supporting one trailing `*`, which is all the local backend
/// needs to mirror Redis `MATCH` for [`user_pattern`].
pub fn matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => pattern == key,
    }
}
