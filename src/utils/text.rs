/// Formats a count together with a noun, e.g. `1 commit` or `3 commits`.
pub fn format_count(count: i64, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}
