//! JQL used to list the items a user works on.

/// Query used when none is configured.
pub const DEFAULT_JQL: &str =
    "sprint in openSprints() AND assignee = currentUser() AND statusCategory != Done";

/// Statuses listed when no status filter is configured.
pub const DEFAULT_STATUS_FILTERS: &[&str] = &[
    "In Progress",
    "Blocked",
    "Need Reqs",
    "Code Review",
    "Testing",
    "QA",
];

/// Status filter value that turns the filter off.
pub const ANY_STATUS: &str = "any";

/// Build the search query from an optional base query and status filter.
///
/// A blank base falls back to [`DEFAULT_JQL`]. When statuses are given the
/// base is parenthesised and narrowed with `status IN (...)`; a list
/// containing [`ANY_STATUS`] leaves the base unfiltered.
pub fn build_jql(base: Option<&str>, statuses: &[String]) -> String {
    let base = base
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or(DEFAULT_JQL);

    if statuses.iter().any(|s| s.trim().eq_ignore_ascii_case(ANY_STATUS)) {
        return base.to_string();
    }

    let statuses: Vec<String> = statuses
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(quote)
        .collect();

    if statuses.is_empty() {
        base.to_string()
    } else {
        format!("({base}) AND status IN ({})", statuses.join(", "))
    }
}

/// Double-quote a JQL string literal.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
