//! Route handlers. Each takes the shared [`powermason_core::ProjectService`]
//! and the authenticated [`powermason_core::principal::Principal`] as
//! extensions.

pub mod budgets;
pub mod costs;
pub mod health;
pub mod progress;
pub mod projects;
pub mod scopes;
pub mod staging;
pub mod tasks;
pub mod users;

/// Query-string booleans: `1`, `true` and `yes` are true.
pub(crate) fn truthy(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::truthy;

    #[test]
    fn truthy_flags() {
        assert!(truthy(Some("1")));
        assert!(truthy(Some("true")));
        assert!(!truthy(Some("0")));
        assert!(!truthy(None));
    }
}
