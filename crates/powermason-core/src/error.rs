use thiserror::Error;

#[derive(Debug, Error)]
pub enum PowermasonError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PowermasonError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Unauthorized(_) => 403,
            Self::Conflict(_) => 409,
            Self::Validation(_) => 400,
            Self::Internal(_) => 500,
        }
    }

    pub fn not_found(kind: &str, id: i64) -> Self {
        Self::NotFound(format!("{kind} {id}"))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, PowermasonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_covers_every_variant() {
        assert_eq!(PowermasonError::NotFound("x".into()).http_status(), 404);
        assert_eq!(PowermasonError::Unauthorized("x".into()).http_status(), 403);
        assert_eq!(PowermasonError::Conflict("x".into()).http_status(), 409);
        assert_eq!(PowermasonError::Validation("x".into()).http_status(), 400);
        assert_eq!(
            PowermasonError::Internal(anyhow::anyhow!("boom")).http_status(),
            500
        );
    }

    #[test]
    fn not_found_names_kind_and_id() {
        let e = PowermasonError::not_found("project", 7);
        assert_eq!(e.to_string(), "not found: project 7");
    }

    #[test]
    fn display_validation() {
        let e = PowermasonError::validation("Amount must be greater than zero.");
        assert_eq!(e.to_string(), "invalid input: Amount must be greater than zero.");
    }
}
