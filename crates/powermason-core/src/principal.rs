use serde::{Deserialize, Serialize};

use crate::error::PowermasonError;
use crate::types::{Role, UserId};

/// The authenticated caller. Built by the server middleware from verified
/// token claims; core logic never sees raw tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
    pub email: Option<String>,
}

impl Principal {
    pub fn from_claims(claims: &TokenClaims) -> Result<Self, PowermasonError> {
        let user_id = claims
            .sub
            .as_deref()
            .ok_or_else(|| PowermasonError::Unauthorized("missing sub claim".into()))?
            .parse::<UserId>()
            .map_err(|_| PowermasonError::Unauthorized("sub claim is not a user id".into()))?;
        let role = claims
            .role
            .as_deref()
            .and_then(Role::parse)
            .ok_or_else(|| PowermasonError::Unauthorized("missing or unknown role claim".into()))?;
        Ok(Self {
            user_id,
            role,
            email: claims.email.clone(),
        })
    }

    /// Construct explicitly for in-process callers and tests.
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self {
            user_id,
            role,
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn is(&self, role: Role) -> bool {
        self.role == role
    }

    pub fn require_any(&self, roles: &[Role]) -> Result<(), PowermasonError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(PowermasonError::Unauthorized(format!(
                "role {} may not perform this action",
                self.role.label()
            )))
        }
    }
}

/// Claims carried by the HS256 bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: Option<String>,
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub exp: usize,
}
