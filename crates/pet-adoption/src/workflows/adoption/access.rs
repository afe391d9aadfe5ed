//! Caller identity and role checks.
//!
//! Tokens are verified by the gateway in front of this service, which forwards
//! the authenticated user through the `x-user-id` and `x-user-role` headers.

use std::str::FromStr;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};

use super::domain::{AdoptionRequest, UserId};
use super::service::ProcessError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "adminFundacion")]
    FoundationAdmin,
    #[serde(rename = "adoptante")]
    Adopter,
}

impl Role {
    pub const fn code(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::FoundationAdmin => "adminFundacion",
            Role::Adopter => "adoptante",
        }
    }

    pub const fn is_staff(self) -> bool {
        matches!(self, Role::Admin | Role::FoundationAdmin)
    }
}

impl FromStr for Role {
    type Err = ProcessError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "admin" => Ok(Role::Admin),
            "adminFundacion" => Ok(Role::FoundationAdmin),
            "adoptante" => Ok(Role::Adopter),
            other => Err(ProcessError::Unauthenticated(format!(
                "unknown role '{other}'"
            ))),
        }
    }
}

/// Authenticated user issuing the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub role: Role,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: UserId(user_id.into()),
            role,
        }
    }

    pub fn require_staff(&self) -> Result<(), ProcessError> {
        if self.role.is_staff() {
            Ok(())
        } else {
            Err(ProcessError::Forbidden(format!(
                "role {} cannot perform this action",
                self.role.code()
            )))
        }
    }

    pub fn require_role(&self, role: Role) -> Result<(), ProcessError> {
        if self.role == role {
            Ok(())
        } else {
            Err(ProcessError::Forbidden(format!(
                "only {} may perform this action",
                role.code()
            )))
        }
    }

    /// Staff see every request; adopters only their own.
    pub fn can_view(&self, request: &AdoptionRequest) -> bool {
        self.role.is_staff() || request.is_owned_by(&self.user_id)
    }

    pub fn ensure_can_view(&self, request: &AdoptionRequest) -> Result<(), ProcessError> {
        if self.can_view(request) {
            Ok(())
        } else {
            Err(ProcessError::Forbidden(
                "this adoption process belongs to another adopter".to_string(),
            ))
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ProcessError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let user_id = header(USER_ID_HEADER)
            .ok_or_else(|| ProcessError::Unauthenticated("missing user id".to_string()))?;
        let role = header(USER_ROLE_HEADER)
            .ok_or_else(|| ProcessError::Unauthenticated("missing user role".to_string()))?
            .parse::<Role>()?;

        Ok(Caller::new(user_id, role))
    }
}
