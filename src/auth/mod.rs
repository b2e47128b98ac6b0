pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    permissions::{Permissions, Role},
    state::AppState,
    tenant::TenantContext,
};

use self::jwt::SessionSubject;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
    pub company_id: Uuid,
    pub current_company_id: Uuid,
    pub god_mode: bool,
}

impl AuthenticatedUser {
    pub fn tenant(&self) -> TenantContext {
        TenantContext::from(self)
    }

    pub fn permissions(&self) -> Permissions {
        Permissions::for_role(self.role)
    }

    pub fn subject(&self) -> SessionSubject {
        SessionSubject {
            user_id: self.user_id,
            role: self.role,
            company_id: self.company_id,
            current_company_id: self.current_company_id,
            god_mode: self.god_mode,
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::unauthorized())?;

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
            company_id: claims.company_id,
            current_company_id: claims.current_company_id,
            god_mode: claims.god_mode,
        })
    }
}
