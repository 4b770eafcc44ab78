use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use uuid::Uuid;

use crate::auth::hash_access_token;
use crate::error::ApiError;
use crate::models::AppState;
use crate::store::StoreError;

/*
Roles (clinic user table):
0 patient
1 admin
2 manager
3 doctor
4 receptionist
*/

#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: i16,
}

impl AuthContext {
    pub fn is_patient(&self) -> bool {
        self.role == 0
    }

    pub fn is_admin_or_manager(&self) -> bool {
        self.role == 1 || self.role == 2
    }

    /// Admin, manager, receptionist.
    pub fn is_front_desk(&self) -> bool {
        self.is_admin_or_manager() || self.role == 4
    }
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            // Extract Authorization: Bearer <token>
            let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
                TypedHeader::from_request_parts(parts, state)
                    .await
                    .map_err(|_| ApiError::session_expired())?;

            let token_hash = hash_access_token(authz.token());

            let unavailable =
                || ApiError::Unavailable("UNAVAILABLE", "Sessions are temporarily unavailable, retry shortly".into());
            let lookup = tokio::time::timeout(state.store_timeout, state.sessions.resolve_session(&token_hash));
            let principal = match lookup.await {
                Ok(Ok(Some(principal))) => principal,
                Ok(Ok(None)) => return Err(ApiError::session_expired()),
                Ok(Err(StoreError::Unavailable(e))) => {
                    tracing::warn!("session store unavailable: {e}");
                    return Err(unavailable());
                }
                Ok(Err(e)) => {
                    tracing::error!("session lookup failed: {e}");
                    return Err(ApiError::Internal("session lookup failed".into()));
                }
                Err(_) => {
                    tracing::warn!(timeout_ms = state.store_timeout.as_millis() as u64, "session lookup timed out");
                    return Err(unavailable());
                }
            };

            Ok(AuthContext {
                user_id: principal.user_id,
                role: principal.role,
            })
        }
    }
}
