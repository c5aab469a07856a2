use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::VerifyWithKey;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::constants::SESSION_LIFETIME_HOURS;
use crate::error::ServiceError;
use crate::schema::{Id, UserRole};

use super::permissions::ActionType;

pub type SessionKey = Hmac<Sha256>;

/// Claims carried by the `session` cookie. Tokens are issued by the
/// authentication service; this crate only verifies them.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Id, username: String, role: UserRole) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = (now + Duration::hours(SESSION_LIFETIME_HOURS)).timestamp();

        Self {
            user_id: id,
            username,
            role,
            iat,
            exp,
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        (self.exp - now).is_negative()
    }
}

/// The authenticated actor of a request.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
    pub is_admin: bool,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), ServiceError> {
        if !action.authenticate(self) {
            return Err(ServiceError::Forbidden);
        }
        Ok(())
    }
}

impl Into<SessionData> for JwtSessionData {
    fn into(self) -> SessionData {
        SessionData {
            username: self.username,
            user_id: self.user_id,
            is_admin: self.role == UserRole::Admin,
            role: self.role,
        }
    }
}

pub fn session_key(secret: &str) -> Result<SessionKey, ServiceError> {
    Hmac::new_from_slice(secret.as_bytes())
        .map_err(|e| ServiceError::Internal(format!("Invalid session secret: {e}")))
}

pub fn verify_jwt_session(token: &str, key: &SessionKey) -> Result<JwtSessionData, ServiceError> {
    let session: JwtSessionData = token.verify_with_key(key).map_err(|e| {
        log::trace!("> Rejected session token: {e}");
        ServiceError::Unauthorized
    })?;

    if session.is_expired(Local::now().timestamp()) {
        log::trace!("> Rejected expired session of {}", session.username);
        return Err(ServiceError::Unauthorized);
    }

    Ok(session)
}
