use chrono::Duration;
use chrono::Local;
use hmac::{Hmac, Mac};
use jwt::SignWithKey;
use jwt::VerifyWithKey;
use log::debug;
use serde::Deserialize;
use serde::Serialize;
use sha2::Sha256;

use crate::error::ApiError;
use crate::schema::{User, UserRole, Uuid};

use super::permissions::ActionType;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JwtSessionData {
    pub user_id: Uuid,
    pub username: String,
    pub role: UserRole,
    iat: i64,
    exp: i64,
}

impl JwtSessionData {
    pub fn new(id: Uuid, username: String, role: UserRole, lifetime: Duration) -> Self {
        let now = Local::now();
        let iat = now.timestamp();
        let exp = (now + lifetime).timestamp();

        Self {
            user_id: id,
            username,
            role,
            iat,
            exp,
        }
    }
}

/// The identity a request acts as.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionData {
    pub user_id: Uuid,
    pub username: String,
    pub role: UserRole,
}

impl SessionData {
    pub fn authenticate(&self, action: ActionType) -> Result<(), ApiError> {
        if !action.authenticate(self) {
            return Err(ApiError::PermissionDenied(String::from(
                "You don't have permission to perform this action",
            )));
        }
        Ok(())
    }
}

impl From<JwtSessionData> for SessionData {
    fn from(value: JwtSessionData) -> Self {
        SessionData {
            user_id: value.user_id,
            username: value.username,
            role: value.role,
        }
    }
}

/// HS256 key shared with the identity service that issues tokens.
#[derive(Clone)]
pub struct SessionKey {
    key: Hmac<Sha256>,
    lifetime: Duration,
}

impl SessionKey {
    pub fn new(secret: &str, lifetime_hours: i64) -> Result<Self, ApiError> {
        let key = Hmac::new_from_slice(secret.as_bytes())
            .map_err(|e| ApiError::Internal(format!("Invalid session key: {e}")))?;

        Ok(Self {
            key,
            lifetime: Duration::hours(lifetime_hours),
        })
    }

    pub fn issue(&self, user: &User) -> Result<String, ApiError> {
        let claims = JwtSessionData::new(user.id, user.username.to_owned(), user.role, self.lifetime);

        self.sign(&claims)
    }

    fn sign(&self, claims: &JwtSessionData) -> Result<String, ApiError> {
        claims
            .sign_with_key(&self.key)
            .map_err(|e| ApiError::Internal(format!("Failed to sign session: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<JwtSessionData, ApiError> {
        let session: JwtSessionData = token.verify_with_key(&self.key).map_err(|e| {
            debug!("Rejected session token: {e}");
            ApiError::Unauthorized(String::from("Invalid session; Invalid token"))
        })?;

        let now = Local::now().timestamp();
        if (session.exp - now).is_negative() {
            return Err(ApiError::Unauthorized(String::from(
                "Invalid session; Token expired",
            )));
        }

        Ok(session)
    }
}
