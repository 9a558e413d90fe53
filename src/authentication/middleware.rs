use log::debug;
use warp::{reject::Rejection, Filter};

use crate::error::ApiError;

use super::jwt::{SessionData, SessionKey};

/// Extracts the token from `Authorization: Token <jwt>` or `Bearer <jwt>`.
pub fn parse_authorization(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();

    match scheme {
        "Token" | "Bearer" if !token.is_empty() => Some(token),
        _ => None,
    }
}

pub fn with_session(
    key: SessionKey,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let key = key.clone();
        async move {
            let token = header
                .as_deref()
                .and_then(parse_authorization)
                .ok_or_else(|| {
                    ApiError::Unauthorized(String::from("Authentication credentials were not provided"))
                })?;

            key.verify(token)
                .map(SessionData::from)
                .map_err(Rejection::from)
        }
    })
}

pub fn with_possible_session(
    key: SessionKey,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").map(move |header: Option<String>| {
        let token = header.as_deref().and_then(parse_authorization)?;

        match key.verify(token) {
            Ok(data) => Some(data.into()),
            Err(e) => {
                debug!("Treating request as anonymous: {e}");
                None
            }
        }
    })
}
