use std::convert::Infallible;

use warp::Filter;

use crate::constants::SESSION_COOKIE;

use super::jwt::{verify_jwt_session, SessionData, SessionKey};

/// Extracts the actor of a request. A missing, forged or expired session
/// cookie yields the anonymous actor instead of a rejection, so each
/// operation decides for itself whether it needs a user.
pub fn with_actor(
    key: SessionKey,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Infallible> + Clone {
    warp::cookie::optional::<String>(SESSION_COOKIE).map(move |session: Option<String>| {
        session
            .and_then(|token| verify_jwt_session(&token, &key).ok())
            .map(|data| -> SessionData { data.into() })
    })
}
