use axum::http::{HeaderMap, header::AUTHORIZATION};
use axum_extra::extract::CookieJar;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::jwt,
};

/// Cookie the auth provider's web SDK stores the access token in.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Resolve the calling account from the auth provider's access token.
///
/// The bearer header wins over the cookie. Any account id sent in a request
/// body is ignored.
pub fn current_account(
    app_state: &AppState,
    headers: &HeaderMap,
    cookies: &CookieJar,
) -> AppResult<Uuid> {
    let token = bearer_token(headers)
        .or_else(|| cookies.get(ACCESS_TOKEN_COOKIE).map(|c| c.value().to_string()))
        .ok_or(AppError::Unauthenticated)?;

    let claims = jwt::verify_access_token(
        &token,
        &app_state.config.jwt_secret,
        app_state.config.jwt_audience.as_deref(),
    )?;
    claims.account_id()
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}
