use std::sync::Arc;

use axum::{
    extract::State,
    http::{self, Request},
    middleware::Next,
    response::Response,
};

use crate::{error::ApiError, AppState};

// Rejects the request with 401 unless it carries a valid bearer token;
// on success the caller's identity is stored as a `CurrentUser` extension.
pub async fn mw_require_auth<B>(
    State(data): State<Arc<AppState>>,
    mut request: Request<B>,
    next: Next<B>,
) -> Result<Response, ApiError> {
    let auth_header = request
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Access token required"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Access token required"))?;

    let current_user = data.tokens.verify(token)?;
    request.extensions_mut().insert(current_user);

    Ok(next.run(request).await)
}
