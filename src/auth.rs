use axum::{
    extract::{Request, State},
    http::{StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::constants::ERR_UNAUTHORIZED;

/// Guards every non-public route with `Authorization: Bearer <API_TOKEN>`.
pub async fn require_api_token(
    State(app_state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, String)> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or("");

    if token.is_empty() || token != app_state.config.api_token {
        return Err((StatusCode::UNAUTHORIZED, ERR_UNAUTHORIZED.to_string()));
    }

    Ok(next.run(request).await)
}
