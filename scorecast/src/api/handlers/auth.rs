use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};

use crate::{
    AppState,
    api::models::auth::{TokenRequest, TokenResponse},
    auth::{password, session},
    errors::{Error, Result},
};

/// Exchange username and password for an access token
#[utoipa::path(
    post,
    path = "/auth/token",
    request_body = TokenRequest,
    tag = "authentication",
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Bad request - missing fields or malformed JSON"),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn issue_token(
    State(state): State<AppState>,
    request: std::result::Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>> {
    let Json(request) = request.map_err(|rejection| Error::BadRequest {
        message: rejection.body_text(),
    })?;

    let user = state.config.auth.users.iter().find(|user| user.username == request.username);

    // Unknown users still pay for an Argon2 hash; verification runs off the async runtime
    let password = request.password;
    let hash = user.map(|user| user.password_hash.clone());
    let is_valid = tokio::task::spawn_blocking(move || password::verify_password_or_decoy(&password, hash.as_deref()))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })??;

    let user = match user {
        Some(user) if is_valid => user,
        Some(user) => return Err(Error::unauthenticated(format!("wrong password for {}", user.username))),
        None => return Err(Error::unauthenticated(format!("unknown user {}", request.username))),
    };

    let token = session::create_token(&user.username, &state.config)?;
    tracing::info!(subject = %user.username, "Issued access token");

    Ok(Json(TokenResponse::bearer(token, state.config.auth.jwt_expiry.as_secs())))
}
