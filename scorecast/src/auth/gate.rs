use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::{instrument, trace};

use super::session::{self, Claims};
use crate::{AppState, config::Config, errors::Error};

/// An authenticated caller: valid bearer token *and* a known API key.
///
/// Use as the first extractor of a handler so unauthenticated requests are rejected before the
/// body is read.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Claims);

/// Extract the bearer token from the Authorization header
fn bearer_token(parts: &Parts) -> Result<&str, Error> {
    let header = parts
        .headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| Error::unauthenticated("missing Authorization header"))?;

    let value = header
        .to_str()
        .map_err(|e| Error::unauthenticated(format!("invalid Authorization header: {e}")))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| Error::unauthenticated("Authorization header is not a bearer token"))
}

/// Check the static API key header against the configured keys
fn check_api_key(parts: &Parts, config: &Config) -> Result<(), Error> {
    let presented = parts
        .headers
        .get(config.auth.api_key_header.as_str())
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| Error::unauthenticated("missing API key"))?;

    if config.auth.api_keys.iter().any(|key| !key.is_empty() && key == presented) {
        Ok(())
    } else {
        Err(Error::unauthenticated("unknown API key"))
    }
}

/// Run both checks. Either failing rejects the request.
pub fn authenticate(parts: &Parts, config: &Config) -> Result<Claims, Error> {
    let token = bearer_token(parts)?;
    let claims = session::verify_token(token, config)?;
    check_api_key(parts, config)?;
    Ok(claims)
}

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = Error;

    #[instrument(skip_all)]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = authenticate(parts, &state.config)?;
        trace!(subject = %claims.sub, "Authenticated caller");
        Ok(Authenticated(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_API_KEY, create_test_config};
    use axum::http::Request;

    fn parts(headers: &[(&str, String)]) -> Parts {
        let mut builder = Request::builder().uri("/predict");
        for (name, value) in headers {
            builder = builder.header(*name, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_valid_token_and_key() {
        let config = create_test_config();
        let token = session::create_token("grader", &config).unwrap();

        let parts = parts(&[
            ("authorization", format!("Bearer {token}")),
            ("x-api-key", TEST_API_KEY.to_string()),
        ]);

        let claims = authenticate(&parts, &config).unwrap();
        assert_eq!(claims.sub, "grader");
    }

    #[test]
    fn test_missing_token() {
        let config = create_test_config();
        let parts = parts(&[("x-api-key", TEST_API_KEY.to_string())]);

        assert!(matches!(authenticate(&parts, &config), Err(Error::Unauthenticated { .. })));
    }

    #[test]
    fn test_non_bearer_scheme() {
        let config = create_test_config();
        let token = session::create_token("grader", &config).unwrap();
        let parts = parts(&[
            ("authorization", format!("Basic {token}")),
            ("x-api-key", TEST_API_KEY.to_string()),
        ]);

        assert!(matches!(authenticate(&parts, &config), Err(Error::Unauthenticated { .. })));
    }

    #[test]
    fn test_valid_token_wrong_api_key() {
        let config = create_test_config();
        let token = session::create_token("grader", &config).unwrap();
        let parts = parts(&[
            ("authorization", format!("Bearer {token}")),
            ("x-api-key", "wrong-key".to_string()),
        ]);

        assert!(matches!(authenticate(&parts, &config), Err(Error::Unauthenticated { .. })));
    }

    #[test]
    fn test_valid_token_missing_api_key() {
        let config = create_test_config();
        let token = session::create_token("grader", &config).unwrap();
        let parts = parts(&[("authorization", format!("Bearer {token}"))]);

        assert!(matches!(authenticate(&parts, &config), Err(Error::Unauthenticated { .. })));
    }

    #[test]
    fn test_custom_api_key_header() {
        let mut config = create_test_config();
        config.auth.api_key_header = "x-scorecast-key".to_string();
        let token = session::create_token("grader", &config).unwrap();

        let default_header = parts(&[
            ("authorization", format!("Bearer {token}")),
            ("x-api-key", TEST_API_KEY.to_string()),
        ]);
        assert!(authenticate(&default_header, &config).is_err());

        let custom_header = parts(&[
            ("authorization", format!("Bearer {token}")),
            ("x-scorecast-key", TEST_API_KEY.to_string()),
        ]);
        assert!(authenticate(&custom_header, &config).is_ok());
    }
}
