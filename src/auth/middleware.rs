use axum::{
    extract::{Query, Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::Response,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Shared-token guard for every file route.
///
/// A request passes with `Authorization: Bearer <token>` or `?token=<token>`.
#[derive(Debug, Clone)]
pub struct TokenAuth {
    token: String,
}

impl TokenAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }

    pub fn verify(&self, candidate: &str) -> bool {
        !candidate.is_empty() && candidate == self.token
    }

    pub async fn require_token(
        State(auth): State<Arc<Self>>,
        request: Request,
        next: Next,
    ) -> Result<Response, StatusCode> {
        debug!(
            "Incoming request: {} {} agent {}",
            request.method(),
            request.uri().path(),
            request
                .headers()
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
        );

        let from_header = Self::bearer_token(&request).is_some_and(|t| auth.verify(&t));
        let from_query = Self::query_token(&request).is_some_and(|t| auth.verify(&t));

        if !from_header && !from_query {
            warn!("Unauthorized [{}]: path={}", request.method(), request.uri().path());
            return Err(StatusCode::UNAUTHORIZED);
        }

        Ok(next.run(request).await)
    }

    fn bearer_token(request: &Request) -> Option<String> {
        let header = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
        let token = header.strip_prefix("Bearer ")?;

        // Reject anything that could not be a sane header token
        if token.is_empty() || token.len() > 4096 || token.contains(['\0', '\n', '\r']) {
            return None;
        }
        Some(token.to_string())
    }

    fn query_token(request: &Request) -> Option<String> {
        let Query(params) = Query::<HashMap<String, String>>::try_from_uri(request.uri()).ok()?;
        params.get("token").cloned()
    }
}
