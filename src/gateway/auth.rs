use axum::http::HeaderMap;

/// Caller credential: `Api-Key` header, else `Authorization: Bearer`.
///
/// The key is not checked here; it is forwarded to the completion service,
/// which decides.
pub fn request_api_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .or_else(|| bearer_token(headers))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub fn conversation_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("x-conversation-id")
        .and_then(|value| value.to_str().ok())
        .filter(|id| !id.is_empty())
}
