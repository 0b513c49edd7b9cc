use std::borrow::Cow;

const MAX_ERROR_BODY_CHARS: usize = 200;
const REDACTED: &str = "[REDACTED]";

/// Markers whose following token is a credential.
const SECRET_MARKERS: [&str; 16] = [
    "sk-",
    "eyJ",
    "ghp_",
    "github_pat_",
    "AKIA",
    "AIza",
    "Bearer ",
    "bearer ",
    "api_key=",
    "api-key=",
    "access_token=",
    "\"api_key\":\"",
    "\"api-key\":\"",
    "\"access_token\":\"",
    "\"password\":\"",
    "\"secret\":\"",
];

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '+' | '/' | '=')
}

fn redact_after(scrubbed: &mut String, marker: &str) {
    let mut search_from = 0;
    while let Some(rel) = scrubbed[search_from..].find(marker) {
        let start = search_from + rel;
        let token_start = start + marker.len();
        let token_len: usize = scrubbed[token_start..]
            .chars()
            .take_while(|c| is_token_char(*c))
            .map(char::len_utf8)
            .sum();

        if token_len == 0 {
            search_from = token_start;
            continue;
        }

        scrubbed.replace_range(start..token_start + token_len, REDACTED);
        search_from = start + REDACTED.len();
    }
}

/// Redact credential-looking tokens from text that may reach logs or users.
pub fn scrub_secret_patterns(input: &str) -> Cow<'_, str> {
    if !SECRET_MARKERS.iter().any(|marker| input.contains(marker)) {
        return Cow::Borrowed(input);
    }

    let mut scrubbed = input.to_string();
    for marker in SECRET_MARKERS {
        redact_after(&mut scrubbed, marker);
    }
    Cow::Owned(scrubbed)
}

/// Scrub and truncate an upstream error body.
pub fn sanitize_error_body(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);
    match scrubbed.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((end, _)) => format!("{}...", &scrubbed[..end]),
        None => scrubbed.into_owned(),
    }
}

/// Read a failed response body into a sanitized string.
pub async fn error_body(response: reqwest::Response) -> String {
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());
    sanitize_error_body(&body)
}
