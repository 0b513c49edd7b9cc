// ── Infrastructure ───────────────────────────────────────────────────────────
pub mod http_client;
pub mod scrub;
pub mod sse;
pub mod types;

// ── Completion service ──────────────────────────────────────────────────────
pub mod client;

pub use client::{
    ChatCompletionsClient, CompletionClient, CompletionFuture, CompletionRequest,
    CompletionStream, decode_chunk,
};
pub use http_client::{build_http_client, build_http_client_with_timeout};
pub use scrub::{error_body, sanitize_error_body, scrub_secret_patterns};
pub use sse::{SseBuffer, data_payload, parse_data_lines, parse_data_lines_without_done};
pub use types::{CompletionDelta, DeltaCustomContent, ResponseFormat};
