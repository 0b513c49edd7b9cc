use super::AppState;
use super::auth::{conversation_id, request_api_key};
use super::streaming::{ChunkFactory, GENERIC_FAILURE, aggregate_events, build_sse_response};
use super::types::{ChatCompletionRequest, ChoiceMessage, ErrorBody};
use crate::conversation::Role;
use crate::coordinator::Coordinator;
use crate::stage::{ChannelSurface, RecordingSurface, ResponseSurface};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use std::sync::Arc;
use tokio::sync::mpsc;

fn error_response(status: StatusCode, message: &str, kind: &'static str) -> Response {
    (status, Json(ErrorBody::new(message, kind))).into_response()
}

/// POST /openai/deployments/{deployment}/chat/completions
pub async fn handle_chat_completions(
    State(state): State<AppState>,
    Path(deployment): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ChatCompletionRequest>,
) -> Response {
    if deployment != state.config.gateway.deployment {
        return error_response(
            StatusCode::NOT_FOUND,
            &format!("Deployment {deployment} not found"),
            "invalid_request_error",
        );
    }

    let Some(api_key) = request_api_key(&headers).map(str::to_string) else {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "Missing API key",
            "invalid_request_error",
        );
    };

    if request.messages.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "messages must not be empty",
            "invalid_request_error",
        );
    }

    let conversation_id = conversation_id(&headers).map(str::to_string);
    let factory = ChunkFactory::new(&deployment);
    let coordinator = Coordinator::for_request(&state.config, &api_key);

    if request.stream.unwrap_or(false) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let surface: Arc<dyn ResponseSurface> = Arc::new(ChannelSurface::new(sender));
        let messages = request.messages;

        let turn = tokio::spawn(async move {
            let outcome = coordinator
                .handle_turn(&messages, conversation_id.as_deref(), surface)
                .await;
            if let Err(error) = &outcome {
                tracing::error!(
                    conversation_id = conversation_id.as_deref().unwrap_or("unknown"),
                    "inference failed: {error}"
                );
            }
            outcome
        });

        return build_sse_response(factory, receiver, turn);
    }

    let surface = Arc::new(RecordingSurface::new());
    let outcome = coordinator
        .handle_turn(
            &request.messages,
            conversation_id.as_deref(),
            Arc::clone(&surface) as Arc<dyn ResponseSurface>,
        )
        .await;

    match outcome {
        Ok(reply) => {
            let custom_content = aggregate_events(surface.events());
            Json(factory.completion(ChoiceMessage {
                role: Role::Assistant,
                content: reply.text,
                custom_content: (!custom_content.is_empty()).then_some(custom_content),
            }))
            .into_response()
        }
        Err(error) => {
            tracing::error!(
                conversation_id = conversation_id.as_deref().unwrap_or("unknown"),
                "inference failed: {error}"
            );
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                GENERIC_FAILURE,
                "server_error",
            )
        }
    }
}

/// GET /health
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "deployment": state.config.gateway.deployment,
    }))
}
