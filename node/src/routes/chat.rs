//! Thin JSON adapters over the message pipelines. No chat semantics
//! live here.

use crate::index::{ConversationSummary, GroupSummary};
use crate::messaging::{PipelineError, SendDirectRequest, SendGroupRequest};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use linguachat_messaging::ReplySnapshot;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chats/:peer/messages", post(send_direct))
        .route("/groups/:group/messages", post(send_group))
        .route("/conversations", get(conversations))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendDirectBody {
    sender_id: String,
    text: String,
    recipient_language: String,
    #[serde(default)]
    reply_to: Option<ReplySnapshot>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendGroupBody {
    sender_id: String,
    text: String,
    #[serde(default)]
    reply_to: Option<ReplySnapshot>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    message_id: String,
}

#[derive(Debug, Deserialize)]
struct ConversationsQuery {
    user: String,
}

#[derive(Debug, Serialize)]
struct ConversationsResponse {
    direct: HashMap<String, ConversationSummary>,
    groups: HashMap<String, GroupSummary>,
}

async fn send_direct(
    State(state): State<Arc<AppState>>,
    Path(peer): Path<String>,
    Json(body): Json<SendDirectBody>,
) -> Result<Json<SendResponse>, ApiError> {
    let outcome = state
        .direct()
        .send(SendDirectRequest {
            sender_id: body.sender_id,
            recipient_id: peer,
            text: body.text,
            recipient_language: body.recipient_language,
            reply_to: body.reply_to,
        })
        .await?;
    Ok(Json(SendResponse {
        message_id: outcome.message_id,
    }))
}

async fn send_group(
    State(state): State<Arc<AppState>>,
    Path(group): Path<String>,
    Json(body): Json<SendGroupBody>,
) -> Result<Json<SendResponse>, ApiError> {
    let message_id = state
        .group()
        .send(SendGroupRequest {
            group_id: group,
            sender_id: body.sender_id,
            text: body.text,
            reply_to: body.reply_to,
        })
        .await?;
    Ok(Json(SendResponse { message_id }))
}

async fn conversations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConversationsQuery>,
) -> Result<Json<ConversationsResponse>, ApiError> {
    let index = state.index_for(&query.user);
    let direct = index.direct_summaries().await.map_err(PipelineError::from)?;
    let groups = index.group_summaries().await.map_err(PipelineError::from)?;
    Ok(Json(ConversationsResponse { direct, groups }))
}

struct ApiError(PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PipelineError::EmptyMessage
            | PipelineError::MissingLanguage
            | PipelineError::EmptyGroupName => StatusCode::BAD_REQUEST,
            PipelineError::SendInFlight => StatusCode::CONFLICT,
            PipelineError::UnknownMessage(_)
            | PipelineError::UnknownGroup(_) => StatusCode::NOT_FOUND,
            PipelineError::VariantsUnavailable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::NotAMember { .. }
            | PipelineError::NotAdmin { .. }
            | PipelineError::LastAdmin(_) => StatusCode::FORBIDDEN,
            PipelineError::Store(_) | PipelineError::Encoding(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
