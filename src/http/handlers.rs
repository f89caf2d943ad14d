//! Per-endpoint handlers (spec §6). Each handler decodes its body,
//! validates numeric bounds, forwards to the coordinator, and maps
//! failures onto the status codes spec §6/§7 require.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tonic::Request as RpcRequest;

use crate::error::BridgeError;
use crate::model::{Document, EditorContext, Position, Range};
use crate::multiplexer::{StreamEvent, StreamPayload};
use crate::proto::coordinator::v1 as pb;
use crate::proto::with_agent_id_header;

use super::AppState;

/// Wraps [`BridgeError`] so it can be returned directly from a handler;
/// the `IntoResponse` impl maps it via `to_http_status()` with a
/// plain-text body, per spec §7's "plain-text body + appropriate status".
pub struct AppError(BridgeError);

impl From<BridgeError> for AppError {
    fn from(e: BridgeError) -> Self {
        AppError(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.0.to_http_status(), self.0.to_string()).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct PositionDto {
    line: i64,
    character: i64,
}

#[derive(Debug, Deserialize)]
struct RangeDto {
    start: PositionDto,
    end: PositionDto,
}

fn validate_position(dto: PositionDto) -> Result<Position, BridgeError> {
    if dto.line < 0 || dto.character < 0 {
        return Err(BridgeError::invalid_position(
            "line and character must be non-negative",
        ));
    }
    if dto.line > i32::MAX as i64 || dto.character > i32::MAX as i64 {
        return Err(BridgeError::invalid_position(
            "line and character must fit in a 32-bit signed integer",
        ));
    }
    Ok(Position {
        line: dto.line as u32,
        character: dto.character as u32,
    })
}

fn validate_range(dto: RangeDto) -> Result<Range, BridgeError> {
    Ok(Range {
        start: validate_position(dto.start)?,
        end: validate_position(dto.end)?,
    })
}

#[derive(Debug, Deserialize)]
struct DocumentDto {
    uri: String,
    language_id: String,
    content: String,
    #[serde(default)]
    selection: Option<RangeDto>,
}

fn validate_document(dto: DocumentDto) -> Result<Document, BridgeError> {
    Ok(Document {
        uri: dto.uri,
        language_id: dto.language_id,
        content: dto.content,
        selection: dto.selection.map(validate_range).transpose()?,
        version: 0,
    })
}

// ---- POST /inline_complete ----

#[derive(Debug, Deserialize)]
pub struct InlineCompleteBody {
    agent_id: String,
    session_id: String,
    prompt: String,
    document: DocumentDto,
}

#[derive(Debug, Serialize)]
pub struct InlineCompleteResponse {
    text: String,
    finish_reason: String,
}

pub async fn inline_complete(
    State(state): State<AppState>,
    Json(body): Json<InlineCompleteBody>,
) -> Result<Json<InlineCompleteResponse>, AppError> {
    let document = validate_document(body.document)?;
    let context = EditorContext {
        document,
        visible_ranges: vec![],
    };

    // The buffered-response contract needs the accumulated text available
    // after the stream drains; collect it through a shared cell so the
    // final response can read it back once the callback has finished.
    let collected = std::sync::Arc::new(std::sync::Mutex::new((String::new(), String::new())));
    let collected_cb = std::sync::Arc::clone(&collected);
    let callback: crate::multiplexer::StreamCallback = Box::new(move |event: StreamEvent| {
        if let StreamPayload::InlineCompletion { text, finish_reason } = event.payload {
            let mut guard = collected_cb.lock().expect("collected cell poisoned");
            guard.0.push_str(&text);
            if event.is_final {
                guard.1 = finish_reason;
            }
        }
        Ok(())
    });

    let (_, result) = state
        .bridge
        .start_inline_completion(
            body.agent_id.clone(),
            body.session_id,
            body.prompt,
            context,
            callback,
        )
        .await;

    result?;

    let guard = collected.lock().expect("collected cell poisoned");
    Ok(Json(InlineCompleteResponse {
        text: guard.0.clone(),
        finish_reason: guard.1.clone(),
    }))
}

// ---- POST /propose_edits ----

#[derive(Debug, Deserialize)]
pub struct ProposeEditsBody {
    agent_id: String,
    session_id: String,
    instruction: String,
    max_suggestions: i64,
    document: DocumentDto,
}

#[derive(Debug, Serialize)]
pub struct EditSuggestionDto {
    title: String,
    edits: Vec<TextEditDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TextEditDto {
    uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    range: Option<RangeResponseDto>,
    new_text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RangeResponseDto {
    start: PositionResponseDto,
    end: PositionResponseDto,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PositionResponseDto {
    line: u32,
    character: u32,
}

impl From<Position> for PositionResponseDto {
    fn from(p: Position) -> Self {
        Self {
            line: p.line,
            character: p.character,
        }
    }
}

impl From<Range> for RangeResponseDto {
    fn from(r: Range) -> Self {
        Self {
            start: r.start.into(),
            end: r.end.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProposeEditsResponse {
    suggestions: Vec<EditSuggestionDto>,
}

pub async fn propose_edits(
    State(state): State<AppState>,
    Json(body): Json<ProposeEditsBody>,
) -> Result<Json<ProposeEditsResponse>, AppError> {
    if !(0..=i32::MAX as i64).contains(&body.max_suggestions) {
        return Err(BridgeError::invalid_params(
            "max_suggestions must be between 0 and 2^31-1",
        )
        .into());
    }
    let document = validate_document(body.document)?;
    let context: pb::EditorContext = EditorContext {
        document,
        visible_ranges: vec![],
    }
    .into();

    let link = state.bridge.snapshot_link().await?;
    let mut client = link.client;
    let request = with_agent_id_header(
        RpcRequest::new(pb::ProposeEditsRequest {
            agent_id: body.agent_id.clone(),
            session_id: body.session_id,
            instruction: body.instruction,
            max_suggestions: body.max_suggestions as u32,
            context: Some(context),
        }),
        &body.agent_id,
    );

    let response = client
        .propose_edits(request)
        .await
        .map_err(|status| BridgeError::upstream(format!("coordinator-error: {status}")))?
        .into_inner();

    let suggestions = response
        .suggestions
        .into_iter()
        .map(|s| EditSuggestionDto {
            title: s.title,
            edits: s
                .edits
                .into_iter()
                .map(|e| TextEditDto {
                    uri: e.uri,
                    range: e.range.map(|r| RangeResponseDto {
                        start: PositionResponseDto {
                            line: r.start.as_ref().map(|p| p.line).unwrap_or_default(),
                            character: r.start.as_ref().map(|p| p.character).unwrap_or_default(),
                        },
                        end: PositionResponseDto {
                            line: r.end.as_ref().map(|p| p.line).unwrap_or_default(),
                            character: r.end.as_ref().map(|p| p.character).unwrap_or_default(),
                        },
                    }),
                    new_text: e.new_text,
                })
                .collect(),
        })
        .collect();

    Ok(Json(ProposeEditsResponse { suggestions }))
}

// ---- POST /apply_edits ----

#[derive(Debug, Deserialize)]
pub struct ApplyEditsBody {
    agent_id: String,
    session_id: String,
    #[serde(default)]
    title: Option<String>,
    dry_run: bool,
    edits: Vec<ApplyEditDto>,
}

#[derive(Debug, Deserialize)]
pub struct ApplyEditDto {
    uri: String,
    #[serde(default)]
    range: Option<RangeDto>,
    new_text: String,
}

#[derive(Debug, Serialize)]
pub struct ApplyEditsResponse {
    applied: bool,
    applied_uris: Vec<String>,
}

pub async fn apply_edits(
    State(state): State<AppState>,
    Json(body): Json<ApplyEditsBody>,
) -> Result<Json<ApplyEditsResponse>, AppError> {
    let edits = body
        .edits
        .into_iter()
        .map(|e| {
            Ok::<_, BridgeError>(crate::model::TextEdit {
                uri: e.uri,
                range: e.range.map(validate_range).transpose()?,
                new_text: e.new_text,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let link = state.bridge.snapshot_link().await?;
    let mut client = link.client;
    let request = with_agent_id_header(
        RpcRequest::new(pb::ApplyEditsRequest {
            agent_id: body.agent_id.clone(),
            session_id: body.session_id,
            title: body.title.unwrap_or_default(),
            dry_run: body.dry_run,
            edits: edits.into_iter().map(Into::into).collect(),
        }),
        &body.agent_id,
    );

    let response = client
        .apply_edits(request)
        .await
        .map_err(|status| BridgeError::upstream(format!("coordinator-error: {status}")))?
        .into_inner();

    Ok(Json(ApplyEditsResponse {
        applied: response.applied,
        applied_uris: response.applied_uris,
    }))
}

// ---- POST /status ----

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    agent_id: String,
    session_id: String,
    document: DocumentDto,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    acknowledged: bool,
}

pub async fn status(
    State(state): State<AppState>,
    Json(body): Json<StatusBody>,
) -> Result<Json<StatusResponse>, AppError> {
    let document = validate_document(body.document)?;
    let context: pb::EditorContext = EditorContext {
        document,
        visible_ranges: vec![],
    }
    .into();

    let link = state.bridge.snapshot_link().await?;
    let mut client = link.client;
    let request = with_agent_id_header(
        RpcRequest::new(pb::UpdateEditorStateRequest {
            agent_id: body.agent_id.clone(),
            session_id: body.session_id,
            context: Some(context),
        }),
        &body.agent_id,
    );

    client
        .update_editor_state(request)
        .await
        .map_err(|status| BridgeError::upstream(format!("coordinator-error: {status}")))?;

    Ok(Json(StatusResponse { acknowledged: true }))
}

// ---- GET /view_state ----

#[derive(Debug, Deserialize)]
pub struct ViewStateQuery {
    session_id: Option<String>,
}

pub async fn view_state(
    State(state): State<AppState>,
    Query(query): Query<ViewStateQuery>,
) -> Response {
    let Some(session_id) = query.session_id.filter(|s| !s.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "session_id is required").into_response();
    };

    let Some(provider) = &state.view_state_provider else {
        return (StatusCode::SERVICE_UNAVAILABLE, "no view provider configured").into_response();
    };

    match provider.snapshot(&session_id) {
        Some(snapshot) => Json(snapshot).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown session").into_response(),
    }
}
