//! HTTP surface: one POST route per function kind in front of a [`FunctionInterface`](crate::interface::FunctionInterface).

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};

use crate::interface::{FunctionInterface, FunctionKind, ProtocolError};
use crate::store::UserIdentity;

/// Issuer stamped on identities taken from bearer tokens. There is no token validation.
pub const DEV_ISSUER: &str = "docfx-dev";

#[derive(Debug, Deserialize)]
pub struct CallRequest {
    pub path: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CallResponse {
    Success {
        value: Value,
    },
    Error {
        #[serde(rename = "errorMessage")]
        error_message: String,
        #[serde(rename = "errorData", skip_serializing_if = "Option::is_none")]
        error_data: Option<Value>,
    },
}

impl From<&ProtocolError> for CallResponse {
    fn from(error: &ProtocolError) -> Self {
        let error_data = match error {
            ProtocolError::User { message } => Some(json!({ "message": message })),
            _ => None,
        };
        CallResponse::Error { error_message: error.to_string(), error_data }
    }
}

fn status_of(error: &ProtocolError) -> StatusCode {
    match error {
        ProtocolError::Platform => StatusCode::INTERNAL_SERVER_ERROR,
        ProtocolError::UnknownFunction(_) => StatusCode::NOT_FOUND,
        ProtocolError::User { .. } | ProtocolError::WrongKind { .. } | ProtocolError::InvalidArgs(_) => {
            StatusCode::BAD_REQUEST
        }
    }
}

/// `Authorization: Bearer <subject>` becomes a development identity for that subject.
pub fn identity_from(headers: &HeaderMap) -> Option<UserIdentity> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let subject = header.strip_prefix("Bearer ")?.trim();
    if subject.is_empty() {
        return None;
    }
    Some(UserIdentity::new(DEV_ISSUER, subject))
}

pub fn router(interface: Arc<FunctionInterface>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST])
        .allow_headers(Any);
    Router::new()
        .route("/api/query", post(query))
        .route("/api/mutation", post(mutation))
        .route("/api/action", post(action))
        .layer(cors)
        .with_state(interface)
}

async fn query(
    State(interface): State<Arc<FunctionInterface>>,
    headers: HeaderMap,
    Json(request): Json<CallRequest>,
) -> (StatusCode, Json<CallResponse>) {
    dispatch(&interface, FunctionKind::Query, &headers, request).await
}

async fn mutation(
    State(interface): State<Arc<FunctionInterface>>,
    headers: HeaderMap,
    Json(request): Json<CallRequest>,
) -> (StatusCode, Json<CallResponse>) {
    dispatch(&interface, FunctionKind::Mutation, &headers, request).await
}

async fn action(
    State(interface): State<Arc<FunctionInterface>>,
    headers: HeaderMap,
    Json(request): Json<CallRequest>,
) -> (StatusCode, Json<CallResponse>) {
    dispatch(&interface, FunctionKind::Action, &headers, request).await
}

async fn dispatch(
    interface: &FunctionInterface,
    kind: FunctionKind,
    headers: &HeaderMap,
    request: CallRequest,
) -> (StatusCode, Json<CallResponse>) {
    let identity = identity_from(headers);
    match interface.call(kind, &request.path, request.args, identity).await {
        Ok(value) => (StatusCode::OK, Json(CallResponse::Success { value })),
        Err(error) => (status_of(&error), Json(CallResponse::from(&error))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_subject_becomes_identity() {
        let mut headers = HeaderMap::new();
        assert_eq!(identity_from(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer alice"));
        let identity = identity_from(&headers).expect("identity");
        assert_eq!(identity.subject, "alice");
        assert_eq!(identity.token_identifier, "docfx-dev|alice");
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(identity_from(&headers), None);
    }

    #[test]
    fn only_user_errors_carry_detail() {
        let user = ProtocolError::User { message: "Title is required".into() };
        assert_eq!(status_of(&user), StatusCode::BAD_REQUEST);
        assert_eq!(
            serde_json::to_value(CallResponse::from(&user)).expect("json"),
            json!({ "status": "error", "errorMessage": "Title is required", "errorData": { "message": "Title is required" } })
        );
        assert_eq!(status_of(&ProtocolError::Platform), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            serde_json::to_value(CallResponse::from(&ProtocolError::Platform)).expect("json"),
            json!({ "status": "error", "errorMessage": "Server Error" })
        );
        assert_eq!(status_of(&ProtocolError::UnknownFunction("x".into())), StatusCode::NOT_FOUND);
    }
}
