//! Wire envelope and error mapping.
//!
//! Every response, success or failure, is
//! `{ "success": bool, "data"?: ..., "error"?: { code, message, details? } }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use irrl_core::IrrlError;

#[derive(Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

#[derive(Serialize)]
pub struct WireError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// 200 with a success envelope.
pub fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(Envelope { success: true, data: Some(data), error: None }))
        .into_response()
}

/// 201 with a success envelope.
pub fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(Envelope { success: true, data: Some(data), error: None }))
        .into_response()
}

/// A failed request: an [`IrrlError`] plus the HTTP status it maps to.
pub struct ApiFailure(pub IrrlError);

impl From<IrrlError> for ApiFailure {
    fn from(err: IrrlError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let err = self.0;
        let code = err.code();
        let status = match code {
            "VALIDATION_ERROR" | "INVALID_REALM" | "INVALID_RESOLVER" | "INVALID_EVIDENCE"
            | "INVALID_PARENT" => StatusCode::BAD_REQUEST,
            "NOT_FOUND" | "RESOLVER_NOT_FOUND" => StatusCode::NOT_FOUND,
            "ALREADY_EXISTS" | "ALREADY_REVOKED" => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let details = match &err {
            IrrlError::InvalidEvidence { errors, .. } => Some(json!({ "errors": errors })),
            _ => None,
        };
        // Internal conditions get a generic message; details stay in logs.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %err, "internal error");
            "internal error".to_string()
        } else {
            err.to_string()
        };

        let envelope: Envelope<Value> = Envelope {
            success: false,
            data: None,
            error: Some(WireError { code: code.to_string(), message, details }),
        };
        (status, Json(envelope)).into_response()
    }
}

pub type ApiResult = Result<Response, ApiFailure>;

/// Deserialize a request body that already parsed as JSON, reporting
/// field-level failures as `VALIDATION_ERROR`.
pub fn parse_body<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, ApiFailure> {
    serde_json::from_value(value)
        .map_err(|e| ApiFailure(IrrlError::Validation(format!("invalid request body: {e}"))))
}

/// Unwrap the raw JSON body, converting axum's rejection into an envelope.
pub fn require_json(
    payload: Result<Json<Value>, axum::extract::rejection::JsonRejection>,
) -> Result<Value, ApiFailure> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(ApiFailure(IrrlError::Validation(format!(
            "malformed JSON body: {rejection}"
        )))),
    }
}
