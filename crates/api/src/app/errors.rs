use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use crate::protocol::{Code, Status};

pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
        Code::Unknown | Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Render a call status the same way every route does.
pub fn status_to_response(status: Status) -> axum::response::Response {
    (
        http_status(status.code),
        axum::Json(json!({
            "error": status.reason.clone(),
            "message": status.message.clone(),
            "status": status,
        })),
    )
        .into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
