use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    // Don't leak internal error detail to the client.
    let message = if status.is_server_error() {
        "Internal server error".to_string()
    } else {
        message.into()
    };

    let body = Json(ErrorResponse {
        code: status.as_u16(),
        message,
    });

    (status, body).into_response()
}

/// Implements `IntoResponse` for a use-case error enum that has a `status_code()` method.
macro_rules! impl_error_response {
    ($error:ty) => {
        impl axum::response::IntoResponse for $error {
            fn into_response(self) -> axum::response::Response {
                $crate::axum_http::error_responses::error_response(
                    self.status_code(),
                    self.to_string(),
                )
            }
        }
    };
}

pub(crate) use impl_error_response;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn server_errors_hide_their_message() {
        let response = error_response(StatusCode::INTERNAL_SERVER_ERROR, "db password is hunter2");

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(json["code"], 500);
        assert_eq!(json["message"], "Internal server error");
    }

    #[tokio::test]
    async fn client_errors_keep_their_message() {
        let response = error_response(StatusCode::CONFLICT, "email already registered");
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["message"], "email already registered");
    }
}
