//! Response helpers.
//!
//! Slurpee's HTTP contract replies with the stored record itself,
//! not an envelope - so this keeps a thin `IntoResponse` wrapper shape for
//! the 201/204 cases and drops any pagination/meta envelope machinery.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// 201 Created with a JSON body.
pub struct Created<T: Serialize>(pub T);

impl<T: Serialize> IntoResponse for Created<T> {
    fn into_response(self) -> Response {
        (StatusCode::CREATED, Json(self.0)).into_response()
    }
}

/// 204 No Content.
pub struct NoContent;

impl IntoResponse for NoContent {
    fn into_response(self) -> Response {
        StatusCode::NO_CONTENT.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn created_sets_status_201() {
        let response = Created(serde_json::json!({"id": "1"})).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn created_serializes_the_value_directly_with_no_envelope() {
        let response = Created(serde_json::json!({"id": "1"})).into_response();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, serde_json::json!({"id": "1"}));
    }

    #[test]
    fn no_content_sets_status_204() {
        let response = NoContent.into_response();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
