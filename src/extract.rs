//! Request extractors whose rejections render through [`AppError`].
//!
//! axum's own `Json`, `Path` and `Query` reject with plain-text 400/415/422
//! responses. These wrappers run the same extraction and turn the rejection
//! into `invalid_request` with the usual JSON error body.

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::AppError;

/// JSON request body.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// Path parameters.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

/// Query string.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, routing::get};
    use axum_test::TestServer;
    use serde::Deserialize;
    use uuid::Uuid;

    #[derive(Debug, Deserialize)]
    struct Page {
        limit: u32,
    }

    async fn by_id(AppPath(id): AppPath<Uuid>) -> String {
        id.to_string()
    }

    async fn paged(AppQuery(page): AppQuery<Page>) -> String {
        page.limit.to_string()
    }

    fn server() -> TestServer {
        let router = Router::new()
            .route("/items/{id}", get(by_id))
            .route("/items", get(paged));
        TestServer::new(router).unwrap()
    }

    #[tokio::test]
    async fn bad_path_parameter_is_invalid_request() {
        let response = server().get("/items/not-a-uuid").await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn bad_query_is_invalid_request() {
        let response = server().get("/items?limit=lots").await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn good_values_pass_through() {
        let server = server();
        let id = Uuid::new_v4();

        server.get(&format!("/items/{id}")).await.assert_text(id.to_string());
        server.get("/items?limit=5").await.assert_text("5");
    }
}
