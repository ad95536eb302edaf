use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{recipes, users};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest(
            "/api",
            Router::new().merge(users::router()).merge(recipes::router()),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// Router-level tests: everything here fails at the request boundary, before
// any query reaches the lazy test pool.
#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        extract::FromRef,
        http::{header, Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::auth::jwt::JwtKeys;
    use crate::state::AppState;

    use super::build_app;

    fn app() -> Router {
        build_app(AppState::fake())
    }

    fn bearer() -> String {
        let keys = JwtKeys::from_ref(&AppState::fake());
        format!("Bearer {}", keys.sign(Uuid::new_v4()).unwrap())
    }

    fn json_post(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let res = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn protected_routes_require_a_token() {
        for uri in [
            "/api/user/me",
            "/api/recipe/tags",
            "/api/recipe/ingredients",
            "/api/recipe/recipes",
        ] {
            let res = app()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_rejected() {
        let res = app()
            .oneshot(
                Request::get("/api/recipe/tags")
                    .header(header::AUTHORIZATION, "Token abc123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn garbage_bearer_token_is_rejected() {
        let res = app()
            .oneshot(
                Request::get("/api/user/me")
                    .header(header::AUTHORIZATION, "Bearer not.a.token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn post_to_me_is_method_not_allowed() {
        let res = app()
            .oneshot(json_post("/api/user/me", "{}"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn create_user_rejects_short_password() {
        let res = app()
            .oneshot(json_post(
                "/api/user/create",
                r#"{"email":"test@local.host","password":"pw"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert!(body["errors"]["password"][0].is_string());
    }

    #[tokio::test]
    async fn create_user_rejects_invalid_email() {
        let res = app()
            .oneshot(json_post(
                "/api/user/create",
                r#"{"email":"not-an-email","password":"testPass"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert!(body["errors"]["email"][0].is_string());
    }

    #[tokio::test]
    async fn token_requires_both_fields() {
        let res = app()
            .oneshot(json_post(
                "/api/user/token",
                r#"{"email":"one","password":""}"#,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert!(body.get("token").is_none());
    }

    #[tokio::test]
    async fn recipe_list_rejects_malformed_id_filters() {
        for uri in [
            "/api/recipe/recipes?tags=abc",
            "/api/recipe/recipes?tags=1,x",
            "/api/recipe/recipes?ingredients=1..2",
        ] {
            let res = app()
                .oneshot(
                    Request::get(uri)
                        .header(header::AUTHORIZATION, bearer())
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn tag_create_rejects_blank_name() {
        let res = app()
            .oneshot(
                Request::post("/api/recipe/tags")
                    .header(header::AUTHORIZATION, bearer())
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"name":"  "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert!(body["errors"]["name"][0].is_string());
    }

    #[tokio::test]
    async fn upload_rejects_non_image_payload() {
        let boundary = "test-boundary";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"image\"; filename=\"dish.jpg\"\r\n\
             Content-Type: image/jpeg\r\n\r\n\
             definitely not an image\r\n\
             --{boundary}--\r\n"
        );
        let res = app()
            .oneshot(
                Request::post("/api/recipe/recipes/1/upload-image")
                    .header(header::AUTHORIZATION, bearer())
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={boundary}"),
                    )
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert!(body["errors"]["image"][0].is_string());
    }
}
