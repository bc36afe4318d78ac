use std::net::SocketAddr;

use axum::{routing::get, Json, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth, db::AppState};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(auth::router())
        .route("/health", get(health))
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

/// Liveness probe. Checks nothing, not even the database.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
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

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        extract::FromRef,
        http::{header, Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use time::OffsetDateTime;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::jwt::JwtKeys;

    async fn test_app() -> (Router, AppState) {
        let state = AppState::for_tests().await.expect("test state");
        (build_app(state.clone()), state)
    }

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn credentials(email: &str, password: &str) -> Value {
        json!({ "email": email, "password": password })
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn health_always_ok() {
        let (app, _state) = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn register_login_end_to_end() {
        let (app, state) = test_app().await;

        let response = app
            .clone()
            .oneshot(json_request(
                "/auth/register",
                credentials("alice@example.com", "secret123"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let registered = body_json(response).await;
        assert_eq!(registered["email"], "alice@example.com");
        let user_id = registered["id"].as_i64().expect("integer id");

        let response = app
            .clone()
            .oneshot(json_request(
                "/auth/login",
                credentials("alice@example.com", "secret123"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["token_type"], "bearer");

        let token = body["access_token"].as_str().expect("token string");
        let claims = JwtKeys::from_ref(&state).verify(token).expect("valid token");
        assert_eq!(claims.sub, user_id);
        let expected_exp = OffsetDateTime::now_utc().unix_timestamp() + 7 * 24 * 60 * 60;
        assert!((claims.exp as i64 - expected_exp).abs() <= 5);

        let response = app
            .oneshot(json_request(
                "/auth/login",
                credentials("alice@example.com", "wrongpass"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await,
            json!({ "detail": "Invalid credentials" })
        );
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let (app, _state) = test_app().await;

        let response = app
            .clone()
            .oneshot(json_request(
                "/auth/register",
                credentials("alice@example.com", "secret123"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(json_request(
                "/auth/register",
                credentials("alice@example.com", "otherpass9"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            body_json(response).await,
            json!({ "detail": "Email already in use" })
        );
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_are_indistinguishable() {
        let (app, _state) = test_app().await;

        app.clone()
            .oneshot(json_request(
                "/auth/register",
                credentials("alice@example.com", "secret123"),
            ))
            .await
            .unwrap();

        let unknown = app
            .clone()
            .oneshot(json_request(
                "/auth/login",
                credentials("nobody@example.com", "secret123"),
            ))
            .await
            .unwrap();
        let wrong = app
            .oneshot(json_request(
                "/auth/login",
                credentials("alice@example.com", "wrongpass"),
            ))
            .await
            .unwrap();

        assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(unknown).await, body_json(wrong).await);
    }

    #[tokio::test]
    async fn register_rejects_bad_input() {
        let (app, _state) = test_app().await;

        let response = app
            .clone()
            .oneshot(json_request(
                "/auth/register",
                credentials("not-an-email", "secret123"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(json_request(
                "/auth/register",
                credentials("alice@example.com", "short"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn email_is_normalized_before_storage() {
        let (app, _state) = test_app().await;

        let response = app
            .clone()
            .oneshot(json_request(
                "/auth/register",
                credentials("  Alice@Example.COM  ", "secret123"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["email"], "alice@example.com");

        // Login with the canonical form works.
        let response = app
            .clone()
            .oneshot(json_request(
                "/auth/login",
                credentials("alice@example.com", "secret123"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // A differently-cased duplicate collides.
        let response = app
            .oneshot(json_request(
                "/auth/register",
                credentials("ALICE@example.com", "secret123"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn me_requires_and_honors_bearer_token() {
        let (app, _state) = test_app().await;

        app.clone()
            .oneshot(json_request(
                "/auth/register",
                credentials("alice@example.com", "secret123"),
            ))
            .await
            .unwrap();
        let login = app
            .clone()
            .oneshot(json_request(
                "/auth/login",
                credentials("alice@example.com", "secret123"),
            ))
            .await
            .unwrap();
        let token = body_json(login).await["access_token"]
            .as_str()
            .expect("token string")
            .to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/me")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["email"], "alice@example.com");

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/me")
                    .header(header::AUTHORIZATION, "Bearer not.a.token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
