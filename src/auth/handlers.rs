use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            LoginRequest, LoginResponse, LogoutRequest, MessageResponse, PublicUser,
            RefreshRequest, RegisterRequest, TokenResponse,
        },
        extractors::JsonBody,
        jwt::AuthUser,
    },
    error::AuthError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AuthError> {
    state
        .auth
        .register(
            &payload.name,
            &payload.email,
            &payload.password,
            payload.role.as_deref(),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "Registration successful",
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<LoginResponse>, AuthError> {
    let outcome = state.auth.login(&payload.email, &payload.password).await?;
    Ok(Json(LoginResponse {
        message: "Login successful",
        access_token: outcome.tokens.access_token,
        refresh_token: outcome.tokens.refresh_token,
        user: outcome.user,
    }))
}

#[instrument(skip(state, payload))]
pub async fn logout(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LogoutRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state.auth.logout(&payload.email).await?;
    Ok(Json(MessageResponse {
        message: "Logout successful",
    }))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RefreshRequest>,
) -> Result<Json<TokenResponse>, AuthError> {
    let tokens = state.auth.refresh(payload.token()?).await?;
    Ok(Json(TokenResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PublicUser>, AuthError> {
    Ok(Json(state.auth.current_user(user_id).await?))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::{app::build_app, state::AppState};

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
        bearer: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = bearer {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(b) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn post_raw(app: &Router, uri: &str, raw: &'static str) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(raw))
            .unwrap();
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).expect("JSON error body"))
    }

    async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        call(app, "POST", uri, Some(body), None).await
    }

    async fn app_with_user() -> Router {
        let app = build_app(AppState::fake());
        let (status, body) = post(
            &app,
            "/api/v1/auth/register",
            json!({"name": "A. Lee", "email": "a@x.com", "password": "secret1", "role": "patient"}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, json!({"message": "Registration successful"}));
        app
    }

    async fn login(app: &Router) -> Value {
        let (status, body) = post(
            app,
            "/api/v1/auth/login",
            json!({"email": "a@x.com", "password": "secret1"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    #[tokio::test]
    async fn login_returns_tokens_and_public_user() {
        let app = app_with_user().await;
        let body = login(&app).await;
        assert_eq!(body["message"], "Login successful");
        assert!(body["accessToken"].is_string());
        assert!(body["refreshToken"].is_string());
        assert_eq!(body["user"]["email"], "a@x.com");
        assert_eq!(body["user"]["name"], "A. Lee");
        assert_eq!(body["user"]["role"], "patient");
        let user = body["user"].as_object().unwrap();
        assert_eq!(user.len(), 4);
        assert!(!body.to_string().contains("argon2"));
    }

    #[tokio::test]
    async fn duplicate_registration_is_bad_request() {
        let app = app_with_user().await;
        let (status, body) = post(
            &app,
            "/api/v1/auth/register",
            json!({"name": "Other", "email": "A@X.com", "password": "secret2"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"message": "Email already registered"}));
    }

    #[tokio::test]
    async fn invalid_registration_lists_fields() {
        let app = build_app(AppState::fake());
        let (status, body) = post(&app, "/api/v1/auth/register", json!({"email": "nope"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Validation failed");
        let fields: Vec<&str> = body["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["name", "email", "password"]);
    }

    #[tokio::test]
    async fn failed_logins_look_identical() {
        let app = app_with_user().await;
        let wrong_password = post(
            &app,
            "/api/v1/auth/login",
            json!({"email": "a@x.com", "password": "wrong"}),
        )
        .await;
        let unknown_email = post(
            &app,
            "/api/v1/auth/login",
            json!({"email": "b@x.com", "password": "secret1"}),
        )
        .await;
        assert_eq!(wrong_password.0, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_password, unknown_email);
        assert_eq!(wrong_password.1, json!({"message": "Invalid credentials"}));
    }

    #[tokio::test]
    async fn refresh_rotates_tokens() {
        let app = app_with_user().await;
        let original = login(&app).await["refreshToken"].clone();

        let (status, body) = post(
            &app,
            "/api/v1/auth/refresh",
            json!({"refreshToken": original.clone()}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["accessToken"].is_string());
        assert_ne!(body["refreshToken"], original);

        let (status, body) = post(&app, "/api/v1/auth/refresh", json!({"refreshToken": original})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"message": "Invalid or expired token"}));
    }

    #[tokio::test]
    async fn refresh_with_access_token_is_unauthorized() {
        let app = app_with_user().await;
        let access = login(&app).await["accessToken"].clone();
        let (status, body) = post(&app, "/api/v1/auth/refresh", json!({"refreshToken": access})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"message": "Invalid or expired token"}));
    }

    #[tokio::test]
    async fn refresh_without_token_is_bad_request() {
        let app = build_app(AppState::fake());
        let (status, body) = post(&app, "/api/v1/auth/refresh", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"message": "No token provided"}));
    }

    #[tokio::test]
    async fn logout_revokes_session_and_is_idempotent() {
        let app = app_with_user().await;
        let refresh = login(&app).await["refreshToken"].clone();

        let (status, body) = post(&app, "/api/v1/auth/logout", json!({"email": "a@x.com"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "Logout successful"}));

        let (status, _) = post(&app, "/api/v1/auth/refresh", json!({"refreshToken": refresh})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = post(&app, "/api/v1/auth/logout", json!({"email": "ghost@x.com"})).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn me_requires_access_token() {
        let app = app_with_user().await;
        let tokens = login(&app).await;
        let access = tokens["accessToken"].as_str().unwrap();
        let refresh = tokens["refreshToken"].as_str().unwrap();

        let (status, body) = call(&app, "GET", "/api/v1/auth/me", None, Some(access)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["email"], "a@x.com");

        let (status, _) = call(&app, "GET", "/api/v1/auth/me", None, Some(refresh)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, "GET", "/api/v1/auth/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn refresh_with_no_body_reports_missing_token() {
        let app = build_app(AppState::fake());
        let (status, body) = call(&app, "POST", "/api/v1/auth/refresh", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"message": "No token provided"}));
    }

    #[tokio::test]
    async fn refresh_with_non_string_token_is_unauthorized() {
        let app = app_with_user().await;
        let (status, body) = post(&app, "/api/v1/auth/refresh", json!({"refreshToken": 123})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"message": "Invalid or expired token"}));
    }

    #[tokio::test]
    async fn logout_with_no_body_succeeds() {
        let app = app_with_user().await;
        let (status, body) = call(&app, "POST", "/api/v1/auth/logout", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "Logout successful"}));
    }

    #[tokio::test]
    async fn malformed_json_gets_a_json_error() {
        let app = app_with_user().await;
        let (status, body) = post_raw(&app, "/api/v1/auth/login", "{").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"message": "Invalid request body"}));

        let (status, body) = post_raw(&app, "/api/v1/auth/register", r#"{"email": 5}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"message": "Invalid request body"}));
    }
}
