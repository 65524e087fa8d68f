use std::sync::Arc;

use axum::{
    extract::{
        ws::{
            rejection::WebSocketUpgradeRejection, Message as WsMessage, WebSocket,
            WebSocketUpgrade,
        },
        FromRequest, FromRequestParts, Path, Query, State,
    },
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Method},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use natter_core::{Core, Subscription};
use natter_shared::{RequestId, Session, UserId};
use natter_store::{FriendRequest, IncomingRequest, Message, UserProfile};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub core: Core,
    pub config: Arc<ServerConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/me", get(my_profile).put(update_profile))
        .route("/api/users/search", get(search_users))
        .route("/api/users/{id}", get(user_by_id))
        .route("/api/friends", get(list_friends))
        .route(
            "/api/friends/requests",
            get(list_friend_requests).post(send_friend_request),
        )
        .route(
            "/api/friends/requests/{id}/respond",
            post(respond_to_friend_request),
        )
        .route(
            "/api/chat/{friend_id}/messages",
            get(list_messages).post(send_message),
        )
        .route("/api/chat/ws", get(chat_socket));

    if state.config.cors_allow_any {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
            .allow_headers(Any);
        router = router.layer(cors);
    }

    router
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Authentication ───

/// The caller's verified session. Rejects with 401 when the bearer token is
/// missing, malformed, tampered with, or expired.
pub struct AuthUser(pub Session);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(ServerError::Unauthorized)?;
        state
            .core
            .identity
            .authenticate(token)
            .map(AuthUser)
            .ok_or(ServerError::Unauthorized)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// ─── Extractors ───

// Rejections from these go through `ServerError`, so malformed bodies and
// path or query values get the same `{success:false,error}` envelope.

#[derive(FromRequest)]
#[from_request(via(Json), rejection(ServerError))]
struct ApiJson<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(ServerError))]
struct ApiPath<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ServerError))]
struct ApiQuery<T>(T);

// ─── Request / response bodies ───

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    username: String,
    email: String,
    mobile: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    success: bool,
    user_id: UserId,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    success: bool,
    token: String,
}

#[derive(Deserialize)]
struct UpdateProfileRequest {
    username: String,
    email: String,
    mobile: String,
}

#[derive(Serialize)]
struct ProfileResponse {
    success: bool,
    user: UserProfile,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Deserialize)]
struct FriendRequestBody {
    username: String,
}

#[derive(Deserialize)]
struct RespondBody {
    accept: bool,
}

#[derive(Serialize)]
struct FriendRequestResponse {
    success: bool,
    request: FriendRequest,
}

#[derive(Deserialize)]
struct SendMessageBody {
    content: String,
}

#[derive(Serialize)]
struct MessageResponse {
    success: bool,
    message: Message,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SocketParams {
    friend_id: UserId,
    token: Option<String>,
}

// ─── Handlers ───

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<Json<RegisterResponse>, ServerError> {
    let user_id = state
        .core
        .identity
        .register(&req.username, &req.email, &req.mobile, &req.password)
        .await?;
    Ok(Json(RegisterResponse {
        success: true,
        user_id,
    }))
}

async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ServerError> {
    let token = state.core.identity.login(&req.email, &req.password).await?;
    Ok(Json(LoginResponse {
        success: true,
        token,
    }))
}

async fn logout(State(state): State<AppState>, AuthUser(session): AuthUser) -> Json<SuccessResponse> {
    state.core.identity.logout(&session);
    Json(SuccessResponse { success: true })
}

async fn my_profile(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
) -> Result<Json<UserProfile>, ServerError> {
    state
        .core
        .directory
        .get_user_profile(session.user_id)
        .await
        .map(Json)
        .ok_or_else(|| ServerError::NotFound("User not found".into()))
}

async fn update_profile(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, ServerError> {
    let user = state
        .core
        .identity
        .update_profile(session.user_id, &req.username, &req.email, &req.mobile)
        .await?;
    Ok(Json(ProfileResponse {
        success: true,
        user,
    }))
}

async fn search_users(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Json<Vec<UserProfile>> {
    Json(
        state
            .core
            .directory
            .search_users(&query.q, session.user_id)
            .await,
    )
}

async fn user_by_id(
    State(state): State<AppState>,
    AuthUser(_): AuthUser,
    ApiPath(id): ApiPath<UserId>,
) -> Result<Json<UserProfile>, ServerError> {
    state
        .core
        .directory
        .get_user_by_id(id)
        .await
        .map(Json)
        .ok_or_else(|| ServerError::NotFound("User not found".into()))
}

async fn list_friends(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
) -> Json<Vec<UserProfile>> {
    Json(state.core.relationships.list_friends(session.user_id).await)
}

async fn list_friend_requests(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
) -> Json<Vec<IncomingRequest>> {
    Json(state.core.relationships.list_incoming(session.user_id).await)
}

async fn send_friend_request(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    ApiJson(body): ApiJson<FriendRequestBody>,
) -> Result<Json<FriendRequestResponse>, ServerError> {
    let request = state
        .core
        .relationships
        .send_request(session.user_id, &body.username)
        .await?;
    Ok(Json(FriendRequestResponse {
        success: true,
        request,
    }))
}

async fn respond_to_friend_request(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    ApiPath(id): ApiPath<RequestId>,
    ApiJson(body): ApiJson<RespondBody>,
) -> Result<Json<FriendRequestResponse>, ServerError> {
    let request = state
        .core
        .relationships
        .respond(id, session.user_id, body.accept)
        .await?;
    Ok(Json(FriendRequestResponse {
        success: true,
        request,
    }))
}

async fn list_messages(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    ApiPath(friend_id): ApiPath<UserId>,
) -> Json<Vec<Message>> {
    Json(state.core.messaging.history(session.user_id, friend_id).await)
}

async fn send_message(
    State(state): State<AppState>,
    AuthUser(session): AuthUser,
    ApiPath(friend_id): ApiPath<UserId>,
    ApiJson(body): ApiJson<SendMessageBody>,
) -> Result<Json<MessageResponse>, ServerError> {
    let message = state
        .core
        .messaging
        .send(session.user_id, friend_id, &body.content)
        .await?;
    Ok(Json(MessageResponse {
        success: true,
        message,
    }))
}

// ─── Real-time push ───

/// Upgrade to a push-only WebSocket for one conversation. Browsers cannot
/// set headers on a WebSocket handshake, so the token may also arrive as a
/// query parameter.
async fn chat_socket(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(params): ApiQuery<SocketParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ServerError> {
    // Authentication is checked before the upgrade headers, so a request
    // without a valid session is always a 401.
    let token = bearer_token(&headers)
        .or(params.token.as_deref())
        .ok_or(ServerError::Unauthorized)?;
    let session = state
        .core
        .identity
        .authenticate(token)
        .ok_or(ServerError::Unauthorized)?;
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    // Register before the handshake completes so nothing sent in between is missed.
    let subscription = state
        .core
        .messaging
        .subscribe(session.user_id, params.friend_id);

    info!(user = %session.user_id, friend = %params.friend_id, "chat socket opened");
    Ok(ws.on_upgrade(move |socket| push_messages(socket, subscription)))
}

async fn push_messages(socket: WebSocket, mut subscription: Subscription) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            pushed = subscription.recv() => {
                let Some(message) = pushed else { break };
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(message = %message.id, error = %e, "failed to encode push");
                        continue;
                    }
                };
                if sink.send(WsMessage::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                // The channel is push-only; anything the client sends is ignored.
                Some(Ok(_)) => {}
            },
        }
    }

    let (user, friend) = subscription.key();
    debug!(user = %user, friend = %friend, "chat socket closed");
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use natter_shared::{PasswordHasher, SessionKeys};
    use natter_store::Database;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const SECRET: &str = "test-secret-test-secret-test-secret!";

    fn app() -> Router {
        let config = ServerConfig::from_lookup(|key| match key {
            "SESSION_SECRET" => Some(SECRET.to_string()),
            _ => None,
        })
        .unwrap();
        let core = Core::new(
            Database::open_in_memory().unwrap(),
            SessionKeys::from_secret(SECRET.as_bytes()).unwrap(),
            PasswordHasher::new(8 * 1024, 1).unwrap(),
        );
        build_router(AppState {
            core,
            config: Arc::new(config),
        })
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };

        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn sign_up(app: &Router, name: &str, mobile: &str, password: &str) -> String {
        let email = format!("{name}@x.com");
        let (status, _) = call(
            app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "username": name,
                "email": email,
                "mobile": mobile,
                "password": password,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = call(&app(), "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_profile_requires_session() {
        let app = app();
        let (status, body) = call(&app, "GET", "/api/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Not authenticated");

        let (status, _) = call(&app, "GET", "/api/me", Some("forged.token"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_login_profile() {
        let app = app();
        let token = sign_up(&app, "alice", "+1000", "pw1").await;

        let (status, me) = call(&app, "GET", "/api/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["username"], "alice");
        assert!(me.get("passwordHash").is_none());

        let (status, updated) = call(
            &app,
            "PUT",
            "/api/me",
            Some(&token),
            Some(json!({ "username": "alicia", "email": "alice@x.com", "mobile": "+1000" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["user"]["username"], "alicia");

        let (status, _) = call(&app, "POST", "/api/auth/logout", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let app = app();
        sign_up(&app, "alice", "+1000", "pw1").await;

        let (status, body) = call(
            &app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "username": "Alice",
                "email": "other@x.com",
                "mobile": "+1",
                "password": "pw",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Username is already taken");

        let (status, body) = call(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "alice@x.com", "password": "wrong" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid email or password");

        let (status, _) = call(
            &app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "username": "carol",
                "email": "no-at-sign",
                "mobile": "+3",
                "password": "pw",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_friend_and_chat_flow() {
        let app = app();
        let alice = sign_up(&app, "alice", "+1000", "pw1").await;
        let bob = sign_up(&app, "bob", "+2000", "pw2").await;

        let (status, found) = call(&app, "GET", "/api/users/search?q=BO", Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(found[0]["username"], "bob");
        let bob_id = found[0]["id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &app,
            "POST",
            "/api/friends/requests",
            Some(&alice),
            Some(json!({ "username": "bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &app,
            "POST",
            "/api/friends/requests",
            Some(&bob),
            Some(json!({ "username": "alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "A friend request already exists");

        let (_, incoming) = call(&app, "GET", "/api/friends/requests", Some(&bob), None).await;
        assert_eq!(incoming[0]["sender"]["username"], "alice");
        assert_eq!(incoming[0]["status"], "pending");
        let request_id = incoming[0]["id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/friends/requests/{request_id}/respond"),
            Some(&bob),
            Some(json!({ "accept": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["request"]["status"], "accepted");

        let (_, friends) = call(&app, "GET", "/api/friends", Some(&alice), None).await;
        assert_eq!(friends[0]["username"], "bob");
        let alice_id = {
            let (_, me) = call(&app, "GET", "/api/me", Some(&alice), None).await;
            me["id"].as_str().unwrap().to_string()
        };

        let (status, sent) = call(
            &app,
            "POST",
            &format!("/api/chat/{bob_id}/messages"),
            Some(&alice),
            Some(json!({ "content": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(sent["message"]["seen"], false);

        let (_, history) = call(
            &app,
            "GET",
            &format!("/api/chat/{alice_id}/messages"),
            Some(&bob),
            None,
        )
        .await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["content"], "hi");
        assert_eq!(history[0]["senderId"], alice_id);
        assert_eq!(history[0]["seen"], true);
    }

    #[tokio::test]
    async fn test_blank_message_is_bad_request() {
        let app = app();
        let alice = sign_up(&app, "alice", "+1000", "pw1").await;
        let bob_id = UserId::new();

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/chat/{bob_id}/messages"),
            Some(&alice),
            Some(json!({ "content": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    async fn raw(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn upgrade_request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut req = Request::builder()
            .method("GET")
            .uri(uri)
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-version", "13")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==");
        if let Some(token) = token {
            req = req.header("authorization", format!("Bearer {token}"));
        }
        req.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_malformed_input_uses_error_envelope() {
        let app = app();
        let alice = sign_up(&app, "alice", "+1000", "pw1").await;

        let req = Request::builder()
            .method("POST")
            .uri("/api/auth/login")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = raw(&app, req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());

        let (status, body) = call(
            &app,
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "alice@x.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = call(&app, "GET", "/api/users/not-a-uuid", Some(&alice), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_chat_socket_requires_session() {
        let app = app();
        let alice = sign_up(&app, "alice", "+1000", "pw1").await;
        let friend = UserId::new();
        let uri = format!("/api/chat/ws?friendId={friend}");

        let (status, body) = raw(&app, upgrade_request(&uri, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, _) = raw(&app, upgrade_request(&uri, Some("forged.token.value"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut forged = alice.clone();
        forged.push('x');
        let (status, _) = raw(
            &app,
            upgrade_request(&format!("{uri}&token={forged}"), None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // Without a real connection the upgrade itself cannot complete, but
        // the session is accepted from either the header or the query.
        let (status, _) = raw(&app, upgrade_request(&uri, Some(&alice))).await;
        assert_ne!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = raw(
            &app,
            upgrade_request(&format!("{uri}&token={alice}"), None),
        )
        .await;
        assert_ne!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_chat_socket_without_friend_is_bad_request() {
        let app = app();
        let alice = sign_up(&app, "alice", "+1000", "pw1").await;

        let (status, body) = raw(&app, upgrade_request("/api/chat/ws", Some(&alice))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
