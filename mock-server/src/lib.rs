use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Credentials accepted by the protected routes.
pub const USER: &str = "u";
pub const PASSWORD: &str = "p";
pub const DIGEST_REALM: &str = "callway@mock";
pub const DIGEST_NONCE: &str = "dcd98b7102dd2f0e8b11d0f600bfb0c093";
pub const SESSION_COOKIE: &str = "session=s3cr3t";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub name: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct NewItem {
    pub name: String,
    #[serde(default)]
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub quantity: Option<u32>,
}

pub type Db = Arc<RwLock<HashMap<Uuid, Item>>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .route("/items/{id}", get(get_item).put(update_item).delete(delete_item))
        .route("/echo/headers", any(echo_headers))
        .route("/cookies/set", get(set_cookie))
        .route("/cookies/echo", get(echo_cookies))
        .route("/basic", get(basic_protected))
        .route("/digest", any(digest_protected))
        .route("/empty", any(empty))
        .route("/upload", post(upload).put(upload))
        .route("/status/{code}", any(status))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn list_items(State(db): State<Db>) -> Json<Vec<Item>> {
    let items = db.read().await;
    Json(items.values().cloned().collect())
}

async fn create_item(State(db): State<Db>, Json(input): Json<NewItem>) -> (StatusCode, Json<Item>) {
    let item = Item {
        id: Uuid::new_v4(),
        name: input.name,
        quantity: input.quantity,
    };
    tracing::debug!(id = %item.id, "item created");
    db.write().await.insert(item.id, item.clone());
    (StatusCode::CREATED, Json(item))
}

async fn get_item(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<Json<Item>, StatusCode> {
    let items = db.read().await;
    items.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn update_item(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    Json(input): Json<ItemPatch>,
) -> Result<Json<Item>, StatusCode> {
    let mut items = db.write().await;
    let item = items.get_mut(&id).ok_or(StatusCode::NOT_FOUND)?;
    if let Some(name) = input.name {
        item.name = name;
    }
    if let Some(quantity) = input.quantity {
        item.quantity = quantity;
    }
    Ok(Json(item.clone()))
}

async fn delete_item(State(db): State<Db>, Path(id): Path<Uuid>) -> Result<StatusCode, StatusCode> {
    let mut items = db.write().await;
    items.remove(&id).map(|_| StatusCode::NO_CONTENT).ok_or(StatusCode::NOT_FOUND)
}

/// Request headers as `[name, value]` pairs; repeated names keep their
/// value order.
async fn echo_headers(headers: HeaderMap) -> Json<Vec<(String, String)>> {
    let pairs = headers
        .iter()
        .map(|(name, value)| {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            (name.as_str().to_string(), value)
        })
        .collect();
    Json(pairs)
}

async fn set_cookie() -> impl IntoResponse {
    let cookie = format!("{SESSION_COOKIE}; Path=/; HttpOnly");
    ([(header::SET_COOKIE, cookie)], "cookie set")
}

async fn echo_cookies(headers: HeaderMap) -> String {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ")
}

async fn basic_protected(headers: HeaderMap) -> Response {
    // base64("u:p")
    let authorized = headers
        .get(header::AUTHORIZATION)
        .is_some_and(|value| value == "Basic dTpw");
    if authorized {
        return (StatusCode::OK, "welcome").into_response();
    }
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, r#"Basic realm="callway@mock""#)],
        "credentials required",
    )
        .into_response()
}

async fn digest_protected(method: Method, headers: HeaderMap) -> Response {
    let answer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Digest "));
    if answer.is_some_and(|answer| digest_answer_valid(method.as_str(), answer)) {
        return (StatusCode::OK, "digest welcome").into_response();
    }
    let challenge = format!(r#"Digest realm="{DIGEST_REALM}", nonce="{DIGEST_NONCE}", qop="auth""#);
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, challenge)],
        "digest required",
    )
        .into_response()
}

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// Checks a qop=auth Digest answer against the fixed realm, nonce and
/// credentials.
pub fn digest_answer_valid(method: &str, answer: &str) -> bool {
    let params: HashMap<&str, &str> = answer
        .split(',')
        .filter_map(|part| part.trim().split_once('='))
        .map(|(key, value)| (key.trim(), value.trim().trim_matches('"')))
        .collect();
    let field = |key: &str| params.get(key).copied().unwrap_or_default();

    if field("username") != USER || field("realm") != DIGEST_REALM || field("nonce") != DIGEST_NONCE {
        return false;
    }
    let ha1 = md5_hex(&format!("{USER}:{DIGEST_REALM}:{PASSWORD}"));
    let ha2 = md5_hex(&format!("{method}:{}", field("uri")));
    let expected = md5_hex(&format!(
        "{ha1}:{DIGEST_NONCE}:{}:{}:{}:{ha2}",
        field("nc"),
        field("cnonce"),
        field("qop")
    ));
    field("response") == expected
}

async fn empty() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Returns the request body unchanged under the request's content type.
async fn upload(headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    tracing::debug!(bytes = body.len(), "upload received");
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

async fn status(Path(code): Path<u16>) -> Response {
    match StatusCode::from_u16(code) {
        Ok(status) => (status, format!("status {code}")).into_response(),
        Err(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}
