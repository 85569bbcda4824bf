//! JSON-over-HTTP protocol handler for the game API.
//!
//! All endpoints live under `/api/v1/`. Dispatch on the method is done by
//! hand so that mismatches answer 405 with an `Allow` header and the JSON
//! error body of the protocol, and request bodies are validated strictly:
//! exact key sets, exact value types, and the `move` enumeration. Anything
//! else under `/api` answers 400 `invalidApi`; paths outside `/api` fall
//! through to the static file service.
//!
//! Handlers that touch the game world lock the shared application for the
//! whole operation, which keeps every request atomic with respect to the
//! tick.

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use log::error;
use serde_json::{json, Map as JsonMap, Value};
use tokio::sync::Mutex;
use tower_http::services::ServeDir;

use crate::app::{Application, Token};
use crate::model::Map as GameMap;
use crate::records::RecordsStore;

/// Canonical content type of every API request and response.
const APPLICATION_JSON: &str = "application/json";
/// `Bearer ` prefix plus 32 hex characters.
const AUTH_HEADER_LENGTH: usize = 39;
const AUTH_BEARER: &str = "Bearer ";

/// Records page size cap; also the default page size.
const MAX_RECORD_ITEMS: i64 = 100;

/// State shared by all handlers: the world behind its single-writer lock
/// and the records store, which talks to the database on its own.
pub struct AppState {
    pub app: Mutex<Application>,
    pub records: RecordsStore,
}

/// Builds the full router: API endpoints, the `invalidApi` catch-all under
/// `/api`, and static file serving for everything else.
pub fn router(state: Arc<AppState>, www_root: PathBuf) -> Router {
    Router::new()
        .route("/api/v1/maps", any(maps_list))
        .route("/api/v1/maps/:map_id", any(map_by_id))
        .route("/api/v1/game/join", any(join_game))
        .route("/api/v1/game/players", any(session_players))
        .route("/api/v1/game/state", any(session_state))
        .route("/api/v1/game/player/action", any(player_action))
        .route("/api/v1/game/tick", any(game_tick))
        .route("/api/v1/game/records", any(game_records))
        .route("/api", any(invalid_api))
        .route("/api/*rest", any(invalid_api))
        .fallback_service(ServeDir::new(www_root))
        .with_state(state)
}

fn json_response(status: StatusCode, body: String) -> Response {
    (
        status,
        [
            (header::CONTENT_TYPE, APPLICATION_JSON),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        body,
    )
        .into_response()
}

fn error_body(code: &str, message: &str) -> String {
    json!({ "code": code, "message": message }).to_string()
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    json_response(status, error_body(code, message))
}

fn method_not_allowed(allow: &'static str, message: &str) -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [
            (header::CONTENT_TYPE, APPLICATION_JSON),
            (header::CACHE_CONTROL, "no-cache"),
            (header::ALLOW, allow),
        ],
        error_body("invalidMethod", message),
    )
        .into_response()
}

fn internal_error(message: &str) -> Response {
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "internalError", message)
}

fn is_read_method(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

fn has_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == APPLICATION_JSON)
}

/// Pulls a well-formed bearer token out of the headers: the literal
/// `Bearer ` prefix followed by 32 hex characters, 39 bytes in total.
fn bearer_token(headers: &HeaderMap) -> Option<Token> {
    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    if auth.len() != AUTH_HEADER_LENGTH || !auth.starts_with(AUTH_BEARER) {
        return None;
    }
    let token = &auth[AUTH_BEARER.len()..];
    if !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(Token::new(token.to_string()))
}

fn invalid_token_response(message: &str) -> Response {
    error_response(StatusCode::UNAUTHORIZED, "invalidToken", message)
}

fn unknown_token_response() -> Response {
    error_response(
        StatusCode::UNAUTHORIZED,
        "unknownToken",
        "Player token has not been found",
    )
}

async fn invalid_api() -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        "invalidApi",
        "Target matched no API endpoint",
    )
}

async fn maps_list(State(state): State<Arc<AppState>>, method: Method) -> Response {
    if !is_read_method(&method) {
        return method_not_allowed("GET, HEAD", "Only GET and HEAD are expected for the map list");
    }

    let app = state.app.lock().await;
    let maps: Vec<Value> = app
        .maps()
        .iter()
        .map(|map| json!({ "id": map.id(), "name": map.name() }))
        .collect();
    json_response(StatusCode::OK, Value::Array(maps).to_string())
}

/// Echoes the full map descriptor the way it appeared in the config.
fn map_descriptor(map: &GameMap) -> Value {
    let roads: Vec<Value> = map
        .roads()
        .iter()
        .map(|road| {
            if road.is_horizontal() {
                json!({
                    "x0": road.start().x,
                    "y0": road.start().y,
                    "x1": road.end().x,
                })
            } else {
                json!({
                    "x0": road.start().x,
                    "y0": road.start().y,
                    "y1": road.end().y,
                })
            }
        })
        .collect();

    let buildings: Vec<Value> = map
        .buildings()
        .iter()
        .map(|building| {
            json!({
                "x": building.bounds.position.x,
                "y": building.bounds.position.y,
                "w": building.bounds.size.width,
                "h": building.bounds.size.height,
            })
        })
        .collect();

    let offices: Vec<Value> = map
        .offices()
        .iter()
        .map(|office| {
            json!({
                "id": office.id,
                "x": office.position.x,
                "y": office.position.y,
                "offsetX": office.offset.dx,
                "offsetY": office.offset.dy,
            })
        })
        .collect();

    json!({
        "id": map.id(),
        "name": map.name(),
        "roads": roads,
        "buildings": buildings,
        "offices": offices,
        "lootTypes": map.loot_types(),
    })
}

async fn map_by_id(
    State(state): State<Arc<AppState>>,
    method: Method,
    Path(map_id): Path<String>,
) -> Response {
    if !is_read_method(&method) {
        return method_not_allowed("GET, HEAD", "Only GET and HEAD are expected for a map");
    }

    let app = state.app.lock().await;
    match app.find_map(&map_id) {
        Some(map) => json_response(StatusCode::OK, map_descriptor(map).to_string()),
        None => error_response(StatusCode::NOT_FOUND, "mapNotFound", "Map not found"),
    }
}

async fn join_game(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return method_not_allowed("POST", "Only POST is expected for join");
    }

    let parsed: Option<JsonMap<String, Value>> = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|value| match value {
            Value::Object(object) => Some(object),
            _ => None,
        });
    let valid = has_json_content_type(&headers)
        && parsed.as_ref().is_some_and(|object| {
            object.len() == 2
                && object.get("userName").is_some_and(Value::is_string)
                && object.get("mapId").is_some_and(Value::is_string)
        });
    let Some(object) = parsed.filter(|_| valid) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalidArgument",
            "Join game request parse error",
        );
    };

    let user_name = object["userName"].as_str().unwrap_or_default().to_string();
    let map_id = object["mapId"].as_str().unwrap_or_default().to_string();

    if user_name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "invalidArgument", "Invalid name");
    }

    let mut app = state.app.lock().await;
    if !app.map_exists(&map_id) {
        return error_response(StatusCode::NOT_FOUND, "mapNotFound", "Map not found");
    }
    let Some((player_id, token)) = app.join(&user_name, &map_id) else {
        return error_response(StatusCode::NOT_FOUND, "mapNotFound", "Map not found");
    };

    json_response(
        StatusCode::OK,
        json!({ "authToken": token.as_str(), "playerId": player_id }).to_string(),
    )
}

async fn session_players(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    if !is_read_method(&method) {
        return method_not_allowed("GET, HEAD", "Only GET and HEAD are expected for players");
    }
    let Some(token) = bearer_token(&headers) else {
        return invalid_token_response("Authorization header is missing or invalid");
    };

    let app = state.app.lock().await;
    let Some(players) = app.players_in_session_by_token(&token) else {
        return unknown_token_response();
    };

    let mut body = JsonMap::new();
    for player in players {
        body.insert(player.id().to_string(), json!({ "name": player.name() }));
    }
    json_response(StatusCode::OK, Value::Object(body).to_string())
}

async fn session_state(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    if !is_read_method(&method) {
        return method_not_allowed("GET, HEAD", "Only GET and HEAD are expected for state");
    }
    let Some(token) = bearer_token(&headers) else {
        return invalid_token_response("Authorization header is missing or invalid");
    };

    let app = state.app.lock().await;
    let Some(session_id) = app.session_id_by_token(&token) else {
        return unknown_token_response();
    };
    let Some(players) = app.players_in_session_by_token(&token) else {
        return unknown_token_response();
    };

    let mut players_body = JsonMap::new();
    for player in players {
        let Some(dog) = app.dog(session_id, player.dog_id()) else {
            continue;
        };
        let bag: Vec<Value> = dog
            .bag()
            .items()
            .iter()
            .map(|item| json!({ "id": item.id, "type": item.type_index }))
            .collect();
        players_body.insert(
            player.id().to_string(),
            json!({
                "pos": [dog.coords().x, dog.coords().y],
                "speed": [dog.velocity().vx, dog.velocity().vy],
                "dir": dog.direction(),
                "bag": bag,
                "score": dog.score(),
            }),
        );
    }

    let mut lost_objects_body = JsonMap::new();
    if let Some(lost_objects) = app.lost_objects_by_token(&token) {
        for object in lost_objects.values() {
            lost_objects_body.insert(
                object.id().to_string(),
                json!({
                    "type": object.type_index(),
                    "pos": [object.pos().x, object.pos().y],
                }),
            );
        }
    }

    json_response(
        StatusCode::OK,
        json!({ "players": players_body, "lostObjects": lost_objects_body }).to_string(),
    )
}

fn is_valid_move(value: &str) -> bool {
    matches!(value, "U" | "D" | "L" | "R" | "")
}

async fn player_action(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return method_not_allowed("POST", "Only POST is expected for action");
    }
    if !has_json_content_type(&headers) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalidArgument",
            "Invalid content type",
        );
    }

    let parsed = serde_json::from_slice::<Value>(&body).ok();
    let move_command = parsed.as_ref().and_then(|value| {
        let object = value.as_object()?;
        if object.len() != 1 {
            return None;
        }
        let command = object.get("move")?.as_str()?;
        is_valid_move(command).then(|| command.to_string())
    });
    let Some(move_command) = move_command else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalidArgument",
            "Failed to parse action",
        );
    };

    let Some(token) = bearer_token(&headers) else {
        return invalid_token_response("Authorization header is missing or invalid");
    };

    let mut app = state.app.lock().await;
    if !app.move_dog(&token, &move_command) {
        return unknown_token_response();
    }
    json_response(StatusCode::OK, "{}".to_string())
}

async fn game_tick(
    State(state): State<Arc<AppState>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    {
        let app = state.app.lock().await;
        if !app.is_manual_tick() {
            return error_response(StatusCode::BAD_REQUEST, "badRequest", "Invalid endpoint");
        }
    }

    if method != Method::POST {
        return method_not_allowed("POST", "Only POST is expected for tick");
    }
    if !has_json_content_type(&headers) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalidArgument",
            "Invalid content type",
        );
    }

    let time_delta = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|value| {
            let object = value.as_object()?;
            if object.len() != 1 {
                return None;
            }
            object.get("timeDelta")?.as_u64()
        });
    let Some(time_delta) = time_delta else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalidArgument",
            "Failed to parse tick",
        );
    };

    let retired = {
        let mut app = state.app.lock().await;
        match app.update_game_state(time_delta) {
            Ok(retired) => retired,
            Err(error) => {
                error!("manual tick failed: {error}");
                return internal_error("Tick failed");
            }
        }
    };

    for info in &retired {
        if let Err(error) = state.records.save(info).await {
            error!("failed to store retired player record: {error}");
            return internal_error("Failed to store records");
        }
    }

    json_response(StatusCode::OK, "{}".to_string())
}

async fn game_records(
    State(state): State<Arc<AppState>>,
    method: Method,
    Query(params): Query<std::collections::HashMap<String, String>>,
) -> Response {
    if method != Method::GET {
        return method_not_allowed("GET", "Only GET is expected for records");
    }

    let parse = |key: &str, default: i64| -> Option<i64> {
        match params.get(key) {
            Some(raw) => raw.parse::<i64>().ok().filter(|value| *value >= 0),
            None => Some(default),
        }
    };
    let (Some(start), Some(max_items)) = (parse("start", 0), parse("maxItems", MAX_RECORD_ITEMS))
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalidArgument",
            "Invalid records query",
        );
    };
    if max_items > MAX_RECORD_ITEMS {
        return error_response(
            StatusCode::BAD_REQUEST,
            "invalidArgument",
            "maxItems must not exceed 100",
        );
    }

    let rows = match state.records.records(start, max_items).await {
        Ok(rows) => rows,
        Err(error) => {
            error!("failed to read records: {error}");
            return internal_error("Failed to read records");
        }
    };

    let body: Vec<Value> = rows
        .into_iter()
        .map(|row| {
            json!({
                "name": row.name,
                "score": row.score,
                "playTime": row.play_time_ms as f64 / 1000.0,
            })
        })
        .collect();
    json_response(StatusCode::OK, Value::Array(body).to_string())
}
