use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::Html,
    routing::{delete, get, post},
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::{
    error::AppError,
    fetch,
    pages::Namespace,
    polish::{PolishMode, polish},
    profiles::{Profile, ProfileSet},
    state::AppState,
};

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/config", get(get_config).post(replace_config))
        .route(
            "/config/{profile}",
            get(get_profile).post(create_profile).delete(delete_profile),
        )
        .route("/config/{profile}/{param}", post(update_profile))
        .route("/{ns}/search/{query}", get(search_page))
        .route("/{ns}/{title}", get(plain_page))
        .route("/{ns}/{title}/{final_page}", get(final_page))
        .route("/{ns}/{title}/{letter}/{position}", get(letter_page))
        .with_state(state)
}

fn parse_ns(segment: &str) -> Result<Namespace, AppError> {
    Namespace::from_route(segment)
        .ok_or_else(|| AppError::NotFound(format!("namespace \"{segment}\"")))
}

// --- Page surface ---

async fn plain_page(
    State(state): State<Arc<AppState>>,
    Path((ns, title)): Path<(String, String)>,
) -> Result<Html<String>, AppError> {
    let ns = parse_ns(&ns)?;
    info!("{} -> {title}", ns.route_name());

    let html = fetch::fetch_page(&state.http, ns.host(&state.config), &title).await?;
    Ok(Html(polish(&html, &PolishMode::Plain, ns)))
}

async fn letter_page(
    State(state): State<Arc<AppState>>,
    Path((ns, title, letter, position)): Path<(String, String, String, String)>,
) -> Result<Html<String>, AppError> {
    let ns = parse_ns(&ns)?;
    let letter = parse_letter(&letter)?;
    let position = parse_position(&position)?;
    info!(
        "{} -> {title} | letter -> {letter} | position -> {position}",
        ns.route_name()
    );

    let html = fetch::fetch_page(&state.http, ns.host(&state.config), &title).await?;
    Ok(Html(polish(&html, &PolishMode::Letter { letter, position }, ns)))
}

async fn final_page(
    State(state): State<Arc<AppState>>,
    Path((ns, title, final_page)): Path<(String, String, String)>,
) -> Result<Html<String>, AppError> {
    let ns = parse_ns(&ns)?;
    info!("{} -> {title} | final page -> {final_page}", ns.route_name());

    let html = fetch::fetch_page(&state.http, ns.host(&state.config), &title).await?;
    Ok(Html(polish(&html, &PolishMode::Final { final_page }, ns)))
}

async fn search_page(
    State(state): State<Arc<AppState>>,
    Path((ns, query)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let ns = parse_ns(&ns)?;
    info!("searched -> \"{query}\"");

    let results = fetch::search(&state.http, ns.host(&state.config), &query).await?;
    Ok(Json(results))
}

/// Letter must be exactly one alphabetic character.
fn parse_letter(raw: &str) -> Result<char, AppError> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_alphabetic() => Ok(c),
        _ => Err(AppError::Validation(format!("letter \"{raw}\""))),
    }
}

/// Position is one-based on the wire; converts to zero-based and rejects
/// anything that would land below zero.
fn parse_position(raw: &str) -> Result<usize, AppError> {
    let wire: i64 = raw
        .parse()
        .map_err(|_| AppError::Validation(format!("position \"{raw}\"")))?;
    let zero_based = wire - 1;
    if zero_based < 0 {
        return Err(AppError::Validation(format!("position \"{raw}\"")));
    }
    Ok(zero_based as usize)
}

// --- Config surface ---

#[derive(Deserialize)]
struct UpdateBody {
    value: Value,
}

async fn get_config(State(state): State<Arc<AppState>>) -> Json<ProfileSet> {
    Json(state.profiles.snapshot())
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(profile): Path<String>,
) -> Result<Json<Profile>, AppError> {
    Ok(Json(state.profiles.get(&profile)?))
}

async fn create_profile(
    State(state): State<Arc<AppState>>,
    Path(profile): Path<String>,
) -> Result<(StatusCode, Json<Profile>), AppError> {
    let created = state.profiles.create(&profile)?;
    info!("profile {profile} created");
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_profile(
    State(state): State<Arc<AppState>>,
    Path((profile, param)): Path<(String, String)>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<Profile>, AppError> {
    let updated = state.profiles.update(&profile, &param, body.value)?;
    info!("profile {profile} updated ({param})");
    Ok(Json(updated))
}

async fn delete_profile(
    State(state): State<Arc<AppState>>,
    Path(profile): Path<String>,
) -> Result<StatusCode, AppError> {
    state.profiles.delete(&profile)?;
    info!("profile {profile} deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn replace_config(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Result<StatusCode, AppError> {
    if !body.get("profiles").is_some_and(Value::is_object) {
        return Err(AppError::Validation("invalid config format".to_string()));
    }
    let set: ProfileSet = serde_json::from_value(body)
        .map_err(|e| AppError::Validation(format!("invalid config format: {e}")))?;

    state.profiles.replace(set)?;
    info!("config replaced");
    Ok(StatusCode::OK)
}
