use crate::api::AppState;
use crate::api::middleware::AuthSession;
use crate::api::schemas::items::ItemQuery;
use crate::domain::item::{Item, ItemCreate, ItemUpdate};
use crate::domain::user::{ProfileUpdate, UserInfo, UserProfile};
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

pub async fn list_items(
    session: AuthSession,
    State(state): State<AppState>,
    Query(query): Query<ItemQuery>,
) -> Result<Json<Vec<Item>>> {
    Ok(Json(state.backend.list_items(session.access_token(), query.all_items).await?))
}

pub async fn list_my_items(session: AuthSession, State(state): State<AppState>) -> Result<Json<Vec<Item>>> {
    Ok(Json(state.backend.list_my_items(session.access_token()).await?))
}

pub async fn get_item(session: AuthSession, State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<Item>> {
    Ok(Json(state.backend.get_item(session.access_token(), id).await?))
}

pub async fn create_item(
    session: AuthSession,
    State(state): State<AppState>,
    Json(payload): Json<ItemCreate>,
) -> Result<impl IntoResponse> {
    payload.validate().map_err(AppError::BadRequest)?;
    let item = state.backend.create_item(session.access_token(), &payload).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn update_item(
    session: AuthSession,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<ItemUpdate>,
) -> Result<Json<Item>> {
    payload.validate().map_err(AppError::BadRequest)?;
    Ok(Json(state.backend.update_item(session.access_token(), id, &payload).await?))
}

pub async fn delete_item(session: AuthSession, State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode> {
    state.backend.delete_item(session.access_token(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn current_user(session: AuthSession, State(state): State<AppState>) -> Result<Json<UserInfo>> {
    Ok(Json(state.backend.current_user(session.access_token()).await?))
}

pub async fn get_profile(session: AuthSession, State(state): State<AppState>) -> Result<Json<UserProfile>> {
    Ok(Json(state.backend.get_profile(session.access_token()).await?))
}

pub async fn update_profile(
    session: AuthSession,
    State(state): State<AppState>,
    Json(payload): Json<ProfileUpdate>,
) -> Result<Json<UserProfile>> {
    Ok(Json(state.backend.update_profile(session.access_token(), &payload).await?))
}

pub async fn list_users(session: AuthSession, State(state): State<AppState>) -> Result<Json<Vec<UserProfile>>> {
    Ok(Json(state.backend.list_users(session.access_token()).await?))
}
