use crate::core::config::AppState;
use crate::core::error::{Error, Result};
use crate::core::models::Identity;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use tracing::info;

/// Durable presence record merged with live registry state
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPresence {
    pub uid: String,
    pub name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    /// Flag as last written to the store
    pub online: bool,
    /// Whether a live session exists right now
    pub connected: bool,
}

/// GET /presence
///
/// Same normalized snapshot that `update_users` broadcasts.
pub async fn get_presence(State(state): State<AppState>) -> Json<Vec<Identity>> {
    Json(state.engine.registry().online_users())
}

/// GET /users/:uid
pub async fn get_user_presence(
    Path(uid): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<UserPresence>> {
    info!("GET /users/{}", uid);

    if uid.trim().is_empty() {
        return Err(Error::BadRequest("uid must not be empty".to_string()));
    }

    let record = state
        .store
        .get_user(&uid)
        .await?
        .ok_or_else(|| Error::UserNotFound { uid: uid.clone() })?;

    Ok(Json(UserPresence {
        connected: state.engine.registry().contains(&record.uid),
        uid: record.uid,
        name: record.name,
        photo_url: record.photo_url,
        online: record.online,
    }))
}
