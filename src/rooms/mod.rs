mod client;
pub mod hub;
pub mod room;
mod ws;

use std::sync::Arc;

use axum::{debug_handler, extract::{Path, Query, State}, routing::get, Json, Router};
use serde::Deserialize;

use crate::models::Message;
use crate::store::MessageStore;
use crate::{AppResult, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws/{room_id}", get(ws::room_ws))
        .route("/rooms/{room_id}/messages", get(history))
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[debug_handler(state = crate::AppState)]
async fn history(
    Path(room_id): Path<String>,
    Query(HistoryQuery { limit, offset }): Query<HistoryQuery>,
    State(store): State<Arc<dyn MessageStore>>,
) -> AppResult<Json<Vec<Message>>> {
    let messages = store
        .room_messages(&room_id, limit.unwrap_or(50), offset.unwrap_or(0))
        .await?;
    Ok(Json(messages))
}
