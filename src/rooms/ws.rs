use std::sync::Arc;

use axum::{debug_handler, extract::{Path, State, WebSocketUpgrade}, response::IntoResponse};

use crate::bridge::producer::EnvelopePublisher;
use crate::config::Limits;
use crate::rooms::{client, hub::Hub};
use crate::store::MessageStore;

/// `GET /ws/{room_id}`: upgrade, resolve the room, run the two pumps for the
/// lifetime of the connection. Admission is decided upstream; the room id is
/// taken as-is.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn room_ws(
    Path(room_id): Path<String>,
    State(hub): State<Arc<Hub>>,
    State(store): State<Arc<dyn MessageStore>>,
    State(publisher): State<Arc<dyn EnvelopePublisher>>,
    State(limits): State<Limits>,

    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let (room, guard) = hub.attach(&room_id);

    ws.on_upgrade(move |socket| client::run(socket, room, guard, store, publisher, limits))
}
