pub mod bridge;
pub mod config;
pub mod models;
pub mod rooms;
pub mod store;

use std::sync::Arc;

use axum::{extract::FromRef, http::StatusCode, response::{IntoResponse, Response}};

use bridge::{consumer::BridgeHealth, producer::EnvelopePublisher};
use config::Limits;
use rooms::hub::Hub;
use store::MessageStore;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub store: Arc<dyn MessageStore>,
    pub publisher: Arc<dyn EnvelopePublisher>,
    pub limits: Limits,
    pub bridge_health: BridgeHealth,
}

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{}\n\n{}", self.0, self.0.backtrace()),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
