pub mod error;
pub mod health;
pub mod refresh;
pub mod station;
pub mod stations;

pub use error::ErrorResponse;

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::gtfs::DepartureBoard;

#[derive(Clone)]
pub struct AppState {
    pub board: Arc<DepartureBoard>,
}

pub fn router(board: Arc<DepartureBoard>) -> Router {
    let state = AppState { board };
    Router::new()
        .route("/station/{station_id}", get(station::get_station_board))
        .route("/stations-list", get(stations::list_stations))
        .route("/lookup/{stop_id}", get(stations::lookup_stop))
        .route("/refresh", get(refresh::refresh_feed))
        .route("/health", get(health::health_check))
        .with_state(state)
}
