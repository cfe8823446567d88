use std::sync::Arc;

use axum::Router;

use crate::main_lib::AppState;

mod documents;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().merge(documents::router())
}
