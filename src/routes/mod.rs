// Route exports
pub mod users;
pub mod webhooks;

use actix_web::web;
use crate::core::ProfileSync;
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub sync: Arc<ProfileSync>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(webhooks::configure).service(
        web::scope("/api/v1")
            .configure(users::configure),
    );
}
