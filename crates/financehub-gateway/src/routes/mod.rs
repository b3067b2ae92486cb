use actix_web::web;

use crate::state::AppState;

pub mod gateway;
pub mod health;

/// Everything the gateway serves: its own endpoints plus the catch-all
/// that classifies and forwards every other request.
pub fn configure(state: web::Data<AppState>) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg| {
        cfg.app_data(state)
            .configure(health::configure)
            .default_service(web::to(gateway::handle));
    }
}
