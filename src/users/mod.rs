use axum::{middleware, routing::get, Router};

use crate::{auth::middleware::protect, state::AppState};

pub mod handlers;
#[cfg(test)]
pub mod memory;
pub mod model;
pub mod pg;
pub mod resolver;
pub mod store;

pub use model::{Role, User};
pub use resolver::Users;
pub use store::{Selection, UserStore};

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(handlers::admin_routes())
        .route(
            "/users/me",
            get(handlers::get_me).delete(handlers::deactivate_me),
        )
        .route_layer(middleware::from_fn_with_state(state, protect))
}
