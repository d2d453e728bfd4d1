pub mod auth;
pub mod credentials;
pub mod error;
pub mod extract;
pub mod guard;
pub mod messages;
pub mod state;
pub mod tokens;
pub mod users;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::state::AppState;

/// All msgly routes. Everything except `/auth/*` sits behind the bearer-token guard.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/users", get(users::list_users))
        .route("/users/{username}", get(users::get_user))
        .route("/users/{username}/from", get(users::messages_from))
        .route("/users/{username}/to", get(users::messages_to))
        .route("/messages", post(messages::send_message))
        .route("/messages/{id}", get(messages::get_message))
        .route("/messages/{id}/read", post(messages::mark_message_read))
        .route_layer(middleware::from_fn_with_state(state.clone(), guard::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
