// Export route modules
pub mod chat;
pub mod health;
pub mod search;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

use crate::state::AppState;
use axum::Router;

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(chat::routes(state.clone()))
        .merge(session::routes(state.clone()))
        .merge(search::routes(state))
}
