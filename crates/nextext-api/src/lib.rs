pub mod auth;
pub mod conversations;
pub mod convert;
pub mod error;
pub mod extract;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod shortcode;
pub mod state;

pub use state::{AppState, AppStateInner};
pub use routes::router;
