pub mod auth;
pub mod billing;
pub mod chat;
pub mod files;
pub mod messages;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod uploads;

pub use routes::router;
pub use state::{AppState, AppStateInner};
