pub mod handlers;
pub mod server;
pub mod types;

pub use server::{cors_layer, router, serve, AppState};
