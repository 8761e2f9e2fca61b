pub mod app;
pub mod config;
pub mod handlers;
pub mod store;

pub use app::{build_router, cors_layer, AppState, SERVICE_NAME};
pub use config::ServiceConfig;
pub use store::BlogStore;
