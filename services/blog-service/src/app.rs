use axum::{
    extract::FromRef,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::{get, patch, post, put},
    Router,
};
use common_auth::SharedIdentitySource;
use common_http_errors::{http_error_metrics_layer, render_metrics};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::handlers::{
    create_category, create_comment, create_post, delete_category, delete_comment, delete_post,
    get_post, hide_comment, like_comment, like_post, list_categories, list_comments, list_posts,
    update_category, update_post,
};
use crate::store::BlogStore;

pub const SERVICE_NAME: &str = "blog-service";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: BlogStore,
    pub identity: SharedIdentitySource,
}

impl AppState {
    pub fn new(identity: SharedIdentitySource) -> Self {
        Self { store: BlogStore::new(), identity }
    }
}

impl FromRef<AppState> for SharedIdentitySource {
    fn from_ref(state: &AppState) -> Self {
        state.identity.clone()
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics() -> String {
    render_metrics()
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:id", put(update_category).delete(delete_category))
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/:id", get(get_post).put(update_post).delete(delete_post))
        .route("/posts/:id/comments", get(list_comments).post(create_comment))
        .route("/posts/:id/like", post(like_post))
        .route("/comments/:id/hide", patch(hide_comment))
        .route("/comments/:id", axum::routing::delete(delete_comment))
        .route("/comments/:id/like", post(like_comment))
        .with_state(state)
        .layer(middleware::from_fn(http_error_metrics_layer(SERVICE_NAME)))
}

pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        ))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION])
}
