use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use common_auth::{
    ensure_authorized, ensure_role, Action, AuthContext, CATEGORY_ADMIN_ROLES,
};
use common_http_errors::{ApiError, ApiResult};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::app::AppState;
use crate::store::{Author, Category, CommentView, Id, LikeOutcome, PostInput, PostView, StoreError};

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(kind, _) => ApiError::not_found(match kind {
                "post" => "post_not_found",
                "comment" => "comment_not_found",
                "category" => "category_not_found",
                _ => "not_found",
            }),
            StoreError::DuplicateCategory(name) => {
                ApiError::conflict("category_exists", format!("category '{name}' already exists"))
            }
        }
    }
}

fn author_of(auth: &AuthContext) -> Author {
    Author {
        subject: auth.subject().to_string(),
        role: auth.identity.primary_role().map(str::to_string),
    }
}

fn like_body(outcome: LikeOutcome) -> Value {
    match outcome {
        LikeOutcome::Liked(count) => json!({ "likes": count }),
        LikeOutcome::AlreadyLiked => json!({ "detail": "already liked" }),
    }
}

#[derive(Deserialize)]
pub struct CategoryName {
    pub name: String,
}

impl CategoryName {
    fn validated(self) -> ApiResult<String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ApiError::bad_request("invalid_category", "category name must not be empty"));
        }
        Ok(name.to_string())
    }
}

#[derive(Deserialize)]
pub struct NewComment {
    pub content: String,
}

pub async fn list_categories(State(state): State<AppState>) -> Json<Vec<Category>> {
    Json(state.store.list_categories().await)
}

pub async fn create_category(
    State(state): State<AppState>,
    auth: AuthContext,
    body: Result<Json<CategoryName>, JsonRejection>,
) -> ApiResult<Json<Category>> {
    ensure_authorized(&auth, Action::CreateCategory, None)?;
    let Json(body) = body?;
    let category = state.store.create_category(&body.validated()?).await?;
    info!(category_id = category.id, subject = auth.subject(), "category created");
    Ok(Json(category))
}

pub async fn update_category(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(category_id): Path<Id>,
    body: Result<Json<CategoryName>, JsonRejection>,
) -> ApiResult<Json<Category>> {
    ensure_role(&auth, CATEGORY_ADMIN_ROLES)?;
    let Json(body) = body?;
    let category = state.store.rename_category(category_id, &body.validated()?).await?;
    Ok(Json(category))
}

pub async fn delete_category(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(category_id): Path<Id>,
) -> ApiResult<Json<Value>> {
    ensure_role(&auth, CATEGORY_ADMIN_ROLES)?;
    state.store.delete_category(category_id).await?;
    Ok(Json(json!({ "detail": "deleted" })))
}

pub async fn list_posts(State(state): State<AppState>) -> Json<Vec<PostView>> {
    Json(state.store.list_posts().await)
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<Id>,
) -> ApiResult<Json<PostView>> {
    Ok(Json(state.store.get_post(post_id).await?))
}

pub async fn create_post(
    State(state): State<AppState>,
    auth: AuthContext,
    input: Result<Json<PostInput>, JsonRejection>,
) -> ApiResult<Json<PostView>> {
    let Json(input) = input?;
    let post = state.store.create_post(input, author_of(&auth)).await;
    info!(post_id = post.id, subject = auth.subject(), "post created");
    Ok(Json(post))
}

pub async fn update_post(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(post_id): Path<Id>,
    input: Result<Json<PostInput>, JsonRejection>,
) -> ApiResult<Json<PostView>> {
    let Json(input) = input?;
    let post = state
        .store
        .update_post(post_id, input, |owner| {
            ensure_authorized(&auth, Action::Edit, Some(owner)).map_err(ApiError::from)
        })
        .await?;
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(post_id): Path<Id>,
) -> ApiResult<Json<Value>> {
    state
        .store
        .delete_post(post_id, |owner| {
            ensure_authorized(&auth, Action::Delete, Some(owner)).map_err(ApiError::from)
        })
        .await?;
    info!(post_id, subject = auth.subject(), "post deleted");
    Ok(Json(json!({ "detail": "deleted" })))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<Id>,
) -> ApiResult<Json<Vec<CommentView>>> {
    Ok(Json(state.store.list_comments(post_id).await?))
}

pub async fn create_comment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(post_id): Path<Id>,
    body: Result<Json<NewComment>, JsonRejection>,
) -> ApiResult<Json<CommentView>> {
    let Json(body) = body?;
    let comment = state
        .store
        .create_comment(post_id, body.content, author_of(&auth))
        .await?;
    Ok(Json(comment))
}

/// Role is checked before existence, so non-moderators get 403 even for unknown ids.
pub async fn hide_comment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(comment_id): Path<Id>,
) -> ApiResult<Json<Value>> {
    ensure_authorized(&auth, Action::Hide, None)?;
    state.store.hide_comment(comment_id).await?;
    info!(comment_id, subject = auth.subject(), "comment hidden");
    Ok(Json(json!({ "detail": "hidden" })))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(comment_id): Path<Id>,
) -> ApiResult<Json<Value>> {
    state
        .store
        .delete_comment(comment_id, |owner| {
            ensure_authorized(&auth, Action::Delete, Some(owner)).map_err(ApiError::from)
        })
        .await?;
    Ok(Json(json!({ "detail": "deleted" })))
}

pub async fn like_post(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(post_id): Path<Id>,
) -> ApiResult<Json<Value>> {
    let outcome = state.store.like_post(post_id, auth.subject()).await?;
    Ok(Json(like_body(outcome)))
}

pub async fn like_comment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(comment_id): Path<Id>,
) -> ApiResult<Json<Value>> {
    let outcome = state.store.like_comment(comment_id, auth.subject()).await?;
    Ok(Json(like_body(outcome)))
}
