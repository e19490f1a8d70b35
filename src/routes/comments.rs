use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Router};
use serde::Deserialize;

use crate::auth::session;
use crate::db::models::NewComment;
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::routes::posts::parse_post_id;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateCommentForm {
    #[serde(rename = "postId", default)]
    pub post_id: String,
    #[serde(default)]
    pub content: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/comments", post(create_comment))
}

/// POST /api/comments: members only
async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<CreateCommentForm>,
) -> AppResult<Response> {
    let post_id = parse_post_id(Some(&form.post_id))?;
    let content = form.content.trim().to_string();
    if content.is_empty() {
        return Err(AppError::BadRequest("Comment cannot be empty".into()));
    }

    let comment = NewComment {
        post_id,
        username: user.username,
        content,
        created_at: session::format_timestamp(&session::now()),
    };
    state.repo.add_comment(&comment).await?;

    tracing::info!(
        "Comment created by {} on post {}",
        comment.username,
        comment.post_id
    );

    Ok((StatusCode::OK, "Comment created").into_response())
}
