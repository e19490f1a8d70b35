use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Router};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::forum::VoteValue;
use crate::routes::posts::parse_post_id;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct VoteForm {
    #[serde(rename = "postId", default)]
    pub post_id: String,
    #[serde(default)]
    pub vote: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/vote", post(cast_vote))
}

/// POST /api/vote: repeat a vote to withdraw it, send the opposite to flip it
async fn cast_vote(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<VoteForm>,
) -> AppResult<Response> {
    let value = form
        .vote
        .parse::<VoteValue>()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let post_id = parse_post_id(Some(&form.post_id))?;

    let outcome = state
        .repo
        .apply_vote(&user.username, post_id, value)
        .await?;

    tracing::info!(
        "{} on post {}: {} -> {} (up {}, down {})",
        user.username,
        post_id,
        outcome.transition.from.state_name(),
        outcome.transition.to.state_name(),
        outcome.upvotes,
        outcome.downvotes
    );

    Ok((StatusCode::OK, outcome.transition.message()).into_response())
}
