use askama::Template;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::auth::session;
use crate::db::models::{Comment, NewPost, Post};
use crate::db::TIMESTAMP_FORMAT;
use crate::error::{AppError, AppResult};
use crate::extractors::MaybeUser;
use crate::forum::domain::validate_categories;
use crate::forum::{PostFilter, VoteValue};
use crate::routes::found;
use crate::routes::home::Html;
use crate::state::AppState;

// --- View structs ---

pub struct PostView {
    pub id: i64,
    pub username: String,
    pub title: String,
    pub categories: Vec<String>,
    pub content: String,
    pub created_at: String,
    pub upvotes: i64,
    pub downvotes: i64,
    pub score: i64,
}

impl From<Post> for PostView {
    fn from(post: Post) -> Self {
        Self {
            score: post.upvotes - post.downvotes,
            created_at: parse_and_format_time(&post.created_at),
            id: post.id,
            username: post.username,
            title: post.title,
            categories: post.categories,
            content: post.content,
            upvotes: post.upvotes,
            downvotes: post.downvotes,
        }
    }
}

pub struct CommentView {
    pub username: String,
    pub content: String,
    pub created_at: String,
}

impl From<Comment> for CommentView {
    fn from(comment: Comment) -> Self {
        Self {
            created_at: parse_and_format_time(&comment.created_at),
            username: comment.username,
            content: comment.content,
        }
    }
}

// --- Templates ---

#[derive(Template)]
#[template(path = "pages/post.html")]
pub struct PostTemplate {
    pub post: PostView,
    pub comments: Vec<CommentView>,
    pub username: Option<String>,
    pub upvoted: bool,
    pub downvoted: bool,
}

#[derive(Template)]
#[template(path = "pages/posts.html")]
pub struct PostsTemplate {
    pub heading: String,
    pub posts: Vec<PostView>,
    pub username: Option<String>,
}

// --- Forms ---

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CreatePostForm {
    pub title: String,
    pub content: String,
    pub categories: Vec<String>,
}

impl CreatePostForm {
    /// Collect the raw form pairs; `categories[]` may repeat.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut form = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "title" => form.title = value.trim().to_string(),
                "content" => form.content = value.trim().to_string(),
                "categories[]" | "categories" => form.categories.push(value),
                _ => {}
            }
        }
        form
    }
}

#[derive(Deserialize)]
pub struct PostQuery {
    pub id: Option<String>,
}

#[derive(Deserialize)]
pub struct FilterQuery {
    pub by: Option<String>,
    pub category: Option<String>,
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/createpost", post(create_post))
        .route("/post", get(show_post))
        .route("/posts", get(list_posts))
        .route("/filter", get(filter_posts))
}

// --- Handlers ---

async fn create_post(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Form(pairs): Form<Vec<(String, String)>>,
) -> AppResult<Response> {
    let Some(user) = user else {
        return Ok(found("/login"));
    };

    let form = CreatePostForm::from_pairs(pairs);
    if form.title.is_empty() {
        return Err(AppError::BadRequest("Post title cannot be empty".into()));
    }
    if form.content.is_empty() {
        return Err(AppError::BadRequest("Post content cannot be empty".into()));
    }

    let known = state.repo.categories().await?;
    validate_categories(&form.categories, &known)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let post = NewPost {
        username: user.username,
        title: form.title,
        categories: form.categories,
        content: form.content,
        created_at: session::format_timestamp(&session::now()),
    };
    let post_id = state.repo.create_post(&post).await?;

    tracing::info!(
        "Post {} created by {} with title {}",
        post_id,
        post.username,
        post.title
    );

    Ok((StatusCode::OK, "Post created").into_response())
}

async fn show_post(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Query(query): Query<PostQuery>,
) -> AppResult<Html<PostTemplate>> {
    let post_id = parse_post_id(query.id.as_deref())?;

    let post = state.repo.post(post_id).await?.ok_or(AppError::NotFound)?;
    let comments = state.repo.comments(post_id).await?;

    let username = maybe_user.username();
    let user_vote = match &username {
        Some(name) => state.repo.vote(name, post_id).await?,
        None => None,
    };

    Ok(Html(PostTemplate {
        post: post.into(),
        comments: comments.into_iter().map(CommentView::from).collect(),
        username,
        upvoted: user_vote == Some(VoteValue::Up),
        downvoted: user_vote == Some(VoteValue::Down),
    }))
}

async fn list_posts(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
) -> AppResult<Html<PostsTemplate>> {
    let posts = state.repo.posts(&PostFilter::All).await?;

    Ok(Html(PostsTemplate {
        heading: "All posts".to_string(),
        posts: posts.into_iter().map(PostView::from).collect(),
        username: maybe_user.username(),
    }))
}

async fn filter_posts(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Query(query): Query<FilterQuery>,
) -> AppResult<Html<PostsTemplate>> {
    let username = maybe_user.username();

    let (filter, heading) = match query.by.as_deref() {
        // No category name lists everything
        Some("category") => match query.category.filter(|c| !c.is_empty()) {
            Some(category) => {
                let heading = format!("Category: {}", category);
                (PostFilter::Category(category), heading)
            }
            None => (PostFilter::All, "All posts".to_string()),
        },
        Some("myposts") => {
            let name = username.clone().ok_or(AppError::Unauthorized)?;
            (PostFilter::Author(name), "My posts".to_string())
        }
        Some("liked") => {
            let name = username.clone().ok_or(AppError::Unauthorized)?;
            (PostFilter::LikedBy(name), "Liked posts".to_string())
        }
        _ => return Err(AppError::BadRequest("Invalid request".into())),
    };

    let posts = state.repo.posts(&filter).await?;

    Ok(Html(PostsTemplate {
        heading,
        posts: posts.into_iter().map(PostView::from).collect(),
        username,
    }))
}

pub(crate) fn parse_post_id(raw: Option<&str>) -> AppResult<i64> {
    raw.and_then(|id| id.trim().parse::<i64>().ok())
        .ok_or_else(|| AppError::BadRequest("Invalid post id".into()))
}

// --- Time formatting ---

fn parse_and_format_time(db_time: &str) -> String {
    NaiveDateTime::parse_from_str(db_time, TIMESTAMP_FORMAT)
        .map(|dt| format_relative_time(&dt, &session::now()))
        .unwrap_or_else(|_| db_time.to_string())
}

pub fn format_relative_time(dt: &NaiveDateTime, now: &NaiveDateTime) -> String {
    let diff = now.signed_duration_since(*dt);

    if diff.num_seconds() < 60 {
        return "just now".to_string();
    }
    if diff.num_minutes() < 60 {
        return format!("{}m ago", diff.num_minutes());
    }
    if diff.num_hours() < 24 {
        return format!("{}h ago", diff.num_hours());
    }
    if diff.num_days() < 7 {
        return format!("{}d ago", diff.num_days());
    }

    dt.format("%b %-d, %Y").to_string()
}

// --- Tests ---
