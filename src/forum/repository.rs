// Repository pattern - isolates all database side effects
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::sync::Arc;
use thiserror::Error;

use crate::db::models::{Comment, Credentials, NewComment, NewPost, NewUser, Post, SessionRecord};
use crate::forum::domain::{
    join_categories, split_categories, VoteOutcome, VoteRowChange, VoteState, VoteValue,
};
use crate::state::DbPool;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Which post listing to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostFilter {
    All,
    Category(String),
    Author(String),
    LikedBy(String),
}

/// Repository trait - all database operations
#[async_trait]
pub trait ForumRepository: Send + Sync {
    /// Resolve a session cookie to its owner. Empty tokens never match.
    async fn session(&self, token: &str) -> Result<Option<SessionRecord>, RepositoryError>;

    async fn email_taken(&self, email: &str) -> Result<bool, RepositoryError>;

    async fn username_taken(&self, username: &str) -> Result<bool, RepositoryError>;

    /// Insert a user; `Conflict` if the username or email already exists.
    async fn add_user(&self, user: &NewUser) -> Result<i64, RepositoryError>;

    async fn credentials(&self, email: &str) -> Result<Option<Credentials>, RepositoryError>;

    /// Replace the session token and expiry of the user with this email.
    async fn update_session(
        &self,
        email: &str,
        token: &str,
        expires: &str,
    ) -> Result<(), RepositoryError>;

    /// Blank the session token and expiry (the user row stays).
    async fn clear_session(&self, username: &str) -> Result<(), RepositoryError>;

    async fn categories(&self) -> Result<Vec<String>, RepositoryError>;

    async fn create_post(&self, post: &NewPost) -> Result<i64, RepositoryError>;

    async fn post(&self, id: i64) -> Result<Option<Post>, RepositoryError>;

    /// Newest first.
    async fn posts(&self, filter: &PostFilter) -> Result<Vec<Post>, RepositoryError>;

    /// `NotFound` if the post does not exist.
    async fn add_comment(&self, comment: &NewComment) -> Result<i64, RepositoryError>;

    /// Oldest first.
    async fn comments(&self, post_id: i64) -> Result<Vec<Comment>, RepositoryError>;

    async fn vote(&self, username: &str, post_id: i64)
        -> Result<Option<VoteValue>, RepositoryError>;

    /// Atomically resolve a vote against the stored state, updating the
    /// vote row and the post counters in one transaction.
    async fn apply_vote(
        &self,
        username: &str,
        post_id: i64,
        input: VoteValue,
    ) -> Result<VoteOutcome, RepositoryError>;
}

/// SQLite implementation
pub struct SqliteForumRepository {
    pool: DbPool,
}

impl SqliteForumRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const POST_COLUMNS: &str =
    "id, username, title, categories, content, created_at, upvotes, downvotes";

fn post_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Post> {
    let categories: String = row.get(3)?;
    Ok(Post {
        id: row.get(0)?,
        username: row.get(1)?,
        title: row.get(2)?,
        categories: split_categories(&categories),
        content: row.get(4)?,
        created_at: row.get(5)?,
        upvotes: row.get(6)?,
        downvotes: row.get(7)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn post_exists(conn: &Connection, post_id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM posts WHERE id = ?1",
        params![post_id],
        |row| row.get(0),
    )
}

fn stored_vote(
    conn: &Connection,
    username: &str,
    post_id: i64,
) -> rusqlite::Result<Option<VoteValue>> {
    let sign: Option<i64> = conn
        .query_row(
            "SELECT vote FROM votes WHERE username = ?1 AND post_id = ?2",
            params![username, post_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(sign.and_then(VoteValue::from_sign))
}

// --- Vote row CRUD and counters (only called inside a transaction) ---

fn insert_vote(
    conn: &Connection,
    username: &str,
    post_id: i64,
    value: VoteValue,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO votes (username, post_id, vote) VALUES (?1, ?2, ?3)",
        params![username, post_id, value.sign()],
    )?;
    Ok(())
}

fn update_vote(
    conn: &Connection,
    username: &str,
    post_id: i64,
    value: VoteValue,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE votes SET vote = ?3 WHERE username = ?1 AND post_id = ?2",
        params![username, post_id, value.sign()],
    )?;
    Ok(())
}

fn delete_vote(conn: &Connection, username: &str, post_id: i64) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM votes WHERE username = ?1 AND post_id = ?2",
        params![username, post_id],
    )?;
    Ok(())
}

fn adjust_counters(
    conn: &Connection,
    post_id: i64,
    upvotes_delta: i64,
    downvotes_delta: i64,
) -> rusqlite::Result<(i64, i64)> {
    conn.execute(
        "UPDATE posts SET upvotes = upvotes + ?2, downvotes = downvotes + ?3 WHERE id = ?1",
        params![post_id, upvotes_delta, downvotes_delta],
    )?;
    conn.query_row(
        "SELECT upvotes, downvotes FROM posts WHERE id = ?1",
        params![post_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
}

fn apply_vote_in_tx(
    conn: &Connection,
    username: &str,
    post_id: i64,
    input: VoteValue,
) -> Result<VoteOutcome, RepositoryError> {
    if !post_exists(conn, post_id)? {
        return Err(RepositoryError::NotFound(format!("post {}", post_id)));
    }

    let state = VoteState::from_stored(stored_vote(conn, username, post_id)?);
    let transition = state.apply(input);

    match transition.row {
        VoteRowChange::Insert(value) => insert_vote(conn, username, post_id, value)?,
        VoteRowChange::Update(value) => update_vote(conn, username, post_id, value)?,
        VoteRowChange::Delete => delete_vote(conn, username, post_id)?,
    }

    let (upvotes, downvotes) = adjust_counters(
        conn,
        post_id,
        transition.upvotes_delta,
        transition.downvotes_delta,
    )?;

    Ok(VoteOutcome {
        transition,
        upvotes,
        downvotes,
    })
}

#[async_trait]
impl ForumRepository for SqliteForumRepository {
    async fn session(&self, token: &str) -> Result<Option<SessionRecord>, RepositoryError> {
        if token.is_empty() {
            return Ok(None);
        }
        let conn = self.pool.get()?;

        let record = conn
            .query_row(
                "SELECT username, expires FROM users WHERE cookie = ?1",
                params![token],
                |row| {
                    Ok(SessionRecord {
                        username: row.get(0)?,
                        expires: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    async fn email_taken(&self, email: &str) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let taken = conn.query_row(
            "SELECT COUNT(*) > 0 FROM users WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )?;
        Ok(taken)
    }

    async fn username_taken(&self, username: &str) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let taken = conn.query_row(
            "SELECT COUNT(*) > 0 FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )?;
        Ok(taken)
    }

    async fn add_user(&self, user: &NewUser) -> Result<i64, RepositoryError> {
        let conn = self.pool.get()?;

        let result = conn.execute(
            "INSERT INTO users (username, email, password, cookie, expires)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.username,
                user.email,
                user.password_hash,
                user.cookie,
                user.expires
            ],
        );

        match result {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_unique_violation(&e) => Err(RepositoryError::Conflict(format!(
                "user {} / {} already exists",
                user.username, user.email
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn credentials(&self, email: &str) -> Result<Option<Credentials>, RepositoryError> {
        let conn = self.pool.get()?;
        let creds = conn
            .query_row(
                "SELECT username, email, password FROM users WHERE email = ?1",
                params![email],
                |row| {
                    Ok(Credentials {
                        username: row.get(0)?,
                        email: row.get(1)?,
                        password_hash: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(creds)
    }

    async fn update_session(
        &self,
        email: &str,
        token: &str,
        expires: &str,
    ) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute(
            "UPDATE users SET cookie = ?1, expires = ?2 WHERE email = ?3",
            params![token, expires, email],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound(format!("user {}", email)));
        }
        Ok(())
    }

    async fn clear_session(&self, username: &str) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;
        conn.execute(
            "UPDATE users SET cookie = '', expires = '' WHERE username = ?1",
            params![username],
        )?;
        Ok(())
    }

    async fn categories(&self) -> Result<Vec<String>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare("SELECT name FROM categories ORDER BY id")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    async fn create_post(&self, post: &NewPost) -> Result<i64, RepositoryError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO posts (username, title, categories, content, created_at, upvotes, downvotes)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, 0)",
            params![
                post.username,
                post.title,
                join_categories(&post.categories),
                post.content,
                post.created_at
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn post(&self, id: i64) -> Result<Option<Post>, RepositoryError> {
        let conn = self.pool.get()?;
        let post = conn
            .query_row(
                &format!("SELECT {} FROM posts WHERE id = ?1", POST_COLUMNS),
                params![id],
                post_from_row,
            )
            .optional()?;
        Ok(post)
    }

    async fn posts(&self, filter: &PostFilter) -> Result<Vec<Post>, RepositoryError> {
        let conn = self.pool.get()?;

        let (condition, arg) = match filter {
            PostFilter::All => ("1 = 1", None),
            // Substring of the joined list; an empty name matches every post
            PostFilter::Category(name) => (
                "categories LIKE ('%' || ?1 || '%')",
                Some(name.as_str()),
            ),
            PostFilter::Author(username) => ("username = ?1", Some(username.as_str())),
            PostFilter::LikedBy(username) => (
                "id IN (SELECT post_id FROM votes WHERE username = ?1 AND vote = 1)",
                Some(username.as_str()),
            ),
        };

        let sql = format!(
            "SELECT {} FROM posts WHERE {} ORDER BY created_at DESC, id DESC",
            POST_COLUMNS, condition
        );
        let mut stmt = conn.prepare(&sql)?;
        let posts = match arg {
            Some(arg) => stmt.query_map(params![arg], post_from_row)?,
            None => stmt.query_map([], post_from_row)?,
        }
        .collect::<Result<Vec<_>, _>>()?;

        Ok(posts)
    }

    async fn add_comment(&self, comment: &NewComment) -> Result<i64, RepositoryError> {
        let conn = self.pool.get()?;
        if !post_exists(&conn, comment.post_id)? {
            return Err(RepositoryError::NotFound(format!("post {}", comment.post_id)));
        }
        conn.execute(
            "INSERT INTO comments (post_id, username, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                comment.post_id,
                comment.username,
                comment.content,
                comment.created_at
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    async fn comments(&self, post_id: i64) -> Result<Vec<Comment>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, post_id, username, content, created_at
             FROM comments
             WHERE post_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let comments = stmt
            .query_map(params![post_id], |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    post_id: row.get(1)?,
                    username: row.get(2)?,
                    content: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    async fn vote(
        &self,
        username: &str,
        post_id: i64,
    ) -> Result<Option<VoteValue>, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(stored_vote(&conn, username, post_id)?)
    }

    async fn apply_vote(
        &self,
        username: &str,
        post_id: i64,
        input: VoteValue,
    ) -> Result<VoteOutcome, RepositoryError> {
        let mut conn = self.pool.get()?;

        // Take the write lock before reading the current vote.
        // Dropping the transaction without commit rolls it back.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = apply_vote_in_tx(&tx, username, post_id, input)?;
        tx.commit()?;

        Ok(outcome)
    }
}

/// Type alias for Arc-wrapped repository (for AppState)
pub type DynForumRepository = Arc<dyn ForumRepository>;
