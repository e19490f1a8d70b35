#[derive(Debug, Clone)]
pub struct Post {
    pub id: i64,
    pub username: String,
    pub title: String,
    pub categories: Vec<String>,
    pub content: String,
    pub created_at: String,
    pub upvotes: i64,
    pub downvotes: i64,
}

#[derive(Debug, Clone)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub username: String,
    pub content: String,
    pub created_at: String,
}

/// Row data for a freshly registered user, already logged in.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub cookie: String,
    pub expires: String,
}

/// What a login attempt is checked against.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Owner of a session cookie and the moment it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub username: String,
    pub expires: String,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub username: String,
    pub title: String,
    pub categories: Vec<String>,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub username: String,
    pub content: String,
    pub created_at: String,
}
