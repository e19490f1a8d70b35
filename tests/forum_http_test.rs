use agora::config::Config;
use agora::db;
use agora::routes;
use agora::state::{AppState, DbPool};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    app: Router,
    pool: DbPool,
    _temp: TempDir,
}

fn setup() -> TestApp {
    let temp = TempDir::new().unwrap();
    let pool = db::create_pool(&temp.path().join("test.db")).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");

    let mut config = Config::default();
    config.auth.bcrypt_cost = 4;

    TestApp {
        app: routes::app(AppState::new(pool.clone(), config)),
        pool,
        _temp: temp,
    }
}

struct TestResponse {
    status: StatusCode,
    location: Option<String>,
    set_cookie: Option<String>,
    body: String,
}

impl TestResponse {
    /// `SESSION=<token>` pair from Set-Cookie, ready to send back.
    fn session(&self) -> String {
        self.set_cookie
            .as_deref()
            .and_then(|c| c.split(';').next())
            .expect("response should set a cookie")
            .to_string()
    }
}

async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let header_str = |name: header::HeaderName| {
        response
            .headers()
            .get(name)
            .map(|v| v.to_str().unwrap().to_string())
    };
    let location = header_str(header::LOCATION);
    let set_cookie = header_str(header::SET_COOKIE);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    TestResponse {
        status,
        location,
        set_cookie,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    }
}

async fn get(app: &Router, uri: &str, cookie: Option<&str>) -> TestResponse {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

async fn post_form(app: &Router, uri: &str, body: &str, cookie: Option<&str>) -> TestResponse {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    send(app, builder.body(Body::from(body.to_string())).unwrap()).await
}

async fn register(app: &Router, username: &str, email: &str) -> String {
    let body = format!("username={}&email={}&password=secret", username, email);
    let response = post_form(app, "/api/register", &body, None).await;
    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(response.location.as_deref(), Some("/"));
    response.session()
}

fn count(pool: &DbPool, sql: &str) -> i64 {
    let conn = pool.get().unwrap();
    conn.query_row(sql, [], |row| row.get(0)).unwrap()
}

fn latest_post_id(pool: &DbPool) -> i64 {
    count(pool, "SELECT MAX(id) FROM posts")
}

#[tokio::test]
async fn test_register_sets_session_cookie() {
    let t = setup();
    let response = post_form(
        &t.app,
        "/api/register",
        "username=alice&email=alice%40example.com&password=secret",
        None,
    )
    .await;

    assert_eq!(response.status, StatusCode::FOUND);
    let cookie = response.set_cookie.clone().unwrap();
    assert!(cookie.starts_with("SESSION="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Path=/"));

    let token = response.session().trim_start_matches("SESSION=").to_string();
    let conn = t.pool.get().unwrap();
    let (stored, password): (String, String) = conn
        .query_row(
            "SELECT cookie, password FROM users WHERE username = 'alice'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(stored, token);
    assert_ne!(password, "secret");
}

#[tokio::test]
async fn test_register_rejects_duplicates_and_missing_fields() {
    let t = setup();
    register(&t.app, "alice", "alice@example.com").await;

    let same_email = post_form(
        &t.app,
        "/api/register",
        "username=other&email=alice%40example.com&password=x",
        None,
    )
    .await;
    assert_eq!(same_email.location.as_deref(), Some("/register?err=email_taken"));

    let same_name = post_form(
        &t.app,
        "/api/register",
        "username=alice&email=new%40example.com&password=x",
        None,
    )
    .await;
    assert_eq!(same_name.location.as_deref(), Some("/register?err=username_taken"));

    let missing = post_form(&t.app, "/api/register", "username=bob", None).await;
    assert_eq!(missing.location.as_deref(), Some("/register?err=missing_fields"));

    assert_eq!(count(&t.pool, "SELECT COUNT(*) FROM users"), 1);

    let page = get(&t.app, "/register?err=email_taken", None).await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.body.contains("already registered"));
}

#[tokio::test]
async fn test_login_errors_and_fresh_session() {
    let t = setup();
    let first = register(&t.app, "alice", "alice@example.com").await;

    let unknown = post_form(
        &t.app,
        "/api/login",
        "email=nobody%40example.com&password=secret",
        None,
    )
    .await;
    assert_eq!(unknown.location.as_deref(), Some("/login?err=invalid_email"));
    assert!(unknown.set_cookie.is_none());

    let wrong = post_form(
        &t.app,
        "/api/login",
        "email=alice%40example.com&password=nope",
        None,
    )
    .await;
    assert_eq!(wrong.location.as_deref(), Some("/login?err=invalid_password"));

    let ok = post_form(
        &t.app,
        "/api/login",
        "email=alice%40example.com&password=secret",
        None,
    )
    .await;
    assert_eq!(ok.status, StatusCode::FOUND);
    assert_eq!(ok.location.as_deref(), Some("/"));
    let second = ok.session();
    assert_ne!(first, second);

    // The old token no longer authenticates
    let stale = get(&t.app, "/filter?by=myposts", Some(&first)).await;
    assert_eq!(stale.status, StatusCode::UNAUTHORIZED);
    let fresh = get(&t.app, "/filter?by=myposts", Some(&second)).await;
    assert_eq!(fresh.status, StatusCode::OK);
}

#[tokio::test]
async fn test_index_depends_on_session() {
    let t = setup();
    let anonymous = get(&t.app, "/", None).await;
    assert_eq!(anonymous.status, StatusCode::OK);
    assert!(anonymous.body.contains("Programming"));
    assert!(!anonymous.body.contains("/api/createpost"));

    let cookie = register(&t.app, "alice", "alice@example.com").await;
    let member = get(&t.app, "/", Some(&cookie)).await;
    assert_eq!(member.status, StatusCode::OK);
    assert!(member.body.contains("/api/createpost"));
    assert!(member.body.contains("alice"));
}

#[tokio::test]
async fn test_create_post_validation() {
    let t = setup();

    let anonymous = post_form(
        &t.app,
        "/api/createpost",
        "title=Hi&content=Body&categories%5B%5D=General",
        None,
    )
    .await;
    assert_eq!(anonymous.status, StatusCode::FOUND);
    assert_eq!(anonymous.location.as_deref(), Some("/login"));

    let cookie = register(&t.app, "alice", "alice@example.com").await;

    let bogus = post_form(
        &t.app,
        "/api/createpost",
        "title=Hi&content=Body&categories%5B%5D=General&categories%5B%5D=Bogus",
        Some(&cookie),
    )
    .await;
    assert_eq!(bogus.status, StatusCode::BAD_REQUEST);
    assert_eq!(bogus.body, "Invalid category : Bogus");

    let empty = post_form(&t.app, "/api/createpost", "title=&content=Body", Some(&cookie)).await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    assert_eq!(count(&t.pool, "SELECT COUNT(*) FROM posts"), 0);

    let ok = post_form(
        &t.app,
        "/api/createpost",
        "title=Hello+world&content=First+post&categories%5B%5D=General&categories%5B%5D=TV",
        Some(&cookie),
    )
    .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body, "Post created");

    let conn = t.pool.get().unwrap();
    let (author, categories): (String, String) = conn
        .query_row("SELECT username, categories FROM posts", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
        .unwrap();
    assert_eq!(author, "alice");
    assert_eq!(categories, "General,TV");
}

#[tokio::test]
async fn test_vote_sequence_over_http() {
    let t = setup();
    let cookie = register(&t.app, "alice", "alice@example.com").await;
    post_form(
        &t.app,
        "/api/createpost",
        "title=Votes&content=Body",
        Some(&cookie),
    )
    .await;
    let id = latest_post_id(&t.pool);
    let form = |vote: &str| format!("postId={}&vote={}", id, vote);
    let counters = |pool: &DbPool| {
        let conn = pool.get().unwrap();
        conn.query_row(
            "SELECT upvotes, downvotes FROM posts WHERE id = ?1",
            [id],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )
        .unwrap()
    };

    let up = post_form(&t.app, "/api/vote", &form("1"), Some(&cookie)).await;
    assert_eq!(up.status, StatusCode::OK);
    assert_eq!(up.body, "Upvote added");
    assert_eq!(counters(&t.pool), (1, 0));

    let flip = post_form(&t.app, "/api/vote", &form("-1"), Some(&cookie)).await;
    assert_eq!(flip.body, "Downvote added");
    assert_eq!(counters(&t.pool), (0, 1));

    let removed = post_form(&t.app, "/api/vote", &form("-1"), Some(&cookie)).await;
    assert_eq!(removed.body, "Vote removed");
    assert_eq!(counters(&t.pool), (0, 0));
    assert_eq!(count(&t.pool, "SELECT COUNT(*) FROM votes"), 0);

    let invalid = post_form(&t.app, "/api/vote", &form("2"), Some(&cookie)).await;
    assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
    assert_eq!(invalid.body, "Invalid vote");

    let missing_post = post_form(
        &t.app,
        "/api/vote",
        &format!("postId={}&vote=1", id + 100),
        Some(&cookie),
    )
    .await;
    assert_eq!(missing_post.status, StatusCode::NOT_FOUND);

    let anonymous = post_form(&t.app, "/api/vote", &form("1"), None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(counters(&t.pool), (0, 0));
}

#[tokio::test]
async fn test_expired_session_is_logged_out() {
    let t = setup();
    let cookie = register(&t.app, "alice", "alice@example.com").await;
    {
        let conn = t.pool.get().unwrap();
        conn.execute(
            "UPDATE users SET expires = '2000-01-01 00:00:00' WHERE username = 'alice'",
            [],
        )
        .unwrap();
    }

    let vote = post_form(&t.app, "/api/vote", "postId=1&vote=1", Some(&cookie)).await;
    assert_eq!(vote.status, StatusCode::UNAUTHORIZED);

    let create = post_form(
        &t.app,
        "/api/createpost",
        "title=Late&content=Body",
        Some(&cookie),
    )
    .await;
    assert_eq!(create.location.as_deref(), Some("/login"));

    let index = get(&t.app, "/", Some(&cookie)).await;
    assert!(!index.body.contains("/api/createpost"));
}

#[tokio::test]
async fn test_logout_clears_session() {
    let t = setup();
    let cookie = register(&t.app, "alice", "alice@example.com").await;

    let response = get(&t.app, "/api/logout", Some(&cookie)).await;
    assert_eq!(response.status, StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.location.as_deref(), Some("/"));
    assert!(response.set_cookie.unwrap().contains("Max-Age=0"));

    let conn = t.pool.get().unwrap();
    let stored: String = conn
        .query_row("SELECT cookie FROM users WHERE username = 'alice'", [], |row| row.get(0))
        .unwrap();
    assert_eq!(stored, "");
    drop(conn);

    let after = get(&t.app, "/filter?by=myposts", Some(&cookie)).await;
    assert_eq!(after.status, StatusCode::UNAUTHORIZED);

    // Logging out without a session still redirects home
    let anonymous = get(&t.app, "/api/logout", None).await;
    assert_eq!(anonymous.status, StatusCode::TEMPORARY_REDIRECT);
}

#[tokio::test]
async fn test_filters() {
    let t = setup();
    let alice = register(&t.app, "alice", "alice@example.com").await;
    let bob = register(&t.app, "bob", "bob@example.com").await;

    post_form(
        &t.app,
        "/api/createpost",
        "title=Alice+on+TV&content=Body&categories%5B%5D=TV",
        Some(&alice),
    )
    .await;
    let alice_post = latest_post_id(&t.pool);
    post_form(
        &t.app,
        "/api/createpost",
        "title=Bob+on+Books&content=Body&categories%5B%5D=Books",
        Some(&bob),
    )
    .await;
    post_form(
        &t.app,
        "/api/vote",
        &format!("postId={}&vote=1", alice_post),
        Some(&bob),
    )
    .await;

    let tv = get(&t.app, "/filter?by=category&category=TV", None).await;
    assert_eq!(tv.status, StatusCode::OK);
    assert!(tv.body.contains("Alice on TV"));
    assert!(!tv.body.contains("Bob on Books"));

    // Category names match as substrings, ignoring case
    let partial = get(&t.app, "/filter?by=category&category=book", None).await;
    assert_eq!(partial.status, StatusCode::OK);
    assert!(partial.body.contains("Bob on Books"));
    assert!(!partial.body.contains("Alice on TV"));

    let no_category = get(&t.app, "/filter?by=category", None).await;
    assert_eq!(no_category.status, StatusCode::OK);
    assert!(no_category.body.contains("Alice on TV"));
    assert!(no_category.body.contains("Bob on Books"));

    let mine = get(&t.app, "/filter?by=myposts", Some(&bob)).await;
    assert!(mine.body.contains("Bob on Books"));
    assert!(!mine.body.contains("Alice on TV"));

    let liked = get(&t.app, "/filter?by=liked", Some(&bob)).await;
    assert!(liked.body.contains("Alice on TV"));
    assert!(!liked.body.contains("Bob on Books"));

    let anonymous = get(&t.app, "/filter?by=liked", None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let unknown = get(&t.app, "/filter?by=everything", None).await;
    assert_eq!(unknown.status, StatusCode::BAD_REQUEST);
    assert_eq!(unknown.body, "Invalid request");

    let all = get(&t.app, "/posts", None).await;
    assert!(all.body.contains("Alice on TV"));
    assert!(all.body.contains("Bob on Books"));
}

#[tokio::test]
async fn test_comments_require_session() {
    let t = setup();
    let cookie = register(&t.app, "alice", "alice@example.com").await;
    post_form(&t.app, "/api/createpost", "title=Talk&content=Body", Some(&cookie)).await;
    let id = latest_post_id(&t.pool);

    let anonymous = post_form(
        &t.app,
        "/api/comments",
        &format!("postId={}&content=Hi", id),
        None,
    )
    .await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);

    let ok = post_form(
        &t.app,
        "/api/comments",
        &format!("postId={}&content=Nice+thread", id),
        Some(&cookie),
    )
    .await;
    assert_eq!(ok.status, StatusCode::OK);
    assert_eq!(ok.body, "Comment created");

    let orphan = post_form(
        &t.app,
        "/api/comments",
        &format!("postId={}&content=Lost", id + 1),
        Some(&cookie),
    )
    .await;
    assert_eq!(orphan.status, StatusCode::NOT_FOUND);

    let page = get(&t.app, &format!("/post?id={}", id), None).await;
    assert_eq!(page.status, StatusCode::OK);
    assert!(page.body.contains("Nice thread"));
    assert!(!page.body.contains("Lost"));

    let missing = get(&t.app, &format!("/post?id={}", id + 1), None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_assets_are_served() {
    let t = setup();
    let css = send(
        &t.app,
        Request::builder()
            .uri("/assets/css/forum.css")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(css.status, StatusCode::OK);

    let missing = get(&t.app, "/assets/none.js", None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_filter_category_matches_prefix_of_name() {
    let t = setup();
    let cookie = register(&t.app, "alice", "alice@example.com").await;
    post_form(
        &t.app,
        "/api/createpost",
        "title=Sunset+shots&content=Body&categories%5B%5D=Photography",
        Some(&cookie),
    )
    .await;

    let response = get(&t.app, "/filter?by=category&category=Photo", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Sunset shots"));
}

#[tokio::test]
async fn test_auth_pages_accept_post() {
    let t = setup();

    let register_page = post_form(&t.app, "/register", "", None).await;
    assert_eq!(register_page.status, StatusCode::OK);
    assert!(register_page.body.contains("/api/register"));

    let login_page = post_form(&t.app, "/login?err=invalid_password", "", None).await;
    assert_eq!(login_page.status, StatusCode::OK);
    assert!(login_page.body.contains("/api/login"));
    assert!(login_page.body.contains("Wrong password."));
}

#[tokio::test]
async fn test_wrong_methods_are_rejected() {
    let t = setup();

    for uri in ["/api/vote", "/api/createpost", "/api/comments"] {
        let response = get(&t.app, uri, None).await;
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED, "GET {uri}");
    }
    for uri in ["/post?id=1", "/posts"] {
        let response = post_form(&t.app, uri, "", None).await;
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED, "POST {uri}");
    }
}
