use crate::error::{AppError, AppResult};

/// bcrypt-hash a password on the blocking pool.
pub async fn hash(password: String, cost: u32) -> AppResult<String> {
    let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {}", e)))??;
    Ok(hashed)
}

/// Check a password against a stored hash. A malformed hash never matches.
pub async fn verify(password: String, hashed: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hashed).unwrap_or(false))
        .await
        .map_err(|e| AppError::Internal(format!("verify task failed: {}", e)))
}
