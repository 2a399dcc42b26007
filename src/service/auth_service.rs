use crate::errors::ApiResult;
use crate::model::user::User;
use sqlx::SqlitePool;

/// Resolves access tokens issued by the external account system.
pub struct AuthService;

impl AuthService {
    pub async fn authenticate(pool: &SqlitePool, token: &str) -> ApiResult<Option<User>> {
        if token.is_empty() {
            return Ok(None);
        }

        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, is_admin FROM users WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }
}
