use serde::Serialize;
use sqlx::FromRow;

/// The acting user, as resolved from an access token.
#[derive(Debug, Serialize, FromRow, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub is_admin: bool,
}
