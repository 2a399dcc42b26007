use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Serialize, FromRow, Clone)]
pub struct Column {
    pub id: i64,
    pub title: String,
    pub created: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ColumnCreate {
    // A column title may be empty
    #[serde(default)]
    #[validate(length(max = 100, message = "must be at most 100 characters"))]
    pub title: String,
}
