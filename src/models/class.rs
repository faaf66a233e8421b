use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Class {
    pub id: String,
    pub course_id: String,
    pub part: i64,
    pub title: String,
    pub description: String,
    pub submission_closed: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewClassRequest {
    pub part: i64,
    pub title: String,
    pub description: String,
}
