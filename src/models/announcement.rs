use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Immutable once created; the memoized record never carries the per-user
/// unread flag, which is derived at response time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnnouncementDetail {
    pub id: String,
    pub course_id: String,
    pub course_name: String,
    pub title: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AnnouncementSummary {
    pub id: String,
    pub course_id: String,
    pub course_name: String,
    pub title: String,
    pub unread: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAnnouncementRequest {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub message: String,
}
