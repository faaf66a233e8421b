use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum CourseType {
    LiberalArts,
    MajorSubjects,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
}

/// Moves forward only: registration -> in-progress -> closed. The
/// membership cache's negative caching relies on this never regressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(rename_all = "kebab-case")]
pub enum CourseStatus {
    Registration,
    InProgress,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: String,
    pub code: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub course_type: CourseType,
    pub name: String,
    pub description: String,
    pub credit: i64,
    pub period: i64,
    pub day_of_week: DayOfWeek,
    pub teacher_id: String,
    pub keywords: String,
    pub status: CourseStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCourseRequest {
    pub code: String,
    #[serde(rename = "type")]
    pub course_type: CourseType,
    pub name: String,
    pub description: String,
    pub credit: i64,
    pub period: i64,
    pub day_of_week: DayOfWeek,
    pub keywords: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchCoursesQuery {
    #[serde(rename = "type")]
    pub course_type: Option<CourseType>,
    pub credit: Option<i64>,
    pub teacher: Option<String>,
    pub period: Option<i64>,
    pub day_of_week: Option<DayOfWeek>,
    pub keywords: Option<String>,
    pub status: Option<CourseStatus>,
    pub page: Option<i64>,
}

/// Course row joined with the teacher's display name, as returned by
/// search and detail queries.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CourseWithTeacher {
    pub id: String,
    pub code: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub course_type: CourseType,
    pub name: String,
    pub description: String,
    pub credit: i64,
    pub period: i64,
    pub day_of_week: DayOfWeek,
    #[serde(skip_serializing)]
    pub teacher_id: String,
    pub keywords: String,
    pub status: CourseStatus,
    pub teacher: String,
}
