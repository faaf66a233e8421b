use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct GetGradeResponse {
    pub summary: Summary,
    pub courses: Vec<CourseResult>,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub credits: i64,
    pub gpa: f64,
    pub gpa_t_score: f64,
    pub gpa_avg: f64,
    pub gpa_max: f64,
    pub gpa_min: f64,
}

#[derive(Debug, Serialize)]
pub struct CourseResult {
    pub name: String,
    pub code: String,
    pub total_score: i64,
    pub total_score_t_score: f64,
    pub total_score_avg: f64,
    pub total_score_max: i64,
    pub total_score_min: i64,
    pub class_scores: Vec<ClassScore>,
}

#[derive(Debug, Serialize)]
pub struct ClassScore {
    pub class_id: String,
    pub title: String,
    pub part: i64,
    pub score: Option<i64>,
    pub submitters: i64,
}
