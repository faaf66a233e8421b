use std::collections::HashMap;

use axum::Json;
use axum::extract::{FromRequestParts, OriginalUri, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::repository;
use crate::error::AppError;
use crate::models::*;
use crate::services::stats::{
    average_float, average_int, max_float, max_int, min_float, min_int, t_score_float,
    t_score_int,
};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/initialize", post(initialize))
        .route(
            "/api/users/me/courses",
            get(get_registered_courses).put(register_courses),
        )
        .route("/api/users/me/grades", get(get_grades))
        .route("/api/courses", get(search_courses).post(add_course))
        .route("/api/courses/{course_id}", get(get_course_detail))
        .route("/api/courses/{course_id}/status", put(set_course_status))
        .route(
            "/api/courses/{course_id}/classes",
            get(get_classes).post(add_class),
        )
        .route(
            "/api/courses/{course_id}/classes/{class_id}/assignments",
            post(submit_assignment),
        )
        .route(
            "/api/courses/{course_id}/classes/{class_id}/assignments/close",
            post(close_assignments),
        )
        .route(
            "/api/courses/{course_id}/classes/{class_id}/assignments/scores",
            put(register_scores),
        )
        .route(
            "/api/announcements",
            get(get_announcement_list).post(add_announcement),
        )
        .route(
            "/api/announcements/{announcement_id}",
            get(get_announcement_detail),
        )
        .with_state(state)
}

/// Caller identity. The cookie session layer is an external collaborator;
/// handlers read the already-authenticated user from request headers.
pub struct CurrentUser {
    pub id: String,
    pub is_admin: bool,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or(AppError::Unauthorized)?;
        let is_admin = parts
            .headers
            .get("x-user-admin")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
        Ok(CurrentUser { id, is_admin })
    }
}

async fn health(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    for pool in state.db.both() {
        sqlx::query("select 1").execute(pool).await?;
    }
    Ok(StatusCode::OK)
}

#[derive(Debug, Serialize)]
struct InitializeResponse {
    language: String,
}

/// System reset: rebuilds the per-(user, course) total-score table from the
/// current submissions and drops every process-wide cache.
async fn initialize(State(state): State<AppState>) -> Result<Json<InitializeResponse>, AppError> {
    repository::clear_total_scores(&state.db).await?;
    let totals = repository::all_course_user_totals(state.db.read()).await?;
    for total in &totals {
        repository::upsert_total_score(&state.db, &total.course_id, &total.user_id, total.total_score)
            .await?;
    }

    state.cache.reset_all();

    Ok(Json(InitializeResponse {
        language: "rust".to_string(),
    }))
}

// ---------- Users API ----------

#[derive(Debug, Serialize)]
struct RegisteredCourseResponse {
    id: String,
    name: String,
    teacher: String,
    period: i64,
    day_of_week: DayOfWeek,
}

async fn get_registered_courses(
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<RegisteredCourseResponse>>, AppError> {
    let courses = repository::fetch_open_registered_courses(state.db.read(), &user.id).await?;

    let mut res = Vec::with_capacity(courses.len());
    for course in courses {
        let teacher = repository::fetch_teacher_name(state.db.read(), &course.teacher_id)
            .await?
            .ok_or(AppError::InternalServerError)?;
        res.push(RegisteredCourseResponse {
            id: course.id,
            name: course.name,
            teacher,
            period: course.period,
            day_of_week: course.day_of_week,
        });
    }
    Ok(Json(res))
}

#[derive(Debug, Deserialize)]
struct RegisterCourseRequestContent {
    id: String,
}

#[derive(Debug, Default, Serialize)]
struct RegisterCoursesErrorResponse {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    course_not_found: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    not_registrable_status: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    schedule_conflict: Vec<String>,
}

impl RegisterCoursesErrorResponse {
    fn is_empty(&self) -> bool {
        self.course_not_found.is_empty()
            && self.not_registrable_status.is_empty()
            && self.schedule_conflict.is_empty()
    }
}

async fn register_courses(
    user: CurrentUser,
    State(state): State<AppState>,
    Json(mut req): Json<Vec<RegisterCourseRequestContent>>,
) -> Result<Response, AppError> {
    req.sort_by(|a, b| a.id.cmp(&b.id));

    let mut errors = RegisterCoursesErrorResponse::default();
    let mut newly_added: Vec<Course> = Vec::new();
    for content in &req {
        let course = match state.cache.course(&state.db, &content.id).await {
            Ok(course) => course,
            Err(AppError::NotFound) => {
                errors.course_not_found.push(content.id.clone());
                continue;
            }
            Err(e) => return Err(e),
        };

        if course.status != CourseStatus::Registration {
            errors.not_registrable_status.push(course.id);
            continue;
        }

        let count = repository::registration_count(state.db.read(), &user.id, &course.id).await?;
        if count > 0 {
            continue;
        }

        newly_added.push(course);
    }

    let mut already_registered =
        repository::fetch_open_registered_courses(state.db.read(), &user.id).await?;
    already_registered.extend(newly_added.iter().cloned());

    for course1 in &newly_added {
        for course2 in &already_registered {
            if course1.id != course2.id
                && course1.period == course2.period
                && course1.day_of_week == course2.day_of_week
            {
                errors.schedule_conflict.push(course1.id.clone());
                break;
            }
        }
    }

    if !errors.is_empty() {
        return Ok((StatusCode::BAD_REQUEST, Json(errors)).into_response());
    }

    for course in &newly_added {
        repository::insert_registration(&state.db, &course.id, &user.id).await?;
    }

    // The user's class listings are derived from their registration set.
    state.cache.etags.invalidate_by_user(&user.id);

    Ok(StatusCode::OK.into_response())
}

async fn get_grades(
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<GetGradeResponse>, AppError> {
    let registered = repository::fetch_registered_courses(state.db.read(), &user.id).await?;
    let course_ids: Vec<String> = registered.iter().map(|c| c.id.clone()).collect();

    let classes = repository::fetch_classes_for_courses(state.db.read(), &course_ids).await?;

    let mut totals_map: HashMap<String, Vec<i64>> = HashMap::new();
    for row in repository::fetch_totals_for_courses(state.db.read(), &course_ids).await? {
        totals_map.entry(row.course_id).or_default().push(row.total_score);
    }

    let my_scores: HashMap<String, Option<i64>> =
        repository::fetch_user_scores(state.db.read(), &user.id)
            .await?
            .into_iter()
            .map(|s| (s.class_id, s.score))
            .collect();

    let class_ids: Vec<String> = classes.iter().map(|c| c.id.clone()).collect();
    let submitters: HashMap<String, i64> =
        repository::fetch_submission_counts(state.db.read(), &class_ids)
            .await?
            .into_iter()
            .map(|s| (s.class_id, s.count))
            .collect();

    let mut my_total_scores: HashMap<String, i64> = HashMap::new();
    let mut class_scores: HashMap<String, Vec<ClassScore>> = HashMap::new();
    for class in &classes {
        let score = my_scores.get(&class.id).copied().flatten();
        if let Some(score) = score {
            *my_total_scores.entry(class.course_id.clone()).or_insert(0) += score;
        }
        class_scores
            .entry(class.course_id.clone())
            .or_default()
            .push(ClassScore {
                class_id: class.id.clone(),
                title: class.title.clone(),
                part: class.part,
                score,
                submitters: submitters.get(&class.id).copied().unwrap_or(0),
            });
    }

    let mut course_results = Vec::with_capacity(registered.len());
    let mut my_gpa = 0.0;
    let mut my_credits: i64 = 0;
    for course in &registered {
        let totals = totals_map.remove(&course.id).unwrap_or_default();
        let my_total = my_total_scores.get(&course.id).copied().unwrap_or(0);
        course_results.push(CourseResult {
            name: course.name.clone(),
            code: course.code.clone(),
            total_score: my_total,
            total_score_t_score: t_score_int(my_total, &totals),
            total_score_avg: average_int(&totals, 0.0),
            total_score_max: max_int(&totals, 0),
            total_score_min: min_int(&totals, 0),
            class_scores: class_scores.remove(&course.id).unwrap_or_default(),
        });

        if course.status == CourseStatus::Closed {
            my_gpa += (my_total * course.credit) as f64;
            my_credits += course.credit;
        }
    }
    if my_credits > 0 {
        my_gpa = my_gpa / 100.0 / my_credits as f64;
    }

    // The distribution is recomputed every window; concurrent grade pages
    // share one in-flight query.
    let gpas = state.stats.gpa_distribution(&state.db).await?;

    Ok(Json(GetGradeResponse {
        summary: Summary {
            credits: my_credits,
            gpa: my_gpa,
            gpa_t_score: t_score_float(my_gpa, &gpas),
            gpa_avg: average_float(&gpas, 0.0),
            gpa_max: max_float(&gpas, 0.0),
            gpa_min: min_float(&gpas, 0.0),
        },
        courses: course_results,
    }))
}

// ---------- Courses API ----------

const PAGE_LIMIT: i64 = 20;

fn page_url(uri: &Uri, page: i64) -> String {
    let mut params: Vec<String> = uri
        .query()
        .unwrap_or("")
        .split('&')
        .filter(|p| !p.is_empty() && !p.starts_with("page="))
        .map(str::to_string)
        .collect();
    params.push(format!("page={page}"));
    format!("{}?{}", uri.path(), params.join("&"))
}

fn link_header(uri: &Uri, page: i64, has_next: bool) -> Option<String> {
    let mut links = Vec::new();
    if page > 1 {
        links.push(format!("<{}>; rel=\"prev\"", page_url(uri, page - 1)));
    }
    if has_next {
        links.push(format!("<{}>; rel=\"next\"", page_url(uri, page + 1)));
    }
    if links.is_empty() {
        None
    } else {
        Some(links.join(","))
    }
}

fn page_from(page: Option<i64>) -> Result<i64, AppError> {
    match page {
        None => Ok(1),
        Some(p) if p > 0 => Ok(p),
        Some(_) => Err(AppError::BadRequest("Invalid page.".to_string())),
    }
}

async fn search_courses(
    _user: CurrentUser,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<SearchCoursesQuery>,
) -> Result<Response, AppError> {
    let page = page_from(params.page)?;
    let offset = PAGE_LIMIT * (page - 1);

    // Fetch one row past the page to detect whether a next page exists.
    let mut res =
        repository::search_courses(state.db.read(), &params, PAGE_LIMIT + 1, offset).await?;
    let has_next = res.len() as i64 > PAGE_LIMIT;
    res.truncate(PAGE_LIMIT as usize);

    let link = link_header(&uri, page, has_next);
    let mut response = Json(res).into_response();
    if let Some(link) = link {
        response.headers_mut().insert(
            header::LINK,
            link.parse().map_err(|_| AppError::InternalServerError)?,
        );
    }
    Ok(response)
}

#[derive(Debug, Serialize)]
struct AddCourseResponse {
    id: String,
}

async fn add_course(
    user: CurrentUser,
    State(state): State<AppState>,
    Json(req): Json<NewCourseRequest>,
) -> Result<Response, AppError> {
    if !user.is_admin {
        return Err(AppError::Forbidden);
    }

    let course = Course {
        id: Uuid::new_v4().to_string(),
        code: req.code.clone(),
        course_type: req.course_type,
        name: req.name.clone(),
        description: req.description.clone(),
        credit: req.credit,
        period: req.period,
        day_of_week: req.day_of_week,
        teacher_id: user.id.clone(),
        keywords: req.keywords.clone(),
        status: CourseStatus::Registration,
    };

    match repository::insert_course(&state.db, &course)
        .await
        .map_err(AppError::from)
    {
        Ok(()) => {}
        Err(e) if e.is_unique_violation() => {
            let existing = repository::find_course_by_code(state.db.read(), &req.code)
                .await?
                .ok_or(AppError::InternalServerError)?;
            if req.course_type != existing.course_type
                || req.name != existing.name
                || req.description != existing.description
                || req.credit != existing.credit
                || req.period != existing.period
                || req.day_of_week != existing.day_of_week
                || req.keywords != existing.keywords
            {
                return Err(AppError::Conflict(
                    "A course with the same code already exists.".to_string(),
                ));
            }
            return Ok(
                (StatusCode::CREATED, Json(AddCourseResponse { id: existing.id })).into_response(),
            );
        }
        Err(e) => return Err(e),
    }

    // Memoize the freshly created record; it will never be re-fetched.
    state.cache.courses.put(course.id.clone(), course.clone());

    Ok((StatusCode::CREATED, Json(AddCourseResponse { id: course.id })).into_response())
}

async fn get_course_detail(
    _user: CurrentUser,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
) -> Result<Json<CourseWithTeacher>, AppError> {
    let res = repository::fetch_course_detail(state.db.read(), &course_id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(res))
}

#[derive(Debug, Deserialize)]
struct SetCourseStatusRequest {
    status: CourseStatus,
}

async fn set_course_status(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Json(req): Json<SetCourseStatusRequest>,
) -> Result<StatusCode, AppError> {
    if !user.is_admin {
        return Err(AppError::Forbidden);
    }

    state.cache.course(&state.db, &course_id).await?;

    repository::update_course_status(&state.db, &course_id, req.status).await?;
    // Apply the one permitted mutation to the held record through the
    // cache's own lock; never invalidate-and-requery.
    state
        .cache
        .courses
        .update(&course_id, |c| c.status = req.status);

    Ok(StatusCode::OK)
}

// ---------- Classes API ----------

#[derive(Debug, Serialize)]
struct GetClassResponse {
    id: String,
    part: i64,
    title: String,
    description: String,
    submission_closed: bool,
    submitted: bool,
}

async fn get_classes(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if let Some(etag) = state.cache.etags.lookup(&course_id, &user.id) {
        let presented = headers
            .get(header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok());
        if presented == Some(etag.as_str()) {
            return Ok(StatusCode::NOT_MODIFIED.into_response());
        }
    }

    state.cache.course(&state.db, &course_id).await?;

    let classes = repository::fetch_classes(state.db.read(), &course_id).await?;
    let res: Vec<GetClassResponse> = classes
        .into_iter()
        .map(|class| GetClassResponse {
            submitted: state.cache.submissions.exists(&class.id, &user.id),
            id: class.id,
            part: class.part,
            title: class.title,
            description: class.description,
            submission_closed: class.submission_closed,
        })
        .collect();

    let etag = state.cache.etags.issue(&course_id, &user.id);
    let mut response = Json(res).into_response();
    response.headers_mut().insert(
        header::ETAG,
        etag.parse().map_err(|_| AppError::InternalServerError)?,
    );
    Ok(response)
}

#[derive(Debug, Serialize)]
struct AddClassResponse {
    class_id: String,
}

async fn add_class(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(course_id): Path<String>,
    Json(req): Json<NewClassRequest>,
) -> Result<Response, AppError> {
    if !user.is_admin {
        return Err(AppError::Forbidden);
    }

    let course = state.cache.course(&state.db, &course_id).await?;
    if course.status != CourseStatus::InProgress {
        return Err(AppError::BadRequest(
            "This course is not in-progress.".to_string(),
        ));
    }

    let class = Class {
        id: Uuid::new_v4().to_string(),
        course_id: course_id.clone(),
        part: req.part,
        title: req.title.clone(),
        description: req.description.clone(),
        submission_closed: false,
    };

    match repository::insert_class(&state.db, &class)
        .await
        .map_err(AppError::from)
    {
        Ok(()) => {}
        Err(e) if e.is_unique_violation() => {
            let existing =
                repository::find_class_by_part(state.db.read(), &course_id, req.part)
                    .await?
                    .ok_or(AppError::InternalServerError)?;
            if req.title != existing.title || req.description != existing.description {
                return Err(AppError::Conflict(
                    "A class with the same part already exists.".to_string(),
                ));
            }
            return Ok((
                StatusCode::CREATED,
                Json(AddClassResponse {
                    class_id: existing.id,
                }),
            )
                .into_response());
        }
        Err(e) => return Err(e),
    }

    state.cache.classes.put(class.id.clone(), class.clone());
    // The course's class list changed; every outstanding token for it is stale.
    state.cache.etags.invalidate_by_course(&course_id);

    Ok((
        StatusCode::CREATED,
        Json(AddClassResponse { class_id: class.id }),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct SubmitAssignmentRequest {
    file_name: String,
}

async fn submit_assignment(
    user: CurrentUser,
    State(state): State<AppState>,
    Path((course_id, class_id)): Path<(String, String)>,
    Json(req): Json<SubmitAssignmentRequest>,
) -> Result<StatusCode, AppError> {
    let course = state.cache.course(&state.db, &course_id).await?;
    if course.status != CourseStatus::InProgress {
        return Err(AppError::BadRequest(
            "This course is not in progress.".to_string(),
        ));
    }

    let registered = state.cache.is_registered(&state.db, &user.id, &course_id).await?;
    if !registered {
        return Err(AppError::BadRequest(
            "You have not taken this course.".to_string(),
        ));
    }

    let class = state.cache.class(&state.db, &class_id).await?;
    if class.submission_closed {
        return Err(AppError::BadRequest(
            "Submission has been closed for this class.".to_string(),
        ));
    }

    repository::upsert_submission(&state.db, &user.id, &class_id, &req.file_name).await?;
    state.cache.submissions.mark(&class_id, &user.id);

    Ok(StatusCode::NO_CONTENT)
}

async fn close_assignments(
    user: CurrentUser,
    State(state): State<AppState>,
    Path((course_id, class_id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    if !user.is_admin {
        return Err(AppError::Forbidden);
    }

    state.cache.class(&state.db, &class_id).await?;

    repository::close_class_submissions(&state.db, &class_id).await?;
    state
        .cache
        .classes
        .update(&class_id, |c| c.submission_closed = true);
    state.cache.etags.invalidate_by_course(&course_id);

    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct ScoreRequest {
    user_code: String,
    score: i64,
}

async fn register_scores(
    user: CurrentUser,
    State(state): State<AppState>,
    Path((_course_id, class_id)): Path<(String, String)>,
    Json(req): Json<Vec<ScoreRequest>>,
) -> Result<StatusCode, AppError> {
    if !user.is_admin {
        return Err(AppError::Forbidden);
    }

    let class = state.cache.class(&state.db, &class_id).await?;
    if !class.submission_closed {
        return Err(AppError::BadRequest(
            "This assignment is not closed yet.".to_string(),
        ));
    }

    for score in &req {
        repository::update_submission_score(&state.db, &class_id, &score.user_code, score.score)
            .await?;
    }

    // Concurrent score registrations for the same course recompute once.
    let totals = state
        .stats
        .course_total_scores(&state.db, &class.course_id)
        .await?;
    for total in &totals {
        repository::upsert_total_score(
            &state.db,
            &class.course_id,
            &total.user_id,
            total.total_score,
        )
        .await?;
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---------- Announcements API ----------

#[derive(Debug, Deserialize)]
struct AnnouncementListQuery {
    course_id: Option<String>,
    page: Option<i64>,
}

#[derive(Debug, Serialize)]
struct GetAnnouncementsResponse {
    unread_count: i64,
    announcements: Vec<AnnouncementSummary>,
}

async fn get_announcement_list(
    user: CurrentUser,
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(params): Query<AnnouncementListQuery>,
) -> Result<Response, AppError> {
    let page = page_from(params.page)?;
    let offset = PAGE_LIMIT * (page - 1);

    let mut announcements = repository::fetch_announcements(
        state.db.read(),
        &user.id,
        params.course_id.as_deref(),
        PAGE_LIMIT + 1,
        offset,
    )
    .await?;
    let has_next = announcements.len() as i64 > PAGE_LIMIT;
    announcements.truncate(PAGE_LIMIT as usize);

    let unread_count = repository::unread_count(state.db.read(), &user.id).await?;

    let link = link_header(&uri, page, has_next);
    let mut response = Json(GetAnnouncementsResponse {
        unread_count,
        announcements,
    })
    .into_response();
    if let Some(link) = link {
        response.headers_mut().insert(
            header::LINK,
            link.parse().map_err(|_| AppError::InternalServerError)?,
        );
    }
    Ok(response)
}

async fn add_announcement(
    user: CurrentUser,
    State(state): State<AppState>,
    Json(req): Json<NewAnnouncementRequest>,
) -> Result<StatusCode, AppError> {
    if !user.is_admin {
        return Err(AppError::Forbidden);
    }

    state.cache.course(&state.db, &req.course_id).await?;

    match repository::insert_announcement(&state.db, &req.id, &req.course_id, &req.title, &req.message)
        .await
        .map_err(AppError::from)
    {
        Ok(()) => {}
        Err(e) if e.is_unique_violation() => {
            let existing = repository::find_announcement_detail(state.db.read(), &req.id)
                .await?
                .ok_or(AppError::InternalServerError)?;
            if existing.course_id != req.course_id
                || existing.title != req.title
                || existing.message != req.message
            {
                return Err(AppError::Conflict(
                    "An announcement with the same id already exists.".to_string(),
                ));
            }
            return Ok(StatusCode::CREATED);
        }
        Err(e) => return Err(e),
    }

    let targets = repository::fetch_registered_user_ids(state.db.read(), &req.course_id).await?;
    repository::insert_unread_announcements(&state.db, &req.id, &targets).await?;

    Ok(StatusCode::CREATED)
}

#[derive(Debug, Serialize)]
struct AnnouncementDetailResponse {
    id: String,
    course_id: String,
    course_name: String,
    title: String,
    message: String,
    unread: bool,
}

async fn get_announcement_detail(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(announcement_id): Path<String>,
) -> Result<Response, AppError> {
    let detail = state
        .cache
        .announcement_detail(&state.db, &announcement_id)
        .await?;

    let registered = state
        .cache
        .is_registered(&state.db, &user.id, &detail.course_id)
        .await?;
    if !registered {
        return Err(AppError::NotFound);
    }

    let unread =
        repository::mark_announcement_read(&state.db, &announcement_id, &user.id).await?;

    let mut response = Json(AnnouncementDetailResponse {
        id: detail.id,
        course_id: detail.course_id,
        course_name: detail.course_name,
        title: detail.title,
        message: detail.message,
        unread,
    })
    .into_response();
    if !unread {
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            "max-age=86400"
                .parse()
                .map_err(|_| AppError::InternalServerError)?,
        );
    }
    Ok(response)
}
