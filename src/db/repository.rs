use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::db::DbPair;
use crate::models::{
    AnnouncementDetail, AnnouncementSummary, Class, Course, CourseStatus, CourseWithTeacher,
};
use crate::models::course::SearchCoursesQuery;

// ---------- by-id loaders ----------

pub async fn find_course_by_id(db: &SqlitePool, id: &str) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn find_course_by_code(
    db: &SqlitePool,
    code: &str,
) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE code = ?")
        .bind(code)
        .fetch_optional(db)
        .await
}

pub async fn find_class_by_id(db: &SqlitePool, id: &str) -> Result<Option<Class>, sqlx::Error> {
    sqlx::query_as::<_, Class>("SELECT * FROM classes WHERE id = ?")
        .bind(id)
        .fetch_optional(db)
        .await
}

pub async fn find_class_by_part(
    db: &SqlitePool,
    course_id: &str,
    part: i64,
) -> Result<Option<Class>, sqlx::Error> {
    sqlx::query_as::<_, Class>("SELECT * FROM classes WHERE course_id = ? AND part = ?")
        .bind(course_id)
        .bind(part)
        .fetch_optional(db)
        .await
}

pub async fn find_announcement_detail(
    db: &SqlitePool,
    id: &str,
) -> Result<Option<AnnouncementDetail>, sqlx::Error> {
    sqlx::query_as::<_, AnnouncementDetail>(
        "SELECT announcements.id, courses.id AS course_id, courses.name AS course_name, \
         announcements.title, announcements.message \
         FROM announcements \
         JOIN courses ON courses.id = announcements.course_id \
         WHERE announcements.id = ?",
    )
    .bind(id)
    .fetch_optional(db)
    .await
}

// ---------- reads ----------

pub async fn registration_count(
    db: &SqlitePool,
    user_id: &str,
    course_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM registrations WHERE user_id = ? AND course_id = ? LIMIT 1",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_one(db)
    .await
}

/// Registered courses that are not yet closed, for schedule views and
/// conflict checks.
pub async fn fetch_open_registered_courses(
    db: &SqlitePool,
    user_id: &str,
) -> Result<Vec<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(
        "SELECT courses.* FROM courses \
         JOIN registrations ON courses.id = registrations.course_id \
         WHERE courses.status != ? AND registrations.user_id = ?",
    )
    .bind(CourseStatus::Closed)
    .bind(user_id)
    .fetch_all(db)
    .await
}

/// All registered courses regardless of status, for grade reports.
pub async fn fetch_registered_courses(
    db: &SqlitePool,
    user_id: &str,
) -> Result<Vec<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(
        "SELECT courses.* FROM registrations \
         JOIN courses ON registrations.course_id = courses.id \
         WHERE registrations.user_id = ?",
    )
    .bind(user_id)
    .fetch_all(db)
    .await
}

pub async fn fetch_teacher_name(
    db: &SqlitePool,
    user_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT name FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(db)
        .await
}

pub async fn fetch_course_detail(
    db: &SqlitePool,
    course_id: &str,
) -> Result<Option<CourseWithTeacher>, sqlx::Error> {
    sqlx::query_as::<_, CourseWithTeacher>(
        "SELECT courses.*, users.name AS teacher \
         FROM courses JOIN users ON courses.teacher_id = users.id \
         WHERE courses.id = ?",
    )
    .bind(course_id)
    .fetch_optional(db)
    .await
}

pub async fn search_courses(
    db: &SqlitePool,
    params: &SearchCoursesQuery,
    limit: i64,
    offset: i64,
) -> Result<Vec<CourseWithTeacher>, sqlx::Error> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT courses.*, users.name AS teacher \
         FROM courses JOIN users ON courses.teacher_id = users.id \
         WHERE 1=1",
    );

    if let Some(course_type) = &params.course_type {
        qb.push(" AND courses.type = ").push_bind(course_type);
    }
    if let Some(credit) = params.credit {
        if credit > 0 {
            qb.push(" AND courses.credit = ").push_bind(credit);
        }
    }
    if let Some(teacher) = &params.teacher {
        qb.push(" AND users.name = ").push_bind(teacher);
    }
    if let Some(period) = params.period {
        if period > 0 {
            qb.push(" AND courses.period = ").push_bind(period);
        }
    }
    if let Some(day_of_week) = &params.day_of_week {
        qb.push(" AND courses.day_of_week = ").push_bind(day_of_week);
    }
    if let Some(keywords) = &params.keywords {
        let words: Vec<&str> = keywords.split(' ').filter(|w| !w.is_empty()).collect();
        if !words.is_empty() {
            qb.push(" AND ((1=1");
            for word in &words {
                qb.push(" AND courses.name LIKE ")
                    .push_bind(format!("%{}%", word));
            }
            qb.push(") OR (1=1");
            for word in &words {
                qb.push(" AND courses.keywords LIKE ")
                    .push_bind(format!("%{}%", word));
            }
            qb.push("))");
        }
    }
    if let Some(status) = &params.status {
        qb.push(" AND courses.status = ").push_bind(status);
    }

    qb.push(" ORDER BY courses.code LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    qb.build_query_as::<CourseWithTeacher>().fetch_all(db).await
}

pub async fn fetch_classes(db: &SqlitePool, course_id: &str) -> Result<Vec<Class>, sqlx::Error> {
    sqlx::query_as::<_, Class>(
        "SELECT classes.* FROM classes WHERE classes.course_id = ? ORDER BY classes.part",
    )
    .bind(course_id)
    .fetch_all(db)
    .await
}

pub async fn fetch_classes_for_courses(
    db: &SqlitePool,
    course_ids: &[String],
) -> Result<Vec<Class>, sqlx::Error> {
    if course_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb = QueryBuilder::<Sqlite>::new("SELECT * FROM classes WHERE course_id IN (");
    let mut sep = qb.separated(", ");
    for id in course_ids {
        sep.push_bind(id);
    }
    qb.push(") ORDER BY course_id, part DESC");
    qb.build_query_as::<Class>().fetch_all(db).await
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CourseTotalRow {
    pub course_id: String,
    pub total_score: i64,
}

pub async fn fetch_totals_for_courses(
    db: &SqlitePool,
    course_ids: &[String],
) -> Result<Vec<CourseTotalRow>, sqlx::Error> {
    if course_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT course_id, total_score FROM user_course_total_scores WHERE course_id IN (",
    );
    let mut sep = qb.separated(", ");
    for id in course_ids {
        sep.push_bind(id);
    }
    qb.push(")");
    qb.build_query_as::<CourseTotalRow>().fetch_all(db).await
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubmissionScore {
    pub class_id: String,
    pub score: Option<i64>,
}

pub async fn fetch_user_scores(
    db: &SqlitePool,
    user_id: &str,
) -> Result<Vec<SubmissionScore>, sqlx::Error> {
    sqlx::query_as::<_, SubmissionScore>(
        "SELECT class_id, score FROM submissions WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_all(db)
    .await
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubmissionCount {
    pub class_id: String,
    pub count: i64,
}

pub async fn fetch_submission_counts(
    db: &SqlitePool,
    class_ids: &[String],
) -> Result<Vec<SubmissionCount>, sqlx::Error> {
    if class_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT class_id, COUNT(*) AS count FROM submissions WHERE class_id IN (",
    );
    let mut sep = qb.separated(", ");
    for id in class_ids {
        sep.push_bind(id);
    }
    qb.push(") GROUP BY class_id");
    qb.build_query_as::<SubmissionCount>().fetch_all(db).await
}

pub async fn fetch_announcements(
    db: &SqlitePool,
    user_id: &str,
    course_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<AnnouncementSummary>, sqlx::Error> {
    let mut qb = QueryBuilder::<Sqlite>::new(
        "SELECT announcements.id, courses.id AS course_id, courses.name AS course_name, \
         announcements.title, NOT unread_announcements.is_deleted AS unread \
         FROM announcements \
         JOIN courses ON announcements.course_id = courses.id \
         JOIN registrations ON courses.id = registrations.course_id \
         JOIN unread_announcements ON announcements.id = unread_announcements.announcement_id \
         WHERE 1=1",
    );
    if let Some(course_id) = course_id {
        qb.push(" AND announcements.course_id = ").push_bind(course_id);
    }
    qb.push(" AND unread_announcements.user_id = ")
        .push_bind(user_id)
        .push(" AND registrations.user_id = ")
        .push_bind(user_id)
        .push(" ORDER BY announcements.id DESC LIMIT ")
        .push_bind(limit)
        .push(" OFFSET ")
        .push_bind(offset);

    qb.build_query_as::<AnnouncementSummary>().fetch_all(db).await
}

pub async fn unread_count(db: &SqlitePool, user_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM unread_announcements WHERE user_id = ? AND NOT is_deleted",
    )
    .bind(user_id)
    .fetch_one(db)
    .await
}

pub async fn fetch_registered_user_ids(
    db: &SqlitePool,
    course_id: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT user_id FROM registrations WHERE course_id = ?")
        .bind(course_id)
        .fetch_all(db)
        .await
}

// ---------- aggregates ----------

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CourseTotal {
    pub user_id: String,
    pub total_score: i64,
}

/// Per-user total score for one course, recomputed from submissions.
pub async fn course_total_scores(
    db: &SqlitePool,
    course_id: &str,
) -> Result<Vec<CourseTotal>, sqlx::Error> {
    sqlx::query_as::<_, CourseTotal>(
        "SELECT users.id AS user_id, IFNULL(SUM(submissions.score), 0) AS total_score \
         FROM users \
         JOIN registrations ON users.id = registrations.user_id \
         JOIN courses ON registrations.course_id = courses.id \
         LEFT JOIN classes ON courses.id = classes.course_id \
         LEFT JOIN submissions ON users.id = submissions.user_id AND submissions.class_id = classes.id \
         WHERE courses.id = ? \
         GROUP BY courses.id, users.id",
    )
    .bind(course_id)
    .fetch_all(db)
    .await
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserCourseTotal {
    pub course_id: String,
    pub user_id: String,
    pub total_score: i64,
}

/// Totals for every (course, user) pair, used to rebuild the
/// user_course_total_scores table on system reset.
pub async fn all_course_user_totals(db: &SqlitePool) -> Result<Vec<UserCourseTotal>, sqlx::Error> {
    sqlx::query_as::<_, UserCourseTotal>(
        "SELECT courses.id AS course_id, users.id AS user_id, \
         IFNULL(SUM(submissions.score), 0) AS total_score \
         FROM users \
         JOIN registrations ON users.id = registrations.user_id \
         JOIN courses ON registrations.course_id = courses.id \
         LEFT JOIN classes ON courses.id = classes.course_id \
         LEFT JOIN submissions ON users.id = submissions.user_id AND submissions.class_id = classes.id \
         GROUP BY courses.id, users.id",
    )
    .fetch_all(db)
    .await
}

/// GPA of every student over closed courses. Only the in-flight call is
/// shared between concurrent requesters; the result itself is never cached.
pub async fn gpa_distribution(db: &SqlitePool) -> Result<Vec<f64>, sqlx::Error> {
    sqlx::query_scalar::<_, f64>(
        "SELECT CAST(IFNULL(SUM(user_course_total_scores.total_score * courses.credit), 0) AS REAL) \
         / 100.0 / credits.credits AS gpa \
         FROM users \
         JOIN ( \
             SELECT users.id AS user_id, SUM(courses.credit) AS credits \
             FROM users \
             JOIN registrations ON users.id = registrations.user_id \
             JOIN courses ON registrations.course_id = courses.id AND courses.status = ? \
             GROUP BY users.id \
         ) AS credits ON credits.user_id = users.id \
         JOIN registrations ON users.id = registrations.user_id \
         JOIN courses ON registrations.course_id = courses.id AND courses.status = ? \
         LEFT JOIN user_course_total_scores ON users.id = user_course_total_scores.user_id \
             AND user_course_total_scores.course_id = courses.id \
         WHERE users.type = 'student' \
         GROUP BY users.id",
    )
    .bind(CourseStatus::Closed)
    .bind(CourseStatus::Closed)
    .fetch_all(db)
    .await
}

// ---------- dual writes ----------
//
// Every write goes to both store instances synchronously and a failure on
// either side is surfaced; a reader routed to the secondary right after a
// write may still observe pre-write state (replica lag is documented, not
// eliminated).

pub async fn insert_course(db: &DbPair, course: &Course) -> Result<(), sqlx::Error> {
    for pool in db.both() {
        sqlx::query(
            "INSERT INTO courses \
             (id, code, type, name, description, credit, period, day_of_week, teacher_id, keywords, status) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&course.id)
        .bind(&course.code)
        .bind(course.course_type)
        .bind(&course.name)
        .bind(&course.description)
        .bind(course.credit)
        .bind(course.period)
        .bind(course.day_of_week)
        .bind(&course.teacher_id)
        .bind(&course.keywords)
        .bind(course.status)
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn update_course_status(
    db: &DbPair,
    course_id: &str,
    status: CourseStatus,
) -> Result<(), sqlx::Error> {
    for pool in db.both() {
        sqlx::query("UPDATE courses SET status = ? WHERE id = ?")
            .bind(status)
            .bind(course_id)
            .execute(pool)
            .await?;
    }
    Ok(())
}

pub async fn insert_registration(
    db: &DbPair,
    course_id: &str,
    user_id: &str,
) -> Result<(), sqlx::Error> {
    for pool in db.both() {
        sqlx::query(
            "INSERT INTO registrations (course_id, user_id) VALUES (?, ?) \
             ON CONFLICT(course_id, user_id) DO NOTHING",
        )
        .bind(course_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn insert_class(db: &DbPair, class: &Class) -> Result<(), sqlx::Error> {
    for pool in db.both() {
        sqlx::query(
            "INSERT INTO classes (id, course_id, part, title, description) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&class.id)
        .bind(&class.course_id)
        .bind(class.part)
        .bind(&class.title)
        .bind(&class.description)
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn close_class_submissions(db: &DbPair, class_id: &str) -> Result<(), sqlx::Error> {
    for pool in db.both() {
        sqlx::query("UPDATE classes SET submission_closed = 1 WHERE id = ?")
            .bind(class_id)
            .execute(pool)
            .await?;
    }
    Ok(())
}

pub async fn upsert_submission(
    db: &DbPair,
    user_id: &str,
    class_id: &str,
    file_name: &str,
) -> Result<(), sqlx::Error> {
    for pool in db.both() {
        sqlx::query(
            "INSERT INTO submissions (user_id, class_id, file_name) VALUES (?, ?, ?) \
             ON CONFLICT(user_id, class_id) DO UPDATE SET file_name = excluded.file_name",
        )
        .bind(user_id)
        .bind(class_id)
        .bind(file_name)
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn update_submission_score(
    db: &DbPair,
    class_id: &str,
    user_code: &str,
    score: i64,
) -> Result<(), sqlx::Error> {
    for pool in db.both() {
        sqlx::query(
            "UPDATE submissions SET score = ? \
             WHERE class_id = ? AND user_id = (SELECT id FROM users WHERE code = ?)",
        )
        .bind(score)
        .bind(class_id)
        .bind(user_code)
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn upsert_total_score(
    db: &DbPair,
    course_id: &str,
    user_id: &str,
    total_score: i64,
) -> Result<(), sqlx::Error> {
    for pool in db.both() {
        sqlx::query(
            "INSERT INTO user_course_total_scores (total_score, course_id, user_id) VALUES (?, ?, ?) \
             ON CONFLICT(user_id, course_id) DO UPDATE SET total_score = excluded.total_score",
        )
        .bind(total_score)
        .bind(course_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn clear_total_scores(db: &DbPair) -> Result<(), sqlx::Error> {
    for pool in db.both() {
        sqlx::query("DELETE FROM user_course_total_scores")
            .execute(pool)
            .await?;
    }
    Ok(())
}

pub async fn insert_announcement(
    db: &DbPair,
    id: &str,
    course_id: &str,
    title: &str,
    message: &str,
) -> Result<(), sqlx::Error> {
    for pool in db.both() {
        sqlx::query(
            "INSERT INTO announcements (id, course_id, title, message) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(course_id)
        .bind(title)
        .bind(message)
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn insert_unread_announcements(
    db: &DbPair,
    announcement_id: &str,
    user_ids: &[String],
) -> Result<(), sqlx::Error> {
    if user_ids.is_empty() {
        return Ok(());
    }
    for pool in db.both() {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "INSERT INTO unread_announcements (announcement_id, user_id) ",
        );
        qb.push_values(user_ids, |mut row, user_id| {
            row.push_bind(announcement_id).push_bind(user_id);
        });
        qb.push(" ON CONFLICT(announcement_id, user_id) DO NOTHING");
        qb.build().execute(pool).await?;
    }
    Ok(())
}

/// Marks the announcement read for the user on both stores; returns whether
/// the primary flipped a row (the caller reports `unread` from that).
pub async fn mark_announcement_read(
    db: &DbPair,
    announcement_id: &str,
    user_id: &str,
) -> Result<bool, sqlx::Error> {
    let mut primary_affected = 0;
    for (i, pool) in db.both().into_iter().enumerate() {
        let result = sqlx::query(
            "UPDATE unread_announcements SET is_deleted = 1 \
             WHERE announcement_id = ? AND user_id = ? AND is_deleted = 0",
        )
        .bind(announcement_id)
        .bind(user_id)
        .execute(pool)
        .await?;
        if i == 0 {
            primary_affected = result.rows_affected();
        }
    }
    Ok(primary_affected > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CourseType, DayOfWeek};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test db");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        pool
    }

    async fn setup_pair() -> DbPair {
        DbPair::new(setup_test_db().await, setup_test_db().await)
    }

    async fn seed_user(db: &DbPair, id: &str, code: &str, user_type: &str) {
        for pool in db.both() {
            sqlx::query("INSERT INTO users (id, code, name, hashed_password, type) VALUES (?, ?, ?, X'00', ?)")
                .bind(id)
                .bind(code)
                .bind(format!("user {code}"))
                .bind(user_type)
                .execute(pool)
                .await
                .expect("Failed to seed user");
        }
    }

    fn sample_course(id: &str, code: &str, teacher_id: &str) -> Course {
        Course {
            id: id.to_string(),
            code: code.to_string(),
            course_type: CourseType::LiberalArts,
            name: "Linear Algebra".to_string(),
            description: "intro".to_string(),
            credit: 2,
            period: 1,
            day_of_week: DayOfWeek::Monday,
            teacher_id: teacher_id.to_string(),
            keywords: "math".to_string(),
            status: CourseStatus::Registration,
        }
    }

    #[tokio::test]
    async fn test_insert_course_writes_both_stores() {
        let db = setup_pair().await;
        seed_user(&db, "T1", "teacher1", "teacher").await;

        let course = sample_course("C1", "CODE1", "T1");
        insert_course(&db, &course).await.expect("Failed to insert course");

        for pool in db.both() {
            let found = find_course_by_id(pool, "C1")
                .await
                .expect("Failed to fetch course")
                .expect("Course missing");
            assert_eq!(found.code, "CODE1");
            assert_eq!(found.status, CourseStatus::Registration);
        }
    }

    #[tokio::test]
    async fn test_duplicate_course_code_is_unique_violation() {
        let db = setup_pair().await;
        seed_user(&db, "T1", "teacher1", "teacher").await;

        insert_course(&db, &sample_course("C1", "CODE1", "T1"))
            .await
            .expect("Failed to insert course");
        let err = insert_course(&db, &sample_course("C2", "CODE1", "T1"))
            .await
            .expect_err("Duplicate code must fail");
        let app_err = crate::error::AppError::from(err);
        assert!(app_err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_registration_count_and_status_update() {
        let db = setup_pair().await;
        seed_user(&db, "T1", "teacher1", "teacher").await;
        seed_user(&db, "U1", "student1", "student").await;

        insert_course(&db, &sample_course("C1", "CODE1", "T1"))
            .await
            .expect("Failed to insert course");

        assert_eq!(
            registration_count(db.primary(), "U1", "C1").await.unwrap(),
            0
        );
        insert_registration(&db, "C1", "U1").await.unwrap();
        // idempotent
        insert_registration(&db, "C1", "U1").await.unwrap();
        assert_eq!(
            registration_count(db.primary(), "U1", "C1").await.unwrap(),
            1
        );
        assert_eq!(
            registration_count(db.secondary(), "U1", "C1").await.unwrap(),
            1
        );

        update_course_status(&db, "C1", CourseStatus::InProgress)
            .await
            .unwrap();
        let found = find_course_by_id(db.secondary(), "C1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, CourseStatus::InProgress);
    }

    #[tokio::test]
    async fn test_course_total_scores_aggregate() {
        let db = setup_pair().await;
        seed_user(&db, "T1", "teacher1", "teacher").await;
        seed_user(&db, "U1", "student1", "student").await;

        insert_course(&db, &sample_course("C1", "CODE1", "T1"))
            .await
            .unwrap();
        insert_registration(&db, "C1", "U1").await.unwrap();
        let class = Class {
            id: "K1".to_string(),
            course_id: "C1".to_string(),
            part: 1,
            title: "week 1".to_string(),
            description: "first".to_string(),
            submission_closed: false,
        };
        insert_class(&db, &class).await.unwrap();
        upsert_submission(&db, "U1", "K1", "report.pdf").await.unwrap();
        update_submission_score(&db, "K1", "student1", 80).await.unwrap();

        let totals = course_total_scores(db.primary(), "C1").await.unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].user_id, "U1");
        assert_eq!(totals[0].total_score, 80);
    }
}
