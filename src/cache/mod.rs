pub mod entity;
pub mod etag;
pub mod flight;
pub mod membership;
pub mod submission;

use std::path::Path;

use tracing::info;

use crate::db::{DbPair, repository};
use crate::error::AppError;
use crate::models::{AnnouncementDetail, Class, Course, CourseStatus};

pub use entity::EntityCache;
pub use etag::EtagCache;
pub use flight::Flight;
pub use membership::MembershipCache;
pub use submission::SubmissionSet;

/// All process-wide caches behind one injectable object, so handlers share
/// a single instance per process and tests can build isolated ones.
pub struct CacheContext {
    pub courses: EntityCache<Course>,
    pub classes: EntityCache<Class>,
    pub announcements: EntityCache<AnnouncementDetail>,
    pub memberships: MembershipCache,
    pub etags: EtagCache,
    pub submissions: SubmissionSet,
    course_flight: Flight<String, Course>,
    class_flight: Flight<String, Class>,
    announcement_flight: Flight<String, AnnouncementDetail>,
}

impl Default for CacheContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheContext {
    pub fn new() -> Self {
        Self {
            courses: EntityCache::new(),
            classes: EntityCache::new(),
            announcements: EntityCache::new(),
            memberships: MembershipCache::new(),
            etags: EtagCache::new(),
            submissions: SubmissionSet::new(),
            course_flight: Flight::new(),
            class_flight: Flight::new(),
            announcement_flight: Flight::new(),
        }
    }

    /// The course record, memoized forever after the first successful load.
    /// Concurrent misses for the same id coalesce into one store query; the
    /// query itself runs outside any cache lock.
    pub async fn course(&self, db: &DbPair, id: &str) -> Result<Course, AppError> {
        if let Some(course) = self.courses.get(id) {
            return Ok(course);
        }
        self.course_flight
            .run(id.to_string(), || async {
                let course = repository::find_course_by_id(db.read(), id)
                    .await?
                    .ok_or(AppError::NotFound)?;
                self.courses.put(course.id.clone(), course.clone());
                Ok(course)
            })
            .await
    }

    pub async fn class(&self, db: &DbPair, id: &str) -> Result<Class, AppError> {
        if let Some(class) = self.classes.get(id) {
            return Ok(class);
        }
        self.class_flight
            .run(id.to_string(), || async {
                let class = repository::find_class_by_id(db.read(), id)
                    .await?
                    .ok_or(AppError::NotFound)?;
                self.classes.put(class.id.clone(), class.clone());
                Ok(class)
            })
            .await
    }

    pub async fn announcement_detail(
        &self,
        db: &DbPair,
        id: &str,
    ) -> Result<AnnouncementDetail, AppError> {
        if let Some(detail) = self.announcements.get(id) {
            return Ok(detail);
        }
        self.announcement_flight
            .run(id.to_string(), || async {
                let detail = repository::find_announcement_detail(db.read(), id)
                    .await?
                    .ok_or(AppError::NotFound)?;
                self.announcements.put(detail.id.clone(), detail.clone());
                Ok(detail)
            })
            .await
    }

    /// Whether the user is registered in the course, with per-user caching.
    /// A positive decision is always cacheable (registrations never revert).
    /// A negative decision is cached only once the course has left
    /// `registration` status; while registration is still open the negative
    /// answer could change, so it is returned without being remembered.
    pub async fn is_registered(
        &self,
        db: &DbPair,
        user_id: &str,
        course_id: &str,
    ) -> Result<bool, AppError> {
        let user_courses = self.memberships.user(user_id);
        let mut courses = user_courses.lock().await;

        if let Some(&registered) = courses.get(course_id) {
            return Ok(registered);
        }

        let count = repository::registration_count(db.read(), user_id, course_id).await?;
        if count > 0 {
            courses.insert(course_id.to_string(), true);
            return Ok(true);
        }

        let course = self.course(db, course_id).await?;
        if course.status != CourseStatus::Registration {
            courses.insert(course_id.to_string(), false);
        }
        Ok(false)
    }

    /// Clears everything rebuilt from the store. Invoked by the system-reset
    /// operation, which also reinitializes the backing data, so memberships
    /// and tokens are dropped along with the entity caches and the
    /// existence set.
    pub fn reset_all(&self) {
        self.courses.clear();
        self.classes.clear();
        self.announcements.clear();
        self.memberships.clear();
        self.etags.clear();
        self.submissions.clear();
        info!("caches reset");
    }

    pub fn restore(&self, snapshot_path: &Path) -> Result<(), AppError> {
        self.submissions.restore(snapshot_path)
    }

    pub fn persist(&self, snapshot_path: &Path) -> Result<(), AppError> {
        self.submissions.persist(snapshot_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CourseType, DayOfWeek};
    use sqlx::SqlitePool;
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
            sqlx::query(
                "INSERT INTO users (id, code, name, hashed_password, type) VALUES (?, ?, ?, X'00', ?)",
            )
            .bind(id)
            .bind(code)
            .bind(format!("user {code}"))
            .bind(user_type)
            .execute(pool)
            .await
            .expect("Failed to seed user");
        }
    }

    async fn seed_course(db: &DbPair, id: &str, code: &str, status: CourseStatus) {
        let course = Course {
            id: id.to_string(),
            code: code.to_string(),
            course_type: CourseType::LiberalArts,
            name: "Linear Algebra".to_string(),
            description: "intro".to_string(),
            credit: 2,
            period: 1,
            day_of_week: DayOfWeek::Monday,
            teacher_id: "T1".to_string(),
            keywords: "math".to_string(),
            status,
        };
        repository::insert_course(db, &course)
            .await
            .expect("Failed to seed course");
    }

    #[tokio::test]
    async fn test_course_memoization_survives_row_change() {
        let db = setup_pair().await;
        let cache = CacheContext::new();
        seed_user(&db, "T1", "teacher1", "teacher").await;
        seed_course(&db, "C1", "CODE1", CourseStatus::Registration).await;

        let first = cache.course(&db, "C1").await.expect("Failed to load course");
        assert_eq!(first.name, "Linear Algebra");

        // Change the row behind the cache's back on both stores.
        for pool in db.both() {
            sqlx::query("UPDATE courses SET name = 'Renamed' WHERE id = 'C1'")
                .execute(pool)
                .await
                .unwrap();
        }

        // Memoized: no re-fetch, the original snapshot is returned.
        let second = cache.course(&db, "C1").await.unwrap();
        assert_eq!(second.name, "Linear Algebra");
    }

    #[tokio::test]
    async fn test_course_not_found_is_not_cached() {
        let db = setup_pair().await;
        let cache = CacheContext::new();
        seed_user(&db, "T1", "teacher1", "teacher").await;

        let missing = cache.course(&db, "C1").await;
        assert!(matches!(missing, Err(AppError::NotFound)));

        // The entity shows up later; the next call must retry the store.
        seed_course(&db, "C1", "CODE1", CourseStatus::Registration).await;
        let found = cache.course(&db, "C1").await.expect("Course now exists");
        assert_eq!(found.id, "C1");
    }

    #[tokio::test]
    async fn test_membership_negative_cached_only_after_registration_closes() {
        let db = setup_pair().await;
        let cache = CacheContext::new();
        seed_user(&db, "T1", "teacher1", "teacher").await;
        seed_user(&db, "U1", "student1", "student").await;

        // Registration still open: false, but never remembered.
        seed_course(&db, "C1", "CODE1", CourseStatus::Registration).await;
        assert!(!cache.is_registered(&db, "U1", "C1").await.unwrap());
        assert_eq!(cache.memberships.cached("U1", "C1").await, None);

        // The user registers afterwards; the next call re-queries and sees it.
        repository::insert_registration(&db, "C1", "U1").await.unwrap();
        assert!(cache.is_registered(&db, "U1", "C1").await.unwrap());
        assert_eq!(cache.memberships.cached("U1", "C1").await, Some(true));

        // A different course already in progress: false is permanently sound.
        seed_course(&db, "C2", "CODE2", CourseStatus::InProgress).await;
        assert!(!cache.is_registered(&db, "U1", "C2").await.unwrap());
        assert_eq!(cache.memberships.cached("U1", "C2").await, Some(false));

        // The cached negative short-circuits even if a row were to appear.
        repository::insert_registration(&db, "C2", "U1").await.unwrap();
        assert!(!cache.is_registered(&db, "U1", "C2").await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_all_turns_hits_into_misses() {
        let db = setup_pair().await;
        let cache = CacheContext::new();
        seed_user(&db, "T1", "teacher1", "teacher").await;
        seed_course(&db, "C1", "CODE1", CourseStatus::Registration).await;

        cache.course(&db, "C1").await.unwrap();
        for pool in db.both() {
            sqlx::query("UPDATE courses SET name = 'Renamed' WHERE id = 'C1'")
                .execute(pool)
                .await
                .unwrap();
        }

        cache.submissions.mark("K1", "U1");
        cache.reset_all();
        assert!(!cache.submissions.exists("K1", "U1"));

        // The prior hit is gone; a fresh store query observes the new row.
        let reloaded = cache.course(&db, "C1").await.unwrap();
        assert_eq!(reloaded.name, "Renamed");
    }

    #[tokio::test]
    async fn test_status_update_applies_to_cached_record() {
        let db = setup_pair().await;
        let cache = CacheContext::new();
        seed_user(&db, "T1", "teacher1", "teacher").await;
        seed_course(&db, "C1", "CODE1", CourseStatus::Registration).await;

        cache.course(&db, "C1").await.unwrap();
        repository::update_course_status(&db, "C1", CourseStatus::InProgress)
            .await
            .unwrap();
        // The writer updates the held value through the cache lock rather
        // than invalidating and re-querying.
        assert!(cache.courses.update("C1", |c| c.status = CourseStatus::InProgress));

        let course = cache.course(&db, "C1").await.unwrap();
        assert_eq!(course.status, CourseStatus::InProgress);
    }
}
