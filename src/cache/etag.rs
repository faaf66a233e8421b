use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{SecondsFormat, Utc};

/// One conditional token for a (course, user) class listing. The same object
/// is reachable from both indices, so flipping `valid` tombstones it on every
/// path at once; entries are never removed.
struct Etag {
    course_id: String,
    value: String,
    valid: AtomicBool,
}

/// Conditional-response tokens indexed two ways: the latest token per user
/// and the latest token per course. Any class-list-affecting write
/// invalidates by course; any registration-affecting write invalidates by
/// user.
pub struct EtagCache {
    by_user: RwLock<HashMap<String, Arc<Etag>>>,
    by_course: RwLock<HashMap<String, Arc<Etag>>>,
}

impl Default for EtagCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EtagCache {
    pub fn new() -> Self {
        Self {
            by_user: RwLock::new(HashMap::new()),
            by_course: RwLock::new(HashMap::new()),
        }
    }

    /// Issues a fresh token for the pair and tracks it as the latest for
    /// both the user and the course.
    pub fn issue(&self, course_id: &str, user_id: &str) -> String {
        let value = format!(
            "W/\"{}\"",
            Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
        );
        let etag = Arc::new(Etag {
            course_id: course_id.to_string(),
            value: value.clone(),
            valid: AtomicBool::new(true),
        });
        self.by_user
            .write()
            .unwrap()
            .insert(user_id.to_string(), Arc::clone(&etag));
        self.by_course
            .write()
            .unwrap()
            .insert(course_id.to_string(), etag);
        value
    }

    /// The current token value for the pair, or None when no token exists,
    /// the user's latest token was issued for another course, or it has been
    /// tombstoned — all of which force the caller to rebuild the response.
    pub fn lookup(&self, course_id: &str, user_id: &str) -> Option<String> {
        let by_user = self.by_user.read().unwrap();
        let etag = by_user.get(user_id)?;
        if etag.course_id == course_id && etag.valid.load(Ordering::Acquire) {
            Some(etag.value.clone())
        } else {
            None
        }
    }

    pub fn invalidate_by_user(&self, user_id: &str) {
        if let Some(etag) = self.by_user.read().unwrap().get(user_id) {
            etag.valid.store(false, Ordering::Release);
        }
    }

    pub fn invalidate_by_course(&self, course_id: &str) {
        if let Some(etag) = self.by_course.read().unwrap().get(course_id) {
            etag.valid.store(false, Ordering::Release);
        }
    }

    pub fn clear(&self) {
        self.by_user.write().unwrap().clear();
        self.by_course.write().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_then_lookup_returns_token() {
        let cache = EtagCache::new();
        let token = cache.issue("C1", "U1");
        assert_eq!(cache.lookup("C1", "U1").as_deref(), Some(token.as_str()));
    }

    #[test]
    fn test_invalidate_by_course_tombstones_user_path() {
        let cache = EtagCache::new();
        cache.issue("C1", "U1");
        cache.invalidate_by_course("C1");
        assert!(cache.lookup("C1", "U1").is_none());
    }

    #[test]
    fn test_invalidate_by_user_tombstones_course_path() {
        let cache = EtagCache::new();
        cache.issue("C1", "U1");
        cache.invalidate_by_user("U1");
        assert!(cache.lookup("C1", "U1").is_none());
    }

    #[test]
    fn test_lookup_misses_for_other_course() {
        let cache = EtagCache::new();
        cache.issue("C1", "U1");
        // The user's latest token belongs to C1; a listing of C2 is uncached.
        assert!(cache.lookup("C2", "U1").is_none());
    }

    #[test]
    fn test_reissue_replaces_tombstoned_token() {
        let cache = EtagCache::new();
        let first = cache.issue("C1", "U1");
        cache.invalidate_by_course("C1");
        let second = cache.issue("C1", "U1");
        assert_ne!(first, second);
        assert_eq!(cache.lookup("C1", "U1").as_deref(), Some(second.as_str()));
    }

    #[test]
    fn test_invalidate_unknown_key_is_a_noop() {
        let cache = EtagCache::new();
        cache.invalidate_by_user("nobody");
        cache.invalidate_by_course("nothing");
        assert!(cache.lookup("C1", "U1").is_none());
    }
}
