use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

/// Per-user map of "is registered in course" decisions. The outer mutex only
/// guards creation of the per-user entry; each user's decisions live behind
/// that user's own async mutex, held across the whole decision (including
/// the store query), so different users never contend.
///
/// The decision algorithm itself lives in `CacheContext::is_registered`; it
/// must only insert `false` when the owning course's status has left
/// `registration` (a registration can then never appear, so the negative is
/// permanently correct). A `true`, once observed, is always safe to keep.
pub struct MembershipCache {
    users: Mutex<HashMap<String, Arc<AsyncMutex<HashMap<String, bool>>>>>,
}

impl Default for MembershipCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MembershipCache {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
        }
    }

    /// The user's decision map, created lazily.
    pub fn user(&self, user_id: &str) -> Arc<AsyncMutex<HashMap<String, bool>>> {
        let mut users = self.users.lock().unwrap();
        Arc::clone(
            users
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(HashMap::new()))),
        )
    }

    /// The decision currently cached for (user, course), if any.
    pub async fn cached(&self, user_id: &str, course_id: &str) -> Option<bool> {
        let entry = {
            let users = self.users.lock().unwrap();
            users.get(user_id).cloned()
        }?;
        let courses = entry.lock().await;
        courses.get(course_id).copied()
    }

    pub fn clear(&self) {
        self.users.lock().unwrap().clear();
    }
}
