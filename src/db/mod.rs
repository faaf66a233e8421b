pub mod repository;

use std::sync::atomic::{AtomicU64, Ordering};

use sqlx::SqlitePool;

/// Primary store plus its replica, with a biased round-robin selector for
/// read traffic. Writes never go through `read()`; they are issued to both
/// pools explicitly (see `repository`), with no cross-store transaction.
pub struct DbPair {
    primary: SqlitePool,
    secondary: SqlitePool,
    counter: AtomicU64,
}

impl DbPair {
    pub fn new(primary: SqlitePool, secondary: SqlitePool) -> Self {
        Self {
            primary,
            secondary,
            counter: AtomicU64::new(0),
        }
    }

    /// Picks a pool for a read query. Counter residues {0, 2, 4} mod 7 hit
    /// the primary, the rest the secondary: a 3:4 split.
    pub fn read(&self) -> &SqlitePool {
        let v = self.counter.fetch_add(1, Ordering::Relaxed) % 7;
        if v == 0 || v == 2 || v == 4 {
            &self.primary
        } else {
            &self.secondary
        }
    }

    pub fn primary(&self) -> &SqlitePool {
        &self.primary
    }

    pub fn secondary(&self) -> &SqlitePool {
        &self.secondary
    }

    /// Both instances, for dual writes.
    pub fn both(&self) -> [&SqlitePool; 2] {
        [&self.primary, &self.secondary]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test db")
    }

    #[tokio::test]
    async fn test_read_route_distribution() {
        let db = DbPair::new(memory_pool().await, memory_pool().await);

        // Over 7 calls from a fresh counter: primary, secondary, primary,
        // secondary, primary, secondary, secondary.
        let expected = [true, false, true, false, true, false, false];
        for (i, &want_primary) in expected.iter().enumerate() {
            let picked = db.read();
            let is_primary = std::ptr::eq(picked, db.primary());
            assert_eq!(is_primary, want_primary, "call {}", i);
        }

        // The pattern repeats for the next window of 7.
        for &want_primary in &expected {
            let picked = db.read();
            assert_eq!(std::ptr::eq(picked, db.primary()), want_primary);
        }
    }
}
