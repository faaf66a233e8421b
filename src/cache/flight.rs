use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::error::AppError;

/// Deduplicates concurrent identical calls: while a call for a key is in
/// flight, later callers wait for it and receive the same outcome instead of
/// executing the work again. Once the call completes the key is forgotten,
/// so this shares concurrency, it does not cache results.
pub struct Flight<K, V> {
    calls: Mutex<HashMap<K, broadcast::Sender<Result<V, AppError>>>>,
}

impl<K, V> Default for Flight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Flight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub async fn run<F, Fut>(&self, key: K, work: F) -> Result<V, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, AppError>>,
    {
        // Subscribe or register under the lock, but await only after the
        // guard is released so the handler futures stay `Send`.
        let lead_or_wait = {
            let mut calls = self.calls.lock().unwrap();
            if let Some(tx) = calls.get(&key) {
                Err(tx.subscribe())
            } else {
                let (tx, _) = broadcast::channel(1);
                calls.insert(key.clone(), tx.clone());
                Ok(tx)
            }
        };
        let tx = match lead_or_wait {
            Ok(tx) => tx,
            Err(mut rx) => {
                return match rx.recv().await {
                    Ok(result) => result,
                    // The leader dropped the channel without sending.
                    Err(_) => Err(AppError::InternalServerError),
                };
            }
        };

        let result = work().await;

        // Forget the key before publishing, so a caller arriving after
        // completion starts a fresh call rather than observing this one.
        self.calls.lock().unwrap().remove(&key);
        let _ = tx.send(result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_calls_share_one_execution() {
        let flight: Arc<Flight<String, u64>> = Arc::new(Flight::new());
        let invocations = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = Arc::clone(&flight);
            let invocations = Arc::clone(&invocations);
            handles.push(tokio::spawn(async move {
                flight
                    .run("key".to_string(), || async {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            let result = handle.await.expect("task panicked");
            assert_eq!(result.expect("flight failed"), 42);
        }
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_key_forgotten_after_completion() {
        let flight: Flight<String, u64> = Flight::new();
        let invocations = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = flight
                .run("key".to_string(), || async {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .expect("flight failed");
            assert_eq!(value, 7);
        }
        // Sequential calls each execute; nothing is retained between them.
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_waiters_observe_the_leaders_error() {
        let flight: Arc<Flight<String, u64>> = Arc::new(Flight::new());
        let invocations = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let flight = Arc::clone(&flight);
            let invocations = Arc::clone(&invocations);
            handles.push(tokio::spawn(async move {
                flight
                    .run("key".to_string(), || async {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err::<u64, _>(AppError::NotFound)
                    })
                    .await
            }));
        }

        for handle in handles {
            let result = handle.await.expect("task panicked");
            assert!(matches!(result, Err(AppError::NotFound)));
        }
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let flight: Arc<Flight<String, u64>> = Arc::new(Flight::new());
        let invocations = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..4 {
            let flight = Arc::clone(&flight);
            let invocations = Arc::clone(&invocations);
            handles.push(tokio::spawn(async move {
                flight
                    .run(format!("key-{i}"), || async {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(i)
                    })
                    .await
            }));
        }

        for handle in handles {
            handle.await.expect("task panicked").expect("flight failed");
        }
        assert_eq!(invocations.load(Ordering::SeqCst), 4);
    }
}
