//! Serializes generation of one artifact for one chapter.
//!
//! A second request for the same (chapter, artifact) waits for the first and
//! then finds the persisted result, so the external API is billed once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    Source,
    Summary,
    Podcast,
    Presentation,
    Test,
}

type Key = (Uuid, Artifact);
type Locks = Arc<Mutex<HashMap<Key, Slot>>>;

struct Slot {
    lock: Arc<tokio::sync::Mutex<()>>,
    /// Requests holding or waiting on `lock`
    users: usize,
}

#[derive(Default)]
pub struct InFlight {
    locks: Locks,
}

/// Counts one request against its slot until dropped, including a request
/// cancelled while it waits.
struct Registration {
    key: Key,
    locks: Locks,
}

/// Held while one request generates an artifact
pub struct InFlightGuard {
    _permit: OwnedMutexGuard<()>,
    _registration: Registration,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, chapter_id: Uuid, artifact: Artifact) -> InFlightGuard {
        let key = (chapter_id, artifact);
        let (lock, registration) = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = locks.entry(key).or_insert_with(|| Slot {
                lock: Arc::default(),
                users: 0,
            });
            slot.users += 1;
            let registration = Registration {
                key,
                locks: self.locks.clone(),
            };
            (slot.lock.clone(), registration)
        };

        InFlightGuard {
            _permit: lock.lock_owned().await,
            _registration: registration,
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = locks.get_mut(&self.key) {
            slot.users -= 1;
            if slot.users == 0 {
                locks.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let in_flight = Arc::new(InFlight::new());
        let chapter = Uuid::new_v4();
        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let in_flight = in_flight.clone();
                let active = active.clone();
                let max_active = max_active.clone();
                tokio::spawn(async move {
                    let _guard = in_flight.acquire(chapter, Artifact::Summary).await;
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        assert_eq!(in_flight.tracked(), 0);
    }

    #[tokio::test]
    async fn test_different_artifacts_do_not_block() {
        let in_flight = InFlight::new();
        let chapter = Uuid::new_v4();

        let _summary = in_flight.acquire(chapter, Artifact::Summary).await;
        let podcast = tokio::time::timeout(
            Duration::from_secs(1),
            in_flight.acquire(chapter, Artifact::Podcast),
        )
        .await;

        assert!(podcast.is_ok());
        assert_eq!(in_flight.tracked(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_does_not_leak_its_slot() {
        let in_flight = Arc::new(InFlight::new());
        let chapter = Uuid::new_v4();

        let holder = in_flight.acquire(chapter, Artifact::Podcast).await;
        let waiter = tokio::spawn({
            let in_flight = in_flight.clone();
            async move {
                let _guard = in_flight.acquire(chapter, Artifact::Podcast).await;
                std::future::pending::<()>().await;
            }
        });
        // Let the waiter register and park on the lock
        tokio::task::yield_now().await;
        assert_eq!(in_flight.tracked(), 1);

        // Release first, then cancel the waiter before it runs again
        drop(holder);
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        assert_eq!(in_flight.tracked(), 0);
    }
}
