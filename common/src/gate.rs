use std::sync::Arc;

/// Caps the number of copy operations executing at once.
///
/// Acquire blocks until a permit is free; permits are returned on drop, so a
/// worker that bails out early on an error path still releases its slot.
#[derive(Clone, Debug)]
pub struct Gate {
    sem: Arc<tokio::sync::Semaphore>,
    capacity: usize,
}

impl Gate {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "gate capacity must be non-zero");
        Self {
            sem: Arc::new(tokio::sync::Semaphore::new(capacity)),
            capacity,
        }
    }

    pub async fn acquire(&self) -> tokio::sync::OwnedSemaphorePermit {
        self.sem
            .clone()
            .acquire_owned()
            .await
            .expect("gate semaphore is never closed")
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }
}
