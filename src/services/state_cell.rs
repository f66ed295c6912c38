use crate::events::WindowInfo;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// SharedStateCell holds the latest observed `WindowInfo`.
///
/// Responsibilities (strict):
/// - One writer (FocusTracker) replaces the whole snapshot; readers get an `Arc` clone.
/// - Readers never see a value under construction: the lock only guards the pointer swap.
/// - No history. The previous snapshot is dropped once the last reader releases it.
pub struct SharedStateCell {
    current: RwLock<Arc<WindowInfo>>,
    generation: AtomicU64,
}

impl Default for SharedStateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedStateCell {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(WindowInfo::unknown())),
            generation: AtomicU64::new(0),
        }
    }

    /// Текущий снимок (дёшево: клонируется только Arc)
    pub fn snapshot(&self) -> Arc<WindowInfo> {
        self.current.read().clone()
    }

    /// Номер последней замены; 0 - ещё ни одного события
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Replace the snapshot wholesale, returning the new generation.
    pub fn replace(&self, info: WindowInfo) -> u64 {
        let next = Arc::new(info);
        let previous = {
            let mut guard = self.current.write();
            std::mem::replace(&mut *guard, next)
        };
        // Старый снимок освобождаем вне критической секции
        drop(previous);
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}
