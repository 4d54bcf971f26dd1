use std::sync::{Condvar, Mutex};

use crate::error::SyncResult;

/// Reader/writer lock guarding the design singleton.
///
/// Any number of readers, or one writer, never both. Members reload their
/// local design snapshot from storage under the read side and persist a
/// changed design under the write side. Like [`NameLocker`] it may be
/// backed by a cluster service.
///
/// [`NameLocker`]: crate::NameLocker
pub trait DesignLocker: Send + Sync {
    fn lock_read(&self) -> SyncResult<()>;
    fn unlock_read(&self) -> SyncResult<()>;
    fn lock_write(&self) -> SyncResult<()>;
    fn unlock_write(&self) -> SyncResult<()>;
}

impl dyn DesignLocker + '_ {
    pub fn read(&self) -> SyncResult<DesignReadGuard<'_>> {
        self.lock_read()?;
        Ok(DesignReadGuard { locker: self })
    }

    pub fn write(&self) -> SyncResult<DesignWriteGuard<'_>> {
        self.lock_write()?;
        Ok(DesignWriteGuard { locker: self })
    }
}

pub struct DesignReadGuard<'a> {
    locker: &'a dyn DesignLocker,
}

impl Drop for DesignReadGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.locker.unlock_read() {
            tracing::error!(error = %e, "failed to release design read lock");
        }
    }
}

pub struct DesignWriteGuard<'a> {
    locker: &'a dyn DesignLocker,
}

impl Drop for DesignWriteGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.locker.unlock_write() {
            tracing::error!(error = %e, "failed to release design write lock");
        }
    }
}

#[derive(Default)]
struct RwState {
    readers: usize,
    writer: bool,
}

/// In-process design lock.
///
/// Unlike `std::sync::RwLock` the lock and unlock calls are separate, so
/// a cluster-backed implementation can share the same call sites.
#[derive(Default)]
pub struct MemoryDesignLocker {
    state: Mutex<RwState>,
    changed: Condvar,
}

impl MemoryDesignLocker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DesignLocker for MemoryDesignLocker {
    fn lock_read(&self) -> SyncResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        while state.writer {
            state = self.changed.wait(state).expect("lock poisoned");
        }
        state.readers += 1;
        Ok(())
    }

    fn unlock_read(&self) -> SyncResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.readers = state.readers.saturating_sub(1);
        if state.readers == 0 {
            self.changed.notify_all();
        }
        Ok(())
    }

    fn lock_write(&self) -> SyncResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        while state.writer || state.readers > 0 {
            state = self.changed.wait(state).expect("lock poisoned");
        }
        state.writer = true;
        Ok(())
    }

    fn unlock_write(&self) -> SyncResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        state.writer = false;
        self.changed.notify_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn readers_share() {
        let locker = MemoryDesignLocker::new();
        let l: &dyn DesignLocker = &locker;
        let a = l.read().unwrap();
        let b = l.read().unwrap();
        drop(a);
        drop(b);
        let _w = l.write().unwrap();
    }

    #[test]
    fn writer_waits_for_readers() {
        let locker = Arc::new(MemoryDesignLocker::new());
        let wrote = Arc::new(AtomicBool::new(false));
        locker.lock_read().unwrap();

        let (l2, w2) = (Arc::clone(&locker), Arc::clone(&wrote));
        let writer = thread::spawn(move || {
            let l: &dyn DesignLocker = &*l2;
            let _g = l.write().unwrap();
            w2.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(20));
        assert!(!wrote.load(Ordering::SeqCst));
        locker.unlock_read().unwrap();
        writer.join().unwrap();
        assert!(wrote.load(Ordering::SeqCst));
    }

    #[test]
    fn reader_waits_for_writer() {
        let locker = Arc::new(MemoryDesignLocker::new());
        locker.lock_write().unwrap();
        let l2 = Arc::clone(&locker);
        let reader = thread::spawn(move || {
            l2.lock_read().unwrap();
            l2.unlock_read().unwrap();
        });
        thread::sleep(Duration::from_millis(20));
        assert!(!reader.is_finished());
        locker.unlock_write().unwrap();
        reader.join().unwrap();
    }
}
