use crate::{instance::Instance, Error, MutexFactory, MutexHandle, Result, TARGET};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Timeout every operation acquires the instance mutex with.
pub const MUTEX_TIMEOUT: u32 = u32::MAX;

/// Holds the instance mutex, if any, until dropped.
pub(crate) struct Guard(Option<Arc<dyn MutexHandle>>);

impl Guard {
    pub fn acquire(obj: &Instance) -> Result<Self> {
        if let Some(m) = &obj.mutex {
            m.acquire(MUTEX_TIMEOUT).inspect_err(|e| {
                log::error!(target: TARGET, "unit {:#x}: mutex acquire failed: {e}", obj.unit);
            })?;
        }
        Ok(Self(obj.mutex.clone()))
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        if let Some(m) = &self.0 {
            if let Err(e) = m.release() {
                log::warn!(target: TARGET, "mutex release failed: {e}");
            }
        }
    }
}

/// [`MutexFactory`] backed by `std::sync`.
pub struct StdMutex;

impl MutexFactory for StdMutex {
    fn init(&self) -> Result<Arc<dyn MutexHandle>> {
        Ok(Arc::new(StdMutexHandle::default()))
    }
}

#[derive(Default)]
struct StdMutexHandle {
    locked: Mutex<bool>,
    cond: Condvar,
}

impl MutexHandle for StdMutexHandle {
    fn acquire(&self, timeout_ms: u32) -> Result<()> {
        let deadline = (timeout_ms != MUTEX_TIMEOUT)
            .then(|| Instant::now() + Duration::from_millis(timeout_ms.into()));
        let mut locked = self.locked.lock().map_err(|_| Error::Mutex)?;
        while *locked {
            locked = match deadline {
                None => self.cond.wait(locked).map_err(|_| Error::Mutex)?,
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Err(Error::Mutex);
                    }
                    self.cond.wait_timeout(locked, left).map_err(|_| Error::Mutex)?.0
                }
            };
        }
        *locked = true;
        Ok(())
    }

    fn release(&self) -> Result<()> {
        let mut locked = self.locked.lock().map_err(|_| Error::Mutex)?;
        if !*locked {
            return Err(Error::Mutex);
        }
        *locked = false;
        self.cond.notify_one();
        Ok(())
    }

    fn deinit(&self) -> Result<()> {
        match *self.locked.lock().map_err(|_| Error::Mutex)? {
            true => Err(Error::Mutex),
            false => Ok(()),
        }
    }
}
