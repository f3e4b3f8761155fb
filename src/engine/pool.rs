// Bounded engine pool with checkout leases
// One expensive initialize per pooled instance, reused across requests

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};

use super::{Engine, EngineError, EngineSpec};

/// Pool sizing knobs
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Number of engine instances kept alive
    pub size: usize,

    /// How many requests may wait for a free engine before new
    /// checkouts are rejected with ServiceBusy
    pub max_queue_depth: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            size: 2,
            max_queue_depth: 8,
        }
    }
}

/// A small, bounded set of continuation engines.
///
/// Engines are constructed up front but initialized lazily on first
/// checkout. No two in-flight requests ever share an instance; requests
/// beyond capacity queue up to `max_queue_depth`, then get rejected.
#[derive(Debug)]
pub struct EnginePool {
    spec: EngineSpec,
    slots: Mutex<Vec<Engine>>,
    permits: Semaphore,
    waiting: AtomicUsize,
    config: PoolConfig,
}

impl EnginePool {
    pub fn new(spec: EngineSpec, config: PoolConfig) -> Self {
        let size = config.size.max(1);
        let slots = (0..size).map(|_| spec.build()).collect();

        EnginePool {
            spec,
            slots: Mutex::new(slots),
            permits: Semaphore::new(size),
            waiting: AtomicUsize::new(0),
            config: PoolConfig { size, ..config },
        }
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Check out an engine, initializing it if this instance has not been
    /// used yet. The lease returns the engine to the pool on drop, on every
    /// exit path including caller cancellation.
    pub async fn checkout(&self) -> Result<EngineLease<'_>, EngineError> {
        let permit = match self.permits.try_acquire() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(EngineError::PoolClosed),
            Err(TryAcquireError::NoPermits) => {
                let _waiting = QueueSlot::claim(&self.waiting, self.config.max_queue_depth)?;
                self.permits
                    .acquire()
                    .await
                    .map_err(|_| EngineError::PoolClosed)?
            }
        };

        let mut engine = match self.lock_slots().pop() {
            Some(engine) => engine,
            // Unreachable while the permit invariant holds; rebuild rather
            // than fail the request
            None => self.spec.build(),
        };

        if !engine.is_ready() {
            if let Err(err) = engine.initialize().await {
                self.lock_slots().push(engine);
                return Err(err);
            }
        }

        Ok(EngineLease {
            pool: self,
            engine: Some(engine),
            _permit: permit,
        })
    }

    /// Retire the pool: reject new checkouts and release every idle engine.
    ///
    /// Call after in-flight requests have drained; a leased engine returns
    /// to the slot list un-released and is caught by a later call.
    pub fn shutdown(&self) {
        self.permits.close();
        let mut slots = self.lock_slots();
        for engine in slots.iter_mut() {
            engine.release();
        }
        slots.clear();
        log::info!("engine pool shut down");
    }

    fn lock_slots(&self) -> MutexGuard<'_, Vec<Engine>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn return_engine(&self, engine: Engine) {
        self.lock_slots().push(engine);
    }
}

/// Accounting for one queued waiter; decrements on drop so abandoned
/// waits do not leak queue capacity.
struct QueueSlot<'a>(&'a AtomicUsize);

impl<'a> QueueSlot<'a> {
    fn claim(waiting: &'a AtomicUsize, depth: usize) -> Result<Self, EngineError> {
        waiting
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |w| {
                (w < depth).then_some(w + 1)
            })
            .map_err(|_| EngineError::ServiceBusy)?;
        Ok(QueueSlot(waiting))
    }
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Exclusive checkout of one pooled engine.
#[derive(Debug)]
pub struct EngineLease<'a> {
    pool: &'a EnginePool,
    engine: Option<Engine>,
    _permit: SemaphorePermit<'a>,
}

impl Deref for EngineLease<'_> {
    type Target = Engine;

    fn deref(&self) -> &Engine {
        // Engine is only vacated in drop
        self.engine.as_ref().expect("lease engine present")
    }
}

impl DerefMut for EngineLease<'_> {
    fn deref_mut(&mut self) -> &mut Engine {
        self.engine.as_mut().expect("lease engine present")
    }
}

impl Drop for EngineLease<'_> {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            self.pool.return_engine(engine);
        }
    }
}
