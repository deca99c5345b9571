//! Shared engine lifetime
//!
//! `EngineProvider` reference-counts users of a single [`FilterEngine`]. The
//! first `retain` builds it, the last `release` disposes it. Readers go
//! through an `RwLock` gate and see `None` once the engine is gone.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::engine::FilterEngine;
use crate::error::EngineError;

pub type EngineFactory = dyn Fn() -> Result<FilterEngine, EngineError> + Send + Sync;
pub type CreatedListener = dyn Fn(&Arc<FilterEngine>) + Send + Sync;
pub type DisposedListener = dyn Fn() + Send + Sync;

struct Shared {
    factory: Box<EngineFactory>,
    retained: AtomicUsize,
    engine: RwLock<Option<Arc<FilterEngine>>>,
    /// One-shot latch, set once a build attempt has finished
    ready: Mutex<bool>,
    ready_cv: Condvar,
    created: Mutex<Vec<Arc<CreatedListener>>>,
    disposed: Mutex<Vec<Arc<DisposedListener>>>,
}

impl Shared {
    fn build(&self) -> Result<(), EngineError> {
        let result = (self.factory)().map(Arc::new);
        let outcome = match result {
            Ok(engine) => {
                *self.engine.write() = Some(Arc::clone(&engine));
                let listeners: Vec<_> = self.created.lock().clone();
                for listener in listeners {
                    listener(&engine);
                }
                log::info!("Filter engine ready");
                Ok(())
            }
            Err(err) => {
                log::warn!("Filter engine creation failed: {}", err);
                Err(err)
            }
        };

        *self.ready.lock() = true;
        self.ready_cv.notify_all();
        outcome
    }

    fn wait_ready(&self) {
        let mut ready = self.ready.lock();
        while !*ready {
            self.ready_cv.wait(&mut ready);
        }
    }
}

#[derive(Clone)]
pub struct EngineProvider {
    shared: Arc<Shared>,
}

impl EngineProvider {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<FilterEngine, EngineError> + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                factory: Box::new(factory),
                retained: AtomicUsize::new(0),
                engine: RwLock::new(None),
                ready: Mutex::new(false),
                ready_cv: Condvar::new(),
                created: Mutex::new(Vec::new()),
                disposed: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Take a reference. The first one builds the engine, on a background
    /// thread when `asynchronous` is set. A synchronous retain returns once
    /// the build attempt has finished, even when another caller started it.
    pub fn retain(&self, asynchronous: bool) -> Result<(), EngineError> {
        let first = {
            // First increment and latch reset happen under the same lock
            let mut ready = self.shared.ready.lock();
            let first = self.shared.retained.fetch_add(1, Ordering::AcqRel) == 0;
            if first {
                *ready = false;
            }
            first
        };
        if !first {
            if !asynchronous {
                self.shared.wait_ready();
            }
            return Ok(());
        }

        if asynchronous {
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name("hush-engine-init".to_string())
                .spawn(move || {
                    // Failure is logged in build; readers see no engine
                    let _ = shared.build();
                });
            if let Err(err) = spawned {
                self.shared.retained.fetch_sub(1, Ordering::AcqRel);
                return Err(EngineError::Creation(err.to_string()));
            }
            return Ok(());
        }

        self.shared.build().map_err(|err| {
            self.shared.retained.fetch_sub(1, Ordering::AcqRel);
            err
        })
    }

    /// Block until the first build attempt has finished.
    pub fn wait_for_ready(&self) -> Result<(), EngineError> {
        if self.retain_count() == 0 {
            return Err(EngineError::NotRetained);
        }
        self.shared.wait_ready();
        Ok(())
    }

    /// Drop a reference. The last one disposes the engine once it is ready.
    pub fn release(&self) -> Result<(), EngineError> {
        let previous = self
            .shared
            .retained
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1))
            .map_err(|_| EngineError::NotRetained)?;
        if previous != 1 {
            return Ok(());
        }

        self.shared.wait_ready();

        let disposed = {
            let mut gate = self.shared.engine.write();
            // Retained again while we waited
            if self.retain_count() != 0 {
                return Ok(());
            }
            gate.take()
        };

        if disposed.is_some() {
            drop(disposed);
            let listeners: Vec<_> = self.shared.disposed.lock().clone();
            for listener in listeners {
                listener();
            }
            log::info!("Filter engine disposed");
        }
        Ok(())
    }

    pub fn retain_count(&self) -> usize {
        self.shared.retained.load(Ordering::Acquire)
    }

    /// Live engine, or `None` when unretained, not built yet or disposed.
    pub fn engine(&self) -> Option<Arc<FilterEngine>> {
        let gate = self.shared.engine.read();
        if self.retain_count() == 0 {
            return None;
        }
        gate.clone()
    }

    /// Run `f` against the live engine, or return the default without one.
    pub fn with_engine<R: Default>(&self, f: impl FnOnce(&FilterEngine) -> R) -> R {
        match self.engine() {
            Some(engine) => f(&engine),
            None => R::default(),
        }
    }

    pub fn add_created_listener<F>(&self, listener: F)
    where
        F: Fn(&Arc<FilterEngine>) + Send + Sync + 'static,
    {
        self.shared.created.lock().push(Arc::new(listener));
    }

    pub fn add_disposed_listener<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.disposed.lock().push(Arc::new(listener));
    }
}

impl std::fmt::Debug for EngineProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineProvider")
            .field("retained", &self.retain_count())
            .field("alive", &self.shared.engine.read().is_some())
            .finish()
    }
}
