//! Background selector computation
//!
//! Resolving selectors for a large list takes a while, so hosts can run it
//! on a worker thread and give up after a deadline.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hush_core::elemhide::{CancelFlag, ElemHideSelectors};
use parking_lot::{Condvar, Mutex};

use crate::engine::FilterEngine;
use crate::error::EngineError;

#[derive(Default)]
struct Slot {
    result: Mutex<Option<ElemHideSelectors>>,
    done: Condvar,
}

pub struct SelectorJob {
    cancel: CancelFlag,
    slot: Arc<Slot>,
}

impl SelectorJob {
    /// Start resolving selectors for `domain` on a worker thread.
    pub fn spawn(engine: Arc<FilterEngine>, domain: impl Into<String>, specific_only: bool) -> Result<Self, EngineError> {
        let domain = domain.into();
        let cancel = CancelFlag::new();
        let slot = Arc::new(Slot::default());

        let worker_cancel = cancel.clone();
        let worker_slot = Arc::clone(&slot);
        thread::Builder::new()
            .name("hush-selectors".to_string())
            .spawn(move || {
                let selectors = engine
                    .resolve_selectors(&domain, specific_only, Some(&worker_cancel))
                    .unwrap_or_default();
                *worker_slot.result.lock() = Some(selectors);
                worker_slot.done.notify_all();
            })?;

        Ok(Self { cancel, slot })
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
        self.slot.done.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait up to `timeout` for the result.
    ///
    /// On timeout the job is cancelled. A cancelled job yields no selectors.
    pub fn wait(&self, timeout: Duration) -> ElemHideSelectors {
        let deadline = Instant::now() + timeout;
        let mut result = self.slot.result.lock();
        while result.is_none() && !self.is_cancelled() {
            if self.slot.done.wait_until(&mut result, deadline).timed_out() {
                log::debug!("Selector job timed out after {:?}", timeout);
                self.cancel();
                break;
            }
        }

        if self.is_cancelled() {
            return ElemHideSelectors::default();
        }
        result.clone().unwrap_or_default()
    }
}

impl std::fmt::Debug for SelectorJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectorJob")
            .field("cancelled", &self.is_cancelled())
            .field("done", &self.slot.result.lock().is_some())
            .finish()
    }
}
