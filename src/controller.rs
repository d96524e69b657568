//! # Scan Result Controller
//!
//! Drives classification for presentation surfaces:
//!
//! ```text
//! Empty ──submit──▶ Pending ──resolved──▶ Resolved ──dismiss──▶ Empty
//!                    │  ▲
//!                    └──┘ submit (supersedes)
//! ```
//!
//! Each `submit` bumps a generation counter and aborts the previous
//! classification. A classification only publishes its result if its
//! generation is still current, checked under the same lock that `submit`,
//! `dismiss` and `cancel_pending` take. The last submitted payload wins and a
//! stale result is never delivered.
//!
//! State changes are published on a `watch` channel; [`current`] reads the
//! latest value and [`subscribe`] observes changes.
//!
//! [`current`]: ScanResultController::current
//! [`subscribe`]: ScanResultController::subscribe

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::FutureExt;
use futures_util::future::{AbortHandle, abortable};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::classify::{ScanDetails, ScanResult, ScanResultClassifier};
use crate::payload::DecodedPayload;

/// What presentation surfaces see.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerState {
    Empty,
    Pending(DecodedPayload),
    Resolved(Arc<ScanResult>),
}

impl ControllerState {
    pub fn is_empty(&self) -> bool {
        matches!(self, ControllerState::Empty)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ControllerState::Pending(_))
    }

    pub fn result(&self) -> Option<&Arc<ScanResult>> {
        match self {
            ControllerState::Resolved(result) => Some(result),
            _ => None,
        }
    }
}

#[derive(Default)]
struct PendingSlot {
    generation: u64,
    abort: Option<AbortHandle>,
}

struct ControllerInner {
    classifier: ScanResultClassifier,
    state: watch::Sender<ControllerState>,
    pending: Mutex<PendingSlot>,
}

/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ScanResultController {
    inner: Arc<ControllerInner>,
}

impl ScanResultController {
    pub fn new(classifier: ScanResultClassifier) -> Self {
        let (state, _) = watch::channel(ControllerState::Empty);
        Self {
            inner: Arc::new(ControllerInner {
                classifier,
                state,
                pending: Mutex::new(PendingSlot::default()),
            }),
        }
    }

    /// Starts classifying `payload`, superseding any pending classification.
    ///
    /// Must be called inside a tokio runtime. Returns the generation assigned
    /// to this submission.
    pub fn submit(&self, payload: DecodedPayload) -> u64 {
        let mut slot = self.lock_pending();
        slot.generation += 1;
        let generation = slot.generation;
        if let Some(previous) = slot.abort.take() {
            previous.abort();
            debug!(generation, "Superseded pending classification");
        }

        let classifier = self.inner.classifier.clone();
        let task_payload = payload.clone();
        let fallback_payload = payload.clone();
        let (classification, abort) =
            abortable(AssertUnwindSafe(async move { classifier.classify(&task_payload).await }).catch_unwind());
        slot.abort = Some(abort);
        self.inner.state.send_replace(ControllerState::Pending(payload));
        drop(slot);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let Ok(outcome) = classification.await else {
                return;
            };
            // A panicking lookup still resolves, as an unknown result.
            let result = outcome.unwrap_or_else(|_| {
                warn!(generation, "Classification panicked");
                ScanResult::new(
                    &fallback_payload,
                    ScanDetails::failed_lookup(fallback_payload.raw.clone(), "lookup panicked"),
                )
            });
            let mut slot = inner.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.generation != generation {
                debug!(generation, current = slot.generation, "Discarding stale classification");
                return;
            }
            slot.abort = None;
            info!(generation, kind = result.kind(), id = %result.id, "Classification resolved");
            inner.state.send_replace(ControllerState::Resolved(Arc::new(result)));
        });

        generation
    }

    /// Clears the current result. A pending classification is cancelled.
    pub fn dismiss(&self) {
        let mut slot = self.lock_pending();
        Self::abort_pending(&mut slot);
        self.inner.state.send_if_modified(|state| {
            let changed = !state.is_empty();
            *state = ControllerState::Empty;
            changed
        });
    }

    /// Cancels an in-flight classification without delivering it.
    ///
    /// A resolved result is kept. Returns `true` if something was pending.
    pub fn cancel_pending(&self) -> bool {
        let mut slot = self.lock_pending();
        let was_pending = Self::abort_pending(&mut slot);
        self.inner.state.send_if_modified(|state| {
            if state.is_pending() {
                *state = ControllerState::Empty;
                true
            } else {
                false
            }
        });
        if was_pending {
            debug!("Pending classification cancelled");
        }
        was_pending
    }

    pub fn current(&self) -> ControllerState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.inner.state.subscribe()
    }

    /// Waits until a result is resolved.
    pub async fn resolved(&self) -> Option<Arc<ScanResult>> {
        let mut receiver = self.subscribe();
        let state = receiver.wait_for(|state| state.result().is_some()).await.ok()?;
        state.result().cloned()
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, PendingSlot> {
        self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn abort_pending(slot: &mut PendingSlot) -> bool {
        slot.generation += 1;
        match slot.abort.take() {
            Some(abort) => {
                abort.abort();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for ScanResultController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanResultController")
            .field("state", &self.current())
            .finish_non_exhaustive()
    }
}
