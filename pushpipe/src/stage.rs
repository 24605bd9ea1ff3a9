//! The stage trait and the shared handle every edge of a resolved graph holds.
//!
//! A stage is a live, resumable processing unit reachable only through three
//! operations: accept a value, accept a failure, accept a close signal.
//! Construction advances a stage to its first point of readiness, so a freshly
//! built stage can take a value immediately.

use std::cell::RefCell;
use std::rc::Rc;

use crate::errors::{Failure, PipeError, PipeResult};

/// A live, resumable processing unit.
///
/// Implementations must uphold the propagation contract: a domain failure
/// raised while processing a value is delivered to the stage's own downstream
/// target before it is returned to the caller, and close cascades to the
/// downstream target after the stage's own teardown.
pub trait Stage<T> {
    /// Delivers the next value.
    ///
    /// Runs synchronously to completion, including any sends to downstream
    /// stages, before returning control to the caller.
    fn accept(&mut self, item: T) -> PipeResult;

    /// Delivers a failure raised upstream.
    ///
    /// Returning `Ok(())` means the stage absorbed the failure and remains
    /// live; returning the failure re-raises it to the caller after the
    /// stage's downstream target has been notified.
    fn fail(&mut self, failure: Failure) -> PipeResult;

    /// Delivers the teardown signal: no further values will arrive.
    fn close(&mut self) -> PipeResult;
}

/// Lifecycle of a resolved stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// Accepting values.
    Running,
    /// Terminated by a failure or by its own body completing; never resumed.
    Finished,
    /// Torn down by a close signal.
    Closed,
}

struct HandleCell<T> {
    stage: Box<dyn Stage<T>>,
    status: StageStatus,
}

/// Shared reference to a resolved stage, enforcing its lifecycle.
///
/// A handle is held by the upstream stage bound to it at resolution time and,
/// for compositions, cached on the graph node itself; both see the same
/// underlying state. Handles are single-threaded by design: a pipeline run is
/// one logical thread of control.
pub struct StageHandle<T> {
    cell: Rc<RefCell<HandleCell<T>>>,
}

impl<T> Clone for StageHandle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T: 'static> StageHandle<T> {
    /// Wraps a freshly constructed stage.
    #[must_use]
    pub fn new(stage: impl Stage<T> + 'static) -> Self {
        Self {
            cell: Rc::new(RefCell::new(HandleCell {
                stage: Box::new(stage),
                status: StageStatus::Running,
            })),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> StageStatus {
        self.cell
            .try_borrow()
            .map_or(StageStatus::Running, |cell| cell.status)
    }

    /// Delivers the next value, rejecting terminated stages.
    pub fn accept(&self, item: T) -> PipeResult {
        let mut cell = self.cell.try_borrow_mut().map_err(|_| PipeError::Cycle)?;
        if cell.status != StageStatus::Running {
            return Err(PipeError::Terminated);
        }
        let result = cell.stage.accept(item);
        if result.is_err() {
            cell.status = StageStatus::Finished;
        }
        result
    }

    /// Delivers a failure; a terminated stage reports [`PipeError::Terminated`]
    /// so fan-out paths can suppress it.
    pub fn fail(&self, failure: Failure) -> PipeResult {
        let mut cell = self.cell.try_borrow_mut().map_err(|_| PipeError::Cycle)?;
        if cell.status != StageStatus::Running {
            return Err(PipeError::Terminated);
        }
        let result = cell.stage.fail(failure);
        if result.is_err() {
            cell.status = StageStatus::Finished;
        }
        result
    }

    /// Delivers the teardown signal. Idempotent; a stage that already
    /// terminated is left as-is.
    pub fn close(&self) -> PipeResult {
        let mut cell = self.cell.try_borrow_mut().map_err(|_| PipeError::Cycle)?;
        match cell.status {
            StageStatus::Finished | StageStatus::Closed => Ok(()),
            StageStatus::Running => {
                let result = cell.stage.close();
                cell.status = StageStatus::Closed;
                result
            }
        }
    }
}

/// Delivers a failure to an optional downstream target, suppressing any
/// secondary error, so a failure always reaches downstream before it unwinds
/// to the caller.
pub(crate) fn notify_failure<U: 'static>(target: Option<&StageHandle<U>>, failure: &Failure) {
    if let Some(target) = target {
        if let Err(err) = target.fail(failure.clone()) {
            tracing::debug!(error = %err, "secondary error during failure delivery suppressed");
        }
    }
}
