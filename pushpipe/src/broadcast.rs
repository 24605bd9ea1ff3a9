//! Broadcast fan-out: one input stream delivered to several sub-pipelines.
//!
//! Each accepted value is delivered to every target, in a fixed order, and
//! each target fully processes the value before the next target sees it. When
//! one target fails, the same failure is delivered to every sibling before it
//! is re-raised upstream, so no branch is left unaware of the teardown.

use crate::errors::{Failure, PipeError, PipeResult};
use crate::graph::Node;
use crate::stage::{Stage, StageHandle};

/// Fan-out stage over an ordered group of targets.
pub struct BroadcastStage<T> {
    targets: Vec<StageHandle<T>>,
}

impl<T: Clone + 'static> BroadcastStage<T> {
    /// Builds the stage from resolved targets; the order given is the
    /// delivery order.
    #[must_use]
    pub fn new(targets: Vec<StageHandle<T>>) -> Self {
        Self { targets }
    }

    /// Delivers `failure` to every target except `skip`, suppressing any
    /// secondary error so every sibling gets its delivery attempt.
    fn redeliver(&self, failure: &Failure, skip: Option<usize>) {
        for (index, target) in self.targets.iter().enumerate() {
            if Some(index) == skip {
                continue;
            }
            if let Err(err) = target.fail(failure.clone()) {
                tracing::debug!(
                    branch = index,
                    error = %err,
                    "secondary error during broadcast fan-out suppressed"
                );
            }
        }
    }
}

impl<T: Clone + 'static> Stage<T> for BroadcastStage<T> {
    fn accept(&mut self, item: T) -> PipeResult {
        for index in 0..self.targets.len() {
            if let Err(err) = self.targets[index].accept(item.clone()) {
                return match err {
                    PipeError::Failure(failure) => {
                        self.redeliver(&failure, Some(index));
                        Err(PipeError::Failure(failure))
                    }
                    other => Err(other),
                };
            }
        }
        Ok(())
    }

    fn fail(&mut self, failure: Failure) -> PipeResult {
        self.redeliver(&failure, None);
        Err(PipeError::Failure(failure))
    }

    fn close(&mut self) -> PipeResult {
        // Every target gets its own close attempt, regardless of how the
        // previous ones fared; the first error is reported afterwards.
        let mut first_err = None;
        for (index, target) in self.targets.iter().enumerate() {
            if let Err(err) = target.close() {
                tracing::debug!(branch = index, error = %err, "broadcast branch close failed");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Fan-out node delivering each item to every branch, in order.
///
/// Branches are resolved when the broadcast node itself is resolved; each
/// branch is a complete sub-pipeline with no external target.
#[must_use]
pub fn broadcast<T, O>(branches: Vec<Node<T, O>>) -> Node<T>
where
    T: Clone + 'static,
    O: 'static,
{
    Node::from_ctor(move |_target| {
        let mut targets = Vec::with_capacity(branches.len());
        for mut branch in branches {
            targets.push(branch.resolve(None)?);
        }
        Ok(StageHandle::new(BroadcastStage::new(targets)))
    })
}
