//! Sources: drivers that push a sequence into a resolved pipeline.
//!
//! A source is not a lazily resolved element: connecting it eagerly resolves
//! its target and runs the source's body to completion against it — every
//! item pushed, then close. On failure the target is notified first, then
//! torn down, then the failure is returned to the caller.

use crate::errors::{Failure, PipeError, PipeResult};
use crate::graph::Node;
use crate::stage::{notify_failure, StageHandle};

/// A driver pushing a bounded or unbounded sequence into a target.
///
/// Collaborator row producers (database cursors, file readers) implement this
/// to participate as pipeline heads; the blocking they do is their own
/// business, the engine never blocks.
pub trait Source {
    /// The item type pushed into the target.
    type Item: 'static;

    /// Pushes the whole sequence into `target`, then closes it.
    fn drive(self, target: StageHandle<Self::Item>) -> PipeResult;

    /// Resolves `node` with no external target and drives it.
    fn connect<O: 'static>(self, mut node: Node<Self::Item, O>) -> PipeResult
    where
        Self: Sized,
    {
        let target = node.resolve(None)?;
        self.drive(target)
    }
}

/// Source pushing items from any iterator.
pub struct IterSource<I> {
    items: I,
}

/// Source over an iterable: every item is pushed in order, then the pipeline
/// is closed.
#[must_use]
pub fn iter_source<I>(items: I) -> IterSource<I::IntoIter>
where
    I: IntoIterator,
{
    IterSource {
        items: items.into_iter(),
    }
}

impl<I> Source for IterSource<I>
where
    I: Iterator,
    I::Item: 'static,
{
    type Item = I::Item;

    fn drive(self, target: StageHandle<I::Item>) -> PipeResult {
        for item in self.items {
            if let Err(err) = target.accept(item) {
                return Err(teardown(&target, err));
            }
        }
        tracing::debug!("source completed; closing pipeline");
        target.close()
    }
}

/// Source over a fallible iterator, for inputs that can themselves error
/// mid-sequence. An input error is delivered to the pipeline as a failure
/// before the driving call returns it.
pub struct TryIterSource<I> {
    items: I,
}

/// Fallible-source counterpart of [`iter_source`].
#[must_use]
pub fn try_iter_source<I, T, E>(items: I) -> TryIterSource<I::IntoIter>
where
    I: IntoIterator<Item = Result<T, E>>,
    T: 'static,
    E: Into<anyhow::Error>,
{
    TryIterSource {
        items: items.into_iter(),
    }
}

impl<I, T, E> Source for TryIterSource<I>
where
    I: Iterator<Item = Result<T, E>>,
    T: 'static,
    E: Into<anyhow::Error>,
{
    type Item = T;

    fn drive(self, target: StageHandle<T>) -> PipeResult {
        for item in self.items {
            match item {
                Ok(item) => {
                    if let Err(err) = target.accept(item) {
                        return Err(teardown(&target, err));
                    }
                }
                Err(err) => {
                    let failure = Failure::new(err.into());
                    notify_failure(Some(&target), &failure);
                    return Err(teardown(&target, PipeError::Failure(failure)));
                }
            }
        }
        target.close()
    }
}

/// Tears the pipeline down after a failure: close is still attempted so any
/// stage that absorbed the failure is not left running, but its outcome never
/// masks the failure being returned.
fn teardown<T: 'static>(target: &StageHandle<T>, err: PipeError) -> PipeError {
    if let Err(close_err) = target.close() {
        tracing::debug!(error = %close_err, "teardown close after failure suppressed");
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{map, try_map};
    use crate::sinks::appender;
    use crate::stage::StageStatus;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, thiserror::Error)]
    #[error("input went bad")]
    struct InputError;

    #[test]
    fn test_drive_pushes_all_items_then_closes() {
        let buffer: Rc<RefCell<Vec<i64>>> = Rc::new(RefCell::new(Vec::new()));
        iter_source(0..5)
            .connect(map(|x: i64| x + 1).pipe(appender(Rc::clone(&buffer))))
            .unwrap();
        assert_eq!(*buffer.borrow(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_pipeline_failure_reaches_caller_after_teardown() {
        let buffer: Rc<RefCell<Vec<i64>>> = Rc::new(RefCell::new(Vec::new()));
        let pipeline = try_map(|x: i64| {
            if x == 3 {
                Err(anyhow::anyhow!("stage broke"))
            } else {
                Ok(x)
            }
        })
        .pipe(appender(Rc::clone(&buffer)));
        let err = iter_source(0..10).connect(pipeline).unwrap_err();
        assert_eq!(err.to_string(), "stage broke");
        assert_eq!(*buffer.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_input_error_notifies_pipeline_and_closes() {
        let buffer: Rc<RefCell<Vec<i64>>> = Rc::new(RefCell::new(Vec::new()));
        let mut sink = appender(Rc::clone(&buffer));
        let tail = sink.resolve(None).unwrap();
        let items: Vec<Result<i64, InputError>> = vec![Ok(1), Ok(2), Err(InputError)];
        let err = try_iter_source(items).drive(tail.clone()).unwrap_err();
        assert!(err
            .as_failure()
            .and_then(|f| f.downcast_ref::<InputError>())
            .is_some());
        assert_eq!(*buffer.borrow(), vec![1, 2]);
        // The appender re-raised the failure, so it is finished, not closed.
        assert_eq!(tail.status(), StageStatus::Finished);
    }
}
