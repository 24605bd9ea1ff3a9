//! Bridge letting pull-style consumer code run inside a push pipeline.
//!
//! A bridged consumer is written against [`PullStream`], a pull interface
//! that suspends until the pipeline pushes the next item. The consumer runs
//! on an auxiliary execution context — a manually polled future — and the
//! pipeline-facing [`BridgeStage`] transfers exactly one value (or one
//! failure, or the end-of-input signal) between the two contexts at a time.
//! At any instant only one of the pair is runnable: this is cooperative
//! suspension, not parallelism, and no runtime or thread is involved.
//!
//! Two variants exist: a sink consumer drains the stream and returns nothing,
//! while a filter consumer also produces outputs through an [`Emitter`], each
//! forwarded downstream the moment it is produced, interleaved with further
//! pulls.
//!
//! Known limitation, kept deliberately: a failure arriving after the consumer
//! has finished its pull loop is dropped, not propagated.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use crate::errors::{Failure, PipeError, PipeResult};
use crate::graph::Node;
use crate::stage::{notify_failure, Stage, StageHandle};

enum Inbound<T> {
    Idle,
    Item(T),
    Failure(Failure),
    Closed,
}

struct Inbox<T> {
    slot: Inbound<T>,
    awaiting: bool,
}

struct Outbox<U> {
    slot: Option<U>,
}

/// Pull interface handed to a bridged consumer.
///
/// Each `next` suspends the consumer and returns control to the pipeline; the
/// consumer resumes when the next value arrives. A failure pushed from
/// upstream surfaces as the `Err` case at the exact suspension point, so the
/// consumer's own error handling runs normally; `Ok(None)` signals that the
/// pipeline has closed and no further items will arrive.
pub struct PullStream<T> {
    inbox: Rc<RefCell<Inbox<T>>>,
}

impl<T> PullStream<T> {
    /// Waits for the next pushed item.
    pub async fn next(&mut self) -> Result<Option<T>, Failure> {
        std::future::poll_fn(|_cx| {
            let mut inbox = self.inbox.borrow_mut();
            match std::mem::replace(&mut inbox.slot, Inbound::Idle) {
                Inbound::Item(item) => {
                    inbox.awaiting = false;
                    Poll::Ready(Ok(Some(item)))
                }
                Inbound::Failure(failure) => {
                    inbox.awaiting = false;
                    Poll::Ready(Err(failure))
                }
                Inbound::Closed => {
                    // End-of-input is sticky: every later pull sees it too.
                    inbox.slot = Inbound::Closed;
                    inbox.awaiting = false;
                    Poll::Ready(Ok(None))
                }
                Inbound::Idle => {
                    inbox.awaiting = true;
                    Poll::Pending
                }
            }
        })
        .await
    }
}

/// Output side handed to a filter-variant consumer.
///
/// `send` places one produced item in the handoff slot and suspends the
/// consumer until the pipeline has forwarded it downstream.
pub struct Emitter<U> {
    outbox: Rc<RefCell<Outbox<U>>>,
}

impl<U> Emitter<U> {
    /// Hands one produced item to the pipeline and waits for it to be
    /// forwarded.
    pub async fn send(&mut self, item: U) {
        let outbox = &self.outbox;
        let mut pending = Some(item);
        std::future::poll_fn(|_cx| {
            let mut outbox = outbox.borrow_mut();
            if let Some(item) = pending.take() {
                outbox.slot = Some(item);
                return Poll::Pending;
            }
            if outbox.slot.is_none() {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .await;
    }
}

type Consumer = Pin<Box<dyn Future<Output = anyhow::Result<()>>>>;

/// Pipeline-facing half of a bridged consumer.
///
/// Construction runs the consumer up to its first suspension point; a
/// consumer that fails before pulling anything surfaces that failure from
/// construction, after the downstream target has been notified.
pub struct BridgeStage<T, U> {
    inbox: Rc<RefCell<Inbox<T>>>,
    outbox: Rc<RefCell<Outbox<U>>>,
    consumer: Option<Consumer>,
    target: Option<StageHandle<U>>,
}

impl<T: 'static, U: 'static> BridgeStage<T, U> {
    /// Builds the sink variant: the consumer drains the stream and returns
    /// nothing.
    pub fn new_sink<F, Fut>(consumer: F, target: Option<StageHandle<U>>) -> Result<Self, PipeError>
    where
        F: FnOnce(PullStream<T>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        Self::build(target, |inbox, _outbox| Box::pin(consumer(PullStream { inbox })))
    }

    /// Builds the filter variant: the consumer produces outputs through an
    /// [`Emitter`] while draining the stream.
    pub fn new_filter<F, Fut>(
        consumer: F,
        target: Option<StageHandle<U>>,
    ) -> Result<Self, PipeError>
    where
        F: FnOnce(PullStream<T>, Emitter<U>) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        Self::build(target, |inbox, outbox| {
            Box::pin(consumer(PullStream { inbox }, Emitter { outbox }))
        })
    }

    fn build(
        target: Option<StageHandle<U>>,
        make: impl FnOnce(Rc<RefCell<Inbox<T>>>, Rc<RefCell<Outbox<U>>>) -> Consumer,
    ) -> Result<Self, PipeError> {
        let inbox = Rc::new(RefCell::new(Inbox {
            slot: Inbound::Idle,
            awaiting: false,
        }));
        let outbox = Rc::new(RefCell::new(Outbox { slot: None }));
        let consumer = make(Rc::clone(&inbox), Rc::clone(&outbox));
        let mut stage = Self {
            inbox,
            outbox,
            consumer: Some(consumer),
            target,
        };
        // Advance to the first suspension point; a consumer failing on entry
        // fails construction itself.
        stage.drive()?;
        Ok(stage)
    }

    /// Runs the consumer until it suspends awaiting input, forwarding every
    /// produced item downstream as it appears, or until it finishes.
    fn drive(&mut self) -> PipeResult {
        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        loop {
            let poll = match self.consumer.as_mut() {
                Some(consumer) => consumer.as_mut().poll(&mut cx),
                None => return Ok(()),
            };
            match poll {
                Poll::Ready(Ok(())) => {
                    tracing::debug!("bridged consumer finished");
                    self.consumer = None;
                    return Ok(());
                }
                Poll::Ready(Err(err)) => {
                    self.consumer = None;
                    let failure = Failure::from_consumer(err);
                    notify_failure(self.target.as_ref(), &failure);
                    return Err(PipeError::Failure(failure));
                }
                Poll::Pending => {
                    let produced = self.outbox.borrow_mut().slot.take();
                    if let Some(item) = produced {
                        if let Some(target) = &self.target {
                            if let Err(err) = target.accept(item) {
                                // The consumer is left suspended; the pair is
                                // torn down with the stage.
                                self.consumer = None;
                                return match err {
                                    PipeError::Failure(failure) => {
                                        notify_failure(self.target.as_ref(), &failure);
                                        Err(PipeError::Failure(failure))
                                    }
                                    other => Err(other),
                                };
                            }
                        }
                        continue;
                    }
                    if self.inbox.borrow().awaiting {
                        return Ok(());
                    }
                    self.consumer = None;
                    return Err(PipeError::Stalled);
                }
            }
        }
    }
}

impl<T: 'static, U: 'static> Stage<T> for BridgeStage<T, U> {
    fn accept(&mut self, item: T) -> PipeResult {
        if self.consumer.is_none() {
            tracing::debug!("item received after bridged consumer finished; discarded");
            return Ok(());
        }
        {
            let mut inbox = self.inbox.borrow_mut();
            inbox.slot = Inbound::Item(item);
        }
        self.drive()
    }

    fn fail(&mut self, failure: Failure) -> PipeResult {
        if self.consumer.is_none() {
            // Known limitation: post-completion failures are dropped.
            tracing::debug!(%failure, "failure received after bridged consumer finished; dropped");
            return Ok(());
        }
        {
            let mut inbox = self.inbox.borrow_mut();
            inbox.slot = Inbound::Failure(failure);
        }
        self.drive()
    }

    fn close(&mut self) -> PipeResult {
        if self.consumer.is_some() {
            {
                let mut inbox = self.inbox.borrow_mut();
                inbox.slot = Inbound::Closed;
            }
            self.drive()?;
        }
        match &self.target {
            Some(target) => target.close(),
            None => Ok(()),
        }
    }
}

/// Sink node running a pull-style consumer inside the push graph.
#[must_use]
pub fn bridge_sink<T, F, Fut>(consumer: F) -> Node<T>
where
    T: 'static,
    F: FnOnce(PullStream<T>) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<()>> + 'static,
{
    Node::from_ctor(move |target| Ok(StageHandle::new(BridgeStage::new_sink(consumer, target)?)))
}

/// Filter node running a pull-style producer/consumer inside the push graph;
/// every produced item is forwarded downstream as it is produced.
#[must_use]
pub fn bridge_filter<T, U, F, Fut>(consumer: F) -> Node<T, U>
where
    T: 'static,
    U: 'static,
    F: FnOnce(PullStream<T>, Emitter<U>) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<()>> + 'static,
{
    Node::from_ctor(move |target| Ok(StageHandle::new(BridgeStage::new_filter(consumer, target)?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::appender;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_sink_consumer_drains_pushed_items() {
        let seen: Rc<RefCell<Vec<i64>>> = Rc::new(RefCell::new(Vec::new()));
        let finished = Rc::new(RefCell::new(false));
        let mut node = bridge_sink({
            let seen = Rc::clone(&seen);
            let finished = Rc::clone(&finished);
            move |mut input: PullStream<i64>| async move {
                while let Some(item) = input.next().await? {
                    seen.borrow_mut().push(item);
                }
                *finished.borrow_mut() = true;
                anyhow::Ok(())
            }
        });
        let head = node.resolve(None).unwrap();
        head.accept(1).unwrap();
        head.accept(2).unwrap();
        assert!(!*finished.borrow());
        head.close().unwrap();
        assert!(*finished.borrow());
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_consumer_can_absorb_injected_failure() {
        let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let mut node = bridge_sink({
            let log = Rc::clone(&log);
            move |mut input: PullStream<i64>| async move {
                loop {
                    match input.next().await {
                        Ok(Some(item)) => log.borrow_mut().push(format!("item:{item}")),
                        Ok(None) => break,
                        Err(failure) => log.borrow_mut().push(format!("caught:{failure}")),
                    }
                }
                anyhow::Ok(())
            }
        });
        let head = node.resolve(None).unwrap();
        head.accept(1).unwrap();
        // Absorbed at the suspension point; the stage stays live.
        head.fail(Failure::msg("recoverable")).unwrap();
        head.accept(2).unwrap();
        head.close().unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["item:1", "caught:recoverable", "item:2"]
        );
    }

    #[test]
    fn test_post_completion_failure_is_dropped() {
        let mut node = bridge_sink(|mut input: PullStream<i64>| async move {
            // Stop after the first item, leaving upstream still pushing.
            let _ = input.next().await?;
            anyhow::Ok(())
        });
        let head = node.resolve(None).unwrap();
        head.accept(1).unwrap();
        head.accept(2).unwrap();
        head.fail(Failure::msg("late")).unwrap();
        head.close().unwrap();
    }

    #[test]
    fn test_filter_output_before_first_pull_is_forwarded() {
        let buffer: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let mut node = bridge_filter(|mut input: PullStream<String>, mut out: Emitter<String>| {
            async move {
                out.send("header".to_string()).await;
                while let Some(item) = input.next().await? {
                    out.send(item).await;
                }
                anyhow::Ok(())
            }
        })
        .pipe(appender(Rc::clone(&buffer)));
        let head = node.resolve(None).unwrap();
        assert_eq!(*buffer.borrow(), vec!["header"]);
        head.accept("body".to_string()).unwrap();
        head.close().unwrap();
        assert_eq!(*buffer.borrow(), vec!["header", "body"]);
    }

    #[test]
    fn test_foreign_suspension_is_reported() {
        let mut node = bridge_sink(|_input: PullStream<i64>| async move {
            std::future::pending::<()>().await;
            anyhow::Ok(())
        });
        assert!(matches!(node.resolve(None), Err(PipeError::Stalled)));
    }
}
