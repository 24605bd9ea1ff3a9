//! The exception-propagation adaptor for delegating stage bodies.
//!
//! Most stages are written as a body that consumes one input at a time and
//! emits any number of outputs. [`FilterStage`] wraps such a body and supplies
//! the propagation protocol around it: outputs are forwarded in order to the
//! declared downstream target, an inbound failure is injected at the body's
//! current suspension point, a failure the body cannot handle is delivered
//! downstream before it is re-raised to the caller, and close tears the body
//! down before the downstream target.

use std::marker::PhantomData;

use crate::errors::{Failure, PipeError, PipeResult};
use crate::graph::Node;
use crate::stage::{notify_failure, Stage, StageHandle};

/// Output side handed to a [`FilterBody`]: forwards emitted items to the
/// stage's downstream target, or discards them when no target is bound.
pub struct Emit<'a, U> {
    target: Option<&'a StageHandle<U>>,
}

impl<'a, U: 'static> Emit<'a, U> {
    pub(crate) fn new(target: Option<&'a StageHandle<U>>) -> Self {
        Self { target }
    }

    /// Sends one item downstream.
    pub fn send(&mut self, item: U) -> PipeResult {
        match self.target {
            Some(target) => target.accept(item),
            None => Ok(()),
        }
    }

    /// Whether a downstream target is bound.
    #[must_use]
    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }
}

/// The delegated-to sub-sequence inside a transform stage.
///
/// The adaptor advances the body one event at a time; the body emits through
/// `out` at its own pace, so one input may produce zero, one, or many outputs.
pub trait FilterBody<T, U> {
    /// Feeds one input item.
    fn feed(&mut self, item: T, out: &mut Emit<'_, U>) -> PipeResult;

    /// Injects a failure at the body's current suspension point.
    ///
    /// The default does not handle failures: the failure is re-raised and the
    /// adaptor delivers it downstream before returning it to the caller.
    fn throw(&mut self, failure: Failure, out: &mut Emit<'_, U>) -> PipeResult {
        let _ = out;
        Err(PipeError::Failure(failure))
    }

    /// Tears the body down; trailing items may still be emitted and reach the
    /// downstream target before its own close. Must be idempotent.
    fn finish(&mut self, out: &mut Emit<'_, U>) -> PipeResult {
        let _ = out;
        Ok(())
    }
}

/// Adaptor turning a [`FilterBody`] into a [`Stage`] with the propagation
/// protocol applied around every event.
pub struct FilterStage<B, T, U> {
    body: B,
    target: Option<StageHandle<U>>,
    _marker: PhantomData<fn(T) -> U>,
}

impl<B, T, U> FilterStage<B, T, U>
where
    B: FilterBody<T, U>,
    T: 'static,
    U: 'static,
{
    /// Wraps a body, binding the optional downstream target.
    #[must_use]
    pub fn new(body: B, target: Option<StageHandle<U>>) -> Self {
        Self {
            body,
            target,
            _marker: PhantomData,
        }
    }

    fn reraise(&self, failure: Failure) -> PipeError {
        notify_failure(self.target.as_ref(), &failure);
        PipeError::Failure(failure)
    }
}

impl<B, T, U> Stage<T> for FilterStage<B, T, U>
where
    B: FilterBody<T, U>,
    T: 'static,
    U: 'static,
{
    fn accept(&mut self, item: T) -> PipeResult {
        let mut out = Emit::new(self.target.as_ref());
        match self.body.feed(item, &mut out) {
            Err(PipeError::Failure(failure)) => Err(self.reraise(failure)),
            other => other,
        }
    }

    fn fail(&mut self, failure: Failure) -> PipeResult {
        let mut out = Emit::new(self.target.as_ref());
        match self.body.throw(failure, &mut out) {
            // The body handled the failure; the stage stays live.
            Ok(()) => Ok(()),
            Err(PipeError::Failure(failure)) => Err(self.reraise(failure)),
            Err(other) => Err(other),
        }
    }

    fn close(&mut self) -> PipeResult {
        let mut out = Emit::new(self.target.as_ref());
        match self.body.finish(&mut out) {
            Ok(()) => match &self.target {
                Some(target) => target.close(),
                None => Ok(()),
            },
            Err(PipeError::Failure(failure)) => Err(self.reraise(failure)),
            Err(other) => Err(other),
        }
    }
}

struct MapBody<F> {
    f: F,
}

impl<T, U: 'static, F> FilterBody<T, U> for MapBody<F>
where
    F: FnMut(T) -> U,
{
    fn feed(&mut self, item: T, out: &mut Emit<'_, U>) -> PipeResult {
        out.send((self.f)(item))
    }
}

struct TryMapBody<F> {
    f: F,
}

impl<T, U: 'static, F> FilterBody<T, U> for TryMapBody<F>
where
    F: FnMut(T) -> anyhow::Result<U>,
{
    fn feed(&mut self, item: T, out: &mut Emit<'_, U>) -> PipeResult {
        match (self.f)(item) {
            Ok(value) => out.send(value),
            Err(err) => Err(PipeError::Failure(Failure::new(err))),
        }
    }
}

struct FilterFnBody<F> {
    pred: F,
}

impl<T: 'static, F> FilterBody<T, T> for FilterFnBody<F>
where
    F: FnMut(&T) -> bool,
{
    fn feed(&mut self, item: T, out: &mut Emit<'_, T>) -> PipeResult {
        if (self.pred)(&item) {
            out.send(item)
        } else {
            Ok(())
        }
    }
}

struct FlatMapBody<F> {
    f: F,
}

impl<T, U: 'static, I, F> FilterBody<T, U> for FlatMapBody<F>
where
    F: FnMut(T) -> I,
    I: IntoIterator<Item = U>,
{
    fn feed(&mut self, item: T, out: &mut Emit<'_, U>) -> PipeResult {
        for value in (self.f)(item) {
            out.send(value)?;
        }
        Ok(())
    }
}

struct EmitOnCloseBody<T> {
    trailing: Option<T>,
}

impl<T: 'static> FilterBody<T, T> for EmitOnCloseBody<T> {
    fn feed(&mut self, item: T, out: &mut Emit<'_, T>) -> PipeResult {
        out.send(item)
    }

    fn finish(&mut self, out: &mut Emit<'_, T>) -> PipeResult {
        match self.trailing.take() {
            Some(item) => out.send(item),
            None => Ok(()),
        }
    }
}

/// Transform stage applying a function to every item.
#[must_use]
pub fn map<T, U, F>(f: F) -> Node<T, U>
where
    T: 'static,
    U: 'static,
    F: FnMut(T) -> U + 'static,
{
    Node::from_stage(move |target| FilterStage::new(MapBody { f }, target))
}

/// Transform stage applying a fallible function; an `Err` becomes a pipeline
/// failure propagated downstream-first.
#[must_use]
pub fn try_map<T, U, F>(f: F) -> Node<T, U>
where
    T: 'static,
    U: 'static,
    F: FnMut(T) -> anyhow::Result<U> + 'static,
{
    Node::from_stage(move |target| FilterStage::new(TryMapBody { f }, target))
}

/// Stage forwarding only the items matching a predicate.
#[must_use]
pub fn filter_fn<T, F>(pred: F) -> Node<T, T>
where
    T: 'static,
    F: FnMut(&T) -> bool + 'static,
{
    Node::from_stage(move |target| FilterStage::new(FilterFnBody { pred }, target))
}

/// Stage expanding each item into a sequence of outputs, forwarded in order.
#[must_use]
pub fn flat_map<T, U, I, F>(f: F) -> Node<T, U>
where
    T: 'static,
    U: 'static,
    I: IntoIterator<Item = U> + 'static,
    F: FnMut(T) -> I + 'static,
{
    Node::from_stage(move |target| FilterStage::new(FlatMapBody { f }, target))
}

/// Pass-through stage that emits one trailing item when the pipeline closes,
/// before its downstream target is torn down.
#[must_use]
pub fn emit_on_close<T>(trailing: T) -> Node<T, T>
where
    T: 'static,
{
    Node::from_stage(move |target| {
        FilterStage::new(
            EmitOnCloseBody {
                trailing: Some(trailing),
            },
            target,
        )
    })
}
