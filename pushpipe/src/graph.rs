//! Lazy graph nodes and the connect combinator.
//!
//! A [`Node`] describes a stage or sub-graph without materializing anything;
//! [`connect`] composes two descriptions into a bigger one. Resolution walks a
//! composition downstream-first, constructs each stage bound to its
//! already-materialized target, and caches the resulting head on the node so a
//! description doubles as a stage once it has been used.

use crate::errors::{Failure, PipeError, PipeResult};
use crate::stage::{Stage, StageHandle};

type StageCtor<I, O> =
    Box<dyn FnOnce(Option<StageHandle<O>>) -> Result<StageHandle<I>, PipeError>>;

enum NodeState<I, O> {
    Lazy(StageCtor<I, O>),
    Resolved(StageHandle<I>),
    Failed(PipeError),
}

/// An unresolved, composable description of a stage or sub-graph.
///
/// `I` is the type of items the resolved head accepts; `O` is the type the
/// right-most stage would feed to an external target, if one is bound at
/// resolution time. Terminal descriptions leave `O` at its `()` default.
///
/// A node is immutable once built in the sense that composition never mutates
/// an existing description: [`connect`] consumes its operands and produces a
/// new node. Resolution is idempotent per node: the first use constructs the
/// live chain, later uses reuse it.
pub struct Node<I, O = ()> {
    state: NodeState<I, O>,
}

impl<I: 'static, O: 'static> Node<I, O> {
    /// Builds a node from a fallible stage constructor.
    ///
    /// The constructor receives the resolved downstream target (if the node is
    /// composed to the left of anything) and must return the stage advanced to
    /// its first point of readiness.
    #[must_use]
    pub fn from_ctor(
        ctor: impl FnOnce(Option<StageHandle<O>>) -> Result<StageHandle<I>, PipeError> + 'static,
    ) -> Self {
        Self {
            state: NodeState::Lazy(Box::new(ctor)),
        }
    }

    /// Builds a node from an infallible stage constructor.
    #[must_use]
    pub fn from_stage<S, F>(ctor: F) -> Self
    where
        S: Stage<I> + 'static,
        F: FnOnce(Option<StageHandle<O>>) -> S + 'static,
    {
        Self::from_ctor(move |target| Ok(StageHandle::new(ctor(target))))
    }

    /// Materializes the description into a live chain, binding `target` as the
    /// external downstream of the right-most stage.
    ///
    /// The first call invokes the constructors, downstream-first; the result
    /// is cached on the node. A later call with no external target returns the
    /// cached head; a later call with an external target is structural misuse
    /// and reports [`PipeError::AlreadyResolved`]. A failed construction
    /// leaves the node spent, re-reporting the original error.
    pub fn resolve(
        &mut self,
        target: Option<StageHandle<O>>,
    ) -> Result<StageHandle<I>, PipeError> {
        match &self.state {
            NodeState::Resolved(handle) => {
                if target.is_some() {
                    return Err(PipeError::AlreadyResolved);
                }
                return Ok(handle.clone());
            }
            NodeState::Failed(err) => return Err(err.clone()),
            NodeState::Lazy(_) => {}
        }
        let state = std::mem::replace(
            &mut self.state,
            NodeState::Failed(PipeError::AlreadyResolved),
        );
        let NodeState::Lazy(ctor) = state else {
            return Err(PipeError::AlreadyResolved);
        };
        match ctor(target) {
            Ok(handle) => {
                self.state = NodeState::Resolved(handle.clone());
                Ok(handle)
            }
            Err(err) => {
                tracing::debug!(error = %err, "stage construction failed during resolution");
                self.state = NodeState::Failed(err.clone());
                Err(err)
            }
        }
    }

    /// Composes this node in front of `rhs`; sugar for [`connect`].
    #[must_use]
    pub fn pipe<O2: 'static>(self, rhs: Node<O, O2>) -> Node<I, O2> {
        connect(self, rhs)
    }

    /// Discards the external-target slot, turning the node into a terminal
    /// description. Useful for mixing differently typed branches in one
    /// broadcast group.
    #[must_use]
    pub fn seal(mut self) -> Node<I> {
        Node::from_ctor(move |_target| self.resolve(None))
    }

    /// Delivers a value, resolving the node on first use with no external
    /// target.
    pub fn accept(&mut self, item: I) -> PipeResult {
        self.resolve(None)?.accept(item)
    }

    /// Delivers a failure, resolving the node on first use.
    pub fn fail(&mut self, failure: Failure) -> PipeResult {
        self.resolve(None)?.fail(failure)
    }

    /// Delivers the teardown signal, resolving the node on first use.
    pub fn close(&mut self) -> PipeResult {
        self.resolve(None)?.close()
    }
}

/// Composes two descriptions: items accepted by the result flow through `lhs`
/// into `rhs`.
///
/// No stage is materialized; resolution later walks the composition
/// downstream-first, so `rhs` is constructed before `lhs` is bound to it.
#[must_use]
pub fn connect<I, M, O>(mut lhs: Node<I, M>, mut rhs: Node<M, O>) -> Node<I, O>
where
    I: 'static,
    M: 'static,
    O: 'static,
{
    Node::from_ctor(move |target| {
        let tail = rhs.resolve(target)?;
        lhs.resolve(Some(tail))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::map;
    use crate::sinks::appender;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_connect_resolves_downstream_first() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let make = |name: &'static str, order: &Rc<RefCell<Vec<&'static str>>>| {
            let order = Rc::clone(order);
            Node::<i64, i64>::from_ctor(move |target| {
                order.borrow_mut().push(name);
                let mut inner = map(|x: i64| x);
                inner.resolve(target)
            })
        };
        let a = make("a", &order);
        let b = make("b", &order);
        let c = make("c", &order);
        let mut composed = connect(a, connect(b, c));
        composed.resolve(None).unwrap();
        assert_eq!(*order.borrow(), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_resolution_is_cached() {
        let count = Rc::new(RefCell::new(0));
        let counted = {
            let count = Rc::clone(&count);
            Node::<i64, i64>::from_ctor(move |target| {
                *count.borrow_mut() += 1;
                let mut inner = map(|x: i64| x);
                inner.resolve(target)
            })
        };
        let mut node = counted;
        let first = node.resolve(None).unwrap();
        let second = node.resolve(None).unwrap();
        assert_eq!(*count.borrow(), 1);
        first.accept(1).unwrap();
        second.accept(2).unwrap();
    }

    #[test]
    fn test_second_external_target_is_misuse() {
        let buffer: Rc<RefCell<Vec<i64>>> = Rc::new(RefCell::new(Vec::new()));
        let mut node = map(|x: i64| x + 1);
        node.resolve(None).unwrap();
        let mut sink = appender(Rc::clone(&buffer));
        let target = sink.resolve(None).unwrap();
        assert!(matches!(
            node.resolve(Some(target)),
            Err(PipeError::AlreadyResolved)
        ));
    }

    #[test]
    fn test_failed_construction_reports_original_error() {
        let mut node = Node::<i64, i64>::from_ctor(|_| Err(PipeError::Stalled));
        assert!(matches!(node.resolve(None), Err(PipeError::Stalled)));
        assert!(matches!(node.resolve(None), Err(PipeError::Stalled)));
    }

    #[test]
    fn test_node_used_directly_as_stage() {
        let buffer: Rc<RefCell<Vec<i64>>> = Rc::new(RefCell::new(Vec::new()));
        let mut pipeline = map(|x: i64| x * 10).pipe(appender(Rc::clone(&buffer)));
        pipeline.accept(1).unwrap();
        pipeline.accept(2).unwrap();
        pipeline.close().unwrap();
        assert_eq!(*buffer.borrow(), vec![10, 20]);
    }
}
