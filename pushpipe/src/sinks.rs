//! Reference terminal stages.

use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;

use crate::errors::PipeResult;
use crate::filter::{Emit, FilterBody, FilterStage};
use crate::graph::Node;

struct PrinterBody {
    prefix: String,
}

impl<T: Display + 'static> FilterBody<T, T> for PrinterBody {
    fn feed(&mut self, item: T, out: &mut Emit<'_, T>) -> PipeResult {
        println!("{}{item}", self.prefix);
        out.send(item)
    }
}

struct AppenderBody<T> {
    buffer: Rc<RefCell<Vec<T>>>,
}

impl<T: Clone + 'static> FilterBody<T, T> for AppenderBody<T> {
    fn feed(&mut self, item: T, out: &mut Emit<'_, T>) -> PipeResult {
        self.buffer.borrow_mut().push(item.clone());
        out.send(item)
    }
}

struct NullBody;

impl<T> FilterBody<T, ()> for NullBody {
    fn feed(&mut self, _item: T, _out: &mut Emit<'_, ()>) -> PipeResult {
        Ok(())
    }
}

/// Prints each item to standard output with a prefix, forwarding it unchanged
/// when a downstream target is bound.
#[must_use]
pub fn printer<T>(prefix: impl Into<String>) -> Node<T, T>
where
    T: Display + 'static,
{
    let prefix = prefix.into();
    Node::from_stage(move |target| FilterStage::new(PrinterBody { prefix }, target))
}

/// Appends each item to an externally owned buffer, forwarding it unchanged
/// when a downstream target is bound.
#[must_use]
pub fn appender<T>(buffer: Rc<RefCell<Vec<T>>>) -> Node<T, T>
where
    T: Clone + 'static,
{
    Node::from_stage(move |target| FilterStage::new(AppenderBody { buffer }, target))
}

/// Accepts and discards every item.
#[must_use]
pub fn null<T: 'static>() -> Node<T> {
    Node::from_stage(|target| FilterStage::new(NullBody, target))
}
