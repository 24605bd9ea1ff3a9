//! # Pushpipe
//!
//! Push-based data-flow pipelines: independent stages wired into directed
//! graphs, each stage receiving items one at a time and pushing results to
//! its downstream stages.
//!
//! The capability ordinary iterator chains lack is broadcast fan-out
//! ("tee"): one upstream item delivered to several independent sub-pipelines,
//! each processed to completion, before the upstream produces its next item.
//! Every stage is therefore a resumable unit reachable only through
//! accept/fail/close, and a pipeline is described lazily as a [`graph::Node`]
//! tree that resolves into a live chain on first use.
//!
//! ## Quick start
//!
//! ```
//! use pushpipe::prelude::*;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let results: Rc<RefCell<Vec<i64>>> = Rc::new(RefCell::new(Vec::new()));
//! let pipeline = map(|x: i64| x * 2).pipe(appender(Rc::clone(&results)));
//! iter_source([1i64, 2, 3]).connect(pipeline)?;
//! assert_eq!(*results.borrow(), vec![2, 4, 6]);
//! # Ok::<(), pushpipe::PipeError>(())
//! ```
//!
//! ## Broadcast
//!
//! The source data is fed to two downstream pipelines, one item at a time:
//!
//! ```
//! use pushpipe::prelude::*;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let doubled: Rc<RefCell<Vec<i64>>> = Rc::new(RefCell::new(Vec::new()));
//! let shifted: Rc<RefCell<Vec<i64>>> = Rc::new(RefCell::new(Vec::new()));
//! iter_source([20i64, 40]).connect(broadcast(vec![
//!     map(|x: i64| x * 2).pipe(appender(Rc::clone(&doubled))),
//!     map(|x: i64| x + 10).pipe(appender(Rc::clone(&shifted))),
//! ]))?;
//! assert_eq!(*doubled.borrow(), vec![40, 80]);
//! assert_eq!(*shifted.borrow(), vec![30, 50]);
//! # Ok::<(), pushpipe::PipeError>(())
//! ```
//!
//! ## Bridging pull-style code
//!
//! A consumer written against a pull interface runs inside the push graph on
//! an auxiliary cooperative context:
//!
//! ```
//! use pushpipe::prelude::*;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let pairs: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
//! let joiner = bridge_filter(|mut input: PullStream<String>, mut out: Emitter<String>| async move {
//!     while let Some(a) = input.next().await? {
//!         match input.next().await? {
//!             Some(b) => out.send(format!("{a} {b}")).await,
//!             None => break,
//!         }
//!     }
//!     anyhow::Ok(())
//! });
//! let words = ["this", "is", "a", "test"].map(String::from);
//! iter_source(words).connect(joiner.pipe(appender(Rc::clone(&pairs))))?;
//! assert_eq!(*pairs.borrow(), vec!["this is", "a test"]);
//! # Ok::<(), pushpipe::PipeError>(())
//! ```
//!
//! ## Failure propagation
//!
//! A stage failure is delivered to every reachable downstream stage before it
//! unwinds back to the driving call, so the pipeline always gets the chance
//! to react before the caller sees the error.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc
)]

pub mod bridge;
pub mod broadcast;
pub mod errors;
pub mod filter;
pub mod graph;
pub mod observability;
pub mod records;
pub mod sinks;
pub mod source;
pub mod stage;


pub use errors::{Failure, PipeError, PipeResult};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bridge::{bridge_filter, bridge_sink, Emitter, PullStream};
    pub use crate::broadcast::broadcast;
    pub use crate::errors::{Failure, PipeError, PipeResult};
    pub use crate::filter::{
        emit_on_close, filter_fn, flat_map, map, try_map, Emit, FilterBody, FilterStage,
    };
    pub use crate::graph::{connect, Node};
    pub use crate::records::{rename_keys, to_records, Record};
    pub use crate::sinks::{appender, null, printer};
    pub use crate::source::{iter_source, try_iter_source, Source};
    pub use crate::stage::{Stage, StageHandle, StageStatus};
}
