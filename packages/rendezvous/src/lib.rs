#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Named events and request/response promises for single-threaded cooperative runtimes.
//!
//! This crate provides two primitives that let independent components of a program talk to
//! each other on one thread without holding direct references to each other:
//!
//! * [`Event`] is a multi-listener broadcast. Listeners [connect][Event::connect] to it and
//!   receive a clone of the payload every time it is [fired][Event::fire].
//! * [`Query`] is a single-responder request/response rendezvous. A responder settles each
//!   request through a [`Deferred`] and the requester observes the outcome through the paired
//!   [`Promise`].
//!
//! A [`Registry`] hands out events and queries by name, creating them on first use, so that
//! components only need to agree on a name.
//!
//! # Quick start
//!
//! ```rust
//! use rendezvous::{QueryError, Registry};
//! # use tokio::task::LocalSet;
//!
//! # let runtime = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
//! # LocalSet::new().block_on(&runtime, async {
//! let registry = Registry::new();
//!
//! let joined = registry.get_event::<String>("PlayerJoined").unwrap();
//! joined.connect(|name| println!("{name} joined"));
//!
//! let sum = registry.get_query::<(i64, i64), i64, QueryError>("Sum").unwrap();
//! sum.on_request(|deferred, (a, b)| deferred.resolve(a + b));
//!
//! joined.fire("ferris".to_string());
//!
//! let promise = sum.request((1, 2)).await;
//! promise
//!     .and_then(|total| println!("sum is {total}"))
//!     .finally(|| println!("request finished"));
//!
//! assert_eq!(promise.wait().await, Ok(3));
//! # });
//! ```
//!
//! # Scheduling
//!
//! Everything runs on the current thread inside a [`tokio::task::LocalSet`] and the types are
//! neither `Send` nor `Sync`. Firing an event, settling a promise and sending a request never
//! run user code inline: listeners, promise callbacks and responders each run as their own
//! local task, so the caller continues before any of them has necessarily finished.
//!
//! Event listeners run on the workers of a [`DispatchPool`], which parks finished workers and
//! reuses them for later firings instead of spawning a task per invocation.
//!
//! # Panics
//!
//! A panic in an event listener or a promise callback is logged and does not prevent other
//! listeners or callbacks from running. A panic in a query responder rejects that request with
//! [`QueryError::ResponderPanicked`].

mod connection;
mod deferred;
mod disconnected;
mod dispatch_pool;
mod event;
mod listener_list;
mod outcome;
mod promise;
mod query;
mod query_error;
mod registry;
mod registry_error;
mod runtime;

pub use connection::*;
pub use deferred::*;
pub use disconnected::*;
pub use dispatch_pool::*;
pub use event::*;
pub use outcome::*;
pub use promise::*;
pub use query::*;
pub use query_error::*;
pub use registry::*;
pub use registry_error::*;
