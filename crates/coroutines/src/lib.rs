//! Cooperative tree-structured task scheduler for frame-stepped logic.
//!
//! Sequences of game/application logic are expressed as trees of small
//! suspendable state machines ("nodes") instead of stackful coroutines or
//! callback chains. Combinators compose ordering, concurrency, retries and
//! cancellation declaratively, and a single-threaded [`Executor`] drives the
//! whole forest one step per external tick.
//!
//! - **No blocking**: a node either finishes, asks to run again next step,
//!   or parks itself until something wakes it
//! - **Cancellation-safe**: whole subtrees unwind through an idempotent
//!   abort cascade without corrupting the scheduler's bookkeeping
//! - **Single-threaded**: all structural mutation happens on the stepping
//!   thread; one narrow escape hatch marshals background work back in
//!
//! # Architecture
//!
//! - [`Node`] / [`Status`]: the execution contract every leaf and combinator
//!   implements
//! - [`Executor`]: active queue + suspended set, termination routing, abort
//! - Composite nodes: [`sequence`], [`optional_sequence`], [`select`],
//!   [`race`], [`sync`]
//! - Decorator nodes: [`repeat`], [`fork`], [`scope`], [`invert`],
//!   [`always_succeed`], [`capture_result`], [`deferred`]
//! - Auxiliary primitives: [`Event`] broadcast/listeners, [`Semaphore`]
//!   admission gates, [`async_task`] background work
//!
//! # Example
//!
//! ```rust
//! use coroutines::{Executor, nodes, sequence, wait};
//!
//! let mut exec = Executor::new();
//! let tree = sequence(nodes![
//!     wait(1.0),
//!     || println!("one second later"),
//! ]);
//! exec.enqueue(&tree);
//! while exec.has_remaining_work() {
//!     exec.step(0.25); // one call per external tick
//! }
//! ```

pub mod builder;
pub mod composite;
pub mod decorator;
pub mod event;
pub mod executor;
pub mod leaf;
pub mod node;
pub mod semaphore;
pub mod status;
pub mod worker;

// Re-export the construction and driving surface for ergonomic use.
pub use builder::{
    IntoNode, action, action_cx, always_succeed, capture_result, condition, condition_cx,
    deferred, fail, fork, guarded_action, guarded_condition, invert, named_scope, nop,
    optional_sequence, race, repeat, scope, select, sequence, sync, wait, wait_forever,
    wait_frames,
};
pub use event::{Event, make_event, wait_for, wait_for_check, wait_for_spawn, wait_for_with};
pub use executor::Executor;
pub use leaf::Liveness;
pub use node::{Node, NodeCx, NodeRef, Var, WeakNodeRef, var};
pub use semaphore::{Semaphore, make_semaphore, semaphore_scope};
pub use status::Status;
pub use worker::{CompletionTicket, async_check, async_task};
