//! Core node trait and execution context.
//!
//! This module defines the [`Node`] trait, which is the fundamental
//! abstraction for every leaf and combinator in a task tree, together with
//! the reference-counted handles the executor tracks and the [`NodeCx`]
//! context handed to node code while it runs.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::Status;
use crate::executor::Executor;
use crate::worker::CompletionTicket;

/// Shared handle to a node.
///
/// A node is kept alive only by the executor's outstanding execution records
/// and by the child lists of the composites that own it; topology itself
/// lives entirely outside the node.
pub type NodeRef = Rc<RefCell<dyn Node>>;

/// Non-owning handle to a node, used for parent back-references.
pub type WeakNodeRef = Weak<RefCell<dyn Node>>;

/// A unit of suspendable work driven by the executor.
///
/// Lifecycle: `start`, then zero or more `update` calls while the node stays
/// [`Status::Running`], then exactly one `end` per activation with the final
/// status (which may be [`Status::Aborted`] for executor-driven
/// cancellation). Parents additionally receive `on_child_stopped` whenever a
/// child they enqueued reaches a terminal status.
///
/// All four operations are invoked only by the executor, on the single
/// scheduling thread.
pub trait Node {
    /// Initialize node-local state.
    ///
    /// May return any status: terminal for instant completion,
    /// [`Status::Suspended`] to park immediately, or [`Status::Running`] to
    /// receive an `update` in the same step.
    fn start(&mut self, cx: &mut NodeCx<'_>) -> Status {
        let _ = cx;
        Status::Running
    }

    /// Advance the node by one step while it is active.
    fn update(&mut self, cx: &mut NodeCx<'_>, dt: f32) -> Status {
        let _ = (cx, dt);
        Status::Running
    }

    /// Release resources; called exactly once per activation.
    fn end(&mut self, cx: &mut NodeCx<'_>, status: Status) {
        let _ = (cx, status);
    }

    /// React to a child reaching a terminal status.
    ///
    /// The returned status decides the parent's fate: terminal statuses end
    /// the parent too, [`Status::Suspended`] keeps it waiting for more
    /// children, and [`Status::Running`] reactivates a suspended parent onto
    /// the active queue.
    fn on_child_stopped(&mut self, cx: &mut NodeCx<'_>, status: Status, child: &NodeRef) -> Status {
        let _ = (cx, child);
        status
    }
}

/// Execution context passed to a node while one of its operations runs.
///
/// Bundles the executor with the executing node's own handle, so node code
/// can enqueue children under itself, detach independent trees, or abort
/// subtrees it owns without holding any long-lived pointer to either.
pub struct NodeCx<'a> {
    exec: &'a mut Executor,
    node: &'a NodeRef,
}

impl<'a> NodeCx<'a> {
    pub(crate) fn new(exec: &'a mut Executor, node: &'a NodeRef) -> Self {
        Self { exec, node }
    }

    /// Handle of the node currently executing.
    pub fn handle(&self) -> NodeRef {
        self.node.clone()
    }

    /// Direct access to the executor.
    ///
    /// Needed by code that drives the auxiliary primitives from inside a
    /// tree (event broadcasts, semaphore capacity changes). Do not call
    /// [`Executor::step`] from here; stepping is not reentrant.
    pub fn executor(&mut self) -> &mut Executor {
        self.exec
    }

    /// Enqueue `child` with the executing node as its parent.
    ///
    /// The child is evaluated before this step's frame marker, i.e. still
    /// within the current step.
    pub fn enqueue_child(&mut self, child: &NodeRef) {
        let parent = Rc::downgrade(self.node);
        self.exec.enqueue_with_parent(child, Some(parent));
    }

    /// Enqueue `child` with no parent, as an independent tree.
    pub fn spawn_detached(&mut self, child: &NodeRef) {
        self.exec.enqueue_with_parent(child, None);
    }

    /// Silently cancel `child` and the subtree hanging off it.
    pub fn abort(&mut self, child: &NodeRef) {
        self.exec.abort_node(child);
    }

    /// Number of completed scheduler steps.
    pub fn step_count(&self) -> u64 {
        self.exec.step_count()
    }

    /// Register the executing node for an out-of-step completion.
    ///
    /// The returned ticket may be moved to another thread; completing it
    /// (or dropping it) wakes this node during a later [`Executor::step`].
    pub fn completion_ticket(&mut self) -> CompletionTicket {
        self.exec.register_completion(self.node)
    }

    /// Discard a previously registered completion ticket.
    pub fn cancel_ticket(&mut self, ticket_id: u64) {
        self.exec.cancel_ticket(ticket_id);
    }
}

/// Shared cell for cross-branch data.
///
/// Sibling branches of a tree must not share state through raw pointers;
/// `Var` is the reference-counted cell the combinators (and tree authors)
/// use instead. Cloning a `Var` clones the handle, not the value.
pub struct Var<T>(Rc<RefCell<T>>);

/// Creates a new shared variable.
pub fn var<T>(value: T) -> Var<T> {
    Var(Rc::new(RefCell::new(value)))
}

impl<T> Var<T> {
    /// Replaces the stored value.
    pub fn set(&self, value: T) {
        *self.0.borrow_mut() = value;
    }

    /// Runs `f` with mutable access to the stored value.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.0.borrow_mut())
    }
}

impl<T: Clone> Var<T> {
    /// Returns a clone of the stored value.
    pub fn get(&self) -> T {
        self.0.borrow().clone()
    }
}

impl<T> Clone for Var<T> {
    fn clone(&self) -> Self {
        Var(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_is_shared_between_clones() {
        let a = var(1);
        let b = a.clone();
        b.set(5);
        assert_eq!(a.get(), 5);
        a.with(|v| *v += 1);
        assert_eq!(b.get(), 6);
    }
}
