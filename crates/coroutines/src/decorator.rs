//! Single-child combinators.
//!
//! Decorators wrap exactly one child and reshape its lifecycle or its
//! result: repeating it, detaching it, tagging its exit, or rewriting its
//! terminal status. The shared bookkeeping is deliberately flat: two small
//! helpers instead of a base-class chain.

use tracing::debug;

use crate::node::{Node, NodeCx, NodeRef, Var};
use crate::status::Status;

/// Enqueues the decorator's child and parks the decorator until the child
/// stops.
pub(crate) fn start_child(cx: &mut NodeCx<'_>, child: &NodeRef) -> Status {
    cx.enqueue_child(child);
    Status::Suspended
}

/// Cascades an abort to the child; no-op for any other exit.
pub(crate) fn abort_child(cx: &mut NodeCx<'_>, status: Status, child: &NodeRef) {
    if status == Status::Aborted {
        cx.abort(child);
    }
}

/// Repeats its child once per scheduler step until the child fails.
///
/// # Semantics
///
/// - The child is (re)started at most once per step, however often the loop
///   node itself gets evaluated within that step
/// - A failing child ends the loop cleanly with `Completed`
/// - Any other child exit re-arms the loop for the next step
///
/// A completing child reactivates the suspended loop in the same step; the
/// step marker is what prevents a second run before the next tick.
pub struct Loop {
    child: NodeRef,
    last_run_step: Option<u64>,
}

impl Loop {
    pub fn new(child: NodeRef) -> Self {
        Self {
            child,
            last_run_step: None,
        }
    }
}

impl Node for Loop {
    fn start(&mut self, _cx: &mut NodeCx<'_>) -> Status {
        self.last_run_step = None;
        Status::Running
    }

    fn update(&mut self, cx: &mut NodeCx<'_>, _dt: f32) -> Status {
        let step = cx.step_count();
        if self.last_run_step != Some(step) {
            self.last_run_step = Some(step);
            return start_child(cx, &self.child);
        }
        Status::Running
    }

    fn on_child_stopped(
        &mut self,
        _cx: &mut NodeCx<'_>,
        status: Status,
        _child: &NodeRef,
    ) -> Status {
        if status == Status::Failed {
            Status::Completed
        } else {
            Status::Running
        }
    }

    fn end(&mut self, cx: &mut NodeCx<'_>, status: Status) {
        let child = self.child.clone();
        abort_child(cx, status, &child);
    }
}

/// Launches its child as an independent tree and completes immediately.
///
/// The detached child has no parent: its outcome never reaches the fork, and
/// aborting the fork's own tree leaves the child running.
pub struct Fork {
    child: NodeRef,
}

impl Fork {
    pub fn new(child: NodeRef) -> Self {
        Self { child }
    }
}

impl Node for Fork {
    fn start(&mut self, cx: &mut NodeCx<'_>) -> Status {
        cx.spawn_detached(&self.child);
        Status::Completed
    }

    fn end(&mut self, cx: &mut NodeCx<'_>, status: Status) {
        // Only reachable when the fork is aborted before it ever started;
        // the child was not enqueued yet, so this is a tolerated no-op.
        let child = self.child.clone();
        abort_child(cx, status, &child);
    }
}

/// Invokes a callback with the terminal status on every exit path.
///
/// The callback runs from `end`, so it fires on success, failure *and*
/// abort. It is the tree author's hook for releasing whatever the branch
/// holds.
pub struct Scope<F: FnMut(Status)> {
    child: NodeRef,
    on_exit: F,
}

impl<F: FnMut(Status)> Scope<F> {
    pub fn new(on_exit: F, child: NodeRef) -> Self {
        Self { child, on_exit }
    }
}

impl<F: FnMut(Status)> Node for Scope<F> {
    fn start(&mut self, cx: &mut NodeCx<'_>) -> Status {
        start_child(cx, &self.child)
    }

    fn end(&mut self, cx: &mut NodeCx<'_>, status: Status) {
        (self.on_exit)(status);
        let child = self.child.clone();
        abort_child(cx, status, &child);
    }
}

/// Debug aid: logs entry and exit of the branch it wraps.
pub struct NamedScope {
    name: String,
    child: NodeRef,
}

impl NamedScope {
    pub fn new(name: impl Into<String>, child: NodeRef) -> Self {
        Self {
            name: name.into(),
            child,
        }
    }
}

impl Node for NamedScope {
    fn start(&mut self, cx: &mut NodeCx<'_>) -> Status {
        debug!(scope = %self.name, "entered");
        start_child(cx, &self.child)
    }

    fn end(&mut self, cx: &mut NodeCx<'_>, status: Status) {
        debug!(scope = %self.name, %status, "exited");
        let child = self.child.clone();
        abort_child(cx, status, &child);
    }
}

/// Swaps its child's success and failure.
pub struct Inverter {
    child: NodeRef,
}

impl Inverter {
    pub fn new(child: NodeRef) -> Self {
        Self { child }
    }
}

impl Node for Inverter {
    fn start(&mut self, cx: &mut NodeCx<'_>) -> Status {
        start_child(cx, &self.child)
    }

    fn on_child_stopped(
        &mut self,
        _cx: &mut NodeCx<'_>,
        status: Status,
        _child: &NodeRef,
    ) -> Status {
        if status == Status::Completed {
            Status::Failed
        } else {
            Status::Completed
        }
    }

    fn end(&mut self, cx: &mut NodeCx<'_>, status: Status) {
        let child = self.child.clone();
        abort_child(cx, status, &child);
    }
}

/// Reports `Completed` no matter how its child stopped.
///
/// Useful for optional work inside a sequence that must not fail the whole
/// branch.
pub struct AlwaysSucceed {
    child: NodeRef,
}

impl AlwaysSucceed {
    pub fn new(child: NodeRef) -> Self {
        Self { child }
    }
}

impl Node for AlwaysSucceed {
    fn start(&mut self, cx: &mut NodeCx<'_>) -> Status {
        start_child(cx, &self.child)
    }

    fn on_child_stopped(
        &mut self,
        _cx: &mut NodeCx<'_>,
        _status: Status,
        _child: &NodeRef,
    ) -> Status {
        Status::Completed
    }

    fn end(&mut self, cx: &mut NodeCx<'_>, status: Status) {
        let child = self.child.clone();
        abort_child(cx, status, &child);
    }
}

/// Converts its child's outcome into data: writes success/failure into a
/// shared cell and always reports `Completed`.
pub struct CaptureResult {
    child: NodeRef,
    result: Var<bool>,
}

impl CaptureResult {
    pub fn new(result: Var<bool>, child: NodeRef) -> Self {
        Self { child, result }
    }
}

impl Node for CaptureResult {
    fn start(&mut self, cx: &mut NodeCx<'_>) -> Status {
        start_child(cx, &self.child)
    }

    fn on_child_stopped(
        &mut self,
        _cx: &mut NodeCx<'_>,
        status: Status,
        _child: &NodeRef,
    ) -> Status {
        self.result.set(status == Status::Completed);
        Status::Completed
    }

    fn end(&mut self, cx: &mut NodeCx<'_>, status: Status) {
        let child = self.child.clone();
        abort_child(cx, status, &child);
    }
}

/// Produces its child lazily, by invoking a generator at start time.
///
/// The node stands in for whatever the generator returns: the generated
/// child's status passes through unchanged, and aborting the deferred node
/// aborts the generated child. Restarting the node (e.g. under [`Loop`])
/// invokes the generator again.
pub struct Deferred<F: FnMut() -> NodeRef> {
    generator: F,
    child: Option<NodeRef>,
}

impl<F: FnMut() -> NodeRef> Deferred<F> {
    pub fn new(generator: F) -> Self {
        Self {
            generator,
            child: None,
        }
    }
}

impl<F: FnMut() -> NodeRef> Node for Deferred<F> {
    fn start(&mut self, cx: &mut NodeCx<'_>) -> Status {
        let child = (self.generator)();
        cx.enqueue_child(&child);
        self.child = Some(child);
        Status::Suspended
    }

    fn end(&mut self, cx: &mut NodeCx<'_>, status: Status) {
        if status == Status::Aborted
            && let Some(child) = self.child.take()
        {
            cx.abort(&child);
        }
    }
}
