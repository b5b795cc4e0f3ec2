//! Factory functions for ergonomic tree construction.
//!
//! Every combinator and leaf has a short constructor returning an owned
//! [`NodeRef`]. Single-child combinators accept either a node handle or a
//! bare closure; the closure's return type picks the adapter (no return →
//! fire-and-forget action, `bool` → condition, `NodeRef` → deferred
//! generator). Multi-child combinators take a `Vec<NodeRef>`; use
//! [`nodes!`](crate::nodes) to mix handles and closures in one list.

use std::cell::RefCell;
use std::rc::Rc;

use crate::composite::{OptionalSequence, Race, Select, Sequence, Sync};
use crate::decorator::{
    AlwaysSucceed, CaptureResult, Deferred, Fork, Inverter, Loop, NamedScope, Scope,
};
use crate::leaf::{
    Action, Condition, CxAction, CxCondition, Fail, FrameTimer, GuardedAction, GuardedCondition,
    Liveness, Nop, Timer, WaitForever,
};
use crate::node::{Node, NodeCx, NodeRef, Var};
use crate::status::Status;

fn make(node: impl Node + 'static) -> NodeRef {
    Rc::new(RefCell::new(node))
}

/// Conversion into a node, selected by the shape of the callable.
///
/// The marker parameter exists only to keep the closure impls coherent;
/// callers never name it.
pub trait IntoNode<Marker> {
    fn into_node(self) -> NodeRef;
}

/// Marker for node handles passed through unchanged.
pub struct HandleMarker;

/// Marker for `FnMut()` closures (fire-and-forget actions).
pub struct ActionMarker;

/// Marker for `FnMut() -> bool` closures (conditions).
pub struct ConditionMarker;

/// Marker for `FnMut() -> NodeRef` closures (deferred generators).
pub struct DeferredMarker;

impl IntoNode<HandleMarker> for NodeRef {
    fn into_node(self) -> NodeRef {
        self
    }
}

impl<F: FnMut() + 'static> IntoNode<ActionMarker> for F {
    fn into_node(self) -> NodeRef {
        make(Action::new(self))
    }
}

impl<F: FnMut() -> bool + 'static> IntoNode<ConditionMarker> for F {
    fn into_node(self) -> NodeRef {
        make(Condition::new(self))
    }
}

impl<F: FnMut() -> NodeRef + 'static> IntoNode<DeferredMarker> for F {
    fn into_node(self) -> NodeRef {
        make(Deferred::new(self))
    }
}

/// Builds a `Vec<NodeRef>` from a mixed list of handles and closures.
#[macro_export]
macro_rules! nodes {
    ($($child:expr),* $(,)?) => {
        vec![$($crate::IntoNode::into_node($child)),*]
    };
}

// -- composites ---------------------------------------------------------

/// Runs children in order, failing fast. See [`Sequence`].
pub fn sequence(children: Vec<NodeRef>) -> NodeRef {
    make(Sequence::new(children))
}

/// Runs children in order, swallowing failures. See [`OptionalSequence`].
pub fn optional_sequence(children: Vec<NodeRef>) -> NodeRef {
    make(OptionalSequence::new(children))
}

/// Runs children in order until one succeeds. See [`Select`].
pub fn select(children: Vec<NodeRef>) -> NodeRef {
    make(Select::new(children))
}

/// Runs children in parallel; first to stop wins. See [`Race`].
pub fn race(children: Vec<NodeRef>) -> NodeRef {
    make(Race::new(children))
}

/// Runs children in parallel and joins them all. See [`Sync`].
pub fn sync(children: Vec<NodeRef>) -> NodeRef {
    make(Sync::new(children))
}

// -- decorators ---------------------------------------------------------

/// Repeats `body` once per step until it fails. See [`Loop`].
pub fn repeat<M>(body: impl IntoNode<M>) -> NodeRef {
    make(Loop::new(body.into_node()))
}

/// Launches `body` as an independent tree. See [`Fork`].
pub fn fork<M>(body: impl IntoNode<M>) -> NodeRef {
    make(Fork::new(body.into_node()))
}

/// Invokes `on_exit` with the terminal status on every exit path of `body`.
pub fn scope<M>(on_exit: impl FnMut(Status) + 'static, body: impl IntoNode<M>) -> NodeRef {
    make(Scope::new(on_exit, body.into_node()))
}

/// Wraps `body` in a debug-logged scope.
pub fn named_scope<M>(name: impl Into<String>, body: impl IntoNode<M>) -> NodeRef {
    make(NamedScope::new(name, body.into_node()))
}

/// Swaps success and failure of `body`. See [`Inverter`].
pub fn invert<M>(body: impl IntoNode<M>) -> NodeRef {
    make(Inverter::new(body.into_node()))
}

/// Completes regardless of how `body` stopped. See [`AlwaysSucceed`].
pub fn always_succeed<M>(body: impl IntoNode<M>) -> NodeRef {
    make(AlwaysSucceed::new(body.into_node()))
}

/// Writes `body`'s success into `result` and completes. See [`CaptureResult`].
pub fn capture_result<M>(result: Var<bool>, body: impl IntoNode<M>) -> NodeRef {
    make(CaptureResult::new(result, body.into_node()))
}

/// Produces the child lazily at start time. See [`Deferred`].
pub fn deferred(generator: impl FnMut() -> NodeRef + 'static) -> NodeRef {
    make(Deferred::new(generator))
}

// -- leaves -------------------------------------------------------------

/// Runs a closure and completes.
pub fn action(f: impl FnMut() + 'static) -> NodeRef {
    make(Action::new(f))
}

/// Context-aware action: the closure can reach the executor.
pub fn action_cx(f: impl FnMut(&mut NodeCx<'_>) + 'static) -> NodeRef {
    make(CxAction::new(f))
}

/// Completes or fails from a boolean closure.
pub fn condition(f: impl FnMut() -> bool + 'static) -> NodeRef {
    make(Condition::new(f))
}

/// Context-aware condition.
pub fn condition_cx(f: impl FnMut(&mut NodeCx<'_>) -> bool + 'static) -> NodeRef {
    make(CxCondition::new(f))
}

/// Liveness-guarded action; fails if the tracked object is gone.
pub fn guarded_action<L: Liveness + 'static>(handle: L, f: impl FnMut() + 'static) -> NodeRef {
    make(GuardedAction::new(handle, f))
}

/// Liveness-guarded condition; fails if the tracked object is gone.
pub fn guarded_condition<L: Liveness + 'static>(
    handle: L,
    f: impl FnMut() -> bool + 'static,
) -> NodeRef {
    make(GuardedCondition::new(handle, f))
}

/// Completes after `seconds` of accumulated step time.
pub fn wait(seconds: f32) -> NodeRef {
    make(Timer::new(seconds))
}

/// Completes after `frames` scheduler steps.
pub fn wait_frames(frames: u32) -> NodeRef {
    make(FrameTimer::new(frames))
}

/// Suspends until ended externally.
pub fn wait_forever() -> NodeRef {
    make(WaitForever)
}

/// Completes instantly.
pub fn nop() -> NodeRef {
    make(Nop)
}

/// Fails instantly.
pub fn fail() -> NodeRef {
    make(Fail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use crate::node::var;

    #[test]
    fn nodes_macro_adapts_mixed_children() {
        let t = var(Vec::<&'static str>::new());
        let t1 = t.clone();
        let t2 = t.clone();
        let t3 = t.clone();
        let tree = sequence(nodes![
            move || t1.with(|v| v.push("action")),
            move || {
                t2.with(|v| v.push("condition"));
                true
            },
            move || {
                t3.with(|v| v.push("deferred"));
                nop()
            },
            wait_frames(0),
        ]);

        let mut exec = Executor::new();
        exec.enqueue(&tree);
        exec.step(0.1);
        assert_eq!(t.get(), vec!["action", "condition", "deferred"]);
        assert!(!exec.has_remaining_work());
    }

    #[test]
    fn single_child_factories_accept_bare_closures() {
        let ran = var(false);
        let ran2 = ran.clone();
        let tree = always_succeed(move || {
            ran2.set(true);
            false
        });
        let mut exec = Executor::new();
        exec.enqueue(&tree);
        exec.step(0.1);
        assert!(ran.get());
        assert!(!exec.has_remaining_work());
    }
}
