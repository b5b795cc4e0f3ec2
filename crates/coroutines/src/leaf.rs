//! Leaf nodes: closure adapters, timers, and liveness-guarded work.

use crate::node::{Node, NodeCx};
use crate::status::Status;

/// Fire-and-forget closure leaf: runs the closure, completes.
pub struct Action<F: FnMut()> {
    f: F,
}

impl<F: FnMut()> Action<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F: FnMut()> Node for Action<F> {
    fn start(&mut self, _cx: &mut NodeCx<'_>) -> Status {
        (self.f)();
        Status::Completed
    }
}

/// Like [`Action`], but the closure receives the execution context, so it
/// can reach the executor (e.g. to broadcast an event from inside a tree).
pub struct CxAction<F: FnMut(&mut NodeCx<'_>)> {
    f: F,
}

impl<F: FnMut(&mut NodeCx<'_>)> CxAction<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F: FnMut(&mut NodeCx<'_>)> Node for CxAction<F> {
    fn start(&mut self, cx: &mut NodeCx<'_>) -> Status {
        (self.f)(cx);
        Status::Completed
    }
}

/// Success/failure closure leaf: `true` completes, `false` fails.
pub struct Condition<F: FnMut() -> bool> {
    f: F,
}

impl<F: FnMut() -> bool> Condition<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F: FnMut() -> bool> Node for Condition<F> {
    fn start(&mut self, _cx: &mut NodeCx<'_>) -> Status {
        if (self.f)() {
            Status::Completed
        } else {
            Status::Failed
        }
    }
}

/// Context-aware variant of [`Condition`].
pub struct CxCondition<F: FnMut(&mut NodeCx<'_>) -> bool> {
    f: F,
}

impl<F: FnMut(&mut NodeCx<'_>) -> bool> CxCondition<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F: FnMut(&mut NodeCx<'_>) -> bool> Node for CxCondition<F> {
    fn start(&mut self, cx: &mut NodeCx<'_>) -> Status {
        if (self.f)(cx) {
            Status::Completed
        } else {
            Status::Failed
        }
    }
}

/// Wall-clock timer: completes once the accumulated step time reaches the
/// target. A zero or negative target completes instantly at start.
pub struct Timer {
    target: f32,
    remaining: f32,
}

impl Timer {
    pub fn new(target: f32) -> Self {
        Self {
            target,
            remaining: 0.0,
        }
    }
}

impl Node for Timer {
    fn start(&mut self, _cx: &mut NodeCx<'_>) -> Status {
        if self.target <= 0.0 {
            return Status::Completed;
        }
        self.remaining = self.target;
        Status::Running
    }

    fn update(&mut self, _cx: &mut NodeCx<'_>, dt: f32) -> Status {
        self.remaining -= dt;
        if self.remaining <= 0.0 {
            Status::Completed
        } else {
            Status::Running
        }
    }
}

/// Frame-count timer: completes after the given number of steps.
///
/// A zero target completes instantly at start. The stored count is one
/// higher than the target because a freshly started node receives an update
/// within its starting step.
pub struct FrameTimer {
    target: u32,
    frames: u32,
}

impl FrameTimer {
    pub fn new(target: u32) -> Self {
        Self { target, frames: 0 }
    }
}

impl Node for FrameTimer {
    fn start(&mut self, _cx: &mut NodeCx<'_>) -> Status {
        if self.target == 0 {
            return Status::Completed;
        }
        self.frames = self.target + 1;
        Status::Running
    }

    fn update(&mut self, _cx: &mut NodeCx<'_>, _dt: f32) -> Status {
        self.frames -= 1;
        if self.frames == 0 {
            Status::Completed
        } else {
            Status::Running
        }
    }
}

/// Completes instantly.
pub struct Nop;

impl Node for Nop {
    fn start(&mut self, _cx: &mut NodeCx<'_>) -> Status {
        Status::Completed
    }
}

/// Fails instantly.
pub struct Fail;

impl Node for Fail {
    fn start(&mut self, _cx: &mut NodeCx<'_>) -> Status {
        Status::Failed
    }
}

/// Suspends until something ends it externally (a force-end or an abort).
pub struct WaitForever;

impl Node for WaitForever {
    fn start(&mut self, _cx: &mut NodeCx<'_>) -> Status {
        Status::Suspended
    }
}

/// Validity capability for external objects referenced from leaf nodes.
///
/// The host environment supplies one handle per tracked object; guarded
/// leaves consult it before touching the object and fail instead of
/// operating on a dead target.
pub trait Liveness {
    fn is_alive(&self) -> bool;
}

impl<T> Liveness for std::rc::Weak<T> {
    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}

impl<T> Liveness for std::sync::Weak<T> {
    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}

/// [`Action`] gated on a liveness handle; fails if the target is gone.
pub struct GuardedAction<L: Liveness, F: FnMut()> {
    handle: L,
    f: F,
}

impl<L: Liveness, F: FnMut()> GuardedAction<L, F> {
    pub fn new(handle: L, f: F) -> Self {
        Self { handle, f }
    }
}

impl<L: Liveness, F: FnMut()> Node for GuardedAction<L, F> {
    fn start(&mut self, _cx: &mut NodeCx<'_>) -> Status {
        if !self.handle.is_alive() {
            return Status::Failed;
        }
        (self.f)();
        Status::Completed
    }
}

/// [`Condition`] gated on a liveness handle; fails if the target is gone.
pub struct GuardedCondition<L: Liveness, F: FnMut() -> bool> {
    handle: L,
    f: F,
}

impl<L: Liveness, F: FnMut() -> bool> GuardedCondition<L, F> {
    pub fn new(handle: L, f: F) -> Self {
        Self { handle, f }
    }
}

impl<L: Liveness, F: FnMut() -> bool> Node for GuardedCondition<L, F> {
    fn start(&mut self, _cx: &mut NodeCx<'_>) -> Status {
        if !self.handle.is_alive() {
            return Status::Failed;
        }
        if (self.f)() {
            Status::Completed
        } else {
            Status::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::builder::*;
    use crate::executor::Executor;
    use crate::node::var;
    use crate::status::Status;

    fn observed(body: crate::node::NodeRef) -> (crate::node::Var<Option<Status>>, crate::node::NodeRef) {
        let result = var(None);
        let r = result.clone();
        (result, scope(move |status| r.set(Some(status)), body))
    }

    #[test]
    fn timer_counts_down_step_time() {
        let (result, tree) = observed(wait(1.0));
        let mut exec = Executor::new();
        exec.enqueue(&tree);
        exec.step(0.5);
        assert_eq!(result.get(), None);
        exec.step(0.5);
        assert_eq!(result.get(), Some(Status::Completed));
    }

    #[test]
    fn zero_timer_completes_at_start() {
        let (result, tree) = observed(wait(0.0));
        let mut exec = Executor::new();
        exec.enqueue(&tree);
        exec.step(10.0);
        assert_eq!(result.get(), Some(Status::Completed));
    }

    #[test]
    fn frame_timer_counts_steps() {
        let (result, tree) = observed(wait_frames(2));
        let mut exec = Executor::new();
        exec.enqueue(&tree);
        exec.step(0.1);
        exec.step(0.1);
        assert_eq!(result.get(), None);
        exec.step(0.1);
        assert_eq!(result.get(), Some(Status::Completed));
    }

    #[test]
    fn condition_maps_bool_to_status() {
        let (result, tree) = observed(condition(|| false));
        let mut exec = Executor::new();
        exec.enqueue(&tree);
        exec.step(0.1);
        assert_eq!(result.get(), Some(Status::Failed));
    }

    #[test]
    fn guarded_action_fails_once_target_is_dropped() {
        let target = Rc::new(42);
        let handle = Rc::downgrade(&target);
        let ran = var(false);
        let ran2 = ran.clone();
        let (result, tree) = observed(guarded_action(handle, move || ran2.set(true)));
        drop(target);

        let mut exec = Executor::new();
        exec.enqueue(&tree);
        exec.step(0.1);
        assert_eq!(result.get(), Some(Status::Failed));
        assert!(!ran.get(), "dead target must not be touched");
    }

    #[test]
    fn guarded_action_runs_while_target_lives() {
        let target = Rc::new(42);
        let ran = var(false);
        let ran2 = ran.clone();
        let (result, tree) = observed(guarded_action(Rc::downgrade(&target), move || ran2.set(true)));

        let mut exec = Executor::new();
        exec.enqueue(&tree);
        exec.step(0.1);
        assert_eq!(result.get(), Some(Status::Completed));
        assert!(ran.get());
    }
}
