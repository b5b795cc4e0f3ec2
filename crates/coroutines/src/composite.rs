//! Multi-child combinators.
//!
//! Composite nodes own a list of children and decide, from each child's
//! terminal status, whether to enqueue more work, keep waiting, or finish.
//! Children are enqueued through the executor; a composite never runs child
//! logic itself. This module provides [`Sequence`], [`OptionalSequence`],
//! [`Select`], [`Race`] and [`Sync`].

use crate::node::{Node, NodeCx, NodeRef};
use crate::status::Status;

/// Aborts every child of a composite that is being torn down.
///
/// Children that already finished (or were never enqueued) have no live
/// record, so aborting them is a no-op.
pub(crate) fn abort_children(cx: &mut NodeCx<'_>, status: Status, children: &[NodeRef]) {
    if status == Status::Aborted {
        for child in children {
            cx.abort(child);
        }
    }
}

/// Enqueues the child at `cursor` (advancing it) or reports completion when
/// the list is exhausted.
fn advance(children: &[NodeRef], cursor: &mut usize, cx: &mut NodeCx<'_>) -> Status {
    if *cursor == children.len() {
        return Status::Completed;
    }
    let child = &children[*cursor];
    *cursor += 1;
    cx.enqueue_child(child);
    Status::Suspended
}

/// Runs its children one after another until one fails.
///
/// # Semantics
///
/// - A failing child ends the sequence immediately with `Failed`
/// - A child finishing any other way hands control to the next child
/// - When the last child is done the sequence is `Completed`
/// - An empty sequence completes instantly
pub struct Sequence {
    children: Vec<NodeRef>,
    cursor: usize,
}

impl Sequence {
    pub fn new(children: Vec<NodeRef>) -> Self {
        Self {
            children,
            cursor: 0,
        }
    }
}

impl Node for Sequence {
    fn start(&mut self, cx: &mut NodeCx<'_>) -> Status {
        self.cursor = 0;
        if self.children.is_empty() {
            return Status::Completed;
        }
        advance(&self.children, &mut self.cursor, cx)
    }

    fn on_child_stopped(
        &mut self,
        cx: &mut NodeCx<'_>,
        status: Status,
        _child: &NodeRef,
    ) -> Status {
        if status == Status::Failed {
            return Status::Failed;
        }
        advance(&self.children, &mut self.cursor, cx)
    }

    fn end(&mut self, cx: &mut NodeCx<'_>, status: Status) {
        abort_children(cx, status, &self.children);
    }
}

/// A sequence that swallows child failures instead of propagating them.
///
/// # Semantics
///
/// Identical to [`Sequence`], except a failing child is treated as if it had
/// completed: the next child still runs, and the whole node never reports
/// `Failed`.
pub struct OptionalSequence {
    children: Vec<NodeRef>,
    cursor: usize,
}

impl OptionalSequence {
    pub fn new(children: Vec<NodeRef>) -> Self {
        Self {
            children,
            cursor: 0,
        }
    }
}

impl Node for OptionalSequence {
    fn start(&mut self, cx: &mut NodeCx<'_>) -> Status {
        self.cursor = 0;
        if self.children.is_empty() {
            return Status::Completed;
        }
        advance(&self.children, &mut self.cursor, cx)
    }

    fn on_child_stopped(
        &mut self,
        cx: &mut NodeCx<'_>,
        _status: Status,
        _child: &NodeRef,
    ) -> Status {
        advance(&self.children, &mut self.cursor, cx)
    }

    fn end(&mut self, cx: &mut NodeCx<'_>, status: Status) {
        abort_children(cx, status, &self.children);
    }
}

/// Runs its children one after another until one succeeds.
///
/// # Semantics
///
/// - A completing child ends the select immediately with `Completed`
/// - Any other terminal status hands control to the next child
/// - When the last child stops without success, its status is propagated
/// - An empty select completes instantly
pub struct Select {
    children: Vec<NodeRef>,
    cursor: usize,
}

impl Select {
    pub fn new(children: Vec<NodeRef>) -> Self {
        Self {
            children,
            cursor: 0,
        }
    }
}

impl Node for Select {
    fn start(&mut self, cx: &mut NodeCx<'_>) -> Status {
        self.cursor = 0;
        if self.children.is_empty() {
            return Status::Completed;
        }
        advance(&self.children, &mut self.cursor, cx)
    }

    fn on_child_stopped(
        &mut self,
        cx: &mut NodeCx<'_>,
        status: Status,
        _child: &NodeRef,
    ) -> Status {
        if status == Status::Completed {
            return Status::Completed;
        }
        if self.cursor == self.children.len() {
            return status;
        }
        advance(&self.children, &mut self.cursor, cx)
    }

    fn end(&mut self, cx: &mut NodeCx<'_>, status: Status) {
        abort_children(cx, status, &self.children);
    }
}

/// Runs all children in parallel; the first one to stop wins.
///
/// # Semantics
///
/// - All children are enqueued at start
/// - The first child to reach a terminal status decides the race: every
///   other branch is silently aborted and the winner's status (success *or*
///   failure) becomes the race's status
/// - An empty race completes instantly
pub struct Race {
    children: Vec<NodeRef>,
}

impl Race {
    pub fn new(children: Vec<NodeRef>) -> Self {
        Self { children }
    }
}

/// Enqueues children back-to-front so the first child is popped first
/// within the step.
fn enqueue_all(cx: &mut NodeCx<'_>, children: &[NodeRef]) {
    for child in children.iter().rev() {
        cx.enqueue_child(child);
    }
}

impl Node for Race {
    fn start(&mut self, cx: &mut NodeCx<'_>) -> Status {
        if self.children.is_empty() {
            return Status::Completed;
        }
        enqueue_all(cx, &self.children);
        Status::Suspended
    }

    fn on_child_stopped(&mut self, cx: &mut NodeCx<'_>, status: Status, child: &NodeRef) -> Status {
        for other in &self.children {
            if !std::rc::Rc::ptr_eq(other, child) {
                cx.abort(other);
            }
        }
        status
    }

    fn end(&mut self, cx: &mut NodeCx<'_>, status: Status) {
        abort_children(cx, status, &self.children);
    }
}

/// Runs all children in parallel and waits for every one of them.
///
/// # Semantics
///
/// - All children are enqueued at start
/// - The node stays suspended until every child has stopped
/// - The aggregate status is `Failed` if any child failed, else `Completed`,
///   regardless of completion order
/// - An empty sync completes instantly
pub struct Sync {
    children: Vec<NodeRef>,
    closed: usize,
    aggregate: Status,
}

impl Sync {
    pub fn new(children: Vec<NodeRef>) -> Self {
        Self {
            children,
            closed: 0,
            aggregate: Status::Completed,
        }
    }
}

impl Node for Sync {
    fn start(&mut self, cx: &mut NodeCx<'_>) -> Status {
        self.closed = 0;
        self.aggregate = Status::Completed;
        if self.children.is_empty() {
            return Status::Completed;
        }
        enqueue_all(cx, &self.children);
        Status::Suspended
    }

    fn on_child_stopped(
        &mut self,
        _cx: &mut NodeCx<'_>,
        status: Status,
        _child: &NodeRef,
    ) -> Status {
        if status == Status::Failed {
            self.aggregate = Status::Failed;
        }
        self.closed += 1;
        if self.closed == self.children.len() {
            self.aggregate
        } else {
            Status::Suspended
        }
    }

    fn end(&mut self, cx: &mut NodeCx<'_>, status: Status) {
        abort_children(cx, status, &self.children);
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::*;
    use crate::executor::Executor;
    use crate::node::{Var, var};
    use crate::status::Status;

    type Trace = Var<Vec<&'static str>>;

    fn trace() -> Trace {
        var(Vec::new())
    }

    fn mark(trace: &Trace, name: &'static str) -> crate::node::NodeRef {
        let trace = trace.clone();
        action(move || trace.with(|v| v.push(name)))
    }

    fn run_to_idle(exec: &mut Executor) {
        for _ in 0..100 {
            if !exec.has_remaining_work() {
                return;
            }
            exec.step(0.1);
        }
        panic!("executor did not go idle");
    }

    /// Wraps a tree so its final status lands in a shared cell.
    fn observed(result: &Var<Option<Status>>, body: crate::node::NodeRef) -> crate::node::NodeRef {
        let result = result.clone();
        scope(move |status| result.set(Some(status)), body)
    }

    #[test]
    fn sequence_runs_children_in_order() {
        let t = trace();
        let result = var(None);
        let mut exec = Executor::new();
        let tree = observed(
            &result,
            sequence(vec![mark(&t, "a"), mark(&t, "b"), mark(&t, "c")]),
        );
        exec.enqueue(&tree);
        run_to_idle(&mut exec);
        assert_eq!(t.get(), vec!["a", "b", "c"]);
        assert_eq!(result.get(), Some(Status::Completed));
    }

    #[test]
    fn sequence_fails_fast() {
        let t = trace();
        let result = var(None);
        let mut exec = Executor::new();
        let tree = observed(
            &result,
            sequence(vec![mark(&t, "a"), fail(), mark(&t, "never")]),
        );
        exec.enqueue(&tree);
        run_to_idle(&mut exec);
        assert_eq!(t.get(), vec!["a"]);
        assert_eq!(result.get(), Some(Status::Failed));
    }

    #[test]
    fn empty_sequence_completes_instantly() {
        let result = var(None);
        let mut exec = Executor::new();
        let tree = observed(&result, sequence(Vec::new()));
        exec.enqueue(&tree);
        run_to_idle(&mut exec);
        assert_eq!(result.get(), Some(Status::Completed));
    }

    #[test]
    fn optional_sequence_swallows_failure() {
        let t = trace();
        let result = var(None);
        let mut exec = Executor::new();
        let tree = observed(
            &result,
            optional_sequence(vec![fail(), mark(&t, "b")]),
        );
        exec.enqueue(&tree);
        run_to_idle(&mut exec);
        assert_eq!(t.get(), vec!["b"]);
        assert_eq!(result.get(), Some(Status::Completed));
    }

    #[test]
    fn select_stops_on_first_success() {
        let t = trace();
        let result = var(None);
        let mut exec = Executor::new();
        let tree = observed(
            &result,
            select(vec![fail(), mark(&t, "b"), mark(&t, "never")]),
        );
        exec.enqueue(&tree);
        run_to_idle(&mut exec);
        assert_eq!(t.get(), vec!["b"]);
        assert_eq!(result.get(), Some(Status::Completed));
    }

    #[test]
    fn select_propagates_failure_when_all_fail() {
        let result = var(None);
        let mut exec = Executor::new();
        let tree = observed(&result, select(vec![fail(), fail()]));
        exec.enqueue(&tree);
        run_to_idle(&mut exec);
        assert_eq!(result.get(), Some(Status::Failed));
    }

    #[test]
    fn race_winner_decides_and_losers_are_aborted() {
        let loser_exit = var(None);
        let result = var(None);
        let mut exec = Executor::new();
        let loser = {
            let loser_exit = loser_exit.clone();
            scope(move |status| loser_exit.set(Some(status)), wait_forever())
        };
        let tree = observed(&result, race(vec![loser, wait(0.2)]));
        exec.enqueue(&tree);
        run_to_idle(&mut exec);
        assert_eq!(result.get(), Some(Status::Completed));
        assert_eq!(loser_exit.get(), Some(Status::Aborted));
    }

    #[test]
    fn race_propagates_a_losing_failure() {
        let result = var(None);
        let mut exec = Executor::new();
        let tree = observed(&result, race(vec![wait_forever(), fail()]));
        exec.enqueue(&tree);
        run_to_idle(&mut exec);
        assert_eq!(result.get(), Some(Status::Failed));
    }

    #[test]
    fn sync_waits_for_every_child() {
        let result = var(None);
        let mut exec = Executor::new();
        let tree = observed(&result, sync(vec![wait(0.3), wait(0.1)]));
        exec.enqueue(&tree);
        exec.step(0.1);
        exec.step(0.1);
        assert_eq!(result.get(), None, "one branch is still running");
        run_to_idle(&mut exec);
        assert_eq!(result.get(), Some(Status::Completed));
    }

    #[test]
    fn sync_fails_if_any_child_failed() {
        let result = var(None);
        let mut exec = Executor::new();
        let tree = observed(&result, sync(vec![fail(), wait(0.2)]));
        exec.enqueue(&tree);
        run_to_idle(&mut exec);
        assert_eq!(result.get(), Some(Status::Failed));
    }
}
