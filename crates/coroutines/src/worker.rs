//! Background-thread escape hatch.
//!
//! The scheduler is strictly single-threaded; the one concession is a leaf
//! that hands a closure to a one-shot worker thread and suspends. The worker
//! never touches the executor: it reports through a [`CompletionTicket`],
//! and the owning thread resolves the ticket into a
//! [`force_end`](crate::Executor::force_end) while draining its inbox at the
//! start of the next step.

use std::thread;

use tracing::warn;

use crate::node::{Node, NodeCx};
use crate::status::Status;

/// Message a worker sends back to the scheduling thread.
pub(crate) struct Completion {
    pub ticket: u64,
    pub status: Status,
}

/// One-shot token for completing a suspended node from another thread.
///
/// Completing (or dropping) the ticket enqueues a message the executor
/// resolves during its next step. A ticket dropped without an explicit
/// completion (a panicking worker, typically) reports `Failed`. Tickets
/// whose node has already ended resolve to nothing.
pub struct CompletionTicket {
    id: u64,
    tx: flume::Sender<Completion>,
    fired: bool,
}

impl CompletionTicket {
    pub(crate) fn new(id: u64, tx: flume::Sender<Completion>) -> Self {
        Self {
            id,
            tx,
            fired: false,
        }
    }

    /// Identifier used to cancel the ticket from the node's `end`.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Reports the node's terminal status.
    pub fn complete(mut self, status: Status) {
        debug_assert!(status.is_terminal(), "completion must carry a terminal status");
        self.fire(status);
    }

    fn fire(&mut self, status: Status) {
        if !self.fired {
            self.fired = true;
            // The executor may be gone already; nothing left to wake then.
            let _ = self.tx.send(Completion {
                ticket: self.id,
                status,
            });
        }
    }
}

impl Drop for CompletionTicket {
    fn drop(&mut self) {
        if !self.fired {
            self.fire(Status::Failed);
        }
    }
}

/// Leaf that runs a closure on a background thread and suspends until the
/// result is marshaled back.
///
/// The closure is consumed on first dispatch; restarting the node afterwards
/// (e.g. under a loop) fails instead of re-running it.
pub struct AsyncTask<F: FnOnce() + Send + 'static> {
    f: Option<F>,
    ticket: Option<u64>,
}

impl<F: FnOnce() + Send + 'static> AsyncTask<F> {
    pub fn new(f: F) -> Self {
        Self {
            f: Some(f),
            ticket: None,
        }
    }
}

impl<F: FnOnce() + Send + 'static> Node for AsyncTask<F> {
    fn start(&mut self, cx: &mut NodeCx<'_>) -> Status {
        let Some(f) = self.f.take() else {
            warn!("background task restarted after dispatch");
            return Status::Failed;
        };
        let ticket = cx.completion_ticket();
        self.ticket = Some(ticket.id());
        thread::spawn(move || {
            f();
            ticket.complete(Status::Completed);
        });
        Status::Suspended
    }

    fn end(&mut self, cx: &mut NodeCx<'_>, _status: Status) {
        // Late completions must not wake whatever reuses this record slot.
        if let Some(id) = self.ticket.take() {
            cx.cancel_ticket(id);
        }
    }
}

/// Like [`AsyncTask`], but the closure's boolean decides success or failure.
pub struct AsyncCheck<F: FnOnce() -> bool + Send + 'static> {
    f: Option<F>,
    ticket: Option<u64>,
}

impl<F: FnOnce() -> bool + Send + 'static> AsyncCheck<F> {
    pub fn new(f: F) -> Self {
        Self {
            f: Some(f),
            ticket: None,
        }
    }
}

impl<F: FnOnce() -> bool + Send + 'static> Node for AsyncCheck<F> {
    fn start(&mut self, cx: &mut NodeCx<'_>) -> Status {
        let Some(f) = self.f.take() else {
            warn!("background task restarted after dispatch");
            return Status::Failed;
        };
        let ticket = cx.completion_ticket();
        self.ticket = Some(ticket.id());
        thread::spawn(move || {
            let status = if f() {
                Status::Completed
            } else {
                Status::Failed
            };
            ticket.complete(status);
        });
        Status::Suspended
    }

    fn end(&mut self, cx: &mut NodeCx<'_>, _status: Status) {
        if let Some(id) = self.ticket.take() {
            cx.cancel_ticket(id);
        }
    }
}

/// Runs `f` on a background thread; the node completes once the worker is
/// done.
pub fn async_task<F: FnOnce() + Send + 'static>(f: F) -> crate::NodeRef {
    std::rc::Rc::new(std::cell::RefCell::new(AsyncTask::new(f)))
}

/// Runs `f` on a background thread; its boolean decides the node's status.
pub fn async_check<F: FnOnce() -> bool + Send + 'static>(f: F) -> crate::NodeRef {
    std::rc::Rc::new(std::cell::RefCell::new(AsyncCheck::new(f)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    use super::*;
    use crate::builder::*;
    use crate::executor::Executor;
    use crate::node::var;

    fn pump_until_idle(exec: &mut Executor) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while exec.has_remaining_work() {
            assert!(Instant::now() < deadline, "worker never completed");
            exec.step(0.01);
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn observed(body: crate::node::NodeRef) -> (crate::node::Var<Option<Status>>, crate::node::NodeRef) {
        let result = var(None);
        let r = result.clone();
        (result, scope(move |status| r.set(Some(status)), body))
    }

    #[test]
    fn worker_result_arrives_through_step() {
        let done = Arc::new(AtomicBool::new(false));
        let done2 = done.clone();
        let (result, tree) = observed(async_task(move || done2.store(true, Ordering::SeqCst)));
        let mut exec = Executor::new();
        exec.enqueue(&tree);
        pump_until_idle(&mut exec);
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(result.get(), Some(Status::Completed));
    }

    #[test]
    fn check_worker_maps_bool_to_status() {
        let (result, tree) = observed(async_check(|| false));
        let mut exec = Executor::new();
        exec.enqueue(&tree);
        pump_until_idle(&mut exec);
        assert_eq!(result.get(), Some(Status::Failed));
    }

    #[test]
    fn panicking_worker_reports_failure() {
        let (result, tree) = observed(async_task(|| panic!("worker crashed")));
        let mut exec = Executor::new();
        exec.enqueue(&tree);
        pump_until_idle(&mut exec);
        assert_eq!(result.get(), Some(Status::Failed));
    }

    #[test]
    fn late_completion_after_abort_is_ignored() {
        let (gate_tx, gate_rx) = flume::bounded::<()>(1);
        let (result, tree) = observed(async_task(move || {
            let _ = gate_rx.recv();
        }));
        let mut exec = Executor::new();
        exec.enqueue(&tree);
        exec.step(0.01);
        assert!(exec.has_remaining_work());

        exec.abort_tree(&tree);
        assert_eq!(result.get(), Some(Status::Aborted));
        exec.step(0.01);
        assert!(!exec.has_remaining_work());

        // Unblock the worker; its completion resolves to nothing.
        gate_tx.send(()).unwrap();
        thread::sleep(Duration::from_millis(20));
        exec.step(0.01);
        assert!(!exec.has_remaining_work());
        assert_eq!(result.get(), Some(Status::Aborted));
    }
}
