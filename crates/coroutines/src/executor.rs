//! The executor: scheduling, termination routing, and abort cascades.
//!
//! The executor owns two collections: an ordered *active queue* of work due
//! this step or the next, and an unordered *suspended set* of parked nodes.
//! It is the only code allowed to start, update, or end nodes, and the only
//! code that splices the tree while it runs. All of it happens on the single
//! thread that calls [`Executor::step`].

use std::collections::VecDeque;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::node::{NodeCx, NodeRef, WeakNodeRef};
use crate::status::Status;
use crate::worker::{Completion, CompletionTicket};

/// Bookkeeping unit for one node activation.
///
/// `status == None` means the node has not been started yet. `node == None`
/// encodes the frame marker (in the active queue) or a record consumed by a
/// reactivation (in the suspended set, awaiting cleanup).
#[derive(Clone)]
struct ExecutionRecord {
    node: Option<NodeRef>,
    parent: Option<WeakNodeRef>,
    status: Option<Status>,
}

impl ExecutionRecord {
    fn marker() -> Self {
        Self {
            node: None,
            parent: None,
            status: None,
        }
    }

    fn refers_to(&self, target: &NodeRef) -> bool {
        self.node.as_ref().is_some_and(|n| Rc::ptr_eq(n, target))
    }

    #[cfg(debug_assertions)]
    fn parent_is(&self, target: &NodeRef) -> bool {
        self.parent
            .as_ref()
            .and_then(|w| w.upgrade())
            .is_some_and(|p| Rc::ptr_eq(&p, target))
    }
}

/// Drives node trees through their lifecycle, one step per external tick.
///
/// Within a step, records are evaluated depth-first in most-recently-enqueued
/// order, so a freshly spawned child runs before its sibling's next
/// re-evaluation. A single frame marker delimits this step's work from the
/// next one's; work enqueued during a step still runs within that step.
pub struct Executor {
    active: VecDeque<ExecutionRecord>,
    suspended: Vec<ExecutionRecord>,
    step_count: u64,
    completion_tx: flume::Sender<Completion>,
    completion_rx: flume::Receiver<Completion>,
    pending: FxHashMap<u64, WeakNodeRef>,
    next_ticket: u64,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        let (completion_tx, completion_rx) = flume::unbounded();
        let mut active = VecDeque::new();
        active.push_back(ExecutionRecord::marker());
        Self {
            active,
            suspended: Vec::new(),
            step_count: 0,
            completion_tx,
            completion_rx,
            pending: FxHashMap::default(),
            next_ticket: 0,
        }
    }

    /// Hands a root node to the executor.
    ///
    /// The node is started during the next [`step`](Self::step) (or later in
    /// the current one, if called from inside node code via
    /// [`NodeCx`](crate::NodeCx)).
    pub fn enqueue(&mut self, node: &NodeRef) {
        self.enqueue_with_parent(node, None);
    }

    pub(crate) fn enqueue_with_parent(&mut self, node: &NodeRef, parent: Option<WeakNodeRef>) {
        #[cfg(debug_assertions)]
        {
            let duplicate = self
                .suspended
                .iter()
                .chain(self.active.iter())
                .any(|r| r.status != Some(Status::Aborted) && r.refers_to(node));
            if duplicate {
                warn!("node enqueued while it already has a live execution record");
                debug_assert!(false, "node enqueued twice");
            }
        }
        self.active.push_back(ExecutionRecord {
            node: Some(node.clone()),
            parent,
            status: None,
        });
    }

    /// Runs one scheduler step: drains out-of-step completions, evaluates
    /// every record up to the frame marker, then purges aborted leftovers.
    pub fn step(&mut self, dt: f32) {
        self.drain_completions();
        while self.single_step(dt) {}
        self.cleanup();
        self.step_count += 1;
    }

    /// Evaluates exactly one queued record. Returns `false` once the frame
    /// marker is reached, i.e. when the step is exhausted.
    fn single_step(&mut self, dt: f32) -> bool {
        let Some(mut record) = self.active.pop_back() else {
            return false;
        };

        let Some(node) = record.node.clone() else {
            // Reached the marker; park it at the front for the next step.
            self.active.push_front(record);
            return false;
        };

        if record.status == Some(Status::Aborted) {
            // Marked for cleanup while still queued; End already ran.
            return true;
        }

        if record.status.is_none() {
            let status = self.invoke_start(&node);
            match status {
                Status::Suspended => {
                    record.status = Some(Status::Suspended);
                    self.suspended.push(record);
                    return true;
                }
                s if s.is_terminal() => {
                    self.process_node_end(record, s);
                    return true;
                }
                s => record.status = Some(s),
            }
            // Freshly started and still running: fall through to update
            // within the same step.
        }

        let status = self.invoke_update(&node, dt);
        match status {
            Status::Suspended => {
                record.status = Some(Status::Suspended);
                self.suspended.push(record);
            }
            s if s.is_terminal() => self.process_node_end(record, s),
            s => {
                record.status = Some(s);
                // Re-queued behind the marker: runs again next step.
                self.active.push_front(record);
            }
        }
        true
    }

    /// Routes a finished node's status to its parent and cascades the
    /// consequences upward.
    ///
    /// A parent answering [`Status::Suspended`] keeps waiting. A suspended
    /// parent answering [`Status::Running`] is *reactivated*: its record
    /// moves back onto the active queue and the stale suspended record is
    /// marked aborted (purged later, so in-flight iteration stays valid).
    /// Any other answer terminates the parent as well and the cascade
    /// continues.
    fn process_node_end(&mut self, record: ExecutionRecord, status: Status) {
        let Some(node) = record.node.clone() else {
            return;
        };
        self.invoke_end(&node, status);

        let Some(parent) = record.parent.as_ref().and_then(|w| w.upgrade()) else {
            // A root finished, or the tree above was already torn down.
            return;
        };
        let Some(parent_status) = self.invoke_on_child_stopped(&parent, status, &node) else {
            return;
        };
        if parent_status == Status::Suspended {
            // Parent still waits on other children.
            return;
        }

        if let Some(idx) = self.find_suspended(&parent) {
            if parent_status == Status::Running {
                // Reactivation: put a live copy on the active queue and
                // retire the suspended record. Its node slot is cleared so
                // later lookups find the live copy, not the husk.
                let mut live = self.suspended[idx].clone();
                live.status = Some(Status::Running);
                self.active.push_back(live);
                self.suspended[idx].status = Some(Status::Aborted);
                self.suspended[idx].node = None;
            } else if self.suspended[idx].status != Some(Status::Aborted) {
                self.suspended[idx].status = Some(Status::Aborted);
                let copy = self.suspended[idx].clone();
                self.process_node_end(copy, parent_status);
            }
        } else if parent_status != Status::Running {
            if let Some(idx) = self.find_active(&parent) {
                if self.active[idx].status != Some(Status::Aborted) {
                    self.active[idx].status = Some(Status::Aborted);
                    let copy = self.active[idx].clone();
                    self.process_node_end(copy, parent_status);
                }
            }
            // Not found anywhere: torn down by a concurrent abort path.
        }
    }

    /// Silently cancels a node, telling only the node itself.
    ///
    /// Used by parallel combinators to abort losing branches: the parent is
    /// not notified, because either it requested the abort or it is about to
    /// be aborted too. A node without a live record is ignored.
    pub fn abort_node(&mut self, node: &NodeRef) {
        if let Some(idx) = self.find_suspended(node) {
            if self.suspended[idx].status != Some(Status::Aborted) {
                self.suspended[idx].status = Some(Status::Aborted);
                self.invoke_end(node, Status::Aborted);
            }
        } else if let Some(idx) = self.find_active(node) {
            let record = self.active.remove(idx);
            let already_aborted =
                record.is_some_and(|r| r.status == Some(Status::Aborted));
            if !already_aborted {
                self.invoke_end(node, Status::Aborted);
            }
        }
        self.debug_check_no_live_dependents(node);
    }

    /// Cancels the entire tree containing `node`.
    ///
    /// Walks the parent chain to the root, then ends the root with
    /// [`Status::Aborted`]; composite teardown cascades the abort down every
    /// branch. Intended for fatal-error handling by external callers.
    pub fn abort_tree(&mut self, node: &NodeRef) {
        let mut current = node.clone();
        loop {
            let found = self
                .find_suspended(&current)
                .map(|idx| (true, idx))
                .or_else(|| self.find_active(&current).map(|idx| (false, idx)));
            let Some((in_suspended, idx)) = found else {
                warn!("abort_tree target has no live execution record");
                return;
            };
            let parent = if in_suspended {
                self.suspended[idx].parent.clone()
            } else {
                self.active[idx].parent.clone()
            };
            match parent.and_then(|w| w.upgrade()) {
                Some(p) => current = p,
                None => {
                    // Reached the root (or a severed link; what remains of
                    // the tree hangs off this record either way).
                    if in_suspended {
                        if self.suspended[idx].status != Some(Status::Aborted) {
                            self.suspended[idx].status = Some(Status::Aborted);
                            self.invoke_end(&current, Status::Aborted);
                        }
                    } else {
                        let record = self.active.remove(idx);
                        let already_aborted =
                            record.is_some_and(|r| r.status == Some(Status::Aborted));
                        if !already_aborted {
                            self.invoke_end(&current, Status::Aborted);
                        }
                    }
                    return;
                }
            }
        }
    }

    /// Terminates a node from outside the normal step loop.
    ///
    /// Used by events, semaphores, and background-worker completions to wake
    /// a suspended node. Dependent ancestors are updated immediately, not at
    /// the step boundary; `status` must be terminal. A node without a live
    /// record is ignored.
    pub fn force_end(&mut self, node: &NodeRef, status: Status) {
        if !status.is_terminal() {
            warn!(%status, "force_end called with a non-terminal status");
            debug_assert!(false, "force_end requires a terminal status");
            return;
        }
        if let Some(idx) = self.find_suspended(node) {
            let record = self.suspended.swap_remove(idx);
            self.process_node_end(record, status);
        } else if let Some(idx) = self.find_active(node) {
            if let Some(record) = self.active.remove(idx) {
                self.process_node_end(record, status);
            }
        }
    }

    /// True while any node, queued or suspended, is still tracked.
    ///
    /// Lets the driver stop ticking when idle.
    pub fn has_remaining_work(&self) -> bool {
        self.active.iter().any(|r| r.node.is_some()) || !self.suspended.is_empty()
    }

    /// Number of completed steps since this executor was created.
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Purges suspended records marked aborted during this step.
    fn cleanup(&mut self) {
        self.suspended.retain(|r| r.status != Some(Status::Aborted));
    }

    fn find_suspended(&self, node: &NodeRef) -> Option<usize> {
        self.suspended.iter().position(|r| r.refers_to(node))
    }

    fn find_active(&self, node: &NodeRef) -> Option<usize> {
        self.active.iter().position(|r| r.refers_to(node))
    }

    fn invoke_start(&mut self, node: &NodeRef) -> Status {
        let mut guard = node.borrow_mut();
        let mut cx = NodeCx::new(self, node);
        guard.start(&mut cx)
    }

    fn invoke_update(&mut self, node: &NodeRef, dt: f32) -> Status {
        let mut guard = node.borrow_mut();
        let mut cx = NodeCx::new(self, node);
        guard.update(&mut cx, dt)
    }

    fn invoke_end(&mut self, node: &NodeRef, status: Status) {
        match node.try_borrow_mut() {
            Ok(mut guard) => {
                let mut cx = NodeCx::new(self, node);
                guard.end(&mut cx, status);
            }
            Err(_) => debug!("skipping end on a node busy in reentrant teardown"),
        }
    }

    fn invoke_on_child_stopped(
        &mut self,
        parent: &NodeRef,
        status: Status,
        child: &NodeRef,
    ) -> Option<Status> {
        match parent.try_borrow_mut() {
            Ok(mut guard) => {
                let mut cx = NodeCx::new(self, parent);
                Some(guard.on_child_stopped(&mut cx, status, child))
            }
            Err(_) => {
                debug!("parent busy in reentrant teardown; treating as torn down");
                None
            }
        }
    }

    // -- background-completion plumbing --------------------------------

    pub(crate) fn register_completion(&mut self, node: &NodeRef) -> CompletionTicket {
        let id = self.next_ticket;
        self.next_ticket += 1;
        self.pending.insert(id, Rc::downgrade(node));
        CompletionTicket::new(id, self.completion_tx.clone())
    }

    pub(crate) fn cancel_ticket(&mut self, id: u64) {
        self.pending.remove(&id);
    }

    fn drain_completions(&mut self) {
        while let Ok(completion) = self.completion_rx.try_recv() {
            let Some(node) = self
                .pending
                .remove(&completion.ticket)
                .and_then(|w| w.upgrade())
            else {
                debug!("dropping completion for a node no longer tracked");
                continue;
            };
            self.force_end(&node, completion.status);
        }
    }

    fn debug_check_no_live_dependents(&self, node: &NodeRef) {
        #[cfg(debug_assertions)]
        {
            let dependent = self
                .suspended
                .iter()
                .chain(self.active.iter())
                .find(|r| r.status != Some(Status::Aborted) && r.parent_is(node));
            debug_assert!(
                dependent.is_none(),
                "aborted node still has a live dependent record"
            );
        }
        #[cfg(not(debug_assertions))]
        let _ = node;
    }
}
