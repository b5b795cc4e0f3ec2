//! Admission control for concurrently active branches.
//!
//! A [`Semaphore`] bounds how many guarded branches run at once. The guard
//! is a decorator-style gate node created by [`semaphore_scope`]: at start
//! it tries to take a slot, parking itself in a FIFO queue when none is
//! free; a released slot is handed directly to the queue head.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::warn;

use crate::builder::IntoNode;
use crate::decorator::{abort_child, start_child};
use crate::executor::Executor;
use crate::node::{Node, NodeCx, NodeRef};
use crate::status::Status;

type GateRef = Rc<RefCell<SemaphoreGate>>;

struct SemaphoreCore {
    max_active: usize,
    current_active: usize,
    queued: SmallVec<[GateRef; 1]>,
}

/// Cloneable handle to a counting semaphore for tree branches.
pub struct Semaphore {
    core: Rc<RefCell<SemaphoreCore>>,
}

impl Clone for Semaphore {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

/// Creates a semaphore admitting up to `max_active` guarded branches.
///
/// A zero capacity is a programming error; it is clamped to one with a
/// warning.
pub fn make_semaphore(max_active: usize) -> Semaphore {
    let max_active = if max_active == 0 {
        warn!("semaphore capacity must be positive; clamping to 1");
        debug_assert!(false, "semaphore created with zero capacity");
        1
    } else {
        max_active
    };
    Semaphore {
        core: Rc::new(RefCell::new(SemaphoreCore {
            max_active,
            current_active: 0,
            queued: SmallVec::new(),
        })),
    }
}

impl Semaphore {
    /// True if a gate starting now would be admitted immediately.
    pub fn is_available(&self) -> bool {
        let core = self.core.borrow();
        core.current_active < core.max_active
    }

    /// Number of currently admitted holders.
    pub fn active_count(&self) -> usize {
        self.core.borrow().current_active
    }

    /// Changes the capacity at runtime.
    ///
    /// Shrinking below the current holder count is tolerated (and warned
    /// about); running holders are unaffected and the surplus drains as they
    /// release. Growing synchronously admits queued gates, oldest first, up
    /// to the newly available capacity; each admission takes a slot.
    pub fn set_max_active(&self, exec: &mut Executor, new_max: usize) {
        let new_max = if new_max == 0 {
            warn!("semaphore capacity must be positive; clamping to 1");
            debug_assert!(false, "semaphore capacity set to zero");
            1
        } else {
            new_max
        };
        let to_start = {
            let mut core = self.core.borrow_mut();
            if new_max < core.current_active {
                warn!(
                    new_max,
                    current = core.current_active,
                    "semaphore capacity set below the current holder count"
                );
            }
            let admit = new_max
                .saturating_sub(core.max_active)
                .min(core.queued.len());
            let mut batch = Vec::new();
            if core.current_active == core.max_active && admit > 0 {
                batch.extend(core.queued.drain(..admit));
                core.current_active += batch.len();
            }
            core.max_active = new_max;
            batch
        };
        for gate in to_start {
            resume(&gate, exec);
        }
    }

    /// Admits `gate` or parks it in the wait queue.
    fn try_take(&self, gate: &GateRef) -> bool {
        let mut core = self.core.borrow_mut();
        if core.current_active < core.max_active {
            core.current_active += 1;
            true
        } else {
            core.queued.push(gate.clone());
            false
        }
    }

    /// Gives the held slot back: either directly to the queue head (counter
    /// unchanged) or to the pool.
    fn release(&self, exec: &mut Executor) {
        let next = {
            let mut core = self.core.borrow_mut();
            if core.queued.is_empty() {
                if core.current_active == 0 {
                    warn!("semaphore released with no active holder");
                    debug_assert!(false, "unbalanced semaphore release");
                } else {
                    core.current_active -= 1;
                }
                None
            } else {
                Some(core.queued.remove(0))
            }
        };
        if let Some(gate) = next {
            resume(&gate, exec);
        }
    }

    /// Removes a never-admitted gate from the wait queue.
    fn drop_from_queue(&self, gate: &GateRef) -> bool {
        let mut core = self.core.borrow_mut();
        let before = core.queued.len();
        core.queued.retain(|g| !Rc::ptr_eq(g, gate));
        core.queued.len() < before
    }
}

/// Hands the transferred slot to a previously queued gate by enqueueing its
/// guarded child under it.
fn resume(gate: &GateRef, exec: &mut Executor) {
    let child = {
        let mut this = gate.borrow_mut();
        this.waiting = false;
        this.child.clone()
    };
    let node: NodeRef = gate.clone();
    exec.enqueue_with_parent(&child, Some(Rc::downgrade(&node)));
}

/// Gate node guarding a single child with a semaphore slot.
///
/// Holds the slot for the lifetime of the guarded child and releases it when
/// the child stops or the gate is aborted; a gate aborted while still queued
/// is dropped from the queue instead.
struct SemaphoreGate {
    semaphore: Semaphore,
    child: NodeRef,
    self_weak: Weak<RefCell<SemaphoreGate>>,
    waiting: bool,
}

impl Node for SemaphoreGate {
    fn start(&mut self, cx: &mut NodeCx<'_>) -> Status {
        let Some(me) = self.self_weak.upgrade() else {
            return Status::Failed;
        };
        if self.semaphore.try_take(&me) {
            self.waiting = false;
            start_child(cx, &self.child)
        } else {
            self.waiting = true;
            Status::Suspended
        }
    }

    fn on_child_stopped(&mut self, cx: &mut NodeCx<'_>, status: Status, _child: &NodeRef) -> Status {
        self.semaphore.release(cx.executor());
        status
    }

    fn end(&mut self, cx: &mut NodeCx<'_>, status: Status) {
        let child = self.child.clone();
        abort_child(cx, status, &child);
        if self.waiting {
            self.waiting = false;
            if let Some(me) = self.self_weak.upgrade() {
                let dropped = self.semaphore.drop_from_queue(&me);
                debug_assert!(dropped, "queued gate missing from its semaphore");
            }
        } else if status == Status::Aborted {
            // Aborted while holding; a natural child stop released already.
            self.semaphore.release(cx.executor());
        }
    }
}

/// Wraps `body` so it only runs while a semaphore slot is held.
pub fn semaphore_scope<M>(semaphore: &Semaphore, body: impl IntoNode<M>) -> NodeRef {
    let gate = Rc::new_cyclic(|weak: &Weak<RefCell<SemaphoreGate>>| {
        RefCell::new(SemaphoreGate {
            semaphore: semaphore.clone(),
            child: body.into_node(),
            self_weak: weak.clone(),
            waiting: false,
        })
    });
    gate
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::*;
    use crate::node::var;
    use crate::nodes;

    fn run_to_idle(exec: &mut Executor) {
        for _ in 0..100 {
            if !exec.has_remaining_work() {
                return;
            }
            exec.step(0.1);
        }
        panic!("executor did not go idle");
    }

    #[test]
    fn admissions_are_bounded_and_fifo() {
        let order = var(Vec::<&'static str>::new());
        let sem = make_semaphore(1);
        let mut exec = Executor::new();
        for name in ["a", "b", "c"] {
            let order = order.clone();
            let body = sequence(nodes![
                move || order.with(|o| o.push(name)),
                wait(0.15),
            ]);
            let tree = semaphore_scope(&sem, body);
            exec.enqueue(&tree);
        }
        exec.step(0.1);
        // Enqueue order is LIFO within the step, so "c" started first and
        // holds the slot; the others queued in the order they started.
        assert_eq!(order.get(), vec!["c"]);
        assert_eq!(sem.active_count(), 1);
        run_to_idle(&mut exec);
        assert_eq!(order.get(), vec!["c", "b", "a"]);
        assert_eq!(sem.active_count(), 0);
    }

    #[test]
    fn released_slot_transfers_to_the_queue_head() {
        let sem = make_semaphore(1);
        let mut exec = Executor::new();
        let first = semaphore_scope(&sem, wait(0.15));
        let second = semaphore_scope(&sem, wait(0.15));
        exec.enqueue(&first);
        exec.step(0.1);
        exec.enqueue(&second);
        exec.step(0.1);
        // First finished this step and handed the slot over directly.
        assert_eq!(sem.active_count(), 1);
        run_to_idle(&mut exec);
        assert_eq!(sem.active_count(), 0);
    }

    #[test]
    fn growing_capacity_admits_queued_gates() {
        let running = var(0u32);
        let sem = make_semaphore(1);
        let mut exec = Executor::new();
        for _ in 0..3 {
            let running = running.clone();
            let tree = semaphore_scope(
                &sem,
                sequence(nodes![move || running.with(|r| *r += 1), wait(1.0)]),
            );
            exec.enqueue(&tree);
        }
        exec.step(0.1);
        assert_eq!(running.get(), 1);

        sem.set_max_active(&mut exec, 2);
        assert_eq!(sem.active_count(), 2, "one queued gate admitted with a slot");
        exec.step(0.1);
        assert_eq!(running.get(), 2);
        assert_eq!(sem.active_count(), 2, "counter never exceeds the capacity");
    }

    #[test]
    fn aborting_a_queued_gate_drops_it_from_the_queue() {
        let started = var(false);
        let sem = make_semaphore(1);
        let mut exec = Executor::new();
        let holder = semaphore_scope(&sem, wait(0.25));
        let queued = {
            let started = started.clone();
            semaphore_scope(&sem, action(move || started.set(true)))
        };
        exec.enqueue(&holder);
        exec.step(0.1);
        exec.enqueue(&queued);
        exec.step(0.1);
        assert_eq!(sem.active_count(), 1);

        exec.abort_tree(&queued);
        run_to_idle(&mut exec);
        assert!(!started.get(), "dropped gate never runs its body");
        assert_eq!(sem.active_count(), 0);
    }

    #[test]
    fn aborting_a_holder_releases_its_slot() {
        let sem = make_semaphore(1);
        let mut exec = Executor::new();
        let holder = semaphore_scope(&sem, wait_forever());
        exec.enqueue(&holder);
        exec.step(0.1);
        assert_eq!(sem.active_count(), 1);
        exec.abort_tree(&holder);
        exec.step(0.1);
        assert_eq!(sem.active_count(), 0);
        assert!(sem.is_available());
    }
}
