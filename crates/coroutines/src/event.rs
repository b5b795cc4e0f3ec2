//! Broadcast/listener decoupling.
//!
//! An [`Event`] lets one branch of a tree (or code outside any tree) wake
//! suspended listeners elsewhere. A listener is itself a node: it registers
//! with the event at start, parks itself, and is force-ended when the event
//! broadcasts. What the listener reports is derived from its callback: no
//! callback completes it, a boolean callback chooses success or failure, and
//! a node-returning callback makes the listener stand in for the produced
//! node, mirroring its terminal status.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::debug;

use crate::executor::Executor;
use crate::node::{Node, NodeCx, NodeRef};
use crate::status::Status;

type ListenerRef<T> = Rc<RefCell<EventListener<T>>>;

struct EventCore<T: 'static> {
    listeners: SmallVec<[ListenerRef<T>; 1]>,
}

/// Cloneable handle to a broadcastable event carrying values of type `T`.
///
/// Listeners hold only a weak back-reference; dropping every handle while a
/// listener still waits makes that listener fail at its next start instead
/// of dangling.
pub struct Event<T: 'static = ()> {
    core: Rc<RefCell<EventCore<T>>>,
}

impl<T: 'static> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

/// Creates a new event.
pub fn make_event<T: 'static>() -> Event<T> {
    Event {
        core: Rc::new(RefCell::new(EventCore {
            listeners: SmallVec::new(),
        })),
    }
}

impl<T: Clone + 'static> Event<T> {
    /// Delivers `value` to every currently registered listener.
    ///
    /// The listener list is snapshotted and cleared first, so a listener
    /// (re)registered from inside a callback only sees later broadcasts.
    /// Broadcasting with no listeners is a no-op. Only valid on the
    /// scheduling thread.
    pub fn broadcast(&self, exec: &mut Executor, value: T) {
        let listeners = std::mem::take(&mut self.core.borrow_mut().listeners);
        for listener in listeners {
            EventListener::receive(&listener, exec, value.clone());
        }
    }
}

impl<T: 'static> Event<T> {
    /// Fails every still-registered listener.
    ///
    /// Call when the event's owner goes away, so waiting branches observe a
    /// failure instead of waiting forever.
    pub fn abort_listeners(&self, exec: &mut Executor) {
        let listeners = std::mem::take(&mut self.core.borrow_mut().listeners);
        for listener in listeners {
            let node: NodeRef = listener;
            exec.force_end(&node, Status::Failed);
        }
    }
}

enum ListenerAction<T> {
    Complete,
    Notify(Box<dyn FnMut(T)>),
    Check(Box<dyn FnMut(T) -> bool>),
    Spawn(Box<dyn FnMut(T) -> NodeRef>),
}

/// Node that suspends until its event broadcasts.
struct EventListener<T: 'static> {
    event: Weak<RefCell<EventCore<T>>>,
    action: ListenerAction<T>,
    self_weak: Weak<RefCell<EventListener<T>>>,
    spawned: Option<NodeRef>,
}

impl<T: 'static> EventListener<T> {
    fn receive(listener: &ListenerRef<T>, exec: &mut Executor, value: T) {
        let node: NodeRef = listener.clone();
        let immediate = {
            let mut this = listener.borrow_mut();
            match &mut this.action {
                ListenerAction::Complete => Some(Status::Completed),
                ListenerAction::Notify(f) => {
                    f(value);
                    Some(Status::Completed)
                }
                ListenerAction::Check(f) => Some(if f(value) {
                    Status::Completed
                } else {
                    Status::Failed
                }),
                ListenerAction::Spawn(f) => {
                    // Stand-in: keep waiting, mirror the produced node.
                    let child = f(value);
                    exec.enqueue_with_parent(&child, Some(Rc::downgrade(&node)));
                    this.spawned = Some(child);
                    None
                }
            }
        };
        if let Some(status) = immediate {
            // No-op if the listener is no longer tracked by the executor.
            exec.force_end(&node, status);
        }
    }
}

impl<T: 'static> Node for EventListener<T> {
    fn start(&mut self, _cx: &mut NodeCx<'_>) -> Status {
        let Some(core) = self.event.upgrade() else {
            debug!("listener started on a dropped event");
            return Status::Failed;
        };
        let Some(me) = self.self_weak.upgrade() else {
            return Status::Failed;
        };
        let mut core = core.borrow_mut();
        debug_assert!(
            !core.listeners.iter().any(|l| Rc::ptr_eq(l, &me)),
            "listener registered twice"
        );
        core.listeners.push(me);
        Status::Suspended
    }

    fn end(&mut self, cx: &mut NodeCx<'_>, status: Status) {
        if status == Status::Aborted {
            // A broadcast already consumed the registration otherwise.
            if let (Some(core), Some(me)) = (self.event.upgrade(), self.self_weak.upgrade()) {
                core.borrow_mut().listeners.retain(|l| !Rc::ptr_eq(l, &me));
            }
            if let Some(child) = self.spawned.take() {
                cx.abort(&child);
            }
        }
    }
}

fn listener<T: 'static>(event: &Event<T>, action: ListenerAction<T>) -> NodeRef {
    let listener = Rc::new_cyclic(|weak: &Weak<RefCell<EventListener<T>>>| {
        RefCell::new(EventListener {
            event: Rc::downgrade(&event.core),
            action,
            self_weak: weak.clone(),
            spawned: None,
        })
    });
    listener
}

/// Suspends until the event broadcasts, then completes.
pub fn wait_for<T: 'static>(event: &Event<T>) -> NodeRef {
    listener(event, ListenerAction::Complete)
}

/// Suspends until the event broadcasts, runs the callback, completes.
pub fn wait_for_with<T: 'static>(event: &Event<T>, f: impl FnMut(T) + 'static) -> NodeRef {
    listener(event, ListenerAction::Notify(Box::new(f)))
}

/// Suspends until the event broadcasts; the callback decides success.
pub fn wait_for_check<T: 'static>(event: &Event<T>, f: impl FnMut(T) -> bool + 'static) -> NodeRef {
    listener(event, ListenerAction::Check(Box::new(f)))
}

/// Suspends until the event broadcasts, then runs the node the callback
/// produces and mirrors its terminal status.
pub fn wait_for_spawn<T: 'static>(
    event: &Event<T>,
    f: impl FnMut(T) -> NodeRef + 'static,
) -> NodeRef {
    listener(event, ListenerAction::Spawn(Box::new(f)))
}
