//! Synchronous event emitter used to notify adapters
//!
//! Listeners run in registration order on the caller's stack. A listener
//! that returns an error or panics is logged and skipped; it never stops the
//! remaining listeners or the engine.

use anyhow::Result;
use derive_more::Display;
use log::{debug, error};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tree_model::NodeKey;

use crate::drag_drop::DropPosition;
use crate::state::{IdSet, TreeState};

/// The kinds of events emitted by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum TreeEventKind {
    #[display(fmt = "select")]
    Select,
    #[display(fmt = "expand")]
    Expand,
    #[display(fmt = "collapse")]
    Collapse,
    #[display(fmt = "search")]
    Search,
    #[display(fmt = "drag-start")]
    DragStart,
    #[display(fmt = "drag-end")]
    DragEnd,
    #[display(fmt = "drop")]
    Drop,
    #[display(fmt = "load-start")]
    LoadStart,
    #[display(fmt = "load-success")]
    LoadSuccess,
    #[display(fmt = "load-error")]
    LoadError,
    #[display(fmt = "load-cancel")]
    LoadCancel,
    /// Data was replaced or nodes were added, removed, updated or moved
    #[display(fmt = "change")]
    Change,
}

impl TreeEventKind {
    /// Events emitted before their state change is committed, which a
    /// listener may veto with [`TreeEvent::prevent_default`].
    pub fn is_cancelable(self) -> bool {
        matches!(
            self,
            TreeEventKind::Drop | TreeEventKind::LoadStart | TreeEventKind::LoadSuccess
        )
    }
}

/// Where a dropped node is about to land
#[derive(Debug, Clone, PartialEq)]
pub struct DropDetails {
    pub target: NodeKey,
    pub position: DropPosition,
}

/// An event delivered to listeners
#[derive(Debug, Clone)]
pub struct TreeEvent {
    pub kind: TreeEventKind,
    /// The node(s) the event is about
    pub nodes: Vec<NodeKey>,
    pub selected_ids: Arc<IdSet>,
    pub expanded_ids: Arc<IdSet>,
    pub matched_ids: Arc<IdSet>,
    pub loading_ids: Arc<IdSet>,
    pub keyword: Option<String>,
    pub drop: Option<DropDetails>,
    pub error: Option<String>,
    default_prevented: bool,
}

impl TreeEvent {
    /// Build an event carrying the id sets of `state`.
    pub fn new(kind: TreeEventKind, nodes: Vec<NodeKey>, state: &TreeState) -> Self {
        Self {
            kind,
            nodes,
            selected_ids: Arc::clone(&state.selected_ids),
            expanded_ids: Arc::clone(&state.expanded_ids),
            matched_ids: Arc::clone(&state.matched_ids),
            loading_ids: Arc::clone(&state.loading_ids),
            keyword: None,
            drop: None,
            error: None,
            default_prevented: false,
        }
    }

    pub fn with_keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn with_drop(mut self, target: NodeKey, position: DropPosition) -> Self {
        self.drop = Some(DropDetails { target, position });
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Veto the default effect of a cancelable event.
    ///
    /// Has no effect on events that are not cancelable.
    pub fn prevent_default(&mut self) {
        if self.kind.is_cancelable() {
            self.default_prevented = true;
        } else {
            debug!("prevent_default() ignored for non-cancelable `{}`", self.kind);
        }
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// Handle returned when registering a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display(fmt = "listener#{}", _0)]
pub struct ListenerId(u64);

type Handler = Box<dyn FnMut(&mut TreeEvent) -> Result<()>>;

struct Listener {
    id: ListenerId,
    kind: TreeEventKind,
    once: bool,
    handler: Handler,
}

#[derive(Default)]
pub struct EventEmitter {
    listeners: Vec<Listener>,
    next_id: u64,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn register<F>(&mut self, kind: TreeEventKind, once: bool, handler: F) -> ListenerId
    where
        F: FnMut(&mut TreeEvent) -> Result<()> + 'static,
    {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push(Listener {
            id,
            kind,
            once,
            handler: Box::new(handler),
        });
        id
    }

    /// Register a listener for every event of `kind`.
    pub fn on<F>(&mut self, kind: TreeEventKind, handler: F) -> ListenerId
    where
        F: FnMut(&mut TreeEvent) -> Result<()> + 'static,
    {
        self.register(kind, false, handler)
    }

    /// Register a listener that is dropped after its first invocation.
    pub fn once<F>(&mut self, kind: TreeEventKind, handler: F) -> ListenerId
    where
        F: FnMut(&mut TreeEvent) -> Result<()> + 'static,
    {
        self.register(kind, true, handler)
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self, kind: TreeEventKind) -> usize {
        self.listeners.iter().filter(|l| l.kind == kind).count()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    /// Deliver `event` to every listener of its kind.
    ///
    /// Returns false if a listener prevented the default effect.
    pub fn emit(&mut self, event: &mut TreeEvent) -> bool {
        let kind = event.kind;
        let mut spent = Vec::new();
        for listener in self.listeners.iter_mut().filter(|l| l.kind == kind) {
            let context = format!("{} for `{}`", listener.id, kind);
            call_isolated(&context, || (listener.handler)(event));
            if listener.once {
                spent.push(listener.id);
            }
        }
        if !spent.is_empty() {
            self.listeners.retain(|l| !spent.contains(&l.id));
        }
        !event.is_default_prevented()
    }
}

/// Run a callback, logging its error or panic instead of propagating it.
pub(crate) fn call_isolated<F>(context: &str, callback: F)
where
    F: FnOnce() -> Result<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!("{} failed: {:#}", context, err),
        Err(payload) => error!("{} panicked: {}", context, panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
