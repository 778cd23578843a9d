//! Hook bus for cross-plugin communication.
//!
//! The navigator broadcasts navigation lifecycle events on the bus; plugins
//! and the application subscribe to them. Handlers of one hook run in
//! subscription order, one at a time.
//!
//! Start-of-navigation hooks go out through [`HookBus::emit`]: the first
//! handler returning anything other than [`NavigationAction::Continue`]
//! stops the broadcast and vetoes or redirects the navigation. Every other
//! hook goes out through [`HookBus::notify`] and reaches all handlers.
//!
//! | Hook                   | Fired                                          |
//! |------------------------|------------------------------------------------|
//! | `cleanup`              | plugin host teardown                           |
//! | `router:direction`     | navigation starting, any direction             |
//! | `router:forward`       | navigation starting, forward                   |
//! | `router:backward`      | navigation starting, backward                  |
//! | `router:direction:end` | navigation committed, any direction            |
//! | `router:forward:end`   | navigation committed, forward                  |
//! | `router:backward:end`  | navigation committed, backward                 |
//! | `router:details`       | a payload was delivered to the target route    |

use crate::details::RouteDetails;
use crate::direction::Direction;
use crate::error::NavigationFailure;
use crate::guards::NavigationAction;
use crate::route::Route;
use crate::trace_log;
use futures::future::{FutureExt, LocalBoxFuture};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

// ============================================================================
// Hook names
// ============================================================================

/// Named hook on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Cleanup,
    Direction,
    DirectionEnd,
    Forward,
    ForwardEnd,
    Backward,
    BackwardEnd,
    Details,
}

impl Hook {
    /// Wire name of the hook.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cleanup => "cleanup",
            Self::Direction => "router:direction",
            Self::DirectionEnd => "router:direction:end",
            Self::Forward => "router:forward",
            Self::ForwardEnd => "router:forward:end",
            Self::Backward => "router:backward",
            Self::BackwardEnd => "router:backward:end",
            Self::Details => "router:details",
        }
    }

    /// Parse a wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "cleanup" => Self::Cleanup,
            "router:direction" => Self::Direction,
            "router:direction:end" => Self::DirectionEnd,
            "router:forward" => Self::Forward,
            "router:forward:end" => Self::ForwardEnd,
            "router:backward" => Self::Backward,
            "router:backward:end" => Self::BackwardEnd,
            "router:details" => Self::Details,
            _ => return None,
        })
    }

    /// Direction-specific start or end hook, if the direction has one.
    pub fn for_direction(direction: Direction, end: bool) -> Option<Self> {
        match (direction, end) {
            (Direction::Forward, false) => Some(Self::Forward),
            (Direction::Forward, true) => Some(Self::ForwardEnd),
            (Direction::Backward, false) => Some(Self::Backward),
            (Direction::Backward, true) => Some(Self::BackwardEnd),
            (Direction::Unchanged, _) => None,
        }
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Events
// ============================================================================

/// Navigation lifecycle event.
#[derive(Debug, Clone)]
pub struct NavigationEvent {
    pub direction: Direction,
    pub to: Route,
    pub from: Route,
    /// Always `None` for end hooks, which only fire on commit.
    pub failure: Option<NavigationFailure>,
}

/// Arguments passed to hook handlers.
#[derive(Debug, Clone)]
pub enum HookEvent {
    Cleanup,
    Navigation(NavigationEvent),
    Details { to: Route, details: RouteDetails },
}

impl HookEvent {
    /// Navigation arguments, for navigation hooks.
    pub fn navigation(&self) -> Option<&NavigationEvent> {
        match self {
            Self::Navigation(event) => Some(event),
            _ => None,
        }
    }
}

// ============================================================================
// HookBus
// ============================================================================

/// Handle returned by [`HookBus::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookId(usize);

/// Hook handler.
pub type HookHandler = Rc<dyn Fn(HookEvent) -> LocalBoxFuture<'static, NavigationAction>>;

/// Create a [`HookHandler`] from an async closure.
pub fn hook_fn<F, Fut>(f: F) -> HookHandler
where
    F: Fn(HookEvent) -> Fut + 'static,
    Fut: Future<Output = NavigationAction> + 'static,
{
    Rc::new(move |event| f(event).boxed_local())
}

struct Entry {
    id: HookId,
    hook: Hook,
    once: bool,
    handler: HookHandler,
}

/// In-process event bus keyed by [`Hook`].
#[derive(Clone, Default)]
pub struct HookBus {
    inner: Rc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    entries: RefCell<Vec<Entry>>,
    next_id: Cell<usize>,
}

impl fmt::Debug for HookBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookBus")
            .field("handlers", &self.inner.entries.borrow().len())
            .finish()
    }
}

impl HookBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a hook.
    pub fn on(&self, hook: Hook, handler: HookHandler) -> HookId {
        self.register(hook, handler, false)
    }

    /// Subscribe for a single emission.
    pub fn once(&self, hook: Hook, handler: HookHandler) -> HookId {
        self.register(hook, handler, true)
    }

    /// Subscribe with a synchronous observer that never vetoes.
    pub fn on_sync(&self, hook: Hook, f: impl Fn(&HookEvent) + 'static) -> HookId {
        self.on(
            hook,
            Rc::new(move |event| {
                f(&event);
                async { NavigationAction::Continue }.boxed_local()
            }),
        )
    }

    /// Unsubscribe; returns `false` if the handler was not registered.
    pub fn off(&self, id: HookId) -> bool {
        let mut entries = self.inner.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }

    /// Number of handlers subscribed to `hook`.
    pub fn handler_count(&self, hook: Hook) -> usize {
        self.inner
            .entries
            .borrow()
            .iter()
            .filter(|entry| entry.hook == hook)
            .count()
    }

    /// Broadcast an event.
    ///
    /// Handlers run in subscription order. The first result other than
    /// `Continue` stops the broadcast and is returned. Handlers subscribed
    /// while the broadcast runs are not called until the next one.
    pub async fn emit(&self, hook: Hook, event: HookEvent) -> NavigationAction {
        let handlers = self.take_handlers(hook);
        trace_log!("Emitting '{}' to {} handlers", hook, handlers.len());

        for handler in handlers {
            let action = handler(event.clone()).await;
            if !action.is_continue() {
                trace_log!("'{}' handler returned {:?}", hook, action);
                return action;
            }
        }
        NavigationAction::Continue
    }

    /// Deliver `event` to every handler of `hook`, ignoring their results.
    ///
    /// Used for hooks that report something that already happened, where
    /// no handler can veto anything.
    pub async fn notify(&self, hook: Hook, event: HookEvent) {
        let handlers = self.take_handlers(hook);
        trace_log!("Notifying {} handlers of '{}'", handlers.len(), hook);

        for handler in handlers {
            let action = handler(event.clone()).await;
            if !action.is_continue() {
                trace_log!("'{}' handler returned {:?}; ignored", hook, action);
            }
        }
    }

    /// Snapshot the handlers of `hook`, dropping `once` entries.
    fn take_handlers(&self, hook: Hook) -> Vec<HookHandler> {
        let mut entries = self.inner.entries.borrow_mut();
        let handlers = entries
            .iter()
            .filter(|entry| entry.hook == hook)
            .map(|entry| Rc::clone(&entry.handler))
            .collect();
        entries.retain(|entry| !(entry.once && entry.hook == hook));
        handlers
    }

    /// Remove every handler.
    pub fn clear(&self) {
        self.inner.entries.borrow_mut().clear();
    }

    fn register(&self, hook: Hook, handler: HookHandler, once: bool) -> HookId {
        let id = HookId(self.inner.next_id.get());
        self.inner.next_id.set(id.0 + 1);
        self.inner.entries.borrow_mut().push(Entry {
            id,
            hook,
            once,
            handler,
        });
        id
    }
}
