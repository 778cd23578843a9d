//! Scroll position capture and restoration.
//!
//! Before a navigation commits, the offsets of every configured scroll
//! target are recorded under the origin's full path. One tick after the
//! navigation commits, each target is restored according to its
//! [`ScrollHandler`]. History replays (`back`, `forward`, `go`) are not
//! captured, so the position they are about to restore is not overwritten.
//!
//! The host supplies scroll targets through [`ScrollSurface`]; this module
//! never touches a real view.

use crate::direction::Direction;
use crate::error::PluginError;
use crate::guards::{guard_fn, GuardId, NavigationAction};
use crate::hooks::{hook_fn, Hook, HookEvent, HookId, NavigationEvent};
use crate::plugin::{on_cleanup, Plugin, PluginContext};
use crate::route::Route;
use crate::storage::PersistedCell;
use crate::{plugin_warn, trace_log};
use futures::future::{FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

const PLUGIN: &str = "scroll";

/// Selector of the top-level viewport.
pub const WINDOW: &str = "window";

// ============================================================================
// Host surface
// ============================================================================

/// Scroll offsets of one target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrollPosition {
    pub left: f64,
    pub top: f64,
}

impl ScrollPosition {
    pub const ZERO: Self = Self { left: 0.0, top: 0.0 };

    pub fn new(left: f64, top: f64) -> Self {
        Self { left, top }
    }
}

/// A scrollable host element.
pub trait ScrollElement {
    fn position(&self) -> ScrollPosition;
    fn scroll_to(&self, position: ScrollPosition);
}

/// Resolves selectors to mounted scroll targets.
pub trait ScrollSurface {
    /// Target for `selector`, if it is currently mounted.
    fn element(&self, selector: &str) -> Option<Rc<dyn ScrollElement>>;
}

// ============================================================================
// Handlers
// ============================================================================

/// Everything a custom handler gets to decide on.
pub struct ScrollContext {
    pub to: Route,
    pub from: Route,
    pub selector: String,
    pub element: Rc<dyn ScrollElement>,
    pub direction: Direction,
    /// Position recorded for `to`, if any (always `None` for non-backward
    /// navigations when only backward restores are enabled).
    pub saved: Option<ScrollPosition>,
    /// Whether restoration was requested through [`Scroll::trigger`].
    pub is_manual: bool,
}

impl fmt::Debug for ScrollContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrollContext")
            .field("to", &self.to.full_path)
            .field("from", &self.from.full_path)
            .field("selector", &self.selector)
            .field("direction", &self.direction)
            .field("saved", &self.saved)
            .field("is_manual", &self.is_manual)
            .finish_non_exhaustive()
    }
}

/// Outcome of a custom handler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollDecision {
    /// Leave the target alone.
    Skip,
    /// Restore the saved position (or the top when there is none).
    UseSaved,
    /// Scroll to this position.
    Position(ScrollPosition),
}

/// What to do with one target after navigation.
#[derive(Clone)]
pub enum ScrollHandler {
    /// Restore the saved position, or scroll to the top.
    Restore,
    /// Always scroll to the top.
    Top,
    Custom(Rc<dyn Fn(&ScrollContext) -> ScrollDecision>),
}

impl ScrollHandler {
    pub fn custom(f: impl Fn(&ScrollContext) -> ScrollDecision + 'static) -> Self {
        Self::Custom(Rc::new(f))
    }
}

impl fmt::Debug for ScrollHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restore => write!(f, "ScrollHandler::Restore"),
            Self::Top => write!(f, "ScrollHandler::Top"),
            Self::Custom(_) => write!(f, "ScrollHandler::Custom(..)"),
        }
    }
}

/// Scroll plugin configuration.
#[derive(Debug, Clone)]
pub struct ScrollOptions {
    selectors: Vec<(String, ScrollHandler)>,
    only_backward: bool,
}

impl Default for ScrollOptions {
    /// Restore the window only.
    fn default() -> Self {
        Self {
            selectors: vec![(WINDOW.to_string(), ScrollHandler::Restore)],
            only_backward: false,
        }
    }
}

impl ScrollOptions {
    /// Options with no targets.
    pub fn empty() -> Self {
        Self {
            selectors: Vec::new(),
            only_backward: false,
        }
    }

    /// Configure `selector`, replacing an earlier handler for it.
    #[must_use]
    pub fn selector(mut self, selector: impl Into<String>, handler: ScrollHandler) -> Self {
        let selector = selector.into();
        self.selectors.retain(|(s, _)| *s != selector);
        self.selectors.push((selector, handler));
        self
    }

    /// Only hand saved positions to backward navigations.
    #[must_use]
    pub fn only_backward(mut self) -> Self {
        self.only_backward = true;
        self
    }
}

// ============================================================================
// Scroll
// ============================================================================

type Positions = BTreeMap<String, BTreeMap<String, ScrollPosition>>;

struct Bound {
    ctx: PluginContext,
    positions: PersistedCell<Positions>,
}

struct ScrollInner {
    surface: Rc<dyn ScrollSurface>,
    options: ScrollOptions,
    bound: RefCell<Option<Bound>>,
    guard: RefCell<Option<GuardId>>,
    hook_ids: RefCell<Vec<HookId>>,
}

/// Scroll restoration plugin.
#[derive(Clone)]
pub struct Scroll {
    inner: Rc<ScrollInner>,
}

impl fmt::Debug for Scroll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scroll")
            .field("options", &self.inner.options)
            .field("bound", &self.inner.bound.borrow().is_some())
            .finish_non_exhaustive()
    }
}

impl Scroll {
    pub fn new(surface: Rc<dyn ScrollSurface>, options: ScrollOptions) -> Self {
        Self {
            inner: Rc::new(ScrollInner {
                surface,
                options,
                bound: RefCell::new(None),
                guard: RefCell::new(None),
                hook_ids: RefCell::new(Vec::new()),
            }),
        }
    }

    fn bound(&self) -> Result<(PluginContext, PersistedCell<Positions>), PluginError> {
        self.inner
            .bound
            .borrow()
            .as_ref()
            .map(|bound| (bound.ctx.clone(), bound.positions.clone()))
            .ok_or(PluginError::NotBound { plugin: PLUGIN })
    }

    /// Position recorded for `selector` when leaving `full_path`.
    pub fn saved(&self, full_path: &str, selector: &str) -> Result<Option<ScrollPosition>, PluginError> {
        let (_, positions) = self.bound()?;
        Ok(positions.with(|p| p.get(full_path).and_then(|s| s.get(selector)).copied()))
    }

    /// Record the current offsets of every mounted target under `route`.
    pub async fn capture(&self, route: &Route) -> Result<(), PluginError> {
        let (_, positions) = self.bound()?;
        let captured: BTreeMap<String, ScrollPosition> = self
            .inner
            .options
            .selectors
            .iter()
            .filter_map(|(selector, _)| {
                let element = self.inner.surface.element(selector)?;
                Some((selector.clone(), element.position()))
            })
            .collect();
        if captured.is_empty() {
            return Ok(());
        }
        trace_log!("Captured {} scroll targets for '{}'", captured.len(), route.full_path);
        let key = route.full_path.clone();
        positions.update(|p| p.entry(key).or_default().extend(captured)).await;
        Ok(())
    }

    /// Re-run restoration for the current route as a manual, unchanged
    /// navigation.
    pub fn trigger(&self) -> Result<(), PluginError> {
        let (ctx, _) = self.bound()?;
        let current = ctx.navigator().current_route();
        self.restore(&current, &current, Direction::Unchanged, true)
    }

    fn restore(
        &self,
        to: &Route,
        from: &Route,
        direction: Direction,
        is_manual: bool,
    ) -> Result<(), PluginError> {
        let (_, positions) = self.bound()?;
        let use_saved = !self.inner.options.only_backward || direction.is_backward();

        for (selector, handler) in &self.inner.options.selectors {
            let Some(element) = self.inner.surface.element(selector) else {
                continue;
            };
            let saved = if use_saved {
                positions.with(|p| p.get(&to.full_path).and_then(|s| s.get(selector)).copied())
            } else {
                None
            };

            let target = match handler {
                ScrollHandler::Restore => Some(saved.unwrap_or_default()),
                ScrollHandler::Top => Some(ScrollPosition::ZERO),
                ScrollHandler::Custom(decide) => {
                    let ctx = ScrollContext {
                        to: to.clone(),
                        from: from.clone(),
                        selector: selector.clone(),
                        element: Rc::clone(&element),
                        direction,
                        saved,
                        is_manual,
                    };
                    match decide(&ctx) {
                        ScrollDecision::Skip => None,
                        ScrollDecision::UseSaved => Some(saved.unwrap_or_default()),
                        ScrollDecision::Position(position) => Some(position),
                    }
                }
            };

            if let Some(position) = target {
                trace_log!("Scrolling '{}' to {:?}", selector, position);
                element.scroll_to(position);
            }
        }
        Ok(())
    }

    fn schedule_restore(inner: Weak<ScrollInner>, nav: NavigationEvent) -> Result<(), PluginError> {
        let Some(strong) = inner.upgrade() else {
            return Ok(());
        };
        let (ctx, _) = Scroll { inner: strong }.bound()?;
        ctx.scheduler().next_tick(Box::new(move || {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            if let Err(e) = (Scroll { inner }).restore(&nav.to, &nav.from, nav.direction, false) {
                plugin_warn!(PLUGIN, "{}", e);
            }
        }));
        Ok(())
    }
}

impl Plugin for Scroll {
    fn name(&self) -> &'static str {
        PLUGIN
    }

    fn install<'a>(&'a self, ctx: &'a PluginContext) -> LocalBoxFuture<'a, Result<(), PluginError>> {
        async move {
            let positions =
                PersistedCell::persisted(ctx.storage_key("scroll"), Positions::new(), ctx.storage());
            positions
                .hydrate(|mut stored, session| {
                    stored.extend(session);
                    stored
                })
                .await;
            *self.inner.bound.borrow_mut() = Some(Bound {
                ctx: ctx.clone(),
                positions,
            });

            let weak = Rc::downgrade(&self.inner);
            let guard = ctx.router().before_resolve(guard_fn(move |to, from| {
                let inner = weak.upgrade();
                async move {
                    if let Some(inner) = inner {
                        if !to.is_pop() && !from.matched.is_empty() {
                            if let Err(e) = (Scroll { inner }).capture(&from).await {
                                plugin_warn!(PLUGIN, "{}", e);
                            }
                        }
                    }
                    NavigationAction::Continue
                }
            }));
            *self.inner.guard.borrow_mut() = Some(guard);

            let weak = Rc::downgrade(&self.inner);
            let end = ctx.hooks().on(
                Hook::DirectionEnd,
                hook_fn(move |event| {
                    if let HookEvent::Navigation(nav) = event {
                        if let Err(e) = Scroll::schedule_restore(Weak::clone(&weak), nav) {
                            plugin_warn!(PLUGIN, "{}", e);
                        }
                    }
                    async { NavigationAction::Continue }
                }),
            );

            let weak = Rc::downgrade(&self.inner);
            let cleanup = on_cleanup(ctx.hooks(), move || {
                let inner = weak.upgrade();
                async move {
                    let Some(inner) = inner else {
                        return;
                    };
                    let positions = (Scroll { inner }).bound().map(|(_, positions)| positions);
                    if let Ok(positions) = positions {
                        positions.clear().await;
                    }
                }
            });
            self.inner.hook_ids.borrow_mut().extend([end, cleanup]);
            Ok(())
        }
        .boxed_local()
    }

    fn uninstall<'a>(&'a self, ctx: &'a PluginContext) -> LocalBoxFuture<'a, ()> {
        async move {
            if let Some(guard) = self.inner.guard.borrow_mut().take() {
                ctx.router().remove_guard(guard);
            }
            for id in self.inner.hook_ids.borrow_mut().drain(..) {
                ctx.hooks().off(id);
            }
            self.inner.bound.borrow_mut().take();
        }
        .boxed_local()
    }
}
