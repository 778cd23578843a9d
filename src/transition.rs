//! Route transition selection
//!
//! [`TransitionPlugin`] picks an enter/exit animation for every navigation
//! from its classified direction, as soon as the direction is known. The
//! host reads the choice with [`TransitionPlugin::current`] when it renders
//! the incoming page.
//!
//! A route can force its own animation with a `"transition"` meta entry
//! holding a transition name (`"none"`, `"fade"`, `"slide-left"`, ...).

use crate::direction::Direction;
use crate::error::PluginError;
use crate::guards::NavigationAction;
use crate::hooks::{hook_fn, Hook, HookEvent, HookId};
use crate::plugin::{Plugin, PluginContext};
use crate::trace_log;
use futures::future::{FutureExt, LocalBoxFuture};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// Direction for slide transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideDirection {
    /// Slide from left to right
    Left,
    /// Slide from right to left
    Right,
    /// Slide from top to bottom
    Up,
    /// Slide from bottom to top
    Down,
}

impl SlideDirection {
    fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Up => "up",
            Self::Down => "down",
        }
    }
}

/// Built-in transition types
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Transition {
    /// No transition animation
    #[default]
    None,

    /// Fade transition (simple opacity animation)
    Fade {
        /// Duration in milliseconds
        duration_ms: u64,
    },

    /// Slide transition
    Slide {
        /// Direction to slide
        direction: SlideDirection,
        /// Duration in milliseconds
        duration_ms: u64,
    },
}

impl Transition {
    /// Default duration for named transitions.
    pub const DEFAULT_DURATION_MS: u64 = 300;

    /// Create a fade transition with the given duration.
    pub fn fade(duration_ms: u64) -> Self {
        Self::Fade { duration_ms }
    }

    /// Create a slide transition.
    pub fn slide(direction: SlideDirection, duration_ms: u64) -> Self {
        Self::Slide {
            direction,
            duration_ms,
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Self::None => Duration::ZERO,
            Self::Fade { duration_ms } | Self::Slide { duration_ms, .. } => {
                Duration::from_millis(*duration_ms)
            }
        }
    }

    /// Animation name the host can key styles on.
    pub fn name(&self) -> String {
        match self {
            Self::None => "none".to_string(),
            Self::Fade { .. } => "fade".to_string(),
            Self::Slide { direction, .. } => format!("slide-{}", direction.as_str()),
        }
    }

    /// Parse a transition name, using [`Self::DEFAULT_DURATION_MS`].
    ///
    /// ```
    /// use navigator_plugins::transition::{SlideDirection, Transition};
    ///
    /// assert_eq!(
    ///     Transition::from_name("slide-up"),
    ///     Some(Transition::slide(SlideDirection::Up, 300))
    /// );
    /// assert_eq!(Transition::from_name("spin"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        let duration_ms = Self::DEFAULT_DURATION_MS;
        let transition = match name {
            "none" => Self::None,
            "fade" => Self::fade(duration_ms),
            "slide-left" => Self::slide(SlideDirection::Left, duration_ms),
            "slide-right" => Self::slide(SlideDirection::Right, duration_ms),
            "slide-up" => Self::slide(SlideDirection::Up, duration_ms),
            "slide-down" => Self::slide(SlideDirection::Down, duration_ms),
            _ => return None,
        };
        Some(transition)
    }
}

/// Transition per navigation direction.
#[derive(Debug, Clone)]
pub struct TransitionOptions {
    forward: Transition,
    backward: Transition,
    unchanged: Transition,
}

impl Default for TransitionOptions {
    fn default() -> Self {
        Self {
            forward: Transition::slide(SlideDirection::Left, Transition::DEFAULT_DURATION_MS),
            backward: Transition::slide(SlideDirection::Right, Transition::DEFAULT_DURATION_MS),
            unchanged: Transition::fade(200),
        }
    }
}

impl TransitionOptions {
    #[must_use]
    pub fn forward(mut self, transition: Transition) -> Self {
        self.forward = transition;
        self
    }

    #[must_use]
    pub fn backward(mut self, transition: Transition) -> Self {
        self.backward = transition;
        self
    }

    #[must_use]
    pub fn unchanged(mut self, transition: Transition) -> Self {
        self.unchanged = transition;
        self
    }

    pub fn for_direction(&self, direction: Direction) -> Transition {
        match direction {
            Direction::Forward => self.forward,
            Direction::Backward => self.backward,
            Direction::Unchanged => self.unchanged,
        }
    }
}

#[derive(Debug)]
struct TransitionInner {
    options: TransitionOptions,
    current: Cell<Transition>,
    hook: RefCell<Option<HookId>>,
}

/// Direction-driven transition selector.
#[derive(Debug, Clone)]
pub struct TransitionPlugin {
    inner: Rc<TransitionInner>,
}

impl Default for TransitionPlugin {
    fn default() -> Self {
        Self::new(TransitionOptions::default())
    }
}

impl TransitionPlugin {
    pub fn new(options: TransitionOptions) -> Self {
        Self {
            inner: Rc::new(TransitionInner {
                options,
                current: Cell::new(Transition::None),
                hook: RefCell::new(None),
            }),
        }
    }

    /// Transition chosen for the most recent navigation.
    pub fn current(&self) -> Transition {
        self.inner.current.get()
    }

    fn select(&self, event: &HookEvent) {
        let Some(nav) = event.navigation() else {
            return;
        };
        let transition = nav
            .to
            .meta("transition")
            .and_then(|value| value.as_str())
            .and_then(Transition::from_name)
            .unwrap_or_else(|| self.inner.options.for_direction(nav.direction));
        trace_log!("Transition for '{}': {}", nav.to.full_path, transition.name());
        self.inner.current.set(transition);
    }
}

impl Plugin for TransitionPlugin {
    fn name(&self) -> &'static str {
        "transition"
    }

    fn install<'a>(&'a self, ctx: &'a PluginContext) -> LocalBoxFuture<'a, Result<(), PluginError>> {
        let weak = Rc::downgrade(&self.inner);
        let id = ctx.hooks().on(
            Hook::Direction,
            hook_fn(move |event| {
                if let Some(inner) = weak.upgrade() {
                    TransitionPlugin { inner }.select(&event);
                }
                async { NavigationAction::Continue }
            }),
        );
        *self.inner.hook.borrow_mut() = Some(id);
        async { Ok(()) }.boxed_local()
    }

    fn uninstall<'a>(&'a self, ctx: &'a PluginContext) -> LocalBoxFuture<'a, ()> {
        if let Some(id) = self.inner.hook.borrow_mut().take() {
            ctx.hooks().off(id);
        }
        self.inner.current.set(Transition::None);
        async {}.boxed_local()
    }
}
