//! Navigation direction classification.
//!
//! Every navigation is classified exactly once by comparing the history
//! position before and after it:
//!
//! | before | after        | direction   |
//! |--------|--------------|-------------|
//! | `None` | any          | `Forward`   |
//! | any    | `None`       | `Forward`   |
//! | `b`    | `a < b`      | `Backward`  |
//! | `b`    | `a == b`     | `Unchanged` |
//! | `b`    | `a > b`      | `Forward`   |
//!
//! The application may override the result (see
//! [`NavigatorOptions::identify_direction`](crate::navigator::NavigatorOptions::identify_direction)),
//! but only to `Forward` or `Backward`.

use crate::route::Route;
use futures::future::{FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

/// Direction of a navigation through history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// A step deeper into history (push, forward, first navigation).
    Forward,
    /// A step back through history.
    Backward,
    /// The current entry was replaced in place.
    Unchanged,
}

impl Direction {
    /// Lowercase name, as used in hook names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Unchanged => "unchanged",
        }
    }

    pub fn is_forward(&self) -> bool {
        matches!(self, Self::Forward)
    }

    pub fn is_backward(&self) -> bool {
        matches!(self, Self::Backward)
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a navigation from the position cursor before and after it.
///
/// # Example
///
/// ```
/// use navigator_plugins::direction::{classify, Direction};
///
/// assert_eq!(classify(None, Some(0)), Direction::Forward);
/// assert_eq!(classify(Some(2), Some(1)), Direction::Backward);
/// assert_eq!(classify(Some(1), Some(1)), Direction::Unchanged);
/// ```
pub fn classify(before: Option<usize>, after: Option<usize>) -> Direction {
    match (before, after) {
        (Some(before), Some(after)) if after < before => Direction::Backward,
        (Some(before), Some(after)) if after == before => Direction::Unchanged,
        _ => Direction::Forward,
    }
}

/// Arguments of a direction override.
#[derive(Debug, Clone)]
pub struct DirectionContext {
    pub to: Route,
    pub from: Route,
    /// The default classification.
    pub direction: Direction,
}

/// User-supplied direction override.
pub type IdentifyDirection = Rc<dyn Fn(DirectionContext) -> LocalBoxFuture<'static, Direction>>;

/// Create an [`IdentifyDirection`] from an async closure.
pub fn identify_fn<F, Fut>(f: F) -> IdentifyDirection
where
    F: Fn(DirectionContext) -> Fut + 'static,
    Fut: Future<Output = Direction> + 'static,
{
    Rc::new(move |ctx| f(ctx).boxed_local())
}

/// Apply an override result to the default classification.
///
/// Overriding to `Unchanged` is not supported; the default is kept and a
/// warning is logged.
pub fn apply_override(default: Direction, overridden: Direction) -> Direction {
    if overridden.is_unchanged() && !default.is_unchanged() {
        crate::plugin_warn!(
            "navigator",
            "identify_direction returned 'unchanged'; keeping '{}'",
            default
        );
        return default;
    }
    overridden
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_table() {
        assert_eq!(classify(None, None), Direction::Forward);
        assert_eq!(classify(Some(3), None), Direction::Forward);
        assert_eq!(classify(None, Some(3)), Direction::Forward);
        assert_eq!(classify(Some(3), Some(4)), Direction::Forward);
        assert_eq!(classify(Some(3), Some(3)), Direction::Unchanged);
        assert_eq!(classify(Some(3), Some(0)), Direction::Backward);
    }

    #[test]
    fn test_classify_walk() {
        // push, push, back, back, forward
        let positions = [0usize, 1, 2, 1, 0, 1];
        let expected = [
            Direction::Forward,
            Direction::Forward,
            Direction::Backward,
            Direction::Backward,
            Direction::Forward,
        ];
        for (pair, expected) in positions.windows(2).zip(expected) {
            assert_eq!(classify(Some(pair[0]), Some(pair[1])), expected);
        }
    }

    #[test]
    fn test_override_rejects_unchanged() {
        assert_eq!(
            apply_override(Direction::Forward, Direction::Unchanged),
            Direction::Forward
        );
        assert_eq!(
            apply_override(Direction::Forward, Direction::Backward),
            Direction::Backward
        );
        assert_eq!(
            apply_override(Direction::Unchanged, Direction::Unchanged),
            Direction::Unchanged
        );
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&Direction::Backward).unwrap(),
            "\"backward\""
        );
    }
}
