//! Authentication and feature gating.
//!
//! Two independent plugins guard navigation into protected routes:
//!
//! - [`TokenAuth`] holds a persisted session token. A navigation into a
//!   route whose matched chain requires authentication is redirected to the
//!   login path while no token is present, carrying the original target in a
//!   `redirect` query parameter. [`TokenAuth::login`] stores the token and
//!   completes the round trip.
//! - [`FeatureAuth`] holds a persisted set of granted features. A navigation
//!   whose matched chain requires a feature that is not granted is denied, or
//!   redirected to a forbidden page when one is configured.
//!
//! # Example
//!
//! ```
//! use navigator_plugins::auth::{TokenAuth, TokenAuthOptions};
//! use navigator_plugins::plugin::PluginHost;
//! use navigator_plugins::route::RouteRecord;
//! use navigator_plugins::router::Router;
//!
//! let router = Router::with_routes(vec![
//!     RouteRecord::new("/login"),
//!     RouteRecord::new("/account").requires_auth(),
//! ])
//! .unwrap();
//!
//! pollster::block_on(async {
//!     let host = PluginHost::builder().router(router).build().await.unwrap();
//!     let auth = host.install(TokenAuth::new(TokenAuthOptions::default())).await.unwrap();
//!
//!     let route = host.navigator().push("/account").await.unwrap();
//!     assert_eq!(route.full_path, "/login?redirect=%2Faccount");
//!
//!     auth.login("secret").await.unwrap();
//!     assert_eq!(host.navigator().current_route().path, "/account");
//! });
//! ```

use crate::error::PluginError;
use crate::guards::{guard_fn, GuardId, NavigationAction};
use crate::params::{full_path, normalize_path, QueryParams};
use crate::plugin::{Plugin, PluginContext};
use crate::route::Route;
use crate::storage::PersistedCell;
use crate::{debug_log, plugin_warn};
use futures::future::{FutureExt, LocalBoxFuture};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

// ============================================================================
// TokenAuth
// ============================================================================

/// Token authentication configuration.
#[derive(Debug, Clone)]
pub struct TokenAuthOptions {
    login_path: String,
    redirect_param: String,
}

impl Default for TokenAuthOptions {
    fn default() -> Self {
        Self {
            login_path: "/login".to_string(),
            redirect_param: "redirect".to_string(),
        }
    }
}

impl TokenAuthOptions {
    /// Path unauthenticated navigations are sent to.
    #[must_use]
    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = normalize_path(&path.into());
        self
    }

    /// Query parameter carrying the original target.
    #[must_use]
    pub fn redirect_param(mut self, name: impl Into<String>) -> Self {
        self.redirect_param = name.into();
        self
    }
}

struct TokenInner {
    options: TokenAuthOptions,
    bound: RefCell<Option<(PluginContext, PersistedCell<Option<String>>)>>,
    guard: RefCell<Option<GuardId>>,
}

/// Session token plugin.
#[derive(Clone)]
pub struct TokenAuth {
    inner: Rc<TokenInner>,
}

impl fmt::Debug for TokenAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuth")
            .field("options", &self.inner.options)
            .field("bound", &self.inner.bound.borrow().is_some())
            .finish_non_exhaustive()
    }
}

impl Default for TokenAuth {
    fn default() -> Self {
        Self::new(TokenAuthOptions::default())
    }
}

impl TokenAuth {
    const PLUGIN: &'static str = "token-auth";

    pub fn new(options: TokenAuthOptions) -> Self {
        Self {
            inner: Rc::new(TokenInner {
                options,
                bound: RefCell::new(None),
                guard: RefCell::new(None),
            }),
        }
    }

    fn bound(&self) -> Result<(PluginContext, PersistedCell<Option<String>>), PluginError> {
        self.inner
            .bound
            .borrow()
            .clone()
            .ok_or(PluginError::NotBound { plugin: Self::PLUGIN })
    }

    pub fn token(&self) -> Result<Option<String>, PluginError> {
        Ok(self.bound()?.1.get())
    }

    pub fn is_authenticated(&self) -> Result<bool, PluginError> {
        Ok(self.token()?.is_some())
    }

    pub async fn set_token(&self, token: impl Into<String>) -> Result<(), PluginError> {
        let (_, cell) = self.bound()?;
        cell.set(Some(token.into())).await;
        Ok(())
    }

    /// Forget the token.
    pub async fn logout(&self) -> Result<(), PluginError> {
        let (_, cell) = self.bound()?;
        cell.set(None).await;
        debug_log!("Logged out");
        Ok(())
    }

    /// Target saved in the current route's redirect parameter.
    pub fn redirect_target(&self) -> Result<Option<String>, PluginError> {
        let (ctx, _) = self.bound()?;
        let current = ctx.navigator().current_route();
        Ok(current.query.get(&self.inner.options.redirect_param).cloned())
    }

    /// Store `token` and, when the current route carries a redirect target,
    /// replace it with that target.
    ///
    /// Returns whether a redirect navigation committed.
    pub async fn login(&self, token: impl Into<String>) -> Result<bool, PluginError> {
        self.set_token(token).await?;
        let Some(target) = self.redirect_target()? else {
            return Ok(false);
        };
        let (ctx, _) = self.bound()?;
        match ctx.navigator().replace(target.clone()).await {
            Ok(_) => Ok(true),
            Err(failure) => {
                plugin_warn!(Self::PLUGIN, "redirect to '{}' failed: {}", target, failure);
                Ok(false)
            }
        }
    }

    fn check(&self, to: &Route) -> NavigationAction {
        let Ok((_, cell)) = self.bound() else {
            return NavigationAction::Continue;
        };
        let options = &self.inner.options;
        let required = to.matched.iter().any(|record| record.is_auth_required());
        if !required || to.path == options.login_path || cell.with(Option::is_some) {
            return NavigationAction::Continue;
        }

        let mut query = QueryParams::new();
        query.insert(options.redirect_param.clone(), to.full_path.clone());
        NavigationAction::redirect_with_reason(
            full_path(&options.login_path, &query),
            "Authentication required",
        )
    }
}

impl Plugin for TokenAuth {
    fn name(&self) -> &'static str {
        Self::PLUGIN
    }

    fn install<'a>(&'a self, ctx: &'a PluginContext) -> LocalBoxFuture<'a, Result<(), PluginError>> {
        async move {
            let cell: PersistedCell<Option<String>> =
                PersistedCell::persisted(ctx.storage_key("token"), None, ctx.storage());
            cell.hydrate(|stored, session| session.or(stored)).await;
            *self.inner.bound.borrow_mut() = Some((ctx.clone(), cell));

            let weak = Rc::downgrade(&self.inner);
            let guard = ctx.router().before_each(guard_fn(move |to, _from| {
                let action = match weak.upgrade() {
                    Some(inner) => TokenAuth { inner }.check(&to),
                    None => NavigationAction::Continue,
                };
                async move { action }
            }));
            *self.inner.guard.borrow_mut() = Some(guard);
            Ok(())
        }
        .boxed_local()
    }

    fn uninstall<'a>(&'a self, ctx: &'a PluginContext) -> LocalBoxFuture<'a, ()> {
        if let Some(guard) = self.inner.guard.borrow_mut().take() {
            ctx.router().remove_guard(guard);
        }
        self.inner.bound.borrow_mut().take();
        async {}.boxed_local()
    }
}

// ============================================================================
// FeatureAuth
// ============================================================================

/// Feature gating configuration.
#[derive(Debug, Clone, Default)]
pub struct FeatureAuthOptions {
    forbidden_path: Option<String>,
}

impl FeatureAuthOptions {
    /// Redirect to `path` instead of denying.
    #[must_use]
    pub fn forbidden_path(mut self, path: impl Into<String>) -> Self {
        self.forbidden_path = Some(normalize_path(&path.into()));
        self
    }
}

struct FeatureInner {
    options: FeatureAuthOptions,
    bound: RefCell<Option<PersistedCell<BTreeSet<String>>>>,
    guard: RefCell<Option<GuardId>>,
}

/// Granted-feature plugin.
#[derive(Clone)]
pub struct FeatureAuth {
    inner: Rc<FeatureInner>,
}

impl fmt::Debug for FeatureAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureAuth")
            .field("options", &self.inner.options)
            .field("features", &self.features().ok())
            .finish_non_exhaustive()
    }
}

impl Default for FeatureAuth {
    fn default() -> Self {
        Self::new(FeatureAuthOptions::default())
    }
}

impl FeatureAuth {
    const PLUGIN: &'static str = "feature-auth";

    pub fn new(options: FeatureAuthOptions) -> Self {
        Self {
            inner: Rc::new(FeatureInner {
                options,
                bound: RefCell::new(None),
                guard: RefCell::new(None),
            }),
        }
    }

    fn cell(&self) -> Result<PersistedCell<BTreeSet<String>>, PluginError> {
        self.inner
            .bound
            .borrow()
            .clone()
            .ok_or(PluginError::NotBound { plugin: Self::PLUGIN })
    }

    /// Granted features, sorted.
    pub fn features(&self) -> Result<Vec<String>, PluginError> {
        Ok(self.cell()?.with(|set| set.iter().cloned().collect()))
    }

    pub async fn grant(&self, feature: impl Into<String>) -> Result<(), PluginError> {
        let feature = feature.into();
        self.cell()?.update(|set| set.insert(feature)).await;
        Ok(())
    }

    /// Revoke a feature. Returns whether it was granted.
    pub async fn revoke(&self, feature: &str) -> Result<bool, PluginError> {
        Ok(self.cell()?.update(|set| set.remove(feature)).await)
    }

    /// Replace the granted set.
    pub async fn set_features(
        &self,
        features: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<(), PluginError> {
        let features: BTreeSet<String> = features.into_iter().map(Into::into).collect();
        self.cell()?.set(features).await;
        Ok(())
    }

    pub fn has(&self, feature: &str) -> Result<bool, PluginError> {
        Ok(self.cell()?.with(|set| set.contains(feature)))
    }

    pub fn has_all<S: AsRef<str>>(&self, features: &[S]) -> Result<bool, PluginError> {
        Ok(self
            .cell()?
            .with(|set| features.iter().all(|f| set.contains(f.as_ref()))))
    }

    pub fn has_any<S: AsRef<str>>(&self, features: &[S]) -> Result<bool, PluginError> {
        Ok(self
            .cell()?
            .with(|set| features.iter().any(|f| set.contains(f.as_ref()))))
    }

    fn check(&self, to: &Route) -> NavigationAction {
        let Ok(cell) = self.cell() else {
            return NavigationAction::Continue;
        };
        let missing: Vec<String> = cell.with(|granted| {
            to.matched
                .iter()
                .flat_map(|record| record.required_features())
                .filter(|feature| !granted.contains(*feature))
                .cloned()
                .collect()
        });
        if missing.is_empty() {
            return NavigationAction::Continue;
        }

        let reason = format!("Missing features: {}", missing.join(", "));
        match &self.inner.options.forbidden_path {
            Some(forbidden) if *forbidden != to.path => {
                NavigationAction::redirect_with_reason(forbidden, reason)
            }
            _ => NavigationAction::deny(reason),
        }
    }
}

impl Plugin for FeatureAuth {
    fn name(&self) -> &'static str {
        Self::PLUGIN
    }

    fn install<'a>(&'a self, ctx: &'a PluginContext) -> LocalBoxFuture<'a, Result<(), PluginError>> {
        async move {
            let cell: PersistedCell<BTreeSet<String>> =
                PersistedCell::persisted(ctx.storage_key("features"), BTreeSet::new(), ctx.storage());
            cell.hydrate(|mut stored, session| {
                stored.extend(session);
                stored
            })
            .await;
            *self.inner.bound.borrow_mut() = Some(cell);

            let weak = Rc::downgrade(&self.inner);
            let guard = ctx.router().before_each(guard_fn(move |to, _from| {
                let action = match weak.upgrade() {
                    Some(inner) => FeatureAuth { inner }.check(&to),
                    None => NavigationAction::Continue,
                };
                async move { action }
            }));
            *self.inner.guard.borrow_mut() = Some(guard);
            Ok(())
        }
        .boxed_local()
    }

    fn uninstall<'a>(&'a self, ctx: &'a PluginContext) -> LocalBoxFuture<'a, ()> {
        if let Some(guard) = self.inner.guard.borrow_mut().take() {
            ctx.router().remove_guard(guard);
        }
        self.inner.bound.borrow_mut().take();
        async {}.boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_path_is_normalized() {
        let options = TokenAuthOptions::default().login_path("sign-in/");
        assert_eq!(options.login_path, "/sign-in");
    }

    #[test]
    fn test_unbound_plugins_report_not_bound() {
        assert!(matches!(
            TokenAuth::default().token(),
            Err(PluginError::NotBound { plugin: "token-auth" })
        ));
        assert!(matches!(
            FeatureAuth::default().has("beta"),
            Err(PluginError::NotBound { plugin: "feature-auth" })
        ));
    }
}
