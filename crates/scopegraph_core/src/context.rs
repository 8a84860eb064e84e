//! Per-request context: cancellation and the caller's access scopes.

use crate::error::{CoreError, CoreResult};
use crate::sac::{AccessScopeChecker, AllowAllChecker};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared cancellation flag.
///
/// Clones observe the same flag; cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels every holder of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether the token was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Context passed to every store, searcher and filter call.
///
/// Carries the caller's [`AccessScopeChecker`] and a [`CancellationToken`].
/// Cloning is cheap.
#[derive(Clone)]
pub struct RequestContext {
    cancellation: CancellationToken,
    checker: Arc<dyn AccessScopeChecker>,
}

impl RequestContext {
    /// Creates a context for a caller with the given scope checker.
    pub fn new(checker: Arc<dyn AccessScopeChecker>) -> Self {
        Self {
            cancellation: CancellationToken::new(),
            checker,
        }
    }

    /// Context with unrestricted access, for startup and background work.
    #[must_use]
    pub fn unrestricted() -> Self {
        Self::new(Arc::new(AllowAllChecker))
    }

    /// Attaches a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns a copy of this context with another scope checker.
    #[must_use]
    pub fn with_checker(&self, checker: Arc<dyn AccessScopeChecker>) -> Self {
        Self {
            cancellation: self.cancellation.clone(),
            checker,
        }
    }

    /// The cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// The caller's scope checker.
    #[must_use]
    pub fn scope_checker(&self) -> &dyn AccessScopeChecker {
        self.checker.as_ref()
    }

    /// Whether the context was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Returns [`CoreError::Cancelled`] once the context is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] if the token was cancelled.
    pub fn check_cancelled(&self) -> CoreResult<()> {
        if self.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sac::{AccessMode, AccessScope, DenyAllChecker};

    #[test]
    fn cancellation_is_shared() {
        let token = CancellationToken::new();
        let ctx = RequestContext::unrestricted().with_cancellation(token.clone());
        let clone = ctx.clone();
        assert!(ctx.check_cancelled().is_ok());

        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(ctx.check_cancelled(), Err(CoreError::Cancelled)));
    }

    #[test]
    fn checker_swap_keeps_cancellation() {
        let token = CancellationToken::new();
        let ctx = RequestContext::unrestricted().with_cancellation(token.clone());
        let denied = ctx.with_checker(Arc::new(DenyAllChecker));

        assert!(ctx
            .scope_checker()
            .is_allowed(&AccessScope::Global, AccessMode::Read));
        assert!(!denied
            .scope_checker()
            .is_allowed(&AccessScope::Global, AccessMode::Read));

        token.cancel();
        assert!(denied.is_cancelled());
    }
}
