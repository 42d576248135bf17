//! Session invalidation hook.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Receives the logout signal when credentials can no longer be renewed.
///
/// The app clears its session state (stored tokens, user profile, cached
/// screens) in response. Called at most once per failed logical request.
pub trait SessionListener: Send + Sync {
    fn on_session_invalidated(&self);
}

/// Listener that only records how often the session was invalidated.
///
/// Useful where the UI polls for a "signed out" state instead of reacting
/// to a callback.
#[derive(Debug, Default)]
pub struct SessionSignal {
    invalidations: AtomicUsize,
}

impl SessionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidation_count(&self) -> usize {
        self.invalidations.load(Ordering::Acquire)
    }

    pub fn is_invalidated(&self) -> bool {
        self.invalidation_count() > 0
    }
}

impl SessionListener for SessionSignal {
    fn on_session_invalidated(&self) {
        self.invalidations.fetch_add(1, Ordering::AcqRel);
    }
}
