//! Network reachability signal.

use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;

/// Reports whether the device currently has a usable network connection.
///
/// Read synchronously at the start of every request attempt.
pub trait ConnectivityProvider: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// Reachability flag flipped by the platform's network listener.
///
/// Starts connected; the listener calls [`ConnectivityFlag::set_connected`]
/// on every transition.
#[derive(Debug)]
pub struct ConnectivityFlag {
    connected: AtomicBool,
}

impl ConnectivityFlag {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        let previous = self.connected.swap(connected, Ordering::AcqRel);
        if previous != connected {
            debug!("[Connectivity] connected={}", connected);
        }
    }
}

impl Default for ConnectivityFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConnectivityProvider for ConnectivityFlag {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_defaults_to_connected_and_tracks_transitions() {
        let flag = ConnectivityFlag::default();
        assert!(flag.is_connected());
        flag.set_connected(false);
        assert!(!flag.is_connected());
        flag.set_connected(true);
        assert!(flag.is_connected());
    }
}
