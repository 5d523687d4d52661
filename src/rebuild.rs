//! `IndexRebuildManager`: the external index manager spec section 7
//! names as the target of a rebuild request on commit failure. Given a
//! no-op default and a recording test double, since spec.md treats the
//! manager itself as out of scope but the engine must call it.

use parking_lot::Mutex;

/// Notified when this index's on-disk state may be corrupt and should
/// be rebuilt from scratch (section 7: "the engine requests a full
/// rebuild of this index" on an uncancelled commit failure).
pub trait IndexRebuildManager: Send + Sync {
    /// `reason` is a short, human-readable description of what failed;
    /// it is not parsed by the manager.
    fn request_rebuild(&self, reason: &str);
}

/// A manager that drops every rebuild request. The right default for
/// a caller that has no external rebuild pipeline wired up yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRebuildManager;

impl IndexRebuildManager for NoopRebuildManager {
    fn request_rebuild(&self, _reason: &str) {}
}

/// Records every rebuild request it receives, for tests that assert a
/// commit failure actually triggers one.
#[derive(Default)]
pub struct RecordingRebuildManager {
    requests: Mutex<Vec<String>>,
}

impl RecordingRebuildManager {
    /// A fresh manager with no recorded requests.
    pub fn new() -> Self {
        Self::default()
    }

    /// All reasons recorded so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Whether any rebuild has been requested.
    pub fn was_requested(&self) -> bool {
        !self.requests.lock().is_empty()
    }
}

impl IndexRebuildManager for RecordingRebuildManager {
    fn request_rebuild(&self, reason: &str) {
        self.requests.lock().push(reason.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_manager_captures_requests_in_order() {
        let manager = RecordingRebuildManager::new();
        assert!(!manager.was_requested());
        manager.request_rebuild("first");
        manager.request_rebuild("second");
        assert_eq!(manager.requests(), vec!["first".to_owned(), "second".to_owned()]);
    }
}
