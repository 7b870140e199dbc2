//! Run control: advisory term locks, cooperative cancellation and progress.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::model::TermId;

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Progress of an allocation run: demands decided so far out of the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

/// Registry of terms with an allocation run in flight.
///
/// Two runs for the same term would both read the same "free" state and
/// double-book; runs for different terms share nothing and proceed freely.
#[derive(Debug, Clone, Default)]
pub struct TermLocks {
    held: Arc<Mutex<BTreeSet<TermId>>>,
}

impl TermLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `term`, or fail with [`EngineError::TermLocked`] if
    /// another run holds it. The lock is released when the guard drops.
    pub fn try_lock(&self, term: &TermId) -> Result<TermGuard, EngineError> {
        let mut held = lock(&self.held);
        if !held.insert(term.clone()) {
            return Err(EngineError::TermLocked(term.clone()));
        }
        Ok(TermGuard {
            held: Arc::clone(&self.held),
            term: term.clone(),
        })
    }

    pub fn is_locked(&self, term: &TermId) -> bool {
        lock(&self.held).contains(term)
    }
}

/// Holds a term lock until dropped.
#[derive(Debug)]
pub struct TermGuard {
    held: Arc<Mutex<BTreeSet<TermId>>>,
    term: TermId,
}

impl TermGuard {
    pub fn term(&self) -> &TermId {
        &self.term
    }
}

impl Drop for TermGuard {
    fn drop(&mut self) {
        lock(&self.held).remove(&self.term);
    }
}

// Poisoned locks are recovered; the set has no cross-entry invariant.
fn lock(held: &Mutex<BTreeSet<TermId>>) -> MutexGuard<'_, BTreeSet<TermId>> {
    held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_term_is_exclusive_until_guard_drops() {
        let locks = TermLocks::new();
        let term = TermId::new("2026.1");

        let guard = locks.try_lock(&term).unwrap();
        assert!(locks.is_locked(&term));
        assert!(matches!(locks.try_lock(&term), Err(EngineError::TermLocked(_))));

        drop(guard);
        assert!(!locks.is_locked(&term));
        assert!(locks.try_lock(&term).is_ok());
    }

    #[test]
    fn different_terms_lock_independently() {
        let locks = TermLocks::new();
        let _a = locks.try_lock(&TermId::new("2026.1")).unwrap();
        let _b = locks.try_lock(&TermId::new("2026.2")).unwrap();
        assert!(locks.is_locked(&TermId::new("2026.2")));
    }

    #[test]
    fn cancel_token_clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
