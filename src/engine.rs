//! Query façade: the handle interactive callers hold.
//!
//! The engine is constructed once, starts `NotReady`, becomes `Ready` after
//! the first resync (or snapshot restore), and is torn down with
//! [`SearchEngine::shutdown`]. Every mailbox change is applied as one unit
//! under the write lock; reads share the lock and so see each change either
//! completely or not at all.
//!
//! The engine never debounces. Callers are expected to wait for at least
//! 100 ms of keystroke quiescence (see [`crate::debounce::Debouncer`]) and
//! to discard results of queries they have since superseded.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, error, info, warn};

use crate::config::{Config, RankingConfig};
use crate::error::SearchError;
use crate::index::maintainer::{self, ApplyOutcome, MailboxChange};
use crate::index::stats::IndexStats;
use crate::index::MailIndex;
use crate::model::contact::ContactSummary;
use crate::model::message::{IndexedMessage, MessageSummary};
use crate::search::{contacts, query, ranker};

/// Whether the engine can answer queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    NotReady,
    Ready,
}

/// Options for [`SearchEngine::search`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Maximum number of results; `None` uses the configured default.
    pub limit: Option<usize>,
}

impl SearchOptions {
    pub fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }
}

/// Index, readiness and generation, always changed together.
///
/// `generation` increases on every wholesale replacement (resync, restore,
/// shutdown) so a failure seen by a reader can be matched to the index it
/// was seen on.
#[derive(Debug)]
struct EngineState {
    index: MailIndex,
    readiness: Readiness,
    generation: u64,
}

impl EngineState {
    fn replace(&mut self, index: MailIndex, readiness: Readiness) {
        self.index = index;
        self.readiness = readiness;
        self.generation += 1;
    }
}

/// Process-wide local search state behind an explicit handle.
pub struct SearchEngine {
    state: RwLock<EngineState>,
    weights: RankingConfig,
    default_limit: usize,
}

impl SearchEngine {
    /// Create an empty, not-yet-ready engine.
    pub fn new(config: &Config) -> Self {
        Self {
            state: RwLock::new(EngineState {
                index: MailIndex::new(),
                readiness: Readiness::NotReady,
                generation: 0,
            }),
            weights: config.ranking.clone(),
            default_limit: config.search.default_limit,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.readiness() == Readiness::Ready
    }

    pub fn readiness(&self) -> Readiness {
        self.read().readiness
    }

    /// Replace all state with `messages` and become ready.
    ///
    /// The new index is built without holding the lock, then swapped in.
    pub fn resync(&self, messages: Vec<IndexedMessage>) -> usize {
        let fresh = MailIndex::from_messages(messages);
        let count = fresh.messages.len();
        self.write().replace(fresh, Readiness::Ready);
        count
    }

    /// Adopt a previously persisted index and become ready.
    pub fn restore(&self, index: MailIndex) -> Result<(), SearchError> {
        index.verify()?;
        let count = index.messages.len();
        self.write().replace(index, Readiness::Ready);
        info!(messages = count, "Restored index from snapshot");
        Ok(())
    }

    /// Apply one mailbox change. Changes must arrive in feed order.
    ///
    /// Changes received while not ready are still applied; a `Resync`
    /// makes the engine ready.
    pub fn apply(&self, change: MailboxChange) -> ApplyOutcome {
        if let MailboxChange::Resync(messages) = change {
            let messages = self.resync(messages);
            return ApplyOutcome::Resynced { messages };
        }
        let outcome = maintainer::apply(&mut self.write().index, change);
        debug!(?outcome, "Applied mailbox change");
        outcome
    }

    /// Ranked messages for a raw query string.
    ///
    /// Empty when not ready, when the query is blank, or when it needs the
    /// remote backend (check [`query::has_unsupported_operators`]).
    pub fn search(&self, raw_query: &str, options: SearchOptions) -> Vec<MessageSummary> {
        let parsed = query::parse_query(raw_query);
        if parsed.is_empty() || parsed.has_unsupported_operators() {
            return Vec::new();
        }
        let limit = options.limit.unwrap_or(self.default_limit);

        let (result, generation) = {
            let state = self.read();
            if state.readiness == Readiness::NotReady {
                return Vec::new();
            }
            let result = ranker::rank_messages(&state.index.messages, &parsed, &self.weights, limit);
            (result, state.generation)
        };

        match result {
            Ok(rows) => rows,
            Err(e) => {
                self.fail(&e, generation);
                Vec::new()
            }
        }
    }

    /// Contacts matching a name or address fragment.
    pub fn search_contacts(&self, raw_query: &str, limit: usize) -> Vec<ContactSummary> {
        let state = self.read();
        if state.readiness == Readiness::NotReady {
            return Vec::new();
        }
        contacts::search_contacts(&state.index.contacts, raw_query, limit)
    }

    /// Most frequent senders, independent of any query text.
    pub fn top_contacts(&self, limit: usize) -> Vec<ContactSummary> {
        let state = self.read();
        if state.readiness == Readiness::NotReady {
            return Vec::new();
        }
        contacts::top_contacts(&state.index.contacts, limit)
    }

    /// Full consistency check. A failure drops the engine to `NotReady`.
    pub fn verify(&self) -> Result<(), SearchError> {
        let (result, generation) = {
            let state = self.read();
            (state.index.verify(), state.generation)
        };
        if let Err(ref e) = result {
            self.fail(e, generation);
        }
        result
    }

    /// A copy of the current index, for persisting.
    pub fn snapshot(&self) -> MailIndex {
        self.read().index.clone()
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats::collect(&self.read().index)
    }

    /// Tear down: drop all state and return to `NotReady`.
    pub fn shutdown(&self) {
        self.write().replace(MailIndex::new(), Readiness::NotReady);
        info!("Search engine shut down");
    }

    /// Handle a failure observed on the index of `generation`.
    ///
    /// The engine is demoted only if that index is still installed; a
    /// resync that landed in between already replaced it.
    fn fail(&self, e: &SearchError, generation: u64) {
        if !e.requires_resync() {
            warn!(error = %e, "Search failed");
            return;
        }
        let mut state = self.write();
        if state.generation != generation {
            debug!(error = %e, "Inconsistency seen on a replaced index; ignoring");
            return;
        }
        error!(error = %e, "Index inconsistent; a full resync is required");
        state.readiness = Readiness::NotReady;
    }

    // A panicked writer leaves the guard poisoned; the data is still the
    // last complete state because every mutation is applied under one guard
    // and resync swaps a fully built index.
    fn read(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::address::EmailAddress;
    use chrono::{TimeZone, Utc};

    fn msg(id: &str, subject: &str, from: &str) -> IndexedMessage {
        IndexedMessage::new(
            id,
            subject,
            "",
            EmailAddress::parse(from),
            Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_not_ready_returns_empty() {
        let engine = SearchEngine::new(&Config::default());
        assert_eq!(engine.readiness(), Readiness::NotReady);

        engine.apply(MailboxChange::Added(msg("m1", "Alpha", "a@x.io")));
        assert!(!engine.is_ready());
        assert!(engine.search("alpha", SearchOptions::default()).is_empty());
        assert!(engine.top_contacts(5).is_empty());
        assert!(engine.search_contacts("a", 5).is_empty());
    }

    #[test]
    fn test_resync_makes_ready() {
        let engine = SearchEngine::new(&Config::default());
        assert_eq!(engine.resync(vec![msg("m1", "Alpha", "a@x.io")]), 1);
        assert!(engine.is_ready());
        assert_eq!(engine.search("alpha", SearchOptions::default()).len(), 1);
    }

    #[test]
    fn test_resync_via_apply() {
        let engine = SearchEngine::new(&Config::default());
        engine.apply(MailboxChange::Resync(vec![msg("m1", "Alpha", "a@x.io")]));
        assert_eq!(engine.readiness(), Readiness::Ready);
    }

    #[test]
    fn test_default_limit_from_config() {
        let mut config = Config::default();
        config.search.default_limit = 2;
        let engine = SearchEngine::new(&config);
        engine.resync(
            (0..5)
                .map(|i| msg(&format!("m{i}"), "Report", "a@x.io"))
                .collect(),
        );
        assert_eq!(engine.search("report", SearchOptions::default()).len(), 2);
        assert_eq!(engine.search("report", SearchOptions::with_limit(4)).len(), 4);
    }

    #[test]
    fn test_inconsistency_drops_to_not_ready() {
        let engine = SearchEngine::new(&Config::default());
        engine.resync(vec![msg("m1", "Alpha", "a@x.io")]);
        engine.write().index.messages.corrupt_posting("alpha", "ghost");

        assert!(engine.search("alpha", SearchOptions::default()).is_empty());
        assert!(!engine.is_ready());

        engine.resync(vec![msg("m1", "Alpha", "a@x.io")]);
        assert!(engine.is_ready());
        assert!(engine.verify().is_ok());
    }

    #[test]
    fn test_failure_on_replaced_index_keeps_ready() {
        let engine = SearchEngine::new(&Config::default());
        engine.resync(vec![msg("m1", "Alpha", "a@x.io")]);
        engine.write().index.messages.corrupt_posting("alpha", "ghost");

        // A reader hits the dangling posting...
        let seen = engine.read().generation;
        let err = engine
            .read()
            .index
            .verify()
            .expect_err("dangling posting must be detected");

        // ...a resync lands before it reports the failure.
        engine.resync(vec![msg("m1", "Alpha", "a@x.io")]);
        engine.fail(&err, seen);
        assert!(engine.is_ready());
        assert_eq!(engine.search("alpha", SearchOptions::default()).len(), 1);

        // The same failure on the current index still demotes.
        let current = engine.read().generation;
        engine.fail(&err, current);
        assert!(!engine.is_ready());
    }

    #[test]
    fn test_shutdown_and_resync_are_atomic() {
        use std::sync::Arc;

        let engine = Arc::new(SearchEngine::new(&Config::default()));
        let workers: Vec<_> = (0..4)
            .map(|i| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        if i % 2 == 0 {
                            engine.resync(vec![msg("m1", "Alpha", "a@x.io")]);
                        } else {
                            engine.shutdown();
                        }
                        let state = engine.read();
                        let ready = state.readiness == Readiness::Ready;
                        assert_eq!(ready, state.index.messages.len() == 1);
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }
    }

    #[test]
    fn test_restore_rejects_inconsistent_index() {
        let engine = SearchEngine::new(&Config::default());
        let mut index = MailIndex::from_messages(vec![msg("m1", "Alpha", "a@x.io")]);
        index.messages.corrupt_posting("alpha", "ghost");
        assert!(engine.restore(index).is_err());
        assert!(!engine.is_ready());
    }

    #[test]
    fn test_shutdown_clears() {
        let engine = SearchEngine::new(&Config::default());
        engine.resync(vec![msg("m1", "Alpha", "a@x.io")]);
        engine.shutdown();
        assert!(!engine.is_ready());
        assert_eq!(engine.stats(), IndexStats::default());
    }

    #[test]
    fn test_concurrent_reads_during_writes() {
        use std::sync::Arc;

        let engine = Arc::new(SearchEngine::new(&Config::default()));
        engine.resync(vec![msg("seed", "Alpha seed", "a@x.io")]);

        let writer = {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                for i in 0..200 {
                    let id = format!("m{i}");
                    engine.apply(MailboxChange::Added(msg(&id, "Alpha update", "b@x.io")));
                    engine.apply(MailboxChange::Deleted { id });
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let rows = engine.search("alpha", SearchOptions::with_limit(10));
                        assert!(rows.iter().any(|r| r.id == "seed"));
                        assert!(rows.len() <= 2);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
        assert!(engine.is_ready());
        assert!(engine.verify().is_ok());
    }
}
