//! Reference-counted scope retention.
//!
//! Naïve closure semantics would leak scopes indefinitely. Each interpreter
//! run owns a refcount map over scope ids: `MakeScope` retains the new
//! scope's chain, `PopScope` releases it, and every code value holds a
//! [`ScopeRetain`] guard over its closure chain that releases when the last
//! clone of the code is gone. Every release is deferred a few instructions,
//! so a code value that was just popped and scheduled still resolves its
//! closure. When a count reaches zero the id is queued and the loop removes
//! the scope from the table.
//!
//! Two classes of scope never collect here: the well-known builtin/global
//! pair, and scopes the current run did not create (closures surviving from
//! an earlier REPL line) — the latter get an anchor count on first sight.
//! Guards hold a `Weak` reference into the map, so a code value that
//! outlives its interpreter run releases into a dead weak and its scope
//! simply persists in the state.

use std::sync::{Arc, Mutex, Weak};

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;

use crate::state::ScopeId;

/// Scope chains are short; eight ids covers all but pathological nesting.
pub(crate) type ScopeChain = SmallVec<[ScopeId; 8]>;

/// How many instructions a release waits before firing.
const RELEASE_DELAY_TICKS: u8 = 3;

/// Per-run reference counts for scope ids.
#[derive(Debug)]
pub(crate) struct ScopeRefs {
    counts: AHashMap<ScopeId, i64>,
    /// Scopes created by this run's `MakeScope`s. Anything else seen in a
    /// chain is foreign and gets an anchor count so it is never collected.
    created: AHashSet<ScopeId>,
    builtin: ScopeId,
    global: ScopeId,
    dead: Vec<ScopeId>,
    deferred: Vec<(u8, ScopeChain)>,
}

impl ScopeRefs {
    pub fn new(builtin: ScopeId, global: ScopeId) -> Self {
        Self {
            counts: AHashMap::new(),
            created: AHashSet::new(),
            builtin,
            global,
            dead: Vec::new(),
            deferred: Vec::new(),
        }
    }

    fn is_well_known(&self, id: ScopeId) -> bool {
        id == self.builtin || id == self.global
    }

    /// Records a scope as created by this run, before its first retain.
    pub fn mark_created(&mut self, id: ScopeId) {
        self.created.insert(id);
    }

    pub fn retain(&mut self, id: ScopeId) {
        if self.is_well_known(id) {
            return;
        }
        let anchor = i64::from(!self.created.contains(&id));
        *self.counts.entry(id).or_insert(anchor) += 1;
    }

    fn release(&mut self, id: ScopeId) {
        if self.is_well_known(id) {
            return;
        }
        let count = self.counts.entry(id).or_insert(0);
        *count -= 1;
        if *count == 0 {
            self.dead.push(id);
        }
    }

    pub fn retain_chain(&mut self, chain: &[ScopeId]) {
        for &id in chain {
            self.retain(id);
        }
    }

    fn release_chain(&mut self, chain: &[ScopeId]) {
        for &id in chain {
            self.release(id);
        }
    }

    /// Schedules a chain release to fire [`RELEASE_DELAY_TICKS`] ticks from
    /// now.
    pub fn defer_release(&mut self, chain: ScopeChain) {
        self.deferred.push((RELEASE_DELAY_TICKS, chain));
    }

    /// Counts down deferred releases and fires the ones that are due. Called
    /// once per interpreted instruction.
    pub fn tick(&mut self) {
        if self.deferred.is_empty() {
            return;
        }
        let mut due = Vec::new();
        self.deferred.retain_mut(|(ticks, chain)| {
            if *ticks == 0 {
                due.push(std::mem::take(chain));
                false
            } else {
                *ticks -= 1;
                true
            }
        });
        for chain in due {
            self.release_chain(&chain);
        }
    }

    /// Fires every outstanding deferred release now. Called when the work
    /// queue drains.
    pub fn flush(&mut self) {
        let deferred = std::mem::take(&mut self.deferred);
        for (_, chain) in deferred {
            self.release_chain(&chain);
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.deferred.is_empty() || !self.dead.is_empty()
    }

    /// Drains the scopes whose count is still zero. A scope re-retained
    /// after being marked dead is skipped.
    pub fn take_dead(&mut self) -> Vec<ScopeId> {
        if self.dead.is_empty() {
            return Vec::new();
        }
        let dead = std::mem::take(&mut self.dead);
        dead.into_iter()
            .filter(|id| self.counts.get(id).copied().unwrap_or(0) == 0)
            .collect()
    }
}

/// Shared handle to a run's refcount map.
pub(crate) type SharedScopeRefs = Arc<Mutex<ScopeRefs>>;

/// Drop-guard that keeps a closure's scope chain retained.
///
/// Created when a `PutCode` materializes a code value; shared (via `Arc`)
/// between every clone of that code value, so the chain is released exactly
/// once, when the last clone is gone. The release is deferred like any
/// other, which lets `CallByValue` drop the code value it just scheduled.
#[derive(Debug)]
pub(crate) struct ScopeRetain {
    chain: ScopeChain,
    refs: Weak<Mutex<ScopeRefs>>,
}

impl ScopeRetain {
    /// Retains `chain` in `refs` and returns the guard that undoes it.
    pub fn new(chain: ScopeChain, refs: &SharedScopeRefs) -> Self {
        refs.lock().expect("scope refcounts poisoned").retain_chain(&chain);
        Self {
            chain,
            refs: Arc::downgrade(refs),
        }
    }
}

impl Drop for ScopeRetain {
    fn drop(&mut self) {
        if let Some(refs) = self.refs.upgrade() {
            refs.lock()
                .expect("scope refcounts poisoned")
                .defer_release(std::mem::take(&mut self.chain));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_refs() -> (SharedScopeRefs, ScopeId, ScopeId) {
        let builtin = ScopeId::fresh();
        let global = ScopeId::fresh();
        (Arc::new(Mutex::new(ScopeRefs::new(builtin, global))), builtin, global)
    }

    fn flush_all(refs: &mut ScopeRefs) -> Vec<ScopeId> {
        refs.flush();
        refs.take_dead()
    }

    #[test]
    fn well_known_scopes_are_never_marked_dead() {
        let (refs, builtin, global) = fresh_refs();
        let mut refs = refs.lock().unwrap();
        refs.defer_release(ScopeChain::from_slice(&[builtin, global]));
        assert!(flush_all(&mut refs).is_empty());
    }

    #[test]
    fn a_created_scope_dies_when_its_count_reaches_zero() {
        let (refs, ..) = fresh_refs();
        let id = ScopeId::fresh();
        let mut refs = refs.lock().unwrap();
        refs.mark_created(id);
        refs.retain(id);
        refs.retain(id);
        refs.defer_release(ScopeChain::from_slice(&[id]));
        assert!(flush_all(&mut refs).is_empty());
        refs.defer_release(ScopeChain::from_slice(&[id]));
        assert_eq!(flush_all(&mut refs), vec![id]);
    }

    #[test]
    fn foreign_scopes_are_anchored_and_survive_paired_releases() {
        let (refs, ..) = fresh_refs();
        let foreign = ScopeId::fresh();
        let mut refs = refs.lock().unwrap();
        refs.retain(foreign);
        refs.defer_release(ScopeChain::from_slice(&[foreign]));
        assert!(flush_all(&mut refs).is_empty());
    }

    #[test]
    fn releases_wait_out_their_delay() {
        let (refs, ..) = fresh_refs();
        let id = ScopeId::fresh();
        let mut refs = refs.lock().unwrap();
        refs.mark_created(id);
        refs.retain(id);
        refs.defer_release(ScopeChain::from_slice(&[id]));
        for _ in 0..3 {
            refs.tick();
            assert!(refs.take_dead().is_empty());
        }
        refs.tick();
        assert_eq!(refs.take_dead(), vec![id]);
    }

    #[test]
    fn re_retained_scopes_are_not_collected() {
        let (refs, ..) = fresh_refs();
        let id = ScopeId::fresh();
        let mut refs = refs.lock().unwrap();
        refs.mark_created(id);
        refs.retain(id);
        refs.defer_release(ScopeChain::from_slice(&[id]));
        refs.flush();
        refs.retain(id);
        assert!(refs.take_dead().is_empty());
    }

    #[test]
    fn guard_defers_its_chain_release_on_drop() {
        let (refs, ..) = fresh_refs();
        let id = ScopeId::fresh();
        refs.lock().unwrap().mark_created(id);
        let guard = ScopeRetain::new(ScopeChain::from_slice(&[id]), &refs);
        drop(guard);
        let mut refs = refs.lock().unwrap();
        assert!(refs.take_dead().is_empty());
        assert_eq!(flush_all(&mut refs), vec![id]);
    }

    #[test]
    fn guard_outliving_its_run_is_a_no_op() {
        let (refs, ..) = fresh_refs();
        let id = ScopeId::fresh();
        let guard = ScopeRetain::new(ScopeChain::from_slice(&[id]), &refs);
        drop(refs);
        drop(guard);
    }
}
