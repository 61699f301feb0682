//! The interpreter state: value stack, scope table, scope stack, box store.
//!
//! `State` is never mutated in place from a caller's perspective: every
//! update consumes the state and returns a new one. A kept snapshot
//! (`State::clone`) shares structure — the stack and scope stack are cons
//! lists, and scopes are `Arc`-wrapped with copy-on-write updates — so
//! holding an old state (as the REPL does for error recovery) is cheap.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::{
    error::{RunError, RunResult},
    stack::Stack,
    value::Value,
};

/// Unique identifier of a scope in the scope table.
///
/// Ids are drawn from a process-wide counter so that scopes created by
/// concurrent interpreters never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

impl ScopeId {
    /// Allocates a fresh, never-before-used scope id.
    pub fn fresh() -> Self {
        Self(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a mutable cell in the box store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoxId(u64);

impl fmt::Display for BoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A lexical scope: a name→value map with a parent link.
#[derive(Debug, Clone)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub id: ScopeId,
    /// Persistent scopes (builtin, global, module scopes) survive refcount
    /// collection.
    pub persistent: bool,
    values: AHashMap<Arc<str>, Value>,
}

impl Scope {
    pub fn new(parent: Option<ScopeId>, id: ScopeId) -> Self {
        Self {
            parent,
            id,
            persistent: false,
            values: AHashMap::new(),
        }
    }

    pub fn persistent(parent: Option<ScopeId>, id: ScopeId) -> Self {
        Self {
            parent,
            id,
            persistent: true,
            values: AHashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub(crate) fn insert(&mut self, name: Arc<str>, value: Value) {
        self.values.insert(name, value);
    }

    pub(crate) fn remove(&mut self, name: &str) {
        self.values.remove(name);
    }

    /// Names bound directly in this scope, in arbitrary order.
    pub fn names(&self) -> impl Iterator<Item = &Arc<str>> {
        self.values.keys()
    }
}

/// The scope stack: a cons list of scope ids, top is the current scope.
#[derive(Debug, Clone, Default)]
pub struct ScopeStack(Option<Arc<ScopeFrame>>);

#[derive(Debug)]
struct ScopeFrame {
    id: ScopeId,
    rest: ScopeStack,
}

impl ScopeStack {
    pub const fn empty() -> Self {
        Self(None)
    }

    #[must_use]
    pub fn push(&self, id: ScopeId) -> Self {
        Self(Some(Arc::new(ScopeFrame {
            id,
            rest: self.clone(),
        })))
    }

    pub fn pop(&self) -> Option<(ScopeId, Self)> {
        self.0.as_ref().map(|frame| (frame.id, frame.rest.clone()))
    }

    pub fn top(&self) -> Option<ScopeId> {
        self.0.as_ref().map(|frame| frame.id)
    }
}

/// An immutable snapshot of the whole interpreter state.
#[derive(Debug, Clone)]
pub struct State {
    stack: Stack,
    scopes: AHashMap<ScopeId, Arc<Scope>>,
    scope_stack: ScopeStack,
    boxes: AHashMap<BoxId, Stack>,
    last_box_id: u64,
    builtin: ScopeId,
    global: ScopeId,
}

impl State {
    /// Boots a state from the two well-known scopes. The global scope is the
    /// initial current scope.
    pub fn make(builtin: Scope, global: Scope) -> Self {
        debug_assert_eq!(global.parent, Some(builtin.id));
        let builtin_id = builtin.id;
        let global_id = global.id;
        let mut scopes = AHashMap::new();
        scopes.insert(builtin_id, Arc::new(builtin));
        scopes.insert(global_id, Arc::new(global));
        Self {
            stack: Stack::empty(),
            scopes,
            scope_stack: ScopeStack::empty().push(global_id),
            boxes: AHashMap::new(),
            last_box_id: 0,
            builtin: builtin_id,
            global: global_id,
        }
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    pub fn builtin_scope_id(&self) -> ScopeId {
        self.builtin
    }

    pub fn global_scope_id(&self) -> ScopeId {
        self.global
    }

    #[must_use]
    pub fn with_stack(mut self, stack: Stack) -> Self {
        self.stack = stack;
        self
    }

    #[must_use]
    pub fn push(mut self, value: Value) -> Self {
        self.stack = self.stack.push(value);
        self
    }

    /// Pops the top of the stack, failing with an arity error when empty.
    pub fn pop(mut self) -> RunResult<(Value, Self)> {
        match self.stack.pop() {
            Some((value, rest)) => {
                self.stack = rest;
                Ok((value, self))
            }
            None => Err(RunError::arity_error("the stack is empty")),
        }
    }

    /// Pops two values; the first returned value was on top.
    pub fn pop2(self) -> RunResult<(Value, Value, Self)> {
        let (top, state) = self.pop()?;
        let (below, state) = state.pop()?;
        Ok((top, below, state))
    }

    /// Pops three values; the first returned value was on top.
    pub fn pop3(self) -> RunResult<(Value, Value, Value, Self)> {
        let (top, state) = self.pop()?;
        let (mid, state) = state.pop()?;
        let (bottom, state) = state.pop()?;
        Ok((top, mid, bottom, state))
    }

    // ------------------------------------------------------------------
    // Scopes
    // ------------------------------------------------------------------

    /// The current (topmost) scope id. The scope stack is never empty while
    /// the interpreter runs.
    pub fn current_scope_id(&self) -> RunResult<ScopeId> {
        self.scope_stack
            .top()
            .ok_or_else(|| RunError::internal_error("the scope stack is empty"))
    }

    pub fn scope(&self, id: ScopeId) -> RunResult<&Arc<Scope>> {
        self.scopes
            .get(&id)
            .ok_or_else(|| RunError::internal_error(format!("scope {id} is missing from the scope table")))
    }

    /// Whether a scope id is still present in the table.
    pub fn scope_is_live(&self, id: ScopeId) -> bool {
        self.scopes.contains_key(&id)
    }

    /// Number of live scopes, including the two well-known ones.
    pub fn live_scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Looks a name up in the current scope chain.
    pub fn look_up_name(&self, name: &str) -> RunResult<Value> {
        self.look_up_name_in(self.current_scope_id()?, name)
    }

    /// Looks a name up starting from the given scope.
    pub fn look_up_name_in(&self, scope_id: ScopeId, name: &str) -> RunResult<Value> {
        let mut current = Some(scope_id);
        while let Some(id) = current {
            let scope = self.scope(id)?;
            if let Some(value) = scope.get(name) {
                return Ok(value.clone());
            }
            current = scope.parent;
        }
        Err(RunError::name_error(format!("name {name} is not defined")))
    }

    /// Binds a name in a scope. Rebinding an existing name in the *same*
    /// scope fails; shadowing in a child scope is allowed.
    pub fn set_name(mut self, scope_id: ScopeId, name: &str, value: Value) -> RunResult<Self> {
        let scope = self
            .scopes
            .get_mut(&scope_id)
            .ok_or_else(|| RunError::internal_error(format!("scope {scope_id} is missing from the scope table")))?;
        if scope.contains(name) {
            return Err(RunError::name_error(format!(
                "name {name} is already defined in this scope"
            )));
        }
        Arc::make_mut(scope).insert(Arc::from(name), value);
        Ok(self)
    }

    /// Removes a name from a scope; does nothing if the name is absent.
    #[must_use]
    pub fn forget_name(mut self, scope_id: ScopeId, name: &str) -> Self {
        if let Some(scope) = self.scopes.get_mut(&scope_id) {
            Arc::make_mut(scope).remove(name);
        }
        self
    }

    /// Bulk-binds names in a scope, overwriting existing bindings. Used by
    /// `import`.
    pub fn set_names(
        mut self,
        scope_id: ScopeId,
        bindings: impl IntoIterator<Item = (Arc<str>, Value)>,
    ) -> RunResult<Self> {
        let scope = self
            .scopes
            .get_mut(&scope_id)
            .ok_or_else(|| RunError::internal_error(format!("scope {scope_id} is missing from the scope table")))?;
        let scope = Arc::make_mut(scope);
        for (name, value) in bindings {
            scope.insert(name, value);
        }
        Ok(self)
    }

    /// Creates a fresh scope under `parent` and makes it current.
    #[must_use]
    pub fn make_scope(mut self, parent: ScopeId, id: ScopeId) -> Self {
        self.scopes.insert(id, Arc::new(Scope::new(Some(parent), id)));
        self.scope_stack = self.scope_stack.push(id);
        self
    }

    /// Inserts a persistent scope into the table without making it current.
    #[must_use]
    pub fn insert_persistent_scope(mut self, parent: Option<ScopeId>, id: ScopeId) -> Self {
        self.scopes.insert(id, Arc::new(Scope::persistent(parent, id)));
        self
    }

    /// Makes an existing scope current.
    #[must_use]
    pub fn push_scope_id(mut self, id: ScopeId) -> Self {
        self.scope_stack = self.scope_stack.push(id);
        self
    }

    /// Pops the current scope off the scope stack, returning its id.
    pub fn pop_scope(mut self) -> RunResult<(ScopeId, Self)> {
        let (id, rest) = self
            .scope_stack
            .pop()
            .ok_or_else(|| RunError::internal_error("popping an empty scope stack"))?;
        self.scope_stack = rest;
        Ok((id, self))
    }

    /// Removes a scope from the table. Persistent scopes and scopes already
    /// gone are left alone, so removal is naturally once-only.
    #[must_use]
    pub fn kill_scope(mut self, id: ScopeId) -> Self {
        let persistent = self.scopes.get(&id).map(|scope| scope.persistent);
        if persistent == Some(false) {
            self.scopes.remove(&id);
        }
        self
    }

    /// The refcounting chain for a scope: the scope and its ancestors, up to
    /// but excluding the well-known scopes, stopping after a persistent one.
    pub(crate) fn scope_chain(&self, id: ScopeId) -> SmallVec<[ScopeId; 8]> {
        let mut chain = SmallVec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            if id == self.builtin || id == self.global {
                break;
            }
            let Some(scope) = self.scopes.get(&id) else {
                break;
            };
            chain.push(id);
            if scope.persistent {
                break;
            }
            current = scope.parent;
        }
        chain
    }

    // ------------------------------------------------------------------
    // Boxes
    // ------------------------------------------------------------------

    /// Allocates a fresh box holding `value` and returns its handle.
    pub fn add_box(mut self, value: Value) -> (BoxId, Self) {
        self.last_box_id += 1;
        let id = BoxId(self.last_box_id);
        self.boxes.insert(id, Stack::empty().push(value));
        (id, self)
    }

    fn box_log(&self, id: BoxId) -> RunResult<&Stack> {
        self.boxes
            .get(&id)
            .ok_or_else(|| RunError::box_error(format!("box {id} was deallocated or never existed")))
    }

    /// The innermost (topmost, possibly uncommitted) value of a box.
    pub fn read_box_top(&self, id: BoxId) -> RunResult<Value> {
        self.box_log(id)?
            .peek()
            .cloned()
            .ok_or_else(|| RunError::internal_error(format!("box {id} has an empty transaction log")))
    }

    /// The committed (bottommost) value of a box.
    pub fn read_box_committed(&self, id: BoxId) -> RunResult<Value> {
        let log = self.box_log(id)?;
        let mut committed = None;
        for value in log.iter() {
            committed = Some(value);
        }
        committed
            .cloned()
            .ok_or_else(|| RunError::internal_error(format!("box {id} has an empty transaction log")))
    }

    /// Replaces the topmost entry of a box's transaction log.
    pub fn write_box(mut self, id: BoxId, value: Value) -> RunResult<Self> {
        let log = self.box_log(id)?;
        let (_, rest) = log
            .pop()
            .ok_or_else(|| RunError::internal_error(format!("box {id} has an empty transaction log")))?;
        self.boxes.insert(id, rest.push(value));
        Ok(self)
    }

    /// Begins a transaction: the current top is pushed as a new entry.
    pub fn begin_box(mut self, id: BoxId) -> RunResult<Self> {
        let log = self.box_log(id)?;
        let top = log
            .peek()
            .cloned()
            .ok_or_else(|| RunError::internal_error(format!("box {id} has an empty transaction log")))?;
        let log = log.push(top);
        self.boxes.insert(id, log);
        Ok(self)
    }

    /// Commits the innermost transaction: the now-shadowed previous entry is
    /// dropped, keeping the new top.
    pub fn commit_box(mut self, id: BoxId) -> RunResult<Self> {
        let log = self.box_log(id)?;
        let (top, rest) = log
            .pop()
            .ok_or_else(|| RunError::internal_error(format!("box {id} has an empty transaction log")))?;
        let (_shadowed, rest) = rest
            .pop()
            .ok_or_else(|| RunError::box_error("committing with no transaction in progress"))?;
        self.boxes.insert(id, rest.push(top));
        Ok(self)
    }

    /// Rolls the innermost transaction back, returning the discarded value.
    pub fn rollback_box(mut self, id: BoxId) -> RunResult<(Value, Self)> {
        let log = self.box_log(id)?;
        let (top, rest) = log
            .pop()
            .ok_or_else(|| RunError::internal_error(format!("box {id} has an empty transaction log")))?;
        if rest.is_empty() {
            return Err(RunError::box_error("rolling back with no transaction in progress"));
        }
        self.boxes.insert(id, rest);
        Ok((top, self))
    }

    /// Deallocates a box.
    pub fn kill_box(mut self, id: BoxId) -> RunResult<Self> {
        if self.boxes.remove(&id).is_none() {
            return Err(RunError::box_error(format!("box {id} was already deallocated")));
        }
        Ok(self)
    }

    /// Number of open transactions on a box.
    pub fn open_transactions(&self, id: BoxId) -> RunResult<usize> {
        Ok(self.box_log(id)?.depth().saturating_sub(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boot() -> State {
        let builtin = Scope::persistent(None, ScopeId::fresh());
        let global = Scope::persistent(Some(builtin.id), ScopeId::fresh());
        State::make(builtin, global)
    }

    #[test]
    fn lookup_walks_the_parent_chain() {
        let state = boot();
        let global = state.global_scope_id();
        let builtin = state.builtin_scope_id();
        let state = state.set_name(builtin, "x", Value::Int(1)).unwrap();
        assert!(matches!(state.look_up_name_in(global, "x").unwrap(), Value::Int(1)));
    }

    #[test]
    fn rebinding_in_the_same_scope_fails() {
        let state = boot();
        let global = state.global_scope_id();
        let state = state.set_name(global, "x", Value::Int(1)).unwrap();
        let err = state.set_name(global, "x", Value::Int(2)).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::NameError);
    }

    #[test]
    fn shadowing_in_a_child_scope_is_allowed() {
        let state = boot();
        let global = state.global_scope_id();
        let state = state.set_name(global, "x", Value::Int(1)).unwrap();
        let child = ScopeId::fresh();
        let state = state.make_scope(global, child);
        let state = state.set_name(child, "x", Value::Int(2)).unwrap();
        assert!(matches!(state.look_up_name_in(child, "x").unwrap(), Value::Int(2)));
        assert!(matches!(state.look_up_name_in(global, "x").unwrap(), Value::Int(1)));
    }

    #[test]
    fn box_transactions_track_log_depth() {
        let state = boot();
        let (id, state) = state.add_box(Value::Int(1));
        assert_eq!(state.open_transactions(id).unwrap(), 0);
        let state = state.begin_box(id).unwrap();
        assert_eq!(state.open_transactions(id).unwrap(), 1);
        let state = state.write_box(id, Value::Int(2)).unwrap();
        assert!(matches!(state.read_box_top(id).unwrap(), Value::Int(2)));
        assert!(matches!(state.read_box_committed(id).unwrap(), Value::Int(1)));
        let state = state.commit_box(id).unwrap();
        assert_eq!(state.open_transactions(id).unwrap(), 0);
        assert!(matches!(state.read_box_committed(id).unwrap(), Value::Int(2)));
    }

    #[test]
    fn committing_without_a_transaction_fails() {
        let state = boot();
        let (id, state) = state.add_box(Value::Int(1));
        let err = state.clone().commit_box(id).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::BoxError);
        let err = state.rollback_box(id).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::BoxError);
    }

    #[test]
    fn snapshots_do_not_observe_later_updates() {
        let state = boot();
        let global = state.global_scope_id();
        let snapshot = state.clone();
        let state = state.set_name(global, "x", Value::Int(1)).unwrap();
        assert!(state.look_up_name_in(global, "x").is_ok());
        assert!(snapshot.look_up_name_in(global, "x").is_err());
    }
}
