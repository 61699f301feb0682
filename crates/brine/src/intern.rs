//! Process-wide atom interning.
//!
//! Atoms are symbolic names like `:true`. Two atoms with equal labels are the
//! same atom, so equality and identity coincide; many builtins rely on this by
//! comparing ids. The intern table is the one process-global structure in the
//! interpreter and is mutex-guarded: `run-concurrently` threads may intern
//! concurrently.

use std::sync::{Arc, LazyLock, Mutex};

use ahash::AHashMap;

/// Index into the atom intern table.
///
/// Uses `u32` to keep `Value` small; ~4 billion distinct atoms is far more
/// than any program will create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(u32);

impl AtomId {
    /// Returns the raw index value.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

struct AtomTable {
    labels: Vec<Arc<str>>,
    ids: AHashMap<Arc<str>, AtomId>,
}

impl AtomTable {
    fn intern(&mut self, label: &str) -> AtomId {
        if let Some(&id) = self.ids.get(label) {
            return id;
        }
        let id = AtomId(u32::try_from(self.labels.len()).expect("atom table overflow"));
        let label: Arc<str> = Arc::from(label);
        self.labels.push(Arc::clone(&label));
        self.ids.insert(label, id);
        id
    }
}

static ATOMS: LazyLock<Mutex<AtomTable>> = LazyLock::new(|| {
    Mutex::new(AtomTable {
        labels: Vec::new(),
        ids: AHashMap::new(),
    })
});

/// Returns the canonical atom for `label`, interning it on first use.
///
/// This is the smart constructor behind every `Atom` value: calling it twice
/// with equal labels returns the same id.
pub fn atom(label: &str) -> AtomId {
    ATOMS.lock().expect("atom table poisoned").intern(label)
}

/// Returns the label of an interned atom.
pub fn atom_label(id: AtomId) -> Arc<str> {
    let table = ATOMS.lock().expect("atom table poisoned");
    Arc::clone(&table.labels[id.index()])
}

/// The `:true` / `:false` atom for a host boolean.
pub fn atom_bool(value: bool) -> AtomId {
    if value { atom("true") } else { atom("false") }
}
