//! The value universe and the flat instruction set.
//!
//! `Value` and `Instruction` are dense tagged sums with exhaustive matching;
//! the interpreter's hot loop dispatches on them directly. Heap-backed
//! variants (strings, vecs, code) are `Arc`-shared so cloning a value is a
//! refcount bump.

use std::{fmt, sync::Arc};

use enumflags2::{BitFlags, bitflags};
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::{
    error::{RunError, RunResult},
    intern::{AtomId, atom, atom_label},
    retain::ScopeRetain,
    state::{BoxId, ScopeId, State},
};

/// Behavior flags carried by code values.
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeFlag {
    /// Run the body in the caller's scope instead of opening a fresh child of
    /// the closure scope. This is the splice used for tail recursion and for
    /// builtin glue code.
    ParentScope = 0b1,
}

/// A quoted program plus its captured lexical scope.
#[derive(Debug)]
pub struct Code {
    /// The body, in execution order.
    pub instructions: Arc<[Instruction]>,
    /// The captured scope id, if any. `None` means the body runs in the
    /// caller's scope when called.
    pub closure: Option<ScopeId>,
    pub flags: BitFlags<CodeFlag>,
    /// Display name; anonymous blocks are called `λ`.
    pub name: Arc<str>,
    /// Original source text, when the block came from the parser.
    pub source: Option<Arc<str>>,
    /// Keeps the closure scope alive while any clone of this code exists.
    pub(crate) retain: Option<Arc<ScopeRetain>>,
}

impl Code {
    /// A code value with no closure and `ParentScope` set: calling it splices
    /// the body into the caller's scope.
    pub fn raw(instructions: impl Into<Arc<[Instruction]>>, name: &str) -> Self {
        Self {
            instructions: instructions.into(),
            closure: None,
            flags: CodeFlag::ParentScope.into(),
            name: Arc::from(name),
            source: None,
            retain: None,
        }
    }

    pub fn is_parent_scope(&self) -> bool {
        self.flags.contains(CodeFlag::ParentScope)
    }

    /// A copy of this code under a different display name. The closure
    /// retention is shared, not re-counted.
    #[must_use]
    pub fn with_name(&self, name: &str) -> Self {
        Self {
            instructions: Arc::clone(&self.instructions),
            closure: self.closure,
            flags: self.flags,
            name: Arc::from(name),
            source: self.source.clone(),
            retain: self.retain.clone(),
        }
    }

    /// A copy of this code with extra flags set.
    #[must_use]
    pub fn with_flags(&self, flags: BitFlags<CodeFlag>) -> Self {
        Self {
            instructions: Arc::clone(&self.instructions),
            closure: self.closure,
            flags: self.flags | flags,
            name: Arc::clone(&self.name),
            source: self.source.clone(),
            retain: self.retain.clone(),
        }
    }

    /// A copy of this code with instructions prepended to the body.
    #[must_use]
    pub fn with_prelude(&self, prefix: Vec<Instruction>) -> Self {
        let mut instructions = prefix;
        instructions.extend(self.instructions.iter().cloned());
        Self {
            instructions: instructions.into(),
            closure: self.closure,
            flags: self.flags,
            name: Arc::clone(&self.name),
            source: self.source.clone(),
            retain: self.retain.clone(),
        }
    }
}

type NativeFn = dyn Fn(State) -> RunResult<State> + Send + Sync;

/// A host callable exposed to the language: `State → State`.
///
/// Identity (and therefore language-level equality) is pointer identity of
/// the underlying function object.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: Arc<str>,
    run: Arc<NativeFn>,
}

impl NativeFunction {
    pub fn new(
        name: &str,
        run: impl Fn(State) -> RunResult<State> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: Arc::from(name),
            run: Arc::new(run),
        }
    }

    /// Invokes the native. On failure the error is attributed to this
    /// function together with the stack it saw.
    pub fn call(&self, state: State) -> RunResult<State> {
        let stack = state.stack().clone();
        (self.run)(state).map_err(|err| err.in_function(&self.name, &stack))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.run, &other.run)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Small integer fast path.
    Int(i64),
    /// Arbitrary-precision integer; arithmetic promotes here on overflow
    /// instead of wrapping. Values that fit `i64` are normalized to `Int`.
    BigInt(Arc<BigInt>),
    /// Immutable string.
    Str(Arc<str>),
    /// Interned symbolic name, e.g. `:true`.
    Atom(AtomId),
    /// Immutable tuple with structural equality.
    Vec(Arc<[Value]>),
    /// First-class quoted program.
    Code(Arc<Code>),
    /// Host callable.
    Native(NativeFunction),
    /// Handle to a mutable cell in the state's box store.
    Box(BoxId),
}

impl Value {
    /// Wraps a big integer, normalizing to the `Int` fast path when it fits.
    pub fn from_bigint(value: BigInt) -> Self {
        match value.to_i64() {
            Some(small) => Self::Int(small),
            None => Self::BigInt(Arc::new(value)),
        }
    }

    pub fn str(value: impl Into<Arc<str>>) -> Self {
        Self::Str(value.into())
    }

    pub fn atom(label: &str) -> Self {
        Self::Atom(atom(label))
    }

    pub fn bool_atom(value: bool) -> Self {
        Self::Atom(crate::intern::atom_bool(value))
    }

    pub fn vec(values: Vec<Self>) -> Self {
        Self::Vec(values.into())
    }

    pub fn code(code: Code) -> Self {
        Self::Code(Arc::new(code))
    }

    /// The tag name used in error messages.
    pub fn tag_name(&self) -> &'static str {
        match self {
            Self::Int(_) | Self::BigInt(_) => "int",
            Self::Str(_) => "str",
            Self::Atom(_) => "atom",
            Self::Vec(_) => "vec",
            Self::Code(_) => "code",
            Self::Native(_) => "native",
            Self::Box(_) => "box",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Self::Code(_) | Self::Native(_))
    }

    /// Language-level equality, as invoked by `=`.
    ///
    /// Int/Str/Vec compare structurally, atoms by identity, code and natives
    /// only to themselves, boxes by id. Comparing values of different tags is
    /// a type error rather than `false`, as is comparing vecs of different
    /// lengths.
    pub fn language_eq(&self, other: &Self) -> RunResult<bool> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Ok(a == b),
            (Self::Int(a), Self::BigInt(b)) | (Self::BigInt(b), Self::Int(a)) => {
                Ok(**b == BigInt::from(*a))
            }
            (Self::BigInt(a), Self::BigInt(b)) => Ok(a == b),
            (Self::Str(a), Self::Str(b)) => Ok(a == b),
            (Self::Atom(a), Self::Atom(b)) => Ok(a == b),
            (Self::Vec(a), Self::Vec(b)) => {
                if a.len() != b.len() {
                    return Err(RunError::type_error(format!(
                        "tuples {} and {} are of different lengths",
                        render_source(self),
                        render_source(other),
                    )));
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    if !x.language_eq(y)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (Self::Code(a), Self::Code(b)) => Ok(Arc::ptr_eq(a, b)),
            (Self::Native(a), Self::Native(b)) => Ok(a.ptr_eq(b)),
            (Self::Box(a), Self::Box(b)) => Ok(a == b),
            _ => Err(RunError::type_error(format!(
                "{} and {} are of different types",
                render_source(self),
                render_source(other),
            ))),
        }
    }

    /// Identity, as invoked by `is`. Never fails; different tags are simply
    /// not the same value.
    pub fn is_same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::BigInt(a), Self::BigInt(b)) => Arc::ptr_eq(a, b),
            (Self::Str(a), Self::Str(b)) => Arc::ptr_eq(a, b),
            (Self::Atom(a), Self::Atom(b)) => a == b,
            (Self::Vec(a), Self::Vec(b)) => Arc::ptr_eq(a, b),
            (Self::Code(a), Self::Code(b)) => Arc::ptr_eq(a, b),
            (Self::Native(a), Self::Native(b)) => a.ptr_eq(b),
            (Self::Box(a), Self::Box(b)) => a == b,
            _ => false,
        }
    }

    /// Structural comparison that treats tag mismatches (and length
    /// mismatches) as plain inequality instead of failing. This is the
    /// comparison the pattern matcher uses for literals.
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Vec(a), Self::Vec(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loose_eq(y))
            }
            _ => self.language_eq(other).unwrap_or(false),
        }
    }
}

impl fmt::Display for Value {
    /// The `str` rendering: strings print their contents unquoted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::BigInt(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Atom(id) => write!(f, ":{}", atom_label(*id)),
            Self::Vec(values) => {
                write!(f, "(")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, ")")
            }
            Self::Code(code) => match (&*code.name, &code.source) {
                ("λ", Some(source)) => write!(f, "{source}"),
                ("λ", None) => write!(f, "{{...}}"),
                (name, _) => write!(f, "{name}"),
            },
            Self::Native(native) => write!(f, "`{}`", native.name),
            Self::Box(id) => write!(f, "<box {id}>"),
        }
    }
}

/// The source-like rendering: like `Display`, but strings are quoted.
pub fn render_source(value: &Value) -> String {
    match value {
        Value::Str(s) => format!("{s:?}"),
        other => other.to_string(),
    }
}

/// A single step executed by the interpreter.
#[derive(Debug, Clone)]
pub enum Instruction {
    /// Push a value.
    Put(Value),
    /// Materialize a code value capturing the current scope as its closure.
    PutCode {
        body: Arc<[Instruction]>,
        source: Option<Arc<str>>,
    },
    /// Look up a name in the current scope chain and call it.
    CallByName(Arc<str>),
    /// Pop the top of the stack (code or native) and call it.
    CallByValue,
    /// Pop `n` values and collect them into a vec, preserving push order.
    MakeVec(usize),
    /// Open a fresh scope as a child of the given scope.
    MakeScope(ScopeId),
    /// Close the current scope.
    PopScope,
}

impl Instruction {
    /// Short operation name, used by tracing middleware.
    pub fn op_name(&self) -> &'static str {
        match self {
            Self::Put(_) => "put",
            Self::PutCode { .. } => "put-code",
            Self::CallByName(_) => "call-by-name",
            Self::CallByValue => "call-by-value",
            Self::MakeVec(_) => "make-vec",
            Self::MakeScope(_) => "make-scope",
            Self::PopScope => "pop-scope",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bigint_normalizes_to_int_when_it_fits() {
        let value = Value::from_bigint(BigInt::from(7));
        assert!(matches!(value, Value::Int(7)));
    }

    #[test]
    fn equality_is_structural_for_vecs() {
        let a = Value::vec(vec![Value::Int(1), Value::str("x")]);
        let b = Value::vec(vec![Value::Int(1), Value::str("x")]);
        assert!(a.language_eq(&b).unwrap());
    }

    #[test]
    fn equality_across_tags_is_an_error() {
        let err = Value::Int(1).language_eq(&Value::str("1")).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::TypeError);
    }

    #[test]
    fn vecs_of_different_lengths_do_not_compare() {
        let a = Value::vec(vec![Value::Int(1)]);
        let b = Value::vec(vec![Value::Int(1), Value::Int(2)]);
        assert!(a.language_eq(&b).is_err());
        assert!(!a.loose_eq(&b));
    }

    #[test]
    fn atoms_are_identical_when_labels_match() {
        assert!(Value::atom("x").is_same(&Value::atom("x")));
        assert!(!Value::atom("x").is_same(&Value::atom("y")));
    }

    #[test]
    fn code_values_are_only_equal_to_themselves() {
        let code = Value::code(Code::raw(vec![Instruction::CallByValue], "!"));
        let other = Value::code(Code::raw(vec![Instruction::CallByValue], "!"));
        assert!(code.language_eq(&code.clone()).unwrap());
        assert!(!code.language_eq(&other).unwrap());
    }
}
