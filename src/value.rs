use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::callable::{Callable, Effect, NativeEffect, NativeFunction};
use crate::containers::{ArrayValue, DictValue};
use crate::error::{violation, RuntimeError, RuntimeResult};

pub type ArrayRef = Rc<RefCell<ArrayValue>>;
pub type DictRef = Rc<RefCell<DictValue>>;

/// Variant tag of a [`Value`]. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Unit,
    Int,
    Float,
    Bool,
    String,
    Array,
    Dict,
    Function,
    Effect,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::Unit => "Unit",
            Kind::Int => "Int",
            Kind::Float => "Float",
            Kind::Bool => "Bool",
            Kind::String => "String",
            Kind::Array => "Array",
            Kind::Dict => "Dictionary",
            Kind::Function => "Function",
            Kind::Effect => "EffectFunction",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The uniform runtime handle for every value produced by compiled code.
///
/// ## Memory model
///
/// Scalars are stored inline. Strings, containers and closures live behind
/// `Rc`, so cloning a `Value` shares the underlying storage and the storage is
/// freed when the last handle goes away. Containers are shared mutable state:
/// a write through one handle is visible through every other handle. Use
/// [`Value::copy_container`] when independent mutation is wanted.
///
/// Reference counting cannot reclaim cycles. Recursive closures must reach
/// themselves through a [`crate::cell::WeakCell`], never by capturing their
/// own `Value`.
#[derive(Clone)]
pub enum Value {
    Unit,
    Int(i32),
    Float(f64),
    Bool(bool),
    String(Rc<str>),
    Array(ArrayRef),
    Dict(DictRef),
    Function(Rc<dyn Callable>),
    Effect(Rc<dyn Effect>),
}

impl Value {
    /// Placeholder for "no value yet" in generated code.
    pub const UNDEFINED: Value = Value::Unit;

    pub fn kind(&self) -> Kind {
        match self {
            Value::Unit => Kind::Unit,
            Value::Int(_) => Kind::Int,
            Value::Float(_) => Kind::Float,
            Value::Bool(_) => Kind::Bool,
            Value::String(_) => Kind::String,
            Value::Array(_) => Kind::Array,
            Value::Dict(_) => Kind::Dict,
            Value::Function(_) => Kind::Function,
            Value::Effect(_) => Kind::Effect,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    // ==================== Construction ====================

    pub fn function<F>(func: F) -> Value
    where
        F: Fn(&Value) -> RuntimeResult<Value> + 'static,
    {
        Value::named_function("<closure>", func)
    }

    pub fn named_function<F>(name: &str, func: F) -> Value
    where
        F: Fn(&Value) -> RuntimeResult<Value> + 'static,
    {
        Value::Function(Rc::new(NativeFunction::new(name, func)))
    }

    pub fn effect<F>(func: F) -> Value
    where
        F: Fn() -> RuntimeResult<Value> + 'static,
    {
        Value::named_effect("<effect>", func)
    }

    pub fn named_effect<F>(name: &str, func: F) -> Value
    where
        F: Fn() -> RuntimeResult<Value> + 'static,
    {
        Value::Effect(Rc::new(NativeEffect::new(name, func)))
    }

    pub fn array<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::from(items.into_iter().collect::<ArrayValue>())
    }

    pub fn dict<K, I>(entries: I) -> Value
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::from(entries.into_iter().collect::<DictValue>())
    }

    // ==================== Identity ====================

    /// Reference identity. Heap-backed variants are identical when they share
    /// storage; inline scalars are identical when tag and bits agree.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => {
                Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
            }
            (Value::Effect(a), Value::Effect(b)) => {
                Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }

    /// Shallow copy of an Array or Dictionary into fresh storage. Every other
    /// variant is returned as another handle to the same value.
    pub fn copy_container(&self) -> Value {
        match self {
            Value::Array(a) => Value::from(a.borrow().clone()),
            Value::Dict(d) => Value::from(d.borrow().clone()),
            other => other.clone(),
        }
    }

    // ==================== Unboxing ====================

    /// Recovers the native datum, checking that the asserted variant matches.
    pub fn unbox<T: Unbox>(&self) -> RuntimeResult<T> {
        match T::unbox_from(self) {
            Some(v) => Ok(v),
            None => violation(self.mismatch(T::KIND)),
        }
    }

    /// Recovers the native datum without checking the variant.
    ///
    /// # Safety
    ///
    /// `self` must hold the variant `T` unboxes from. Anything else is
    /// undefined behavior.
    pub unsafe fn unbox_unchecked<T: Unbox>(&self) -> T {
        // SAFETY: the caller guarantees the variant matches.
        unsafe { T::unbox_from(self).unwrap_unchecked() }
    }

    pub fn as_int(&self) -> RuntimeResult<i32> {
        self.unbox()
    }

    pub fn as_float(&self) -> RuntimeResult<f64> {
        self.unbox()
    }

    pub fn as_bool(&self) -> RuntimeResult<bool> {
        self.unbox()
    }

    pub fn as_str(&self) -> RuntimeResult<&str> {
        match self {
            Value::String(s) => Ok(s),
            other => violation(other.mismatch(Kind::String)),
        }
    }

    pub fn as_array(&self) -> RuntimeResult<&ArrayRef> {
        match self {
            Value::Array(a) => Ok(a),
            other => violation(other.mismatch(Kind::Array)),
        }
    }

    pub fn as_dict(&self) -> RuntimeResult<&DictRef> {
        match self {
            Value::Dict(d) => Ok(d),
            other => violation(other.mismatch(Kind::Dict)),
        }
    }

    fn mismatch(&self, expected: Kind) -> RuntimeError {
        RuntimeError::TypeMismatch {
            expected,
            found: self.kind(),
        }
    }

    // ==================== Invocation ====================

    /// Applies a Function value to one argument.
    pub fn invoke(&self, arg: &Value) -> RuntimeResult<Value> {
        match self {
            Value::Function(func) => func.invoke(arg),
            other => violation(other.mismatch(Kind::Function)),
        }
    }

    /// Runs an EffectFunction value.
    pub fn invoke_effect(&self) -> RuntimeResult<Value> {
        match self {
            Value::Effect(effect) => effect.run(),
            other => violation(other.mismatch(Kind::Effect)),
        }
    }

    // ==================== Indexing ====================

    pub fn get_index(&self, index: i32) -> RuntimeResult<Value> {
        let array = self.as_array()?.borrow();
        match usize::try_from(index).ok().and_then(|i| array.get(i)) {
            Some(v) => Ok(v.clone()),
            None => violation(RuntimeError::IndexOutOfRange {
                index: index.into(),
                len: array.len(),
            }),
        }
    }

    /// Reads an Array element with no variant or bound check.
    ///
    /// # Safety
    ///
    /// `self` must be an Array and `index` must be below its length.
    pub unsafe fn get_index_unchecked(&self, index: usize) -> Value {
        match self {
            // SAFETY: the caller guarantees `index < len`.
            Value::Array(a) => unsafe { a.borrow().get(index).cloned().unwrap_unchecked() },
            // SAFETY: the caller guarantees `self` is an Array.
            _ => unsafe { std::hint::unreachable_unchecked() },
        }
    }

    /// Overwrites an existing Array slot.
    pub fn set_index(&self, index: i32, value: Value) -> RuntimeResult<()> {
        let array = self.as_array()?;
        let previous = {
            let mut array = array.borrow_mut();
            let len = array.len();
            match usize::try_from(index).ok().and_then(|i| array.set(i, value)) {
                Some(previous) => previous,
                None => {
                    return violation(RuntimeError::IndexOutOfRange {
                        index: index.into(),
                        len,
                    })
                }
            }
        };
        // The old occupant is released after the borrow ends.
        drop(previous);
        Ok(())
    }

    pub fn get_key(&self, key: &str) -> RuntimeResult<Value> {
        let dict = self.as_dict()?.borrow();
        match dict.get(key) {
            Some(v) => Ok(v.clone()),
            None => violation(RuntimeError::KeyNotFound {
                key: key.to_string(),
            }),
        }
    }

    /// Inserts or overwrites a Dictionary entry.
    pub fn set_key(&self, key: &str, value: Value) -> RuntimeResult<()> {
        let previous = self.as_dict()?.borrow_mut().set(key, value);
        drop(previous);
        Ok(())
    }

    pub fn array_length(&self) -> RuntimeResult<usize> {
        Ok(self.as_array()?.borrow().len())
    }
}

/// Element count of an Array value.
pub fn array_length(value: &Value) -> RuntimeResult<usize> {
    value.array_length()
}

/// Native data that can be recovered from a [`Value`] of one variant.
pub trait Unbox: Sized {
    const KIND: Kind;

    fn unbox_from(value: &Value) -> Option<Self>;
}

impl Unbox for () {
    const KIND: Kind = Kind::Unit;

    fn unbox_from(value: &Value) -> Option<Self> {
        matches!(value, Value::Unit).then_some(())
    }
}

impl Unbox for i32 {
    const KIND: Kind = Kind::Int;

    fn unbox_from(value: &Value) -> Option<Self> {
        match value {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }
}

impl Unbox for f64 {
    const KIND: Kind = Kind::Float;

    fn unbox_from(value: &Value) -> Option<Self> {
        match value {
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }
}

impl Unbox for bool {
    const KIND: Kind = Kind::Bool;

    fn unbox_from(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl Unbox for String {
    const KIND: Kind = Kind::String;

    fn unbox_from(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.to_string()),
            _ => None,
        }
    }
}

impl Unbox for Rc<str> {
    const KIND: Kind = Kind::String;

    fn unbox_from(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl Unbox for ArrayRef {
    const KIND: Kind = Kind::Array;

    fn unbox_from(value: &Value) -> Option<Self> {
        match value {
            Value::Array(a) => Some(a.clone()),
            _ => None,
        }
    }
}

impl Unbox for DictRef {
    const KIND: Kind = Kind::Dict;

    fn unbox_from(value: &Value) -> Option<Self> {
        match value {
            Value::Dict(d) => Some(d.clone()),
            _ => None,
        }
    }
}

impl Unbox for Rc<dyn Callable> {
    const KIND: Kind = Kind::Function;

    fn unbox_from(value: &Value) -> Option<Self> {
        match value {
            Value::Function(f) => Some(f.clone()),
            _ => None,
        }
    }
}

impl Unbox for Rc<dyn Effect> {
    const KIND: Kind = Kind::Effect;

    fn unbox_from(value: &Value) -> Option<Self> {
        match value {
            Value::Effect(e) => Some(e.clone()),
            _ => None,
        }
    }
}

// ==================== Boxing ====================

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::String(s)
    }
}

impl From<ArrayValue> for Value {
    fn from(array: ArrayValue) -> Self {
        Value::Array(Rc::new(RefCell::new(array)))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::from(ArrayValue::from(items))
    }
}

impl From<DictValue> for Value {
    fn from(dict: DictValue) -> Self {
        Value::Dict(Rc::new(RefCell::new(dict)))
    }
}

/// Narrows a wider integer into an Int. Checked builds report overflow;
/// unchecked builds truncate.
fn int_from_wide(n: i128) -> RuntimeResult<Value> {
    match i32::try_from(n) {
        Ok(v) => Ok(Value::Int(v)),
        Err(_) if cfg!(feature = "unchecked") => Ok(Value::Int(n as i32)),
        Err(_) => Err(RuntimeError::IntegerOverflow { value: n }),
    }
}

impl TryFrom<i64> for Value {
    type Error = RuntimeError;

    fn try_from(n: i64) -> RuntimeResult<Self> {
        int_from_wide(n.into())
    }
}

impl TryFrom<u64> for Value {
    type Error = RuntimeError;

    fn try_from(n: u64) -> RuntimeResult<Self> {
        int_from_wide(n.into())
    }
}

impl TryFrom<usize> for Value {
    type Error = RuntimeError;

    fn try_from(n: usize) -> RuntimeResult<Self> {
        int_from_wide(n as i128)
    }
}

// ==================== Formatting ====================

const MAX_DISPLAY_DEPTH: usize = 16;

fn write_value(f: &mut fmt::Formatter<'_>, value: &Value, depth: usize) -> fmt::Result {
    if depth > MAX_DISPLAY_DEPTH {
        return write!(f, "...");
    }
    match value {
        Value::Unit => write!(f, "()"),
        Value::Int(n) => write!(f, "{}", n),
        Value::Float(n) => write!(f, "{}", n),
        Value::Bool(b) => write!(f, "{}", b),
        Value::String(s) => write!(f, "{}", s),
        Value::Array(items) => {
            let Ok(items) = items.try_borrow() else {
                return write!(f, "[<borrowed>]");
            };
            write!(f, "[")?;
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write_value(f, item, depth + 1)?;
            }
            write!(f, "]")
        }
        Value::Dict(dict) => {
            let Ok(dict) = dict.try_borrow() else {
                return write!(f, "{{<borrowed>}}");
            };
            write!(f, "{{")?;
            for (idx, (k, v)) in dict.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: ", k)?;
                write_value(f, v, depth + 1)?;
            }
            write!(f, "}}")
        }
        Value::Function(func) => write!(f, "<function {}>", func.name()),
        Value::Effect(effect) => write!(f, "<effect {}>", effect.name()),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, 0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "String({:?})", s),
            other => write!(f, "{}({})", other.type_name(), other),
        }
    }
}
