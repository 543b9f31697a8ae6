//! Indirection cells for recursive bindings.
//!
//! A [`Cell`] is created empty, before the value it will hold exists, so a
//! closure can capture a handle to it and later call "itself" through it.
//! The binding scope owns the `Cell`; closures capture a [`WeakCell`]. The
//! ownership graph therefore never contains the cycle
//! `cell -> closure -> cell`, and dropping the scope's `Cell` frees the slot
//! and everything bound in it.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::error::{RuntimeError, RuntimeResult};
use crate::leak_detector::{self, Tracked};
use crate::logging::{self, LogLevel};
use crate::value::Value;

const LOG_TARGET: &str = "boxrt::cell";

struct Slot {
    value: Option<Value>,
}

impl Slot {
    fn empty() -> Self {
        leak_detector::record_alloc(Tracked::Cell);
        Slot { value: None }
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        leak_detector::record_release(Tracked::Cell);
    }
}

fn read(slot: &RefCell<Slot>) -> RuntimeResult<Value> {
    slot.borrow()
        .value
        .clone()
        .ok_or(RuntimeError::UninitializedCell)
}

/// Read access shared by [`Cell`] and [`WeakCell`]. Calls and indexing are
/// forwarded to the currently bound value.
pub trait CellRead {
    fn get(&self) -> RuntimeResult<Value>;

    fn invoke(&self, arg: &Value) -> RuntimeResult<Value> {
        self.get()?.invoke(arg)
    }

    fn invoke_effect(&self) -> RuntimeResult<Value> {
        self.get()?.invoke_effect()
    }

    fn get_index(&self, index: i32) -> RuntimeResult<Value> {
        self.get()?.get_index(index)
    }

    fn get_key(&self, key: &str) -> RuntimeResult<Value> {
        self.get()?.get_key(key)
    }
}

/// Strong owner of an indirection slot. Not `Clone`: the binding scope is
/// the only strong owner.
///
/// Generated code must keep the `Cell` alive for as long as any closure that
/// captured one of its [`WeakCell`] handles can still be called. A closure
/// returned out of the binding scope without its `Cell` fails with
/// [`RuntimeError::ReleasedCell`] on its next recursive call.
pub struct Cell {
    slot: Rc<RefCell<Slot>>,
}

impl Cell {
    pub fn new() -> Self {
        Cell {
            slot: Rc::new(RefCell::new(Slot::empty())),
        }
    }

    /// Creates a cell and binds it to the value built from its own weak
    /// handle, the shape of a directly self-recursive binding.
    pub fn rec<F>(build: F) -> Cell
    where
        F: FnOnce(WeakCell) -> Value,
    {
        let cell = Cell::new();
        let value = build(cell.downgrade());
        cell.assign(value);
        cell
    }

    /// Binds the slot. A later assignment replaces the value and releases the
    /// previous occupant.
    pub fn assign(&self, value: Value) {
        let previous = self.slot.borrow_mut().value.replace(value);
        if let Some(previous) = previous {
            if logging::log_enabled(LogLevel::Trace, LOG_TARGET) {
                logging::log(
                    LogLevel::Trace,
                    LOG_TARGET,
                    "rebinding indirection cell",
                    vec![("previous".to_string(), Value::from(previous.type_name()))],
                );
            }
        }
    }

    pub fn is_bound(&self) -> bool {
        self.slot.borrow().value.is_some()
    }

    pub fn downgrade(&self) -> WeakCell {
        WeakCell {
            slot: Rc::downgrade(&self.slot),
        }
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::new()
    }
}

impl CellRead for Cell {
    fn get(&self) -> RuntimeResult<Value> {
        read(&self.slot)
    }
}

impl std::fmt::Debug for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.slot.try_borrow() {
            Ok(slot) => match &slot.value {
                Some(v) => write!(f, "Cell({:?})", v),
                None => write!(f, "Cell(<empty>)"),
            },
            Err(_) => write!(f, "Cell(<borrowed>)"),
        }
    }
}

/// Non-owning handle to a [`Cell`], captured by closures in a recursive group.
#[derive(Clone)]
pub struct WeakCell {
    slot: Weak<RefCell<Slot>>,
}

impl WeakCell {
    /// True while the owning [`Cell`] is alive.
    pub fn is_live(&self) -> bool {
        self.slot.strong_count() > 0
    }
}

impl CellRead for WeakCell {
    fn get(&self) -> RuntimeResult<Value> {
        let slot = self.slot.upgrade().ok_or(RuntimeError::ReleasedCell)?;
        read(&slot)
    }
}

impl std::fmt::Debug for WeakCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_live() {
            write!(f, "WeakCell(live)")
        } else {
            write!(f, "WeakCell(released)")
        }
    }
}
