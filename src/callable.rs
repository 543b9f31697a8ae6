//! Type-erased callables stored inside `Value::Function` and
//! `Value::Effect`.

use std::fmt;

use crate::error::RuntimeResult;
use crate::leak_detector::{self, Tracked};
use crate::value::Value;

/// A one-argument function value.
pub trait Callable {
    fn invoke(&self, arg: &Value) -> RuntimeResult<Value>;

    fn name(&self) -> &str {
        "<closure>"
    }
}

/// A zero-argument effectful function value.
pub trait Effect {
    fn run(&self) -> RuntimeResult<Value>;

    fn name(&self) -> &str {
        "<effect>"
    }
}

/// A native closure wrapped as a [`Callable`].
pub struct NativeFunction<F> {
    name: String,
    func: F,
}

impl<F> NativeFunction<F>
where
    F: Fn(&Value) -> RuntimeResult<Value>,
{
    pub fn new(name: &str, func: F) -> Self {
        leak_detector::record_alloc(Tracked::Function);
        NativeFunction {
            name: name.to_string(),
            func,
        }
    }
}

impl<F> Callable for NativeFunction<F>
where
    F: Fn(&Value) -> RuntimeResult<Value>,
{
    fn invoke(&self, arg: &Value) -> RuntimeResult<Value> {
        (self.func)(arg)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> Drop for NativeFunction<F> {
    fn drop(&mut self) {
        leak_detector::record_release(Tracked::Function);
    }
}

impl<F> fmt::Debug for NativeFunction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

/// A native closure wrapped as an [`Effect`].
pub struct NativeEffect<F> {
    name: String,
    func: F,
}

impl<F> NativeEffect<F>
where
    F: Fn() -> RuntimeResult<Value>,
{
    pub fn new(name: &str, func: F) -> Self {
        leak_detector::record_alloc(Tracked::Effect);
        NativeEffect {
            name: name.to_string(),
            func,
        }
    }
}

impl<F> Effect for NativeEffect<F>
where
    F: Fn() -> RuntimeResult<Value>,
{
    fn run(&self) -> RuntimeResult<Value> {
        (self.func)()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> Drop for NativeEffect<F> {
    fn drop(&mut self) {
        leak_detector::record_release(Tracked::Effect);
    }
}

impl<F> fmt::Debug for NativeEffect<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeEffect({})", self.name)
    }
}
