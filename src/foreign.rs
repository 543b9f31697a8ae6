//! Per-unit foreign export registry.
//!
//! Natively implemented functions are grouped by compiled unit. A unit
//! registers an initializer once per process; its export Dictionary is built
//! on first access and reused afterwards. Values hold `Rc` handles, so each
//! thread materializes its own copy of a unit's Dictionary from the shared
//! initializer.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;
use std::sync::{Mutex, OnceLock};

use crate::containers::DictValue;
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging::{self, LogLevel};
use crate::mangle::mangle;
use crate::value::{DictRef, Value};

const LOG_TARGET: &str = "boxrt::foreign";

/// Populates a unit's exports.
pub type UnitInit = fn(&mut Exports) -> RuntimeResult<()>;

fn registry() -> &'static Mutex<BTreeMap<String, UnitInit>> {
    static REGISTRY: OnceLock<Mutex<BTreeMap<String, UnitInit>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(BTreeMap::new()))
}

thread_local! {
    static MATERIALIZED: RefCell<HashMap<String, DictRef>> = RefCell::new(HashMap::new());
    static INITIALIZING: RefCell<HashSet<String>> = RefCell::new(HashSet::new());
}

fn poisoned() -> RuntimeError {
    RuntimeError::InternalError("foreign registry lock poisoned".to_string())
}

fn teardown() -> RuntimeError {
    RuntimeError::InternalError("foreign registry used during thread teardown".to_string())
}

/// Marks a unit as initializing on this thread until dropped.
struct InitGuard {
    unit: String,
}

impl InitGuard {
    fn enter(unit: &str) -> RuntimeResult<InitGuard> {
        let fresh = INITIALIZING
            .try_with(|units| units.borrow_mut().insert(unit.to_string()))
            .map_err(|_| teardown())?;
        if !fresh {
            return Err(RuntimeError::CyclicUnit {
                unit: unit.to_string(),
            });
        }
        Ok(InitGuard {
            unit: unit.to_string(),
        })
    }
}

impl Drop for InitGuard {
    fn drop(&mut self) {
        let _ = INITIALIZING.try_with(|units| units.borrow_mut().remove(&self.unit));
    }
}

/// Builder handed to a unit initializer.
pub struct Exports {
    unit: String,
    dict: DictValue,
}

impl Exports {
    fn new(unit: &str) -> Self {
        Exports {
            unit: unit.to_string(),
            dict: DictValue::new(),
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Stores `value` under the mangled form of `name`.
    pub fn define(&mut self, name: &str, value: Value) -> RuntimeResult<()> {
        let key = mangle(name);
        if self.dict.contains_key(&key) {
            return Err(RuntimeError::DuplicateExport {
                unit: self.unit.clone(),
                name: name.to_string(),
            });
        }
        self.dict.set(&key, value);
        Ok(())
    }

    pub fn define_function<F>(&mut self, name: &str, func: F) -> RuntimeResult<()>
    where
        F: Fn(&Value) -> RuntimeResult<Value> + 'static,
    {
        self.define(name, Value::named_function(name, func))
    }

    pub fn len(&self) -> usize {
        self.dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }
}

pub fn register_unit(unit: &str, init: UnitInit) -> RuntimeResult<()> {
    let mut units = registry().lock().map_err(|_| poisoned())?;
    if units.contains_key(unit) {
        return Err(RuntimeError::DuplicateUnit {
            unit: unit.to_string(),
        });
    }
    units.insert(unit.to_string(), init);
    Ok(())
}

pub fn is_registered(unit: &str) -> bool {
    registry()
        .lock()
        .map(|units| units.contains_key(unit))
        .unwrap_or(false)
}

pub fn registered_units() -> Vec<String> {
    registry()
        .lock()
        .map(|units| units.keys().cloned().collect())
        .unwrap_or_default()
}

fn cached(unit: &str) -> Option<DictRef> {
    MATERIALIZED
        .try_with(|units| units.borrow().get(unit).cloned())
        .ok()
        .flatten()
}

/// Returns the unit's export Dictionary, running its initializer the first
/// time this thread asks for it.
pub fn exports(unit: &str) -> RuntimeResult<Value> {
    if let Some(dict) = cached(unit) {
        return Ok(Value::Dict(dict));
    }

    // Copy the initializer out so it can itself reach other units.
    let init = {
        let units = registry().lock().map_err(|_| poisoned())?;
        *units.get(unit).ok_or_else(|| RuntimeError::UnknownUnit {
            unit: unit.to_string(),
        })?
    };

    // Reaching this unit again before its initializer returns is a cycle.
    let guard = InitGuard::enter(unit)?;
    let mut builder = Exports::new(unit);
    init(&mut builder)?;
    drop(guard);

    let count = builder.len();
    let dict = Rc::new(RefCell::new(builder.dict));

    MATERIALIZED
        .try_with(|units| {
            units
                .borrow_mut()
                .insert(unit.to_string(), Rc::clone(&dict));
        })
        .map_err(|_| teardown())?;

    if logging::log_enabled(LogLevel::Debug, LOG_TARGET) {
        logging::log(
            LogLevel::Debug,
            LOG_TARGET,
            "materialized foreign exports",
            vec![
                ("unit".to_string(), Value::from(unit)),
                ("exports".to_string(), Value::from(count.to_string())),
            ],
        );
    }

    Ok(Value::Dict(dict))
}

/// Looks up `name` (unmangled) in the unit's exports.
pub fn lookup(unit: &str, name: &str) -> RuntimeResult<Value> {
    exports(unit)?.get_key(&mangle(name))
}

/// Declares a foreign unit and a function that registers it.
///
/// Each `"name" => value` pair becomes an [`Exports::define`] call in the
/// unit's initializer. The generated function registers the unit on its first
/// call and returns that same outcome on every later call.
///
/// ```
/// use boxrt::{foreign, foreign_unit, Value};
///
/// foreign_unit! {
///     fn register_math("Doc.Math") {
///         "pi" => Value::Float(std::f64::consts::PI),
///         "negate" => Value::function(|x| Ok(Value::Int(-x.as_int()?))),
///     }
/// }
///
/// register_math().unwrap();
/// register_math().unwrap();
/// let negate = foreign::lookup("Doc.Math", "negate").unwrap();
/// assert_eq!(negate.invoke(&Value::Int(2)).and_then(|v| v.as_int()), Ok(-2));
/// ```
#[macro_export]
macro_rules! foreign_unit {
    (
        $(#[$meta:meta])*
        $vis:vis fn $register:ident($unit:expr) {
            $($name:literal => $value:expr),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis fn $register() -> $crate::RuntimeResult<()> {
            fn init(exports: &mut $crate::foreign::Exports) -> $crate::RuntimeResult<()> {
                $(exports.define($name, $value)?;)*
                let _ = exports;
                Ok(())
            }

            static REGISTERED: ::std::sync::OnceLock<$crate::RuntimeResult<()>> =
                ::std::sync::OnceLock::new();
            REGISTERED
                .get_or_init(|| $crate::foreign::register_unit($unit, init))
                .clone()
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prelude(exports: &mut Exports) -> RuntimeResult<()> {
        exports.define_function("negate", |v| Ok(Value::Int(-v.as_int()?)))?;
        exports.define("class", Value::from("reserved"))?;
        exports.define("pi", Value::Float(std::f64::consts::PI))
    }

    fn self_ref(exports: &mut Exports) -> RuntimeResult<()> {
        let _ = lookup("Test.Foreign.SelfRef", "x");
        exports.define("x", Value::Int(1))
    }

    fn ping(exports: &mut Exports) -> RuntimeResult<()> {
        let pong = lookup("Test.Foreign.Pong", "pong")?;
        exports.define("ping", pong)
    }

    fn pong(exports: &mut Exports) -> RuntimeResult<()> {
        let ping = lookup("Test.Foreign.Ping", "ping")?;
        exports.define("pong", ping)
    }

    fn twice(exports: &mut Exports) -> RuntimeResult<()> {
        exports.define("x", Value::Int(1))?;
        exports.define("x", Value::Int(2))
    }

    #[test]
    fn test_exports_are_built_once_per_thread() {
        register_unit("Test.Foreign.Prelude", prelude).unwrap();
        let first = exports("Test.Foreign.Prelude").unwrap();
        let second = exports("Test.Foreign.Prelude").unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(first.as_dict().unwrap().borrow().len(), 3);
    }

    #[test]
    fn test_lookup_uses_mangled_names() {
        register_unit("Test.Foreign.Lookup", prelude).unwrap();
        let negate = lookup("Test.Foreign.Lookup", "negate").unwrap();
        assert_eq!(negate.invoke(&Value::Int(4)).and_then(|v| v.as_int()), Ok(-4));

        let dict = exports("Test.Foreign.Lookup").unwrap();
        assert!(dict.get_key("_class_").is_ok());
        assert_eq!(
            lookup("Test.Foreign.Lookup", "class").unwrap().as_str(),
            Ok("reserved")
        );
    }

    #[test]
    fn test_duplicate_registration() {
        register_unit("Test.Foreign.Dup", prelude).unwrap();
        assert_eq!(
            register_unit("Test.Foreign.Dup", prelude),
            Err(RuntimeError::DuplicateUnit {
                unit: "Test.Foreign.Dup".to_string()
            })
        );
        assert!(is_registered("Test.Foreign.Dup"));
        assert!(registered_units().contains(&"Test.Foreign.Dup".to_string()));
    }

    #[test]
    fn test_duplicate_export_fails_initialization() {
        register_unit("Test.Foreign.Twice", twice).unwrap();
        let err = exports("Test.Foreign.Twice").unwrap_err();
        assert_eq!(
            err,
            RuntimeError::DuplicateExport {
                unit: "Test.Foreign.Twice".to_string(),
                name: "x".to_string()
            }
        );
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_unit() {
        assert!(matches!(
            exports("Test.Foreign.Missing"),
            Err(RuntimeError::UnknownUnit { .. })
        ));
    }

    #[test]
    fn test_self_reference_reports_cycle() {
        register_unit("Test.Foreign.SelfRef", self_ref).unwrap();
        // The inner lookup fails with CyclicUnit; the initializer ignores it.
        let dict = exports("Test.Foreign.SelfRef").unwrap();
        assert_eq!(dict.get_key("x").and_then(|v| v.as_int()), Ok(1));
    }

    #[test]
    fn test_mutual_units_report_cycle() {
        register_unit("Test.Foreign.Ping", ping).unwrap();
        register_unit("Test.Foreign.Pong", pong).unwrap();

        let err = exports("Test.Foreign.Ping").unwrap_err();
        assert_eq!(
            err,
            RuntimeError::CyclicUnit {
                unit: "Test.Foreign.Ping".to_string()
            }
        );
        assert!(err.is_fatal());

        // The failed attempt leaves nothing marked as initializing.
        assert_eq!(exports("Test.Foreign.Ping").unwrap_err(), err);
        assert_eq!(
            exports("Test.Foreign.Pong").unwrap_err(),
            RuntimeError::CyclicUnit {
                unit: "Test.Foreign.Pong".to_string()
            }
        );
    }

    #[test]
    fn test_materialization_is_logged_at_debug() {
        let config = crate::config::RuntimeConfig::from_lookup(|key| match key {
            "BOXRT_LOG" => Some("info,boxrt::foreign=debug".to_string()),
            "BOXRT_LOG_FORMAT" => Some("compact".to_string()),
            _ => None,
        });
        logging::configure(&config).unwrap();
        logging::with_logger(|core| core.sinks = vec![logging::LogSink::memory(16)]).unwrap();

        register_unit("Test.Foreign.Logged", prelude).unwrap();
        exports("Test.Foreign.Logged").unwrap();

        let entries = logging::with_logger(|core| core.memory_entries()).unwrap();
        assert!(entries.contains(
            &"[DEBUG] materialized foreign exports unit=Test.Foreign.Logged exports=3".to_string()
        ));
    }

    crate::foreign_unit! {
        fn register_macro_unit("Test.Foreign.Macro") {
            "answer" => Value::Int(42),
            "do" => Value::from("keyword"),
        }
    }

    #[test]
    fn test_foreign_unit_macro_registers_once() {
        assert_eq!(register_macro_unit(), Ok(()));
        assert_eq!(register_macro_unit(), Ok(()));
        assert_eq!(lookup("Test.Foreign.Macro", "answer").and_then(|v| v.as_int()), Ok(42));
        assert!(exports("Test.Foreign.Macro").unwrap().get_key("_do_").is_ok());
    }
}
