//! boxrt - boxed value runtime and naming contract
//!
//! Generated code represents every runtime datum as a [`Value`], reaches
//! natively implemented functions through the [`foreign`] registry, and names
//! everything it emits with [`mangle`].
//!
//! # Example
//! ```
//! use boxrt::{mangle, Cell, CellRead, Value};
//!
//! let xs = Value::array([Value::Int(1), Value::Int(2), Value::Int(3)]);
//! assert_eq!(boxrt::array_length(&xs), Ok(3));
//!
//! let fact = Cell::rec(|me| {
//!     Value::function(move |n| {
//!         let n = n.as_int()?;
//!         if n <= 1 {
//!             Ok(Value::Int(1))
//!         } else {
//!             Ok(Value::Int(n * me.invoke(&Value::Int(n - 1))?.as_int()?))
//!         }
//!     })
//! });
//! assert_eq!(fact.invoke(&Value::Int(5)).and_then(|v| v.as_int()), Ok(120));
//!
//! assert_eq!(mangle("class"), "_class_");
//! ```

pub mod callable;
pub mod cell;
pub mod config;
pub mod containers;
pub mod error;
pub mod foreign;
pub mod leak_detector;
pub mod logging;
pub mod mangle;
pub mod value;

// Re-export commonly used types
pub use cell::{Cell, CellRead, WeakCell};
pub use config::{BuildMode, RuntimeConfig};
pub use containers::{ArrayValue, DictValue};
pub use error::{RuntimeError, RuntimeResult};
pub use mangle::{is_reserved_form, mangle};
pub use value::{array_length, Kind, Value};
