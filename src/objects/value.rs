//! Dynamic values handled by the class system

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{ClassError, Instance};

/// Instance fields and class attributes are stored as name -> value pairs
pub type Properties = HashMap<String, Value>;

type NativeFn = dyn Fn(&[Value]) -> Result<Value, ClassError> + Send + Sync;

/// A callable value.
///
/// Methods are plain functions whose first argument is the receiving
/// instance; [`Function::method`] builds one from a closure that takes the
/// receiver separately.
#[derive(Clone)]
pub struct Function(Arc<NativeFn>);

impl Function {
    /// Wrap a closure taking the raw argument list
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, ClassError> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Wrap a method body; the first argument must be an instance
    pub fn method<F>(f: F) -> Self
    where
        F: Fn(&Instance, &[Value]) -> Result<Value, ClassError> + Send + Sync + 'static,
    {
        Self::new(move |args| match args.split_first() {
            Some((Value::Instance(this), rest)) => f(this, rest),
            _ => Err(ClassError::MissingReceiver),
        })
    }

    /// A function that ignores its arguments and returns nil
    pub fn noop() -> Self {
        Self::new(|_| Ok(Value::Nil))
    }

    /// Invoke the function
    pub fn call(&self, args: &[Value]) -> Result<Value, ClassError> {
        (self.0)(args)
    }

    /// Whether two handles refer to the same function
    pub fn ptr_eq(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<function {:p}>", Arc::as_ptr(&self.0))
    }
}

/// A dynamically typed value
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    Table(Properties),
    Function(Function),
    Instance(Instance),
}

impl Value {
    /// Intrinsic type name, ignoring any class binding.
    ///
    /// Integers and floats are both `"number"`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Table(_) => "table",
            Value::Function(_) => "function",
            Value::Instance(_) => "instance",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Value::Instance(i) => Some(i),
            _ => None,
        }
    }
}

// Functions and instances compare by identity, everything else by value.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Integer(a), Value::Number(b)) | (Value::Number(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Instance(a), Value::Instance(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Properties> for Value {
    fn from(t: Properties) -> Self {
        Value::Table(t)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl From<Instance> for Value {
    fn from(i: Instance) -> Self {
        Value::Instance(i)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}
