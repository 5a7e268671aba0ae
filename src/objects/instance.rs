//! Class instances

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{ClassDescriptor, ClassError, Properties, Value};

/// An object created from a class descriptor.
///
/// Cloning is cheap and yields another handle to the same object.
#[derive(Clone)]
pub struct Instance(Arc<InstanceInner>);

struct InstanceInner {
    class: Arc<ClassDescriptor>,
    fields: RwLock<Properties>,
}

impl Instance {
    pub(crate) fn new(class: Arc<ClassDescriptor>) -> Self {
        Self(Arc::new(InstanceInner {
            class,
            fields: RwLock::new(Properties::new()),
        }))
    }

    /// The descriptor this instance is bound to
    pub fn class(&self) -> &Arc<ClassDescriptor> {
        &self.0.class
    }

    /// Name of the instance's class
    pub fn class_name(&self) -> &str {
        self.0.class.name()
    }

    /// Read a field, falling back to class attributes (methods included)
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_field(key).or_else(|| self.0.class.lookup(key))
    }

    /// Read a field set on this instance only
    pub fn get_field(&self, key: &str) -> Option<Value> {
        self.0.fields.read().get(key).cloned()
    }

    /// Set a field value
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.0.fields.write().insert(key.to_string(), value.into());
    }

    /// Remove a field
    pub fn remove_field(&self, key: &str) -> Option<Value> {
        self.0.fields.write().remove(key)
    }

    /// Check if the instance has a field set
    pub fn has_field(&self, key: &str) -> bool {
        self.0.fields.read().contains_key(key)
    }

    /// Names of the fields set on this instance, sorted
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.0.fields.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Get field as string
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get_field(key).and_then(|v| v.as_str().map(str::to_string))
    }

    /// Get field as i64
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get_field(key).and_then(|v| v.as_i64())
    }

    /// Get field as f64
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get_field(key).and_then(|v| v.as_f64())
    }

    /// Get field as bool
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get_field(key).and_then(|v| v.as_bool())
    }

    /// Call a method resolved on this instance's class
    pub fn call(&self, method: &str, args: &[Value]) -> Result<Value, ClassError> {
        let f = self
            .0
            .class
            .resolve_method(method)
            .ok_or_else(|| ClassError::UnknownMethod {
                class: self.class_name().to_string(),
                method: method.to_string(),
            })?;
        f.call(&with_receiver(self, args))
    }

    /// Whether two handles refer to the same object
    pub fn ptr_eq(&self, other: &Instance) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

// Fields may reference the instance itself, so only names are printed.
impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class_name())
            .field("fields", &self.field_names())
            .finish()
    }
}

/// Argument list for a method call: the receiver followed by `args`
pub(crate) fn with_receiver(this: &Instance, args: &[Value]) -> Vec<Value> {
    let mut call_args = Vec::with_capacity(args.len() + 1);
    call_args.push(Value::Instance(this.clone()));
    call_args.extend_from_slice(args);
    call_args
}
