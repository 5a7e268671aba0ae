//! Class descriptors with single inheritance

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::instance::with_receiver;
use super::{ClassError, Function, Instance, Properties, Value};

/// Attribute carrying the class name
pub const TYPENAME: &str = "__typename";
/// Attribute carrying the class version
pub const VERSION: &str = "version";
/// Method invoked on every instance built by the factory
pub const INITIALIZE: &str = "initialize";
/// Factory attribute; calling it builds and initializes an instance
pub const NEW: &str = "new";

const RESERVED: &[&str] = &[TYPENAME, VERSION, NEW];

/// A class definition: a name, an attribute table and an optional parent.
///
/// Attribute lookup falls through to the parent, then the parent's parent,
/// until the root. Descriptors are owned by the registry and never removed,
/// so a parent link is valid for as long as its child is.
pub struct ClassDescriptor {
    name: String,
    version: u32,
    parent: Option<Arc<ClassDescriptor>>,
    attributes: RwLock<Properties>,
}

impl ClassDescriptor {
    /// Allocate a descriptor with a no-op `initialize` and a `new` factory
    pub(crate) fn new(name: &str, parent: Option<Arc<ClassDescriptor>>) -> Arc<Self> {
        Arc::new_cyclic(|this: &Weak<ClassDescriptor>| {
            let this = this.clone();
            let class_name = name.to_string();
            let factory = Function::new(move |args| {
                let class = this
                    .upgrade()
                    .ok_or_else(|| ClassError::UnknownClass(class_name.clone()))?;
                class.new_instance(args).map(Value::Instance)
            });

            let mut attributes = Properties::new();
            attributes.insert(INITIALIZE.to_string(), Value::Function(Function::noop()));
            attributes.insert(NEW.to_string(), Value::Function(factory));

            Self {
                name: name.to_string(),
                version: 1,
                parent,
                attributes: RwLock::new(attributes),
            }
        })
    }

    /// Class name (the `__typename` attribute)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn parent(&self) -> Option<&Arc<ClassDescriptor>> {
        self.parent.as_ref()
    }

    /// This class followed by its ancestors, child first
    pub fn ancestors(&self) -> impl Iterator<Item = &ClassDescriptor> {
        std::iter::successors(Some(self), |class| class.parent.as_deref())
    }

    /// Resolve an attribute through the fallback chain
    pub fn lookup(&self, key: &str) -> Option<Value> {
        match key {
            TYPENAME => return Some(Value::String(self.name.clone())),
            VERSION => return Some(Value::Integer(self.version.into())),
            _ => {}
        }
        self.ancestors()
            .find_map(|class| class.attributes.read().get(key).cloned())
    }

    /// Attribute defined directly on this class, without fallback
    pub fn get_own(&self, key: &str) -> Option<Value> {
        self.attributes.read().get(key).cloned()
    }

    /// Resolve a method through the fallback chain.
    ///
    /// Returns `None` if the name is missing or bound to a non-function.
    pub fn resolve_method(&self, name: &str) -> Option<Function> {
        self.lookup(name).and_then(|value| value.as_function().cloned())
    }

    /// Set a class-level attribute (a method when `value` is a function)
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<(), ClassError> {
        if RESERVED.contains(&key) {
            return Err(ClassError::ReadOnlyAttribute {
                class: self.name.clone(),
                attribute: key.to_string(),
            });
        }
        self.attributes.write().insert(key.to_string(), value.into());
        Ok(())
    }

    /// Attach a method taking the instance as receiver
    pub fn define_method<F>(&self, name: &str, f: F) -> Result<(), ClassError>
    where
        F: Fn(&Instance, &[Value]) -> Result<Value, ClassError> + Send + Sync + 'static,
    {
        self.set(name, Function::method(f))
    }

    /// Methods defined directly on this class, sorted
    pub fn own_method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .attributes
            .read()
            .iter()
            .filter(|(_, v)| matches!(v, Value::Function(_)))
            .map(|(k, _)| k.clone())
            .collect();
        names.sort();
        names
    }

    /// Every method resolvable on this class, including inherited ones
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .ancestors()
            .flat_map(|class| class.own_method_names())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// A new instance with no fields; `initialize` is not run
    pub fn instantiate_blank(self: &Arc<Self>) -> Instance {
        trace!(class = %self.name, "blank instance created");
        Instance::new(self.clone())
    }

    /// A new instance initialized with `args`
    pub fn new_instance(self: &Arc<Self>, args: &[Value]) -> Result<Instance, ClassError> {
        let init = self
            .resolve_method(INITIALIZE)
            .ok_or_else(|| ClassError::UnknownMethod {
                class: self.name.clone(),
                method: INITIALIZE.to_string(),
            })?;

        let instance = Instance::new(self.clone());
        init.call(&with_receiver(&instance, args))?;
        trace!(class = %self.name, "instance created");
        Ok(instance)
    }

    /// Serializable summary for listings and documentation
    pub fn info(&self) -> ClassInfo {
        ClassInfo {
            name: self.name.clone(),
            parent: self.parent.as_ref().map(|p| p.name.clone()),
            version: self.version,
            methods: self.own_method_names(),
            all_methods: self.method_names(),
        }
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .finish_non_exhaustive()
    }
}

/// Summary of a class definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    pub parent: Option<String>,
    pub version: u32,
    /// Methods defined directly on the class
    pub methods: Vec<String>,
    /// Methods including inherited ones
    pub all_methods: Vec<String>,
}

/// Callable wrapper returned by `define_class`.
///
/// Attribute access goes straight to the descriptor (through `Deref`), so
/// methods can be attached after the class is created; `call` builds an
/// instance.
#[derive(Debug, Clone)]
pub struct ConstructorHandle {
    class: Arc<ClassDescriptor>,
}

impl ConstructorHandle {
    pub(crate) fn new(class: Arc<ClassDescriptor>) -> Self {
        Self { class }
    }

    pub fn descriptor(&self) -> &Arc<ClassDescriptor> {
        &self.class
    }

    /// Construct and initialize an instance
    pub fn call(&self, args: &[Value]) -> Result<Instance, ClassError> {
        self.class.new_instance(args)
    }

    /// Construct an instance without running `initialize`
    pub fn blank(&self) -> Instance {
        self.class.instantiate_blank()
    }

    /// Read an attribute (alias for the descriptor's `lookup`)
    pub fn get(&self, key: &str) -> Option<Value> {
        self.class.lookup(key)
    }

    /// Invoke a method resolved on this class rather than on `this`'s own class.
    ///
    /// This is how an overriding method reaches its parent's implementation.
    pub fn call_method(
        &self,
        method: &str,
        this: &Instance,
        args: &[Value],
    ) -> Result<Value, ClassError> {
        let f = self
            .class
            .resolve_method(method)
            .ok_or_else(|| ClassError::UnknownMethod {
                class: self.class.name.clone(),
                method: method.to_string(),
            })?;
        f.call(&with_receiver(this, args))
    }
}

impl Deref for ConstructorHandle {
    type Target = ClassDescriptor;

    fn deref(&self) -> &ClassDescriptor {
        &self.class
    }
}
