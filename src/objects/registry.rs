//! Registry of all class definitions

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use tracing::debug;

use super::{
    validate_class_name, ClassDescriptor, ClassError, ClassInfo, ConstructorHandle, Instance,
    Value,
};

static GLOBAL: LazyLock<Arc<ClassRegistry>> = LazyLock::new(|| Arc::new(ClassRegistry::new()));

/// Registry of class descriptors plus the subtype index.
///
/// The subtype index maps every class name to the set of names that are it
/// or descend from it. It is maintained when a class is defined so that
/// membership checks are a single hash lookup.
///
/// Name uniqueness holds per registry. Code that relies on it should go
/// through [`ClassRegistry::global`].
#[derive(Debug, Default)]
pub struct ClassRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    classes: HashMap<String, Arc<ClassDescriptor>>,
    subtypes: HashMap<String, HashSet<String>>,
}

impl ClassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry
    pub fn global() -> Arc<ClassRegistry> {
        GLOBAL.clone()
    }

    /// Define a new class, optionally extending a registered parent.
    ///
    /// Validation happens before any mutation, so a failed call leaves the
    /// registry unchanged.
    pub fn define_class(
        &self,
        name: &str,
        parent: Option<&str>,
    ) -> Result<ConstructorHandle, ClassError> {
        validate_class_name(name)?;

        let mut inner = self.inner.write();
        if inner.classes.contains_key(name) {
            return Err(ClassError::DuplicateClass(name.to_string()));
        }
        let parent = match parent {
            Some(parent_name) => Some(
                inner
                    .classes
                    .get(parent_name)
                    .cloned()
                    .ok_or_else(|| ClassError::UnknownParent(parent_name.to_string()))?,
            ),
            None => None,
        };

        let class = ClassDescriptor::new(name, parent);

        inner
            .subtypes
            .insert(name.to_string(), HashSet::from([name.to_string()]));
        for ancestor in class.ancestors().skip(1) {
            inner
                .subtypes
                .entry(ancestor.name().to_string())
                .or_default()
                .insert(name.to_string());
        }
        inner.classes.insert(name.to_string(), class.clone());

        debug!(
            class = name,
            parent = class.parent().map(|p| p.name()),
            "class defined"
        );
        Ok(ConstructorHandle::new(class))
    }

    /// A new instance of `name` with no fields; `initialize` is not run
    pub fn instantiate_blank(&self, name: &str) -> Result<Instance, ClassError> {
        self.get_descriptor(name)
            .map(|class| class.instantiate_blank())
            .ok_or_else(|| ClassError::UnknownClass(name.to_string()))
    }

    /// A new instance of `name` initialized with `args`
    pub fn construct(&self, name: &str, args: &[Value]) -> Result<Instance, ClassError> {
        let class = self
            .get_descriptor(name)
            .ok_or_else(|| ClassError::UnknownClass(name.to_string()))?;
        class.new_instance(args)
    }

    /// Get a class descriptor by name
    pub fn get_descriptor(&self, name: &str) -> Option<Arc<ClassDescriptor>> {
        self.inner.read().classes.get(name).cloned()
    }

    /// Get a constructor handle for a registered class
    pub fn get_handle(&self, name: &str) -> Option<ConstructorHandle> {
        self.get_descriptor(name).map(ConstructorHandle::new)
    }

    /// Check if a class exists
    pub fn exists(&self, name: &str) -> bool {
        self.inner.read().classes.contains_key(name)
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.inner.read().classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All registered class names, sorted
    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().classes.keys().cloned().collect();
        names.sort();
        names
    }

    /// `name` and every class descending from it, sorted.
    ///
    /// Empty for unknown names.
    pub fn descendants(&self, name: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .read()
            .subtypes
            .get(name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Get the inheritance chain for a class (child -> ... -> root)
    pub fn get_chain(&self, name: &str) -> Vec<String> {
        self.get_descriptor(name)
            .map(|class| {
                class
                    .ancestors()
                    .map(|ancestor| ancestor.name().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `class` is `ancestor` or descends from it
    pub fn is_subclass(&self, class: &str, ancestor: &str) -> bool {
        self.inner
            .read()
            .subtypes
            .get(ancestor)
            .is_some_and(|set| set.contains(class))
    }

    /// Class name for instances, intrinsic type name otherwise
    pub fn type_of(&self, value: &Value) -> String {
        type_of(value)
    }

    /// Whether `value` is an instance of `name` or of a class descending
    /// from it. Non-instances compare their intrinsic type name instead.
    pub fn is_instance_of(&self, value: &Value, name: &str) -> bool {
        match value {
            Value::Instance(instance) => self.is_subclass(instance.class_name(), name),
            other => other.type_name() == name,
        }
    }

    /// Summary of one class
    pub fn describe(&self, name: &str) -> Option<ClassInfo> {
        self.get_descriptor(name).map(|class| class.info())
    }

    /// Summaries of every class, sorted by name
    pub fn describe_all(&self) -> Vec<ClassInfo> {
        let mut classes: Vec<Arc<ClassDescriptor>> =
            self.inner.read().classes.values().cloned().collect();
        classes.sort_by(|a, b| a.name().cmp(b.name()));
        classes.iter().map(|class| class.info()).collect()
    }

    /// The class hierarchy as an indented tree, one class per line.
    ///
    /// Roots and siblings appear in name order; each level indents by two
    /// spaces.
    pub fn render_tree(&self) -> String {
        let classes = self.describe_all();
        let mut out = String::new();
        let mut stack: Vec<(&ClassInfo, usize)> =
            children(&classes, None).map(|class| (class, 0)).collect();
        while let Some((class, depth)) = stack.pop() {
            out.push_str(&"  ".repeat(depth));
            out.push_str(&class.name);
            out.push('\n');
            stack.extend(
                children(&classes, Some(class.name.as_str())).map(|child| (child, depth + 1)),
            );
        }
        out
    }
}

/// Direct children of `parent` (roots for `None`), in reverse name order
fn children<'a>(
    classes: &'a [ClassInfo],
    parent: Option<&'a str>,
) -> impl Iterator<Item = &'a ClassInfo> + 'a {
    classes
        .iter()
        .filter(move |class| class.parent.as_deref() == parent)
        .rev()
}

/// Define a class in the global registry
pub fn define_class(name: &str, parent: Option<&str>) -> Result<ConstructorHandle, ClassError> {
    GLOBAL.define_class(name, parent)
}

/// Blank instance from the global registry
pub fn instantiate_blank(name: &str) -> Result<Instance, ClassError> {
    GLOBAL.instantiate_blank(name)
}

/// Descriptor lookup in the global registry
pub fn get_descriptor(name: &str) -> Option<Arc<ClassDescriptor>> {
    GLOBAL.get_descriptor(name)
}

/// Class name for instances, intrinsic type name otherwise.
///
/// Needs no registry: an instance carries its descriptor.
pub fn type_of(value: &Value) -> String {
    match value {
        Value::Instance(instance) => instance.class_name().to_string(),
        other => other.type_name().to_string(),
    }
}

/// Membership check against the global registry's subtype index
pub fn is_instance_of(value: &Value, name: &str) -> bool {
    GLOBAL.is_instance_of(value, name)
}
