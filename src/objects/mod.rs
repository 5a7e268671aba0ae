//! Object system - named classes with single inheritance

mod class;
mod error;
mod instance;
mod name;
mod registry;
mod value;

pub use class::{ClassDescriptor, ClassInfo, ConstructorHandle, INITIALIZE, NEW, TYPENAME, VERSION};
pub use error::ClassError;
pub use instance::Instance;
pub use name::{validate_class_name, NameError, INTRINSIC_TYPE_NAMES};
pub use registry::{
    define_class, get_descriptor, instantiate_blank, is_instance_of, type_of, ClassRegistry,
};
pub use value::{Function, Properties, Value};
