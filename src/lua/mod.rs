//! Lua scripting - sandboxed execution with the class system installed

mod bindings;
mod sandbox;

pub use bindings::install;
pub use sandbox::{Sandbox, SandboxConfig, SandboxError};
