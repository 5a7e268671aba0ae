//! Class system exposed to Lua scripts
//!
//! Globals installed:
//! - `class(name, parent?)` defines a class and returns its handle
//! - `typeof(value)` returns the class name or the intrinsic type name
//! - `isinstance(value, name)` checks class membership via the subtype index
//! - `classes.get/blank/exists/names/chain` inspect the registry
//!
//! Names, parents and the subtype index live in the Rust [`ClassRegistry`].
//! Lua methods live in per-class method tables kept in the Lua registry;
//! each method table is the metatable of the class's instances and has the
//! parent's method table as its own metatable, giving the fallback chain.

use std::sync::Arc;

use mlua::{Error, Function, Lua, MultiValue, Result as LuaResult, Table, Value};
use tracing::{trace, warn};

use crate::objects::{ClassDescriptor, ClassError, ClassRegistry, INITIALIZE, NEW, TYPENAME, VERSION};

/// Lua registry key of the name -> method table map
const CLASSES_KEY: &str = "classreg.classes";

/// Method table keys a script may not overwrite through a handle
const READ_ONLY_KEYS: &[&str] = &[TYPENAME, VERSION, NEW, "__index"];

/// Install the class globals into `lua`
pub fn install(lua: &Lua, registry: Arc<ClassRegistry>) -> LuaResult<()> {
    lua.set_named_registry_value(CLASSES_KEY, lua.create_table()?)?;

    let globals = lua.globals();
    register_class_function(lua, &globals, registry.clone())?;
    register_type_functions(lua, &globals, registry.clone())?;
    register_registry_functions(lua, &globals, registry)?;
    Ok(())
}

fn register_class_function(lua: &Lua, globals: &Table, registry: Arc<ClassRegistry>) -> LuaResult<()> {
    // class(name, parent)
    let class = lua.create_function(move |lua, (name, parent): (String, Option<String>)| {
        let parent_table = match parent.as_deref().and_then(|p| registry.get_descriptor(p)) {
            Some(desc) => Some(method_table(lua, &desc)?),
            None => None,
        };
        // Allocate before registering; a rejected definition only drops the table
        let cls = build_method_table(lua, &name, parent_table)?;

        if let Err(e) = registry.define_class(&name, parent.as_deref()) {
            warn!(class = %name, error = %e, "class definition rejected");
            return Err(Error::external(e));
        }
        // If this fails the class is still registered and `method_table`
        // mirrors it on next use
        class_map(lua)?.raw_set(name.as_str(), cls.clone())?;
        handle(lua, &name, &cls)
    })?;
    globals.set("class", class)?;
    Ok(())
}

fn register_type_functions(lua: &Lua, globals: &Table, registry: Arc<ClassRegistry>) -> LuaResult<()> {
    // typeof(value)
    let type_of = lua.create_function(|lua, value: Value| lua_type_of(lua, &value))?;
    globals.set("typeof", type_of)?;

    // isinstance(value, name)
    let is_instance = lua.create_function(move |lua, (value, name): (Value, String)| {
        Ok(match instance_class(lua, &value)? {
            Some(class) => registry.is_subclass(&class, &name),
            None => intrinsic_type_name(&value) == name,
        })
    })?;
    globals.set("isinstance", is_instance)?;
    Ok(())
}

fn register_registry_functions(lua: &Lua, globals: &Table, registry: Arc<ClassRegistry>) -> LuaResult<()> {
    let classes = lua.create_table()?;

    // classes.get(name) -> handle or nil
    let reg = registry.clone();
    let get = lua.create_function(move |lua, name: String| match reg.get_descriptor(&name) {
        Some(desc) => {
            let cls = method_table(lua, &desc)?;
            Ok(Value::Table(handle(lua, &name, &cls)?))
        }
        None => Ok(Value::Nil),
    })?;
    classes.set("get", get)?;

    // classes.blank(name) -> instance without initialize
    let reg = registry.clone();
    let blank = lua.create_function(move |lua, name: String| {
        let desc = reg
            .get_descriptor(&name)
            .ok_or_else(|| Error::external(ClassError::UnknownClass(name.clone())))?;
        let cls = method_table(lua, &desc)?;
        let instance = lua.create_table()?;
        instance.set_metatable(Some(cls));
        Ok(instance)
    })?;
    classes.set("blank", blank)?;

    // classes.exists(name)
    let reg = registry.clone();
    let exists = lua.create_function(move |_, name: String| Ok(reg.exists(&name)))?;
    classes.set("exists", exists)?;

    // classes.names() -> sorted list
    let reg = registry.clone();
    let names = lua.create_function(move |_, ()| Ok(reg.class_names()))?;
    classes.set("names", names)?;

    // classes.chain(name) -> {name, parent, ..., root}
    let chain = lua.create_function(move |_, name: String| Ok(registry.get_chain(&name)))?;
    classes.set("chain", chain)?;

    globals.set("classes", classes)?;
    Ok(())
}

fn class_map(lua: &Lua) -> LuaResult<Table> {
    lua.named_registry_value(CLASSES_KEY)
}

/// Method table for a registered class.
///
/// Classes defined natively have none yet; one is built for the missing
/// part of the chain, root first, so every table has its parent's.
fn method_table(lua: &Lua, class: &ClassDescriptor) -> LuaResult<Table> {
    let map = class_map(lua)?;
    if let Some(cls) = map.raw_get::<Option<Table>>(class.name())? {
        return Ok(cls);
    }

    let mut missing = Vec::new();
    let mut known = None;
    for ancestor in class.ancestors() {
        match map.raw_get::<Option<Table>>(ancestor.name())? {
            Some(cls) => {
                known = Some(cls);
                break;
            }
            None => missing.push(ancestor.name()),
        }
    }

    let mut parent = known;
    for name in missing.into_iter().rev() {
        parent = Some(create_method_table(lua, name, parent)?);
    }
    parent.ok_or_else(|| Error::external(ClassError::UnknownClass(class.name().to_string())))
}

fn create_method_table(lua: &Lua, name: &str, parent: Option<Table>) -> LuaResult<Table> {
    let cls = build_method_table(lua, name, parent)?;
    class_map(lua)?.raw_set(name, cls.clone())?;
    Ok(cls)
}

/// A method table for `name`, not yet in the class map
fn build_method_table(lua: &Lua, name: &str, parent: Option<Table>) -> LuaResult<Table> {
    let cls = lua.create_table()?;
    cls.raw_set(TYPENAME, name)?;
    cls.raw_set("__index", cls.clone())?;
    cls.raw_set(VERSION, 1)?;
    cls.raw_set(INITIALIZE, lua.create_function(|_, _: MultiValue| Ok(()))?)?;

    let class_name = name.to_string();
    let new = lua.create_function(move |lua, args: MultiValue| construct(lua, &class_name, args))?;
    cls.raw_set(NEW, new)?;

    cls.set_metatable(parent);
    Ok(cls)
}

/// Handle table: reads and writes go to the method table, calls construct
fn handle(lua: &Lua, name: &str, cls: &Table) -> LuaResult<Table> {
    let handle = lua.create_table()?;
    let meta = lua.create_table()?;
    meta.raw_set("__index", cls.clone())?;

    let class_name = name.to_string();
    let newindex = lua.create_function(move |lua, (_, key, value): (Value, String, Value)| {
        if READ_ONLY_KEYS.contains(&key.as_str()) {
            return Err(Error::external(ClassError::ReadOnlyAttribute {
                class: class_name.clone(),
                attribute: key,
            }));
        }
        lookup_method_table(lua, &class_name)?.raw_set(key, value)
    })?;
    meta.raw_set("__newindex", newindex)?;

    let class_name = name.to_string();
    let call = lua.create_function(move |lua, (_, args): (Value, MultiValue)| {
        construct(lua, &class_name, args)
    })?;
    meta.raw_set("__call", call)?;

    handle.set_metatable(Some(meta));
    Ok(handle)
}

fn lookup_method_table(lua: &Lua, name: &str) -> LuaResult<Table> {
    class_map(lua)?
        .raw_get::<Option<Table>>(name)?
        .ok_or_else(|| Error::external(ClassError::UnknownClass(name.to_string())))
}

/// Allocate an instance, run `initialize` with `args`, return it
fn construct(lua: &Lua, name: &str, args: MultiValue) -> LuaResult<Table> {
    let cls = lookup_method_table(lua, name)?;
    let instance = lua.create_table()?;
    instance.set_metatable(Some(cls.clone()));

    let init: Function = cls.get(INITIALIZE)?;
    init.call::<()>((instance.clone(), args))?;
    trace!(class = name, "lua instance created");
    Ok(instance)
}

/// Class name of `value` if it is an instance of a registered class.
///
/// The metatable must be the exact method table registered under its
/// `__typename`; a look-alike table does not count. Method tables
/// themselves are not instances even though their metatable is the
/// parent's method table.
fn instance_class(lua: &Lua, value: &Value) -> LuaResult<Option<String>> {
    let Value::Table(table) = value else {
        return Ok(None);
    };
    let map = class_map(lua)?;
    if let Value::String(own) = table.raw_get::<Value>(TYPENAME)? {
        let own = own.to_string_lossy().to_string();
        if map
            .raw_get::<Option<Table>>(own.as_str())?
            .is_some_and(|cls| cls == *table)
        {
            return Ok(None);
        }
    }
    let Some(meta) = table.metatable() else {
        return Ok(None);
    };
    let Value::String(name) = meta.raw_get::<Value>(TYPENAME)? else {
        return Ok(None);
    };
    let name = name.to_string_lossy().to_string();
    match map.raw_get::<Option<Table>>(name.as_str())? {
        Some(cls) if cls == meta => Ok(Some(name)),
        _ => Ok(None),
    }
}

/// Lua type name, reporting integers and floats alike as `number`
fn intrinsic_type_name(value: &Value) -> &'static str {
    match value {
        Value::Integer(_) | Value::Number(_) => "number",
        Value::LightUserData(_) | Value::UserData(_) => "userdata",
        other => other.type_name(),
    }
}

fn lua_type_of(lua: &Lua, value: &Value) -> LuaResult<String> {
    Ok(match instance_class(lua, value)? {
        Some(class) => class,
        None => intrinsic_type_name(value).to_string(),
    })
}
