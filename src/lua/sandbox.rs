//! Lua sandbox - restricted execution environment with class bindings

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mlua::{Function, HookTriggers, Lua, Result as LuaResult, StdLib, Value, VmState};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::bindings;
use crate::objects::ClassRegistry;

/// Sandbox configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Maximum instructions per execution (default: 1,000,000)
    pub max_instructions: u64,
    /// Maximum memory in bytes (default: 64MB)
    pub max_memory: usize,
    /// Execution timeout in milliseconds (default: 500)
    pub timeout_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_instructions: 1_000_000,
            max_memory: 64 * 1024 * 1024, // 64MB
            timeout_ms: 500,
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Errors that can occur during sandbox execution
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("instruction limit exceeded ({0} > {1})")]
    InstructionLimitExceeded(u64, u64),

    #[error("memory limit exceeded ({0} bytes > {1} bytes)")]
    MemoryLimitExceeded(usize, usize),

    #[error("execution timeout ({0:?})")]
    Timeout(Duration),

    #[error("Lua error: {0}")]
    LuaError(#[from] mlua::Error),
}

/// A sandboxed Lua state whose `class` / `typeof` / `isinstance` globals
/// are backed by a [`ClassRegistry`]
pub struct Sandbox {
    lua: Lua,
    config: SandboxConfig,
    registry: Arc<ClassRegistry>,
    instruction_count: Arc<AtomicU64>,
    exceeded: Arc<AtomicBool>,
    timed_out: Arc<AtomicBool>,
    start_time: Arc<Mutex<Instant>>,
}

impl Sandbox {
    /// Create a new sandbox bound to `registry`
    pub fn new(config: SandboxConfig, registry: Arc<ClassRegistry>) -> Result<Self, SandboxError> {
        // Create Lua with minimal standard libraries
        let lua = Lua::new_with(
            StdLib::STRING | StdLib::TABLE | StdLib::MATH | StdLib::UTF8,
            mlua::LuaOptions::default(),
        )?;

        lua.set_memory_limit(config.max_memory)?;

        let instruction_count = Arc::new(AtomicU64::new(0));
        let exceeded = Arc::new(AtomicBool::new(false));
        let timed_out = Arc::new(AtomicBool::new(false));
        let start_time = Arc::new(Mutex::new(Instant::now()));

        // Instruction counting and wall-clock hook
        let count_clone = instruction_count.clone();
        let exceeded_clone = exceeded.clone();
        let timed_out_clone = timed_out.clone();
        let start_clone = start_time.clone();
        let max_instructions = config.max_instructions;
        let timeout = config.timeout();

        lua.set_hook(
            HookTriggers::new().every_nth_instruction(1000),
            move |_lua, _debug| {
                let current = count_clone.fetch_add(1000, Ordering::Relaxed) + 1000;
                if current > max_instructions {
                    exceeded_clone.store(true, Ordering::Relaxed);
                    return Ok(VmState::Yield);
                }
                if start_clone.lock().elapsed() > timeout {
                    timed_out_clone.store(true, Ordering::Relaxed);
                    return Err(mlua::Error::RuntimeError("execution timeout".to_string()));
                }
                Ok(VmState::Continue)
            },
        );

        Self::remove_dangerous_globals(&lua)?;
        Self::add_safe_globals(&lua)?;
        bindings::install(&lua, registry.clone())?;

        Ok(Self {
            lua,
            config,
            registry,
            instruction_count,
            exceeded,
            timed_out,
            start_time,
        })
    }

    /// Remove dangerous global functions/tables
    fn remove_dangerous_globals(lua: &Lua) -> LuaResult<()> {
        let globals = lua.globals();

        let dangerous = [
            "os",
            "io",
            "loadfile",
            "dofile",
            "load",
            "loadstring",
            "require",
            "package",
            "debug",
            "collectgarbage",
        ];

        for name in dangerous {
            globals.set(name, Value::Nil)?;
        }

        Ok(())
    }

    /// Add safe utility functions
    fn add_safe_globals(lua: &Lua) -> LuaResult<()> {
        let globals = lua.globals();

        // print goes to the log instead of stdout
        let tostring: Function = globals.get("tostring")?;
        let safe_print = lua.create_function(move |_, args: mlua::MultiValue| {
            let mut parts = Vec::with_capacity(args.len());
            for arg in args {
                parts.push(tostring.call::<String>(arg)?);
            }
            let line = parts.join("\t");
            info!(target: "classreg::lua", "{}", line);
            Ok(())
        })?;
        globals.set("print", safe_print)?;

        Ok(())
    }

    /// Get the sandbox configuration
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// The registry backing this sandbox's classes
    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    fn reset_counters(&mut self) {
        self.instruction_count.store(0, Ordering::Relaxed);
        self.exceeded.store(false, Ordering::Relaxed);
        self.timed_out.store(false, Ordering::Relaxed);
        *self.start_time.lock() = Instant::now();
    }

    fn check_limits(&self) -> Result<(), SandboxError> {
        let instr = self.instruction_count.load(Ordering::Relaxed);
        if self.exceeded.load(Ordering::Relaxed) {
            return Err(SandboxError::InstructionLimitExceeded(
                instr,
                self.config.max_instructions,
            ));
        }

        if self.timed_out.load(Ordering::Relaxed)
            || self.start_time.lock().elapsed() > self.config.timeout()
        {
            return Err(SandboxError::Timeout(self.config.timeout()));
        }

        Ok(())
    }

    /// Execute Lua code and return the result
    pub fn execute<R>(&mut self, code: &str) -> Result<R, SandboxError>
    where
        R: mlua::FromLuaMulti,
    {
        self.reset_counters();

        let result: LuaResult<R> = self.lua.load(code).eval();

        self.check_limits()?;
        result.map_err(|e| self.classify(e))
    }

    /// Execute a named chunk (e.g. a script file); `name` shows up in errors
    pub fn execute_named(&mut self, name: &str, code: &str) -> Result<(), SandboxError> {
        self.reset_counters();

        let result = self.lua.load(code).set_name(name).exec();

        self.check_limits()?;
        result.map_err(|e| self.classify(e))
    }

    /// Execute a Lua function with arguments
    pub fn call<A, R>(&mut self, func: Function, args: A) -> Result<R, SandboxError>
    where
        A: mlua::IntoLuaMulti,
        R: mlua::FromLuaMulti,
    {
        self.reset_counters();

        let result: LuaResult<R> = func.call(args);

        self.check_limits()?;
        result.map_err(|e| self.classify(e))
    }

    fn classify(&self, err: mlua::Error) -> SandboxError {
        match err {
            mlua::Error::MemoryError(_) => {
                SandboxError::MemoryLimitExceeded(self.memory_used(), self.config.max_memory)
            }
            other => SandboxError::LuaError(other),
        }
    }

    /// Check if a global exists (for testing that dangerous globals are removed)
    pub fn global_exists(&self, name: &str) -> bool {
        self.lua
            .globals()
            .get::<Value>(name)
            .map(|v| !matches!(v, Value::Nil))
            .unwrap_or(false)
    }

    /// Instructions counted during the last execution (1000 granularity)
    pub fn instruction_count(&self) -> u64 {
        self.instruction_count.load(Ordering::Relaxed)
    }

    /// Get current memory usage
    pub fn memory_used(&self) -> usize {
        self.lua.used_memory()
    }

    /// Access the underlying Lua state
    pub fn lua(&self) -> &Lua {
        &self.lua
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> Sandbox {
        Sandbox::new(SandboxConfig::default(), Arc::new(ClassRegistry::new())).unwrap()
    }

    #[test]
    fn test_dangerous_globals_removed() {
        let sandbox = sandbox();

        assert!(!sandbox.global_exists("os"));
        assert!(!sandbox.global_exists("io"));
        assert!(!sandbox.global_exists("loadfile"));
        assert!(!sandbox.global_exists("dofile"));
        assert!(!sandbox.global_exists("load"));
        assert!(!sandbox.global_exists("loadstring"));
        assert!(!sandbox.global_exists("require"));
        assert!(!sandbox.global_exists("package"));
        assert!(!sandbox.global_exists("debug"));

        assert!(sandbox.global_exists("string"));
        assert!(sandbox.global_exists("table"));
        assert!(sandbox.global_exists("math"));
        assert!(sandbox.global_exists("print"));
    }

    #[test]
    fn test_class_globals_installed() {
        let sandbox = sandbox();
        assert!(sandbox.global_exists("class"));
        assert!(sandbox.global_exists("typeof"));
        assert!(sandbox.global_exists("isinstance"));
        assert!(sandbox.global_exists("classes"));
    }

    #[test]
    fn test_simple_execution() {
        let mut sandbox = sandbox();
        let result: i64 = sandbox.execute("return 1 + 2").unwrap();
        assert_eq!(result, 3);
    }

    #[test]
    fn test_print_does_not_fail() {
        let mut sandbox = sandbox();
        let _: () = sandbox.execute(r#"print("hello", 1, nil, {})"#).unwrap();
    }

    #[test]
    fn test_instruction_limit() {
        let config = SandboxConfig {
            max_instructions: 100,
            ..Default::default()
        };
        let mut sandbox = Sandbox::new(config, Arc::new(ClassRegistry::new())).unwrap();

        let result: Result<(), _> = sandbox.execute(
            r#"
            local sum = 0
            for i = 1, 1000000 do
                sum = sum + i
            end
            return sum
            "#,
        );

        assert!(matches!(
            result,
            Err(SandboxError::InstructionLimitExceeded(_, _))
        ));
    }

    #[test]
    fn test_memory_limit() {
        let config = SandboxConfig {
            max_memory: 1024 * 1024, // 1MB limit
            ..Default::default()
        };
        let mut sandbox = Sandbox::new(config, Arc::new(ClassRegistry::new())).unwrap();

        let result: Result<(), _> = sandbox.execute(
            r#"
            local t = {}
            for i = 1, 10000000 do
                t[i] = string.rep("x", 1000)
            end
            "#,
        );

        assert!(matches!(
            result,
            Err(SandboxError::MemoryLimitExceeded(_, max)) if max == 1024 * 1024
        ));
    }

    #[test]
    fn test_timeout_stops_runaway_loop() {
        let config = SandboxConfig {
            max_instructions: u64::MAX,
            timeout_ms: 10,
            ..Default::default()
        };
        let mut sandbox = Sandbox::new(config, Arc::new(ClassRegistry::new())).unwrap();

        let started = Instant::now();
        let result: Result<(), _> = sandbox.execute("while true do end");

        assert!(matches!(result, Err(SandboxError::Timeout(d)) if d == Duration::from_millis(10)));
        assert!(started.elapsed() < Duration::from_secs(5));

        // The deadline restarts with each execution
        let after: i64 = sandbox.execute("return 5").unwrap();
        assert_eq!(after, 5);
    }

    #[test]
    fn test_accessors() {
        let config = SandboxConfig {
            timeout_ms: 250,
            ..Default::default()
        };
        let mut sandbox = Sandbox::new(config.clone(), Arc::new(ClassRegistry::new())).unwrap();
        assert_eq!(sandbox.config(), &config);
        assert_eq!(sandbox.config().timeout(), Duration::from_millis(250));

        let before = sandbox.memory_used();
        assert!(before > 0);
        let _: () = sandbox
            .execute(r#"big = {} for i = 1, 1000 do big[i] = string.rep("y", 100) .. i end"#)
            .unwrap();
        assert!(sandbox.memory_used() > before);

        sandbox.lua().globals().set("injected", 9).unwrap();
        let seen: i64 = sandbox.execute("return injected").unwrap();
        assert_eq!(seen, 9);

        let _: () = sandbox.execute(r#"class("Seen")"#).unwrap();
        assert!(sandbox.registry().exists("Seen"));
    }

    #[test]
    fn test_instructions_counted() {
        let mut sandbox = sandbox();

        let _: () = sandbox
            .execute(
                r#"
            local sum = 0
            for i = 1, 1000 do
                sum = sum + i
            end
            "#,
            )
            .unwrap();

        assert!(sandbox.instruction_count() > 0);
    }

    #[test]
    fn test_execute_named_reports_chunk_name() {
        let mut sandbox = sandbox();
        let err = sandbox
            .execute_named("broken.lua", "error('boom')")
            .unwrap_err();
        assert!(err.to_string().contains("broken.lua"));
    }

    #[test]
    fn test_call_function() {
        let mut sandbox = sandbox();
        let f: Function = sandbox
            .execute("return function(a, b) return a * b end")
            .unwrap();
        let result: i64 = sandbox.call(f, (6, 7)).unwrap();
        assert_eq!(result, 42);
    }
}
