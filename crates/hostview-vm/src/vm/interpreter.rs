//! Virtual machine interpreter

use super::{Callable, NativeFn, VmOptions};
use crate::{
    bytecode::{Function, Opcode},
    compiler,
    normalize_name,
    stack::{CallState, Stack},
    value::Value,
    VmError, VmResult,
};
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::sync::Arc;

/// Hostview virtual machine
///
/// The VM is not thread-safe; share it through [`super::VmHandle`]. Besides
/// running whole source units, it exposes the individual steps of a call
/// (`load_function`, `push`, `call`, `step`) so an embedder can drive a call
/// instruction by instruction and then put the stacks back with `restore`.
pub struct Vm {
    /// Operand, call-setup and frame stacks
    stack: Stack,
    /// Function table keyed by lower-cased name
    functions: FxHashMap<String, Callable>,
    /// Global variables keyed by lower-cased name
    globals: FxHashMap<String, Value>,
    /// Limits
    options: VmOptions,
    /// Instructions executed so far
    steps: u64,
}

impl Vm {
    /// Create a VM with default options
    pub fn new() -> Self {
        Self::with_options(VmOptions::default())
    }

    /// Create a VM with the given options
    pub fn with_options(options: VmOptions) -> Self {
        Self {
            stack: Stack::with_capacity(options.max_stack_size),
            functions: FxHashMap::default(),
            globals: FxHashMap::default(),
            options,
            steps: 0,
        }
    }

    /// Get the options this VM was created with
    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    /// Total instructions executed
    pub fn steps_executed(&self) -> u64 {
        self.steps
    }

    // ========================================================================
    // Function table
    // ========================================================================

    /// Add (or replace) a compiled script function
    pub fn define_function(&mut self, function: Function) {
        let name = normalize_name(&function.name);
        self.functions
            .insert(name, Callable::Script(Arc::new(function)));
    }

    /// Add (or replace) a host function
    pub fn register_native(&mut self, name: &str, f: NativeFn) {
        self.functions
            .insert(normalize_name(name), Callable::Native(f));
    }

    // ========================================================================
    // Globals
    // ========================================================================

    /// Read a global variable
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(&normalize_name(name))
    }

    // ========================================================================
    // Embedding API
    // ========================================================================

    /// Operand stack pointer
    pub fn sp(&self) -> usize {
        self.stack.depth()
    }

    /// Call-setup stack pointer
    pub fn func_sp(&self) -> usize {
        self.stack.setup_count()
    }

    /// Number of script calls that have started but not returned
    pub fn pending_calls(&self) -> usize {
        self.stack.frame_count()
    }

    /// Capture the current stack heights
    pub fn snapshot(&self) -> CallState {
        self.stack.snapshot()
    }

    /// Cut the stacks back to a snapshot
    pub fn restore(&mut self, state: CallState) {
        self.stack.restore(state);
    }

    /// Push a value onto the operand stack
    pub fn push(&mut self, value: Value) -> VmResult<()> {
        self.stack.push(value)
    }

    /// Pop a value from the operand stack
    pub fn pop(&mut self) -> VmResult<Value> {
        self.stack.pop()
    }

    /// Resolve `name` and open a call setup for it.
    ///
    /// Returns `false`, leaving the VM untouched, when no such function
    /// exists. Arguments pushed after a successful load belong to the call.
    pub fn load_function(&mut self, name: &str) -> bool {
        let name = normalize_name(name);
        match self.functions.get(&name).cloned() {
            Some(callee) => {
                self.stack.push_setup(name, callee);
                true
            }
            None => false,
        }
    }

    /// Complete the innermost call setup.
    ///
    /// A host function runs immediately and leaves its result on the stack.
    /// A script function gets a new frame; it runs as the VM is stepped and
    /// `pending_calls` stays raised until it returns. Missing arguments are
    /// filled with null and extra ones are dropped.
    pub fn call(&mut self) -> VmResult<()> {
        let setup = self.stack.pop_setup()?;
        match setup.callee {
            Callable::Native(f) => {
                let args = self.stack.split_off(setup.base);
                let result = f(&args)?;
                self.stack.push(result)
            }
            Callable::Script(function) => {
                if self.stack.frame_count() >= self.options.max_call_depth {
                    return Err(VmError::CallDepthExceeded(self.options.max_call_depth));
                }
                let argc = self.stack.depth().saturating_sub(setup.base);
                match argc.cmp(&function.param_count) {
                    Ordering::Greater => {
                        self.stack.split_off(setup.base + function.param_count);
                    }
                    Ordering::Less => {
                        for _ in argc..function.param_count {
                            self.stack.push(Value::Null)?;
                        }
                    }
                    Ordering::Equal => {}
                }
                self.stack.push_frame(function, setup.base);
                Ok(())
            }
        }
    }

    /// Execute one instruction of the innermost frame
    pub fn step(&mut self) -> VmResult<()> {
        let (function, ip) = {
            let frame = self
                .stack
                .current_frame_mut()
                .ok_or_else(|| VmError::RuntimeError("No active call frame".to_string()))?;
            let ip = frame.ip;
            frame.ip += 1;
            (Arc::clone(&frame.function), ip)
        };
        let op = function.code.get(ip).ok_or_else(|| {
            VmError::RuntimeError(format!(
                "Instruction pointer {} out of range in {}",
                ip, function.name
            ))
        })?;
        self.steps += 1;

        match op {
            Opcode::Const(idx) => {
                let value = function.constants.get(*idx).cloned().ok_or_else(|| {
                    VmError::RuntimeError(format!("Constant {} out of range", idx))
                })?;
                self.stack.push(value)
            }
            Opcode::LoadGlobal(idx) => {
                let name = name_at(&function, *idx)?;
                let value = self.globals.get(name).cloned().unwrap_or_default();
                self.stack.push(value)
            }
            Opcode::StoreGlobal(idx) => {
                let name = name_at(&function, *idx)?.to_string();
                let value = self.stack.pop()?;
                self.globals.insert(name, value);
                Ok(())
            }
            Opcode::LoadLocal(slot) => {
                let value = self.stack.load_local(*slot)?;
                self.stack.push(value)
            }
            Opcode::StoreLocal(slot) => {
                let value = self.stack.pop()?;
                self.stack.store_local(*slot, value)
            }
            Opcode::Add => self.binary(|a, b| a.add(b)),
            Opcode::Sub => self.binary(|a, b| a.arith('-', b)),
            Opcode::Mul => self.binary(|a, b| a.arith('*', b)),
            Opcode::Div => self.binary(|a, b| a.arith('/', b)),
            Opcode::Eq => self.binary(|a, b| Ok(Value::Bool(a == b))),
            Opcode::Ne => self.binary(|a, b| Ok(Value::Bool(a != b))),
            Opcode::Lt => self.binary(|a, b| Ok(Value::Bool(a.compare(b)? == Ordering::Less))),
            Opcode::Le => {
                self.binary(|a, b| Ok(Value::Bool(a.compare(b)? != Ordering::Greater)))
            }
            Opcode::Gt => {
                self.binary(|a, b| Ok(Value::Bool(a.compare(b)? == Ordering::Greater)))
            }
            Opcode::Ge => self.binary(|a, b| Ok(Value::Bool(a.compare(b)? != Ordering::Less))),
            Opcode::Not => {
                let value = self.stack.pop()?;
                self.stack.push(Value::Bool(!value.is_truthy()))
            }
            Opcode::Neg => match self.stack.pop()? {
                Value::Number(n) => self.stack.push(Value::Number(-n)),
                other => Err(VmError::TypeError(format!(
                    "Cannot negate {}",
                    other.type_name()
                ))),
            },
            Opcode::Jump(target) => {
                self.jump(*target);
                Ok(())
            }
            Opcode::JumpIfFalse(target) => {
                if !self.stack.pop()?.is_truthy() {
                    self.jump(*target);
                }
                Ok(())
            }
            Opcode::LoadFunc(idx) => {
                let name = name_at(&function, *idx)?;
                if self.load_function(name) {
                    Ok(())
                } else {
                    Err(VmError::UnknownFunction(name.to_string()))
                }
            }
            Opcode::Call(_) => self.call(),
            Opcode::Pop => self.stack.pop().map(|_| ()),
            Opcode::Return => {
                let value = self.stack.pop()?;
                self.stack.pop_frame()?;
                self.stack.push(value)
            }
        }
    }

    /// Step until no more than `depth` frames remain
    pub fn run_until(&mut self, depth: usize) -> VmResult<()> {
        while self.stack.frame_count() > depth {
            self.step()?;
        }
        Ok(())
    }

    // ========================================================================
    // Source execution
    // ========================================================================

    /// Compile `source`, register its `func` declarations and return the
    /// top-level unit without running it
    pub fn load(&mut self, source: &str) -> VmResult<Arc<Function>> {
        let unit = compiler::compile_with_limit(source, self.options.max_nesting_depth)?;
        for function in unit.functions {
            self.define_function(function);
        }
        Ok(Arc::new(unit.main))
    }

    /// Compile and run `source` as an independent top-level unit.
    ///
    /// The stacks are left exactly as they were found, whether the unit
    /// completes or fails.
    pub fn run_source(&mut self, source: &str) -> VmResult<Value> {
        let main = self.load(source)?;
        let state = self.snapshot();
        if state.pending_calls >= self.options.max_call_depth {
            return Err(VmError::CallDepthExceeded(self.options.max_call_depth));
        }

        self.stack.push_frame(main, state.sp);
        let result = self
            .run_until(state.pending_calls)
            .and_then(|()| self.stack.pop());
        self.stack.restore(state);
        result
    }

    /// Call a function by name and return its result, restoring the stacks
    #[cfg(test)]
    fn call_function(&mut self, name: &str, args: &[Value]) -> VmResult<Value> {
        let state = self.snapshot();
        if !self.load_function(name) {
            return Err(VmError::UnknownFunction(normalize_name(name)));
        }

        let result = args
            .iter()
            .try_for_each(|arg| self.stack.push(arg.clone()))
            .and_then(|()| self.call())
            .and_then(|()| self.run_until(state.pending_calls))
            .and_then(|()| self.stack.pop());
        self.stack.restore(state);
        result
    }

    fn binary<F>(&mut self, op: F) -> VmResult<()>
    where
        F: FnOnce(&Value, &Value) -> VmResult<Value>,
    {
        let rhs = self.stack.pop()?;
        let lhs = self.stack.pop()?;
        let result = op(&lhs, &rhs)?;
        self.stack.push(result)
    }

    fn jump(&mut self, target: usize) {
        if let Some(frame) = self.stack.current_frame_mut() {
            frame.ip = target;
        }
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

fn name_at(function: &Function, idx: usize) -> VmResult<&str> {
    function
        .names
        .get(idx)
        .map(String::as_str)
        .ok_or_else(|| VmError::RuntimeError(format!("Name {} out of range", idx)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    #[test]
    fn test_run_source_sets_global() {
        let mut vm = Vm::new();
        vm.run_source("x = 1 + 1").unwrap();
        assert_eq!(vm.global("x"), Some(&Value::Number(2.0)));
        assert_eq!(vm.sp(), 0);
        assert_eq!(vm.pending_calls(), 0);
    }

    #[test]
    fn test_globals_are_case_insensitive() {
        let mut vm = Vm::new();
        vm.run_source("Total = 3").unwrap();
        assert_eq!(vm.global("TOTAL"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn test_call_function_returns_value() {
        let mut vm = Vm::new();
        vm.run_source("func Twice(n) { return n * 2 }").unwrap();
        let result = vm.call_function("twice", &[Value::Number(21.0)]).unwrap();
        assert_eq!(result, Value::Number(42.0));
    }

    #[test]
    fn test_missing_arguments_are_null() {
        let mut vm = Vm::new();
        vm.run_source("func MissingArg(a, b) { return b == null }").unwrap();
        let result = vm.call_function("missingarg", &[Value::from("only")]).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn test_extra_arguments_are_dropped() {
        let mut vm = Vm::new();
        vm.run_source("func First(a) { return a }").unwrap();
        let state = vm.snapshot();
        let result = vm
            .call_function("first", &[Value::from("a"), Value::from("b")])
            .unwrap();
        assert_eq!(result, Value::from("a"));
        assert_eq!(vm.snapshot(), state);
    }

    #[test]
    fn test_native_function_runs_immediately() {
        let mut vm = Vm::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        vm.register_native(
            "Tick",
            Arc::new(move |args: &[Value]| {
                counter.fetch_add(args.len(), AtomicOrdering::SeqCst);
                Ok(Value::Null)
            }),
        );

        assert!(vm.load_function("TICK"));
        vm.push(Value::from("a")).unwrap();
        vm.push(Value::from("b")).unwrap();
        vm.call().unwrap();

        assert_eq!(calls.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(vm.pending_calls(), 0);
        assert_eq!(vm.pop().unwrap(), Value::Null);
    }

    #[test]
    fn test_load_unknown_function_leaves_vm_untouched() {
        let mut vm = Vm::new();
        let state = vm.snapshot();
        assert!(!vm.load_function("nope"));
        assert_eq!(vm.snapshot(), state);
    }

    #[test]
    fn test_runtime_error_restores_stacks() {
        let mut vm = Vm::new();
        vm.run_source("func Bad() { x = 1; return 1 / 0 }").unwrap();
        let state = vm.snapshot();
        let err = vm.call_function("bad", &[]).unwrap_err();
        assert_eq!(err, VmError::RuntimeError("Division by zero".to_string()));
        assert_eq!(vm.snapshot(), state);
        assert_eq!(vm.global("x"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_call_depth_limit() {
        let mut vm = Vm::with_options(VmOptions {
            max_call_depth: 16,
            ..VmOptions::default()
        });
        vm.run_source("func Forever(n) { return Forever(n + 1) }").unwrap();
        let err = vm.call_function("forever", &[Value::Number(0.0)]).unwrap_err();
        assert_eq!(err, VmError::CallDepthExceeded(16));
        assert_eq!(vm.pending_calls(), 0);
    }

    #[test]
    fn test_while_loop() {
        let mut vm = Vm::new();
        vm.run_source("i = 0\nsum = 0\nwhile i < 5 { sum = sum + i; i = i + 1 }")
            .unwrap();
        assert_eq!(vm.global("sum"), Some(&Value::Number(10.0)));
    }

    #[test]
    fn test_else_if_chain() {
        let mut vm = Vm::new();
        vm.run_source(
            "func Grade(n) { if n > 8 { return \"a\" } else if n > 5 { return \"b\" } else { return \"c\" } }",
        )
        .unwrap();
        assert_eq!(vm.call_function("grade", &[Value::Number(9.0)]).unwrap(), Value::from("a"));
        assert_eq!(vm.call_function("grade", &[Value::Number(6.0)]).unwrap(), Value::from("b"));
        assert_eq!(vm.call_function("grade", &[Value::Number(1.0)]).unwrap(), Value::from("c"));
    }

    #[test]
    fn test_unknown_function_in_script() {
        let mut vm = Vm::new();
        let err = vm.run_source("missing()").unwrap_err();
        assert_eq!(err, VmError::UnknownFunction("missing".to_string()));
        assert_eq!(vm.sp(), 0);
    }
}
