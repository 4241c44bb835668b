//! The stack-machine interpreter
//!
//! Execution is a plain fetch/dispatch loop: read the instruction at `ip`,
//! advance `ip`, match on the opcode. Jumps overwrite `ip`. The machine
//! stops at `END`, when `ip` runs past the code, or when the cooperative
//! cancel flag is raised.
//!
//! All state — value stack, environment, frame stack, command table,
//! canvas — is owned by the interpreter for the duration of a run. An
//! embedding UI gets at the picture through [`Interpreter::snapshot`],
//! which copies the canvas by value; there is no channel back in.
//!
//! ## Example
//!
//! ```
//! let code = dbn::compile_source("Paper 100\n").unwrap();
//! let mut vm = dbn::Interpreter::new(code);
//! vm.run().unwrap();
//! assert_eq!(vm.canvas().get_raster(50, 50), Some(0));
//! ```

pub mod builtins;
pub mod canvas;
pub mod types;

pub use builtins::Builtin;
pub use canvas::Canvas;
pub use types::{CommandDef, Frame, Value};

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::compiler::bytecode::{Arg, Instruction, Op};
use crate::errors::RuntimeError;

/// Executes an assembled instruction sequence
pub struct Interpreter {
    code: Vec<Instruction>,
    stack: Vec<Value>,
    env: HashMap<String, i64>,
    frames: Vec<Frame>,
    commands: HashMap<String, CommandDef>,
    canvas: Canvas,
    /// Current pen, stored as a raster gray; fresh machines hold solid ink
    pen: u8,
    ip: usize,
    line_no: usize,
    terminated: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl Interpreter {
    pub fn new(code: Vec<Instruction>) -> Self {
        Self {
            code,
            stack: Vec::new(),
            env: HashMap::new(),
            frames: Vec::new(),
            commands: HashMap::new(),
            canvas: Canvas::new(),
            pen: 0,
            ip: 0,
            line_no: 0,
            terminated: false,
            cancel: None,
        }
    }

    /// Installs a flag an embedding thread can raise to stop the run; the
    /// machine checks it before every fetch
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// A value-copy of the canvas, for repainting from another thread
    pub fn snapshot(&self) -> Canvas {
        self.canvas.clone()
    }

    /// Reads a variable from the current environment; unset reads are 0
    pub fn variable(&self, name: &str) -> i64 {
        self.env.get(name).copied().unwrap_or(0)
    }

    pub fn terminated(&self) -> bool {
        self.terminated
    }

    /// True while there is an instruction to execute and nobody asked us
    /// to stop
    pub fn running(&self) -> bool {
        if self.terminated || self.ip >= self.code.len() {
            return false;
        }
        match &self.cancel {
            Some(flag) => !flag.load(Ordering::Relaxed),
            None => true,
        }
    }

    /// Runs to completion
    pub fn run(&mut self) -> Result<(), RuntimeError> {
        while self.running() {
            self.step()?;
        }
        Ok(())
    }

    /// Runs to completion, writing one trace line per instruction
    pub fn run_traced(&mut self, out: &mut dyn Write) -> Result<(), RuntimeError> {
        while self.running() {
            if let Some(line) = self.trace_line() {
                let _ = writeln!(out, "{line}");
            }
            self.step()?;
        }
        Ok(())
    }

    /// Formats the instruction about to execute, with the machine state
    /// it will see
    pub fn trace_line(&self) -> Option<String> {
        if self.ip >= self.code.len() {
            return None;
        }
        let instr = &self.code[self.ip];
        let stack: Vec<String> = self.stack.iter().map(Value::to_string).collect();
        Some(format!(
            "{:>4}  ({}, {})  line {}  stack [{}]",
            self.ip,
            instr.op,
            instr.arg,
            self.line_no,
            stack.join(", ")
        ))
    }

    /// Fetches, advances, and dispatches a single instruction
    pub fn step(&mut self) -> Result<(), RuntimeError> {
        if !self.running() {
            return Ok(());
        }

        let instr = self.code[self.ip].clone();
        self.ip += 1;

        match instr.op {
            Op::LoadInteger => {
                let n = self.int_arg(&instr)?;
                self.stack.push(Value::Int(n));
            }
            Op::LoadString => {
                let s = self.str_arg(&instr)?;
                self.stack.push(Value::Str(s));
            }
            Op::Load => {
                let name = self.str_arg(&instr)?;
                self.stack.push(Value::Int(self.variable(&name)));
            }
            Op::Store => {
                let name = self.str_arg(&instr)?;
                let value = self.pop_int()?;
                self.env.insert(name, value);
            }
            Op::BinaryAdd => {
                let a = self.pop_int()?;
                let b = self.pop_int()?;
                self.stack.push(Value::Int(a.wrapping_add(b)));
            }
            Op::BinarySub => {
                let a = self.pop_int()?;
                let b = self.pop_int()?;
                self.stack.push(Value::Int(a.wrapping_sub(b)));
            }
            Op::BinaryMul => {
                let a = self.pop_int()?;
                let b = self.pop_int()?;
                self.stack.push(Value::Int(a.wrapping_mul(b)));
            }
            Op::BinaryDiv => {
                let a = self.pop_int()?;
                let b = self.pop_int()?;
                if b == 0 {
                    return Err(RuntimeError::DivisionByZero { line: self.line_no });
                }
                // truncates toward zero
                self.stack.push(Value::Int(a.wrapping_div(b)));
            }
            Op::CompareSame => {
                let a = self.pop_int()?;
                let b = self.pop_int()?;
                self.stack.push(Value::Int((a == b) as i64));
            }
            Op::CompareNsame => {
                let a = self.pop_int()?;
                let b = self.pop_int()?;
                self.stack.push(Value::Int((a != b) as i64));
            }
            Op::CompareSmaller => {
                let a = self.pop_int()?;
                let b = self.pop_int()?;
                self.stack.push(Value::Int((a < b) as i64));
            }
            Op::CompareNsmaller => {
                let a = self.pop_int()?;
                let b = self.pop_int()?;
                self.stack.push(Value::Int((a >= b) as i64));
            }
            Op::DupTopx => {
                let count = self.count_arg(&instr)?;
                if count > self.stack.len() {
                    return Err(RuntimeError::StackUnderflow { line: self.line_no });
                }
                let copies = self.stack[self.stack.len() - count..].to_vec();
                self.stack.extend(copies);
            }
            Op::PopTopx => {
                let count = self.count_arg(&instr)?;
                if count > self.stack.len() {
                    return Err(RuntimeError::StackUnderflow { line: self.line_no });
                }
                self.stack.truncate(self.stack.len() - count);
            }
            Op::Jump => {
                let target = self.int_arg(&instr)?;
                self.jump_to(target)?;
            }
            Op::PopJumpIfTrue => {
                let target = self.int_arg(&instr)?;
                if self.pop_int()? != 0 {
                    self.jump_to(target)?;
                }
            }
            Op::PopJumpIfFalse => {
                let target = self.int_arg(&instr)?;
                if self.pop_int()? == 0 {
                    self.jump_to(target)?;
                }
            }
            Op::GetDot => {
                let x = self.pop_int()?;
                let y = self.pop_int()?;
                self.stack.push(Value::Int(self.canvas.read_dot(x, y)));
            }
            Op::SetDot => {
                let x = self.pop_int()?;
                let y = self.pop_int()?;
                let value = self.pop_int()?;
                self.canvas.write_dot(x, y, value);
            }
            Op::Command => {
                let argc = self.count_arg(&instr)?;
                self.dispatch_command(argc)?;
            }
            Op::DefineCommand => {
                let argc = self.count_arg(&instr)?;
                self.define_command(argc)?;
            }
            Op::Return => {
                let value = self.pop()?;
                let frame = self
                    .frames
                    .pop()
                    .ok_or(RuntimeError::FrameUnderflow { line: self.line_no })?;
                self.env = frame.env;
                self.ip = frame.return_ip;
                self.stack.push(value);
            }
            Op::SetLineNo => {
                let n = self.int_arg(&instr)?;
                self.line_no = n.max(0) as usize;
            }
            Op::End => {
                self.terminated = true;
            }
        }

        Ok(())
    }

    /// `COMMAND argc`: the name is on top of the stack, the arguments
    /// beneath it with the first argument topmost
    fn dispatch_command(&mut self, argc: usize) -> Result<(), RuntimeError> {
        let name = self.pop_str()?;

        // built-ins mask user definitions
        if let Some(builtin) = Builtin::lookup(&name) {
            if argc != builtin.arity() {
                return Err(RuntimeError::ArityMismatch {
                    line: self.line_no,
                    name,
                    expected: builtin.arity(),
                    found: argc,
                });
            }
            let mut args = Vec::with_capacity(argc);
            for _ in 0..argc {
                args.push(self.pop_int()?);
            }
            let result = builtin.invoke(&args, &mut self.canvas, &mut self.pen);
            self.stack.push(Value::Int(result));
            return Ok(());
        }

        let def = match self.commands.get(&name) {
            Some(def) => def.clone(),
            None => {
                return Err(RuntimeError::UnknownCommand {
                    line: self.line_no,
                    name,
                })
            }
        };
        if argc != def.formals.len() {
            return Err(RuntimeError::ArityMismatch {
                line: self.line_no,
                name,
                expected: def.formals.len(),
                found: argc,
            });
        }

        // bind formals in definition order; the first formal takes the
        // topmost (first) argument
        let mut env = HashMap::new();
        for formal in &def.formals {
            env.insert(formal.clone(), self.pop_int()?);
        }

        self.frames.push(Frame {
            return_ip: self.ip,
            env: std::mem::replace(&mut self.env, env),
            command: name,
        });
        self.ip = def.entry;
        Ok(())
    }

    /// `DEFINE_COMMAND argc`: entry index, then name, then `argc` formal
    /// names come off the stack
    fn define_command(&mut self, argc: usize) -> Result<(), RuntimeError> {
        let entry = self.pop_int()?;
        let name = self.pop_str()?;

        let mut formals = Vec::with_capacity(argc);
        for _ in 0..argc {
            formals.push(self.pop_str()?);
        }

        if entry < 0 || entry as usize > self.code.len() {
            return Err(RuntimeError::JumpOutOfBounds {
                line: self.line_no,
                target: entry,
                len: self.code.len(),
            });
        }

        // redefinition replaces the previous entry
        self.commands.insert(
            name.clone(),
            CommandDef {
                name,
                formals,
                entry: entry as usize,
            },
        );
        Ok(())
    }

    fn jump_to(&mut self, target: i64) -> Result<(), RuntimeError> {
        if target < 0 || target as usize > self.code.len() {
            return Err(RuntimeError::JumpOutOfBounds {
                line: self.line_no,
                target,
                len: self.code.len(),
            });
        }
        self.ip = target as usize;
        Ok(())
    }

    fn pop(&mut self) -> Result<Value, RuntimeError> {
        self.stack
            .pop()
            .ok_or(RuntimeError::StackUnderflow { line: self.line_no })
    }

    fn pop_int(&mut self) -> Result<i64, RuntimeError> {
        match self.pop()? {
            Value::Int(n) => Ok(n),
            Value::Str(_) => Err(RuntimeError::TypeError {
                line: self.line_no,
                expected: "an integer",
            }),
        }
    }

    fn pop_str(&mut self) -> Result<String, RuntimeError> {
        match self.pop()? {
            Value::Str(s) => Ok(s),
            Value::Int(_) => Err(RuntimeError::TypeError {
                line: self.line_no,
                expected: "a string",
            }),
        }
    }

    fn int_arg(&self, instr: &Instruction) -> Result<i64, RuntimeError> {
        match &instr.arg {
            Arg::Int(n) => Ok(*n),
            other => Err(RuntimeError::InvalidInstruction {
                line: self.line_no,
                detail: format!("{} expects an integer argument, got {other}", instr.op),
            }),
        }
    }

    fn count_arg(&self, instr: &Instruction) -> Result<usize, RuntimeError> {
        let n = self.int_arg(instr)?;
        if n < 0 {
            return Err(RuntimeError::InvalidInstruction {
                line: self.line_no,
                detail: format!("{} expects a non-negative count, got {n}", instr.op),
            });
        }
        Ok(n as usize)
    }

    fn str_arg(&self, instr: &Instruction) -> Result<String, RuntimeError> {
        match &instr.arg {
            Arg::Str(s) => Ok(s.clone()),
            other => Err(RuntimeError::InvalidInstruction {
                line: self.line_no,
                detail: format!("{} expects a string argument, got {other}", instr.op),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instr(op: Op, arg: Arg) -> Instruction {
        Instruction::new(op, arg)
    }

    fn run(code: Vec<Instruction>) -> Interpreter {
        let mut vm = Interpreter::new(code);
        vm.run().unwrap();
        vm
    }

    fn run_err(code: Vec<Instruction>) -> RuntimeError {
        let mut vm = Interpreter::new(code);
        vm.run().unwrap_err()
    }

    #[test]
    fn unset_variables_read_as_zero() {
        let vm = run(vec![
            instr(Op::Load, Arg::Str("nothing".to_string())),
            instr(Op::Store, Arg::Str("A".to_string())),
            instr(Op::End, Arg::None),
        ]);
        assert_eq!(vm.variable("A"), 0);
    }

    #[test]
    fn store_then_load() {
        let vm = run(vec![
            instr(Op::LoadInteger, Arg::Int(9)),
            instr(Op::Store, Arg::Str("A".to_string())),
            instr(Op::Load, Arg::Str("A".to_string())),
            instr(Op::Store, Arg::Str("B".to_string())),
            instr(Op::End, Arg::None),
        ]);
        assert_eq!(vm.variable("B"), 9);
    }

    #[test]
    fn subtraction_order() {
        // right operand is pushed first
        let vm = run(vec![
            instr(Op::LoadInteger, Arg::Int(3)),
            instr(Op::LoadInteger, Arg::Int(10)),
            instr(Op::BinarySub, Arg::None),
            instr(Op::Store, Arg::Str("A".to_string())),
            instr(Op::End, Arg::None),
        ]);
        assert_eq!(vm.variable("A"), 7);
    }

    #[test]
    fn division_truncates_toward_zero() {
        let divide = |a: i64, b: i64| {
            let vm = run(vec![
                instr(Op::LoadInteger, Arg::Int(b)),
                instr(Op::LoadInteger, Arg::Int(a)),
                instr(Op::BinaryDiv, Arg::None),
                instr(Op::Store, Arg::Str("Q".to_string())),
                instr(Op::End, Arg::None),
            ]);
            vm.variable("Q")
        };
        assert_eq!(divide(5, 2), 2);
        assert_eq!(divide(-5, 2), -2);
    }

    #[test]
    fn division_by_zero_fails() {
        let err = run_err(vec![
            instr(Op::LoadInteger, Arg::Int(0)),
            instr(Op::LoadInteger, Arg::Int(5)),
            instr(Op::BinaryDiv, Arg::None),
            instr(Op::End, Arg::None),
        ]);
        assert!(matches!(err, RuntimeError::DivisionByZero { .. }));
    }

    #[test]
    fn arithmetic_on_a_string_is_a_type_error() {
        let err = run_err(vec![
            instr(Op::LoadInteger, Arg::Int(1)),
            instr(Op::LoadString, Arg::Str("oops".to_string())),
            instr(Op::BinaryAdd, Arg::None),
            instr(Op::End, Arg::None),
        ]);
        assert!(matches!(err, RuntimeError::TypeError { .. }));
    }

    #[test]
    fn empty_stack_pop_fails() {
        let err = run_err(vec![instr(Op::BinaryAdd, Arg::None)]);
        assert!(matches!(err, RuntimeError::StackUnderflow { .. }));
    }

    #[test]
    fn dup_topx_duplicates_the_top_run_in_order() {
        let vm = run(vec![
            instr(Op::LoadInteger, Arg::Int(7)), // end
            instr(Op::LoadInteger, Arg::Int(3)), // current
            instr(Op::DupTopx, Arg::Int(2)),
            // the copies land as [7, 3, 7, 3]; prove it by storing all four
            instr(Op::Store, Arg::Str("D".to_string())),
            instr(Op::Store, Arg::Str("C".to_string())),
            instr(Op::Store, Arg::Str("B".to_string())),
            instr(Op::Store, Arg::Str("A".to_string())),
            instr(Op::End, Arg::None),
        ]);
        assert_eq!(vm.variable("A"), 7);
        assert_eq!(vm.variable("B"), 3);
        assert_eq!(vm.variable("C"), 7);
        assert_eq!(vm.variable("D"), 3);
    }

    #[test]
    fn dup_and_pop_underflow() {
        let err = run_err(vec![
            instr(Op::LoadInteger, Arg::Int(1)),
            instr(Op::DupTopx, Arg::Int(2)),
        ]);
        assert!(matches!(err, RuntimeError::StackUnderflow { .. }));

        let err = run_err(vec![
            instr(Op::LoadInteger, Arg::Int(1)),
            instr(Op::PopTopx, Arg::Int(2)),
        ]);
        assert!(matches!(err, RuntimeError::StackUnderflow { .. }));
    }

    #[test]
    fn jump_out_of_bounds_fails() {
        let err = run_err(vec![instr(Op::Jump, Arg::Int(99))]);
        assert!(matches!(err, RuntimeError::JumpOutOfBounds { .. }));
    }

    #[test]
    fn return_without_a_frame_fails() {
        let err = run_err(vec![
            instr(Op::LoadInteger, Arg::Int(0)),
            instr(Op::Return, Arg::None),
        ]);
        assert!(matches!(err, RuntimeError::FrameUnderflow { .. }));
    }

    #[test]
    fn unknown_command_fails() {
        let err = run_err(vec![
            instr(Op::LoadString, Arg::Str("Nope".to_string())),
            instr(Op::Command, Arg::Int(0)),
            instr(Op::End, Arg::None),
        ]);
        assert!(matches!(err, RuntimeError::UnknownCommand { .. }));
    }

    #[test]
    fn builtin_arity_is_enforced() {
        let err = run_err(vec![
            instr(Op::LoadInteger, Arg::Int(1)),
            instr(Op::LoadString, Arg::Str("Paper".to_string())),
            instr(Op::Command, Arg::Int(2)),
            instr(Op::End, Arg::None),
        ]);
        match err {
            RuntimeError::ArityMismatch {
                expected, found, ..
            } => {
                assert_eq!(expected, 1);
                assert_eq!(found, 2);
            }
            other => panic!("expected an arity error, got {other:?}"),
        }
    }

    #[test]
    fn set_dot_and_get_dot() {
        let vm = run(vec![
            // Set [10 20] 50
            instr(Op::LoadInteger, Arg::Int(50)),
            instr(Op::LoadInteger, Arg::Int(20)),
            instr(Op::LoadInteger, Arg::Int(10)),
            instr(Op::SetDot, Arg::None),
            // Set A [10 20]
            instr(Op::LoadInteger, Arg::Int(20)),
            instr(Op::LoadInteger, Arg::Int(10)),
            instr(Op::GetDot, Arg::None),
            instr(Op::Store, Arg::Str("A".to_string())),
            instr(Op::End, Arg::None),
        ]);
        assert_eq!(vm.variable("A"), 50);
    }

    #[test]
    fn end_sets_the_terminated_flag() {
        let vm = run(vec![instr(Op::End, Arg::None)]);
        assert!(vm.terminated());
    }

    #[test]
    fn running_off_the_end_stops_without_terminating() {
        let vm = run(vec![instr(Op::LoadInteger, Arg::Int(1))]);
        assert!(!vm.terminated());
        assert!(!vm.running());
    }

    #[test]
    fn cancel_flag_stops_the_machine() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut vm = Interpreter::new(vec![
            instr(Op::LoadInteger, Arg::Int(1)),
            instr(Op::End, Arg::None),
        ])
        .with_cancel_flag(flag);
        vm.run().unwrap();
        assert!(!vm.terminated());
        assert_eq!(vm.variable("A"), 0);
    }

    #[test]
    fn trace_lines_show_ip_op_arg_and_stack() {
        let mut vm = Interpreter::new(vec![
            instr(Op::LoadInteger, Arg::Int(5)),
            instr(Op::Store, Arg::Str("A".to_string())),
            instr(Op::End, Arg::None),
        ]);
        let mut out = Vec::new();
        vm.run_traced(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("(LOAD_INTEGER, 5)"));
        assert!(lines[1].contains("(STORE, A)"));
        assert!(lines[1].contains("stack [5]"));
        assert!(lines[2].contains("(END, _)"));
    }

    #[test]
    fn stray_label_is_an_invalid_instruction() {
        use crate::compiler::bytecode::Label;
        let err = run_err(vec![instr(
            Op::Jump,
            Arg::Label(Label::new("never_assembled")),
        )]);
        assert!(matches!(err, RuntimeError::InvalidInstruction { .. }));
    }
}
