//! AST-to-bytecode compiler
//!
//! A single-pass visitor emits instructions and label sentinels into an
//! ordered code stream; [`assembler::assemble`] then resolves the labels to
//! absolute indices. Labels are generated on demand with a unique counter
//! per prefix.
//!
//! Module mode (used for `Load`ed files) suppresses `SET_LINE_NO` emission
//! and the trailing `END`. `Load` itself is resolved here rather than at
//! run time: the referenced file is tokenized, parsed, and compiled inline
//! in module mode by the *same* compiler instance, which keeps label names
//! unique across the spliced modules. Load paths resolve relative to the
//! including program's directory, and an include stack catches cycles.

pub mod assembler;
pub mod bytecode;

pub use assembler::assemble;
pub use bytecode::{listing, Arg, Code, Instruction, Label, Op};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{CompileError, Error, LoadError};
use crate::parser;
use crate::parser::ast::{BinaryOp, Node, NodeKind, QuestionOp};
use crate::tokenizer;

/// Emits bytecode for one program, plus any modules it `Load`s
pub struct Compiler {
    code: Vec<Code>,
    module: bool,
    label_counts: HashMap<String, usize>,
    base_dir: Option<PathBuf>,
    loading: Vec<PathBuf>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            code: Vec::new(),
            module: false,
            label_counts: HashMap::new(),
            base_dir: None,
            loading: Vec::new(),
        }
    }

    /// A compiler in module mode, for compiling a library fragment on its
    /// own (no line tracking, no trailing `END`)
    pub fn for_module() -> Self {
        Self {
            module: true,
            ..Self::new()
        }
    }

    /// Sets the directory `Load` paths resolve against
    pub fn with_base_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.base_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Compiles a program node into the symbolic code stream
    pub fn compile(mut self, node: &Node) -> Result<Vec<Code>, Error> {
        self.visit(node)?;
        if !self.module {
            self.add(Op::End, Arg::None);
        }
        Ok(self.code)
    }

    fn add(&mut self, op: Op, arg: Arg) {
        self.code.push(Code::Instr(Instruction::new(op, arg)));
    }

    fn add_label(&mut self, label: Label) {
        self.code.push(Code::Label(label));
    }

    fn set_line_no(&mut self, line_no: usize) {
        if !self.module {
            self.add(Op::SetLineNo, Arg::Int(line_no as i64));
        }
    }

    /// Generates a unique label for the given prefix
    fn generate_label(&mut self, prefix: &str) -> Label {
        let count = self.label_counts.entry(prefix.to_string()).or_insert(0);
        let label = Label::new(format!("{prefix}_{count}"));
        *count += 1;
        label
    }

    fn visit(&mut self, node: &Node) -> Result<(), Error> {
        match &node.kind {
            NodeKind::Block(children) => self.visit_block(children),
            NodeKind::Set { target, value } => self.visit_set(node, target, value),
            NodeKind::Repeat {
                var,
                start,
                end,
                body,
            } => self.visit_repeat(node, var, start, end, body),
            NodeKind::Question {
                op,
                left,
                right,
                body,
            } => self.visit_question(node, *op, left, right, body),
            NodeKind::Command { name, args } => self.visit_command(node, name, args),
            NodeKind::CommandDefinition {
                name,
                formals,
                body,
            } => self.visit_command_definition(node, name, formals, body),
            NodeKind::Load(path) => self.visit_load(node, path),
            NodeKind::BinaryOp { op, left, right } => self.visit_binary_op(*op, left, right),
            NodeKind::Bracket { x, y } => self.visit_bracket(x, y),
            NodeKind::Word(name) => {
                self.add(Op::Load, Arg::Str(name.clone()));
                Ok(())
            }
            NodeKind::Number(value) => {
                self.add(Op::LoadInteger, Arg::Int(*value));
                Ok(())
            }
            NodeKind::NoOp => Ok(()),
        }
    }

    fn visit_block(&mut self, children: &[Node]) -> Result<(), Error> {
        for child in children {
            self.visit(child)?;
        }
        Ok(())
    }

    fn visit_set(&mut self, node: &Node, target: &Node, value: &Node) -> Result<(), Error> {
        self.set_line_no(node.line_no);

        self.visit(value)?;

        match &target.kind {
            NodeKind::Bracket { x, y } => {
                self.visit(y)?;
                self.visit(x)?;
                self.add(Op::SetDot, Arg::None);
                Ok(())
            }
            NodeKind::Word(name) => {
                self.add(Op::Store, Arg::Str(name.clone()));
                Ok(())
            }
            _ => Err(CompileError {
                line: node.line_no,
                detail: "Set target must be a word or a dot".to_string(),
            }
            .into()),
        }
    }

    fn visit_repeat(
        &mut self,
        node: &Node,
        var: &str,
        start: &Node,
        end: &Node,
        body: &Node,
    ) -> Result<(), Error> {
        self.set_line_no(node.line_no);

        // the loop runs with [end, current] on the stack
        self.visit(end)?;
        self.visit(start)?;

        let body_entry = self.generate_label("repeat_body_entry");
        let repeat_end = self.generate_label("repeat_end");

        self.add_label(body_entry.clone());

        // current is consumed by the store, so duplicate it first
        self.add(Op::DupTopx, Arg::Int(1));
        self.add(Op::Store, Arg::Str(var.to_string()));

        self.visit(body)?;

        // duplicate [end, current] for the termination test
        self.add(Op::DupTopx, Arg::Int(2));
        self.add(Op::CompareSame, Arg::None);
        self.add(Op::PopJumpIfTrue, Arg::Label(repeat_end.clone()));

        // not done: step toward end, ascending or descending
        let decrement_setup = self.generate_label("repeat_decrement_setup");
        let step = self.generate_label("repeat_step");

        self.add(Op::DupTopx, Arg::Int(2));
        self.add(Op::CompareSmaller, Arg::None);
        self.add(Op::PopJumpIfFalse, Arg::Label(decrement_setup.clone()));

        self.add(Op::LoadInteger, Arg::Int(1));
        self.add(Op::Jump, Arg::Label(step.clone()));

        self.add_label(decrement_setup);
        self.add(Op::LoadInteger, Arg::Int(-1));

        self.add_label(step);
        self.add(Op::BinaryAdd, Arg::None);
        self.add(Op::Jump, Arg::Label(body_entry));

        // cleanup: drop [end, current]
        self.add_label(repeat_end);
        self.add(Op::PopTopx, Arg::Int(2));
        Ok(())
    }

    fn visit_question(
        &mut self,
        node: &Node,
        op: QuestionOp,
        left: &Node,
        right: &Node,
        body: &Node,
    ) -> Result<(), Error> {
        self.set_line_no(node.line_no);

        self.visit(right)?;
        self.visit(left)?;

        let compare = match op {
            QuestionOp::Same => Op::CompareSame,
            QuestionOp::NotSame => Op::CompareNsame,
            QuestionOp::Smaller => Op::CompareSmaller,
            QuestionOp::NotSmaller => Op::CompareNsmaller,
        };
        self.add(compare, Arg::None);

        let after_body = self.generate_label("question_after_body");
        self.add(Op::PopJumpIfFalse, Arg::Label(after_body.clone()));
        self.visit(body)?;
        self.add_label(after_body);
        Ok(())
    }

    fn visit_command(&mut self, node: &Node, name: &str, args: &[Node]) -> Result<(), Error> {
        self.set_line_no(node.line_no);

        // arguments in reverse order, so the first ends up on top
        for arg in args.iter().rev() {
            self.visit(arg)?;
        }

        self.add(Op::LoadString, Arg::Str(name.to_string()));
        self.add(Op::Command, Arg::Int(args.len() as i64));

        // the return value of a statement-level call is thrown away
        self.add(Op::PopTopx, Arg::Int(1));
        Ok(())
    }

    fn visit_command_definition(
        &mut self,
        node: &Node,
        name: &str,
        formals: &[String],
        body: &Node,
    ) -> Result<(), Error> {
        self.set_line_no(node.line_no);

        // formals in reverse order, so the first is popped first when the
        // frame is built
        for formal in formals.iter().rev() {
            self.add(Op::LoadString, Arg::Str(formal.clone()));
        }
        self.add(Op::LoadString, Arg::Str(name.to_string()));

        let entry = self.generate_label(&format!("command_definition_{name}"));
        let after = self.generate_label("after_command_definition");

        self.add(Op::LoadInteger, Arg::Label(entry.clone()));
        self.add(Op::DefineCommand, Arg::Int(formals.len() as i64));

        self.add(Op::Jump, Arg::Label(after.clone()));
        self.add_label(entry);

        self.visit(body)?;

        // every command returns something; bodies without an explicit
        // value return 0
        self.add(Op::LoadInteger, Arg::Int(0));
        self.add(Op::Return, Arg::None);

        self.add_label(after);
        Ok(())
    }

    fn visit_load(&mut self, node: &Node, path: &str) -> Result<(), Error> {
        self.set_line_no(node.line_no);

        let resolved = match &self.base_dir {
            Some(dir) => dir.join(path),
            None => PathBuf::from(path),
        };
        let load_error = |detail: String| LoadError {
            path: resolved.clone(),
            detail,
        };

        let canonical = resolved
            .canonicalize()
            .map_err(|e| load_error(e.to_string()))?;
        if self.loading.contains(&canonical) {
            return Err(load_error("Load cycle".to_string()).into());
        }

        let source = fs::read_to_string(&canonical).map_err(|e| load_error(e.to_string()))?;
        let tokens = tokenizer::tokenize(&source).map_err(|e| load_error(e.to_string()))?;
        let ast = parser::parse(tokens).map_err(|e| load_error(e.to_string()))?;

        // splice the module's code in place, compiled in module mode by
        // this same instance so its labels stay unique
        let saved_module = self.module;
        let saved_base_dir = self.base_dir.clone();
        self.module = true;
        self.base_dir = canonical.parent().map(Path::to_path_buf);
        self.loading.push(canonical);

        let spliced = self.visit(&ast);

        self.loading.pop();
        self.base_dir = saved_base_dir;
        self.module = saved_module;
        spliced
    }

    fn visit_binary_op(&mut self, op: BinaryOp, left: &Node, right: &Node) -> Result<(), Error> {
        self.visit(right)?;
        self.visit(left)?;

        let emitted = match op {
            BinaryOp::Add => Op::BinaryAdd,
            BinaryOp::Sub => Op::BinarySub,
            BinaryOp::Mul => Op::BinaryMul,
            BinaryOp::Div => Op::BinaryDiv,
        };
        self.add(emitted, Arg::None);
        Ok(())
    }

    fn visit_bracket(&mut self, x: &Node, y: &Node) -> Result<(), Error> {
        self.visit(y)?;
        self.visit(x)?;
        self.add(Op::GetDot, Arg::None);
        Ok(())
    }
}
