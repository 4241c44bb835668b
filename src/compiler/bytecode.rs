//! Bytecode instruction set for the DBN virtual machine
//!
//! An instruction is an opcode plus one argument slot. Before assembly the
//! slot may hold a symbolic [`Label`]; after assembly every label has been
//! rewritten to an absolute instruction index, and the machine only ever
//! sees integers, strings, or nothing.

use std::fmt;

/// The closed set of opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    LoadInteger,
    LoadString,
    Load,
    Store,
    BinaryAdd,
    BinarySub,
    BinaryMul,
    BinaryDiv,
    CompareSame,
    CompareNsame,
    CompareSmaller,
    CompareNsmaller,
    DupTopx,
    PopTopx,
    Jump,
    PopJumpIfTrue,
    PopJumpIfFalse,
    GetDot,
    SetDot,
    Command,
    DefineCommand,
    Return,
    SetLineNo,
    End,
}

impl Op {
    /// The canonical wire name, used in listings and traces
    pub fn name(&self) -> &'static str {
        match self {
            Op::LoadInteger => "LOAD_INTEGER",
            Op::LoadString => "LOAD_STRING",
            Op::Load => "LOAD",
            Op::Store => "STORE",
            Op::BinaryAdd => "BINARY_ADD",
            Op::BinarySub => "BINARY_SUB",
            Op::BinaryMul => "BINARY_MUL",
            Op::BinaryDiv => "BINARY_DIV",
            Op::CompareSame => "COMPARE_SAME",
            Op::CompareNsame => "COMPARE_NSAME",
            Op::CompareSmaller => "COMPARE_SMALLER",
            Op::CompareNsmaller => "COMPARE_NSMALLER",
            Op::DupTopx => "DUP_TOPX",
            Op::PopTopx => "POP_TOPX",
            Op::Jump => "JUMP",
            Op::PopJumpIfTrue => "POP_JUMP_IF_TRUE",
            Op::PopJumpIfFalse => "POP_JUMP_IF_FALSE",
            Op::GetDot => "GET_DOT",
            Op::SetDot => "SET_DOT",
            Op::Command => "COMMAND",
            Op::DefineCommand => "DEFINE_COMMAND",
            Op::Return => "RETURN",
            Op::SetLineNo => "SET_LINE_NO",
            Op::End => "END",
        }
    }

    /// Numeric opcode, for listings that want numbers over names
    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// True for the three ops whose argument is a jump target
    pub fn is_jump(&self) -> bool {
        matches!(self, Op::Jump | Op::PopJumpIfTrue | Op::PopJumpIfFalse)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A symbolic jump target, unique per compilation
///
/// Labels exist only between compilation and assembly. Each is bound to
/// exactly one position in the emitted code stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label {
    pub name: String,
}

impl Label {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The argument slot of an instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    None,
    Int(i64),
    Str(String),
    Label(Label),
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::None => write!(f, "_"),
            Arg::Int(n) => write!(f, "{n}"),
            Arg::Str(s) => write!(f, "{s}"),
            Arg::Label(l) => write!(f, "{l}"),
        }
    }
}

/// One bytecode instruction
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub op: Op,
    pub arg: Arg,
}

impl Instruction {
    pub fn new(op: Op, arg: Arg) -> Self {
        Self { op, arg }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.op, self.arg)
    }
}

/// An element of the pre-assembly code stream: a real instruction, or a
/// label sentinel that will resolve to the index of the next instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Code {
    Instr(Instruction),
    Label(Label),
}

/// Formats assembled code as a listing, one `<index> (<op>, <arg>)` line
/// per instruction; `numbers` swaps the opcode names for numeric opcodes
pub fn listing(code: &[Instruction], numbers: bool) -> String {
    let mut out = String::new();
    for (index, instr) in code.iter().enumerate() {
        if numbers {
            out.push_str(&format!("{index} ({}, {})\n", instr.op.code(), instr.arg));
        } else {
            out.push_str(&format!("{index} {instr}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_format() {
        let code = vec![
            Instruction::new(Op::SetLineNo, Arg::Int(1)),
            Instruction::new(Op::LoadInteger, Arg::Int(5)),
            Instruction::new(Op::Store, Arg::Str("A".to_string())),
            Instruction::new(Op::End, Arg::None),
        ];
        let text = listing(&code, false);
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "0 (SET_LINE_NO, 1)");
        assert_eq!(lines[1], "1 (LOAD_INTEGER, 5)");
        assert_eq!(lines[2], "2 (STORE, A)");
        assert_eq!(lines[3], "3 (END, _)");
    }

    #[test]
    fn numeric_listing_uses_opcode_numbers() {
        let code = vec![Instruction::new(Op::LoadInteger, Arg::Int(5))];
        let text = listing(&code, true);
        assert_eq!(
            text.trim_end(),
            format!("0 ({}, 5)", Op::LoadInteger.code())
        );
    }

    #[test]
    fn jump_ops() {
        assert!(Op::Jump.is_jump());
        assert!(Op::PopJumpIfTrue.is_jump());
        assert!(Op::PopJumpIfFalse.is_jump());
        assert!(!Op::LoadInteger.is_jump());
    }
}
