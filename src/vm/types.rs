//! Runtime value and call-frame types shared across the vm modules

use std::collections::HashMap;
use std::fmt;

/// A value on the machine's stack
///
/// Programs compute with integers. Strings appear only as the plumbing of
/// `LOAD_STRING`, `COMMAND`, and `DEFINE_COMMAND` (command and formal
/// names); arithmetic and comparison on a string is a type error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Str(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "'{s}'"),
        }
    }
}

/// A call frame for an active user-defined command
///
/// Holds the return address and the caller's environment, swapped back in
/// wholesale on `RETURN`. The command name rides along for traces.
#[derive(Debug, Clone)]
pub struct Frame {
    pub return_ip: usize,
    pub env: HashMap<String, i64>,
    pub command: String,
}

/// A user-defined command registered by `DEFINE_COMMAND`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDef {
    pub name: String,
    /// Formal parameter names in definition order
    pub formals: Vec<String>,
    /// Absolute instruction index of the body
    pub entry: usize,
}
