//! Label resolution: symbolic code stream -> executable instruction list
//!
//! Assembly walks the emitted stream once to bind every label sentinel to
//! the index of the next real instruction, then rewrites every label
//! argument to its resolved integer index. After this pass the code is
//! position-independent of its labels and immutable.

use std::collections::HashMap;

use super::bytecode::{Arg, Code, Instruction};
use crate::errors::AssembleError;

/// Resolves labels and strips the sentinels
pub fn assemble(code: Vec<Code>) -> Result<Vec<Instruction>, AssembleError> {
    // bind each label to the index of the instruction that follows it
    let mut targets: HashMap<String, usize> = HashMap::new();
    let mut instructions = Vec::with_capacity(code.len());

    for element in code {
        match element {
            Code::Label(label) => {
                targets.insert(label.name, instructions.len());
            }
            Code::Instr(instr) => instructions.push(instr),
        }
    }

    // rewrite label arguments to absolute indices
    for instr in &mut instructions {
        if let Arg::Label(label) = &instr.arg {
            let target = targets.get(&label.name).ok_or_else(|| AssembleError {
                label: label.name.clone(),
            })?;
            instr.arg = Arg::Int(*target as i64);
        }
    }

    Ok(instructions)
}
