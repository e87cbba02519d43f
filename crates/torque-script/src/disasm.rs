//! Human-readable bytecode listing, used by the CLI's `--disassemble` output.
//!
//! One line per instruction, `<ip>: <mnemonic> <operands>`, with string-table
//! operands resolved back to their literal text so the listing is readable
//! without cross-referencing the interner separately.

use std::fmt::Write as _;

use crate::bytecode::{Instruction, InstructionSequence};
use crate::intern::Interner;

#[must_use]
pub fn disassemble(body: &InstructionSequence, interner: &Interner) -> String {
    let mut out = String::new();
    for (ip, instr) in body.iter().enumerate() {
        let _ = writeln!(out, "{ip:>4}: {}", format_instruction(instr, interner));
    }
    out
}

fn format_instruction(instr: &Instruction, interner: &Interner) -> String {
    let resolve = |id: crate::intern::StringId| interner.resolve(id).to_string();
    match instr {
        Instruction::PushInteger(n) => format!("PushInteger {n}"),
        Instruction::PushFloat(f) => format!("PushFloat {f}"),
        Instruction::PushString(id) => format!("PushString {:?}", resolve(*id)),
        Instruction::PushLocalReference(id) => format!("PushLocalReference {}", resolve(*id)),
        Instruction::PushGlobalReference(id) => format!("PushGlobalReference {}", resolve(*id)),
        Instruction::AddAssignment => "AddAssignment".to_string(),
        Instruction::Assignment => "Assignment".to_string(),
        Instruction::Concat(sep) => format!("Concat {sep:?}"),
        Instruction::Negate => "Negate".to_string(),
        Instruction::Not => "Not".to_string(),
        Instruction::CallFunction { namespace, name, argc } => {
            let ns = namespace.map(resolve).unwrap_or_default();
            format!("CallFunction {ns}::{}({argc})", resolve(*name))
        }
        Instruction::LogicalAnd => "LogicalAnd".to_string(),
        Instruction::LogicalOr => "LogicalOr".to_string(),
        Instruction::Add => "Add".to_string(),
        Instruction::Minus => "Minus".to_string(),
        Instruction::Modulus => "Modulus".to_string(),
        Instruction::LessThan => "LessThan".to_string(),
        Instruction::GreaterThan => "GreaterThan".to_string(),
        Instruction::GreaterThanOrEqual => "GreaterThanOrEqual".to_string(),
        Instruction::Equals => "Equals".to_string(),
        Instruction::NotEquals => "NotEquals".to_string(),
        Instruction::StringEquals => "StringEquals".to_string(),
        Instruction::StringNotEquals => "StringNotEquals".to_string(),
        Instruction::BitwiseAnd => "BitwiseAnd".to_string(),
        Instruction::BitwiseOr => "BitwiseOr".to_string(),
        Instruction::Multiply => "Multiply".to_string(),
        Instruction::Divide => "Divide".to_string(),
        Instruction::Pop => "Pop".to_string(),
        Instruction::Jump(off) => format!("Jump {off:+}"),
        Instruction::JumpTrue(off) => format!("JumpTrue {off:+}"),
        Instruction::JumpFalse(off) => format!("JumpFalse {off:+}"),
        Instruction::NOP => "NOP".to_string(),
        Instruction::RegisterFunction(idx) => format!("RegisterFunction #{idx}"),
        Instruction::Subreference { name, index_count } => format!("Subreference {}[{index_count}]", resolve(*name)),
        Instruction::Return => "Return".to_string(),
        Instruction::Break => "Break".to_string(),
        Instruction::Continue => "Continue".to_string(),
        Instruction::AccessArray { base, index_count, is_global } => {
            format!("AccessArray {}[{index_count}] global={is_global}", resolve(*base))
        }
        Instruction::CallBoundFunction { name, argc } => format!("CallBoundFunction .{}({argc})", resolve(*name)),
        Instruction::PushObjectInstantiation => "PushObjectInstantiation".to_string(),
        Instruction::PushObjectField { index_count } => format!("PushObjectField [{index_count}]"),
        Instruction::PopObjectField => "PopObjectField".to_string(),
        Instruction::PopObjectInstantiation { child_count } => format!("PopObjectInstantiation ({child_count} children)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile_program;
    use crate::parser::parse;

    #[test]
    fn disassembly_lists_one_line_per_instruction_in_order() {
        let program = parse("$x = 1 + 2;").unwrap();
        let mut interner = Interner::new(false);
        let code = compile_program(&program, &mut interner).unwrap();
        let listing = disassemble(&code.top_level, &interner);
        assert_eq!(listing.lines().count(), code.top_level.len());
        assert!(listing.lines().next().unwrap().starts_with("   0:"));
    }
}
