//! Flat, relative-jump bytecode: the compiled form of an AST subtree.

pub mod compiler;
pub mod instr;

pub use compiler::{compile_program, CodeBlock};
pub use instr::{Instruction, InstructionSequence};
