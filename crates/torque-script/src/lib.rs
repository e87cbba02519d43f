mod ast;
mod bytecode;
mod disasm;
mod error;
mod function;
mod intern;
mod interpreter;
mod object;
mod parser;
mod platform;
mod registry;
mod value;
mod vm;

pub use crate::{
    bytecode::{CodeBlock, Instruction, InstructionSequence},
    disasm::disassemble,
    error::{BytecodeError, CompileError, ParseError, ParseMessage, TorqueError},
    function::{Function, NativeCallback, NativeFunction, ScriptFunction},
    intern::{Interner, StringId},
    interpreter::{Interpreter, InterpreterConfig, NativeFn},
    object::{ClassInitFn, ConsoleObject, GenericObject, ObjectId, ObjectRegistry},
    platform::{CollectingPlatformContext, FileHandle, FileMode, NullPlatformContext, PlatformContext, StdFileHandle},
    value::{PrimitiveKind, RefTarget, Value},
    vm::ExecState,
};
