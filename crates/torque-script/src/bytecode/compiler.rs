//! AST → bytecode compiler.
//!
//! A single visitor pass producing an [`InstructionSequence`] per subtree,
//! aggregated by concatenation (spec.md §4.4). It carries exactly one piece
//! of mutable state across the whole pass — the current package name — plus
//! the per-function local-name table reset at each function boundary. All
//! jumps are relative offsets computed directly from already-known segment
//! lengths; there is no separate label-resolution/patching pass, unlike the
//! teacher's `CodeBuilder`/`JumpLabel` machinery (see DESIGN.md).
//!
//! Jump-offset convention: the VM advances the instruction pointer by
//! exactly the instruction's own delta (`+1` for ordinary instructions, the
//! carried offset for `Jump`/`JumpTrue`/`JumpFalse`) — there is no implicit
//! extra `+1` added on top of a jump's offset. Every offset below is derived
//! by subtracting two absolute positions computed from real segment
//! lengths, which is self-verifying: a jump always lands exactly on the
//! intended instruction regardless of how this subsequence is later
//! embedded in a larger one, since relative offsets are position-independent.

use crate::ast::*;
use crate::bytecode::instr::{Instruction, InstructionSequence};
use crate::error::CompileError;
use crate::function::ScriptFunction;
use crate::intern::Interner;

/// One compiled program: the top-level sequence plus every function
/// declared within it, in declaration order (spec.md §3 "CodeBlock").
/// `RegisterFunction(idx)` indexes into `functions`.
#[derive(Debug, Clone, Default)]
pub struct CodeBlock {
    pub top_level: InstructionSequence,
    pub functions: Vec<ScriptFunction>,
}

pub fn compile_program(program: &Program, interner: &mut Interner) -> Result<CodeBlock, CompileError> {
    let mut compiler = Compiler {
        interner,
        current_package: String::new(),
        locals: Vec::new(),
        functions: Vec::new(),
    };
    compiler.locals.push(ahash::AHashSet::default());
    let top_level = compiler.compile_stmts(program)?;
    Ok(CodeBlock {
        top_level,
        functions: compiler.functions,
    })
}

struct Compiler<'a> {
    interner: &'a mut Interner,
    current_package: String,
    /// Stack of per-function-scope known local names; only the top is live.
    /// Pushed on entering a function body, popped on leaving. Top-level
    /// statements use the bottom (module-scope) entry.
    locals: Vec<ahash::AHashSet<String>>,
    functions: Vec<ScriptFunction>,
}

impl<'a> Compiler<'a> {
    fn fold(&self, s: &str) -> String {
        self.interner.fold(s).into_owned()
    }

    fn intern(&mut self, s: &str) -> crate::intern::StringId {
        self.interner.intern(s)
    }

    fn note_local(&mut self, name: &str) {
        let folded = self.fold(name);
        self.locals.last_mut().expect("locals scope stack non-empty").insert(folded);
    }

    // ---- statements -------------------------------------------------

    fn compile_stmts(&mut self, stmts: &[Stmt]) -> Result<InstructionSequence, CompileError> {
        let mut out = Vec::new();
        for stmt in stmts {
            out.extend(self.compile_stmt(stmt)?);
        }
        Ok(out)
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<InstructionSequence, CompileError> {
        match stmt {
            Stmt::Expr(expr) => {
                let mut code = self.compile_expr(expr)?;
                code.push(Instruction::Pop);
                Ok(code)
            }
            Stmt::If { branches, else_body } => self.compile_if(branches, else_body),
            Stmt::While { cond, body } => self.compile_while(cond, body),
            Stmt::For {
                init,
                cond,
                advance,
                body,
            } => self.compile_for(init, cond, advance, body),
            Stmt::Switch { expr, cases, default } => self.compile_switch(expr, cases, default),
            Stmt::Break => Ok(vec![Instruction::Break]),
            Stmt::Continue => Ok(vec![Instruction::Continue]),
            Stmt::Return(value) => {
                let mut out = match value {
                    Some(expr) => self.compile_expr(expr)?,
                    None => vec![Instruction::PushInteger(0)],
                };
                out.push(Instruction::Return);
                Ok(out)
            }
            Stmt::FunctionDecl(decl) => self.compile_function_decl(decl),
            Stmt::PackageDecl(name, decls) => {
                let previous = std::mem::replace(&mut self.current_package, name.clone());
                let mut out = Vec::new();
                for decl in decls {
                    out.extend(self.compile_function_decl(decl)?);
                }
                self.current_package = previous;
                Ok(out)
            }
        }
    }

    fn compile_function_decl(&mut self, decl: &FunctionDecl) -> Result<InstructionSequence, CompileError> {
        self.locals.push(ahash::AHashSet::default());
        for p in &decl.params {
            self.note_local(p);
        }
        let mut body = self.compile_stmts(&decl.body)?;
        self.locals.pop();
        // Implicit `return 0` (spec.md §4.4 "Function declaration").
        body.push(Instruction::PushInteger(0));
        body.push(Instruction::Return);

        let function = ScriptFunction {
            package: self.fold(&self.current_package),
            namespace: decl.namespace.as_deref().map(|n| self.fold(n)).unwrap_or_default(),
            name: self.fold(&decl.name),
            params: decl.params.iter().map(|p| self.fold(p)).collect(),
            body,
        };
        let index = self.functions.len();
        self.functions.push(function);
        Ok(vec![Instruction::RegisterFunction(index)])
    }

    fn compile_if(
        &mut self,
        branches: &[(Expr, Vec<Stmt>)],
        else_body: &Option<Vec<Stmt>>,
    ) -> Result<InstructionSequence, CompileError> {
        let mut compiled = Vec::with_capacity(branches.len());
        for (cond, body) in branches {
            compiled.push((self.compile_expr(cond)?, self.compile_stmts(body)?));
        }
        let else_code = match else_body {
            Some(b) => self.compile_stmts(b)?,
            None => Vec::new(),
        };

        let branch_lens: Vec<usize> = compiled
            .iter()
            .map(|(cond, body)| cond.len() + 1 + body.len() + 1)
            .collect();
        let total_branches_len: usize = branch_lens.iter().sum();
        let nop_pos = total_branches_len + else_code.len();

        let mut out = Vec::new();
        let mut branch_start = 0usize;
        for (idx, (cond, body)) in compiled.into_iter().enumerate() {
            let jumpfalse_pos = branch_start + cond.len();
            let body_start = jumpfalse_pos + 1;
            let jump_pos = body_start + body.len();
            let next_start = branch_start + branch_lens[idx];

            out.extend(cond);
            out.push(Instruction::JumpFalse(next_start as isize - jumpfalse_pos as isize));
            out.extend(body);
            out.push(Instruction::Jump(nop_pos as isize - jump_pos as isize));

            branch_start = next_start;
        }
        out.extend(else_code);
        out.push(Instruction::NOP);
        Ok(out)
    }

    fn compile_while(&mut self, cond: &Expr, body: &[Stmt]) -> Result<InstructionSequence, CompileError> {
        let cond_code = self.compile_expr(cond)?;
        let mut body_code = self.compile_stmts(body)?;

        let e = cond_code.len();
        let b = body_code.len();
        let jumpfalse_pos = e;
        let body_start = e + 1;
        let backjump_pos = body_start + b;
        let nop_pos = backjump_pos + 1;

        rewrite_loop_jumps(&mut body_code, body_start, nop_pos, 0);

        let mut out = Vec::with_capacity(nop_pos + 1);
        out.extend(cond_code);
        out.push(Instruction::JumpFalse(nop_pos as isize - jumpfalse_pos as isize));
        out.extend(body_code);
        out.push(Instruction::Jump(0isize - backjump_pos as isize));
        out.push(Instruction::NOP);
        Ok(out)
    }

    fn compile_for(
        &mut self,
        init: &Expr,
        cond: &Expr,
        advance: &Expr,
        body: &[Stmt],
    ) -> Result<InstructionSequence, CompileError> {
        let init_code = self.compile_expr(init)?;
        let cond_code = self.compile_expr(cond)?;
        let advance_code = self.compile_expr(advance)?;
        let mut body_code = self.compile_stmts(body)?;

        let i = init_code.len();
        let c = cond_code.len();
        let a = advance_code.len();
        let b = body_code.len();

        let cond_start = i + 1;
        let jumpfalse_pos = cond_start + c;
        let body_start = jumpfalse_pos + 1;
        let advance_start = body_start + b;
        let pop_advance_pos = advance_start + a;
        let backjump_pos = pop_advance_pos + 1;
        let nop_pos = backjump_pos + 1;

        rewrite_loop_jumps(&mut body_code, body_start, nop_pos, advance_start);

        let mut out = Vec::with_capacity(nop_pos + 1);
        out.extend(init_code);
        out.push(Instruction::Pop);
        out.extend(cond_code);
        out.push(Instruction::JumpFalse(nop_pos as isize - jumpfalse_pos as isize));
        out.extend(body_code);
        out.extend(advance_code);
        out.push(Instruction::Pop);
        out.push(Instruction::Jump(cond_start as isize - backjump_pos as isize));
        out.push(Instruction::NOP);
        Ok(out)
    }

    fn compile_switch(
        &mut self,
        expr: &Expr,
        cases: &[(Vec<Expr>, Vec<Stmt>)],
        default: &Option<Vec<Stmt>>,
    ) -> Result<InstructionSequence, CompileError> {
        let switch_code = self.compile_expr(expr)?;
        let s_len = switch_code.len();

        let mut compiled_cases = Vec::with_capacity(cases.len());
        for (exprs, body) in cases {
            let mut compiled_exprs = Vec::with_capacity(exprs.len());
            for e in exprs {
                compiled_exprs.push(self.compile_expr(e)?);
            }
            compiled_cases.push((compiled_exprs, self.compile_stmts(body)?));
        }
        let default_code = match default {
            Some(b) => self.compile_stmts(b)?,
            None => Vec::new(),
        };

        let case_lens: Vec<usize> = compiled_cases
            .iter()
            .map(|(exprs, body)| {
                let probes_len: usize = exprs.iter().map(|e| e.len() + s_len + 2).sum();
                probes_len + body.len() + 1
            })
            .collect();
        let total_cases_len: usize = case_lens.iter().sum();
        let nop_pos = total_cases_len + default_code.len();

        let mut out = Vec::new();
        let mut case_start = 0usize;
        for (idx, (exprs, body)) in compiled_cases.into_iter().enumerate() {
            let m = exprs.len();
            let probes_len: usize = exprs.iter().map(|e| e.len() + s_len + 2).sum();
            let body_start = case_start + probes_len;
            let next_case_start = case_start + case_lens[idx];

            let mut probe_pos = case_start;
            for (k, expr_code) in exprs.into_iter().enumerate() {
                let e_len = expr_code.len();
                out.extend(expr_code);
                out.extend(switch_code.clone());
                out.push(Instruction::Equals);
                let jump_pos = probe_pos + e_len + s_len + 1;
                if k + 1 == m {
                    out.push(Instruction::JumpFalse(next_case_start as isize - jump_pos as isize));
                } else {
                    out.push(Instruction::JumpTrue(body_start as isize - jump_pos as isize));
                }
                probe_pos += e_len + s_len + 2;
            }
            out.extend(body);
            let trailing_jump_pos = next_case_start - 1;
            out.push(Instruction::Jump(nop_pos as isize - trailing_jump_pos as isize));

            case_start = next_case_start;
        }
        out.extend(default_code);
        out.push(Instruction::NOP);
        Ok(out)
    }

    // ---- expressions --------------------------------------------------

    fn compile_expr(&mut self, expr: &Expr) -> Result<InstructionSequence, CompileError> {
        match expr {
            Expr::Integer(n) => Ok(vec![Instruction::PushInteger(*n)]),
            Expr::Float(f) => Ok(vec![Instruction::PushFloat(*f)]),
            Expr::StringLit(s) => {
                // Verbatim, not `self.intern`: literal data isn't one of the
                // categories spec.md §3 folds (see `Interner::intern_verbatim`).
                // Also used by `parse_type_ref_expr` for a bare type name —
                // that case-insensitive match happens at the object registry
                // boundary instead (`ObjectRegistry::materialize`).
                let id = self.interner.intern_verbatim(s);
                Ok(vec![Instruction::PushString(id)])
            }
            Expr::TaggedStringLit(s) => {
                // ID-based form (DESIGN.md Open Question #2): same opcode as
                // a plain string literal, the interned id is what makes it
                // "tagged" (stable, reusable, comparable by id).
                let id = self.interner.intern_verbatim(s);
                Ok(vec![Instruction::PushString(id)])
            }
            Expr::Var(_) | Expr::ArrayAccess { .. } | Expr::Subreference { .. } => self.compile_read(expr),
            Expr::Binary(op, lhs, rhs) => {
                let mut out = self.compile_expr(lhs)?;
                out.extend(self.compile_expr(rhs)?);
                out.push(binop_instruction(*op));
                Ok(out)
            }
            Expr::Concat(lhs, rhs, sep) => {
                let mut out = self.compile_expr(lhs)?;
                out.extend(self.compile_expr(rhs)?);
                out.push(Instruction::Concat(*sep));
                Ok(out)
            }
            Expr::Unary(op, inner) => {
                let mut out = self.compile_expr(inner)?;
                out.push(match op {
                    UnOp::Negate => Instruction::Negate,
                    UnOp::Not => Instruction::Not,
                });
                Ok(out)
            }
            Expr::Increment(inner) => {
                let mut out = self.compile_lvalue(inner)?;
                out.push(Instruction::PushInteger(1));
                out.push(Instruction::AddAssignment);
                Ok(out)
            }
            Expr::Decrement(inner) => {
                let mut out = self.compile_lvalue(inner)?;
                out.push(Instruction::PushInteger(-1));
                out.push(Instruction::AddAssignment);
                Ok(out)
            }
            Expr::Assign(lhs, rhs) => {
                let mut out = self.compile_lvalue(lhs)?;
                out.extend(self.compile_expr(rhs)?);
                out.push(Instruction::Assignment);
                Ok(out)
            }
            Expr::AddAssign(lhs, rhs) => {
                let mut out = self.compile_lvalue(lhs)?;
                out.extend(self.compile_expr(rhs)?);
                out.push(Instruction::AddAssignment);
                Ok(out)
            }
            Expr::Ternary(cond, t, f) => self.compile_ternary(cond, t, f),
            Expr::Call { namespace, name, args } => {
                let mut out = Vec::new();
                for arg in args {
                    out.extend(self.compile_expr(arg)?);
                }
                let ns = namespace.as_ref().map(|n| self.intern(n));
                let name_id = self.intern(name);
                out.push(Instruction::CallFunction {
                    namespace: ns,
                    name: name_id,
                    argc: u8::try_from(args.len()).unwrap_or(u8::MAX),
                });
                Ok(out)
            }
            Expr::BoundCall { target, name, args } => {
                let mut out = self.compile_expr(target)?;
                for arg in args {
                    out.extend(self.compile_expr(arg)?);
                }
                let name_id = self.intern(name);
                out.push(Instruction::CallBoundFunction {
                    name: name_id,
                    argc: u8::try_from(args.len()).unwrap_or(u8::MAX),
                });
                Ok(out)
            }
            Expr::ObjectInstantiation(node) => self.compile_object_node(node),
            Expr::DatablockInstantiation(node) => self.compile_datablock_node(node),
        }
    }

    /// Compiles a variable/array/subreference expression used as an rvalue.
    /// There is no opcode distinct from pushing the `Ref` itself — the VM
    /// transparently dereferences any `Ref`/`MemoryRef` it pops as an operand
    /// (see `vm::ExecState::deref`), so reading and addressing share the same
    /// lowering.
    fn compile_read(&mut self, expr: &Expr) -> Result<InstructionSequence, CompileError> {
        self.compile_lvalue(expr)
    }

    /// Compiles an expression into code that pushes a `Ref` to its storage
    /// location (spec.md §4.4 "Assignment").
    fn compile_lvalue(&mut self, expr: &Expr) -> Result<InstructionSequence, CompileError> {
        match expr {
            Expr::Var(var_ref) => match var_ref.kind {
                VarKind::Local => {
                    self.note_local(&var_ref.name);
                    let id = self.intern(&var_ref.name);
                    Ok(vec![Instruction::PushLocalReference(id)])
                }
                VarKind::Global => {
                    let id = self.intern(&var_ref.name);
                    Ok(vec![Instruction::PushGlobalReference(id)])
                }
            },
            Expr::ArrayAccess { target, indices } => {
                let mut out = Vec::new();
                for idx in indices {
                    out.extend(self.compile_expr(idx)?);
                }
                let base = self.intern(&target.name);
                if target.kind == VarKind::Local {
                    self.note_local(&target.name);
                }
                out.push(Instruction::AccessArray {
                    base,
                    index_count: u8::try_from(indices.len()).unwrap_or(u8::MAX),
                    is_global: target.kind == VarKind::Global,
                });
                Ok(out)
            }
            Expr::Subreference { target, field, indices } => {
                let mut out = self.compile_expr(target)?;
                for idx in indices {
                    out.extend(self.compile_expr(idx)?);
                }
                let name = self.intern(field);
                out.push(Instruction::Subreference {
                    name,
                    index_count: u8::try_from(indices.len()).unwrap_or(u8::MAX),
                });
                Ok(out)
            }
            _ => Err(CompileError::UnsupportedLvalue),
        }
    }

    fn compile_ternary(&mut self, cond: &Expr, t: &Expr, f: &Expr) -> Result<InstructionSequence, CompileError> {
        let cond_code = self.compile_expr(cond)?;
        let true_code = self.compile_expr(t)?;
        let false_code = self.compile_expr(f)?;

        let e = cond_code.len();
        let true_len = true_code.len();
        let false_len = false_code.len();

        let jumpfalse_pos = e;
        let true_start = e + 1;
        let jump_pos = true_start + true_len;
        let false_start = jump_pos + 1;
        let nop_pos = false_start + false_len;

        let mut out = Vec::with_capacity(nop_pos + 1);
        out.extend(cond_code);
        out.push(Instruction::JumpFalse(false_start as isize - jumpfalse_pos as isize));
        out.extend(true_code);
        out.push(Instruction::Jump(nop_pos as isize - jump_pos as isize));
        out.extend(false_code);
        out.push(Instruction::NOP);
        Ok(out)
    }

    fn compile_object_node(&mut self, node: &ObjectNode) -> Result<InstructionSequence, CompileError> {
        let mut out = self.compile_expr(&node.type_expr)?;
        out.extend(match &node.name_expr {
            Some(e) => self.compile_expr(e)?,
            None => {
                let empty = self.intern("");
                vec![Instruction::PushString(empty)]
            }
        });
        out.push(Instruction::PushObjectInstantiation);
        for field in &node.fields {
            out.extend(self.compile_field_assign(field)?);
        }
        for child in &node.children {
            out.extend(self.compile_object_node(child)?);
        }
        out.push(Instruction::PopObjectInstantiation {
            child_count: u8::try_from(node.children.len()).unwrap_or(u8::MAX),
        });
        Ok(out)
    }

    fn compile_field_assign(&mut self, field: &FieldAssign) -> Result<InstructionSequence, CompileError> {
        let base = self.intern(&field.base_name);
        let mut out = vec![Instruction::PushString(base)];
        for idx in &field.indices {
            out.extend(self.compile_expr(idx)?);
        }
        out.extend(self.compile_expr(&field.value)?);
        out.push(Instruction::PushObjectField {
            index_count: u8::try_from(field.indices.len()).unwrap_or(u8::MAX),
        });
        Ok(out)
    }

    fn compile_datablock_node(&mut self, node: &DatablockNode) -> Result<InstructionSequence, CompileError> {
        // Verbatim, matching `compile_object_node`'s `type_expr`/`name_expr`
        // (a plain `Expr::StringLit` there already goes through
        // `intern_verbatim`): the type is matched case-insensitively at the
        // `ObjectRegistry` boundary, and the instance name is an opaque
        // `by_name` key that should round-trip exactly as written.
        let type_id = self.interner.intern_verbatim(&node.type_name);
        let name_id = self.interner.intern_verbatim(&node.name);
        let mut out = vec![Instruction::PushString(type_id), Instruction::PushString(name_id)];
        out.push(Instruction::PushObjectInstantiation);
        for field in &node.fields {
            out.extend(self.compile_field_assign(field)?);
        }
        out.push(Instruction::PopObjectInstantiation { child_count: 0 });
        Ok(out)
    }
}

fn rewrite_loop_jumps(body: &mut InstructionSequence, body_start: usize, break_target: usize, continue_target: usize) {
    for (j, instr) in body.iter_mut().enumerate() {
        let pos = body_start + j;
        match instr {
            Instruction::Break => *instr = Instruction::Jump(break_target as isize - pos as isize),
            Instruction::Continue => *instr = Instruction::Jump(continue_target as isize - pos as isize),
            _ => {}
        }
    }
}

fn binop_instruction(op: BinOp) -> Instruction {
    match op {
        BinOp::Add => Instruction::Add,
        BinOp::Minus => Instruction::Minus,
        BinOp::Multiply => Instruction::Multiply,
        BinOp::Divide => Instruction::Divide,
        BinOp::Modulus => Instruction::Modulus,
        BinOp::BitwiseOr => Instruction::BitwiseOr,
        BinOp::BitwiseAnd => Instruction::BitwiseAnd,
        BinOp::LessThan => Instruction::LessThan,
        BinOp::GreaterThan => Instruction::GreaterThan,
        BinOp::GreaterThanOrEqual => Instruction::GreaterThanOrEqual,
        BinOp::Equals => Instruction::Equals,
        BinOp::NotEquals => Instruction::NotEquals,
        BinOp::StringEquals => Instruction::StringEquals,
        BinOp::StringNotEquals => Instruction::StringNotEquals,
        BinOp::LogicalAnd => Instruction::LogicalAnd,
        BinOp::LogicalOr => Instruction::LogicalOr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn compile(src: &str) -> CodeBlock {
        let program = parse(src).unwrap();
        let mut interner = Interner::new(false);
        compile_program(&program, &mut interner).unwrap()
    }

    #[test]
    fn while_jump_false_lands_exactly_on_trailing_nop() {
        let code = compile("while (%i) { %i = %i - 1; }");
        let jumpfalse_pos = code
            .top_level
            .iter()
            .position(|i| matches!(i, Instruction::JumpFalse(_)))
            .unwrap();
        let Instruction::JumpFalse(delta) = code.top_level[jumpfalse_pos] else {
            unreachable!()
        };
        let target = (jumpfalse_pos as isize + delta) as usize;
        assert_eq!(code.top_level[target], Instruction::NOP);
        assert_eq!(target, code.top_level.len() - 1);
    }

    #[test]
    fn for_loop_jump_false_lands_exactly_on_trailing_nop() {
        let code = compile("for (%i = 0; %i < 10; %i++) { $g = $g + 5; }");
        let jumpfalse_pos = code
            .top_level
            .iter()
            .position(|i| matches!(i, Instruction::JumpFalse(_)))
            .unwrap();
        let Instruction::JumpFalse(delta) = code.top_level[jumpfalse_pos] else {
            unreachable!()
        };
        let target = (jumpfalse_pos as isize + delta) as usize;
        assert_eq!(target, code.top_level.len() - 1);
        assert_eq!(code.top_level[target], Instruction::NOP);
    }

    #[test]
    fn every_jump_offset_is_in_range() {
        let code = compile(
            "switch($x) { case 1: $r=10; case 2 or 3: $r=20; default: $r=-10; } \
             if (1) { $a = 1; } else if (0) { $a = 2; } else { $a = 3; }",
        );
        for (i, instr) in code.top_level.iter().enumerate() {
            let delta = match instr {
                Instruction::Jump(d) | Instruction::JumpTrue(d) | Instruction::JumpFalse(d) => *d,
                _ => continue,
            };
            let target = i as isize + delta;
            assert!(target >= 0 && target as usize <= code.top_level.len(), "jump at {i} out of range");
        }
    }

    #[test]
    fn function_declaration_registers_and_emits_implicit_return() {
        let code = compile("function f() { return 1; }");
        assert_eq!(code.functions.len(), 1);
        assert_eq!(code.top_level, vec![Instruction::RegisterFunction(0)]);
        assert_eq!(code.functions[0].body.last(), Some(&Instruction::Return));
    }
}
