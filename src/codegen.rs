//! Bytecode generation (spec.md §4.6).
//!
//! Grounded on the general "one emitted unit per declaration, a context
//! stack of active blocks, dispatch per expression/statement kind" shape the
//! teacher's code generator used for lowering function bodies, retargeted
//! here from Rust source text onto `bytecode::Block`/`Instruction`/`Label`.
//! `if`/`while` fuse a comparison directly into its branch opcode instead of
//! materializing a boolean and testing it (the "comparison-opcode-as-branch"
//! optimization), matching how stack-machine script VMs of this shape
//! actually encode conditionals.

use crate::ast::{BinaryOp, Expression, ScriptDecl, Statement};
use crate::bytecode::{Block, CoreOpcode, Instruction, InstructionMap, Label, LocalMap, Operand, Script};
use crate::error::CompilerError;
use crate::lexer::VariableSigil;
use crate::symbols::SymbolTable;
use crate::types::{Primitive, StackDomain, Type};

pub struct BytecodeGenerator<'a> {
    symbols: &'a SymbolTable,
    map: InstructionMap,
    blocks: Vec<Block>,
    current: Block,
    next_label: u32,
    locals: LocalMap,
}

impl<'a> BytecodeGenerator<'a> {
    pub fn new(symbols: &'a SymbolTable) -> Self {
        Self {
            symbols,
            map: InstructionMap::runescript_default(),
            blocks: Vec::new(),
            current: Block::default(),
            next_label: 0,
            locals: LocalMap::new(),
        }
    }

    pub fn generate(mut self, script: &ScriptDecl) -> Result<Script, CompilerError> {
        for param in &script.params {
            self.locals.slot_for(param.sigil, &param.name, param.ty.domain());
        }
        for stmt in &script.body {
            self.lower_statement(stmt)?;
        }
        self.finish_block(None);

        let info = crate::symbols::ScriptInfo {
            trigger: script.trigger.clone(),
            name: script.name.clone(),
            params: script.param_types(),
            return_type: script.return_type(),
        };
        Ok(Script {
            info,
            blocks: self.blocks,
            locals: self.locals,
        })
    }

    fn new_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        label
    }

    fn emit(&mut self, opcode: CoreOpcode, operand: Operand) -> Result<(), CompilerError> {
        let resolved = self
            .map
            .resolve(opcode)
            .ok_or_else(|| CompilerError::CodegenInvariant(format!("unmapped opcode {opcode:?}")))?;
        self.current.instructions.push(Instruction::new(resolved, operand));
        Ok(())
    }

    /// Closes the current block (appending it even if empty, so every label
    /// lands on a real block) and opens a new one carrying `label`.
    fn finish_block(&mut self, next_label: Option<Label>) {
        let finished = std::mem::take(&mut self.current);
        self.blocks.push(finished);
        self.current.label = next_label;
    }

    fn lower_statement(&mut self, stmt: &Statement) -> Result<(), CompilerError> {
        match stmt {
            Statement::Block(body, _) => {
                for s in body {
                    self.lower_statement(s)?;
                }
                Ok(())
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => self.lower_if(condition, then_branch, else_branch.as_deref()),
            Statement::While { condition, body, .. } => self.lower_while(condition, body),
            Statement::Switch {
                scrutinee,
                cases,
                default_case,
                ..
            } => self.lower_switch(scrutinee, cases, default_case.as_deref()),
            Statement::Return(values, _) => {
                for v in values {
                    self.lower_expression(v)?;
                }
                self.emit(CoreOpcode::Return, Operand::None)
            }
            Statement::ExpressionStatement(expr, _) => self.lower_expression_statement(expr),
            Statement::VariableDecl { sigil, ty, name, .. } => {
                // Only `$`-sigil declarations allocate a local slot. Shared
                // variables (`%`/`&`/`@`/`#`) are registered externally
                // (spec.md §3) and never declared from inside a script.
                if *sigil == VariableSigil::Local {
                    self.locals.slot_for(*sigil, name, ty.domain());
                }
                Ok(())
            }
            Statement::VariableInit {
                sigil, ty, name, value, range,
            } => {
                self.lower_expression(value)?;
                self.pop_variable(*sigil, name, ty.domain(), *range)
            }
        }
    }

    /// Lowers `if (cond) { then } [else { else }]` into `if_true`/`if_else`/
    /// `if_end` blocks: the condition branches straight into `if_true` when
    /// it holds and falls through to an unconditional branch into `if_else`
    /// (or `if_end` when there is no else) otherwise.
    fn lower_if(
        &mut self,
        condition: &Expression,
        then_branch: &[Statement],
        else_branch: Option<&[Statement]>,
    ) -> Result<(), CompilerError> {
        let if_true = self.new_label();
        let if_end = self.new_label();
        let if_else = if else_branch.is_some() { self.new_label() } else { if_end };

        self.lower_branch_on(condition, if_true)?;
        self.emit(CoreOpcode::Branch, Operand::Label(if_else))?;
        self.finish_block(Some(if_true));

        for s in then_branch {
            self.lower_statement(s)?;
        }
        self.emit(CoreOpcode::Branch, Operand::Label(if_end))?;

        if let Some(else_branch) = else_branch {
            self.finish_block(Some(if_else));
            for s in else_branch {
                self.lower_statement(s)?;
            }
            self.emit(CoreOpcode::Branch, Operand::Label(if_end))?;
        }

        self.finish_block(Some(if_end));
        Ok(())
    }

    fn lower_while(&mut self, condition: &Expression, body: &[Statement]) -> Result<(), CompilerError> {
        let while_cond = self.new_label();
        let while_body = self.new_label();
        let while_end = self.new_label();

        self.emit(CoreOpcode::Branch, Operand::Label(while_cond))?;
        self.finish_block(Some(while_cond));
        self.lower_branch_on(condition, while_body)?;
        self.emit(CoreOpcode::Branch, Operand::Label(while_end))?;

        self.finish_block(Some(while_body));
        for s in body {
            self.lower_statement(s)?;
        }
        self.emit(CoreOpcode::Branch, Operand::Label(while_cond))?;

        self.finish_block(Some(while_end));
        Ok(())
    }

    /// Compares `scrutinee` against each case's values in source order, with
    /// an unmatched value falling through to the default case (or the switch
    /// end, if there is none).
    fn lower_switch(
        &mut self,
        scrutinee: &Expression,
        cases: &[crate::ast::SwitchCase],
        default_case: Option<&[Statement]>,
    ) -> Result<(), CompilerError> {
        let domain = self.infer_domain(scrutinee);
        let scrutinee_slot = self.locals.slot_for(VariableSigil::Local, "__switch_scrutinee", domain);
        self.lower_expression(scrutinee)?;
        self.emit(CoreOpcode::PopLocalVar(domain), Operand::Local(scrutinee_slot))?;

        let switch_end = self.new_label();
        let default_label = if default_case.is_some() { self.new_label() } else { switch_end };
        let mut case_labels = Vec::new();
        for case in cases {
            case_labels.push((self.new_label(), case));
        }

        for (label, case) in &case_labels {
            for value in &case.values {
                self.emit(CoreOpcode::PushLocalVar(domain), Operand::Local(scrutinee_slot))?;
                self.lower_expression(value)?;
                self.emit(CoreOpcode::BranchEq, Operand::Label(*label))?;
            }
        }
        self.emit(CoreOpcode::Branch, Operand::Label(default_label))?;

        for (label, case) in &case_labels {
            self.finish_block(Some(*label));
            for s in &case.body {
                self.lower_statement(s)?;
            }
            self.emit(CoreOpcode::Branch, Operand::Label(switch_end))?;
        }

        if let Some(default_case) = default_case {
            self.finish_block(Some(default_label));
            for s in default_case {
                self.lower_statement(s)?;
            }
            self.emit(CoreOpcode::Branch, Operand::Label(switch_end))?;
        }

        self.finish_block(Some(switch_end));
        Ok(())
    }

    /// Emits `condition`'s evaluation such that control transfers to
    /// `target` exactly when it holds. A top-level comparison fuses directly
    /// into its branch opcode; anything else pushes a bool and uses
    /// `BRANCH_IF_TRUE`.
    fn lower_branch_on(&mut self, condition: &Expression, target: Label) -> Result<(), CompilerError> {
        if let Expression::BinaryOp { op, lhs, rhs, .. } = condition {
            if op.is_comparison() {
                self.lower_expression(lhs)?;
                self.lower_expression(rhs)?;
                return self.emit(comparison_opcode(*op), Operand::Label(target));
            }
        }
        self.lower_expression(condition)?;
        self.emit(CoreOpcode::BranchIfTrue, Operand::Label(target))
    }

    fn lower_expression_statement(&mut self, expr: &Expression) -> Result<(), CompilerError> {
        let result_ty = self.lower_expression(expr)?;
        for domain in [StackDomain::Int, StackDomain::String, StackDomain::Long] {
            for _ in 0..result_ty.domain_count(domain) {
                self.emit(CoreOpcode::PopDiscard(domain), Operand::None)?;
            }
        }
        Ok(())
    }

    fn infer_domain(&self, expr: &Expression) -> StackDomain {
        match self.static_type(expr) {
            Some(p) => p.domain(),
            None => StackDomain::Int,
        }
    }

    /// Best-effort primitive type of an expression for codegen's own
    /// purposes (slot domain selection); the analyzer is the source of truth
    /// for whether a program type-checks at all.
    fn static_type(&self, expr: &Expression) -> Option<Primitive> {
        match expr {
            Expression::LiteralBool(..) => Some(Primitive::Bool),
            Expression::LiteralInt(..) => Some(Primitive::Int),
            Expression::LiteralLong(..) => Some(Primitive::Long),
            Expression::LiteralString(..) | Expression::StringConcat(..) => Some(Primitive::String),
            Expression::VariableRef(sigil, name, _) => self
                .locals
                .lookup(*sigil, name)
                .map(|s| primitive_for_domain(s.domain))
                .or_else(|| {
                    self.symbols
                        .lookup_variable((*sigil).into(), name)
                        .map(|v| v.ty)
                }),
            Expression::ConstantRef(name, _) => self.symbols.lookup_constant(name).map(|c| c.value.ty()),
            Expression::Dynamic(name, _) => self.symbols.lookup_runtime_constant(name).map(|c| c.value.ty()),
            Expression::Gosub { name, .. } => self
                .symbols
                .lookup_script("proc", name)
                .and_then(|s| s.return_type.flattened().first().copied()),
            Expression::CommandCall { name, .. } => self
                .symbols
                .lookup_command(name)
                .and_then(|c| c.return_type.flattened().first().copied()),
            Expression::BinaryOp { op, .. } if op.is_comparison() => Some(Primitive::Bool),
            Expression::BinaryOp { .. } => Some(Primitive::Int),
        }
    }

    /// Lowers `expr`'s push sequence and returns its flattened return type
    /// (used by callers that need to pop/discard a multi-value result).
    fn lower_expression(&mut self, expr: &Expression) -> Result<Type, CompilerError> {
        match expr {
            Expression::LiteralBool(v, _) => {
                self.emit(CoreOpcode::PushIntConstant, Operand::Int(*v as i32))?;
                Ok(Type::Primitive(Primitive::Bool))
            }
            Expression::LiteralInt(v, _) => {
                self.emit(CoreOpcode::PushIntConstant, Operand::Int(*v))?;
                Ok(Type::Primitive(Primitive::Int))
            }
            Expression::LiteralLong(v, _) => {
                self.emit(CoreOpcode::PushLongConstant, Operand::Long(*v))?;
                Ok(Type::Primitive(Primitive::Long))
            }
            Expression::LiteralString(v, _) => {
                self.emit(CoreOpcode::PushStringConstant, Operand::String(v.clone()))?;
                Ok(Type::Primitive(Primitive::String))
            }
            Expression::StringConcat(parts, _) => {
                for p in parts {
                    self.lower_expression(p)?;
                }
                self.emit(CoreOpcode::JoinString, Operand::Count(parts.len() as u16))?;
                Ok(Type::Primitive(Primitive::String))
            }
            Expression::VariableRef(sigil, name, range) => {
                if *sigil == VariableSigil::Local {
                    let domain = self.infer_domain(expr);
                    let slot = self.locals.slot_for(*sigil, name, domain);
                    self.emit(CoreOpcode::PushLocalVar(domain), Operand::Local(slot))?;
                } else {
                    let info = self.symbols.lookup_variable((*sigil).into(), name).cloned().ok_or_else(|| {
                        CompilerError::CodegenInvariant(format!("unresolved variable {name} at {range:?}"))
                    })?;
                    self.emit(push_opcode_for_sigil(*sigil), Operand::Variable(info))?;
                }
                Ok(Type::Primitive(self.static_type(expr).unwrap_or(Primitive::Int)))
            }
            Expression::ConstantRef(name, range) => {
                let constant = self
                    .symbols
                    .lookup_constant(name)
                    .ok_or_else(|| CompilerError::CodegenInvariant(format!("unresolved constant ^{name} at {range:?}")))?;
                self.push_value(&constant.value)?;
                Ok(Type::Primitive(constant.value.ty()))
            }
            Expression::Dynamic(name, range) => {
                let constant = self.symbols.lookup_runtime_constant(name).ok_or_else(|| {
                    CompilerError::CodegenInvariant(format!("unresolved symbol {name} at {range:?}"))
                })?;
                self.push_value(&constant.value)?;
                Ok(Type::Primitive(constant.value.ty()))
            }
            Expression::Gosub { name, args, .. } => {
                for a in args {
                    self.lower_expression(a)?;
                }
                let info = self.symbols.lookup_script("proc", name).cloned();
                let operand = match info {
                    Some(info) => Operand::Script(info),
                    None => Operand::Count(args.len() as u16),
                };
                self.emit(CoreOpcode::GosubWithParams, operand)?;
                Ok(self
                    .symbols
                    .lookup_script("proc", name)
                    .map(|s| s.return_type.clone())
                    .unwrap_or_else(Type::unit))
            }
            Expression::CommandCall { name, args, .. } => {
                for a in args {
                    self.lower_expression(a)?;
                }
                let command = self.symbols.lookup_command(name).cloned();
                let opcode_id = command.as_ref().map(|c| c.opcode).unwrap_or(0);
                let alternative = command.as_ref().map(|c| c.alternative).unwrap_or(false);
                self.emit(CoreOpcode::Command(opcode_id), Operand::Int(alternative as i32))?;
                Ok(command.map(|c| c.return_type).unwrap_or_else(Type::unit))
            }
            Expression::BinaryOp { op, lhs, rhs, .. } => {
                self.lower_expression(lhs)?;
                self.lower_expression(rhs)?;
                if op.is_comparison() {
                    // Used outside branch position (e.g. `int $b = $x < $y`
                    // style expressions): no boolean-materializing opcode
                    // exists in this set, so fuse into a pair of branches
                    // around pushing 1/0. Kept simple since comparisons as
                    // plain values are rare in practice.
                    let push_true = self.new_label();
                    let done = self.new_label();
                    self.emit(comparison_opcode(*op), Operand::Label(push_true))?;
                    self.emit(CoreOpcode::PushIntConstant, Operand::Int(0))?;
                    self.emit(CoreOpcode::Branch, Operand::Label(done))?;
                    self.finish_block(Some(push_true));
                    self.emit(CoreOpcode::PushIntConstant, Operand::Int(1))?;
                    self.finish_block(Some(done));
                    Ok(Type::Primitive(Primitive::Bool))
                } else {
                    Ok(Type::Primitive(Primitive::Int))
                }
            }
        }
    }

    /// Pops the top of stack into `name`, routing through the local slot
    /// table for `$` variables and through the symbol table's externally
    /// registered shared variables for everything else (spec.md §4.6).
    fn pop_variable(
        &mut self,
        sigil: VariableSigil,
        name: &str,
        domain: StackDomain,
        range: crate::error::SourceRange,
    ) -> Result<(), CompilerError> {
        if sigil == VariableSigil::Local {
            let slot = self.locals.slot_for(sigil, name, domain);
            self.emit(CoreOpcode::PopLocalVar(domain), Operand::Local(slot))
        } else {
            let info = self
                .symbols
                .lookup_variable(sigil.into(), name)
                .cloned()
                .ok_or_else(|| CompilerError::CodegenInvariant(format!("unresolved variable {name} at {range:?}")))?;
            self.emit(pop_opcode_for_sigil(sigil), Operand::Variable(info))
        }
    }

    fn push_value(&mut self, value: &crate::symbols::Value) -> Result<(), CompilerError> {
        use crate::symbols::Value;
        match value {
            Value::Int(v) => self.emit(CoreOpcode::PushIntConstant, Operand::Int(*v)),
            Value::Long(v) => self.emit(CoreOpcode::PushLongConstant, Operand::Long(*v)),
            Value::String(v) => self.emit(CoreOpcode::PushStringConstant, Operand::String(v.clone())),
            Value::Bool(v) => self.emit(CoreOpcode::PushIntConstant, Operand::Int(*v as i32)),
        }
    }
}

fn primitive_for_domain(domain: StackDomain) -> Primitive {
    match domain {
        StackDomain::Int => Primitive::Int,
        StackDomain::String => Primitive::String,
        StackDomain::Long => Primitive::Long,
    }
}

fn push_opcode_for_sigil(sigil: VariableSigil) -> CoreOpcode {
    match sigil {
        VariableSigil::Local => unreachable!("local variables push through PushLocalVar"),
        VariableSigil::Player => CoreOpcode::PushVarp,
        VariableSigil::PlayerBit => CoreOpcode::PushVarpBit,
        VariableSigil::ClientInt => CoreOpcode::PushVarcInt,
        VariableSigil::ClientString => CoreOpcode::PushVarcString,
    }
}

fn pop_opcode_for_sigil(sigil: VariableSigil) -> CoreOpcode {
    match sigil {
        VariableSigil::Local => unreachable!("local variables pop through PopLocalVar"),
        VariableSigil::Player => CoreOpcode::PopVarp,
        VariableSigil::PlayerBit => CoreOpcode::PopVarpBit,
        VariableSigil::ClientInt => CoreOpcode::PopVarcInt,
        VariableSigil::ClientString => CoreOpcode::PopVarcString,
    }
}

fn comparison_opcode(op: BinaryOp) -> CoreOpcode {
    match op {
        BinaryOp::Eq => CoreOpcode::BranchEq,
        BinaryOp::Ne => CoreOpcode::BranchNe,
        BinaryOp::Lt => CoreOpcode::BranchLt,
        BinaryOp::Le => CoreOpcode::BranchLe,
        BinaryOp::Gt => CoreOpcode::BranchGt,
        BinaryOp::Ge => CoreOpcode::BranchGe,
        _ => unreachable!("comparison_opcode called on a non-comparison op"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{LexicalTable, Lexer};
    use crate::parser::Parser;
    use crate::symbols::{CommandInfo, SymbolTable, VarDomain, VariableInfo};

    fn generate(src: &str, symbols: &SymbolTable) -> Script {
        let table = LexicalTable::runescript();
        let (tokens, _) = Lexer::new(src, &table).tokenize();
        let mut parser = Parser::new(tokens);
        let program = parser.parse_program();
        assert!(parser.diagnostics.is_empty(), "{:?}", parser.diagnostics);
        BytecodeGenerator::new(symbols).generate(&program.scripts[0]).unwrap()
    }

    #[test]
    fn if_else_lowers_to_four_blocks() {
        let symbols = SymbolTable::new();
        let script = generate("[proc,p]() { if (1 < 2) { return; } else { return; } }", &symbols);
        assert_eq!(script.blocks.len(), 4);
        let entry = &script.blocks[0];
        let last = entry.instructions.last().unwrap();
        assert_eq!(last.opcode, crate::bytecode::InstructionMap::runescript_default().resolve(CoreOpcode::Branch).unwrap());
        let branch_lt = &entry.instructions[entry.instructions.len() - 2];
        assert_eq!(
            branch_lt.opcode,
            crate::bytecode::InstructionMap::runescript_default().resolve(CoreOpcode::BranchLt).unwrap()
        );
    }

    #[test]
    fn expression_statement_discards_multi_value_command_result() {
        let mut symbols = SymbolTable::new();
        symbols
            .define_command(CommandInfo {
                name: "lookup".into(),
                opcode: 500,
                params: vec![],
                return_type: Type::Tuple(vec![Primitive::Int, Primitive::String]),
                alternative: false,
            })
            .unwrap();
        let script = generate("[proc,p]() { lookup(); }", &symbols);
        let map = crate::bytecode::InstructionMap::runescript_default();
        let discards: Vec<_> = script.blocks[0]
            .instructions
            .iter()
            .filter(|i| {
                i.opcode == map.resolve(CoreOpcode::PopDiscard(StackDomain::Int)).unwrap()
                    || i.opcode == map.resolve(CoreOpcode::PopDiscard(StackDomain::String)).unwrap()
            })
            .collect();
        assert_eq!(discards.len(), 2);
    }

    #[test]
    fn while_loop_branches_back_to_condition() {
        let symbols = SymbolTable::new();
        let script = generate("[proc,p](int $x)() { while ($x < 5) { return; } }", &symbols);
        // cond-check block, body block, end block, plus the initial unconditional branch block
        assert_eq!(script.blocks.len(), 4);
    }

    #[test]
    fn player_variable_reads_through_varp_not_a_local_slot() {
        let mut symbols = SymbolTable::new();
        symbols
            .define_variable(VariableInfo {
                domain: VarDomain::Player,
                ty: Primitive::Int,
                name: "coins".into(),
            })
            .unwrap();
        let script = generate("[proc,p]() { lookup(%coins); }", &symbols);
        let map = crate::bytecode::InstructionMap::runescript_default();
        let varp = map.resolve(CoreOpcode::PushVarp).unwrap();
        assert!(script.blocks[0].instructions.iter().any(|i| i.opcode == varp));
        // Never routed through the local-slot table.
        assert!(script.locals.lookup(VariableSigil::Player, "coins").is_none());
    }

    #[test]
    fn client_string_variable_write_emits_varc_string_pop() {
        let mut symbols = SymbolTable::new();
        symbols
            .define_variable(VariableInfo {
                domain: VarDomain::ClientString,
                ty: Primitive::String,
                name: "title".into(),
            })
            .unwrap();
        let script = generate("[proc,p]() { string #title = \"hi\"; }", &symbols);
        let map = crate::bytecode::InstructionMap::runescript_default();
        let pop_varc_string = map.resolve(CoreOpcode::PopVarcString).unwrap();
        assert!(script.blocks[0].instructions.iter().any(|i| i.opcode == pop_varc_string));
    }

    #[test]
    fn alternative_command_emits_operand_one() {
        let mut symbols = SymbolTable::new();
        symbols
            .define_command(CommandInfo {
                name: "lookup".into(),
                opcode: 500,
                params: vec![],
                return_type: Type::unit(),
                alternative: true,
            })
            .unwrap();
        let script = generate("[proc,p]() { lookup(); }", &symbols);
        let call = script.blocks[0]
            .instructions
            .iter()
            .find(|i| i.opcode.0 == 500)
            .unwrap();
        assert_eq!(call.operand, Operand::Int(1));
    }

    #[test]
    fn non_alternative_command_emits_operand_zero() {
        let mut symbols = SymbolTable::new();
        symbols
            .define_command(CommandInfo {
                name: "lookup".into(),
                opcode: 500,
                params: vec![],
                return_type: Type::unit(),
                alternative: false,
            })
            .unwrap();
        let script = generate("[proc,p]() { lookup(); }", &symbols);
        let call = script.blocks[0]
            .instructions
            .iter()
            .find(|i| i.opcode.0 == 500)
            .unwrap();
        assert_eq!(call.operand, Operand::Int(0));
    }
}
