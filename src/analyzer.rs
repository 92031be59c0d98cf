//! Semantic analysis (spec.md §4.5).
//!
//! Grounded on the teacher's `analyzer.rs` in overall shape only — a struct
//! holding analysis state that walks the tree once and accumulates
//! diagnostics rather than failing fast. The teacher's actual checks
//! (ownership/borrow/auto-clone inference) are Rust-source-specific and have
//! no counterpart here; this analyzer instead resolves names and checks
//! signatures per spec.md §4.5.

use crate::ast::{self, BinaryOp, Expression, Program, ScriptDecl, Statement, Visitor};
use crate::error::Diagnostic;
use crate::lexer::VariableSigil;
use crate::symbols::{SymbolTable, VarDomain, VariableInfo};
use crate::types::{Primitive, StackDomain, Type};

/// Per-script local/parameter scope consulted before falling back to the
/// process-wide `SymbolTable` for shared variables.
struct LocalScope {
    locals: Vec<VariableInfo>,
}

impl LocalScope {
    fn from_params(script: &ScriptDecl) -> Self {
        let locals = script
            .params
            .iter()
            .map(|p| VariableInfo {
                domain: VarDomain::from(p.sigil),
                ty: p.ty,
                name: p.name.clone(),
            })
            .collect();
        Self { locals }
    }

    fn declare(&mut self, sigil: VariableSigil, ty: Primitive, name: &str) -> Result<(), ()> {
        let domain = VarDomain::from(sigil);
        if self
            .locals
            .iter()
            .any(|v| v.domain == domain && v.name == name)
        {
            return Err(());
        }
        self.locals.push(VariableInfo {
            domain,
            ty,
            name: name.to_string(),
        });
        Ok(())
    }

    fn lookup(&self, sigil: VariableSigil, name: &str) -> Option<&VariableInfo> {
        let domain = VarDomain::from(sigil);
        self.locals.iter().find(|v| v.domain == domain && v.name == name)
    }
}

/// Walks one `Program`, resolving every name against `SymbolTable` plus the
/// current script's `LocalScope`, and records a `Diagnostic` per violation of
/// spec.md §4.5's rules rather than aborting on the first one.
pub struct Analyzer<'a> {
    symbols: &'a SymbolTable,
    diagnostics: Vec<Diagnostic>,
    scope: Option<LocalScope>,
    current_return: Type,
}

impl<'a> Analyzer<'a> {
    pub fn new(symbols: &'a SymbolTable) -> Self {
        Self {
            symbols,
            diagnostics: Vec::new(),
            scope: None,
            current_return: Type::unit(),
        }
    }

    pub fn analyze(mut self, program: &Program) -> Vec<Diagnostic> {
        for script in &program.scripts {
            self.analyze_script(script);
        }
        self.diagnostics
    }

    fn analyze_script(&mut self, script: &ScriptDecl) {
        let mut seen = std::collections::HashSet::new();
        for param in &script.params {
            if !seen.insert((param.sigil as u8, param.name.clone())) {
                self.diagnostics.push(Diagnostic::semantic(
                    format!("duplicate parameter `{}`", param.name),
                    param.range,
                ));
            }
        }
        self.current_return = script.return_type();
        self.scope = Some(LocalScope::from_params(script));
        for stmt in &script.body {
            self.check_statement(stmt);
        }
        self.check_reachability(&script.body);
        self.scope = None;
    }

    /// spec.md §4.5's unreachable-code check: any statement following a
    /// `return` in the same statement list never executes.
    fn check_reachability(&mut self, stmts: &[Statement]) {
        let mut seen_return = false;
        for stmt in stmts {
            if seen_return {
                self.diagnostics
                    .push(Diagnostic::semantic("unreachable statement", stmt.range()).warning());
                break;
            }
            if matches!(stmt, Statement::Return(..)) {
                seen_return = true;
            }
            match stmt {
                Statement::Block(body, _) => self.check_reachability(body),
                Statement::If {
                    then_branch,
                    else_branch,
                    ..
                } => {
                    self.check_reachability(then_branch);
                    if let Some(else_branch) = else_branch {
                        self.check_reachability(else_branch);
                    }
                }
                Statement::While { body, .. } => self.check_reachability(body),
                Statement::Switch {
                    cases, default_case, ..
                } => {
                    for case in cases {
                        self.check_reachability(&case.body);
                    }
                    if let Some(default_case) = default_case {
                        self.check_reachability(default_case);
                    }
                }
                _ => {}
            }
        }
    }

    fn check_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::Block(body, _) => {
                for s in body {
                    self.check_statement(s);
                }
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
                ..
            } => {
                self.check_condition(condition);
                for s in then_branch {
                    self.check_statement(s);
                }
                if let Some(else_branch) = else_branch {
                    for s in else_branch {
                        self.check_statement(s);
                    }
                }
            }
            Statement::While { condition, body, .. } => {
                self.check_condition(condition);
                for s in body {
                    self.check_statement(s);
                }
            }
            Statement::Switch {
                scrutinee,
                cases,
                default_case,
                ..
            } => {
                self.infer(scrutinee);
                for case in cases {
                    for v in &case.values {
                        self.infer(v);
                    }
                    for s in &case.body {
                        self.check_statement(s);
                    }
                }
                if let Some(default_case) = default_case {
                    for s in default_case {
                        self.check_statement(s);
                    }
                }
            }
            Statement::Return(values, range) => {
                let actual: Vec<Primitive> = values.iter().filter_map(|e| self.infer(e)).collect();
                if actual.len() == values.len() {
                    let actual_ty = Type::from_primitives(actual);
                    if actual_ty != self.current_return {
                        self.diagnostics.push(Diagnostic::semantic(
                            format!(
                                "return type mismatch: expected {}, found {actual_ty}",
                                self.current_return
                            ),
                            *range,
                        ));
                    }
                }
            }
            Statement::ExpressionStatement(expr, _) => {
                self.infer(expr);
            }
            Statement::VariableDecl { sigil, ty, name, range } => {
                if let Some(scope) = &mut self.scope {
                    if scope.declare(*sigil, *ty, name).is_err() {
                        self.diagnostics
                            .push(Diagnostic::semantic(format!("`{name}` is already declared"), *range));
                    }
                }
            }
            Statement::VariableInit {
                sigil,
                ty,
                name,
                value,
                range,
            } => {
                if let Some(actual) = self.infer(value) {
                    if actual != *ty {
                        self.diagnostics.push(Diagnostic::semantic(
                            format!("cannot assign {} to `{name}` of type {}", actual.name(), ty.name()),
                            value.range(),
                        ));
                    }
                }
                if let Some(scope) = &mut self.scope {
                    if scope.declare(*sigil, *ty, name).is_err() {
                        self.diagnostics
                            .push(Diagnostic::semantic(format!("`{name}` is already declared"), *range));
                    }
                }
            }
        }
    }

    fn check_condition(&mut self, cond: &Expression) {
        match self.infer(cond) {
            Some(Primitive::Bool) | None => {}
            Some(other) => self.diagnostics.push(Diagnostic::semantic(
                format!("condition must be bool, found {}", other.name()),
                cond.range(),
            )),
        }
    }

    /// Resolves and type-checks one expression, returning its primitive type
    /// on success. Multi-value gosub/command results can only appear as a
    /// bare expression statement (spec.md §4.6's discard-count rule), so a
    /// `None` here signals "not usable in operand position", not an error by
    /// itself.
    fn infer(&mut self, expr: &Expression) -> Option<Primitive> {
        match expr {
            Expression::LiteralBool(..) => Some(Primitive::Bool),
            Expression::LiteralInt(..) => Some(Primitive::Int),
            Expression::LiteralLong(..) => Some(Primitive::Long),
            Expression::LiteralString(..) => Some(Primitive::String),
            Expression::StringConcat(parts, _) => {
                for p in parts {
                    self.infer(p);
                }
                Some(Primitive::String)
            }
            Expression::VariableRef(sigil, name, range) => {
                if let Some(local) = self.scope.as_ref().and_then(|s| s.lookup(*sigil, name)) {
                    return Some(local.ty);
                }
                if let Some(shared) = self.symbols.lookup_variable(VarDomain::from(*sigil), name) {
                    return Some(shared.ty);
                }
                self.diagnostics
                    .push(Diagnostic::semantic(format!("undeclared variable `{name}`"), *range));
                None
            }
            Expression::ConstantRef(name, range) => match self.symbols.lookup_constant(name) {
                Some(c) => Some(c.value.ty()),
                None => {
                    self.diagnostics
                        .push(Diagnostic::semantic(format!("undeclared constant `^{name}`"), *range));
                    None
                }
            },
            Expression::Dynamic(name, range) => match self.symbols.lookup_runtime_constant(name) {
                Some(c) => Some(c.value.ty()),
                None => {
                    self.diagnostics
                        .push(Diagnostic::semantic(format!("undeclared symbol `{name}`"), *range));
                    None
                }
            },
            Expression::Gosub { name, args, range } => {
                let arg_types: Vec<Option<Primitive>> = args.iter().map(|a| self.infer(a)).collect();
                match self.symbols.lookup_script("proc", name) {
                    Some(info) => {
                        self.check_arity(&info.params, &arg_types, *range, name);
                        info.return_type.flattened().first().copied()
                    }
                    None => {
                        self.diagnostics
                            .push(Diagnostic::semantic(format!("undeclared proc `{name}`"), *range));
                        None
                    }
                }
            }
            Expression::CommandCall { name, args, range } => {
                let arg_types: Vec<Option<Primitive>> = args.iter().map(|a| self.infer(a)).collect();
                match self.symbols.lookup_command(name) {
                    Some(info) => {
                        self.check_arity(&info.params, &arg_types, *range, name);
                        info.return_type.flattened().first().copied()
                    }
                    None => {
                        self.diagnostics
                            .push(Diagnostic::semantic(format!("undeclared command `{name}`"), *range));
                        None
                    }
                }
            }
            Expression::BinaryOp { op, lhs, rhs, range } => self.check_binary(*op, lhs, rhs, *range),
        }
    }

    /// Checks both arity and, for each argument resolvable to a type,
    /// whether it matches the corresponding declared parameter type
    /// (spec.md §4.5's call-site validation: "arity and types").
    fn check_arity(
        &mut self,
        params: &[Primitive],
        arg_types: &[Option<Primitive>],
        range: crate::error::SourceRange,
        name: &str,
    ) {
        if params.len() != arg_types.len() {
            self.diagnostics.push(Diagnostic::semantic(
                format!("`{name}` expects {} argument(s), found {}", params.len(), arg_types.len()),
                range,
            ));
            return;
        }
        for (index, (param, arg)) in params.iter().zip(arg_types.iter()).enumerate() {
            if let Some(arg) = arg {
                if arg != param {
                    self.diagnostics.push(Diagnostic::semantic(
                        format!(
                            "`{name}` argument {} expects {}, found {}",
                            index + 1,
                            param.name(),
                            arg.name()
                        ),
                        range,
                    ));
                }
            }
        }
    }

    fn check_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expression,
        rhs: &Expression,
        range: crate::error::SourceRange,
    ) -> Option<Primitive> {
        let lt = self.infer(lhs);
        let rt = self.infer(rhs);
        let (lt, rt) = (lt?, rt?);

        if op.is_arithmetic() {
            if lt != Primitive::Int || rt != Primitive::Int {
                self.diagnostics.push(Diagnostic::semantic(
                    "arithmetic requires int operands",
                    range,
                ));
                return None;
            }
            return Some(Primitive::Int);
        }

        if op.is_comparison() {
            if lt.domain() != rt.domain() || lt.domain() == StackDomain::String {
                self.diagnostics.push(Diagnostic::semantic(
                    format!("cannot compare {} with {}", lt.name(), rt.name()),
                    range,
                ));
                return None;
            }
            return Some(Primitive::Bool);
        }

        None
    }
}

/// Records a `(caller, callee)` edge per gosub target and command referenced
/// while walking one script's body — consumed by
/// `depgraph::DependencyTreeBuilder` (spec.md §4.7). Commands are keyed by
/// their bare name rather than bracket-qualified, since script keys always
/// use the `[trigger,name]` form and the two namespaces never collide.
pub struct CallCollector {
    pub calls: Vec<String>,
}

impl CallCollector {
    pub fn new() -> Self {
        Self { calls: Vec::new() }
    }
}

impl Default for CallCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Visitor for CallCollector {
    fn enter_expression(&mut self, expr: &Expression) {
        match expr {
            Expression::Gosub { name, .. } => self.calls.push(format!("[proc,{name}]")),
            Expression::CommandCall { name, .. } => self.calls.push(name.clone()),
            _ => {}
        }
    }
}

pub fn collect_calls(script: &ScriptDecl) -> Vec<String> {
    let mut collector = CallCollector::new();
    ast::walk_script(script, &mut collector);
    collector.calls
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{LexicalTable, Lexer};
    use crate::parser::Parser;
    use crate::symbols::ScriptInfo;

    fn analyze(src: &str, symbols: &SymbolTable) -> Vec<Diagnostic> {
        let table = LexicalTable::runescript();
        let (tokens, diags) = Lexer::new(src, &table).tokenize();
        assert!(diags.is_empty());
        let mut parser = Parser::new(tokens);
        let program = parser.parse_program();
        assert!(parser.diagnostics.is_empty(), "{:?}", parser.diagnostics);
        Analyzer::new(symbols).analyze(&program)
    }

    #[test]
    fn undeclared_variable_is_reported() {
        let symbols = SymbolTable::new();
        let diags = analyze("[proc,p]() { return($missing); }", &symbols);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("undeclared variable"));
    }

    #[test]
    fn param_is_in_scope() {
        let symbols = SymbolTable::new();
        let diags = analyze("[proc,p](int $x)(int) { return($x); }", &symbols);
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn gosub_arity_mismatch_is_reported() {
        let mut symbols = SymbolTable::new();
        symbols
            .define_script(ScriptInfo {
                trigger: "proc".into(),
                name: "callee".into(),
                params: vec![Primitive::Int],
                return_type: Type::unit(),
            })
            .unwrap();
        let diags = analyze("[proc,p]() { ~callee(); }", &symbols);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("expects 1 argument"));
    }

    #[test]
    fn return_type_mismatch_is_reported() {
        let symbols = SymbolTable::new();
        let diags = analyze(r#"[proc,p]()(int) { return("oops"); }"#, &symbols);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("return type mismatch"));
    }

    #[test]
    fn unreachable_statement_after_return_is_a_warning() {
        let symbols = SymbolTable::new();
        let diags = analyze("[proc,p]() { return; return; }", &symbols);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].level, crate::error::ErrorLevel::Warning);
    }

    #[test]
    fn collect_calls_finds_gosub_targets() {
        let table = LexicalTable::runescript();
        let (tokens, _) = Lexer::new("[proc,p]() { ~a(); ~b(); }", &table).tokenize();
        let mut parser = Parser::new(tokens);
        let program = parser.parse_program();
        let calls = collect_calls(&program.scripts[0]);
        assert_eq!(calls, vec!["[proc,a]".to_string(), "[proc,b]".to_string()]);
    }

    #[test]
    fn collect_calls_finds_command_targets_too() {
        let table = LexicalTable::runescript();
        let (tokens, _) = Lexer::new("[proc,p]() { ~a(); lookup(); }", &table).tokenize();
        let mut parser = Parser::new(tokens);
        let program = parser.parse_program();
        let calls = collect_calls(&program.scripts[0]);
        assert_eq!(calls, vec!["[proc,a]".to_string(), "lookup".to_string()]);
    }

    #[test]
    fn gosub_argument_type_mismatch_is_reported() {
        let mut symbols = SymbolTable::new();
        symbols
            .define_script(ScriptInfo {
                trigger: "proc".into(),
                name: "callee".into(),
                params: vec![Primitive::Int],
                return_type: Type::unit(),
            })
            .unwrap();
        let diags = analyze(r#"[proc,p]() { ~callee("oops"); }"#, &symbols);
        assert!(
            diags.iter().any(|d| d.message.contains("argument 1 expects int, found string")),
            "{diags:?}"
        );
    }

    #[test]
    fn command_argument_type_mismatch_is_reported() {
        let mut symbols = SymbolTable::new();
        symbols
            .define_command(crate::symbols::CommandInfo {
                name: "lookup".into(),
                opcode: 500,
                params: vec![Primitive::Int],
                return_type: Type::unit(),
                alternative: false,
            })
            .unwrap();
        let diags = analyze(r#"[proc,p]() { lookup("oops"); }"#, &symbols);
        assert!(
            diags.iter().any(|d| d.message.contains("argument 1 expects int, found string")),
            "{diags:?}"
        );
    }
}
