//! Abstract syntax tree and visitor framework (spec.md §3/§4.2).
//!
//! Node shapes are grounded on the teacher's working (non-arena) parser
//! (`parser_impl.rs`'s `FunctionDecl`/`Statement`/`Expression` family),
//! trimmed to RuneScript's much smaller surface: no generics, traits, impls
//! or ownership annotations. Per the REDESIGN FLAGS in spec.md §9, the
//! teacher's double-dispatch `accept`/visitor pattern is replaced with a
//! plain sum-type match and a free `walk_*` function per node category,
//! giving empty default `enter`/`exit` hooks exactly as spec.md §4.2
//! describes for the default tree-walker.

use crate::error::SourceRange;
use crate::lexer::VariableSigil;
use crate::types::{Primitive, Type};

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub sigil: VariableSigil,
    pub ty: Primitive,
    pub name: String,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptDecl {
    pub trigger: String,
    pub name: String,
    pub params: Vec<Param>,
    pub return_types: Vec<Primitive>,
    pub body: Vec<Statement>,
    pub range: SourceRange,
}

impl ScriptDecl {
    pub fn return_type(&self) -> Type {
        Type::from_primitives(self.return_types.clone())
    }

    pub fn param_types(&self) -> Vec<Primitive> {
        self.params.iter().map(|p| p.ty).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub scripts: Vec<ScriptDecl>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod)
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub values: Vec<Expression>,
    pub body: Vec<Statement>,
    pub range: SourceRange,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    LiteralBool(bool, SourceRange),
    LiteralInt(i32, SourceRange),
    LiteralLong(i64, SourceRange),
    LiteralString(String, SourceRange),
    /// `<a, $b, "c">` — heterogeneous parts joined at runtime (spec.md §4.6's
    /// `JOIN_STRING`).
    StringConcat(Vec<Expression>, SourceRange),
    VariableRef(VariableSigil, String, SourceRange),
    /// `^name` — a compile-time-inlined constant.
    ConstantRef(String, SourceRange),
    /// A bare name resolved against `RuntimeConstantInfo` rather than
    /// inlined — spec.md §3 lists a `dynamic` expression kind distinct from
    /// `constant-ref`; here it stands for symbolic names the runtime
    /// resolves against loaded game data rather than a literal baked in at
    /// compile time.
    Dynamic(String, SourceRange),
    /// `~name(args)` — call to a user-defined `proc`.
    Gosub {
        name: String,
        args: Vec<Expression>,
        range: SourceRange,
    },
    /// `name(args)` — call to an engine command.
    CommandCall {
        name: String,
        args: Vec<Expression>,
        range: SourceRange,
    },
    BinaryOp {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
        range: SourceRange,
    },
}

impl Expression {
    pub fn range(&self) -> SourceRange {
        match self {
            Expression::LiteralBool(_, r)
            | Expression::LiteralInt(_, r)
            | Expression::LiteralLong(_, r)
            | Expression::LiteralString(_, r)
            | Expression::StringConcat(_, r)
            | Expression::VariableRef(_, _, r)
            | Expression::ConstantRef(_, r)
            | Expression::Dynamic(_, r)
            | Expression::Gosub { range: r, .. }
            | Expression::CommandCall { range: r, .. }
            | Expression::BinaryOp { range: r, .. } => *r,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Block(Vec<Statement>, SourceRange),
    If {
        condition: Expression,
        then_branch: Vec<Statement>,
        else_branch: Option<Vec<Statement>>,
        range: SourceRange,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
        range: SourceRange,
    },
    Switch {
        scrutinee: Expression,
        cases: Vec<SwitchCase>,
        default_case: Option<Vec<Statement>>,
        range: SourceRange,
    },
    Return(Vec<Expression>, SourceRange),
    ExpressionStatement(Expression, SourceRange),
    VariableDecl {
        sigil: VariableSigil,
        ty: Primitive,
        name: String,
        range: SourceRange,
    },
    VariableInit {
        sigil: VariableSigil,
        ty: Primitive,
        name: String,
        value: Expression,
        range: SourceRange,
    },
}

impl Statement {
    pub fn range(&self) -> SourceRange {
        match self {
            Statement::Block(_, r)
            | Statement::If { range: r, .. }
            | Statement::While { range: r, .. }
            | Statement::Switch { range: r, .. }
            | Statement::Return(_, r)
            | Statement::ExpressionStatement(_, r)
            | Statement::VariableDecl { range: r, .. }
            | Statement::VariableInit { range: r, .. } => *r,
        }
    }
}

/// Pre/post hooks per node category, dispatched through the free `walk_*`
/// functions below rather than a virtual `accept` method (REDESIGN FLAGS,
/// spec.md §9).
pub trait Visitor {
    fn enter_script(&mut self, _script: &ScriptDecl) {}
    fn exit_script(&mut self, _script: &ScriptDecl) {}
    fn enter_statement(&mut self, _stmt: &Statement) {}
    fn exit_statement(&mut self, _stmt: &Statement) {}
    fn enter_expression(&mut self, _expr: &Expression) {}
    fn exit_expression(&mut self, _expr: &Expression) {}
}

pub fn walk_program<V: Visitor>(program: &Program, visitor: &mut V) {
    for script in &program.scripts {
        walk_script(script, visitor);
    }
}

pub fn walk_script<V: Visitor>(script: &ScriptDecl, visitor: &mut V) {
    visitor.enter_script(script);
    for stmt in &script.body {
        walk_statement(stmt, visitor);
    }
    visitor.exit_script(script);
}

pub fn walk_statement<V: Visitor>(stmt: &Statement, visitor: &mut V) {
    visitor.enter_statement(stmt);
    match stmt {
        Statement::Block(stmts, _) => {
            for s in stmts {
                walk_statement(s, visitor);
            }
        }
        Statement::If {
            condition,
            then_branch,
            else_branch,
            ..
        } => {
            walk_expression(condition, visitor);
            for s in then_branch {
                walk_statement(s, visitor);
            }
            if let Some(else_branch) = else_branch {
                for s in else_branch {
                    walk_statement(s, visitor);
                }
            }
        }
        Statement::While { condition, body, .. } => {
            walk_expression(condition, visitor);
            for s in body {
                walk_statement(s, visitor);
            }
        }
        Statement::Switch {
            scrutinee,
            cases,
            default_case,
            ..
        } => {
            walk_expression(scrutinee, visitor);
            for case in cases {
                for v in &case.values {
                    walk_expression(v, visitor);
                }
                for s in &case.body {
                    walk_statement(s, visitor);
                }
            }
            // Traverse the default case body directly — NOT back into the
            // enclosing switch. spec.md §9 calls out the source's apparent
            // bug of the default case re-entering `switchStatement.accept`,
            // which would recurse infinitely; this walks `default_case`'s
            // statements instead.
            if let Some(default_case) = default_case {
                for s in default_case {
                    walk_statement(s, visitor);
                }
            }
        }
        Statement::Return(exprs, _) => {
            for e in exprs {
                walk_expression(e, visitor);
            }
        }
        Statement::ExpressionStatement(expr, _) => walk_expression(expr, visitor),
        Statement::VariableDecl { .. } => {}
        Statement::VariableInit { value, .. } => walk_expression(value, visitor),
    }
    visitor.exit_statement(stmt);
}

pub fn walk_expression<V: Visitor>(expr: &Expression, visitor: &mut V) {
    visitor.enter_expression(expr);
    match expr {
        Expression::LiteralBool(..)
        | Expression::LiteralInt(..)
        | Expression::LiteralLong(..)
        | Expression::LiteralString(..)
        | Expression::VariableRef(..)
        | Expression::ConstantRef(..)
        | Expression::Dynamic(..) => {}
        Expression::StringConcat(parts, _) => {
            for p in parts {
                walk_expression(p, visitor);
            }
        }
        Expression::Gosub { args, .. } | Expression::CommandCall { args, .. } => {
            for a in args {
                walk_expression(a, visitor);
            }
        }
        Expression::BinaryOp { lhs, rhs, .. } => {
            walk_expression(lhs, visitor);
            walk_expression(rhs, visitor);
        }
    }
    visitor.exit_expression(expr);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingVisitor {
        expressions: usize,
        statements: usize,
    }

    impl Visitor for CountingVisitor {
        fn enter_expression(&mut self, _expr: &Expression) {
            self.expressions += 1;
        }
        fn enter_statement(&mut self, _stmt: &Statement) {
            self.statements += 1;
        }
    }

    #[test]
    fn walk_visits_nested_if_in_source_order() {
        let range = SourceRange::default();
        let script = ScriptDecl {
            trigger: "proc".into(),
            name: "p".into(),
            params: vec![],
            return_types: vec![],
            body: vec![Statement::If {
                condition: Expression::BinaryOp {
                    op: BinaryOp::Lt,
                    lhs: Box::new(Expression::LiteralInt(1, range)),
                    rhs: Box::new(Expression::LiteralInt(2, range)),
                    range,
                },
                then_branch: vec![Statement::Return(vec![], range)],
                else_branch: Some(vec![Statement::Return(vec![], range)]),
                range,
            }],
            range,
        };

        let mut v = CountingVisitor {
            expressions: 0,
            statements: 0,
        };
        walk_script(&script, &mut v);
        // condition + its two literal operands = 3 expressions
        assert_eq!(v.expressions, 3);
        // if + then-return + else-return = 3 statements
        assert_eq!(v.statements, 3);
    }

    #[test]
    fn switch_default_case_does_not_recurse_into_switch_itself() {
        let range = SourceRange::default();
        let stmt = Statement::Switch {
            scrutinee: Expression::LiteralInt(1, range),
            cases: vec![],
            default_case: Some(vec![Statement::Return(vec![], range)]),
            range,
        };
        let mut v = CountingVisitor {
            expressions: 0,
            statements: 0,
        };
        walk_statement(&stmt, &mut v);
        // switch + default-return = 2; would be unbounded if it recursed.
        assert_eq!(v.statements, 2);
    }
}
