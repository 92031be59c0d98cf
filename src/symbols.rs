//! The process-wide symbol table (spec.md §3/§4.4).
//!
//! No teacher analog exists — Windjammer type-checks one file into one Rust
//! module at a time and never needs a process-wide table of scripts shared
//! across files. Written in the general "flat `HashMap` registries with
//! `Result`-returning define/lookup" style the teacher uses throughout
//! `analyzer.rs`, scoped to the four registries spec.md §3 specifies.

use crate::lexer::VariableSigil;
use crate::types::{Primitive, Type};
use std::collections::HashMap;
use std::fmt;

/// A literal constant value, used by both `ConstantInfo` and
/// `RuntimeConstantInfo`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    String(String),
    Bool(bool),
}

impl Value {
    pub fn ty(&self) -> Primitive {
        match self {
            Value::Int(_) => Primitive::Int,
            Value::Long(_) => Primitive::Long,
            Value::String(_) => Primitive::String,
            Value::Bool(_) => Primitive::Bool,
        }
    }
}

/// Declaration of a user-defined script (spec.md §3).
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptInfo {
    pub trigger: String,
    pub name: String,
    pub params: Vec<Primitive>,
    pub return_type: Type,
}

impl ScriptInfo {
    pub fn full_name(&self) -> String {
        format!("[{},{}]", self.trigger, self.name)
    }

    /// spec.md §3: "Two ScriptInfo values have equal signatures iff trigger,
    /// name, parameter types, and return type all match."
    pub fn equal_signature(&self, other: &ScriptInfo) -> bool {
        self.trigger == other.trigger
            && self.name == other.name
            && self.params == other.params
            && self.return_type == other.return_type
    }
}

/// An engine-provided command (spec.md glossary).
#[derive(Debug, Clone, PartialEq)]
pub struct CommandInfo {
    pub name: String,
    pub opcode: u16,
    pub params: Vec<Primitive>,
    pub return_type: Type,
    /// Whether this command has an "alternative" form (operand 1 vs 0), per
    /// spec.md §4.6's gosub/command lowering rule.
    pub alternative: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstantInfo {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConstantInfo {
    pub name: String,
    pub value: Value,
}

/// Which parallel variable stack a variable lives on, per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarDomain {
    Local,
    Player,
    PlayerBit,
    ClientInt,
    ClientString,
}

impl From<VariableSigil> for VarDomain {
    fn from(sigil: VariableSigil) -> Self {
        match sigil {
            VariableSigil::Local => VarDomain::Local,
            VariableSigil::Player => VarDomain::Player,
            VariableSigil::PlayerBit => VarDomain::PlayerBit,
            VariableSigil::ClientInt => VarDomain::ClientInt,
            VariableSigil::ClientString => VarDomain::ClientString,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableInfo {
    pub domain: VarDomain,
    pub ty: Primitive,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    #[error("`{0}` is already declared")]
    AlreadyDeclared(String),
}

impl fmt::Display for ScriptInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

/// Process-wide registry of scripts, commands, constants and variables,
/// shared by every file's compilation (spec.md §4.4). No scoping stack lives
/// here — locals are owned by each script's `LocalMap` during analysis and
/// codegen.
#[derive(Debug, Default)]
pub struct SymbolTable {
    scripts: HashMap<(String, String), ScriptInfo>,
    commands: HashMap<String, CommandInfo>,
    constants: HashMap<String, ConstantInfo>,
    runtime_constants: HashMap<String, RuntimeConstantInfo>,
    variables: HashMap<(VarDomain, String), VariableInfo>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_script(&mut self, info: ScriptInfo) -> Result<(), SymbolError> {
        let key = (info.trigger.clone(), info.name.clone());
        if self.scripts.contains_key(&key) {
            return Err(SymbolError::AlreadyDeclared(info.full_name()));
        }
        self.scripts.insert(key, info);
        Ok(())
    }

    /// Idempotent from the caller's view, per spec.md §4.4, but should be
    /// paired symmetrically with a prior `define_script`.
    pub fn undefine_script(&mut self, trigger: &str, name: &str) {
        self.scripts.remove(&(trigger.to_string(), name.to_string()));
    }

    pub fn lookup_script(&self, trigger: &str, name: &str) -> Option<&ScriptInfo> {
        self.scripts.get(&(trigger.to_string(), name.to_string()))
    }

    pub fn scripts(&self) -> impl Iterator<Item = &ScriptInfo> {
        self.scripts.values()
    }

    pub fn define_command(&mut self, info: CommandInfo) -> Result<(), SymbolError> {
        if self.commands.contains_key(&info.name) {
            return Err(SymbolError::AlreadyDeclared(info.name));
        }
        self.commands.insert(info.name.clone(), info);
        Ok(())
    }

    pub fn lookup_command(&self, name: &str) -> Option<&CommandInfo> {
        self.commands.get(name)
    }

    pub fn define_constant(&mut self, info: ConstantInfo) -> Result<(), SymbolError> {
        if self.constants.contains_key(&info.name) {
            return Err(SymbolError::AlreadyDeclared(info.name));
        }
        self.constants.insert(info.name.clone(), info);
        Ok(())
    }

    pub fn lookup_constant(&self, name: &str) -> Option<&ConstantInfo> {
        self.constants.get(name)
    }

    pub fn define_runtime_constant(&mut self, info: RuntimeConstantInfo) -> Result<(), SymbolError> {
        if self.runtime_constants.contains_key(&info.name) {
            return Err(SymbolError::AlreadyDeclared(info.name));
        }
        self.runtime_constants.insert(info.name.clone(), info);
        Ok(())
    }

    pub fn lookup_runtime_constant(&self, name: &str) -> Option<&RuntimeConstantInfo> {
        self.runtime_constants.get(name)
    }

    pub fn define_variable(&mut self, info: VariableInfo) -> Result<(), SymbolError> {
        let key = (info.domain, info.name.clone());
        if self.variables.contains_key(&key) {
            return Err(SymbolError::AlreadyDeclared(info.name));
        }
        self.variables.insert(key, info);
        Ok(())
    }

    pub fn lookup_variable(&self, domain: VarDomain, name: &str) -> Option<&VariableInfo> {
        self.variables.get(&(domain, name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(name: &str) -> ScriptInfo {
        ScriptInfo {
            trigger: "proc".into(),
            name: name.into(),
            params: vec![Primitive::Int],
            return_type: Type::Primitive(Primitive::Int),
        }
    }

    #[test]
    fn define_then_redefine_fails() {
        let mut table = SymbolTable::new();
        table.define_script(script("foo")).unwrap();
        let err = table.define_script(script("foo")).unwrap_err();
        assert_eq!(err, SymbolError::AlreadyDeclared("[proc,foo]".into()));
    }

    #[test]
    fn undefine_then_redefine_succeeds() {
        let mut table = SymbolTable::new();
        table.define_script(script("foo")).unwrap();
        table.undefine_script("proc", "foo");
        assert!(table.define_script(script("foo")).is_ok());
    }

    #[test]
    fn equal_signature_ignores_unrelated_fields() {
        let a = script("foo");
        let mut b = script("foo");
        assert!(a.equal_signature(&b));
        b.return_type = Type::unit();
        assert!(!a.equal_signature(&b));
    }

    #[test]
    fn undefine_is_idempotent() {
        let mut table = SymbolTable::new();
        table.undefine_script("proc", "missing");
        table.undefine_script("proc", "missing");
    }
}
