//! Bytecode model: opcodes, instructions, blocks and scripts (spec.md §4.6).
//!
//! `CoreOpcode` is the abstract instruction set spec.md §4.6 names; a
//! concrete `Opcode` plus an `InstructionMap` remap it onto whatever integer
//! opcode numbering a target VM actually uses, so codegen never hardcodes a
//! numbering. `Instruction`'s operand is a tagged enum rather than an `Any`,
//! per the REDESIGN FLAGS in spec.md §9.

use crate::lexer::VariableSigil;
use crate::symbols::{ScriptInfo, VariableInfo};
use crate::types::StackDomain;
use std::collections::HashMap;

/// The abstract operation set codegen emits against, independent of how a
/// target VM numbers its opcodes. The `PushVar`/`PopVar` pair only covers
/// script-local variables, partitioned by stack domain; the four shared
/// variable domains (PLAYER, PLAYER_BIT, CLIENT_INT, CLIENT_STRING) each get
/// their own fixed opcode pair per spec.md §4.6's push/pop table, since they
/// aren't partitioned by stack domain the way locals are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreOpcode {
    PushIntConstant,
    PushStringConstant,
    PushLongConstant,
    PushLocalVar(StackDomain),
    PopLocalVar(StackDomain),
    PopDiscard(StackDomain),
    PushVarp,
    PopVarp,
    PushVarpBit,
    PopVarpBit,
    PushVarcInt,
    PopVarcInt,
    PushVarcString,
    PopVarcString,
    BranchEq,
    BranchNe,
    BranchLt,
    BranchLe,
    BranchGt,
    BranchGe,
    BranchIfTrue,
    Branch,
    GosubWithParams,
    JoinString,
    Return,
    /// A call to an engine command, keyed by its concrete opcode number
    /// rather than a `CoreOpcode` — commands don't share one fixed slot.
    Command(u16),
}

/// A concrete numeric opcode after remapping — what actually gets written to
/// a bytecode stream. Kept distinct from `CoreOpcode` so a target's numbering
/// can differ without touching codegen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode(pub u16);

/// Maps abstract `CoreOpcode`s onto a target's concrete numbering. Lookup of
/// an opcode with no registered mapping is a codegen-invariant violation
/// (spec.md §4.6, §7) — it means the generator tried to emit something the
/// target VM has no slot for.
#[derive(Debug, Clone, Default)]
pub struct InstructionMap {
    table: HashMap<CoreOpcode, Opcode>,
}

impl InstructionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, core: CoreOpcode, concrete: Opcode) {
        self.table.insert(core, concrete);
    }

    pub fn resolve(&self, core: CoreOpcode) -> Option<Opcode> {
        if let CoreOpcode::Command(id) = core {
            return Some(Opcode(id));
        }
        self.table.get(&core).copied()
    }

    /// A plausible default mapping for the named RuneScript opcode table —
    /// numbers chosen to be internally consistent, not to match any specific
    /// external VM revision.
    pub fn runescript_default() -> Self {
        let mut map = Self::new();
        let entries = [
            (CoreOpcode::PushIntConstant, 0),
            (CoreOpcode::PushStringConstant, 1),
            (CoreOpcode::PushLongConstant, 2),
            (CoreOpcode::PushLocalVar(StackDomain::Int), 3),
            (CoreOpcode::PushLocalVar(StackDomain::String), 4),
            (CoreOpcode::PushLocalVar(StackDomain::Long), 5),
            (CoreOpcode::PopLocalVar(StackDomain::Int), 6),
            (CoreOpcode::PopLocalVar(StackDomain::String), 7),
            (CoreOpcode::PopLocalVar(StackDomain::Long), 8),
            (CoreOpcode::PopDiscard(StackDomain::Int), 9),
            (CoreOpcode::PopDiscard(StackDomain::String), 10),
            (CoreOpcode::PopDiscard(StackDomain::Long), 11),
            (CoreOpcode::PushVarp, 12),
            (CoreOpcode::PopVarp, 13),
            (CoreOpcode::PushVarpBit, 14),
            (CoreOpcode::PopVarpBit, 15),
            (CoreOpcode::PushVarcInt, 16),
            (CoreOpcode::PopVarcInt, 17),
            (CoreOpcode::PushVarcString, 18),
            (CoreOpcode::PopVarcString, 19),
            (CoreOpcode::BranchEq, 20),
            (CoreOpcode::BranchNe, 21),
            (CoreOpcode::BranchLt, 22),
            (CoreOpcode::BranchLe, 23),
            (CoreOpcode::BranchGt, 24),
            (CoreOpcode::BranchGe, 25),
            (CoreOpcode::BranchIfTrue, 26),
            (CoreOpcode::Branch, 27),
            (CoreOpcode::GosubWithParams, 28),
            (CoreOpcode::JoinString, 29),
            (CoreOpcode::Return, 30),
        ];
        for (core, n) in entries {
            map.register(core, Opcode(n));
        }
        map
    }
}

/// A local variable slot, scoped per stack domain within one script
/// (spec.md §4.6's "locals are partitioned per stack domain").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocalSlot {
    pub domain: StackDomain,
    pub index: u16,
}

/// Per-script allocation of parameters and locals to slots, partitioned by
/// stack domain so `$i` and `%i` never collide even if both are index 0.
#[derive(Debug, Clone, Default)]
pub struct LocalMap {
    next: HashMap<StackDomain, u16>,
    slots: HashMap<(VariableSigil, String), LocalSlot>,
}

impl LocalMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot_for(&mut self, sigil: VariableSigil, name: &str, domain: StackDomain) -> LocalSlot {
        let key = (sigil, name.to_string());
        if let Some(slot) = self.slots.get(&key) {
            return *slot;
        }
        let index = *self.next.entry(domain).or_insert(0);
        self.next.insert(domain, index + 1);
        let slot = LocalSlot { domain, index };
        self.slots.insert(key, slot);
        slot
    }

    pub fn lookup(&self, sigil: VariableSigil, name: &str) -> Option<LocalSlot> {
        self.slots.get(&(sigil, name.to_string())).copied()
    }
}

/// A branch target. Labels are resolved to block offsets at the very end of
/// codegen, once every block in a script has a final position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(pub u32);

/// One instruction's operand. A tagged enum rather than `Box<dyn Any>| per
/// the REDESIGN FLAGS in spec.md §9 — every operand kind codegen ever emits
/// is enumerable ahead of time.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    None,
    Int(i32),
    Long(i64),
    String(String),
    Local(LocalSlot),
    Label(Label),
    Script(ScriptInfo),
    /// A shared (non-local) variable reference — PLAYER, PLAYER_BIT,
    /// CLIENT_INT or CLIENT_STRING, per spec.md §3's operand-kind list.
    Variable(VariableInfo),
    /// Operand count for `JOIN_STRING(n)` and argument-count bookkeeping.
    Count(u16),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operand: Operand,
}

impl Instruction {
    pub fn new(opcode: Opcode, operand: Operand) -> Self {
        Self { opcode, operand }
    }
}

/// One straight-line sequence of instructions. Blocks never branch midway —
/// only the final instruction of a block may be a branch, matching the
/// generator's "open a new block after every branch target" discipline.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub label: Option<Label>,
    pub instructions: Vec<Instruction>,
}

/// The compiled form of one `ScriptDecl`: an ordered sequence of blocks plus
/// the local-slot allocation codegen produced while lowering it.
#[derive(Debug, Clone)]
pub struct Script {
    pub info: ScriptInfo,
    pub blocks: Vec<Block>,
    pub locals: LocalMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_opcodes_bypass_the_table() {
        let map = InstructionMap::new();
        assert_eq!(map.resolve(CoreOpcode::Command(4000)), Some(Opcode(4000)));
    }

    #[test]
    fn unregistered_core_opcode_fails_to_resolve() {
        let map = InstructionMap::new();
        assert_eq!(map.resolve(CoreOpcode::Return), None);
    }

    #[test]
    fn local_map_partitions_by_domain_and_reuses_slots() {
        let mut locals = LocalMap::new();
        let a = locals.slot_for(VariableSigil::Local, "x", StackDomain::Int);
        let b = locals.slot_for(VariableSigil::Player, "x", StackDomain::Int);
        let a_again = locals.slot_for(VariableSigil::Local, "x", StackDomain::Int);
        assert_eq!(a, a_again);
        assert_ne!(a, b);
        assert_eq!(a.index, 0);
        assert_eq!(b.index, 1);
    }
}
