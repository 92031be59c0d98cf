//! Types and stack domains (spec.md §3).
//!
//! RuneScript's type system is flat: a handful of primitives plus a
//! flattened tuple for multi-value returns. Grounded loosely on the
//! teacher's `parser/ast/types.rs` `Type` enum shape, trimmed to this
//! language's much smaller surface (no generics, no user types).

use std::fmt;

/// One of the three parallel operand stacks a value can live on, per
/// spec.md §3 ("Each primitive belongs to one of three stack domains").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StackDomain {
    Int,
    String,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Int,
    Bool,
    String,
    Long,
}

impl Primitive {
    pub fn domain(self) -> StackDomain {
        match self {
            Primitive::Int | Primitive::Bool => StackDomain::Int,
            Primitive::String => StackDomain::String,
            Primitive::Long => StackDomain::Long,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Primitive::Int => "int",
            Primitive::Bool => "bool",
            Primitive::String => "string",
            Primitive::Long => "long",
        }
    }

    pub fn from_name(name: &str) -> Option<Primitive> {
        match name {
            "int" => Some(Primitive::Int),
            "bool" => Some(Primitive::Bool),
            "string" => Some(Primitive::String),
            "long" => Some(Primitive::Long),
            _ => None,
        }
    }
}

/// A RuneScript type: a single primitive, or the flattened sequence a
/// multi-value return produces (spec.md §3's "tuple type").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Primitive(Primitive),
    Tuple(Vec<Primitive>),
}

impl Type {
    pub fn unit() -> Type {
        Type::Tuple(Vec::new())
    }

    /// The primitives this type flattens into, in order. A bare primitive
    /// flattens to a single-element slice.
    pub fn flattened(&self) -> &[Primitive] {
        match self {
            Type::Primitive(p) => std::slice::from_ref(p),
            Type::Tuple(ts) => ts,
        }
    }

    pub fn from_primitives(mut prims: Vec<Primitive>) -> Type {
        if prims.len() == 1 {
            Type::Primitive(prims.pop().unwrap())
        } else {
            Type::Tuple(prims)
        }
    }

    pub fn is_unit(&self) -> bool {
        self.flattened().is_empty()
    }

    /// Count of flattened elements belonging to the given stack domain —
    /// used by codegen to compute expression-statement discard counts
    /// (spec.md §4.6).
    pub fn domain_count(&self, domain: StackDomain) -> usize {
        self.flattened().iter().filter(|p| p.domain() == domain).count()
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(p) => write!(f, "{}", p.name()),
            Type::Tuple(ts) => {
                write!(f, "(")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", t.name())?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuple_flattens_domain_counts() {
        let t = Type::Tuple(vec![Primitive::Int, Primitive::String, Primitive::Int]);
        assert_eq!(t.domain_count(StackDomain::Int), 2);
        assert_eq!(t.domain_count(StackDomain::String), 1);
        assert_eq!(t.domain_count(StackDomain::Long), 0);
    }

    #[test]
    fn single_primitive_from_vec_collapses() {
        let t = Type::from_primitives(vec![Primitive::Long]);
        assert_eq!(t, Type::Primitive(Primitive::Long));
    }
}
