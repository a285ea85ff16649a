//! Reconstruction of bitmask values from flag constants.
//!
//! A flags group maps single bits (and sometimes bit combinations) to names. A literal
//! holding a combination that was never mapped verbatim can still be expressed as an
//! OR of flags, or as the complement of such an OR:
//!
//! ```text
//! 12   -> BIT2 | BIT3
//! 17   -> BIT0 | 16        residual bits stay a literal
//! 0xFB -> ~BIT2            when the direct cover leaves bits and the complement
//!                          needs strictly fewer flags
//! ```
//!
//! Both covers are greedy over the flags sorted by descending population count, so
//! combined flags are preferred over their parts.

use rustc_hash::FxHashSet;

use crate::{
    expression::{BinaryOp, ConstValue, DataType, Expression, Literal, UnaryOp},
    group::ScopeTable,
};

/// One flag constant usable for a cover.
#[derive(Debug, Clone)]
struct Flag<'a> {
    bits: u64,
    expression: &'a Expression,
}

/// The flags chosen by a greedy cover and the bits none of them provide.
#[derive(Debug)]
struct Cover<'a> {
    flags: Vec<&'a Expression>,
    residual: u64,
}

/// Builds OR-combinations of flag constants.
///
/// # Examples
///
/// ```rust
/// use unpick::codegen::FlagDecomposer;
/// use unpick::expression::{ConstValue, DataType, Expression};
/// use unpick::group::{GroupStore, GroupKey, Scope};
///
/// let mut store = GroupStore::new();
/// let group = store.declare_group("mode", DataType::Int, true)?;
/// for (bit, name) in [(1, "READ"), (2, "WRITE"), (4, "EXEC")] {
///     group.insert(Scope::Global, &ConstValue::Int(bit), false,
///         Expression::static_field("p/Mode", name, Some(DataType::Int)))?;
/// }
///
/// let scopes = store.find_scopes(&GroupKey::Named("mode".into()), "p/A", "f", "()V");
/// let expr = FlagDecomposer::decompose(&scopes, &ConstValue::Int(3), DataType::Int).unwrap();
/// assert_eq!(expr.to_string(), "p.Mode.READ | p.Mode.WRITE");
/// # Ok::<(), unpick::Error>(())
/// ```
pub struct FlagDecomposer;

impl FlagDecomposer {
    /// Expresses `value` with the flags of `scopes` (most specific first), in the
    /// width of `narrow_type`.
    ///
    /// Returns `None` for non-integral values, for zero and all-ones (which only a
    /// verbatim mapping can name), and when no flag contributes to the result.
    #[must_use]
    pub fn decompose(
        scopes: &[&ScopeTable],
        value: &ConstValue,
        narrow_type: DataType,
    ) -> Option<Expression> {
        let mask = narrow_type.bit_mask()?;
        let target = value.to_bits()? & mask;
        if target == 0 || target == mask {
            return None;
        }

        let flags = collect_flags(scopes, mask);
        let direct = greedy_cover(&flags, target);
        let complement = greedy_cover(&flags, !target & mask);

        if direct.residual != 0
            && complement.residual == 0
            && !complement.flags.is_empty()
            && complement.flags.len() < direct.flags.len()
        {
            let inner = or_chain(&complement.flags)?;
            return Some(Expression::unary(UnaryOp::BitNot, inner));
        }

        let mut expression = or_chain(&direct.flags)?;
        if direct.residual != 0 {
            expression = Expression::binary(
                BinaryOp::Or,
                expression,
                residual_literal(direct.residual, narrow_type),
            );
        }
        Some(expression)
    }
}

/// Gathers the distinct flag bit patterns of all scopes, the most specific scope
/// winning for a pattern mapped in several, sorted by descending population count.
fn collect_flags<'a>(scopes: &[&'a ScopeTable], mask: u64) -> Vec<Flag<'a>> {
    let mut seen = FxHashSet::default();
    let mut flags = Vec::new();
    for table in scopes {
        let mut entries: Vec<Flag<'a>> = table
            .iter()
            .filter_map(|(value, entry)| {
                let bits = value.to_bits()? & mask;
                Some(Flag {
                    bits,
                    expression: &entry.expression,
                })
            })
            .filter(|flag| flag.bits != 0)
            .collect();
        entries.sort_by_key(|flag| flag.bits);
        for flag in entries {
            if seen.insert(flag.bits) {
                flags.push(flag);
            }
        }
    }
    flags.sort_by_key(|flag| std::cmp::Reverse(flag.bits.count_ones()));
    flags
}

/// Picks every flag that lies within `target` and adds bits not covered yet.
fn greedy_cover<'a>(flags: &[Flag<'a>], target: u64) -> Cover<'a> {
    let mut covered = 0;
    let mut chosen = Vec::new();
    for flag in flags {
        if flag.bits & !target == 0 && flag.bits & !covered != 0 {
            covered |= flag.bits;
            chosen.push(flag.expression);
        }
    }
    Cover {
        flags: chosen,
        residual: target & !covered,
    }
}

fn or_chain(flags: &[&Expression]) -> Option<Expression> {
    let (first, rest) = flags.split_first()?;
    Some(rest.iter().fold((*first).clone(), |acc, flag| {
        Expression::binary(BinaryOp::Or, acc, (*flag).clone())
    }))
}

/// The uncovered bits as an unsigned literal of the group's stack width.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn residual_literal(bits: u64, narrow_type: DataType) -> Expression {
    if narrow_type == DataType::Long {
        Expression::Literal(Literal::Long(bits as i64))
    } else {
        Expression::Literal(Literal::Integer(bits as u32 as i32))
    }
}
