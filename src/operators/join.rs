use std::fmt::{Display, Formatter};

use crate::meta::ColumnId;
use crate::operators::scalar::expr::BinaryOp;
use crate::operators::scalar::{split_conjunction, ScalarExpr};

/// Join types.
///
/// Mark, single and NULL-aware anti joins are introduced when subqueries are rewritten into joins.
/// In those joins a join condition selects candidate rows of the right side: a right row is a candidate
/// for a left row when the condition evaluates to `TRUE`. The optional `compare` expression of
/// a mark join and of a NULL-aware anti join is then evaluated against every candidate using three-valued logic.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    /// Returns left rows that have at least one candidate.
    Semi,
    /// Returns left rows that have no candidates.
    Anti,
    /// `x NOT IN (subquery)` in a conjunctive position.
    /// Returns left rows for which `compare` is `FALSE` for every candidate.
    /// A left row is rejected when `compare` is `TRUE` or `NULL` for some candidate,
    /// so the row is returned when there are no candidates at all.
    NullAwareAnti { compare: Box<ScalarExpr> },
    /// Returns every left row extended with a boolean mark column:
    /// * `TRUE` if `compare` is `TRUE` for some candidate (or if there is a candidate and `compare` is absent).
    /// * `NULL` if `compare` is `NULL` for some candidate and is never `TRUE`.
    /// * `FALSE` otherwise.
    Mark {
        column: ColumnId,
        compare: Option<Box<ScalarExpr>>,
    },
    /// Left outer join that fails at runtime when a left row has more than one candidate.
    Single,
}

impl JoinType {
    /// Returns the columns produced by a join of this type.
    pub fn output_columns(&self, left: &[ColumnId], right: &[ColumnId]) -> Vec<ColumnId> {
        match self {
            JoinType::Inner | JoinType::Left | JoinType::Right | JoinType::Full | JoinType::Cross | JoinType::Single => {
                left.iter().chain(right.iter()).copied().collect()
            }
            JoinType::Semi | JoinType::Anti | JoinType::NullAwareAnti { .. } => left.to_vec(),
            JoinType::Mark { column, .. } => left.iter().copied().chain(std::iter::once(*column)).collect(),
        }
    }

    /// Returns `true` for inner and cross joins. Only those joins can be freely reordered.
    pub fn is_inner(&self) -> bool {
        matches!(self, JoinType::Inner | JoinType::Cross)
    }

    /// Returns `true` if every left row must be matched against every right row,
    /// so the right side can be replicated while the left side stays partitioned.
    pub fn can_broadcast_right(&self) -> bool {
        !matches!(self, JoinType::Right | JoinType::Full)
    }

    /// Returns the compare expression of a mark or NULL-aware anti join.
    pub fn compare(&self) -> Option<&ScalarExpr> {
        match self {
            JoinType::NullAwareAnti { compare } => Some(compare.as_ref()),
            JoinType::Mark { compare, .. } => compare.as_deref(),
            _ => None,
        }
    }
}

impl Display for JoinType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinType::Inner => write!(f, "Inner"),
            JoinType::Left => write!(f, "Left"),
            JoinType::Right => write!(f, "Right"),
            JoinType::Full => write!(f, "Full"),
            JoinType::Cross => write!(f, "Cross"),
            JoinType::Semi => write!(f, "Semi"),
            JoinType::Anti => write!(f, "Anti"),
            JoinType::NullAwareAnti { compare } => write!(f, "NullAwareAnti({})", compare),
            JoinType::Mark { column, compare: None } => write!(f, "Mark(col:{})", column),
            JoinType::Mark {
                column,
                compare: Some(compare),
            } => write!(f, "Mark(col:{} {})", column, compare),
            JoinType::Single => write!(f, "Single"),
        }
    }
}

/// Equality keys of a join: `left_keys[i] = right_keys[i]`.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct JoinKeys {
    pub left: Vec<ColumnId>,
    pub right: Vec<ColumnId>,
}

impl JoinKeys {
    /// Returns `true` if there are no keys.
    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Extracts equality keys from the condition of a join (and from the compare expression of a mark join or
/// of a NULL-aware anti join). Only conjuncts of the form `left_column = right_column` produce keys.
pub fn extract_join_keys(
    join_type: &JoinType,
    condition: &ScalarExpr,
    left_columns: &[ColumnId],
    right_columns: &[ColumnId],
) -> JoinKeys {
    let mut keys = JoinKeys::default();
    let conjuncts = split_conjunction(condition.clone())
        .into_iter()
        .chain(join_type.compare().into_iter().flat_map(|c| split_conjunction(c.clone())));

    for expr in conjuncts {
        if let ScalarExpr::BinaryExpr {
            lhs,
            op: BinaryOp::Eq,
            rhs,
        } = &expr
        {
            if let (ScalarExpr::Column(l), ScalarExpr::Column(r)) = (lhs.as_ref(), rhs.as_ref()) {
                let pair = if left_columns.contains(l) && right_columns.contains(r) {
                    Some((*l, *r))
                } else if left_columns.contains(r) && right_columns.contains(l) {
                    Some((*r, *l))
                } else {
                    None
                };
                if let Some((l, r)) = pair {
                    keys.left.push(l);
                    keys.right.push(r);
                }
            }
        }
    }
    keys
}
