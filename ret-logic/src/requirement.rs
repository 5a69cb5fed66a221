// crates/ret-logic/src/requirement.rs
// ============================================================================
// Module: Requirement Tree
// Description: Boolean combinator tree over an opaque predicate type.
// Purpose: Let callers build and/or/not/require-group expressions once and
//          evaluate them against any predicate-resolution function.
// Dependencies: serde
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Requirement
// ============================================================================

/// A boolean requirement tree over predicates of type `P`.
///
/// # Invariants
/// - Evaluation is short-circuiting: `And` stops at the first `false` child,
///   `Or` stops at the first `true` child.
/// - `RequireGroup { min, reqs }` is satisfied when at least `min` of `reqs`
///   evaluate to `true`; `min` may exceed `reqs.len()`, in which case the
///   group can never be satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Requirement<P> {
    /// True iff every child is true. Vacuously true for an empty list.
    And(Vec<Requirement<P>>),
    /// True iff at least one child is true. Vacuously true for an empty list,
    /// matching the "absent `any` means unconstrained" convention used by
    /// rule-engine callers.
    Or(Vec<Requirement<P>>),
    /// True iff the child is false.
    Not(Box<Requirement<P>>),
    /// True iff at least `min` of `reqs` are true.
    RequireGroup {
        /// Minimum number of satisfied children required.
        min: usize,
        /// Candidate children.
        reqs: Vec<Requirement<P>>,
    },
    /// A leaf predicate, resolved by the caller-supplied evaluator.
    Predicate(P),
}

impl<P> Requirement<P> {
    /// Evaluates the tree, calling `resolve` for each leaf predicate.
    ///
    /// Evaluation short-circuits: `resolve` is not called for predicates
    /// under an already-decided `And`/`Or` branch.
    pub fn eval<F>(&self, resolve: &mut F) -> bool
    where
        F: FnMut(&P) -> bool,
    {
        match self {
            Self::And(children) => children.iter().all(|child| child.eval(resolve)),
            Self::Or(children) => children.is_empty() || children.iter().any(|child| child.eval(resolve)),
            Self::Not(inner) => !inner.eval(resolve),
            Self::RequireGroup { min, reqs } => {
                let satisfied = reqs.iter().filter(|req| req.eval(resolve)).count();
                satisfied >= *min
            }
            Self::Predicate(predicate) => resolve(predicate),
        }
    }

    /// Builds an `And` over `children`, short for [`Requirement::And`].
    #[must_use]
    pub fn all(children: Vec<Requirement<P>>) -> Self {
        Self::And(children)
    }

    /// Builds an `Or` over `children`, short for [`Requirement::Or`].
    #[must_use]
    pub fn any(children: Vec<Requirement<P>>) -> Self {
        Self::Or(children)
    }
}

#[cfg(test)]
mod tests {
    use super::Requirement;

    #[test]
    fn and_is_vacuously_true() {
        let req: Requirement<bool> = Requirement::And(Vec::new());
        assert!(req.eval(&mut |p: &bool| *p));
    }

    #[test]
    fn or_is_vacuously_true() {
        let req: Requirement<bool> = Requirement::Or(Vec::new());
        assert!(req.eval(&mut |p: &bool| *p));
    }

    #[test]
    fn and_short_circuits() {
        let mut calls = 0;
        let req = Requirement::And(vec![
            Requirement::Predicate(false),
            Requirement::Predicate(true),
        ]);
        let result = req.eval(&mut |p: &bool| {
            calls += 1;
            *p
        });
        assert!(!result);
        assert_eq!(calls, 1);
    }

    #[test]
    fn require_group_counts_minimum() {
        let req = Requirement::RequireGroup {
            min: 2,
            reqs: vec![
                Requirement::Predicate(true),
                Requirement::Predicate(false),
                Requirement::Predicate(true),
            ],
        };
        assert!(req.eval(&mut |p: &bool| *p));
    }

    #[test]
    fn not_inverts() {
        let req = Requirement::Not(Box::new(Requirement::Predicate(true)));
        assert!(!req.eval(&mut |p: &bool| *p));
    }
}
