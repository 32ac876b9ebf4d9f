// ─────────────────────────────────────────────────────────────────────
// BCDI Phase Retrieval — Operator Algebra
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! State-transforming operators and their composition.
//!
//! `sequence(a, b)` applies `b` first, then `a` (product order).
//! `repeat(a, n)` applies `a` exactly `n` times. Both always produce a
//! flat [`OperatorList`], never a tree.

use std::cell::RefCell;
use std::rc::Rc;

use bcdi_types::error::{BcdiError, BcdiResult};

use crate::state::State;

/// One operator slot in a composite. Repetition shares a single instance
/// (and its scratch buffers) between slots.
pub type SharedOperator = Rc<RefCell<dyn Operator>>;

/// In-place transformation of a reconstruction state.
pub trait Operator {
    fn name(&self) -> &'static str;

    /// Advance `state` by one application and hand the same state back.
    fn apply<'s, 'e>(&mut self, state: &'s mut State<'e>) -> BcdiResult<&'s mut State<'e>>;

    /// Flattened application-ordered steps of this operator.
    fn into_steps(self: Box<Self>) -> Vec<SharedOperator>;
}

/// Wrap a unit operator as a single shared step.
pub(crate) fn share<O: Operator + 'static>(op: O) -> Vec<SharedOperator> {
    let step: SharedOperator = Rc::new(RefCell::new(op));
    vec![step]
}

/// Ordered list of operators, applied first to last.
#[derive(Clone, Default)]
pub struct OperatorList {
    steps: Vec<SharedOperator>,
}

impl std::fmt::Debug for OperatorList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl OperatorList {
    /// Empty, no-op composite.
    pub fn new() -> Self {
        OperatorList::default()
    }

    /// Composite holding one operator.
    pub fn from_operator<O: Operator + 'static>(op: O) -> Self {
        OperatorList {
            steps: Box::new(op).into_steps(),
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step names in application order.
    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.borrow().name()).collect()
    }
}

impl Operator for OperatorList {
    fn name(&self) -> &'static str {
        "OperatorList"
    }

    fn apply<'s, 'e>(&mut self, state: &'s mut State<'e>) -> BcdiResult<&'s mut State<'e>> {
        for step in &self.steps {
            let mut op = step.try_borrow_mut().map_err(|_| {
                BcdiError::InvalidArgument("operator applied re-entrantly".to_string())
                    .in_operator("OperatorList")
            })?;
            op.apply(state)?;
        }
        Ok(state)
    }

    fn into_steps(self: Box<Self>) -> Vec<SharedOperator> {
        self.steps
    }
}

/// Product `a ∘ b`: applies `b`, then `a`.
pub fn sequence<A, B>(a: A, b: B) -> OperatorList
where
    A: Operator + 'static,
    B: Operator + 'static,
{
    let mut steps = Box::new(b).into_steps();
    steps.extend(Box::new(a).into_steps());
    OperatorList { steps }
}

/// Power `a^n`: applies `a` exactly `n` times. `n = 0` is a no-op.
pub fn repeat<A: Operator + 'static>(op: A, n: usize) -> OperatorList {
    let unit = Box::new(op).into_steps();
    let steps: Vec<SharedOperator> = (0..n).flat_map(|_| unit.iter().cloned()).collect();
    OperatorList { steps }
}
