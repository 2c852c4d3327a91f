use crate::{store::ProofInProgress, types::*};

/// Allocator for work (dummy) variables, owned by the proof-in-progress so
/// that undo snapshots restore the allocation state along with everything
/// else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkVarPool {
    next: u32,
}

impl WorkVarPool {
    pub fn new() -> Self {
        WorkVarPool { next: 0 }
    }

    /// Allocates a fresh work variable, never reusing an index within one
    /// session.
    pub fn alloc(&mut self) -> Symbol {
        let symbol = work_var(self.next);
        self.next += 1;
        symbol
    }

    /// Number of work variables allocated so far.
    pub fn allocated(&self) -> u32 {
        self.next
    }
}

/// How a step's work variables relate to the rest of the proof.
///
/// A `Shared` assignment made during a splice is a guess: fixing the variable
/// in one step also fixes it elsewhere, so the result is only trustworthy up
/// to an UNDO. Computed on demand, never cached across a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    /// The step contains no work variables.
    None,
    /// Every work variable of the step occurs in this step only.
    Isolated,
    /// Some work variable of the step also occurs in another step.
    Shared,
}

/// Computes the isolation tag of `step` by scanning every formula column of
/// the proof.
pub fn isolation(proof: &ProofInProgress, step: usize) -> Isolation {
    let mine = step_work_vars(proof, step);
    if mine.is_empty() {
        return Isolation::None;
    }
    for other in 0..proof.len() {
        if other == step {
            continue;
        }
        let theirs = step_work_vars(proof, other);
        if mine.iter().any(|v| theirs.contains(v)) {
            return Isolation::Shared;
        }
    }
    Isolation::Isolated
}

/// Like [`isolation`], but treats a whole contiguous fragment as one unit:
/// work variables occurring only inside the range do not count as shared.
pub fn fragment_isolation(
    proof: &ProofInProgress,
    range: std::ops::RangeInclusive<usize>,
) -> Isolation {
    let mut mine = Vec::new();
    for step in range.clone() {
        for v in step_work_vars(proof, step) {
            if !mine.contains(&v) {
                mine.push(v);
            }
        }
    }
    if mine.is_empty() {
        return Isolation::None;
    }
    for other in 0..proof.len() {
        if range.contains(&other) {
            continue;
        }
        let theirs = step_work_vars(proof, other);
        if mine.iter().any(|v| theirs.contains(v)) {
            return Isolation::Shared;
        }
    }
    Isolation::Isolated
}

fn step_work_vars(proof: &ProofInProgress, step: usize) -> Vec<Symbol> {
    let mut vars = Vec::new();
    for formula in [proof.target(step), proof.source(step), proof.user(step)]
        .into_iter()
        .flatten()
    {
        for v in formula.work_vars() {
            if !vars.contains(&v) {
                vars.push(v);
            }
        }
    }
    vars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Formula;

    #[test]
    fn pool_never_reuses() {
        let mut pool = WorkVarPool::new();
        let a = pool.alloc();
        let b = pool.alloc();
        assert_ne!(a, b);
        assert!(is_work_var(a) && is_work_var(b));
        assert_eq!(pool.allocated(), 2);
    }

    #[test]
    fn isolation_tags() {
        let mut proof = ProofInProgress::new(3, 0);
        let v = proof.work_pool_mut().alloc();
        let w = proof.work_pool_mut().alloc();
        proof.set_target(0, Some(Formula::new(vec![0, v])));
        proof.set_target(1, Some(Formula::new(vec![0, v, w])));
        proof.set_target(2, Some(Formula::new(vec![0, 1])));
        assert_eq!(isolation(&proof, 0), Isolation::Shared);
        assert_eq!(isolation(&proof, 1), Isolation::Shared);
        assert_eq!(isolation(&proof, 2), Isolation::None);
        proof.set_target(0, Some(Formula::new(vec![0, 1])));
        assert_eq!(isolation(&proof, 1), Isolation::Isolated);
    }

    #[test]
    fn fragment_isolation_ignores_internal_sharing() {
        let mut proof = ProofInProgress::new(3, 0);
        let v = proof.work_pool_mut().alloc();
        proof.set_target(0, Some(Formula::new(vec![0, v])));
        proof.set_target(1, Some(Formula::new(vec![0, v])));
        proof.set_target(2, Some(Formula::new(vec![0, 1])));
        assert_eq!(fragment_isolation(&proof, 0..=1), Isolation::Isolated);
        proof.set_target(2, Some(Formula::new(vec![0, v])));
        assert_eq!(fragment_isolation(&proof, 0..=1), Isolation::Shared);
    }
}
