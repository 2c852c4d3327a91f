use std::ops::RangeInclusive;

use crate::{
    db::StatementDb,
    error::EditError,
    formula::{Formula, WorkSubst},
    types::*,
    work::WorkVarPool,
};

/// One cell of the `proof` column: a statement reference or the unknown
/// sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRef {
    Unknown,
    Known(StmtId),
}

impl StepRef {
    pub fn is_unknown(&self) -> bool {
        matches!(self, StepRef::Unknown)
    }

    pub fn stmt(&self) -> Option<StmtId> {
        match self {
            StepRef::Unknown => None,
            StepRef::Known(s) => Some(*s),
        }
    }
}

/// One conceptual row of the parallel arrays. Fragments exchanged with the
/// provers are sequences of rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRow {
    pub stmt: StepRef,
    pub target: Option<Formula>,
    pub source: Option<Formula>,
    pub user: Option<Formula>,
}

impl StepRow {
    pub fn unknown(target: Option<Formula>) -> Self {
        StepRow {
            stmt: StepRef::Unknown,
            target,
            source: None,
            user: None,
        }
    }

    pub fn known(stmt: StmtId, target: Option<Formula>) -> Self {
        StepRow {
            stmt: StepRef::Known(stmt),
            target,
            source: None,
            user: None,
        }
    }
}

/// A complete subproof fragment, as returned by the provers.
pub type Subproof = Vec<StepRow>;

/// The proof under construction: four same-length parallel columns indexed by
/// step, the statement being proved, and the work-variable pool.
///
/// The flat `proof` column is an RPN encoding: a known step's statement pops
/// exactly as many preceding steps as it has mandatory hypotheses. Subproofs
/// are therefore contiguous ranges, derived on demand by
/// [`subproof_range`](Self::subproof_range) and never stored.
///
/// Store primitives assume well-formed input and never leave the columns
/// inconsistent; validation belongs to the command layer. `Clone` is the
/// deep-copy primitive used by the undo stack and by every
/// speculate-then-revert operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofInProgress {
    proof: Vec<StepRef>,
    target: Vec<Option<Formula>>,
    source: Vec<Option<Formula>>,
    user: Vec<Option<Formula>>,
    proving: StmtId,
    work: WorkVarPool,
}

impl ProofInProgress {
    /// Allocates `steps` unknown rows for a proof of `proving`. Known-step
    /// assignment and target initialization are the unifier's job.
    pub fn new(steps: usize, proving: StmtId) -> Self {
        ProofInProgress {
            proof: vec![StepRef::Unknown; steps],
            target: vec![None; steps],
            source: vec![None; steps],
            user: vec![None; steps],
            proving,
            work: WorkVarPool::new(),
        }
    }

    pub fn from_rows(rows: Vec<StepRow>, proving: StmtId) -> Self {
        let mut p = ProofInProgress::new(0, proving);
        p.splice(0..0, rows);
        p
    }

    pub fn len(&self) -> usize {
        self.proof.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proof.is_empty()
    }

    pub fn proving(&self) -> StmtId {
        self.proving
    }

    pub fn stmt(&self, step: usize) -> StepRef {
        self.proof[step]
    }

    pub fn target(&self, step: usize) -> Option<&Formula> {
        self.target[step].as_ref()
    }

    pub fn source(&self, step: usize) -> Option<&Formula> {
        self.source[step].as_ref()
    }

    pub fn user(&self, step: usize) -> Option<&Formula> {
        self.user[step].as_ref()
    }

    /// The formula this step is currently believed to prove: the user
    /// override if present, else the target.
    pub fn goal(&self, step: usize) -> Option<&Formula> {
        self.user[step].as_ref().or(self.target[step].as_ref())
    }

    pub fn set_stmt(&mut self, step: usize, stmt: StepRef) {
        self.proof[step] = stmt;
    }

    pub fn set_target(&mut self, step: usize, target: Option<Formula>) {
        self.target[step] = target;
    }

    pub fn set_source(&mut self, step: usize, source: Option<Formula>) {
        self.source[step] = source;
    }

    pub fn set_user(&mut self, step: usize, user: Option<Formula>) {
        self.user[step] = user;
    }

    pub fn row(&self, step: usize) -> StepRow {
        StepRow {
            stmt: self.proof[step],
            target: self.target[step].clone(),
            source: self.source[step].clone(),
            user: self.user[step].clone(),
        }
    }

    pub fn rows(&self, range: RangeInclusive<usize>) -> Vec<StepRow> {
        range.map(|i| self.row(i)).collect()
    }

    pub fn work_pool(&self) -> WorkVarPool {
        self.work
    }

    pub fn work_pool_mut(&mut self) -> &mut WorkVarPool {
        &mut self.work
    }

    pub fn set_work_pool(&mut self, pool: WorkVarPool) {
        self.work = pool;
    }

    /// The flat statement-reference column, the value handed back to storage
    /// by SAVE NEW_PROOF.
    pub fn flat(&self) -> Vec<StepRef> {
        self.proof.clone()
    }

    /// Indices of all unknown steps, ascending.
    pub fn unknown_steps(&self) -> Vec<usize> {
        (0..self.len())
            .filter(|&i| self.proof[i].is_unknown())
            .collect()
    }

    pub fn first_unknown(&self) -> Option<usize> {
        self.proof.iter().position(|s| s.is_unknown())
    }

    pub fn last_unknown(&self) -> Option<usize> {
        self.proof.iter().rposition(|s| s.is_unknown())
    }

    pub fn is_complete(&self) -> bool {
        self.first_unknown().is_none()
    }

    /// How many preceding steps the given step pops under the RPN discipline.
    pub fn hyp_count(&self, db: &dyn StatementDb, step: usize) -> usize {
        match self.proof[step] {
            StepRef::Unknown => 0,
            StepRef::Known(s) => {
                if db.kind(s).is_assertion() {
                    db.hypotheses(s).len()
                } else {
                    0
                }
            }
        }
    }

    /// The minimal contiguous range ending at `step` that is self-contained
    /// under the RPN stack discipline. Subproofs of any two steps are either
    /// disjoint or nested, never partially overlapping.
    pub fn subproof_range(
        &self,
        db: &dyn StatementDb,
        step: usize,
    ) -> Result<RangeInclusive<usize>, EditError> {
        if step >= self.len() {
            return Err(EditError::StepOutOfRange {
                step: step + 1,
                len: self.len(),
            });
        }
        let mut needed = 1usize;
        let mut i = step + 1;
        while needed > 0 {
            if i == 0 {
                return Err(EditError::Internal(format!(
                    "subproof ending at step {} runs off the start of the proof",
                    step + 1
                )));
            }
            i -= 1;
            needed -= 1;
            needed += self.hyp_count(db, i);
        }
        Ok(i..=step)
    }

    pub fn subproof_len(&self, db: &dyn StatementDb, step: usize) -> Result<usize, EditError> {
        let range = self.subproof_range(db, step)?;
        Ok(range.end() - range.start() + 1)
    }

    /// Start indices of the `hyp_count` child subproofs feeding `step`, in
    /// frame order. Each entry is the index of a child's final step.
    pub fn child_roots(
        &self,
        db: &dyn StatementDb,
        step: usize,
    ) -> Result<Vec<usize>, EditError> {
        let mut roots = Vec::with_capacity(self.hyp_count(db, step));
        let mut end = step;
        for _ in 0..self.hyp_count(db, step) {
            end -= 1;
            let range = self.subproof_range(db, end)?;
            roots.push(end);
            end = *range.start();
        }
        roots.reverse();
        Ok(roots)
    }

    /// Removes the subproof ending at `step`, replacing it with one unknown
    /// step that keeps the old target and user override. All downstream
    /// indices shift.
    pub fn delete_subproof(
        &mut self,
        db: &dyn StatementDb,
        step: usize,
    ) -> Result<(), EditError> {
        if step >= self.len() {
            return Err(EditError::StepOutOfRange {
                step: step + 1,
                len: self.len(),
            });
        }
        if self.proof[step].is_unknown() {
            return Err(EditError::StepAlreadyUnknown(step + 1));
        }
        let range = self.subproof_range(db, step)?;
        let placeholder = StepRow {
            stmt: StepRef::Unknown,
            target: self.target[step].clone(),
            source: None,
            user: self.user[step].clone(),
        };
        self.splice(*range.start()..range.end() + 1, vec![placeholder]);
        Ok(())
    }

    /// Splices a subproof fragment over the single step at `at`, which must
    /// be unknown; the placeholder row is consumed. All downstream indices
    /// shift.
    pub fn add_subproof(&mut self, rows: Vec<StepRow>, at: usize) -> Result<(), EditError> {
        if at >= self.len() {
            return Err(EditError::StepOutOfRange {
                step: at + 1,
                len: self.len(),
            });
        }
        if !self.proof[at].is_unknown() {
            return Err(EditError::Internal(format!(
                "add_subproof over the known step {}",
                at + 1
            )));
        }
        if rows.is_empty() {
            return Err(EditError::Internal("empty subproof fragment".to_owned()));
        }
        self.splice(at..at + 1, rows);
        Ok(())
    }

    /// Replaces the whole subproof ending at `step` with a fragment.
    pub fn replace_subproof(
        &mut self,
        db: &dyn StatementDb,
        step: usize,
        rows: Vec<StepRow>,
    ) -> Result<(), EditError> {
        if rows.is_empty() {
            return Err(EditError::Internal("empty subproof fragment".to_owned()));
        }
        let range = self.subproof_range(db, step)?;
        self.splice(*range.start()..range.end() + 1, rows);
        Ok(())
    }

    fn splice(&mut self, range: std::ops::Range<usize>, rows: Vec<StepRow>) {
        let mut proof = Vec::with_capacity(rows.len());
        let mut target = Vec::with_capacity(rows.len());
        let mut source = Vec::with_capacity(rows.len());
        let mut user = Vec::with_capacity(rows.len());
        for row in rows {
            proof.push(row.stmt);
            target.push(row.target);
            source.push(row.source);
            user.push(row.user);
        }
        self.proof.splice(range.clone(), proof);
        self.target.splice(range.clone(), target);
        self.source.splice(range.clone(), source);
        self.user.splice(range, user);
    }

    /// Applies a work-variable substitution to every formula column.
    pub fn apply_work_subst(&mut self, binds: &WorkSubst) {
        if binds.is_empty() {
            return;
        }
        for column in [&mut self.target, &mut self.source, &mut self.user] {
            for slot in column.iter_mut() {
                if let Some(f) = slot {
                    if f.work_vars().any(|v| binds.get(v).is_some()) {
                        *f = f.apply(binds);
                    }
                }
            }
        }
    }

    /// Defensive structural check: the four columns agree in length and the
    /// proof column forms a single well-formed RPN term.
    pub fn assert_consistent(&self, db: &dyn StatementDb) -> Result<(), EditError> {
        let n = self.len();
        if self.target.len() != n || self.source.len() != n || self.user.len() != n {
            return Err(EditError::Internal(format!(
                "parallel array lengths diverge: {} / {} / {} / {}",
                n,
                self.target.len(),
                self.source.len(),
                self.user.len()
            )));
        }
        if n == 0 {
            return Err(EditError::Internal("empty proof".to_owned()));
        }
        let mut stack = 0usize;
        for i in 0..n {
            let pops = self.hyp_count(db, i);
            if pops > stack {
                return Err(EditError::Internal(format!(
                    "step {} pops {} steps but only {} are available",
                    i + 1,
                    pops,
                    stack
                )));
            }
            stack = stack - pops + 1;
        }
        if stack != 1 {
            return Err(EditError::Internal(format!(
                "proof leaves {} loose subproofs on the stack",
                stack
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdb;

    // id's proof: see testdb. Step indices of interest (0-based):
    //   0..=4   wff ( ph -> ( ph -> ph ) )
    //   5..=7   wff ( ph -> ph )
    //   8..=10  |- ( ph -> ( ( ph -> ph ) -> ph ) ) via ax-1
    //   11..=38 inner ax-mp subproof
    //   39      outer ax-mp
    fn id_proof() -> (crate::db::MemoryDb, ProofInProgress) {
        let db = testdb::propositional();
        let id = crate::db::StatementDb::by_label(&db, "id").unwrap();
        let rows = crate::db::StatementDb::stored_proof(&db, id)
            .unwrap()
            .iter()
            .map(|&s| StepRow {
                stmt: s,
                target: None,
                source: None,
                user: None,
            })
            .collect();
        (db, ProofInProgress::from_rows(rows, id))
    }

    #[test]
    fn whole_proof_is_one_subproof() {
        let (db, proof) = id_proof();
        assert_eq!(proof.len(), 40);
        proof.assert_consistent(&db).unwrap();
        assert_eq!(proof.subproof_range(&db, 39).unwrap(), 0..=39);
    }

    #[test]
    fn subproofs_nest_or_are_disjoint() {
        let (db, proof) = id_proof();
        let ranges: Vec<_> = (0..proof.len())
            .map(|i| proof.subproof_range(&db, i).unwrap())
            .collect();
        for a in ranges.iter() {
            for b in ranges.iter() {
                let disjoint = a.end() < b.start() || b.end() < a.start();
                let a_in_b = b.start() <= a.start() && a.end() <= b.end();
                let b_in_a = a.start() <= b.start() && b.end() <= a.end();
                assert!(disjoint || a_in_b || b_in_a, "{:?} vs {:?}", a, b);
            }
        }
    }

    #[test]
    fn child_roots_in_frame_order() {
        let (db, proof) = id_proof();
        // outer ax-mp pops four children: wff A, wff B, |- A, |- ( A -> B )
        let roots = proof.child_roots(&db, 39).unwrap();
        assert_eq!(roots, vec![4, 7, 10, 38]);
    }

    #[test]
    fn delete_subproof_collapses_and_shifts() {
        let (db, mut proof) = id_proof();
        proof.set_target(10, Some(crate::Formula::new(vec![0])));
        proof.delete_subproof(&db, 10).unwrap();
        assert_eq!(proof.len(), 38);
        assert!(proof.stmt(8).is_unknown());
        assert_eq!(proof.target(8), Some(&crate::Formula::new(vec![0])));
        proof.assert_consistent(&db).unwrap();
        // deleting the now-unknown step is rejected, store untouched
        let before = proof.clone();
        assert_eq!(
            proof.delete_subproof(&db, 8),
            Err(EditError::StepAlreadyUnknown(9))
        );
        assert_eq!(proof, before);
    }

    #[test]
    fn add_subproof_consumes_placeholder() {
        let (db, mut proof) = id_proof();
        proof.delete_subproof(&db, 10).unwrap();
        let wph = crate::db::StatementDb::by_label(&db, "wph").unwrap();
        let rows = vec![
            StepRow::known(wph, None),
            StepRow::known(wph, None),
            StepRow::known(
                crate::db::StatementDb::by_label(&db, "ax-1").unwrap(),
                None,
            ),
        ];
        proof.add_subproof(rows, 8).unwrap();
        assert_eq!(proof.len(), 40);
        proof.assert_consistent(&db).unwrap();
    }

    #[test]
    fn inconsistency_is_detected() {
        let (db, mut proof) = id_proof();
        // chop off a hypothesis subproof without replacement
        proof.splice(0..5, vec![]);
        assert!(proof.assert_consistent(&db).is_err());
    }
}
