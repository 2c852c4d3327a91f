//! EXPAND, DELETE and INITIALIZE: commands that rework the proof's shape
//! without consulting the provers.

use tracing::debug;

use crate::{
    collab::{ProofCodec, Unifier},
    db::{label_matches, StatementDb, StmtKind},
    error::EditError,
    session::{Outcome, ProofSession, StepSelector},
    store::{StepRef, StepRow},
    types::*,
    work::WorkVarPool,
};

/// What DELETE operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteTarget {
    /// One subproof, selected by its root step.
    Step,
    /// The whole proof.
    All,
    /// Every subproof concluding a floating-typecode formula (syntax steps),
    /// leaving unknowns for IMPROVE to rebuild.
    FloatingHypotheses,
}

/// What INITIALIZE resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitializeTarget {
    /// Derived formulas, user overrides and the work-variable pool.
    All,
    /// One step's derived formulas.
    Step(StepSelector),
    /// All user overrides.
    User,
}

impl ProofSession {
    /// EXPAND: inlines the stored proofs of provable statements matching a
    /// label pattern, at every step referencing them, scanning matches from
    /// the latest statement down so freshly inlined references to earlier
    /// matches get expanded in turn. Call-site subproofs substitute for the
    /// inlined statement's mandatory hypotheses; steps proving dummy
    /// variables become unknown.
    pub fn expand(
        &mut self,
        db: &dyn StatementDb,
        unifier: &dyn Unifier,
        codec: &dyn ProofCodec,
        pattern: &str,
    ) -> Result<Outcome, EditError> {
        let matches: Vec<StmtId> = (0..db.stmt_count())
            .rev()
            .filter(|&s| db.kind(s) == StmtKind::Provable && label_matches(pattern, db.label(s)))
            .collect();
        if matches.is_empty() {
            return Ok(Outcome::message(format!(
                "No provable statement matches '{}'.",
                pattern
            )));
        }
        let mut outcome = Outcome::default();
        let mut len = codec.compressed_len(db, &self.proof.flat());
        for stmt in matches {
            if db.stored_proof(stmt).map_or(true, |p| p.is_empty()) {
                continue;
            }
            let mut expanded = 0usize;
            // a stored proof only references earlier statements, so inlining
            // never reintroduces `stmt`
            while let Some(step) =
                (0..self.proof.len()).find(|&i| self.proof.stmt(i) == StepRef::Known(stmt))
            {
                self.inline_step(db, step, stmt)?;
                expanded += 1;
            }
            if expanded == 0 {
                continue;
            }
            let new_len = codec.compressed_len(db, &self.proof.flat());
            debug!(label = db.label(stmt), count = expanded, "expanded");
            outcome.changed = true;
            outcome.push(format!(
                "{} use(s) of '{}' were expanded ({} to {} bytes).",
                expanded,
                db.label(stmt),
                len,
                new_len
            ));
            len = new_len;
        }
        if !outcome.changed {
            outcome.push(format!(
                "No step references a statement matching '{}'.",
                pattern
            ));
            return Ok(outcome);
        }
        self.proof.assert_consistent(db)?;
        outcome
            .messages
            .extend(unifier.auto_unify(db, &mut self.proof, true));
        self.commit();
        Ok(outcome)
    }

    /// Replaces one reference to `stmt` with that statement's stored proof.
    fn inline_step(
        &mut self,
        db: &dyn StatementDb,
        step: usize,
        stmt: StmtId,
    ) -> Result<(), EditError> {
        let stored = db
            .stored_proof(stmt)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                EditError::Syntax(format!("'{}' has no stored proof", db.label(stmt)))
            })?;
        // call-site fragment for each mandatory hypothesis, by statement id
        let roots = self.proof.child_roots(db, step)?;
        let mut fragments: Vec<(StmtId, Vec<StepRow>)> = Vec::new();
        for (&hyp, &root) in db.hypotheses(stmt).iter().zip(roots.iter()) {
            let range = self.proof.subproof_range(db, root)?;
            fragments.push((hyp, self.proof.rows(range)));
        }
        let old = self.proof.row(step);
        let mut rows: Vec<StepRow> = Vec::new();
        for &sref in stored {
            match sref {
                StepRef::Unknown => rows.push(StepRow::unknown(None)),
                StepRef::Known(h) => {
                    if let Some((_, fragment)) = fragments.iter().find(|(f, _)| *f == h) {
                        rows.extend(fragment.iter().cloned());
                    } else if db.kind(h).is_hypothesis() {
                        // a dummy-variable hypothesis of the inlined proof,
                        // meaningless at the call site
                        rows.push(StepRow::unknown(None));
                    } else {
                        rows.push(StepRow::known(h, None));
                    }
                }
            }
        }
        if let Some(last) = rows.last_mut() {
            last.target = old.target;
            last.user = old.user;
        }
        self.proof.replace_subproof(db, step, rows)
    }

    /// DELETE STEP / DELETE ALL / DELETE FLOATING_HYPOTHESES.
    pub fn delete(
        &mut self,
        db: &dyn StatementDb,
        unifier: &dyn Unifier,
        selector: Option<StepSelector>,
        target: DeleteTarget,
    ) -> Result<Outcome, EditError> {
        let mut outcome = Outcome::default();
        match target {
            DeleteTarget::Step => {
                let selector = selector
                    .ok_or_else(|| EditError::Syntax("DELETE STEP needs a step".to_owned()))?;
                let step = self.resolve_step(selector)?;
                self.proof.delete_subproof(db, step)?;
                outcome.changed = true;
                outcome.push(format!("The subproof ending at step {} was deleted.", step + 1));
            }
            DeleteTarget::All => {
                let proving = self.proving();
                let mut fresh = crate::store::ProofInProgress::new(1, proving);
                fresh.set_target(0, Some(db.assertion(proving).clone()));
                self.proof = fresh;
                outcome.changed = true;
                outcome.push("The proof was erased.");
            }
            DeleteTarget::FloatingHypotheses => {
                let mut deleted = 0usize;
                let mut i = self.proof.len();
                while i > 0 {
                    i -= 1;
                    let conclusion_tc = match self.proof.stmt(i) {
                        StepRef::Known(s) => db.assertion(s).typecode(),
                        StepRef::Unknown => None,
                    };
                    let floating = conclusion_tc
                        .map(|tc| db.is_floating_typecode(tc))
                        .unwrap_or(false);
                    if !floating {
                        continue;
                    }
                    let start = *self.proof.subproof_range(db, i)?.start();
                    self.proof.delete_subproof(db, i)?;
                    deleted += 1;
                    i = start;
                }
                if deleted == 0 {
                    outcome.push("No floating-hypothesis subproofs to delete.");
                    return Ok(outcome);
                }
                outcome.changed = true;
                outcome.push(format!("{} subproofs were deleted.", deleted));
            }
        }
        outcome
            .messages
            .extend(unifier.auto_unify(db, &mut self.proof, false));
        self.commit();
        Ok(outcome)
    }

    /// INITIALIZE: discards derived formulas so unification starts over.
    pub fn initialize(
        &mut self,
        db: &dyn StatementDb,
        unifier: &dyn Unifier,
        target: InitializeTarget,
    ) -> Result<Outcome, EditError> {
        let before = self.proof.clone();
        let last = self.proof.len() - 1;
        let mut outcome = Outcome::default();
        match target {
            InitializeTarget::All => {
                for i in 0..self.proof.len() {
                    self.proof.set_source(i, None);
                    self.proof.set_target(i, None);
                    self.proof.set_user(i, None);
                }
                self.proof.set_work_pool(WorkVarPool::new());
                outcome.push("All derived formulas were reinitialized.");
            }
            InitializeTarget::Step(selector) => {
                let step = self.resolve_step(selector)?;
                self.proof.set_source(step, None);
                self.proof.set_target(step, None);
                outcome.push(format!("Step {} was reinitialized.", step + 1));
            }
            InitializeTarget::User => {
                for i in 0..self.proof.len() {
                    self.proof.set_user(i, None);
                }
                outcome.push("All user overrides were cleared.");
            }
        }
        // the root target is the one formula that is never derived
        if self.proof.target(last).is_none() {
            self.proof
                .set_target(last, Some(db.assertion(self.proving()).clone()));
        }
        outcome
            .messages
            .extend(unifier.auto_unify(db, &mut self.proof, false));
        outcome.changed = self.proof != before;
        if outcome.changed {
            self.commit();
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collab::Verifier,
        db::StatementDb,
        testdb,
        unify::BasicUnifier,
        verify::{BasicCodec, BasicVerifier},
    };

    fn complete_id() -> (crate::db::MemoryDb, ProofSession) {
        let db = testdb::propositional();
        let (session, _) = ProofSession::start(&db, "id", 20, &BasicUnifier::new(), false).unwrap();
        assert!(session.proof().is_complete());
        (db, session)
    }

    #[test]
    fn expand_inlines_every_reference() {
        let db = testdb::propositional();
        let u = BasicUnifier::new();
        let c = BasicCodec::new();
        let (mut s, _) = ProofSession::start(&db, "th1", 20, &u, false).unwrap();
        s.assign(&db, &u, StepSelector::Last, "id", false).unwrap();
        s.assign(&db, &u, StepSelector::First, "wph", false).unwrap();
        assert!(s.proof().is_complete());
        let out = s.expand(&db, &u, &c, "id").unwrap();
        assert!(out.changed);
        assert!(out.messages[0].contains("1 use(s) of 'id'"), "{:?}", out.messages);
        assert_eq!(s.proof().len(), 40);
        s.proof().assert_consistent(&db).unwrap();
        let th1 = db.by_label("th1").unwrap();
        assert_eq!(
            BasicVerifier::new().dry_run(&db, th1, &s.proof().flat()),
            Ok(())
        );
    }

    #[test]
    fn expand_accepts_wildcard_patterns() {
        let db = testdb::propositional();
        let u = BasicUnifier::new();
        let c = BasicCodec::new();
        let (mut s, _) = ProofSession::start(&db, "th1", 20, &u, false).unwrap();
        s.assign(&db, &u, StepSelector::Last, "id", false).unwrap();
        s.assign(&db, &u, StepSelector::First, "wph", false).unwrap();
        let out = s.expand(&db, &u, &c, "i*").unwrap();
        assert!(out.changed);
        assert_eq!(s.proof().len(), 40);
    }

    #[test]
    fn expand_distinguishes_unmatched_from_unreferenced() {
        let db = testdb::propositional();
        let u = BasicUnifier::new();
        let c = BasicCodec::new();
        let (mut s, _) = ProofSession::start(&db, "th1", 20, &u, false).unwrap();
        // axioms never match: only proofs can be expanded
        let out = s.expand(&db, &u, &c, "ax-id").unwrap();
        assert!(!out.changed);
        assert_eq!(
            out.messages,
            vec!["No provable statement matches 'ax-id'.".to_owned()]
        );
        // `id` is provable but this proof never uses it
        let out = s.expand(&db, &u, &c, "id").unwrap();
        assert!(!out.changed);
        assert_eq!(
            out.messages,
            vec!["No step references a statement matching 'id'.".to_owned()]
        );
        assert_eq!(s.proof().len(), 1);
    }

    #[test]
    fn delete_all_erases_to_a_single_unknown() {
        let (db, mut s) = complete_id();
        let u = BasicUnifier::new();
        let out = s.delete(&db, &u, None, DeleteTarget::All).unwrap();
        assert!(out.changed);
        assert_eq!(s.proof().len(), 1);
        assert!(s.proof().stmt(0).is_unknown());
        let id = db.by_label("id").unwrap();
        assert_eq!(s.proof().target(0), Some(db.assertion(id)));
        // and UNDO restores the full proof
        assert!(s.undo().changed);
        assert_eq!(s.proof().len(), 40);
    }

    #[test]
    fn delete_floating_hypotheses_leaves_logical_skeleton() {
        let (db, mut s) = complete_id();
        let u = BasicUnifier::new();
        let out = s
            .delete(&db, &u, None, DeleteTarget::FloatingHypotheses)
            .unwrap();
        assert!(out.changed);
        // 5 logical steps (ax-1 twice, ax-2, ax-mp twice) plus one unknown
        // per deleted syntax child
        assert_eq!(s.proof().len(), 16);
        assert_eq!(s.proof().unknown_steps().len(), 11);
        s.proof().assert_consistent(&db).unwrap();
        // targets of the unknowns survive for IMPROVE
        for i in s.proof().unknown_steps() {
            assert!(s.proof().target(i).is_some());
        }
    }

    #[test]
    fn initialize_all_rederives_the_same_formulas() {
        let (db, mut s) = complete_id();
        let u = BasicUnifier::new();
        let before: Vec<_> = (0..s.proof().len())
            .map(|i| s.proof().source(i).cloned())
            .collect();
        s.initialize(&db, &u, InitializeTarget::All).unwrap();
        let after: Vec<_> = (0..s.proof().len())
            .map(|i| s.proof().source(i).cloned())
            .collect();
        assert_eq!(before, after);
        assert_eq!(s.proof().work_pool().allocated(), 0);
    }

    #[test]
    fn initialize_user_clears_overrides() {
        let (db, mut s) = complete_id();
        let u = BasicUnifier::new();
        s.let_step(&db, &u, StepSelector::Absolute(1), "wff ph")
            .unwrap();
        assert!(s.proof().user(0).is_some());
        let out = s.initialize(&db, &u, InitializeTarget::User).unwrap();
        assert!(out.changed);
        assert!((0..s.proof().len()).all(|i| s.proof().user(i).is_none()));
    }
}
