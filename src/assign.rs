//! ASSIGN, REPLACE, LET, UNIFY and MATCH: the step-level editing commands.

use tracing::debug;

use crate::{
    collab::{ReplacementProver, Unifier},
    db::{has_wildcards, resolve_label, StatementDb},
    error::EditError,
    formula::WorkSubst,
    session::{Outcome, ProofSession, StepSelector},
    store::{StepRef, StepRow},
    types::*,
    work::{fragment_isolation, isolation, Isolation},
};

/// Resolves a label argument to exactly one statement usable at this point.
fn resolve_single(
    db: &dyn StatementDb,
    pattern: &str,
    proving: StmtId,
) -> Result<StmtId, EditError> {
    let matches = resolve_label(db, pattern, proving)?;
    match matches.as_slice() {
        [stmt] => Ok(*stmt),
        many if has_wildcards(pattern) => Err(EditError::LabelAmbiguous(
            pattern.to_owned(),
            many.len(),
        )),
        many => Ok(many[0]),
    }
}

fn check_usage_policy(
    db: &dyn StatementDb,
    stmt: StmtId,
    proving: StmtId,
    overridden: bool,
    outcome: &mut Outcome,
) -> Result<(), EditError> {
    if db.usage_discouraged(stmt) && !overridden {
        return Err(EditError::UsageDiscouraged(db.label(stmt).to_owned()));
    }
    if db.in_other_mathbox(stmt, proving) {
        outcome.push(format!(
            "Warning: '{}' is in another mathbox.",
            db.label(stmt)
        ));
    }
    Ok(())
}

impl ProofSession {
    /// ASSIGN: puts a statement at an unknown step, inserting one new unknown
    /// step per mandatory hypothesis. Targets of the new steps are derived by
    /// the unifier.
    pub fn assign(
        &mut self,
        db: &dyn StatementDb,
        unifier: &dyn Unifier,
        selector: StepSelector,
        label: &str,
        overridden: bool,
    ) -> Result<Outcome, EditError> {
        let step = self.resolve_step(selector)?;
        if !self.proof.stmt(step).is_unknown() {
            return Err(EditError::StepAlreadyKnown(step + 1));
        }
        let stmt = resolve_single(db, label, self.proving())?;
        let mut outcome = Outcome::default();
        check_usage_policy(db, stmt, self.proving(), overridden, &mut outcome)?;
        if let Some(goal) = self.proof.goal(step) {
            if !unifier.check_stmt_match(db, stmt, goal) {
                return Err(EditError::NotUnifiable {
                    label: db.label(stmt).to_owned(),
                    step: step + 1,
                });
            }
        }
        let placeholder = self.proof.row(step);
        let mut rows: Vec<StepRow> = (0..db.hypotheses(stmt).len())
            .map(|_| StepRow::unknown(None))
            .collect();
        rows.push(StepRow {
            stmt: StepRef::Known(stmt),
            target: placeholder.target,
            source: None,
            user: placeholder.user,
        });
        self.proof.add_subproof(rows, step)?;
        debug!(step = step + 1, label = db.label(stmt), "assigned");
        outcome.changed = true;
        outcome.push(format!(
            "Step {} was assigned '{}'.",
            step + 1,
            db.label(stmt)
        ));
        outcome
            .messages
            .extend(unifier.auto_unify(db, &mut self.proof, true));
        self.commit();
        Ok(outcome)
    }

    /// REPLACE: derives a statement's conclusion at a step (known or
    /// unknown), reusing existing subproofs for hypotheses where possible and
    /// creating new unknown steps for the rest.
    pub fn replace(
        &mut self,
        db: &dyn StatementDb,
        unifier: &dyn Unifier,
        replacement: &dyn ReplacementProver,
        selector: StepSelector,
        label: &str,
        overridden: bool,
    ) -> Result<Outcome, EditError> {
        let step = self.resolve_step(selector)?;
        let stmt = resolve_single(db, label, self.proving())?;
        let mut outcome = Outcome::default();
        check_usage_policy(db, stmt, self.proving(), overridden, &mut outcome)?;
        let mut pool = self.proof.work_pool();
        let rows = replacement
            .prove_by_replacement(db, &self.proof, &mut pool, step, stmt, false, overridden)
            .ok_or_else(|| EditError::NotUnifiable {
                label: db.label(stmt).to_owned(),
                step: step + 1,
            })?;
        let start = if self.proof.stmt(step).is_unknown() {
            step
        } else {
            *self.proof.subproof_range(db, step)?.start()
        };
        let root = start + rows.len() - 1;
        if self.proof.stmt(step).is_unknown() {
            self.proof.add_subproof(rows, step)?;
        } else {
            self.proof.replace_subproof(db, step, rows)?;
        }
        self.proof.set_work_pool(pool);
        debug!(step = step + 1, label = db.label(stmt), "replaced");
        outcome.changed = true;
        outcome.push(format!(
            "Step {} was replaced with '{}'.",
            step + 1,
            db.label(stmt)
        ));
        outcome
            .messages
            .extend(unifier.auto_unify(db, &mut self.proof, true));
        // the new subproof starts where the old one did; report how its work
        // variables relate to the rest of the proof
        let range = self.proof.subproof_range(db, root)?;
        match fragment_isolation(&self.proof, range) {
            Isolation::None => {}
            Isolation::Isolated => outcome.push(
                "The new subproof's work variables do not occur elsewhere; \
                 assigning them affects no other step.",
            ),
            Isolation::Shared => outcome.push(
                "The new subproof shares work variables with other steps; \
                 assign them before saving.",
            ),
        }
        self.commit();
        Ok(outcome)
    }

    /// LET STEP: overrides a step's formula with a user-typed one. The
    /// override participates in unification in place of the target.
    pub fn let_step(
        &mut self,
        db: &dyn StatementDb,
        unifier: &dyn Unifier,
        selector: StepSelector,
        formula_text: &str,
    ) -> Result<Outcome, EditError> {
        let step = self.resolve_step(selector)?;
        let formula = db.parse_formula(formula_text)?;
        self.proof.set_user(step, Some(formula));
        let mut outcome = Outcome::changed(format!("Step {} was overridden.", step + 1));
        if isolation(&self.proof, step) == Isolation::Shared {
            outcome.push(format!(
                "Note: step {} shares work variables with other steps; \
                 the override propagates to them.",
                step + 1
            ));
        }
        outcome
            .messages
            .extend(unifier.auto_unify(db, &mut self.proof, true));
        self.commit();
        Ok(outcome)
    }

    /// LET VARIABLE: binds a work variable to a formula, proof-wide.
    pub fn let_variable(
        &mut self,
        db: &dyn StatementDb,
        unifier: &dyn Unifier,
        var_name: &str,
        formula_text: &str,
    ) -> Result<Outcome, EditError> {
        let var = match db.parse_formula(var_name)?.symbols() {
            [v] if is_work_var(*v) => *v,
            _ => {
                return Err(EditError::Syntax(format!(
                    "'{}' is not a work variable",
                    var_name
                )))
            }
        };
        let formula = db.parse_formula(formula_text)?;
        if formula.symbols().contains(&var) {
            return Err(EditError::Syntax(format!(
                "'{}' may not occur in its own substitution",
                var_name
            )));
        }
        let mut binds = WorkSubst::new();
        binds.insert(var, formula);
        self.proof.apply_work_subst(&binds);
        let mut outcome = Outcome::changed(format!("{} was substituted.", var_name));
        outcome
            .messages
            .extend(unifier.auto_unify(db, &mut self.proof, true));
        self.commit();
        Ok(outcome)
    }

    /// UNIFY STEP / UNIFY ALL.
    pub fn unify(
        &mut self,
        db: &dyn StatementDb,
        unifier: &dyn Unifier,
        selector: Option<StepSelector>,
    ) -> Result<Outcome, EditError> {
        let before = self.proof.clone();
        let messages = match selector {
            Some(selector) => {
                let step = self.resolve_step(selector)?;
                unifier.unify_step(db, &mut self.proof, step)
            }
            None => unifier.auto_unify(db, &mut self.proof, true),
        };
        let changed = self.proof != before;
        if changed {
            self.commit();
        }
        let mut outcome = Outcome {
            changed,
            messages,
        };
        if outcome.messages.is_empty() {
            outcome.push("No changes were made.");
        }
        Ok(outcome)
    }

    /// MATCH STEP: lists the statements assignable to an unknown step.
    pub fn match_step(
        &mut self,
        db: &dyn StatementDb,
        unifier: &dyn Unifier,
        selector: StepSelector,
    ) -> Result<Outcome, EditError> {
        let step = self.resolve_step(selector)?;
        if !self.proof.stmt(step).is_unknown() {
            return Err(EditError::StepAlreadyKnown(step + 1));
        }
        let mut outcome = Outcome::default();
        let goal = match self.proof.goal(step) {
            Some(g) => g.clone(),
            None => {
                outcome.push(format!("Step {} has no target to match against.", step + 1));
                return Ok(outcome);
            }
        };
        let mut labels = Vec::new();
        for stmt in 0..self.proving() {
            if !db.kind(stmt).is_assertion() || db.in_other_mathbox(stmt, self.proving()) {
                continue;
            }
            if unifier.check_stmt_match(db, stmt, &goal) {
                labels.push(db.label(stmt).to_owned());
            }
        }
        for &hyp in db.hypotheses(self.proving()) {
            if db.assertion(hyp) == &goal {
                labels.insert(0, db.label(hyp).to_owned());
            }
        }
        if labels.is_empty() {
            outcome.push(format!("No statement matches step {}.", step + 1));
        } else {
            outcome.push(format!(
                "Step {} matches: {}",
                step + 1,
                labels.join(" ")
            ));
        }
        Ok(outcome)
    }
}
