//! IMPROVE: automatic proving of unknown steps.

use tracing::debug;

use crate::{
    collab::{FloatingProver, ReplacementProver, Unifier},
    db::StatementDb,
    error::EditError,
    session::{Outcome, ProofSession, StepSelector},
    store::Subproof,
    work::WorkVarPool,
};

/// Knobs shared by IMPROVE STEP and IMPROVE ALL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImproveOptions {
    /// Maximum nesting of assertions in a found subproof.
    pub depth: usize,
    /// Search aggressiveness: 1 is the cut-free search only, 2 also consults
    /// the replacement prover for complete subproofs, 3 additionally accepts
    /// replacements that leave new unknown hypothesis steps.
    pub level: u8,
    /// In IMPROVE ALL, also re-derive incomplete subproofs wholesale.
    pub subproofs: bool,
    /// Refuse statements carrying $d requirements.
    pub no_distinct: bool,
    /// Use usage-discouraged statements.
    pub overridden: bool,
}

impl Default for ImproveOptions {
    fn default() -> Self {
        ImproveOptions {
            depth: 1,
            level: 1,
            subproofs: false,
            no_distinct: false,
            overridden: false,
        }
    }
}

/// Unification after a hit can pin work variables elsewhere and make further
/// steps provable, so IMPROVE ALL sweeps repeatedly, bounded by this.
const MAX_PASSES: usize = 4;

impl ProofSession {
    /// IMPROVE: searches for a subproof of one unknown step, first cut-free,
    /// then (at level 2 and up) by replacement.
    pub fn improve_step(
        &mut self,
        db: &dyn StatementDb,
        unifier: &dyn Unifier,
        floating: &dyn FloatingProver,
        replacement: &dyn ReplacementProver,
        selector: StepSelector,
        opts: &ImproveOptions,
    ) -> Result<Outcome, EditError> {
        let step = self.resolve_step(selector)?;
        if !self.proof.stmt(step).is_unknown() {
            return Err(EditError::StepAlreadyKnown(step + 1));
        }
        let goal = match self.proof.goal(step) {
            Some(g) => g.clone(),
            None => {
                return Ok(Outcome::message(format!(
                    "Step {} has no target to prove.",
                    step + 1
                )))
            }
        };
        let proving = self.proving();
        let found = floating
            .prove_floating(
                db,
                &goal,
                proving,
                opts.depth,
                opts.no_distinct,
                opts.overridden,
            )
            .map(|rows| (rows, None))
            .or_else(|| {
                if opts.level < 2 {
                    return None;
                }
                self.search_replacement(db, replacement, step, opts)
                    .map(|(rows, pool)| (rows, Some(pool)))
            });
        match found {
            Some((rows, pool)) => {
                let len = rows.len();
                self.proof.add_subproof(rows, step)?;
                if let Some(pool) = pool {
                    self.proof.set_work_pool(pool);
                }
                debug!(step = step + 1, len, "improve hit");
                let mut outcome = Outcome::changed(format!(
                    "A proof of length {} was found for step {}.",
                    len,
                    step + 1
                ));
                outcome
                    .messages
                    .extend(unifier.auto_unify(db, &mut self.proof, true));
                self.commit();
                Ok(outcome)
            }
            None => Ok(Outcome::message(format!(
                "Unable to prove step {}.",
                step + 1
            ))),
        }
    }

    /// IMPROVE ALL: runs the pass sequence (cut-free, replacement, subproof
    /// repair), repeating while progress is made.
    pub fn improve_all(
        &mut self,
        db: &dyn StatementDb,
        unifier: &dyn Unifier,
        floating: &dyn FloatingProver,
        replacement: &dyn ReplacementProver,
        opts: &ImproveOptions,
    ) -> Result<Outcome, EditError> {
        let proving = self.proving();
        let mut proved = 0usize;
        let mut messages = Vec::new();
        for _pass in 0..MAX_PASSES {
            let mut pass_proved = 0usize;
            // cut-free pass; descending, so splices leave unprocessed
            // indices stable
            for step in self.proof.unknown_steps().into_iter().rev() {
                let goal = match self.proof.goal(step) {
                    Some(g) if !g.has_work_vars() => g.clone(),
                    _ => continue,
                };
                if let Some(rows) = floating.prove_floating(
                    db,
                    &goal,
                    proving,
                    opts.depth,
                    opts.no_distinct,
                    opts.overridden,
                ) {
                    let len = rows.len();
                    self.proof.add_subproof(rows, step)?;
                    messages.push(format!(
                        "A proof of length {} was found for step {}.",
                        len,
                        step + 1
                    ));
                    pass_proved += 1;
                }
            }
            // full pass: the replacement prover on what the search left
            if opts.level >= 2 {
                for step in self.proof.unknown_steps().into_iter().rev() {
                    if self.proof.goal(step).map_or(true, |g| g.has_work_vars()) {
                        continue;
                    }
                    if let Some((rows, pool)) =
                        self.search_replacement(db, replacement, step, opts)
                    {
                        let len = rows.len();
                        self.proof.add_subproof(rows, step)?;
                        self.proof.set_work_pool(pool);
                        messages.push(format!(
                            "A proof of length {} was found for step {}.",
                            len,
                            step + 1
                        ));
                        pass_proved += 1;
                    }
                }
            }
            if opts.subproofs {
                pass_proved += self.repair_subproofs(db, floating, opts, &mut messages)?;
            }
            if pass_proved == 0 {
                break;
            }
            proved += pass_proved;
            messages.extend(unifier.auto_unify(db, &mut self.proof, true));
        }
        if proved == 0 {
            return Ok(Outcome::message("No new subproofs were found."));
        }
        self.commit();
        Ok(Outcome {
            changed: true,
            messages,
        })
    }

    /// Scans earlier assertions for one whose conclusion can be derived at
    /// `step` by the replacement prover, in database order. Level 2 accepts
    /// complete fragments only.
    fn search_replacement(
        &self,
        db: &dyn StatementDb,
        replacement: &dyn ReplacementProver,
        step: usize,
        opts: &ImproveOptions,
    ) -> Option<(Subproof, WorkVarPool)> {
        let proving = self.proving();
        for candidate in 0..proving {
            if !db.kind(candidate).is_assertion()
                || db.in_other_mathbox(candidate, proving)
                || (db.usage_discouraged(candidate) && !opts.overridden)
            {
                continue;
            }
            let mut pool = self.proof.work_pool();
            if let Some(rows) = replacement.prove_by_replacement(
                db,
                &self.proof,
                &mut pool,
                step,
                candidate,
                opts.no_distinct,
                opts.overridden,
            ) {
                if opts.level >= 3 || rows.iter().all(|r| !r.stmt.is_unknown()) {
                    return Some((rows, pool));
                }
            }
        }
        None
    }

    /// Re-derives incomplete subproofs wholesale: for each known root whose
    /// subproof still contains an unknown step, searches for a complete
    /// proof of its goal and swaps it in.
    fn repair_subproofs(
        &mut self,
        db: &dyn StatementDb,
        floating: &dyn FloatingProver,
        opts: &ImproveOptions,
        messages: &mut Vec<String>,
    ) -> Result<usize, EditError> {
        let proving = self.proving();
        let mut repaired = 0usize;
        let mut i = self.proof.len();
        while i > 0 {
            i -= 1;
            if self.proof.stmt(i).is_unknown() {
                continue;
            }
            let range = self.proof.subproof_range(db, i)?;
            if !range.clone().any(|j| self.proof.stmt(j).is_unknown()) {
                continue;
            }
            let goal = match self.proof.goal(i) {
                Some(g) if !g.has_work_vars() => g.clone(),
                _ => continue,
            };
            if let Some(rows) = floating.prove_floating(
                db,
                &goal,
                proving,
                opts.depth,
                opts.no_distinct,
                opts.overridden,
            ) {
                let start = *range.start();
                let len = rows.len();
                self.proof.replace_subproof(db, i, rows)?;
                messages.push(format!(
                    "The subproof ending at step {} was rebuilt ({} steps).",
                    i + 1,
                    len
                ));
                repaired += 1;
                i = start;
            }
        }
        Ok(repaired)
    }
}
