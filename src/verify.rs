use std::collections::HashMap;

use crate::{
    collab::{ProofCodec, Verifier, VerifyError},
    db::StatementDb,
    formula::Formula,
    store::StepRef,
    types::*,
};

/// A stack-machine proof checker. The editing engine consults it only for
/// dry runs; the interesting part is the disjoint-variable check, which the
/// unifier deliberately knows nothing about.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicVerifier;

impl BasicVerifier {
    pub fn new() -> Self {
        BasicVerifier
    }
}

type Subst = HashMap<Symbol, Vec<Symbol>>;

fn apply(symbols: &[Symbol], subst: &Subst) -> Vec<Symbol> {
    let mut out = Vec::with_capacity(symbols.len());
    for &symb in symbols {
        match subst.get(&symb) {
            Some(expansion) => out.extend_from_slice(expansion),
            None => out.push(symb),
        }
    }
    out
}

/// Checks the mandatory $d pairs of `stmt` under `subst` against the $d
/// pairs available while proving `proving`.
fn check_distinct(
    db: &dyn StatementDb,
    proving: StmtId,
    stmt: StmtId,
    subst: &Subst,
) -> Result<(), VerifyError> {
    let available = db.distinct_pairs(proving);
    let ok = |x: Symbol, y: Symbol| {
        let pair = if x <= y { (x, y) } else { (y, x) };
        available.contains(&pair)
    };
    for &(a, b) in db.distinct_pairs(stmt) {
        let empty = Vec::new();
        let ea = subst.get(&a).unwrap_or(&empty);
        let eb = subst.get(&b).unwrap_or(&empty);
        for &x in ea.iter().filter(|&&s| db.is_variable(s)) {
            for &y in eb.iter().filter(|&&s| db.is_variable(s)) {
                if x == y {
                    return Err(VerifyError::Disjoint(format!(
                        "'{}' occurs in both substitutions of the $d pair ( {} , {} ) of '{}'",
                        db.symbol_name(x),
                        db.symbol_name(a),
                        db.symbol_name(b),
                        db.label(stmt)
                    )));
                }
                if !ok(x, y) {
                    return Err(VerifyError::Disjoint(format!(
                        "'{}' requires ( {} , {} ) to be distinct in '{}'",
                        db.label(stmt),
                        db.symbol_name(x),
                        db.symbol_name(y),
                        db.label(proving)
                    )));
                }
            }
        }
    }
    Ok(())
}

impl Verifier for BasicVerifier {
    fn dry_run(
        &self,
        db: &dyn StatementDb,
        proving: StmtId,
        flat: &[StepRef],
    ) -> Result<(), VerifyError> {
        let mut stack: Vec<Formula> = Vec::new();
        for (step, &sref) in flat.iter().enumerate() {
            let stmt = match sref {
                StepRef::Unknown => return Err(VerifyError::Incomplete),
                StepRef::Known(s) => s,
            };
            if db.kind(stmt).is_hypothesis() {
                stack.push(db.assertion(stmt).clone());
                continue;
            }
            let hyps = db.hypotheses(stmt);
            if stack.len() < hyps.len() {
                return Err(VerifyError::Mismatch {
                    step,
                    reason: format!(
                        "'{}' needs {} hypotheses but only {} statements are on the stack",
                        db.label(stmt),
                        hyps.len(),
                        stack.len()
                    ),
                });
            }
            let popped: Vec<Formula> = stack.split_off(stack.len() - hyps.len());
            let mut subst = Subst::new();
            for (&hyp, formula) in hyps.iter().zip(popped.iter()) {
                let pattern = db.assertion(hyp);
                if db.kind(hyp) == crate::db::StmtKind::Floating {
                    if pattern.typecode() != formula.typecode() {
                        return Err(VerifyError::Mismatch {
                            step,
                            reason: format!(
                                "'{}' expects a {} here",
                                db.label(stmt),
                                db.symbol_name(pattern.symbols()[0])
                            ),
                        });
                    }
                    subst.insert(pattern.symbols()[1], formula.symbols()[1..].to_vec());
                } else if apply(pattern.symbols(), &subst) != formula.symbols() {
                    return Err(VerifyError::Mismatch {
                        step,
                        reason: format!(
                            "the substituted hypothesis '{}' does not match the stack",
                            db.label(hyp)
                        ),
                    });
                }
            }
            check_distinct(db, proving, stmt, &subst)?;
            stack.push(Formula::new(apply(db.assertion(stmt).symbols(), &subst)));
        }
        match stack.as_slice() {
            [conclusion] if conclusion == db.assertion(proving) => Ok(()),
            [conclusion] => Err(VerifyError::Mismatch {
                step: flat.len().saturating_sub(1),
                reason: format!(
                    "the proof concludes {} instead of the statement's assertion",
                    db.format_formula(conclusion)
                ),
            }),
            _ => Err(VerifyError::Malformed),
        }
    }
}

/// Approximates the compressed (squished) proof size without implementing the
/// compression itself: the label list counts once per distinct referenced
/// statement, plus a small per-step cost.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicCodec;

impl BasicCodec {
    pub fn new() -> Self {
        BasicCodec
    }
}

impl ProofCodec for BasicCodec {
    fn compressed_len(&self, db: &dyn StatementDb, flat: &[StepRef]) -> usize {
        let mut seen = Vec::new();
        let mut len = 0;
        for sref in flat {
            match sref {
                StepRef::Unknown => len += 1,
                StepRef::Known(s) => {
                    if !seen.contains(s) {
                        seen.push(*s);
                        len += db.label(*s).len() + 1;
                    }
                    len += 2;
                }
            }
        }
        len
    }
}
