use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use crate::{
    collab::Unifier,
    db::StatementDb,
    formula::{Formula, WorkSubst},
    store::{ProofInProgress, StepRef},
    types::*,
};

/// Pattern variables are frame variables renamed into a reserved work-variable
/// range so they can never collide with the symbols of the formula being
/// matched. Indices at or above this base are local to one match and never
/// escape unresolved.
const LOCAL_BASE: u32 = 1 << 30;

fn local_var(k: usize) -> Symbol {
    work_var(LOCAL_BASE + k as u32)
}

pub(crate) fn is_local(symbol: Symbol) -> bool {
    is_work_var(symbol) && work_var_index(symbol) >= LOCAL_BASE
}

pub(crate) type Binds = HashMap<Symbol, Vec<Symbol>>;

/// Sentinel separating concatenated equations in [`unify_all`]. Never a
/// database symbol or work variable; spans may not cross it.
const SEP: Symbol = Symbol::MAX;

/// Backtracking token-span unification of two symbol sequences. Any work
/// variable (local pattern variable or session work variable) may bind a
/// non-empty span of the other side; everything else must match literally.
/// First solution wins; `fuel` bounds pathological backtracking.
pub(crate) fn unify_spans(a: &[Symbol], b: &[Symbol], binds: &mut Binds, fuel: &mut u32) -> bool {
    if *fuel == 0 {
        return false;
    }
    *fuel -= 1;
    match (a.first().copied(), b.first().copied()) {
        (None, None) => true,
        (Some(x), _) if is_work_var(x) && binds.contains_key(&x) => {
            let mut expanded = binds[&x].clone();
            expanded.extend_from_slice(&a[1..]);
            unify_spans(&expanded, b, binds, fuel)
        }
        (_, Some(y)) if is_work_var(y) && binds.contains_key(&y) => {
            let mut expanded = binds[&y].clone();
            expanded.extend_from_slice(&b[1..]);
            unify_spans(a, &expanded, binds, fuel)
        }
        (Some(x), Some(y)) if x == y => unify_spans(&a[1..], &b[1..], binds, fuel),
        (Some(x), _) if is_work_var(x) => bind_span(x, &a[1..], b, binds, fuel, false),
        (_, Some(y)) if is_work_var(y) => bind_span(y, &b[1..], a, binds, fuel, true),
        _ => false,
    }
}

fn bind_span(
    var: Symbol,
    rest: &[Symbol],
    other: &[Symbol],
    binds: &mut Binds,
    fuel: &mut u32,
    swapped: bool,
) -> bool {
    for l in 1..=other.len() {
        let span = &other[..l];
        if span.contains(&var) || span.contains(&SEP) {
            break;
        }
        binds.insert(var, span.to_vec());
        let ok = if swapped {
            unify_spans(other.get(l..).unwrap_or(&[]), rest, binds, fuel)
        } else {
            unify_spans(rest, other.get(l..).unwrap_or(&[]), binds, fuel)
        };
        if ok {
            return true;
        }
        binds.remove(&var);
    }
    false
}

/// Solves a set of equations simultaneously: a wrong span split in one
/// equation backtracks through all of them, so known hypothesis conclusions
/// disambiguate the goal match. Equations are concatenated with [`SEP`],
/// which no span may cross.
pub(crate) fn unify_all(
    equations: &[(Vec<Symbol>, Vec<Symbol>)],
    binds: &mut Binds,
    fuel: &mut u32,
) -> bool {
    let mut a = Vec::new();
    let mut b = Vec::new();
    for (x, y) in equations {
        a.extend_from_slice(x);
        a.push(SEP);
        b.extend_from_slice(y);
        b.push(SEP);
    }
    unify_spans(&a, &b, binds, fuel)
}

/// Expands every bound symbol of `symbols` transitively. Cyclic bindings are
/// left unexpanded rather than looping.
pub(crate) fn resolve(symbols: &[Symbol], binds: &Binds) -> Vec<Symbol> {
    fn go(symbols: &[Symbol], binds: &Binds, active: &mut Vec<Symbol>, out: &mut Vec<Symbol>) {
        for &symb in symbols {
            match binds.get(&symb) {
                Some(expansion) if !active.contains(&symb) => {
                    active.push(symb);
                    go(expansion, binds, active, out);
                    active.pop();
                }
                _ => out.push(symb),
            }
        }
    }
    let mut out = Vec::with_capacity(symbols.len());
    go(symbols, binds, &mut Vec::new(), &mut out);
    out
}

/// One statement's assertion and hypothesis formulas with its frame variables
/// renamed apart into local pattern variables.
pub(crate) struct Pattern {
    pub(crate) assertion: Vec<Symbol>,
    pub(crate) hypotheses: Vec<Vec<Symbol>>,
    /// local variable of each frame variable, in frame order
    pub(crate) locals: Vec<Symbol>,
}

pub(crate) fn pattern_of(db: &dyn StatementDb, stmt: StmtId) -> Pattern {
    let frame = db.frame_vars(stmt);
    let rename: HashMap<Symbol, Symbol> = frame
        .iter()
        .enumerate()
        .map(|(k, &v)| (v, local_var(k)))
        .collect();
    let apply = |f: &Formula| -> Vec<Symbol> {
        f.symbols()
            .iter()
            .map(|s| rename.get(s).copied().unwrap_or(*s))
            .collect()
    };
    Pattern {
        assertion: apply(db.assertion(stmt)),
        hypotheses: db
            .hypotheses(stmt)
            .iter()
            .map(|&h| apply(db.assertion(h)))
            .collect(),
        locals: frame.iter().enumerate().map(|(k, _)| local_var(k)).collect(),
    }
}

/// The reference unification collaborator: a backtracking token-span matcher
/// plus the proof-wide auto-unification pass.
///
/// This is deliberately a heuristic, first-solution unifier; where the real
/// system would ask the user to disambiguate, this one commits to the
/// shortest-span binding.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicUnifier {
    fuel: u32,
}

impl BasicUnifier {
    pub fn new() -> Self {
        BasicUnifier { fuel: 100_000 }
    }

    fn extract_work_subst(&self, binds: &Binds) -> WorkSubst {
        let mut subst = WorkSubst::new();
        for (&var, _) in binds.iter() {
            if !is_work_var(var) || is_local(var) {
                continue;
            }
            let expansion = resolve(&[var], binds);
            if expansion == [var] || expansion.contains(&var) {
                continue;
            }
            if expansion.iter().any(|&s| is_local(s)) {
                continue;
            }
            subst.insert(var, Formula::new(expansion));
        }
        subst
    }

    /// Derives formulas for one known step: seeds bindings from the existing
    /// source and the goal, unifies each hypothesis pattern against the
    /// corresponding child conclusion, and returns the updates to apply.
    /// Returns `None` (and pushes a message) if anything refuses to unify.
    fn derive_step(
        &self,
        db: &dyn StatementDb,
        proof: &mut ProofInProgress,
        step: usize,
        stmt: StmtId,
        failures: &mut BTreeSet<String>,
    ) -> Option<StepUpdate> {
        let pattern = pattern_of(db, stmt);
        let roots = match proof.child_roots(db, step) {
            Ok(r) => r,
            Err(e) => {
                failures.insert(format!("Step {}: {}", step + 1, e));
                return None;
            }
        };
        let mut equations: Vec<(Vec<Symbol>, Vec<Symbol>)> = Vec::new();
        if let Some(goal) = proof.goal(step) {
            equations.push((pattern.assertion.clone(), goal.symbols().to_vec()));
        }
        for (hyp_pattern, &root) in pattern.hypotheses.iter().zip(roots.iter()) {
            if let Some(conclusion) = proof.source(root).or_else(|| proof.goal(root)) {
                equations.push((hyp_pattern.clone(), conclusion.symbols().to_vec()));
            }
        }
        let mut binds = Binds::new();
        let mut fuel = self.fuel;
        // the previous derivation seeds the solution so existing work
        // variables are refined instead of reallocated, but a stale source
        // must never make a solvable step fail
        let solved = match proof.source(step) {
            Some(source) => {
                let mut seeded = vec![(pattern.assertion.clone(), source.symbols().to_vec())];
                seeded.extend(equations.iter().cloned());
                unify_all(&seeded, &mut binds, &mut fuel) || {
                    binds.clear();
                    fuel = self.fuel;
                    unify_all(&equations, &mut binds, &mut fuel)
                }
            }
            None => unify_all(&equations, &mut binds, &mut fuel),
        };
        if !solved {
            failures.insert(format!(
                "Step {}: '{}' does not unify with the step's target and hypotheses.",
                step + 1,
                db.label(stmt)
            ));
            return None;
        }
        // frame variables the step's surroundings did not determine become
        // work variables
        for &local in pattern.locals.iter() {
            if resolve(&[local], &binds) == [local] {
                let fresh = proof.work_pool_mut().alloc();
                binds.insert(local, vec![fresh]);
            }
        }
        let source = Formula::new(resolve(&pattern.assertion, &binds));
        let child_targets = pattern
            .hypotheses
            .iter()
            .zip(roots.iter())
            .map(|(h, &root)| (root, Formula::new(resolve(h, &binds))))
            .collect();
        Some(StepUpdate {
            source,
            child_targets,
            work_subst: self.extract_work_subst(&binds),
        })
    }
}

struct StepUpdate {
    source: Formula,
    child_targets: Vec<(usize, Formula)>,
    work_subst: WorkSubst,
}

impl Unifier for BasicUnifier {
    fn check_stmt_match(&self, db: &dyn StatementDb, stmt: StmtId, target: &Formula) -> bool {
        let pattern = pattern_of(db, stmt);
        let mut binds = Binds::new();
        let mut fuel = self.fuel;
        unify_spans(&pattern.assertion, target.symbols(), &mut binds, &mut fuel)
    }

    fn auto_unify(
        &self,
        db: &dyn StatementDb,
        proof: &mut ProofInProgress,
        announce: bool,
    ) -> Vec<String> {
        let mut failures = BTreeSet::new();
        let max_passes = proof.len().max(4);
        for pass in 0..max_passes {
            let mut changed = false;
            for step in 0..proof.len() {
                let stmt = match proof.stmt(step) {
                    StepRef::Unknown => continue,
                    StepRef::Known(s) => s,
                };
                if db.kind(stmt).is_hypothesis() {
                    // hypothesis steps push their literal formula
                    let literal = db.assertion(stmt).clone();
                    if proof.source(step) != Some(&literal) {
                        proof.set_source(step, Some(literal.clone()));
                        changed = true;
                    }
                    if let Some(target) = proof.goal(step).cloned() {
                        if target != literal {
                            changed |=
                                self.reconcile(proof, step, &target, &literal, &mut failures);
                        }
                    } else {
                        proof.set_target(step, Some(literal));
                        changed = true;
                    }
                    continue;
                }
                let update = match self.derive_step(db, proof, step, stmt, &mut failures) {
                    Some(u) => u,
                    None => continue,
                };
                if proof.source(step) != Some(&update.source) {
                    proof.set_source(step, Some(update.source.clone()));
                    changed = true;
                }
                if proof.goal(step).is_none() {
                    proof.set_target(step, Some(update.source.clone()));
                    changed = true;
                }
                for (root, formula) in update.child_targets {
                    match proof.goal(root).cloned() {
                        None => {
                            proof.set_target(root, Some(formula));
                            changed = true;
                        }
                        Some(existing) if existing != formula => {
                            changed |=
                                self.reconcile(proof, root, &existing, &formula, &mut failures);
                        }
                        _ => {}
                    }
                }
                if !update.work_subst.is_empty() {
                    proof.apply_work_subst(&update.work_subst);
                    changed = true;
                }
            }
            trace!(pass, changed, "auto-unify pass");
            if !changed {
                break;
            }
        }
        let mut messages: Vec<String> = failures.into_iter().collect();
        if announce && proof.is_complete() && fully_determined(proof) && messages.is_empty() {
            messages.push("The proof is complete.".to_owned());
        }
        messages
    }

    fn unify_step(
        &self,
        _db: &dyn StatementDb,
        proof: &mut ProofInProgress,
        step: usize,
    ) -> Vec<String> {
        let mut failures = BTreeSet::new();
        let (target, source) = match (proof.goal(step).cloned(), proof.source(step).cloned()) {
            (Some(t), Some(s)) => (t, s),
            _ => {
                return vec![format!(
                    "Step {} has no source and target to reconcile.",
                    step + 1
                )]
            }
        };
        if target == source {
            return vec![format!("Step {} is already unified.", step + 1)];
        }
        self.reconcile(proof, step, &target, &source, &mut failures);
        let mut messages: Vec<String> = failures.into_iter().collect();
        if messages.is_empty() {
            messages.push(format!("Step {} was unified.", step + 1));
        }
        messages
    }
}

impl BasicUnifier {
    /// Unifies two formulas of one step via their work variables and applies
    /// the resulting bindings proof-wide. Returns whether anything changed.
    fn reconcile(
        &self,
        proof: &mut ProofInProgress,
        step: usize,
        a: &Formula,
        b: &Formula,
        failures: &mut BTreeSet<String>,
    ) -> bool {
        let mut binds = Binds::new();
        let mut fuel = self.fuel;
        if !unify_spans(a.symbols(), b.symbols(), &mut binds, &mut fuel) {
            failures.insert(format!(
                "Step {}: the derived formula does not unify with the step's target.",
                step + 1
            ));
            return false;
        }
        let subst = self.extract_work_subst(&binds);
        if subst.is_empty() {
            return false;
        }
        proof.apply_work_subst(&subst);
        true
    }
}

/// No work variable left anywhere: every formula is fully determined.
fn fully_determined(proof: &ProofInProgress) -> bool {
    (0..proof.len()).all(|i| {
        [proof.target(i), proof.source(i), proof.user(i)]
            .into_iter()
            .flatten()
            .all(|f| !f.has_work_vars())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{store::StepRow, testdb};

    fn db_and_rows(label: &str) -> (crate::db::MemoryDb, ProofInProgress) {
        let db = testdb::propositional();
        let stmt = db.by_label(label).unwrap();
        let rows: Vec<StepRow> = db
            .stored_proof(stmt)
            .unwrap()
            .iter()
            .map(|&s| StepRow {
                stmt: s,
                target: None,
                source: None,
                user: None,
            })
            .collect();
        let mut proof = ProofInProgress::from_rows(rows, stmt);
        let last = proof.len() - 1;
        proof.set_target(last, Some(db.assertion(stmt).clone()));
        (db, proof)
    }

    #[test]
    fn spans_backtrack_to_a_full_consumption() {
        // $0 must grow past its first candidate to let the tail match
        let arrow = 12;
        let a = 13;
        let b = 14;
        let pattern = vec![work_var(0), arrow, b];
        let tgt = vec![a, arrow, a, arrow, b];
        let mut binds = Binds::new();
        let mut fuel = 10_000;
        assert!(unify_spans(&pattern, &tgt, &mut binds, &mut fuel));
        assert_eq!(binds[&work_var(0)], vec![a, arrow, a]);
    }

    #[test]
    fn joint_equations_disambiguate_spans() {
        // ( $0 -> $1 ) against ( ( a -> b ) -> c ) alone admits the
        // ill-formed split $0 = "( a"; the second equation pinning $0 to a
        // known conclusion forces the well-formed one.
        let lp = 10;
        let rp = 11;
        let arrow = 12;
        let a = 13;
        let b = 14;
        let c = 15;
        let equations = vec![
            (
                vec![lp, work_var(0), arrow, work_var(1), rp],
                vec![lp, lp, a, arrow, b, rp, arrow, c, rp],
            ),
            (vec![work_var(0)], vec![lp, a, arrow, b, rp]),
        ];
        let mut binds = Binds::new();
        let mut fuel = 10_000;
        assert!(unify_all(&equations, &mut binds, &mut fuel));
        assert_eq!(resolve(&[work_var(0)], &binds), vec![lp, a, arrow, b, rp]);
        assert_eq!(resolve(&[work_var(1)], &binds), vec![c]);
    }

    #[test]
    fn check_stmt_match_respects_structure() {
        let db = testdb::propositional();
        let u = BasicUnifier::new();
        let ax1 = db.by_label("ax-1").unwrap();
        let id = db.by_label("id").unwrap();
        // |- ( ph -> ( ps -> ph ) ) unifies with |- ( ph -> ph )? No: the
        // inner shape differs.
        assert!(!u.check_stmt_match(&db, ax1, db.assertion(id)));
        // but it unifies with its own shape
        assert!(u.check_stmt_match(&db, ax1, db.assertion(ax1)));
    }

    #[test]
    fn auto_unify_derives_complete_proof() {
        let (db, mut proof) = db_and_rows("id");
        let u = BasicUnifier::new();
        let messages = u.auto_unify(&db, &mut proof, true);
        assert!(
            messages.contains(&"The proof is complete.".to_owned()),
            "{:?}",
            messages
        );
        let id = db.by_label("id").unwrap();
        let last = proof.len() - 1;
        assert_eq!(proof.source(last), Some(db.assertion(id)));
        // every step has matching source and target
        for i in 0..proof.len() {
            assert_eq!(proof.source(i), proof.target(i), "step {}", i + 1);
        }
    }

    #[test]
    fn auto_unify_allocates_work_vars_for_unknowns() {
        let db = testdb::propositional();
        let th1 = db.by_label("th1").unwrap();
        let wi = db.by_label("wi").unwrap();
        // [?, ?, wi] proving nothing in particular: wi's children are unknown
        let rows = vec![
            StepRow::unknown(None),
            StepRow::unknown(None),
            StepRow::known(wi, None),
        ];
        let mut proof = ProofInProgress::from_rows(rows, th1);
        let u = BasicUnifier::new();
        u.auto_unify(&db, &mut proof, false);
        // both children got "wff <work var>" targets
        for i in 0..2 {
            let target = proof.target(i).unwrap();
            assert_eq!(target.typecode(), db.symbol("wff"));
            assert!(target.has_work_vars());
        }
        let source = proof.source(2).unwrap();
        assert!(source.has_work_vars());
    }
}
