use thiserror::Error;

use crate::{
    db::StatementDb,
    formula::Formula,
    store::{ProofInProgress, StepRef, Subproof},
    types::*,
    work::WorkVarPool,
};

/// The unification collaborator: keeps `source` formulas in agreement with
/// `target` formulas and derives the formulas of known subproofs.
pub trait Unifier {
    /// Can the statement's assertion be unified with `target`?
    fn check_stmt_match(&self, db: &dyn StatementDb, stmt: StmtId, target: &Formula) -> bool;

    /// Propagates substitutions across the whole proof: derives sources of
    /// known steps bottom-up, pushes targets into unknown hypothesis steps
    /// and resolves work variables. Per-step failures are reported in the
    /// returned messages, never applied partially. With `announce`, reports
    /// when the proof has become complete.
    fn auto_unify(
        &self,
        db: &dyn StatementDb,
        proof: &mut ProofInProgress,
        announce: bool,
    ) -> Vec<String>;

    /// Reconciles one step's source with its target, applying any resulting
    /// work-variable bindings proof-wide.
    fn unify_step(
        &self,
        db: &dyn StatementDb,
        proof: &mut ProofInProgress,
        step: usize,
    ) -> Vec<String>;
}

/// The floating-hypothesis prover: depth-bounded, cut-free search for a
/// complete subproof of a fully-known target formula.
pub trait FloatingProver {
    fn prove_floating(
        &self,
        db: &dyn StatementDb,
        target: &Formula,
        proving: StmtId,
        depth: usize,
        no_distinct: bool,
        overridden: bool,
    ) -> Option<Subproof>;
}

/// The replacement prover: builds a complete subproof deriving a specific
/// candidate statement's conclusion at a step, possibly across
/// currently-unknown hypotheses, and performs the minimizer's substitution
/// transform.
pub trait ReplacementProver {
    /// A subproof ending in `candidate` whose conclusion matches the goal of
    /// `step`, or `None`. Fresh work variables come from `pool`; the caller
    /// owns writing the pool back on acceptance.
    fn prove_by_replacement(
        &self,
        db: &dyn StatementDb,
        proof: &ProofInProgress,
        pool: &mut WorkVarPool,
        step: usize,
        candidate: StmtId,
        no_distinct: bool,
        overridden: bool,
    ) -> Option<Subproof>;

    /// Substitutes `candidate` into the proof wherever a known subproof
    /// derives a matching conclusion. Returns whether anything changed; the
    /// caller wraps the call in a rollback transaction.
    fn try_substitute(
        &self,
        db: &dyn StatementDb,
        proof: &mut ProofInProgress,
        candidate: StmtId,
    ) -> bool;
}

/// A verification failure reported by the [`Verifier`] dry run.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum VerifyError {
    #[error("the proof is incomplete")]
    Incomplete,
    #[error("disjoint variable violation: {0}")]
    Disjoint(String),
    #[error("step {step}: {reason}")]
    Mismatch { step: usize, reason: String },
    #[error("the proof does not leave exactly one statement on the stack")]
    Malformed,
}

impl VerifyError {
    pub fn is_disjoint_violation(&self) -> bool {
        matches!(self, VerifyError::Disjoint(_))
    }
}

/// The verifier collaborator, consumed only for the disjoint-variable dry
/// run: verify a synthesized flat proof against the statement being proved
/// without touching the session state.
pub trait Verifier {
    fn dry_run(
        &self,
        db: &dyn StatementDb,
        proving: StmtId,
        flat: &[StepRef],
    ) -> Result<(), VerifyError>;
}

/// The proof codec collaborator, consumed solely as a length metric for the
/// minimizer and the expander.
pub trait ProofCodec {
    fn compressed_len(&self, db: &dyn StatementDb, flat: &[StepRef]) -> usize;
}

/// The collaborator bundle threaded into command dispatch.
pub struct Toolbox<'a> {
    pub unifier: &'a dyn Unifier,
    pub floating: &'a dyn FloatingProver,
    pub replacement: &'a dyn ReplacementProver,
    pub verifier: &'a dyn Verifier,
    pub codec: &'a dyn ProofCodec,
}
