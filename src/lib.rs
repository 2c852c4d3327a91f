//! `mmpa` is an interactive proof-editing engine for Metamath-style
//! databases. It maintains a proof-in-progress for one provable statement at
//! a time and edits it through the commands of a Proof Assistant: ASSIGN,
//! REPLACE, IMPROVE, MINIMIZE_WITH, EXPAND, DELETE and friends, with bounded
//! UNDO/REDO.
//!
//! # Main data structures
//!
//! ## The proof store
//! A [`ProofInProgress`] holds the proof in RPN order as parallel columns:
//! the statement reference of every step plus up to three formulas per step
//! (the `target` required by the steps above it, the `source` derived from
//! the steps below it, and an optional `user` override). Every subproof is a
//! contiguous range of steps ending at its root; structural edits splice
//! whole such ranges.
//!
//! ## The statement database
//! A [`StatementDb`] is the read-only view of the surrounding database:
//! labels, frames, $d pairs, discouragement markup and stored proofs. The
//! [`reader`] builds a [`MemoryDb`] from Metamath source text.
//!
//! ## Sessions and commands
//! A [`ProofSession`] pairs the store with its undo [`History`]. Parsed
//! [`Command`]s execute against the session with a [`Toolbox`] of
//! collaborators behind small traits ([`Unifier`], [`FloatingProver`],
//! [`ReplacementProver`], [`Verifier`], [`ProofCodec`]), so provers and
//! verifiers can be swapped without touching the editing core.
//!
//! # Work variables
//! Unknown subformulas are represented by work variables (`$1`, `$2`, ...),
//! negative [`Symbol`]s allocated by a [`WorkVarPool`] that lives inside the
//! store and is snapshotted with it. Unification binds them proof-wide; none
//! may remain when the proof is saved as complete.

mod assign;
mod collab;
mod command;
mod db;
pub mod error;
mod formula;
mod history;
mod improve;
mod minimize;
mod prove;
pub mod reader;
mod session;
mod store;
mod structural;
#[cfg(test)]
mod testdb;
mod types;
mod unify;
mod verify;
mod work;

pub use collab::{
    FloatingProver, ProofCodec, ReplacementProver, Toolbox, Unifier, Verifier, VerifyError,
};
pub use command::Command;
pub use db::{
    has_wildcards, label_matches, resolve_label, MemoryDb, StatementData, StatementDb, StmtKind,
};
pub use error::{EditError, ErrorClass};
pub use formula::{Formula, WorkSubst};
pub use history::History;
pub use improve::ImproveOptions;
pub use minimize::MinimizeOptions;
pub use prove::{BasicFloatingProver, BasicReplacement};
pub use session::{with_rollback, Outcome, ProofSession, StepSelector};
pub use store::{ProofInProgress, StepRef, StepRow, Subproof};
pub use structural::{DeleteTarget, InitializeTarget};
pub use types::*;
pub use unify::BasicUnifier;
pub use verify::{BasicCodec, BasicVerifier};
pub use work::{fragment_isolation, isolation, Isolation, WorkVarPool};
