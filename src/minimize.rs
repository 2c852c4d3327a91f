//! MINIMIZE_WITH: shortening the proof by substituting earlier statements.

use std::collections::BTreeSet;

use tracing::debug;

use crate::{
    collab::{Toolbox, VerifyError},
    db::{label_matches, resolve_label, StatementDb},
    error::EditError,
    session::{with_rollback, Outcome, ProofSession},
    store::{ProofInProgress, StepRef},
    types::*,
};

/// Knobs for MINIMIZE_WITH.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MinimizeOptions {
    /// Accept rewrites even when the encoded proof does not get smaller.
    pub may_grow: bool,
    /// Consider candidates from other mathboxes.
    pub include_mathboxes: bool,
    /// Refuse candidates carrying $d requirements.
    pub no_distinct: bool,
    /// Use usage-discouraged statements.
    pub overridden: bool,
    /// Skip candidates matching this label pattern.
    pub except: Option<String>,
    /// Skip candidates matching this pattern, and refuse rewrites that newly
    /// depend on an axiom matching it.
    pub forbid: Option<String>,
    /// Refuse rewrites that newly depend on an axiom matching this pattern.
    pub no_new_axioms_from: Option<String>,
}

fn matches_opt(pattern: &Option<String>, label: &str) -> bool {
    pattern.as_deref().map_or(false, |p| label_matches(p, label))
}

/// Axioms the proof depends on, transitively through every referenced
/// statement.
fn proof_axioms(db: &dyn StatementDb, flat: &[StepRef]) -> BTreeSet<StmtId> {
    let mut out = BTreeSet::new();
    for sref in flat {
        if let StepRef::Known(s) = sref {
            out.extend(db.axioms_behind(*s));
        }
    }
    out
}

/// One scan pass: tries every candidate in the given order, keeping each
/// substitution that passes the acceptance tests. Returns the final encoded
/// length and the per-commit report lines.
fn scan_pass(
    db: &dyn StatementDb,
    tools: &Toolbox,
    opts: &MinimizeOptions,
    candidates: &[StmtId],
    proof: &mut ProofInProgress,
    mut len: usize,
) -> (usize, Vec<String>) {
    let proving = proof.proving();
    let axiom_policy = opts.forbid.is_some() || opts.no_new_axioms_from.is_some();
    let mut baseline = proof_axioms(db, &proof.flat());
    let mut messages = Vec::new();
    for &candidate in candidates {
        if !db.kind(candidate).is_assertion()
            || (!opts.include_mathboxes && db.in_other_mathbox(candidate, proving))
            || (db.usage_discouraged(candidate) && !opts.overridden)
            || matches_opt(&opts.except, db.label(candidate))
            || matches_opt(&opts.forbid, db.label(candidate))
        {
            continue;
        }
        let has_distinct = !db.distinct_pairs(candidate).is_empty();
        if opts.no_distinct && has_distinct {
            continue;
        }
        let codec = tools.codec;
        let verifier = tools.verifier;
        let (committed, _) = with_rollback(
            proof,
            |p| tools.replacement.try_substitute(db, p, candidate),
            |p, &changed| {
                if !changed {
                    return false;
                }
                let flat = p.flat();
                if !opts.may_grow && codec.compressed_len(db, &flat) >= len {
                    return false;
                }
                if axiom_policy {
                    let banned = proof_axioms(db, &flat).iter().any(|&a| {
                        !baseline.contains(&a)
                            && (matches_opt(&opts.forbid, db.label(a))
                                || matches_opt(&opts.no_new_axioms_from, db.label(a)))
                    });
                    if banned {
                        return false;
                    }
                }
                // the dry run is what catches $d violations; an unknown step
                // stops verification early, which is not a violation
                if has_distinct {
                    match verifier.dry_run(db, proving, &flat) {
                        Ok(()) | Err(VerifyError::Incomplete) => {}
                        Err(_) => return false,
                    }
                }
                true
            },
        );
        if committed {
            let new_len = codec.compressed_len(db, &proof.flat());
            debug!(
                label = db.label(candidate),
                from = len,
                to = new_len,
                "minimized"
            );
            let verb = if new_len < len { "shortened" } else { "rewritten" };
            messages.push(format!(
                "The proof was {} with '{}' ({} to {} bytes).",
                verb,
                db.label(candidate),
                len,
                new_len
            ));
            len = new_len;
            if axiom_policy {
                baseline = proof_axioms(db, &proof.flat());
            }
        }
    }
    (len, messages)
}

impl ProofSession {
    /// MINIMIZE_WITH: scans candidates matching `pattern` forward and then
    /// backward over statement order, speculatively rewriting matching
    /// subproofs in each pass, and keeps whichever pass yields the smaller
    /// encoding.
    pub fn minimize_with(
        &mut self,
        db: &dyn StatementDb,
        tools: &Toolbox,
        pattern: &str,
        opts: &MinimizeOptions,
    ) -> Result<Outcome, EditError> {
        let candidates = match resolve_label(db, pattern, self.proving()) {
            Ok(c) => c,
            Err(EditError::LabelNotFound(_)) => {
                return Ok(Outcome::message(format!(
                    "No earlier statement matches '{}'.",
                    pattern
                )))
            }
            Err(e) => return Err(e),
        };
        let original = self.proof.clone();
        let len0 = tools.codec.compressed_len(db, &original.flat());

        let mut forward = original.clone();
        let (forward_len, forward_msgs) =
            scan_pass(db, tools, opts, &candidates, &mut forward, len0);
        let reversed: Vec<StmtId> = candidates.iter().rev().copied().collect();
        let mut backward = original.clone();
        let (backward_len, backward_msgs) =
            scan_pass(db, tools, opts, &reversed, &mut backward, len0);

        // smaller encoding wins, then fewer steps, then the forward pass
        let backward_wins = backward_len < forward_len
            || (backward_len == forward_len && backward.len() < forward.len());
        let (chosen, messages) = if backward_wins {
            (backward, backward_msgs)
        } else {
            (forward, forward_msgs)
        };
        if chosen == original {
            return Ok(Outcome::message("The proof was not shortened."));
        }
        self.proof = chosen;
        let mut outcome = Outcome {
            changed: true,
            messages,
        };
        outcome
            .messages
            .extend(tools.unifier.auto_unify(db, &mut self.proof, false));
        self.commit();
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        collab::Verifier,
        db::StatementDb,
        prove::{BasicFloatingProver, BasicReplacement},
        reader,
        session::StepSelector,
        testdb,
        unify::BasicUnifier,
        verify::{BasicCodec, BasicVerifier},
    };

    fn toolbox<'a>(
        unifier: &'a BasicUnifier,
        floating: &'a BasicFloatingProver,
        replacement: &'a BasicReplacement,
        verifier: &'a BasicVerifier,
        codec: &'a BasicCodec,
    ) -> Toolbox<'a> {
        Toolbox {
            unifier,
            floating,
            replacement,
            verifier,
            codec,
        }
    }

    fn id_session() -> (crate::db::MemoryDb, ProofSession) {
        let db = testdb::propositional();
        let (s, _) = ProofSession::start(&db, "id", 20, &BasicUnifier::new(), false).unwrap();
        (db, s)
    }

    #[test]
    fn minimize_shortens_with_a_direct_axiom() {
        let (db, mut s) = id_session();
        let u = BasicUnifier::new();
        let (f, r, v, c) = (
            BasicFloatingProver::new(),
            BasicReplacement::new(),
            BasicVerifier::new(),
            BasicCodec::new(),
        );
        let tools = toolbox(&u, &f, &r, &v, &c);
        let out = s
            .minimize_with(&db, &tools, "ax-id", &MinimizeOptions::default())
            .unwrap();
        assert!(out.changed);
        assert_eq!(s.proof().len(), 2);
        let id = db.by_label("id").unwrap();
        assert_eq!(v.dry_run(&db, id, &s.proof().flat()), Ok(()));
    }

    #[test]
    fn minimize_traces_the_axiom_policy() {
        let (db, mut s) = id_session();
        let u = BasicUnifier::new();
        let (f, r, v, c) = (
            BasicFloatingProver::new(),
            BasicReplacement::new(),
            BasicVerifier::new(),
            BasicCodec::new(),
        );
        let tools = toolbox(&u, &f, &r, &v, &c);
        let before = s.proof().clone();
        // the current proof does not depend on ax-id, so introducing it is
        // exactly what the policy forbids
        let opts = MinimizeOptions {
            no_new_axioms_from: Some("ax-id".to_owned()),
            ..MinimizeOptions::default()
        };
        let out = s.minimize_with(&db, &tools, "ax-id", &opts).unwrap();
        assert!(!out.changed);
        assert_eq!(out.messages, vec!["The proof was not shortened.".to_owned()]);
        assert_eq!(s.proof(), &before);
    }

    // thv proves |- ( ph -> ( ph -> ph ) ) the long way round, so both axd
    // and ax-1 rewrite its root to three steps; axd's $d pair collapses onto
    // ph under that substitution. thw derives |- ( ph -> ph ) from thv's
    // conclusion with the major premise still unknown.
    const DISTINCT_SOURCE: &str = r#"
$c wff |- ( ) -> $.
$v ph ps $.
wph $f wff ph $.
wps $f wff ps $.
wi $a wff ( ph -> ps ) $.
ax-1 $a |- ( ph -> ( ps -> ph ) ) $.
${
  $d ph ps $.
  axd $a |- ( ph -> ( ps -> ph ) ) $.
$}
ax-id $a |- ( ph -> ph ) $.
${
  min $e |- ph $.
  maj $e |- ( ph -> ps ) $.
  ax-mp $a |- ps $.
$}
thv $p |- ( ph -> ( ph -> ph ) ) $=
  wph wph wi wph wph wph wi wi wph ax-id wph wph wi wph ax-1 ax-mp $.
thw $p |- ( ph -> ph ) $=
  wph wph wph wi wi wph wph wi
  wph wph wi wph wph wph wi wi wph ax-id wph wph wi wph ax-1 ax-mp
  ? ax-mp $.
"#;

    #[test]
    fn minimize_rolls_back_distinct_violations() {
        let db = reader::parse_database(DISTINCT_SOURCE).unwrap();
        let u = BasicUnifier::new();
        let (f, r, v, c) = (
            BasicFloatingProver::new(),
            BasicReplacement::new(),
            BasicVerifier::new(),
            BasicCodec::new(),
        );
        let tools = toolbox(&u, &f, &r, &v, &c);
        let (mut s, _) = ProofSession::start(&db, "thv", 20, &u, false).unwrap();
        assert_eq!(s.proof().len(), 16);
        let before = s.proof().clone();
        let depth = s.undo_depth();
        // the substitution itself shrinks the proof to three steps, so only
        // the dry run can refuse it
        let out = s
            .minimize_with(&db, &tools, "axd", &MinimizeOptions::default())
            .unwrap();
        assert!(!out.changed);
        assert_eq!(out.messages, vec!["The proof was not shortened.".to_owned()]);
        assert_eq!(s.proof(), &before);
        assert_eq!(s.undo_depth(), depth);
        // same shape without the $d pair goes through
        let out = s
            .minimize_with(&db, &tools, "ax-1", &MinimizeOptions::default())
            .unwrap();
        assert!(out.changed);
        assert_eq!(s.proof().len(), 3);
        let thv = db.by_label("thv").unwrap();
        assert_eq!(v.dry_run(&db, thv, &s.proof().flat()), Ok(()));
    }

    #[test]
    fn minimize_rejects_distinct_violations_on_incomplete_proofs() {
        let db = reader::parse_database(DISTINCT_SOURCE).unwrap();
        let u = BasicUnifier::new();
        let (f, r, v, c) = (
            BasicFloatingProver::new(),
            BasicReplacement::new(),
            BasicVerifier::new(),
            BasicCodec::new(),
        );
        let tools = toolbox(&u, &f, &r, &v, &c);
        let (mut s, _) = ProofSession::start(&db, "thw", 20, &u, false).unwrap();
        // step 24 concludes thv's formula; override it so the minimizer sees
        // a rewrite site while the major premise is still unknown
        s.let_step(
            &db,
            &u,
            StepSelector::Absolute(24),
            "|- ( ph -> ( ph -> ph ) )",
        )
        .unwrap();
        let before = s.proof().clone();
        let out = s
            .minimize_with(&db, &tools, "axd", &MinimizeOptions::default())
            .unwrap();
        assert!(!out.changed);
        assert_eq!(s.proof(), &before);
        let flat = s.proof().flat();
        let axd = db.by_label("axd").unwrap();
        assert!(!flat.contains(&StepRef::Known(axd)));
    }

    #[test]
    fn minimize_honors_forbid_and_except_patterns() {
        let (db, mut s) = id_session();
        let u = BasicUnifier::new();
        let (f, r, v, c) = (
            BasicFloatingProver::new(),
            BasicReplacement::new(),
            BasicVerifier::new(),
            BasicCodec::new(),
        );
        let tools = toolbox(&u, &f, &r, &v, &c);
        let opts = MinimizeOptions {
            forbid: Some("ax-id".to_owned()),
            ..MinimizeOptions::default()
        };
        assert!(!s.minimize_with(&db, &tools, "ax-id", &opts).unwrap().changed);
        let opts = MinimizeOptions {
            except: Some("ax-*".to_owned()),
            ..MinimizeOptions::default()
        };
        assert!(!s.minimize_with(&db, &tools, "ax-id", &opts).unwrap().changed);
    }

    #[test]
    fn minimize_reports_unmatched_patterns() {
        let (db, mut s) = id_session();
        let u = BasicUnifier::new();
        let (f, r, v, c) = (
            BasicFloatingProver::new(),
            BasicReplacement::new(),
            BasicVerifier::new(),
            BasicCodec::new(),
        );
        let tools = toolbox(&u, &f, &r, &v, &c);
        let out = s
            .minimize_with(&db, &tools, "nosuch*", &MinimizeOptions::default())
            .unwrap();
        assert!(!out.changed);
        assert_eq!(
            out.messages,
            vec!["No earlier statement matches 'nosuch*'.".to_owned()]
        );
    }
}
