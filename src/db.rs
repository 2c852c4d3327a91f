use std::collections::HashMap;

use crate::{error::EditError, formula::Formula, store::StepRef, types::*};

/// What kind of statement a database entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtKind {
    /// A floating ($f) hypothesis, asserting a variable's syntactic type.
    Floating,
    /// An essential ($e) hypothesis.
    Essential,
    /// An axiomatic assertion ($a).
    Axiom,
    /// A provable assertion ($p).
    Provable,
}

impl StmtKind {
    pub fn is_hypothesis(&self) -> bool {
        matches!(self, StmtKind::Floating | StmtKind::Essential)
    }

    pub fn is_assertion(&self) -> bool {
        matches!(self, StmtKind::Axiom | StmtKind::Provable)
    }
}

/// Read-only view of the statement database consumed by the editing engine.
///
/// The engine only ever reads: label lookup, frames, $d pairs, policy flags
/// and stored proofs. Nothing in the core mutates the database; the $d dry
/// run's slot swap is the [`Verifier`][crate::Verifier] implementor's concern.
pub trait StatementDb {
    /// Number of statements, in database order.
    fn stmt_count(&self) -> usize;
    fn kind(&self, stmt: StmtId) -> StmtKind;
    fn label(&self, stmt: StmtId) -> &str;
    fn by_label(&self, label: &str) -> Option<StmtId>;
    /// The statement's formula ($f/$e/$a/$p math string).
    fn assertion(&self, stmt: StmtId) -> &Formula;
    /// Mandatory hypotheses of an assertion, in frame order ($f and $e
    /// interleaved in database order). Empty for hypotheses.
    fn hypotheses(&self, stmt: StmtId) -> &[StmtId];
    /// Variables substitutable in the statement's frame: the variables of its
    /// mandatory $f hypotheses, in frame order.
    fn frame_vars(&self, stmt: StmtId) -> &[Symbol];
    /// Mandatory disjoint-variable pairs of the statement's frame.
    fn distinct_pairs(&self, stmt: StmtId) -> &[(Symbol, Symbol)];
    fn is_variable(&self, symbol: Symbol) -> bool;
    /// True for typecodes that appear in $f hypotheses (wff, class, ...).
    fn is_floating_typecode(&self, symbol: Symbol) -> bool;
    fn symbol_name(&self, symbol: Symbol) -> &str;
    fn symbol(&self, name: &str) -> Option<Symbol>;
    fn usage_discouraged(&self, stmt: StmtId) -> bool;
    fn proof_discouraged(&self, stmt: StmtId) -> bool;
    /// True if `stmt` lives in a mathbox other than the one `proving`
    /// belongs to.
    fn in_other_mathbox(&self, stmt: StmtId, proving: StmtId) -> bool;
    /// The stored (possibly incomplete) proof of a provable statement.
    fn stored_proof(&self, stmt: StmtId) -> Option<&[StepRef]>;

    /// Axioms the statement's stored proof depends on, transitively.
    /// Assertions without a stored proof count as depending on themselves
    /// only if they are axioms.
    fn axioms_behind(&self, stmt: StmtId) -> Vec<StmtId> {
        let mut out = Vec::new();
        let mut todo = vec![stmt];
        let mut seen = vec![false; self.stmt_count()];
        while let Some(s) = todo.pop() {
            if seen[s] {
                continue;
            }
            seen[s] = true;
            match self.kind(s) {
                StmtKind::Axiom => out.push(s),
                StmtKind::Provable => {
                    if let Some(proof) = self.stored_proof(s) {
                        for step in proof {
                            if let StepRef::Known(t) = step {
                                todo.push(*t);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        out.sort_unstable();
        out
    }

    /// Renders a formula with database symbol names; work variables render as
    /// `$1`, `$2`, ...
    fn format_formula(&self, formula: &Formula) -> String {
        let mut out = String::new();
        for &symb in formula.symbols() {
            if !out.is_empty() {
                out.push(' ');
            }
            if is_work_var(symb) {
                out.push_str(&work_var_name(symb));
            } else {
                out.push_str(self.symbol_name(symb));
            }
        }
        out
    }

    /// Parses a user-typed formula: whitespace-separated symbol names, with
    /// `$n` naming work variables.
    fn parse_formula(&self, text: &str) -> Result<Formula, EditError> {
        let mut symbols = Vec::new();
        for token in text.split_whitespace() {
            if let Some(digits) = token.strip_prefix('$') {
                let n: u32 = digits
                    .parse()
                    .map_err(|_| EditError::Syntax(format!("bad work variable '{}'", token)))?;
                if n == 0 {
                    return Err(EditError::Syntax(format!("bad work variable '{}'", token)));
                }
                symbols.push(work_var(n - 1));
            } else {
                let symb = self
                    .symbol(token)
                    .ok_or_else(|| EditError::Syntax(format!("unknown symbol '{}'", token)))?;
                symbols.push(symb);
            }
        }
        if symbols.is_empty() {
            return Err(EditError::Syntax("empty formula".to_owned()));
        }
        Ok(Formula::new(symbols))
    }
}

/// Tests a label against a wildcard pattern (`*` matches any run, `?` any one
/// character).
///
/// # Example
/// ```
/// use mmpa::label_matches;
///
/// assert!(label_matches("ax-*", "ax-mp"));
/// assert!(label_matches("id?", "idi"));
/// assert!(!label_matches("ax-*", "mp2"));
/// ```
pub fn label_matches(pattern: &str, label: &str) -> bool {
    fn go(p: &[u8], l: &[u8]) -> bool {
        match (p.first(), l.first()) {
            (None, None) => true,
            (Some(b'*'), _) => go(&p[1..], l) || (!l.is_empty() && go(p, &l[1..])),
            (Some(b'?'), Some(_)) => go(&p[1..], &l[1..]),
            (Some(c), Some(d)) if c == d => go(&p[1..], &l[1..]),
            _ => false,
        }
    }
    go(pattern.as_bytes(), label.as_bytes())
}

/// Whether a pattern contains wildcard characters.
pub fn has_wildcards(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// One statement of a [`MemoryDb`].
#[derive(Debug, Clone)]
pub struct StatementData {
    pub label: String,
    pub kind: StmtKind,
    pub assertion: Formula,
    pub hypotheses: Vec<StmtId>,
    pub frame_vars: Vec<Symbol>,
    pub distinct: Vec<(Symbol, Symbol)>,
    pub proof: Option<Vec<StepRef>>,
    pub usage_discouraged: bool,
    pub proof_discouraged: bool,
    pub mathbox: Option<usize>,
}

/// An in-memory statement database, normally built by the
/// [`reader`][crate::reader] from Metamath source text.
#[derive(Debug, Default)]
pub struct MemoryDb {
    symbols: Vec<String>,
    by_symbol: HashMap<String, Symbol>,
    variables: Vec<bool>,
    floating_typecodes: Vec<bool>,
    statements: Vec<StatementData>,
    by_label: HashMap<String, StmtId>,
    mathboxes: Vec<String>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a symbol name, returning its id.
    pub fn intern_symbol(&mut self, name: &str, is_variable: bool) -> Symbol {
        if let Some(&symb) = self.by_symbol.get(name) {
            return symb;
        }
        let symb = self.symbols.len() as Symbol;
        self.symbols.push(name.to_owned());
        self.variables.push(is_variable);
        self.floating_typecodes.push(false);
        self.by_symbol.insert(name.to_owned(), symb);
        symb
    }

    pub fn mark_floating_typecode(&mut self, symbol: Symbol) {
        self.floating_typecodes[symbol as usize] = true;
    }

    pub fn open_mathbox(&mut self, name: &str) -> usize {
        self.mathboxes.push(name.to_owned());
        self.mathboxes.len() - 1
    }

    pub fn push_statement(&mut self, data: StatementData) -> Result<StmtId, EditError> {
        if self.by_label.contains_key(&data.label) {
            return Err(EditError::Syntax(format!(
                "duplicate label '{}'",
                data.label
            )));
        }
        let id = self.statements.len();
        self.by_label.insert(data.label.clone(), id);
        self.statements.push(data);
        Ok(id)
    }

    pub fn statement(&self, stmt: StmtId) -> &StatementData {
        &self.statements[stmt]
    }

    pub fn statement_mut(&mut self, stmt: StmtId) -> &mut StatementData {
        &mut self.statements[stmt]
    }
}

impl StatementDb for MemoryDb {
    fn stmt_count(&self) -> usize {
        self.statements.len()
    }

    fn kind(&self, stmt: StmtId) -> StmtKind {
        self.statements[stmt].kind
    }

    fn label(&self, stmt: StmtId) -> &str {
        &self.statements[stmt].label
    }

    fn by_label(&self, label: &str) -> Option<StmtId> {
        self.by_label.get(label).copied()
    }

    fn assertion(&self, stmt: StmtId) -> &Formula {
        &self.statements[stmt].assertion
    }

    fn hypotheses(&self, stmt: StmtId) -> &[StmtId] {
        &self.statements[stmt].hypotheses
    }

    fn frame_vars(&self, stmt: StmtId) -> &[Symbol] {
        &self.statements[stmt].frame_vars
    }

    fn distinct_pairs(&self, stmt: StmtId) -> &[(Symbol, Symbol)] {
        &self.statements[stmt].distinct
    }

    fn is_variable(&self, symbol: Symbol) -> bool {
        !is_work_var(symbol) && self.variables[symbol as usize]
    }

    fn is_floating_typecode(&self, symbol: Symbol) -> bool {
        !is_work_var(symbol) && self.floating_typecodes[symbol as usize]
    }

    fn symbol_name(&self, symbol: Symbol) -> &str {
        &self.symbols[symbol as usize]
    }

    fn symbol(&self, name: &str) -> Option<Symbol> {
        self.by_symbol.get(name).copied()
    }

    fn usage_discouraged(&self, stmt: StmtId) -> bool {
        self.statements[stmt].usage_discouraged
    }

    fn proof_discouraged(&self, stmt: StmtId) -> bool {
        self.statements[stmt].proof_discouraged
    }

    fn in_other_mathbox(&self, stmt: StmtId, proving: StmtId) -> bool {
        match self.statements[stmt].mathbox {
            None => false,
            Some(mb) => self.statements[proving].mathbox != Some(mb),
        }
    }

    fn stored_proof(&self, stmt: StmtId) -> Option<&[StepRef]> {
        self.statements[stmt].proof.as_deref()
    }
}

/// Resolves a label pattern against the database, restricted to statements
/// usable while proving `proving`: assertions earlier in the database order,
/// and hypotheses only from the proved statement's own frame.
pub fn resolve_label(
    db: &dyn StatementDb,
    pattern: &str,
    proving: StmtId,
) -> Result<Vec<StmtId>, EditError> {
    let mut out = Vec::new();
    for stmt in 0..db.stmt_count() {
        if !label_matches(pattern, db.label(stmt)) {
            continue;
        }
        let usable = match db.kind(stmt) {
            k if k.is_hypothesis() => db.hypotheses(proving).contains(&stmt),
            _ => stmt < proving,
        };
        if usable {
            out.push(stmt);
        }
    }
    if out.is_empty() {
        return Err(EditError::LabelNotFound(pattern.to_owned()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use quickcheck::quickcheck;

    use super::*;

    #[test]
    fn wildcard_matching() {
        assert!(label_matches("*", "anything"));
        assert!(label_matches("a?c", "abc"));
        assert!(!label_matches("a?c", "ac"));
        assert!(label_matches("ax-1", "ax-1"));
        assert!(!label_matches("ax-1", "ax-12"));
        assert!(label_matches("*mp*", "ax-mp"));
    }

    #[test]
    fn parse_formula_work_vars() {
        let mut db = MemoryDb::new();
        let wff = db.intern_symbol("wff", false);
        let ph = db.intern_symbol("ph", true);
        let f = db.parse_formula("wff ph $2").unwrap();
        assert_eq!(f.symbols(), &[wff, ph, work_var(1)]);
        assert!(db.parse_formula("wff nope").is_err());
        assert!(db.parse_formula("   ").is_err());
    }

    quickcheck! {
        fn star_matches_every_label(label: String) -> bool {
            label_matches("*", &label)
        }

        fn wildcard_free_labels_match_themselves(label: String) -> bool {
            has_wildcards(&label) || label_matches(&label, &label)
        }
    }
}
