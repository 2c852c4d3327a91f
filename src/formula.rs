use crate::types::*;

/// An owned, flat symbol sequence: the unit stored in the proof store's
/// `target`, `source` and `user` columns.
///
/// Unlike the statement database's grammar, the editing engine never needs to
/// know a formula's parse tree; every operation here works on token spans.
/// The first symbol of a well-formed formula is its typecode constant.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Formula {
    symbols: Vec<Symbol>,
}

impl Formula {
    pub fn new(symbols: Vec<Symbol>) -> Self {
        Formula { symbols }
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The leading typecode constant, if the formula is non-empty.
    pub fn typecode(&self) -> Option<Symbol> {
        self.symbols.first().copied()
    }

    /// Tests whether any work variable occurs in this formula
    ///
    /// # Example
    /// ```
    /// use mmpa::{Formula, work_var};
    ///
    /// assert!(Formula::new(vec![0, work_var(0)]).has_work_vars());
    /// assert!(!Formula::new(vec![0, 1, 2]).has_work_vars());
    /// ```
    pub fn has_work_vars(&self) -> bool {
        self.symbols.iter().any(|&s| is_work_var(s))
    }

    /// All work variables occurring in this formula, in order of appearance.
    pub fn work_vars<'a>(&'a self) -> impl Iterator<Item = Symbol> + 'a {
        self.symbols.iter().copied().filter(|&s| is_work_var(s))
    }

    /// Creates a new formula with every bound work variable replaced by its
    /// binding. Unbound work variables are kept.
    pub fn apply(&self, binds: &WorkSubst) -> Formula {
        let mut out = Vec::with_capacity(self.symbols.len());
        for &symb in self.symbols.iter() {
            match binds.get(symb) {
                Some(expr) => out.extend_from_slice(expr.symbols()),
                None => out.push(symb),
            }
        }
        Formula { symbols: out }
    }
}

impl From<Vec<Symbol>> for Formula {
    fn from(symbols: Vec<Symbol>) -> Self {
        Formula { symbols }
    }
}

impl From<&[Symbol]> for Formula {
    fn from(symbols: &[Symbol]) -> Self {
        Formula {
            symbols: symbols.to_vec(),
        }
    }
}

/// A substitution for work variables, keyed by pool index.
///
/// This is the value propagated across the whole proof when unification pins
/// down a work variable; see
/// [`ProofInProgress::apply_work_subst`][crate::ProofInProgress::apply_work_subst].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkSubst {
    substitution: Vec<Option<Formula>>,
}

impl WorkSubst {
    pub fn new() -> Self {
        WorkSubst {
            substitution: Vec::new(),
        }
    }

    /// Marks `symbol` (a work variable) to be substituted by `expr`.
    ///
    /// # Panics
    /// Panics if `symbol` is not a work variable.
    pub fn insert(&mut self, symbol: Symbol, expr: Formula) {
        let index = work_var_index(symbol) as usize;
        if index >= self.substitution.len() {
            self.substitution.resize(index + 1, None);
        }
        self.substitution[index] = Some(expr);
    }

    pub fn get(&self, symbol: Symbol) -> Option<&Formula> {
        if !is_work_var(symbol) {
            return None;
        }
        self.substitution
            .get(work_var_index(symbol) as usize)
            .and_then(|e| e.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.substitution.iter().all(|e| e.is_none())
    }
}
