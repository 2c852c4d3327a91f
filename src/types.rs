/// Type alias for a math symbol. Non-negative ids name symbols declared in the
/// [`StatementDb`][crate::StatementDb]; negative ids are work variables (see
/// [`work_var`]).
pub type Symbol = i32;

/// Type alias for a statement's position in the database order.
pub type StmtId = usize;

/// Tests whether the given symbol is a work (dummy) variable
///
/// # Example
/// ```
/// use mmpa::{is_work_var, work_var};
///
/// assert!(is_work_var(work_var(0)));
/// assert!(!is_work_var(3));
/// ```
pub fn is_work_var(symbol: Symbol) -> bool {
    symbol < 0
}

/// The work variable with the given pool index. Work variables are rendered
/// `$1`, `$2`, ... in user-facing output, numbered from index `0`.
pub fn work_var(index: u32) -> Symbol {
    -(index as Symbol) - 1
}

/// The pool index of a work variable
///
/// # Panics
/// Panics if `symbol` is not a work variable.
pub fn work_var_index(symbol: Symbol) -> u32 {
    assert!(is_work_var(symbol), "{} is not a work variable", symbol);
    (-symbol - 1) as u32
}

/// User-facing name of a work variable (`$1` for pool index 0)
pub fn work_var_name(symbol: Symbol) -> String {
    format!("${}", work_var_index(symbol) + 1)
}
