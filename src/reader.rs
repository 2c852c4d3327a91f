//! Reader for the subset of the Metamath source format the editor needs:
//! `$c $v $f $e $d $a $p ${ $}`, uncompressed proofs with `?` placeholders,
//! and the comment markup for discouragement tags and mathboxes.

use std::fmt::Display;

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until, take_while1},
    combinator::{eof, map, verify},
    error::{context, ContextError, ErrorKind, ParseError},
    multi::{many0, many1, many_till},
    sequence::{delimited, tuple},
    IResult, Parser,
};
use tracing::debug;

use crate::{
    db::{MemoryDb, StatementData, StatementDb, StmtKind},
    error::EditError,
    formula::Formula,
    store::StepRef,
    types::*,
};

/// A nom error that keeps the deepest (most input consumed) branch of an
/// `alt`, with its context chain.
#[derive(Debug)]
pub struct GreedyError<I>(Vec<(I, GreedyErrorKind)>);

#[derive(Debug)]
enum GreedyErrorKind {
    Context(&'static str),
    Nom(ErrorKind),
    Char(char),
}

pub trait Length {
    fn length(&self) -> usize;
}

impl Length for &str {
    fn length(&self) -> usize {
        self.len()
    }
}

impl Display for GreedyError<&str> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (input, error) in self.0.iter() {
            writeln!(f, "{:?} at {:?}", error, &input[..input.len().min(20)])?;
        }
        Ok(())
    }
}

impl<I> ParseError<I> for GreedyError<I>
where
    I: Length,
{
    fn from_error_kind(input: I, kind: ErrorKind) -> Self {
        Self(vec![(input, GreedyErrorKind::Nom(kind))])
    }

    fn append(input: I, kind: ErrorKind, mut other: Self) -> Self {
        other.0.push((input, GreedyErrorKind::Nom(kind)));
        other
    }

    fn from_char(input: I, c: char) -> Self {
        Self(vec![(input, GreedyErrorKind::Char(c))])
    }

    fn or(self, other: Self) -> Self {
        if self.0[0].0.length() < other.0[0].0.length() {
            self
        } else {
            other
        }
    }
}

impl<I> ContextError<I> for GreedyError<I> {
    fn add_context(input: I, ctx: &'static str, mut other: Self) -> Self {
        other.0.push((input, GreedyErrorKind::Context(ctx)));
        other
    }
}

/// Turns a recoverable parse error into a failure, cutting `alt` backtracking.
pub fn or_fail<I, O, E: ParseError<I>, F>(mut f: F) -> impl FnMut(I) -> IResult<I, O, E>
where
    F: Parser<I, O, E>,
{
    move |input| {
        f.parse(input).map_err(|error| match error {
            nom::Err::Error(e) => nom::Err::Failure(e),
            e => e,
        })
    }
}

#[derive(Debug)]
enum Item<'a> {
    Comment(&'a str),
    Constants(Vec<&'a str>),
    Variables(Vec<&'a str>),
    Floating {
        label: &'a str,
        typecode: &'a str,
        variable: &'a str,
    },
    Essential {
        label: &'a str,
        expression: Vec<&'a str>,
    },
    Distinct(Vec<&'a str>),
    Axiom {
        label: &'a str,
        expression: Vec<&'a str>,
    },
    Provable {
        label: &'a str,
        expression: Vec<&'a str>,
        proof: Vec<Option<&'a str>>,
    },
    Scope(Vec<Item<'a>>),
}

fn mm_whitespace(c: char) -> bool {
    c == '\t' || c == '\n' || c == '\r' || c == '\x0c' || c == ' '
}

fn mm_mathsymbol(c: char) -> bool {
    ('!'..='~').contains(&c) && c != '$'
}

fn mm_label(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_'
}

fn whitespace(input: &str) -> IResult<&str, (), GreedyError<&str>> {
    let (input, _) = context("whitespace", take_while1(mm_whitespace))(input)?;
    Ok((input, ()))
}

fn mathsymbol(input: &str) -> IResult<&str, &str, GreedyError<&str>> {
    context("mathsymbol", take_while1(mm_mathsymbol))(input)
}

fn label(input: &str) -> IResult<&str, &str, GreedyError<&str>> {
    context("label", take_while1(mm_label))(input)
}

fn comment(input: &str) -> IResult<&str, &str, GreedyError<&str>> {
    verify(
        delimited(tag("$("), take_until("$)"), tag("$)")),
        |comment: &str| !comment.contains("$("),
    )(input)
}

fn constants(input: &str) -> IResult<&str, Item, GreedyError<&str>> {
    let (input, _) = tag("$c")(input)?;
    let (input, _) = whitespace(input)?;
    let (input, names) = many1(map(tuple((mathsymbol, whitespace)), |(name, _)| name))(input)?;
    let (input, _) = tag("$.")(input)?;
    Ok((input, Item::Constants(names)))
}

fn variables(input: &str) -> IResult<&str, Item, GreedyError<&str>> {
    let (input, _) = tag("$v")(input)?;
    let (input, _) = whitespace(input)?;
    let (input, names) = many1(map(tuple((mathsymbol, whitespace)), |(name, _)| name))(input)?;
    let (input, _) = tag("$.")(input)?;
    Ok((input, Item::Variables(names)))
}

fn floating(input: &str) -> IResult<&str, Item, GreedyError<&str>> {
    let (input, l) = label(input)?;
    let (input, _) = whitespace(input)?;
    let (input, _) = tag("$f")(input)?;
    let (input, _) = whitespace(input)?;
    let (input, typecode) = mathsymbol(input)?;
    let (input, _) = whitespace(input)?;
    let (input, variable) = mathsymbol(input)?;
    let (input, _) = whitespace(input)?;
    let (input, _) = tag("$.")(input)?;
    Ok((
        input,
        Item::Floating {
            label: l,
            typecode,
            variable,
        },
    ))
}

fn essential(input: &str) -> IResult<&str, Item, GreedyError<&str>> {
    let (input, l) = label(input)?;
    let (input, _) = whitespace(input)?;
    let (input, _) = tag("$e")(input)?;
    let (input, _) = whitespace(input)?;
    let (input, expression) = many1(map(tuple((mathsymbol, whitespace)), |(s, _)| s))(input)?;
    let (input, _) = tag("$.")(input)?;
    Ok((
        input,
        Item::Essential {
            label: l,
            expression,
        },
    ))
}

fn distinct(input: &str) -> IResult<&str, Item, GreedyError<&str>> {
    let (input, _) = tag("$d")(input)?;
    let (input, _) = whitespace(input)?;
    let (input, vars) = many1(map(tuple((mathsymbol, whitespace)), |(s, _)| s))(input)?;
    let (input, _) = tag("$.")(input)?;
    Ok((input, Item::Distinct(vars)))
}

fn axiom(input: &str) -> IResult<&str, Item, GreedyError<&str>> {
    let (input, l) = label(input)?;
    let (input, _) = whitespace(input)?;
    let (input, _) = tag("$a")(input)?;
    let (input, _) = whitespace(input)?;
    let (input, expression) = many1(map(tuple((mathsymbol, whitespace)), |(s, _)| s))(input)?;
    let (input, _) = tag("$.")(input)?;
    Ok((
        input,
        Item::Axiom {
            label: l,
            expression,
        },
    ))
}

fn proof_step(input: &str) -> IResult<&str, Option<&str>, GreedyError<&str>> {
    alt((map(tag("?"), |_| None), map(label, Some)))(input)
}

fn provable(input: &str) -> IResult<&str, Item, GreedyError<&str>> {
    let (input, l) = label(input)?;
    let (input, _) = whitespace(input)?;
    let (input, _) = tag("$p")(input)?;
    let (input, _) = whitespace(input)?;
    let (input, expression) = many1(map(tuple((mathsymbol, whitespace)), |(s, _)| s))(input)?;
    let (input, _) = tag("$=")(input)?;
    let (input, _) = whitespace(input)?;
    let (input, proof) = many1(map(tuple((proof_step, whitespace)), |(s, _)| s))(input)?;
    let (input, _) = tag("$.")(input)?;
    Ok((
        input,
        Item::Provable {
            label: l,
            expression,
            proof,
        },
    ))
}

fn scope(input: &str) -> IResult<&str, Item, GreedyError<&str>> {
    let (input, _) = tag("${")(input)?;
    let (input, _) = whitespace(input)?;
    let (input, (items, _)) =
        many_till(map(tuple((item, whitespace)), |(i, _)| i), tag("$}"))(input)?;
    Ok((input, Item::Scope(items)))
}

fn item(input: &str) -> IResult<&str, Item, GreedyError<&str>> {
    alt((
        context("comment", map(comment, Item::Comment)),
        context("constants", constants),
        context("variables", variables),
        context("distinct", distinct),
        context("floating", floating),
        context("essential", essential),
        context("axiom", axiom),
        context("provable", provable),
        context("scope", scope),
    ))(input)
}

fn parse_items(input: &str) -> IResult<&str, Vec<Item>, GreedyError<&str>> {
    let (input, _) = many0(whitespace)(input)?;
    let (input, (items, _)) =
        many_till(map(tuple((item, whitespace)), |(i, _)| i), eof)(input)?;
    Ok((input, items))
}

/// Active hypotheses, distinct-variable pairs and the pending comment markup
/// while walking the scope tree.
#[derive(Default)]
struct Builder {
    db: MemoryDb,
    depth: usize,
    hypotheses: Vec<(usize, StmtId)>,
    distincts: Vec<(usize, Symbol, Symbol)>,
    usage_discouraged: bool,
    proof_discouraged: bool,
    mathbox: Option<usize>,
}

impl Builder {
    fn build(mut self, items: Vec<Item>) -> Result<MemoryDb, EditError> {
        self.items(items)?;
        debug!(statements = self.db.stmt_count(), "database loaded");
        Ok(self.db)
    }

    fn items(&mut self, items: Vec<Item>) -> Result<(), EditError> {
        for item in items {
            match item {
                Item::Comment(text) => self.comment(text),
                Item::Constants(names) => {
                    for name in names {
                        self.db.intern_symbol(name, false);
                    }
                }
                Item::Variables(names) => {
                    for name in names {
                        self.db.intern_symbol(name, true);
                    }
                }
                Item::Floating {
                    label,
                    typecode,
                    variable,
                } => {
                    let tc = self.symbol(typecode)?;
                    let var = self.symbol(variable)?;
                    if !self.db.is_variable(var) {
                        return Err(EditError::Syntax(format!(
                            "'{}' in $f '{}' is not a variable",
                            variable, label
                        )));
                    }
                    self.db.mark_floating_typecode(tc);
                    let id = self.db.push_statement(StatementData {
                        label: label.to_owned(),
                        kind: StmtKind::Floating,
                        assertion: Formula::new(vec![tc, var]),
                        hypotheses: Vec::new(),
                        frame_vars: Vec::new(),
                        distinct: Vec::new(),
                        proof: None,
                        usage_discouraged: false,
                        proof_discouraged: false,
                        mathbox: self.mathbox,
                    })?;
                    self.hypotheses.push((self.depth, id));
                }
                Item::Essential { label, expression } => {
                    let assertion = self.formula(&expression)?;
                    let id = self.db.push_statement(StatementData {
                        label: label.to_owned(),
                        kind: StmtKind::Essential,
                        assertion,
                        hypotheses: Vec::new(),
                        frame_vars: Vec::new(),
                        distinct: Vec::new(),
                        proof: None,
                        usage_discouraged: false,
                        proof_discouraged: false,
                        mathbox: self.mathbox,
                    })?;
                    self.hypotheses.push((self.depth, id));
                }
                Item::Distinct(vars) => {
                    let vars: Vec<Symbol> =
                        vars.iter().map(|v| self.symbol(v)).collect::<Result<_, _>>()?;
                    for i in 0..vars.len() {
                        for j in i + 1..vars.len() {
                            self.distincts.push((self.depth, vars[i], vars[j]));
                        }
                    }
                }
                Item::Axiom { label, expression } => {
                    self.assertion(label, &expression, StmtKind::Axiom, None)?;
                }
                Item::Provable {
                    label,
                    expression,
                    proof,
                } => {
                    let steps = proof
                        .iter()
                        .map(|s| match s {
                            None => Ok(StepRef::Unknown),
                            Some(l) => self
                                .db
                                .by_label(l)
                                .map(StepRef::Known)
                                .ok_or_else(|| EditError::LabelNotFound((*l).to_owned())),
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    self.assertion(label, &expression, StmtKind::Provable, Some(steps))?;
                }
                Item::Scope(inner) => {
                    self.depth += 1;
                    self.items(inner)?;
                    self.depth -= 1;
                    self.hypotheses.retain(|(d, _)| *d <= self.depth);
                    self.distincts.retain(|(d, ..)| *d <= self.depth);
                }
            }
        }
        Ok(())
    }

    fn comment(&mut self, text: &str) {
        if text.contains("(New usage is discouraged.)") {
            self.usage_discouraged = true;
        }
        if text.contains("(Proof modification is discouraged.)") {
            self.proof_discouraged = true;
        }
        if let Some(rest) = text.split("Mathbox for ").nth(1) {
            let name = rest
                .split(|c| c == '.' || c == '\n')
                .next()
                .unwrap_or("")
                .trim();
            self.mathbox = Some(self.db.open_mathbox(name));
        }
    }

    fn symbol(&self, name: &str) -> Result<Symbol, EditError> {
        self.db
            .symbol(name)
            .ok_or_else(|| EditError::Syntax(format!("undeclared symbol '{}'", name)))
    }

    fn formula(&self, tokens: &[&str]) -> Result<Formula, EditError> {
        let symbols = tokens
            .iter()
            .map(|t| self.symbol(t))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Formula::new(symbols))
    }

    /// Pushes an assertion with its mandatory frame: every active $e, plus
    /// every active $f whose variable occurs in the assertion or in an
    /// active $e, all in declaration order.
    fn assertion(
        &mut self,
        label: &str,
        expression: &[&str],
        kind: StmtKind,
        proof: Option<Vec<StepRef>>,
    ) -> Result<(), EditError> {
        let assertion = self.formula(expression)?;
        let mut needed: Vec<Symbol> = assertion
            .symbols()
            .iter()
            .copied()
            .filter(|&s| self.db.is_variable(s))
            .collect();
        for &(_, h) in self.hypotheses.iter() {
            if self.db.kind(h) == StmtKind::Essential {
                needed.extend(
                    self.db
                        .assertion(h)
                        .symbols()
                        .iter()
                        .copied()
                        .filter(|&s| self.db.is_variable(s)),
                );
            }
        }
        let mut hypotheses = Vec::new();
        let mut frame_vars = Vec::new();
        for &(_, h) in self.hypotheses.iter() {
            match self.db.kind(h) {
                StmtKind::Essential => hypotheses.push(h),
                StmtKind::Floating => {
                    let var = self.db.assertion(h).symbols()[1];
                    if needed.contains(&var) {
                        hypotheses.push(h);
                        frame_vars.push(var);
                    }
                }
                _ => {}
            }
        }
        let mut distinct: Vec<(Symbol, Symbol)> = self
            .distincts
            .iter()
            .filter(|(_, a, b)| frame_vars.contains(a) && frame_vars.contains(b))
            .map(|&(_, a, b)| if a <= b { (a, b) } else { (b, a) })
            .collect();
        distinct.sort_unstable();
        distinct.dedup();
        self.db.push_statement(StatementData {
            label: label.to_owned(),
            kind,
            assertion,
            hypotheses,
            frame_vars,
            distinct,
            proof,
            usage_discouraged: std::mem::take(&mut self.usage_discouraged),
            proof_discouraged: std::mem::take(&mut self.proof_discouraged),
            mathbox: self.mathbox,
        })?;
        Ok(())
    }
}

/// Parses Metamath source text into an in-memory statement database.
pub fn parse_database(text: &str) -> Result<MemoryDb, EditError> {
    let items = match parse_items(text) {
        Ok((_, items)) => items,
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            return Err(EditError::Syntax(format!("{}", e)))
        }
        Err(nom::Err::Incomplete(_)) => {
            return Err(EditError::Syntax("unexpected end of input".to_owned()))
        }
    };
    Builder::default().build(items)
}

/// Reads and parses a Metamath database file.
pub fn load_database(path: &std::path::Path) -> Result<MemoryDb, EditError> {
    let text = std::fs::read_to_string(path).map_err(|e| EditError::Io(e.to_string()))?;
    parse_database(&text)
}
