//! Parser and dispatcher for the Proof Assistant command language.

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::{char, digit1, one_of, space0, space1},
    combinator::{all_consuming, map, map_opt, rest, verify},
    error::context,
    multi::many0,
    sequence::{preceded, terminated, tuple},
    IResult,
};

use crate::{
    collab::Toolbox,
    db::StatementDb,
    error::EditError,
    improve::ImproveOptions,
    minimize::MinimizeOptions,
    reader::{or_fail, GreedyError},
    session::{Outcome, ProofSession, StepSelector},
    structural::{DeleteTarget, InitializeTarget},
};

/// A parsed Proof Assistant command.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Command {
    Assign {
        selector: StepSelector,
        label: String,
        overridden: bool,
    },
    Replace {
        selector: StepSelector,
        label: String,
        overridden: bool,
    },
    LetStep {
        selector: StepSelector,
        formula: String,
    },
    LetVariable {
        variable: String,
        formula: String,
    },
    Unify {
        selector: Option<StepSelector>,
    },
    Match {
        selector: StepSelector,
    },
    ImproveStep {
        selector: StepSelector,
        options: ImproveOptions,
    },
    ImproveAll {
        options: ImproveOptions,
    },
    MinimizeWith {
        pattern: String,
        options: MinimizeOptions,
    },
    Expand {
        pattern: String,
    },
    Delete {
        selector: Option<StepSelector>,
        target: DeleteTarget,
    },
    Initialize(InitializeTarget),
    Undo,
    Redo,
    ShowNewProof,
    SaveNewProof,
}

#[derive(Debug)]
enum Qualifier {
    Override,
    Depth(usize),
    Level(u8),
    Subproofs,
    NoDistinct,
    IncludeMathboxes,
    MayGrow,
    Except(String),
    Forbid(String),
    NoNewAxiomsFrom(String),
}

fn number(input: &str) -> IResult<&str, usize, GreedyError<&str>> {
    map_opt(digit1, |s: &str| s.parse::<usize>().ok())(input)
}

fn step_selector(input: &str) -> IResult<&str, StepSelector, GreedyError<&str>> {
    alt((
        map(tag_no_case("FIRST"), |_| StepSelector::First),
        map(tag_no_case("LAST"), |_| StepSelector::Last),
        map(preceded(char('+'), number), StepSelector::AfterFirst),
        map(preceded(char('-'), number), StepSelector::BeforeLast),
        map(number, StepSelector::Absolute),
    ))(input)
}

fn label_pattern(input: &str) -> IResult<&str, &str, GreedyError<&str>> {
    take_while1(|c: char| {
        c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '*' | '?')
    })(input)
}

fn formula_text(input: &str) -> IResult<&str, String, GreedyError<&str>> {
    map(verify(rest, |s: &str| !s.trim().is_empty()), |s: &str| {
        s.trim().to_owned()
    })(input)
}

fn qualifier(input: &str) -> IResult<&str, Qualifier, GreedyError<&str>> {
    preceded(
        char('/'),
        alt((
            map(
                preceded(tuple((tag_no_case("DEPTH"), space1)), number),
                Qualifier::Depth,
            ),
            map(
                preceded(tuple((tag_no_case("EXCEPT"), space1)), label_pattern),
                |p| Qualifier::Except(p.to_owned()),
            ),
            map(
                preceded(tuple((tag_no_case("FORBID"), space1)), label_pattern),
                |p| Qualifier::Forbid(p.to_owned()),
            ),
            map(
                preceded(
                    tuple((tag_no_case("NO_NEW_AXIOMS_FROM"), space1)),
                    label_pattern,
                ),
                |p| Qualifier::NoNewAxiomsFrom(p.to_owned()),
            ),
            map(tag_no_case("OVERRIDE"), |_| Qualifier::Override),
            map(tag_no_case("NO_DISTINCT"), |_| Qualifier::NoDistinct),
            map(tag_no_case("INCLUDE_MATHBOXES"), |_| {
                Qualifier::IncludeMathboxes
            }),
            map(tag_no_case("MAY_GROW"), |_| Qualifier::MayGrow),
            map(tag_no_case("SUBPROOFS"), |_| Qualifier::Subproofs),
            map(one_of("123"), |c| Qualifier::Level(c as u8 - b'0')),
        )),
    )(input)
}

fn qualifiers(input: &str) -> IResult<&str, Vec<Qualifier>, GreedyError<&str>> {
    many0(preceded(space1, qualifier))(input)
}

/// Folds a qualifier list for a command accepting only `/OVERRIDE`.
fn only_override(quals: Vec<Qualifier>) -> Option<bool> {
    let mut overridden = false;
    for q in quals {
        match q {
            Qualifier::Override => overridden = true,
            _ => return None,
        }
    }
    Some(overridden)
}

fn improve_options(quals: Vec<Qualifier>) -> Option<ImproveOptions> {
    let mut options = ImproveOptions::default();
    for q in quals {
        match q {
            Qualifier::Depth(d) => options.depth = d,
            Qualifier::Level(l) => options.level = l,
            Qualifier::Subproofs => options.subproofs = true,
            Qualifier::NoDistinct => options.no_distinct = true,
            Qualifier::Override => options.overridden = true,
            _ => return None,
        }
    }
    Some(options)
}

fn minimize_options(quals: Vec<Qualifier>) -> Option<MinimizeOptions> {
    let mut options = MinimizeOptions::default();
    for q in quals {
        match q {
            Qualifier::MayGrow => options.may_grow = true,
            Qualifier::IncludeMathboxes => options.include_mathboxes = true,
            Qualifier::NoDistinct => options.no_distinct = true,
            Qualifier::Override => options.overridden = true,
            Qualifier::Except(p) => options.except = Some(p),
            Qualifier::Forbid(p) => options.forbid = Some(p),
            Qualifier::NoNewAxiomsFrom(p) => options.no_new_axioms_from = Some(p),
            Qualifier::Depth(_) | Qualifier::Level(_) | Qualifier::Subproofs => return None,
        }
    }
    Some(options)
}

fn parse_assign(input: &str) -> IResult<&str, Command, GreedyError<&str>> {
    let (input, _) = tag_no_case("ASSIGN")(input)?;
    or_fail(map_opt(
        tuple((
            preceded(space1, step_selector),
            preceded(space1, label_pattern),
            qualifiers,
        )),
        |(selector, label, quals)| {
            Some(Command::Assign {
                selector,
                label: label.to_owned(),
                overridden: only_override(quals)?,
            })
        },
    ))(input)
}

fn parse_replace(input: &str) -> IResult<&str, Command, GreedyError<&str>> {
    let (input, _) = tag_no_case("REPLACE")(input)?;
    or_fail(map_opt(
        tuple((
            preceded(space1, step_selector),
            preceded(space1, label_pattern),
            qualifiers,
        )),
        |(selector, label, quals)| {
            Some(Command::Replace {
                selector,
                label: label.to_owned(),
                overridden: only_override(quals)?,
            })
        },
    ))(input)
}

fn parse_let(input: &str) -> IResult<&str, Command, GreedyError<&str>> {
    let (input, _) = tuple((tag_no_case("LET"), space1))(input)?;
    or_fail(alt((
        map(
            tuple((
                tag_no_case("STEP"),
                space1,
                step_selector,
                space0,
                char('='),
                space0,
                formula_text,
            )),
            |(_, _, selector, _, _, _, formula)| Command::LetStep { selector, formula },
        ),
        map(
            tuple((
                tag_no_case("VARIABLE"),
                space1,
                preceded(char('$'), digit1),
                space0,
                char('='),
                space0,
                formula_text,
            )),
            |(_, _, digits, _, _, _, formula)| Command::LetVariable {
                variable: format!("${}", digits),
                formula,
            },
        ),
    )))(input)
}

fn parse_unify(input: &str) -> IResult<&str, Command, GreedyError<&str>> {
    let (input, _) = tuple((tag_no_case("UNIFY"), space1))(input)?;
    or_fail(alt((
        map(tag_no_case("ALL"), |_| Command::Unify { selector: None }),
        map(
            preceded(tuple((tag_no_case("STEP"), space1)), step_selector),
            |selector| Command::Unify {
                selector: Some(selector),
            },
        ),
    )))(input)
}

fn parse_match(input: &str) -> IResult<&str, Command, GreedyError<&str>> {
    let (input, _) = tuple((tag_no_case("MATCH"), space1))(input)?;
    or_fail(map(
        preceded(tuple((tag_no_case("STEP"), space1)), step_selector),
        |selector| Command::Match { selector },
    ))(input)
}

fn parse_improve(input: &str) -> IResult<&str, Command, GreedyError<&str>> {
    let (input, _) = tuple((tag_no_case("IMPROVE"), space1))(input)?;
    or_fail(alt((
        map_opt(
            preceded(tag_no_case("ALL"), qualifiers),
            |quals| {
                Some(Command::ImproveAll {
                    options: improve_options(quals)?,
                })
            },
        ),
        map_opt(tuple((step_selector, qualifiers)), |(selector, quals)| {
            Some(Command::ImproveStep {
                selector,
                options: improve_options(quals)?,
            })
        }),
    )))(input)
}

fn parse_minimize(input: &str) -> IResult<&str, Command, GreedyError<&str>> {
    let (input, _) = tuple((tag_no_case("MINIMIZE_WITH"), space1))(input)?;
    or_fail(map_opt(
        tuple((label_pattern, qualifiers)),
        |(pattern, quals)| {
            Some(Command::MinimizeWith {
                pattern: pattern.to_owned(),
                options: minimize_options(quals)?,
            })
        },
    ))(input)
}

fn parse_expand(input: &str) -> IResult<&str, Command, GreedyError<&str>> {
    let (input, _) = tuple((tag_no_case("EXPAND"), space1))(input)?;
    or_fail(map(label_pattern, |pattern| Command::Expand {
        pattern: pattern.to_owned(),
    }))(input)
}

fn parse_delete(input: &str) -> IResult<&str, Command, GreedyError<&str>> {
    let (input, _) = tuple((tag_no_case("DELETE"), space1))(input)?;
    or_fail(alt((
        map(tag_no_case("FLOATING_HYPOTHESES"), |_| Command::Delete {
            selector: None,
            target: DeleteTarget::FloatingHypotheses,
        }),
        map(tag_no_case("ALL"), |_| Command::Delete {
            selector: None,
            target: DeleteTarget::All,
        }),
        map(
            preceded(tuple((tag_no_case("STEP"), space1)), step_selector),
            |selector| Command::Delete {
                selector: Some(selector),
                target: DeleteTarget::Step,
            },
        ),
    )))(input)
}

fn parse_initialize(input: &str) -> IResult<&str, Command, GreedyError<&str>> {
    let (input, _) = tuple((tag_no_case("INITIALIZE"), space1))(input)?;
    or_fail(alt((
        map(tag_no_case("ALL"), |_| {
            Command::Initialize(InitializeTarget::All)
        }),
        map(tag_no_case("USER"), |_| {
            Command::Initialize(InitializeTarget::User)
        }),
        map(
            preceded(tuple((tag_no_case("STEP"), space1)), step_selector),
            |selector| Command::Initialize(InitializeTarget::Step(selector)),
        ),
    )))(input)
}

impl Command {
    /// Parses one command line. Keywords are case-insensitive; qualifiers
    /// follow the arguments as `/NAME` or `/NAME value`.
    pub fn parse(input: &str) -> Result<Self, nom::Err<GreedyError<&str>>> {
        let (_, command) = all_consuming(alt((
            context("assign", parse_assign),
            context("replace", parse_replace),
            context("let", parse_let),
            context("unify", parse_unify),
            context("match", parse_match),
            context("improve", parse_improve),
            context("minimize_with", parse_minimize),
            context("expand", parse_expand),
            context("delete", parse_delete),
            context("initialize", parse_initialize),
            context(
                "undo",
                map(terminated(tag_no_case("UNDO"), space0), |_| Command::Undo),
            ),
            context(
                "redo",
                map(terminated(tag_no_case("REDO"), space0), |_| Command::Redo),
            ),
            context(
                "show",
                map(
                    tuple((tag_no_case("SHOW"), space1, tag_no_case("NEW_PROOF"))),
                    |_| Command::ShowNewProof,
                ),
            ),
            context(
                "save",
                map(
                    tuple((tag_no_case("SAVE"), space1, tag_no_case("NEW_PROOF"))),
                    |_| Command::SaveNewProof,
                ),
            ),
        )))(input.trim())?;
        Ok(command)
    }

    /// Runs the command against the session. SAVE NEW_PROOF only renders the
    /// proof text; writing it back into the database is the caller's job.
    pub fn execute(
        self,
        session: &mut ProofSession,
        db: &dyn StatementDb,
        tools: &Toolbox,
    ) -> Result<Outcome, EditError> {
        match self {
            Command::Assign {
                selector,
                label,
                overridden,
            } => session.assign(db, tools.unifier, selector, &label, overridden),
            Command::Replace {
                selector,
                label,
                overridden,
            } => session.replace(
                db,
                tools.unifier,
                tools.replacement,
                selector,
                &label,
                overridden,
            ),
            Command::LetStep { selector, formula } => {
                session.let_step(db, tools.unifier, selector, &formula)
            }
            Command::LetVariable { variable, formula } => {
                session.let_variable(db, tools.unifier, &variable, &formula)
            }
            Command::Unify { selector } => session.unify(db, tools.unifier, selector),
            Command::Match { selector } => session.match_step(db, tools.unifier, selector),
            Command::ImproveStep { selector, options } => session.improve_step(
                db,
                tools.unifier,
                tools.floating,
                tools.replacement,
                selector,
                &options,
            ),
            Command::ImproveAll { options } => session.improve_all(
                db,
                tools.unifier,
                tools.floating,
                tools.replacement,
                &options,
            ),
            Command::MinimizeWith { pattern, options } => {
                session.minimize_with(db, tools, &pattern, &options)
            }
            Command::Expand { pattern } => {
                session.expand(db, tools.unifier, tools.codec, &pattern)
            }
            Command::Delete { selector, target } => {
                session.delete(db, tools.unifier, selector, target)
            }
            Command::Initialize(target) => session.initialize(db, tools.unifier, target),
            Command::Undo => Ok(session.undo()),
            Command::Redo => Ok(session.redo()),
            Command::ShowNewProof => Ok(Outcome::message(session.show_new_proof(db))),
            Command::SaveNewProof => Ok(Outcome::message(session.save_new_proof(db).1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        prove::{BasicFloatingProver, BasicReplacement},
        testdb,
        unify::BasicUnifier,
        verify::{BasicCodec, BasicVerifier},
    };

    #[test]
    fn parse_assign_and_qualifiers() {
        assert_eq!(
            Command::parse("ASSIGN LAST ax-mp /OVERRIDE").unwrap(),
            Command::Assign {
                selector: StepSelector::Last,
                label: "ax-mp".to_owned(),
                overridden: true,
            }
        );
        assert_eq!(
            Command::parse("assign 2 ax-1").unwrap(),
            Command::Assign {
                selector: StepSelector::Absolute(2),
                label: "ax-1".to_owned(),
                overridden: false,
            }
        );
        // DEPTH makes no sense for ASSIGN
        assert!(Command::parse("ASSIGN 2 ax-1 /DEPTH 3").is_err());
    }

    #[test]
    fn parse_step_selectors() {
        assert_eq!(
            Command::parse("IMPROVE +2").unwrap(),
            Command::ImproveStep {
                selector: StepSelector::AfterFirst(2),
                options: ImproveOptions::default(),
            }
        );
        assert_eq!(
            Command::parse("IMPROVE -1").unwrap(),
            Command::ImproveStep {
                selector: StepSelector::BeforeLast(1),
                options: ImproveOptions::default(),
            }
        );
        assert_eq!(
            Command::parse("IMPROVE first").unwrap(),
            Command::ImproveStep {
                selector: StepSelector::First,
                options: ImproveOptions::default(),
            }
        );
    }

    #[test]
    fn parse_expand_takes_a_label_pattern() {
        assert_eq!(
            Command::parse("EXPAND a1i").unwrap(),
            Command::Expand {
                pattern: "a1i".to_owned()
            }
        );
        assert_eq!(
            Command::parse("EXPAND ax-*").unwrap(),
            Command::Expand {
                pattern: "ax-*".to_owned()
            }
        );
        assert!(Command::parse("EXPAND").is_err());
    }

    #[test]
    fn parse_improve_and_minimize() {
        assert_eq!(
            Command::parse("IMPROVE ALL /DEPTH 3 /NO_DISTINCT").unwrap(),
            Command::ImproveAll {
                options: ImproveOptions {
                    depth: 3,
                    no_distinct: true,
                    ..ImproveOptions::default()
                }
            }
        );
        assert_eq!(
            Command::parse("IMPROVE FIRST /3 /SUBPROOFS").unwrap(),
            Command::ImproveStep {
                selector: StepSelector::First,
                options: ImproveOptions {
                    level: 3,
                    subproofs: true,
                    ..ImproveOptions::default()
                }
            }
        );
        assert_eq!(
            Command::parse("IMPROVE LAST").unwrap(),
            Command::ImproveStep {
                selector: StepSelector::Last,
                options: ImproveOptions::default(),
            }
        );
        assert_eq!(
            Command::parse("MINIMIZE_WITH ax-* /MAY_GROW /FORBID *OLD").unwrap(),
            Command::MinimizeWith {
                pattern: "ax-*".to_owned(),
                options: MinimizeOptions {
                    may_grow: true,
                    forbid: Some("*OLD".to_owned()),
                    ..MinimizeOptions::default()
                }
            }
        );
        assert_eq!(
            Command::parse("MINIMIZE_WITH * /INCLUDE_MATHBOXES /NO_NEW_AXIOMS_FROM ax-*")
                .unwrap(),
            Command::MinimizeWith {
                pattern: "*".to_owned(),
                options: MinimizeOptions {
                    include_mathboxes: true,
                    no_new_axioms_from: Some("ax-*".to_owned()),
                    ..MinimizeOptions::default()
                }
            }
        );
        assert!(Command::parse("MINIMIZE_WITH ax-* /DEPTH 2").is_err());
        assert!(Command::parse("ASSIGN 2 ax-1 /SUBPROOFS").is_err());
    }

    #[test]
    fn parse_let_forms() {
        assert_eq!(
            Command::parse("LET STEP +2 = ( ph -> ph )").unwrap(),
            Command::LetStep {
                selector: StepSelector::AfterFirst(2),
                formula: "( ph -> ph )".to_owned(),
            }
        );
        assert_eq!(
            Command::parse("LET VARIABLE $1 = ph").unwrap(),
            Command::LetVariable {
                variable: "$1".to_owned(),
                formula: "ph".to_owned(),
            }
        );
        assert!(Command::parse("LET STEP 2 =").is_err());
    }

    #[test]
    fn parse_structural_forms() {
        assert_eq!(
            Command::parse("DELETE FLOATING_HYPOTHESES").unwrap(),
            Command::Delete {
                selector: None,
                target: DeleteTarget::FloatingHypotheses,
            }
        );
        assert_eq!(
            Command::parse("DELETE STEP 3").unwrap(),
            Command::Delete {
                selector: Some(StepSelector::Absolute(3)),
                target: DeleteTarget::Step,
            }
        );
        assert_eq!(
            Command::parse("INITIALIZE USER").unwrap(),
            Command::Initialize(InitializeTarget::User)
        );
        assert_eq!(
            Command::parse("UNIFY ALL").unwrap(),
            Command::Unify { selector: None }
        );
        assert_eq!(Command::parse("UNDO").unwrap(), Command::Undo);
        assert_eq!(Command::parse("SHOW NEW_PROOF").unwrap(), Command::ShowNewProof);
        assert_eq!(Command::parse("SAVE NEW_PROOF").unwrap(), Command::SaveNewProof);
    }

    #[test]
    fn parse_rejects_malformed_lines() {
        assert!(Command::parse("ASSIGN").is_err());
        assert!(Command::parse("DELETE").is_err());
        assert!(Command::parse("EXPAND 2 trailing").is_err());
        assert!(Command::parse("FROBNICATE 1").is_err());
    }

    #[test]
    fn execute_dispatches_to_the_session() {
        let db = testdb::propositional();
        let u = BasicUnifier::new();
        let (mut s, _) = ProofSession::start(&db, "th1", 20, &u, false).unwrap();
        let (f, r, v, c) = (
            BasicFloatingProver::new(),
            BasicReplacement::new(),
            BasicVerifier::new(),
            BasicCodec::new(),
        );
        let tools = Toolbox {
            unifier: &u,
            floating: &f,
            replacement: &r,
            verifier: &v,
            codec: &c,
        };
        let out = Command::parse("ASSIGN LAST ax-id")
            .unwrap()
            .execute(&mut s, &db, &tools)
            .unwrap();
        assert!(out.changed);
        assert!(s.proof().is_complete());
        let out = Command::parse("UNDO")
            .unwrap()
            .execute(&mut s, &db, &tools)
            .unwrap();
        assert!(out.changed);
        assert_eq!(s.proof().len(), 1);
    }
}
