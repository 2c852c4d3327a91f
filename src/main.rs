use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mmpa::{
    reader, BasicCodec, BasicFloatingProver, BasicReplacement, BasicUnifier, BasicVerifier,
    Command, EditError, MemoryDb, ProofSession, StatementDb, Toolbox,
};

#[derive(Debug, Parser)]
#[command(name = "mmpa", about = "An interactive proof editor for Metamath databases")]
struct Args {
    /// The Metamath database to load
    database: PathBuf,
    /// Snapshots kept for UNDO, per session
    #[arg(long, default_value_t = 20)]
    undo_depth: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("?{}", error);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), EditError> {
    let mut db = reader::load_database(&args.database)?;
    info!(path = ?args.database, statements = db.stmt_count(), "database loaded");
    println!(
        "{} statements were read from '{}'.",
        db.stmt_count(),
        args.database.display()
    );
    let unifier = BasicUnifier::new();
    let floating = BasicFloatingProver::new();
    let replacement = BasicReplacement::new();
    let verifier = BasicVerifier::new();
    let codec = BasicCodec::new();
    let tools = Toolbox {
        unifier: &unifier,
        floating: &floating,
        replacement: &replacement,
        verifier: &verifier,
        codec: &codec,
    };

    let mut session: Option<ProofSession> = None;
    let mut confirm_discard = false;
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("{}", if session.is_some() { "MM-PA> " } else { "MM> " });
        io::stdout()
            .flush()
            .map_err(|e| EditError::Io(e.to_string()))?;
        line.clear();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .map_err(|e| EditError::Io(e.to_string()))?;
        if read == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let tokens: Vec<&str> = input.split_whitespace().collect();
        let keyword = tokens[0].to_ascii_uppercase();

        if keyword == "EXIT" || keyword == "QUIT" {
            if let Some(s) = &session {
                if s.has_unsaved_changes() && !confirm_discard {
                    println!(
                        "Warning: the new proof has not been saved. \
                         EXIT again to discard it."
                    );
                    confirm_discard = true;
                } else {
                    session = None;
                    confirm_discard = false;
                    println!("Exited Proof Assistant mode.");
                }
                continue;
            }
            break;
        }
        confirm_discard = false;

        if keyword == "PROVE" {
            if session.is_some() {
                println!("?A proof is already in progress; EXIT it first.");
                continue;
            }
            match parse_prove(&tokens) {
                Some((label, overridden)) => {
                    match ProofSession::start(&db, label, args.undo_depth, &unifier, overridden) {
                        Ok((s, outcome)) => {
                            for message in &outcome.messages {
                                println!("{}", message);
                            }
                            session = Some(s);
                        }
                        Err(error) => println!("?{}", error),
                    }
                }
                None => println!("?Usage: PROVE <label> [/OVERRIDE]"),
            }
            continue;
        }

        let s = match session.as_mut() {
            Some(s) => s,
            None => {
                println!("?No proof is in progress; use PROVE <label>.");
                continue;
            }
        };
        let command = match Command::parse(input) {
            Ok(command) => command,
            Err(error) => {
                println!("?Syntax error in command:\n{}", error);
                continue;
            }
        };
        if command == Command::SaveNewProof {
            save_proof(&mut db, s);
            continue;
        }
        match command.execute(s, &db, &tools) {
            Ok(outcome) => {
                for message in &outcome.messages {
                    println!("{}", message);
                }
            }
            Err(error) => println!("?{}", error),
        }
    }
    Ok(())
}

fn parse_prove<'a>(tokens: &[&'a str]) -> Option<(&'a str, bool)> {
    match tokens {
        [_, label] => Some((label, false)),
        [_, label, qualifier] if qualifier.eq_ignore_ascii_case("/OVERRIDE") => {
            Some((label, true))
        }
        _ => None,
    }
}

/// Writes the current proof back into the database, unknown steps included.
fn save_proof(db: &mut MemoryDb, session: &mut ProofSession) {
    let (flat, _) = session.save_new_proof(db);
    let proving = session.proving();
    let incomplete = !session.proof().is_complete();
    db.statement_mut(proving).proof = Some(flat);
    session.mark_saved();
    info!(label = db.label(proving), "proof saved");
    if incomplete {
        println!(
            "Warning: the proof of '{}' is incomplete; it was saved with ? steps.",
            db.label(proving)
        );
    } else {
        println!("The proof of '{}' was saved.", db.label(proving));
    }
}
