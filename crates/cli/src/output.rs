//! Presenting results.

use std::io::{self, BufRead, Write};

use serde::Serialize;

use dnsmanager::repository::ImportedRecord;

use crate::error::CliError;
use crate::println;

/// Print a value as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::Failure(format!("could not serialize the result: {err}")))?;
    println!("{text}");
    Ok(())
}

/// Format records as a table.
pub fn record_table<'a>(records: impl IntoIterator<Item = &'a ImportedRecord>) -> Vec<String> {
    let mut lines = vec![format!(
        "{:<15} {:<10} {:<10} {:<15} {:<5}",
        "CONTENT", "RTYPE", "TTL", "ZONE", "NAME"
    )];
    for r in records {
        lines.push(format!(
            "{:<15} {:<10} {:<10} {:<15} {:<5}",
            r.content,
            r.rtype.to_string(),
            r.ttl,
            r.zone,
            r.name
        ));
    }
    lines
}

/// Format the details of a record.
pub fn record_details(record: &ImportedRecord) -> Vec<String> {
    vec![
        format!("-> FQDN: {}", record.fqdn()),
        format!("-> Name: {}", record.name),
        format!("-> Content: {}", record.content),
        format!("-> RType: {}", record.rtype),
        format!("-> TTL: {}", record.ttl),
        format!("-> Zone: {}", record.zone),
    ]
}

/// Ask a yes/no question, defaulting to no.
///
/// `assume_yes` skips the question.  The question is asked on stderr, leaving
/// stdout to results.  If the answer cannot be read, the question is
/// declined.
pub fn confirm(question: &str, assume_yes: bool) -> bool {
    if assume_yes {
        return true;
    }
    ask(question, io::stdin().lock(), io::stderr())
}

/// Ask a question on `output` until `input` gives a valid answer.
fn ask(question: &str, mut input: impl BufRead, mut output: impl Write) -> bool {
    let mut line = String::new();
    loop {
        let _ = write!(output, "{question} [y/N] ");
        let _ = output.flush();

        line.clear();
        match input.read_line(&mut line) {
            Ok(0) | Err(_) => return false,
            Ok(_) => {}
        }
        match parse_answer(&line) {
            Some(answer) => return answer,
            None => {
                let _ = writeln!(output, "Please, respond with 'yes' or 'no' or 'y' or 'n'.");
            }
        }
    }
}

/// Interpret an answer to a yes/no question.
///
/// An empty answer takes the default, which is no.
fn parse_answer(answer: &str) -> Option<bool> {
    match answer.trim().to_ascii_lowercase().as_str() {
        "yes" | "ye" | "y" => Some(true),
        "no" | "n" | "" => Some(false),
        _ => None,
    }
}
