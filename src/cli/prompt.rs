//! Interactive backup picker

use std::io::{self, BufRead, Write};

use anyhow::{bail, Result};

use super::describe;
use crate::history::SnapshotLedger;

/// List the backups worth picking on stderr and read a choice from stdin.
///
/// Returns `None` if the user cancels.
pub fn select(ledger: &SnapshotLedger, multiple: bool) -> Result<Option<Vec<String>>> {
    let stdin = io::stdin();
    let stderr = io::stderr();
    select_from(ledger, multiple, stdin.lock(), stderr.lock())
}

pub fn select_from<R: BufRead, W: Write>(
    ledger: &SnapshotLedger,
    multiple: bool,
    mut input: R,
    mut output: W,
) -> Result<Option<Vec<String>>> {
    let options = ledger.recent_and_tagged();
    if options.is_empty() {
        bail!("There are no backups to choose from");
    }

    writeln!(output, "Here is a list of recent backups:")?;
    for snapshot in &options {
        writeln!(output, "{}", describe(snapshot))?;
    }
    if multiple {
        write!(
            output,
            "Select one by identifier, or multiple separated by commas (q to cancel): "
        )?;
    } else {
        write!(output, "Select one by identifier (q to cancel): ")?;
    }
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    parse_selection(&line, multiple)
}

/// Turn a typed answer into references. `q` or nothing cancels.
pub fn parse_selection(answer: &str, multiple: bool) -> Result<Option<Vec<String>>> {
    let answer = answer.trim();
    if answer.is_empty() || answer.eq_ignore_ascii_case("q") {
        return Ok(None);
    }

    let mut chosen: Vec<String> = Vec::new();
    for item in answer.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !chosen.iter().any(|c| c == item) {
            chosen.push(item.to_string());
        }
    }

    if chosen.len() > 1 && !multiple {
        bail!("Select only one backup");
    }
    Ok(Some(chosen))
}
