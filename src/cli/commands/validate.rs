use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use super::super::{Ctx, print_json, read_file, render};
use crate::core::{CoreError, parse_store};
use crate::integrity::{ValidationIssue, validate_entry};
use crate::Result;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Store file to check.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,
}

#[derive(Debug, Serialize)]
pub(crate) struct EntryReport {
    pub key: String,
    pub issues: Vec<ValidationIssue>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ValidationReport {
    pub file: PathBuf,
    pub entries: usize,
    /// Extra values stored under a key that already had one.
    pub duplicates: usize,
    pub invalid: Vec<EntryReport>,
    /// Entries that merge normally but whose metadata disagrees with the id.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<EntryReport>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.invalid.is_empty()
    }
}

pub(crate) fn handle(ctx: &Ctx, args: ValidateArgs) -> Result<i32> {
    let store = parse_store(&read_file(&args.file)?).map_err(CoreError::from)?;

    let mut invalid: Vec<EntryReport> = store
        .malformed()
        .iter()
        .map(|m| EntryReport {
            key: m.key.clone(),
            issues: vec![ValidationIssue::Undecodable {
                reason: m.reason.clone(),
            }],
        })
        .collect();
    let mut warnings = Vec::new();
    for entry in store.iter().chain(store.shadowed()) {
        let result = validate_entry(entry);
        if !result.valid {
            invalid.push(EntryReport {
                key: entry.id.to_string(),
                issues: result.errors,
            });
        } else if !result.warnings.is_empty() {
            warnings.push(EntryReport {
                key: entry.id.to_string(),
                issues: result.warnings,
            });
        }
    }

    let report = ValidationReport {
        file: args.file,
        entries: store.len() + store.shadowed().len() + store.malformed().len(),
        duplicates: store.shadowed().len(),
        invalid,
        warnings,
    };
    if ctx.json {
        print_json(&report)?;
    } else {
        println!("{}", render::render_validation(&report));
    }
    Ok(if report.is_clean() { 0 } else { 1 })
}
