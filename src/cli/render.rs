//! Human renderer for CLI outputs.
//!
//! Pure formatting; handlers gather the data and choose stdout or stderr.

use std::fmt::Write as _;

use super::commands::validate::ValidationReport;
use crate::backup::{BackupReport, ReportStatus};
use crate::merge::{ConflictRecord, MergeOperation, MergeStats};

/// Conflicts listed before the rest are summarized.
const MAX_LISTED: usize = 10;

pub fn render_backup(report: &BackupReport) -> String {
    let mut out = String::new();
    let mark = match report.status {
        ReportStatus::Success => "✓",
        ReportStatus::Partial => "!",
        ReportStatus::Failed => "✗",
    };
    let _ = writeln!(
        out,
        "{mark} Backup {} ({} on {})",
        report.status.as_str(),
        report.host,
        report.branch
    );

    if report.status != ReportStatus::Failed {
        let _ = writeln!(out, "  {}", render_counts(&report.counts));
        match report.commit.as_ref() {
            Some(commit) => {
                let _ = writeln!(out, "  Commit: {}", commit.short());
            }
            None => out.push_str("  Remote already up to date\n"),
        }
        if !report.hosts.is_empty() {
            let _ = writeln!(out, "  Hosts: {}", report.hosts.join(", "));
        }
        render_conflicts(&mut out, &report.conflicts);
    }

    if let Some(error) = report.error.as_ref() {
        let _ = writeln!(out, "  Error ({}): {}", error.kind, error.message);
    }
    if let Some(guidance) = report.guidance.as_ref() {
        let _ = writeln!(out, "  {guidance}");
    }
    for (label, path) in [
        ("Backup", report.backup_path.as_ref()),
        ("Quarantine", report.quarantine_path.as_ref()),
        ("Draft", report.draft_path.as_ref()),
    ] {
        if let Some(path) = path {
            let _ = writeln!(out, "  {label}: {}", path.display());
        }
    }
    let _ = write!(out, "  Took {} ms", report.duration_ms);
    out
}

pub fn render_merge(op: &MergeOperation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Merged with {}", op.policy);
    let _ = write!(out, "  {}", render_counts(&op.stats()));
    if !op.conflicts_detected.is_empty() {
        out.push('\n');
        render_conflicts(&mut out, &op.conflicts_detected);
        out.truncate(out.trim_end().len());
    }
    for rejected in &op.rejected_entries {
        let reasons: Vec<String> = rejected.reasons.iter().map(ToString::to_string).collect();
        let _ = write!(
            out,
            "\n  rejected {} ({}): {}",
            rejected.key,
            rejected.side.as_str(),
            reasons.join("; ")
        );
    }
    out
}

pub(crate) fn render_validation(report: &ValidationReport) -> String {
    let mut out = String::new();
    if report.is_clean() {
        let _ = write!(
            out,
            "✓ {}: {} entries valid",
            report.file.display(),
            report.entries
        );
    } else {
        let _ = write!(
            out,
            "✗ {}: {} of {} entries invalid",
            report.file.display(),
            report.invalid.len(),
            report.entries
        );
        for entry in &report.invalid {
            let _ = write!(out, "\n  {}", entry.key);
            for issue in &entry.issues {
                let _ = write!(out, "\n    - {issue}");
            }
        }
    }
    for entry in &report.warnings {
        let _ = write!(out, "\n  ! {}", entry.key);
        for issue in &entry.issues {
            let _ = write!(out, "\n    - {issue}");
        }
    }
    if report.duplicates > 0 {
        let _ = write!(out, "\n  {} duplicate keys", report.duplicates);
    }
    out
}

fn render_counts(counts: &MergeStats) -> String {
    format!(
        "{} entries: +{} added, ~{} resolved, ={} unchanged, !{} rejected, {} conflicts",
        counts.total,
        counts.added,
        counts.resolved,
        counts.unchanged,
        counts.rejected,
        counts.conflicts
    )
}

fn render_conflicts(out: &mut String, conflicts: &[ConflictRecord]) {
    for record in conflicts.iter().take(MAX_LISTED) {
        let _ = write!(
            out,
            "  conflict {}: {} versions, {} wins",
            record.id,
            record.candidates.len(),
            record.winner.source_host()
        );
        if let Some(rule) = record.rule {
            let _ = write!(out, " by {}", rule_name(rule));
        }
        if !record.siblings.is_empty() {
            let _ = write!(out, ", {} kept as siblings", record.siblings.len());
        }
        if !record.superseded.is_empty() {
            let _ = write!(out, ", {} siblings superseded", record.superseded.len());
        }
        out.push('\n');
    }
    if conflicts.len() > MAX_LISTED {
        let _ = writeln!(out, "  ... and {} more", conflicts.len() - MAX_LISTED);
    }
}

fn rule_name(rule: crate::merge::ResolutionRule) -> &'static str {
    use crate::merge::ResolutionRule;
    match rule {
        ResolutionRule::UpdatedAt => "updated_at",
        ResolutionRule::SourceHost => "source_host",
        ResolutionRule::Version => "version",
        ResolutionRule::Checksum => "checksum",
        ResolutionRule::CreatedAt => "created_at",
    }
}
