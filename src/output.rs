use std::fmt::Write;

use colored::Colorize;

use crate::batch::{BatchItem, BatchReport};
use crate::error::RequestError;
use crate::gc::GcReport;
use crate::models::{Catalog, DeleteOutcome};

fn header(out: &mut String, host: &str) {
    let _ = writeln!(out, "\nRegistry: {}", host.bold());
}

fn rule(out: &mut String) {
    let _ = writeln!(out, "{}", "─".repeat(60));
}

/// Image table of one registry
pub fn render_catalog(catalog: &Catalog) -> String {
    let mut out = String::new();
    header(&mut out, &catalog.host);
    rule(&mut out);

    let rows = catalog.rows();
    if rows.is_empty() {
        let _ = writeln!(out, "  {}", "No images.".dimmed());
    } else {
        let _ = writeln!(out, "  {}", "IMAGE".bold());
        for row in &rows {
            let _ = writeln!(out, "  {}", row);
        }
    }

    for (repo, _) in catalog.entries.iter().filter(|(_, tags)| tags.is_none()) {
        let _ = writeln!(
            out,
            "  {} {}",
            "[SKIP]".yellow(),
            format!("{} (tags unavailable)", repo).dimmed()
        );
    }
    out
}

pub fn render_catalog_error(host: &str, err: &RequestError) -> String {
    let mut out = String::new();
    header(&mut out, host);
    rule(&mut out);
    let _ = writeln!(out, "  {} {}", "ERROR".red().bold(), err);
    out
}

pub fn render_batch_report(host: &str, report: &BatchReport) -> String {
    let mut out = String::new();
    header(&mut out, host);
    rule(&mut out);

    for msg in &report.messages {
        let _ = writeln!(out, "  {}", msg.green());
    }

    for item in &report.items {
        let _ = match item {
            BatchItem::Malformed(name) => {
                writeln!(out, "  {} {} is not repo:tag", "[ERR]".red().bold(), name)
            }
            BatchItem::Processed {
                name,
                outcome: DeleteOutcome::NothingToDelete,
            } => writeln!(out, "  {} {} nothing to delete", "[SKIP]".yellow(), name),
            BatchItem::Processed {
                name,
                outcome: DeleteOutcome::Failed(e),
            } => writeln!(out, "  {} {} {}", "[ERR]".red().bold(), name, e),
            BatchItem::Processed { .. } => Ok(()),
        };
    }

    if report.messages.is_empty() {
        let _ = writeln!(out, "  {}", "Nothing deleted.".dimmed());
    }

    match &report.catalog {
        Some(Ok(catalog)) => out.push_str(&render_catalog(catalog)),
        Some(Err(e)) => out.push_str(&render_catalog_error(host, e)),
        None => {}
    }
    out
}

pub fn render_gc_report(report: &GcReport) -> String {
    let mut out = String::new();
    header(&mut out, &report.host);
    if let Some(container) = &report.container {
        let _ = writeln!(out, "Container: {}", container);
    }
    rule(&mut out);

    for msg in &report.messages {
        if msg.starts_with("[Err]") {
            let _ = writeln!(out, "  {}", msg.red());
        } else {
            let _ = writeln!(out, "  {}", msg);
        }
    }

    for step in report.steps.iter().filter(|s| !s.ok) {
        let _ = writeln!(out, "  {} step {:?}", "[FAILED]".red().bold(), step.step);
    }

    let _ = writeln!(out, "\n{}", "═".repeat(60));
    if report.succeeded() {
        let _ = writeln!(out, "{} garbage collection finished", "SUMMARY:".bold());
    } else {
        let _ = writeln!(
            out,
            "{} garbage collection {} ({} failed restarts)",
            "SUMMARY:".bold(),
            "had errors".red().bold(),
            report.failed_restarts
        );
    }
    out
}

pub fn print_catalog(catalog: &Catalog) {
    print!("{}", render_catalog(catalog));
}

pub fn print_catalog_error(host: &str, err: &RequestError) {
    print!("{}", render_catalog_error(host, err));
}

pub fn print_batch_report(host: &str, report: &BatchReport) {
    print!("{}", render_batch_report(host, report));
}

pub fn print_gc_report(report: &GcReport) {
    print!("{}", render_gc_report(report));
}
