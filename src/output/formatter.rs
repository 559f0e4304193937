use colored::Colorize;

use crate::command::{ProvisioningPlan, Stage};
use crate::discovery::RawStateRecord;
use crate::executor::engine::{ApplySummary, PlanSummary, PlannedChange, ResourceStatus};
use crate::planner::reconcile::Action;

/// Print a success message.
pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg.green());
}

/// Print an error message.
pub fn print_error(msg: &str) {
    println!("{} {}", "✗".red().bold(), msg.red());
}

/// Whether `address` is selected by the `--target` filters.
pub fn is_targeted(address: &str, targets: &[String]) -> bool {
    targets.is_empty() || targets.iter().any(|t| address.contains(t.as_str()))
}

/// Print the reconciliation plan, one block per resource that will change.
pub fn print_plan(plan: &PlanSummary, targets: &[String]) {
    println!();

    let actionable: Vec<&PlannedChange> = plan
        .changes
        .iter()
        .filter(|c| c.action != Action::NoOp)
        .filter(|c| is_targeted(&c.address, targets))
        .collect();

    if actionable.is_empty() {
        println!("{}", "No changes. Databases match the manifest.".green());
        return;
    }

    println!("Resource actions are indicated with the following symbols:");
    if actionable.iter().any(|c| c.action == Action::Create) {
        println!("  {} create", "+".green().bold());
    }
    if actionable.iter().any(|c| c.action == Action::Modify) {
        println!("  {} update in-place", "~".yellow().bold());
    }
    if actionable.iter().any(|c| c.action == Action::Destroy) {
        println!("  {} destroy", "-".red().bold());
    }

    println!();
    println!("oraprov will perform the following actions:");
    println!();

    for change in &actionable {
        print_change(change);
    }

    println!("{}", plan);
    println!();
}

fn print_change(change: &PlannedChange) {
    let (action_desc, color_fn): (&str, fn(&str) -> colored::ColoredString) = match change.action {
        Action::Create => ("will be created", |s: &str| s.green()),
        Action::Modify => ("will be updated in-place", |s: &str| s.yellow()),
        Action::Destroy => ("will be destroyed", |s: &str| s.red()),
        Action::NoOp => return,
    };

    println!(
        "  {} {} {}",
        "#".dimmed(),
        change.address.bold(),
        action_desc.dimmed()
    );
    println!(
        "{}",
        color_fn(&format!("  {} {} \"{}\"", change.action, change.resource_type, change.identity))
    );

    let max_key_len = change
        .drift
        .iter()
        .map(|d| d.path.len())
        .max()
        .unwrap_or(0)
        .min(35);
    for drift in &change.drift {
        let actual = drift
            .actual
            .as_deref()
            .map(|a| format!("\"{}\"", a))
            .unwrap_or_else(|| "(unset)".dimmed().to_string());
        let line = format!(
            "      ~ {:<width$} = {} -> \"{}\"",
            drift.path,
            actual,
            drift.desired,
            width = max_key_len
        );
        println!("{}", color_fn(&line));
    }
    println!();
}

/// Print the commands of a provisioning plan, secrets masked.
pub fn print_provisioning_plan(plan: &ProvisioningPlan) {
    println!("{} {}", "Commands for".bold(), plan.resource().bold().cyan());
    for (idx, entry) in plan.entries().enumerate() {
        let stage = match entry.stage {
            Stage::Immediate => "now".normal(),
            Stage::Deferred => "after".dimmed(),
        };
        let timeout = if entry.context.is_unbounded() {
            "no timeout".to_string()
        } else {
            format!("{}s", entry.context.timeout.as_secs())
        };
        println!(
            "  {:>3}. [{:<5}] {:<8} @{} ({}{}) {}",
            idx + 1,
            stage,
            entry.command.tool(),
            entry.context.target_instance,
            timeout,
            if entry.context.daemonized { ", daemonized" } else { "" },
            entry.command.redacted()
        );
    }
    println!();
}

/// Print the outcome of an apply or destroy run.
pub fn print_apply_summary(summary: &ApplySummary) {
    println!();
    for result in &summary.results {
        match &result.status {
            ResourceStatus::Succeeded => println!(
                "  {} {} {}",
                "✓".green(),
                result.address,
                format!("({:?})", result.state).dimmed()
            ),
            ResourceStatus::Failed(message) => println!(
                "  {} {}: {}",
                "✗".red(),
                result.address,
                message.red()
            ),
            ResourceStatus::Skipped => println!(
                "  {} {} {}",
                "-".dimmed(),
                result.address,
                "(skipped)".dimmed()
            ),
        }
    }
    println!();
    if summary.failed > 0 {
        print_error(&summary.to_string());
    } else {
        print_success(&summary.to_string());
    }
}

/// Print discovered raw records as a table, one column per field.
pub fn print_records(resource_type: &str, records: &[RawStateRecord]) {
    if records.is_empty() {
        println!("{}", format!("No {} found.", resource_type).dimmed());
        return;
    }

    let mut columns: Vec<&str> = Vec::new();
    for record in records {
        for (column, _) in record.columns() {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
    }
    let widths: Vec<usize> = columns
        .iter()
        .map(|c| {
            records
                .iter()
                .filter_map(|r| r.column_data(c))
                .map(|v| v.len())
                .chain(std::iter::once(c.len()))
                .max()
                .unwrap_or(0)
                .min(40)
        })
        .collect();
    let total: usize = widths.iter().map(|w| w + 2).sum();

    println!();
    println!("{}", resource_type.bold().cyan());
    println!("{}", "─".repeat(total));
    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:<width$}", c, width = *w))
        .collect();
    println!("  {}", header.join("  ").bold());
    println!("{}", "─".repeat(total));
    for record in records {
        let row: Vec<String> = columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", record.column_data(c).unwrap_or(""), width = *w))
            .collect();
        println!("  {}", row.join("  "));
    }
    println!();
    println!("  {} record(s) total.", records.len());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_targets_select_everything() {
        assert!(is_targeted("tablespace.orcl/USERS", &[]));
        assert!(is_targeted(
            "tablespace.orcl/USERS",
            &["USERS".to_string()]
        ));
        assert!(!is_targeted(
            "tablespace.orcl/USERS",
            &["ora_database".to_string()]
        ));
    }
}
