//! Run report tables using comfy-table.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use omnibus_loadgen::RunSummary;
use omnibus_loadgen::stats::EndpointSummary;

use super::colors::Paint;
use super::output::{print_error, print_heading, print_labeled, print_success};

fn base_table(columns: &[&str]) -> Table {
    let mut table = Table::new();

    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header: Vec<Cell> = columns
        .iter()
        .map(|col| {
            if super::no_color() {
                Cell::new(col)
            } else {
                Cell::new(col).add_attribute(Attribute::Bold).fg(Color::Cyan)
            }
        })
        .collect();
    table.set_header(header);
    table
}

fn number(value: impl ToString) -> Cell {
    Cell::new(value.to_string()).set_alignment(CellAlignment::Right)
}

/// Right-aligned count, red when non-zero.
fn failure_count(value: u64) -> Cell {
    let cell = number(value);
    if value > 0 && !super::no_color() {
        cell.fg(Color::Red)
    } else {
        cell
    }
}

fn millis(micros: u64) -> String {
    format!("{:.1}", micros as f64 / 1000.0)
}

fn status_breakdown(endpoint: &EndpointSummary) -> String {
    let mut parts: Vec<String> = endpoint
        .statuses
        .iter()
        .map(|(status, count)| format!("{status}×{count}"))
        .collect();
    if endpoint.transport_errors > 0 {
        parts.push(format!("err×{}", endpoint.transport_errors));
    }
    parts.join(" ")
}

/// Per-endpoint request counts and latency percentiles.
pub fn endpoint_table(endpoints: &[EndpointSummary]) -> Table {
    let mut table = base_table(&[
        "Method", "Name", "Reqs", "Fails", "p50 ms", "p95 ms", "p99 ms", "Max ms", "Statuses",
    ]);
    for endpoint in endpoints {
        table.add_row(vec![
            Cell::new(endpoint.method),
            Cell::new(&endpoint.name),
            number(endpoint.requests),
            failure_count(endpoint.failures),
            number(millis(endpoint.p50_us)),
            number(millis(endpoint.p95_us)),
            number(millis(endpoint.p99_us)),
            number(millis(endpoint.max_us)),
            Cell::new(status_breakdown(endpoint)),
        ]);
    }
    table
}

/// Per-role session start-up outcomes.
pub fn session_table(summary: &RunSummary) -> Table {
    let mut table = base_table(&["Role", "Started", "Authenticated", "With account"]);
    for (role, counts) in &summary.sessions {
        table.add_row(vec![
            Cell::new(role),
            number(counts.started),
            number(counts.authenticated),
            number(counts.with_account),
        ]);
    }
    table
}

/// Tasks that did nothing, by reason.
pub fn skip_table(summary: &RunSummary) -> Table {
    let mut table = base_table(&["Task", "Reason", "Count"]);
    for skip in &summary.skips {
        table.add_row(vec![
            Cell::new(skip.task),
            Cell::new(skip.reason.as_str()),
            number(skip.count),
        ]);
    }
    table
}

/// Exactly-once violations, one row per offending key.
pub fn violation_table(summary: &RunSummary) -> Table {
    let mut table = base_table(&["User", "Key", "Attempts", "Created", "Replayed", "Unexpected"]);
    for violation in &summary.violations {
        table.add_row(vec![
            Cell::new(&violation.owner),
            Cell::new(&violation.key),
            number(violation.attempts),
            failure_count(u64::from(violation.created)),
            number(violation.replayed),
            failure_count(u64::from(violation.unexpected)),
        ]);
    }
    table
}

/// Prints the whole run report.
pub fn print_report(summary: &RunSummary) {
    print_heading("Run");
    print_labeled("Seed", &summary.seed.to_string());
    print_labeled("Users spawned", &summary.users_spawned.to_string());
    print_labeled("Elapsed", &format!("{:.1}s", summary.elapsed_secs));
    print_labeled("Requests", &summary.total_requests.to_string());
    print_labeled("Failures", &summary.total_failures.to_string());
    print_labeled("Throughput", &format!("{:.1} req/s", summary.throughput));

    if !summary.sessions.is_empty() {
        print_heading("Sessions");
        println!("{}", session_table(summary));
    }

    if summary.endpoints.is_empty() {
        println!("{}", "No requests were sent.".muted());
    } else {
        print_heading("Endpoints");
        println!("{}", endpoint_table(&summary.endpoints));
    }

    if !summary.skips.is_empty() {
        print_heading("Skipped tasks");
        println!("{}", skip_table(summary));
    }

    println!();
    if summary.violations.is_empty() {
        print_success("No exactly-once violations");
    } else {
        print_heading("Exactly-once violations");
        println!("{}", violation_table(summary));
        print_error(&format!(
            "{} exactly-once violation(s) recorded",
            summary.violations.len()
        ));
    }
}
