//! Run report rendering

use anyhow::Result;
use colored::Colorize;
use tabled::{Table, Tabled};

use crate::workload::RunReport;

#[derive(Tabled)]
struct Row {
    metric: &'static str,
    value: String,
}

fn rows(report: &RunReport) -> Vec<Row> {
    let stats = &report.final_stats;
    vec![
        Row {
            metric: "Queue",
            value: stats.name.clone(),
        },
        Row {
            metric: "Submitted",
            value: report.submitted.to_string(),
        },
        Row {
            metric: "Succeeded",
            value: report.succeeded.to_string(),
        },
        Row {
            metric: "Failed",
            value: report.failed.to_string(),
        },
        Row {
            metric: "Nested",
            value: report.nested.to_string(),
        },
        Row {
            metric: "Peak workers",
            value: format!("{} (max {})", report.peak_workers, stats.max_workers),
        },
        Row {
            metric: "Elapsed",
            value: format!("{} ms", report.elapsed_ms),
        },
        Row {
            metric: "Final state",
            value: stats.state.as_str().to_string(),
        },
        Row {
            metric: "Pending at stop",
            value: stats.pending.to_string(),
        },
        Row {
            metric: "Executor terminated",
            value: report.executor_terminated.to_string(),
        },
    ]
}

pub fn print(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    if report.failed == 0 {
        println!("{}", "✓ Workload completed".green().bold());
    } else {
        println!(
            "{}",
            format!("✗ Workload completed with {} failed item(s)", report.failed)
                .yellow()
                .bold()
        );
    }
    println!();
    println!("{}", Table::new(rows(report)));
    Ok(())
}
