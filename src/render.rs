// src/render.rs

//! Plain-text console output for `evalflow job ...`.
//!
//! Everything here prints to stdout; logs go to stderr.

use serde_json::Value;

use crate::compare::{CellDiff, ComparisonReport};
use crate::job::{Job, Page};
use crate::view::{JobInfo, RunSummary};

pub fn print_job_list(page: &Page<Job>, fullname: bool) {
    println!(
        "{:<34} {:<16} {:<16} {:<10} {:<14} {}",
        "ID", "PROJECT", "NAME", "STATE", "RESOURCES", "CREATED"
    );
    for job in page.items.iter() {
        let id = if fullname { job.id.as_str() } else { job.short_id() };
        let state = if job.removed {
            format!("{} (removed)", job.state)
        } else {
            job.state.to_string()
        };
        println!(
            "{:<34} {:<16} {:<16} {:<10} {:<14} {}",
            id,
            job.project,
            job.name,
            state,
            job.resources,
            job.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    print_page_footer(page.page, page.total_pages(), page.total);
}

pub fn print_job_info(info: &JobInfo) {
    let job = &info.job;
    println!("job:       {}", job.id);
    println!("project:   {}", job.project);
    println!("name:      {}", job.name);
    if let Some(desc) = &job.description {
        println!("desc:      {desc}");
    }
    println!("state:     {}", job.state);
    println!("model:     {}", job.model_ref);
    println!("datasets:  {}", job.dataset_refs.join(", "));
    if let Some(runtime) = &job.runtime_ref {
        println!("runtime:   {runtime}");
    }
    println!("resources: {}", job.resources);
    println!("created:   {}", job.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(finished) = job.finished_at {
        println!("finished:  {}", finished.format("%Y-%m-%d %H:%M:%S"));
    }

    println!();
    println!("{:<16} {:<6} {:<10} {:<8} {}", "STEP", "METHOD", "STATUS", "TASKS", "NEEDS");
    for step in info.steps.iter() {
        println!(
            "{:<16} {:<6} {:<10} {:<8} {}",
            step.name,
            step.method,
            step.status,
            format!("{}/{}", step.succeeded, step.tasks),
            step.needs.join(",")
        );
    }

    println!();
    println!("{:<16} {:<6} {:<10} {}", "STEP", "INDEX", "STATUS", "RESULT");
    for row in info.tasks.items.iter() {
        let detail = match (&row.task.result, &row.task.error) {
            (Some(result), _) => compact(result),
            (None, Some(error)) => format!("error: {error}"),
            (None, None) => "-".to_string(),
        };
        println!(
            "{:<16} {:<6} {:<10} {}",
            row.step_name, row.task.task_index, row.task.status, detail
        );
    }
    print_page_footer(info.tasks.page, info.tasks.total_pages(), info.tasks.total);
}

pub fn print_run_summary(summary: &RunSummary) {
    match summary {
        RunSummary::Command(cmd) => println!("{cmd}"),
        RunSummary::Job(job) => {
            println!("job {} finished: {}", job.id, job.state);
            for step in job.steps.iter() {
                println!("  {:<16} {}", step.step_name, step.status());
            }
        }
        RunSummary::Task {
            job,
            step,
            task_index,
        } => {
            let status = job
                .task(step, *task_index)
                .map(|t| t.status.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!("job {} task {step}-{task_index}: {status} (job {})", job.id, job.state);
        }
    }
}

pub fn print_comparison(report: &ComparisonReport) {
    if report.partial {
        println!("warning: some jobs are still running; the comparison is partial");
    }
    println!("base: {}", report.base_job_id);
    for (i, other) in report.other_job_ids.iter().enumerate() {
        println!("  [{i}] {other}");
    }

    for step in report.steps.iter() {
        println!();
        println!("step {}", step.step);
        for row in step.rows.iter() {
            let base = row.base_value.as_ref().map(compact).unwrap_or_else(|| "-".to_string());
            let cells: Vec<String> = row
                .others
                .iter()
                .enumerate()
                .map(|(i, cell)| format!("[{i}] {}", describe_cell(cell)))
                .collect();
            println!("  #{:<4} base={base}  {}", row.task_index, cells.join("  "));
        }
    }

    println!();
    println!(
        "{:<34} {:<10} {:>8} {:>9} {:>9} {:>7} {:>10}",
        "JOB", "STATE", "COMPARED", "IDENTICAL", "DIFFERING", "MISSING", "MEAN|Δ|"
    );
    for s in report.summary.iter() {
        let delta = s
            .mean_abs_delta
            .map(|d| format!("{d:.4}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<34} {:<10} {:>8} {:>9} {:>9} {:>7} {:>10}",
            s.job_id, s.state, s.compared, s.identical, s.differing, s.missing, delta
        );
    }
}

fn describe_cell(cell: &CellDiff) -> String {
    match cell {
        CellDiff::Same => "same".to_string(),
        CellDiff::Missing => "missing".to_string(),
        CellDiff::Differs { value, delta } => {
            let value = value.as_ref().map(compact).unwrap_or_else(|| "-".to_string());
            match delta {
                Some(d) => format!("{value} ({d:+})"),
                None => value,
            }
        }
    }
}

fn compact(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn print_page_footer(page: usize, pages: usize, total: usize) {
    println!("-- page {page}/{} ({total} total)", pages.max(1));
}
