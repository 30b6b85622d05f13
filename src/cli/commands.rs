use crate::app::{Result, RunContext};
use crate::domain::Source;
use crate::pipeline::{self, RunReport};
use crate::store::GuardVerdict;

fn print_report(report: &RunReport) {
    for source in &report.sources {
        match &source.error {
            Some(e) => eprintln!("  {}: failed: {}", source.source, e),
            None => println!(
                "  {}: {} records ({} new) from {} targets, {} empty",
                source.source,
                source.records,
                source.new_records,
                source.targets,
                source.empty_targets
            ),
        }
        if !source.skipped_groups.is_empty() {
            println!("    skipped: {}", source.skipped_groups.join(", "));
        }
    }

    let meta = &report.meta;
    println!(
        "Total: {} records, {} new, {} placeholders, {} flagged for recheck",
        meta.total, meta.new_this_run, meta.placeholder_count, meta.recheck_count
    );
    print_verdict(report.verdict);
}

fn print_verdict(verdict: GuardVerdict) {
    if verdict.is_pass() {
        println!("Commit guard: {}", verdict);
    } else {
        eprintln!("Commit guard: {}", verdict);
    }
}

/// Returns whether the commit guard let the dataset through
pub async fn crawl(ctx: &RunContext, force: bool) -> Result<bool> {
    let sources = ctx.registry.sources();
    if sources.is_empty() {
        println!("No sources enabled");
        return Ok(false);
    }

    let names: Vec<&str> = sources.iter().map(Source::as_str).collect();
    println!("Crawling {} sources: {}", names.len(), names.join(", "));

    let report = pipeline::crawl(ctx, force).await?;
    print_report(&report);
    Ok(report.passed())
}

pub async fn recheck(ctx: &RunContext, force: bool) -> Result<bool> {
    let report = pipeline::recheck(ctx, force).await?;
    if report.sources.is_empty() {
        println!("Nothing to recheck");
    }
    print_report(&report);
    Ok(report.passed())
}

pub fn check(ctx: &RunContext, force: bool) -> Result<bool> {
    let (meta, verdict) = pipeline::check(ctx, force)?;
    println!(
        "{} records, {} placeholders, {} flagged for recheck",
        meta.total, meta.placeholder_count, meta.recheck_count
    );
    print_verdict(verdict);
    Ok(verdict.is_pass())
}

pub fn list_records(
    ctx: &RunContext,
    recheck_only: bool,
    source: Option<Source>,
    limit: usize,
) -> Result<()> {
    let mut records = ctx.store.load()?.into_records();
    records.retain(|r| (!recheck_only || r.needs_recheck) && source.is_none_or(|s| r.source == s));

    if records.is_empty() {
        println!("No records");
        return Ok(());
    }

    crate::store::json::sort_records(&mut records);
    let shown = records.len().min(limit);
    for record in records.iter().take(limit) {
        let marker = if record.needs_recheck { "?" } else { " " };
        let date = record
            .date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "          ".to_string());

        println!(
            "{} {} {:<8} {:>4} files  {}\n    {}",
            marker,
            date,
            record.source.as_str(),
            record.file_count,
            record.display_title(),
            record.url
        );
    }
    if shown < records.len() {
        println!("... {} more", records.len() - shown);
    }

    Ok(())
}
