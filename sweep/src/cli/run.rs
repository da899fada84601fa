//! `sweep run`.

use super::{RunArgs, setup_logging};
use anyhow::{Context, Result};
use chrono::Local;
use std::process::ExitCode;
use sweep::{
    ExperimentOrchestrator, HttpProbe, OrchestratorSettings, RunLayout, ServingCommandBuilder,
    run_preflight,
};
use sweep_common::util::humanize_hms;
use sweep_common::{ConfigurationSpace, SweepConfig, console};
use sweep_report::export::{OUTCOMES_FILE, SUMMARY_FILE, write_text};
use sweep_report::{ReportAggregator, SummaryContext};
use tracing::{info, warn};

pub async fn execute(args: RunArgs, verbose: bool) -> Result<ExitCode> {
    let mut config = args.config.load()?;
    args.apply(&mut config);
    config.validate().context("invalid sweep configuration")?;

    if args.dry_run {
        let _guards = setup_logging(verbose, None)?;
        print_plan(&config);
        return Ok(ExitCode::SUCCESS);
    }

    let report = run_preflight(&config);
    if let Err(e) = report.into_result() {
        let _guards = setup_logging(verbose, None)?;
        console::error(&e.to_string());
        console::log(&format!("  hint: {}", e.category().remediation()));
        return Ok(ExitCode::FAILURE);
    }

    let layout = RunLayout::plan(&config.sweep.results_dir, Local::now());
    layout
        .create()
        .with_context(|| format!("failed to create {}", layout.root().display()))?;
    let _guards = setup_logging(verbose, Some(&layout.sweep_log()))?;

    print_header(&config, &layout);

    let probe = HttpProbe::new(config.server.health_url(), config.timeouts.probe_timeout())
        .context("failed to build health probe client")?;
    console::log(&format!("Health endpoint: {}", probe.url()));
    let mut settings = OrchestratorSettings::from_config(&config);
    settings.echo_output = !args.quiet;
    let mut orchestrator = ExperimentOrchestrator::new(
        ServingCommandBuilder::new(&config),
        probe,
        layout.clone(),
        settings,
    );

    let space = ConfigurationSpace::new(config.axes(), config.sweep.skip.clone());
    let aggregator = tokio::select! {
        aggregator = orchestrator.run_sweep(space) => aggregator,
        _ = tokio::signal::ctrl_c() => {
            console::warning("Interrupted; stopping server");
            orchestrator.shutdown().await;
            return Ok(ExitCode::from(130));
        }
    };

    write_reports(&aggregator, &config, &layout);
    Ok(finish(&aggregator, &layout))
}

fn print_plan(config: &SweepConfig) {
    let plan = ConfigurationSpace::new(config.axes(), config.sweep.skip.clone()).plan();
    console::banner("Dry run: scheduled configurations");
    for (i, configuration) in plan.scheduled.iter().enumerate() {
        console::log(&format!("{:>3}. {configuration}", i + 1));
    }
    for skipped in &plan.skipped {
        console::warning(&format!(
            "Skipping {} ({})",
            skipped.configuration, skipped.reason
        ));
    }
    console::log(&format!(
        "{} scheduled, {} skipped",
        plan.scheduled.len(),
        plan.skipped.len()
    ));
    match config.to_toml_string() {
        Ok(toml) => {
            console::banner("Effective configuration");
            println!("{toml}");
        }
        Err(e) => warn!(error = %e, "Could not render effective configuration"),
    }
}

fn print_header(config: &SweepConfig, layout: &RunLayout) {
    let sweep = &config.sweep;
    let axes = config.axes();
    console::banner("Serving Configuration Sweep");
    console::log(&format!("Models: {}", sweep.models.join(", ")));
    console::log(&format!("TP values: {:?}", sweep.parallelism));
    console::log(&format!("Quantization: {}", sweep.quantization.join(", ")));
    console::log(&format!("Enforce eager: {:?}", sweep.eager));
    console::log(&format!("Combinations before skip rules: {}", axes.cardinality()));
    console::log(&format!("Results directory: {}", layout.root().display()));
    info!(
        results = %layout.root().display(),
        combinations = axes.cardinality(),
        "Sweep starting"
    );
}

fn workload(config: &SweepConfig) -> Vec<(String, String)> {
    let b = &config.benchmark;
    let t = &config.timeouts;
    [
        ("Input length", b.input_len.to_string()),
        ("Output length", b.output_len.to_string()),
        ("Concurrency", b.concurrency.to_string()),
        ("Num prompts", b.num_prompts.to_string()),
        ("Max model len", config.server.max_model_len.to_string()),
        ("Startup timeout", format!("{}s", t.startup)),
        ("Benchmark timeout", format!("{}s", t.benchmark)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Bookkeeping only: a failed write is reported and never changes the exit
/// code.
fn write_reports(aggregator: &ReportAggregator, config: &SweepConfig, layout: &RunLayout) {
    let now = Local::now();
    let ctx = SummaryContext {
        title: "Serving Configuration Sweep Results".to_string(),
        generated: now,
        workload: workload(config),
        results_dir: layout.root().to_path_buf(),
        logs_dir: layout.logs().to_path_buf(),
    };

    let summary = aggregator.render_summary(&ctx);
    let summary_path = layout.root().join(SUMMARY_FILE);
    match write_text(&summary_path, &summary) {
        Ok(()) => console::success(&format!("Summary saved to: {}", summary_path.display())),
        Err(e) => warn!(error = %e, "Failed to write summary"),
    }
    println!("{summary}");

    if let Err(e) = aggregator.write_outcomes_json(&layout.root().join(OUTCOMES_FILE)) {
        warn!(error = %e, "Failed to write outcomes");
    }
    match aggregator.write_analysis_exports(layout.root(), now) {
        Ok(paths) => {
            console::success(&format!("Analysis saved to: {}", paths.analysis.display()));
            console::success(&format!("CSV saved to: {}", paths.csv.display()));
        }
        Err(e) => warn!(error = %e, "Failed to write analysis exports"),
    }
}

fn finish(aggregator: &ReportAggregator, layout: &RunLayout) -> ExitCode {
    let totals = aggregator.totals();
    console::banner("Sweep completed");
    console::log(&format!("Total duration: {}", humanize_hms(totals.duration)));
    console::log(&format!("Results: {}", layout.root().display()));
    info!(
        total = totals.total,
        succeeded = totals.succeeded,
        failed = totals.failed,
        skipped = totals.skipped,
        "Sweep finished"
    );

    if aggregator.all_succeeded() {
        console::success(&format!("All {} experiments succeeded", totals.total));
        ExitCode::SUCCESS
    } else {
        console::error(&format!(
            "{} of {} experiments failed",
            totals.failed, totals.total
        ));
        ExitCode::FAILURE
    }
}
