//! `sweep analyze`.

use anyhow::{Context, Result};
use std::path::Path;
use sweep_common::console;
use sweep_report::load_results_dir;

pub fn execute(results_dir: &Path) -> Result<()> {
    console::log(&format!("Analyzing results in: {}", results_dir.display()));
    let aggregator = load_results_dir(results_dir)
        .with_context(|| format!("failed to load results from {}", results_dir.display()))?;
    console::log(&format!(
        "Loaded {} result files",
        aggregator.outcomes().len()
    ));

    let generated = chrono::Local::now();
    let paths = aggregator
        .write_analysis_exports(results_dir, generated)
        .context("failed to write analysis exports")?;

    println!("{}", aggregator.render_analysis(generated));
    console::success(&format!("Detailed analysis saved to: {}", paths.analysis.display()));
    console::success(&format!("Raw results saved to: {}", paths.raw_results.display()));
    console::success(&format!("CSV summary saved to: {}", paths.csv.display()));
    Ok(())
}
