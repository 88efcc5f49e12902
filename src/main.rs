use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use campaign::config::Config;
use campaign::deployment::{
    DeploymentLogger, DeploymentPipeline, DeploymentSummary, PhaseFile, PhaseOrchestrator,
    PhaseResult,
};
use campaign::performance::{
    Benchmark, BuildStatus, PerformanceMonitor, PerformanceReport, PerformanceReporter,
    PerformanceState,
};
use campaign::{clog, clog_error, Result};

/// Campaign - phased deployment runner and performance validator
#[derive(Parser, Debug)]
#[command(name = "campaign")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    CAMPAIGN_DEBUG=1         Enable debug logging (alternative to --debug)\n    CAMPAIGN_LOG_LEVEL=...   error|warn|info|debug|trace")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.campaign/campaign.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Config file (defaults to ~/.campaign/campaign.toml)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the phases declared in a TOML file
    Deploy {
        /// Phase definition file
        phases: PathBuf,

        /// Append the deployment audit log to this file
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Run every benchmark once
    Bench,

    /// Generate a performance report
    Report {
        /// Export the report as JSON to this path
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,

        /// Build status from the external build (passing|failing)
        #[arg(long)]
        build_status: Option<BuildStatus>,
    },

    /// Generate reports periodically until interrupted
    Monitor {
        /// Seconds between reports (defaults to the configured interval)
        #[arg(long)]
        interval: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    campaign::log::init(cli.debug);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let rt = tokio::runtime::Runtime::new()?;
    let succeeded = match cli.command {
        Command::Deploy { phases, log } => rt.block_on(run_deploy(&config, &phases, log))?,
        Command::Bench => rt.block_on(run_bench(&config))?,
        Command::Report {
            output,
            build_status,
        } => rt.block_on(run_report(&config, output, build_status))?,
        Command::Monitor { interval } => rt.block_on(run_monitor(&config, interval))?,
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_deploy(config: &Config, phases_file: &Path, log: Option<PathBuf>) -> Result<bool> {
    clog!("Deploy command: phases={}", phases_file.display());
    let phases = PhaseFile::load(phases_file)?.into_phases(&config.deployment)?;

    let logger = match log.or_else(|| config.deployment.log_path()) {
        Some(path) => DeploymentLogger::with_file(path),
        None => DeploymentLogger::new(),
    };
    let orchestrator = PhaseOrchestrator::from_settings(&config.deployment, logger);
    let pipeline = DeploymentPipeline::new(orchestrator);

    let results = pipeline.execute_deployment(&phases).await?;
    for result in &results {
        print_phase(result);
    }

    let summary = DeploymentSummary::from_results(phases.len(), &results);
    println!();
    println!(
        "Phases run: {}/{}   errors: {}   warnings: {}",
        summary.phases_run, summary.phases_planned, summary.total_errors, summary.total_warnings
    );
    match &summary.halted_at {
        Some(phase) => {
            clog_error!("Deployment halted at {}", phase);
            println!("Deployment halted at phase '{}'", phase);
        }
        None => println!("Deployment completed"),
    }
    Ok(summary.succeeded)
}

fn print_phase(result: &PhaseResult) {
    let mark = if result.success { "ok" } else { "FAILED" };
    println!(
        "[{}] {}  tasks {}/{} succeeded, {} failed{}  ({} ms)",
        mark,
        result.phase_id,
        result.tasks_succeeded,
        result.tasks_executed,
        result.tasks_failed,
        if result.rollback_performed { ", rolled back" } else { "" },
        result.duration().num_milliseconds()
    );
    for validation in &result.validation_results {
        let status = if validation.success { "pass" } else { "fail" };
        println!("    check {:<24} {}", validation.check_name, status);
    }
    for warning in &result.warnings {
        println!("    warning: {}", warning);
    }
    for error in &result.errors {
        println!("    error: {}", error);
    }
}

async fn restored_state(config: &Config) -> Result<PerformanceState> {
    let state = PerformanceState::new(config.performance.history_limit);
    let path = config.performance.history_path()?;
    if let Err(e) = state.restore(&path).await {
        clog_error!("Ignoring unreadable history {}: {}", path.display(), e);
    }
    Ok(state)
}

async fn run_bench(config: &Config) -> Result<bool> {
    clog!("Bench command");
    let state = restored_state(config).await?;
    let reporter = PerformanceReporter::from_settings(&config.performance, state.clone());

    let benchmarks = reporter.run_benchmarks().await;
    print_benchmarks(&benchmarks);
    state.flush(&config.performance.history_path()?).await?;
    Ok(true)
}

fn print_benchmarks(benchmarks: &[Benchmark]) {
    println!(
        "{:<26} {:<10} {:>10} {:>10} {:>10} {:>8}  status",
        "benchmark", "category", "current", "target", "baseline", "improv"
    );
    for b in benchmarks {
        println!(
            "{:<26} {:<10} {:>8.2}ms {:>8.2}ms {:>8.2}ms {:>7.1}%  {}",
            b.name,
            b.category.to_string(),
            b.current,
            b.target,
            b.baseline,
            b.improvement * 100.0,
            b.status
        );
    }
}

fn print_report(report: &PerformanceReport) {
    print_benchmarks(&report.benchmarks);
    println!();
    match &report.cache_metrics {
        Some(cache) => {
            for tier in cache.tiers() {
                println!(
                    "cache {:<9} hit rate {:>5.1}%  avg {:>7.3}ms  size {}/{}",
                    tier.tier.to_string(),
                    tier.hit_rate * 100.0,
                    tier.avg_response_time,
                    tier.size,
                    tier.max_size
                );
            }
            println!("cache efficiency {:.1}", cache.overall.efficiency);
        }
        None => println!("cache metrics unavailable"),
    }
    for regression in report.regression_tests.iter().filter(|r| r.regression_detected) {
        println!(
            "regression {}: {:+.1}% (threshold {:.1}%)",
            regression.test_name, regression.regression_percentage, regression.threshold
        );
    }
    println!();
    println!("overall score: {:.1}", report.overall_score);
    println!("improvement maintained: {}", report.improvement_maintained);
    for recommendation in &report.recommendations {
        println!("  - {}", recommendation);
    }
    for alert in &report.alerts {
        println!("  [{}] {}: {}", alert.severity, alert.kind(), alert.message);
    }
}

async fn run_report(
    config: &Config,
    output: Option<PathBuf>,
    build_status: Option<BuildStatus>,
) -> Result<bool> {
    clog!("Report command: output={:?} build_status={:?}", output, build_status);
    let state = restored_state(config).await?;
    let reporter = PerformanceReporter::from_settings(&config.performance, state.clone());

    if let Some(status) = build_status {
        reporter.check_build_status(status).await;
    }
    let report = match &output {
        Some(path) => {
            let report = reporter.export_performance_data(path).await?;
            println!("Exported performance data to {}", path.display());
            report
        }
        None => reporter.generate_report().await,
    };
    print_report(&report);
    state.flush(&config.performance.history_path()?).await?;
    Ok(build_status != Some(BuildStatus::Failing))
}

async fn run_monitor(config: &Config, interval: Option<u64>) -> Result<bool> {
    let interval = interval
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| config.performance.monitor_interval());
    clog!("Monitor command: interval={:?}", interval);

    let state = restored_state(config).await?;
    let reporter = PerformanceReporter::from_settings(&config.performance, state);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = PerformanceMonitor::new(
        reporter,
        interval,
        Some(config.performance.history_path()?),
    )
    .with_reports(tx)
    .spawn();

    println!("Monitoring every {}s, Ctrl-C to stop", interval.as_secs());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                clog!("Monitor interrupted");
                break;
            }
            report = rx.recv() => match report {
                Some(report) => println!(
                    "[{}] score {:.1}, {} alert(s)",
                    report.timestamp.format("%H:%M:%S"),
                    report.overall_score,
                    report.alerts.len()
                ),
                None => break,
            },
        }
    }

    handle.stop().await?;
    println!("History saved");
    Ok(true)
}
