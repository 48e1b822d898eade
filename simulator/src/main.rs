use anyhow::Context;
use clap::Parser;
use log::warn;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::WorkflowConfig;
use workflow::runner::{Runner, WorkflowResult};

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Offline testbench for the vector voltmeter core")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    #[arg(long, default_value_t = 4)]
    channels: usize,
    #[arg(long, default_value_t = 200)]
    cycles: usize,
    /// Filter shift written through the host registers, 0..=15
    #[arg(long, default_value_t = 0)]
    filter_shift: u32,
    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
    /// Also write the JSON report to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

fn print_report(result: &WorkflowResult) {
    let counters = &result.counters;
    println!(
        "frames seen {} / published {} (coalesced {}), triggers {}, retriggers {}",
        result.frames_seen,
        counters.published,
        counters.coalesced,
        counters.triggers,
        counters.retriggers
    );
    for (report, std) in result.channels.iter().zip(&result.summary.phase_std) {
        let expected = report
            .expected_phase
            .map(|phase| format!("{:+9.4}", phase))
            .unwrap_or_else(|| "reference".into());
        println!(
            "ch{}: {:.6} FS ({:7.2} dBFS) phase {:+9.4} deg, expected {:.6} FS {}, phase std {:.1} LSB",
            report.channel,
            report.mag_full_scale,
            report.mag_dbfs,
            report.phase_degrees,
            report.expected_mag,
            expected,
            std
        );
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let workflow_config = if let Some(path) = args.workflow {
        WorkflowConfig::load(path)?
    } else {
        WorkflowConfig::from_args(args.channels, args.cycles, args.filter_shift)
    };
    let runner = Runner::new(workflow_config);

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating simulator runtime")?;
    let outcome = runtime.block_on(async {
        tokio::select! {
            result = runner.execute() => result.map(Some),
            interrupted = signal::ctrl_c() => {
                interrupted.context("awaiting Ctrl+C")?;
                warn!("interrupted before the run completed");
                Ok::<_, anyhow::Error>(None)
            }
        }
    })?;
    // an interrupted pipeline thread is not waited for
    runtime.shutdown_timeout(Duration::from_millis(100));

    let Some(result) = outcome else {
        return Ok(());
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_report(&result);
    }
    if let Some(path) = args.report {
        let json = serde_json::to_string_pretty(&result).context("encoding report")?;
        fs::write(&path, json)
            .with_context(|| format!("writing report {}", path.display()))?;
    }
    Ok(())
}
