use std::env;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{LevelFilter, debug, error, info, warn};

use ref_diff::cli::{parse, Commands};
use ref_diff::pipelines::ref_diff as pipeline;
use ref_diff::utils::system::{detect_cores_and_load, thread_hint_warning, detect_ram};
use ref_diff::PipelineError;

#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n ref-diff\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}", dir);

    let Commands::Compare(compare_args) = args.command;

    match detect_cores_and_load().await {
        Ok((cores, load)) => {
            if let Some(warning) = thread_hint_warning(compare_args.threads, cores, load) {
                warn!("{}", warning);
            }
        }
        Err(e) => debug!("Could not probe CPUs: {}", e),
    }
    if let Ok((total_ram, available_ram)) = detect_ram() {
        debug!("Available RAM: {} bytes (~{} GiB)", available_ram, available_ram / 1_073_741_824);
        debug!("Total RAM: {} bytes (~{} GiB)", total_ram, total_ram / 1_073_741_824);
    }

    let run_config = match pipeline::prepare(&compare_args, &dir) {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("Pre-flight failed: {}", e);
            std::process::exit(1);
        }
    };

    match pipeline::run(run_config).await {
        Ok(annotated) => {
            info!("Annotated results: {}", annotated.display());
        }
        Err(e) => {
            error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
            if let PipelineError::StageFailed { diagnostics, .. } = &e {
                if !diagnostics.is_empty() {
                    error!("Last tool output:\n{}", diagnostics);
                }
            }
            std::process::exit(1);
        }
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}
