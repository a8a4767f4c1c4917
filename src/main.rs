use anyhow::{Context, Result};
use clap::Parser;

use pdf_compress::cli::Args;
use pdf_compress::config::CompressionSettings;
use pdf_compress::model::{CompressionJob, JobEvent};
use pdf_compress::orchestrator::{JobState, Orchestrator};
use pdf_compress::transcode::select_renderer;

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    let settings = CompressionSettings::from_args(&args);
    let job = CompressionJob::new(args.inputs.clone(), &args.output_dir, settings)
        .with_context(|| "Failed to set up compression job")?;

    let renderer = select_renderer(args.renderer)
        .with_context(|| format!("Failed to load the {:?} renderer", args.renderer))?;
    log::info!("Compressing {} file(s) with {} renderer", job.len(), renderer.name());

    let handle = Orchestrator::spawn(job, renderer).with_context(|| "Failed to start worker")?;

    let mut last_percent = 0;
    for event in handle.events().iter() {
        match event {
            JobEvent::Progress(progress) => {
                last_percent = progress.percent;
                log::debug!("Progress: {}%", last_percent);
            }
            JobEvent::Log(line) => println!("{}", line.message),
            JobEvent::Completion(done) => {
                if done.success {
                    println!("{}", done.message);
                } else {
                    eprintln!("{}", done.message);
                }
            }
        }
    }

    match handle.join() {
        JobState::Completed => Ok(()),
        state => anyhow::bail!("Compression did not complete ({:?} at {}%)", state, last_percent),
    }
}
