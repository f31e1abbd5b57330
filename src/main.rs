use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;

use mseqgen::{BatchProcessor, GeneratorConfig, SequenceGenerator};

/// Run the batch generator described by a JSON configuration
#[derive(Parser, Debug)]
#[command(name = "mseqgen", version, about)]
struct Args {
    /// Generator configuration (JSON)
    config: PathBuf,

    /// Number of epochs to run
    #[arg(short, long, default_value_t = 1)]
    epochs: usize,

    /// Build BPNet inputs and targets instead of one-hot sequence only
    #[arg(long)]
    bpnet: bool,
}

fn run<P, F>(mut generator: SequenceGenerator<P>, epochs: usize, shape: F) -> Result<()>
where
    P: BatchProcessor,
    F: Fn(&P::Batch) -> String,
{
    log::info!(
        "{} windows per epoch in {} batches",
        generator.num_windows(),
        generator.len()
    );
    for epoch in 0..epochs {
        let start = Instant::now();
        let mut n_batches = 0;
        for batch in generator.epoch()? {
            let batch = batch?;
            if n_batches == 0 {
                log::info!("Epoch {epoch} batch shape: {}", shape(&batch));
            }
            n_batches += 1;
        }
        let elapsed = start.elapsed().as_secs_f64();
        log::info!(
            "Epoch {epoch}: {n_batches} batches in {elapsed:.3}s ({:.1} batches/s)",
            n_batches as f64 / elapsed.max(f64::EPSILON)
        );
        generator.set_ready_for_next_epoch();
    }
    Ok(())
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let config = GeneratorConfig::from_json(&args.config)?;
    if args.bpnet {
        let generator = mseqgen::BpnetGenerator::from_config(&config)?;
        run(generator, args.epochs, |batch| {
            format!(
                "sequence {:?}, profile {:?}, logcounts {:?}",
                batch.sequence.dim(),
                batch.profile.dim(),
                batch.logcounts.dim()
            )
        })
    } else {
        let generator = mseqgen::OneHotGenerator::from_config(&config)?;
        run(generator, args.epochs, |batch| {
            format!("inputs {:?}", batch.inputs.dim())
        })
    }
}
