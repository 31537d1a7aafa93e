//! Command line wiring for llamaforge.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use llamaforge_kernels::KernelRegistry;
use llamaforge_llm::{Checkpoint, Generator, Sampler, SamplerConfig, Transformer, Vocabulary};
use memmap2::Mmap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "llamaforge", about = "Llama-2 inference on the CPU")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate text from a checkpoint, streaming it to stdout.
    Generate {
        checkpoint: PathBuf,
        #[arg(long, default_value = "tokenizer.bin")]
        tokenizer: PathBuf,
        /// 0 decodes greedily.
        #[arg(short = 't', long, default_value_t = 1.0)]
        temperature: f32,
        /// Nucleus threshold; values outside (0, 1) disable top-p.
        #[arg(short = 'p', long, default_value_t = 0.9)]
        topp: f32,
        /// Defaults to the current Unix time in seconds.
        #[arg(short = 's', long)]
        seed: Option<u64>,
        /// 0 runs to the model's sequence length.
        #[arg(short = 'n', long, default_value_t = 256)]
        steps: usize,
        #[arg(short = 'i', long)]
        prompt: Option<String>,
        #[arg(long, default_value = "parallel")]
        kernel: String,
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Print the checkpoint header as JSON.
    Inspect { checkpoint: PathBuf },
    /// Time every registered matvec kernel on a synthetic problem.
    BenchMatvec {
        #[arg(long, default_value_t = 4096)]
        rows: usize,
        #[arg(long, default_value_t = 4096)]
        cols: usize,
        #[arg(long, default_value_t = 10)]
        runs: usize,
    },
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Generate {
            checkpoint,
            tokenizer,
            temperature,
            topp,
            seed,
            steps,
            prompt,
            kernel,
            threads,
        } => {
            if let Some(threads) = threads {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build_global()
                    .context("failed to configure the thread pool")?;
            }
            if temperature < 0.0 {
                bail!("temperature must be non-negative, got {temperature}");
            }

            let registry = KernelRegistry::with_default_kernels();
            let kernel = registry.find(&kernel).with_context(|| {
                format!(
                    "unknown kernel `{kernel}`, available: {}",
                    registry.names().join(", ")
                )
            })?;

            let mmap = map_checkpoint(&checkpoint)?;
            let parsed = Checkpoint::from_bytes(&mmap)
                .with_context(|| format!("invalid checkpoint {}", checkpoint.display()))?;
            let config = parsed.config().clone();
            let model = Transformer::new(config.clone(), parsed.weights()?).with_kernel(kernel);

            let vocab_bytes = fs::read(&tokenizer)
                .with_context(|| format!("failed to read tokenizer {}", tokenizer.display()))?;
            let vocab = Vocabulary::from_bytes(&vocab_bytes, config.vocab_size)
                .with_context(|| format!("invalid tokenizer {}", tokenizer.display()))?;

            let seed = match seed {
                Some(seed) => seed,
                None => SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .context("system clock is before the Unix epoch")?
                    .as_secs(),
            };
            let sampler = Sampler::new(SamplerConfig { temperature, topp }, seed)
                .with_context(|| format!("cannot seed the sampler with {seed}"))?;
            info!(seed, temperature, topp, "sampler ready");

            let mut generator = Generator::new(&model, &vocab, sampler);
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let output = generator.generate(prompt.as_deref(), steps, &mut out)?;
            writeln!(out)?;

            eprintln!("achieved tok/s: {:.2}", output.metrics.tokens_per_sec);
        }
        Command::Inspect { checkpoint } => {
            let mmap = map_checkpoint(&checkpoint)?;
            let parsed = Checkpoint::from_bytes(&mmap)
                .with_context(|| format!("invalid checkpoint {}", checkpoint.display()))?;
            let weights = parsed.weights()?;
            info!(
                zero_copy = parsed.is_zero_copy(),
                shared_classifier = weights.classifier_is_shared(),
                "checkpoint parsed"
            );
            println!("{}", serde_json::to_string_pretty(parsed.config())?);
        }
        Command::BenchMatvec { rows, cols, runs } => {
            if rows == 0 || cols == 0 || runs == 0 {
                bail!("rows, cols and runs must all be positive");
            }
            let w: Vec<f32> = (0..rows * cols)
                .map(|i| ((i % 251) as f32 / 251.0) - 0.5)
                .collect();
            let x: Vec<f32> = (0..cols).map(|j| (j as f32 * 0.01).cos()).collect();
            let mut out = vec![0.0f32; rows];

            let registry = KernelRegistry::with_default_kernels();
            for kernel in registry.kernels() {
                // Warm-up
                kernel.run(&mut out, &x, &w);
                let start = Instant::now();
                for _ in 0..runs {
                    kernel.run(&mut out, &x, &w);
                }
                let latency_ms = start.elapsed().as_secs_f64() * 1000.0 / runs as f64;
                let gflops = if latency_ms > 0.0 {
                    (2.0 * rows as f64 * cols as f64) / (latency_ms * 1e6)
                } else {
                    0.0
                };
                println!(
                    "- {}: rows={} cols={} latency_ms={:.3} gflops={:.3}",
                    kernel.name(),
                    rows,
                    cols,
                    latency_ms,
                    gflops
                );
            }
        }
    }
    Ok(())
}

fn map_checkpoint(path: &Path) -> Result<Mmap> {
    let file = File::open(path)
        .with_context(|| format!("failed to open checkpoint {}", path.display()))?;
    // SAFETY: the mapping is read-only and the file is not modified while mapped.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("failed to map checkpoint {}", path.display()))?;
    if mmap.is_empty() {
        warn!(path = %path.display(), "checkpoint file is empty");
    }
    Ok(mmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_flags_parse_with_short_names() {
        let cli = Cli::try_parse_from([
            "llamaforge", "generate", "model.bin", "-t", "0", "-p", "0.5", "-s", "7", "-n", "12",
            "-i", "Once upon",
        ])
        .unwrap();
        match cli.command {
            Command::Generate {
                checkpoint,
                tokenizer,
                temperature,
                topp,
                seed,
                steps,
                prompt,
                kernel,
                threads,
            } => {
                assert_eq!(checkpoint, PathBuf::from("model.bin"));
                assert_eq!(tokenizer, PathBuf::from("tokenizer.bin"));
                assert_eq!(temperature, 0.0);
                assert_eq!(topp, 0.5);
                assert_eq!(seed, Some(7));
                assert_eq!(steps, 12);
                assert_eq!(prompt.as_deref(), Some("Once upon"));
                assert_eq!(kernel, "parallel");
                assert_eq!(threads, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn bench_defaults() {
        let cli = Cli::try_parse_from(["llamaforge", "bench-matvec", "--runs", "3"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::BenchMatvec {
                rows: 4096,
                cols: 4096,
                runs: 3
            }
        ));
    }

    #[test]
    fn missing_checkpoint_is_reported_with_its_path() {
        let err = map_checkpoint(Path::new("/nonexistent/model.bin")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/model.bin"));
    }
}
