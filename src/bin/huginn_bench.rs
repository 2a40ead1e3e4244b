//! huginn-bench - synthetic workload runner.
//!
//! Builds an orchestrator over a deterministic hashing engine and runs the
//! same workload twice: once against a cold cache, once warm.

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use clap::Parser;
use sha2::{Digest, Sha256};
use tracing::info;

use huginn::{BatchOptions, BatchReport, Config, EmbeddingEngine, Orchestrator, WorkRecord};

/// `{version}+{branch}.{sha}` as stamped at build time.
static LONG_VERSION: LazyLock<String> = LazyLock::new(huginn::version_string);

/// Huginn synthetic benchmark
#[derive(Parser)]
#[command(name = "huginn-bench")]
#[command(version = huginn::PKG_VERSION, long_version = LONG_VERSION.as_str())]
#[command(about = "Run a synthetic embedding workload through huginn")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long, env = "HUGINN_CONFIG")]
    config: Option<PathBuf>,

    /// Number of synthetic records.
    #[arg(short, long, default_value_t = 500)]
    records: usize,

    /// Embedding dimensions produced by the hashing engine.
    #[arg(short, long, default_value_t = 64)]
    dimensions: usize,

    /// Fixed batch size instead of the adaptive one.
    #[arg(short, long)]
    batch_size: Option<usize>,
}

/// Deterministic engine: every vector is derived from SHA-256 of the text.
struct HashingEngine {
    dimensions: usize,
}

#[async_trait]
impl EmbeddingEngine for HashingEngine {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn generate_embeddings(&self, texts: &[String]) -> huginn::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

impl HashingEngine {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = Vec::with_capacity(self.dimensions);
        let mut block = 0u32;
        while vector.len() < self.dimensions {
            let mut hasher = Sha256::new();
            hasher.update(block.to_le_bytes());
            hasher.update(text.as_bytes());
            for byte in hasher.finalize() {
                if vector.len() == self.dimensions {
                    break;
                }
                vector.push(f32::from(byte) / 127.5 - 1.0);
            }
            block += 1;
        }
        vector
    }
}

fn synthetic_records(count: usize) -> Vec<WorkRecord> {
    (0..count)
        .map(|i| {
            WorkRecord::new(
                format!("symbol-{i}"),
                format!("fn symbol_{i}(input: &[u8]) -> usize"),
                format!("Synthetic function number {i}"),
            )
            .snippet(format!("input.len() + {i}"))
            .meta("module", format!("mod_{}", i % 16))
        })
        .collect()
}

fn print_report(label: &str, report: &BatchReport) {
    println!(
        "{label}: {} results ({} cached, {} computed, {} failed) in {:.1} ms, {} strategy changes, peak memory {:.1}%",
        report.results.len(),
        report.cache_hits,
        report.computed,
        report.failed.len(),
        report.duration.as_secs_f64() * 1000.0,
        report.strategy_changes,
        report.peak_memory_percent,
    );
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    info!(version = huginn::version_string(), records = args.records, "huginn-bench starting");

    let engine = Arc::new(HashingEngine {
        dimensions: args.dimensions.max(1),
    });
    let orchestrator = Orchestrator::builder(engine).from_config(&config).build()?;

    let records = synthetic_records(args.records);
    let mut options = BatchOptions::new();
    if let Some(size) = args.batch_size {
        options = options.batch_size(size);
    }

    let cold = orchestrator.batch_process(&records, &options).await?;
    print_report("cold", &cold);
    let warm = orchestrator.batch_process(&records, &options).await?;
    print_report("warm", &warm);

    let metrics = orchestrator.get_performance_metrics();
    if let Some(cache) = &metrics.cache {
        println!("cache: {}", serde_json::to_string_pretty(cache)?);
    }
    if let Some(batch) = &metrics.batch {
        println!(
            "batch: current size {}, recommendation {} ({:?}, confidence {:.2})",
            batch.current_batch_size,
            batch.recommendation.recommended_batch_size,
            batch.recommendation.reason,
            batch.recommendation.confidence,
        );
    }
    if let Some(memory) = &metrics.memory {
        println!("memory: {:.1}% used", memory.usage_percent);
    }
    println!("overall score: {:.3}", metrics.overall_score);

    orchestrator.shutdown().await?;
    Ok(())
}
