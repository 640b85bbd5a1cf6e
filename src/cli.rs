//! CLI commands implementation.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use tokio::sync::mpsc;

use crate::config::{PipelineConfig, ReferenceData};
use crate::extract::TesseractBlockSource;
use crate::ingest::FileValidator;
use crate::models::{DocumentCategory, RiskTier};
use crate::pipeline::{IngestRequest, Pipeline, PipelineEvent, WorkerPool};
use crate::repository::{
    MemoryDocumentRepository, MemoryQueueRepository, MemoryResultRepository,
};
use crate::storage::FsObjectStore;

#[derive(Parser)]
#[command(name = "veridoc")]
#[command(about = "Document verification and fraud-scoring pipeline")]
#[command(version)]
pub struct Cli {
    /// Pipeline configuration file (TOML)
    #[arg(long, global = true, env = "VERIDOC_CONFIG")]
    config: Option<PathBuf>,

    /// Reference data file: fraud patterns, templates, issuers, blacklist
    #[arg(long, global = true, env = "VERIDOC_REFERENCE")]
    reference: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Run files through the full pipeline and print their assessments
    Analyze {
        /// Files to analyze
        files: Vec<PathBuf>,

        /// Document category for all files
        #[arg(long, default_value = "other")]
        category: String,

        /// Directory for stored content and thumbnails
        #[arg(long, default_value = "veridoc-data")]
        data_dir: PathBuf,
    },

    /// Validate a file without queueing it
    Check {
        /// File to validate
        file: PathBuf,

        /// Declared MIME type
        #[arg(long, default_value = "application/pdf")]
        mime: String,
    },

    /// Show the loaded reference tables
    Patterns,
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let reference = match &cli.reference {
        Some(path) => ReferenceData::load(path)?,
        None => ReferenceData::default(),
    };

    match cli.command {
        Commands::Analyze {
            files,
            category,
            data_dir,
        } => analyze(config, reference, files, &category, data_dir).await,
        Commands::Check { file, mime } => check(config, file, &mime),
        Commands::Patterns => patterns(reference),
    }
}

async fn analyze(
    config: PipelineConfig,
    reference: ReferenceData,
    files: Vec<PathBuf>,
    category: &str,
    data_dir: PathBuf,
) -> anyhow::Result<()> {
    if files.is_empty() {
        anyhow::bail!("no files given");
    }
    let category = DocumentCategory::parse(category)
        .ok_or_else(|| anyhow::anyhow!("unknown category: {category}"))?;

    let pipeline = Arc::new(Pipeline::new(
        config,
        reference,
        Arc::new(FsObjectStore::new(data_dir)),
        Arc::new(MemoryDocumentRepository::new()),
        Arc::new(MemoryResultRepository::new()),
        Arc::new(MemoryQueueRepository::new()),
        Arc::new(TesseractBlockSource::new()),
    ));

    let mut expected = 0usize;
    for path in &files {
        let bytes = std::fs::read(path)?;
        let declared = mime_from_path(path);
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        match pipeline
            .ingest(IngestRequest {
                bytes: &bytes,
                declared_mime: declared,
                filename: &filename,
                submission_id: "cli",
                uploader_id: "cli",
                category,
                priority: None,
                metadata: None,
            })
            .await
        {
            Ok(document) => {
                expected += 1;
                println!(
                    "  {} Queued {} ({}, {} bytes)",
                    style("→").cyan(),
                    filename,
                    document.mime_type,
                    document.size
                );
            }
            Err(e) => {
                println!("  {} Rejected {}: {}", style("✗").red(), filename, e);
            }
        }
    }

    if expected == 0 {
        anyhow::bail!("nothing was queued");
    }

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let handle = WorkerPool::new(pipeline.clone()).spawn(event_tx);

    let mut settled = 0usize;
    while settled < expected {
        let Some(event) = event_rx.recv().await else {
            break;
        };
        match event {
            PipelineEvent::Completed {
                document_id,
                fraud_score,
                risk_tier,
                manual_review_required,
            } => {
                settled += 1;
                let tier = match risk_tier {
                    RiskTier::Low => style(risk_tier.as_str()).green(),
                    RiskTier::Medium => style(risk_tier.as_str()).yellow(),
                    _ => style(risk_tier.as_str()).red(),
                };
                println!(
                    "  {} {document_id}: score {fraud_score:.3}, {tier} risk{}",
                    style("✓").green(),
                    if manual_review_required {
                        " (manual review)"
                    } else {
                        ""
                    }
                );
                if let Ok(results) = pipeline.get_results(&document_id).await {
                    for line in results.assessment.review_notes.lines() {
                        println!("      {line}");
                    }
                }
            }
            PipelineEvent::Failed {
                document_id,
                attempts,
                error,
                retrying,
                ..
            } => {
                if !retrying {
                    settled += 1;
                }
                println!(
                    "  {} {document_id}: attempt {attempts} failed: {error}{}",
                    style("✗").red(),
                    if retrying { " (will retry)" } else { "" }
                );
            }
            _ => {}
        }
    }

    handle.shutdown().await;

    let stats = pipeline.statistics().await?;
    println!(
        "\n{} {} total, {} completed, {} failed, {} requiring manual review",
        style("Summary:").bold(),
        stats.total,
        stats.completed,
        stats.failed,
        stats.requiring_manual_review
    );
    Ok(())
}

fn check(config: PipelineConfig, file: PathBuf, mime: &str) -> anyhow::Result<()> {
    let bytes = std::fs::read(&file)?;
    let validation = FileValidator::new(config.max_file_size).validate(&bytes, mime);

    println!("size:     {} bytes", validation.info.size);
    println!("type:     {}", validation.info.detected_type);
    println!("checksum: {}", validation.info.checksum);
    if validation.is_valid {
        println!("{}", style("valid").green());
    } else {
        for error in &validation.errors {
            println!("{} {error}", style("invalid:").red());
        }
    }
    Ok(())
}

fn patterns(reference: ReferenceData) -> anyhow::Result<()> {
    println!("{}", style("Text patterns").bold());
    for p in &reference.text_patterns {
        println!(
            "  [{}/{:.2}] {}  ({})",
            p.severity.as_str(),
            p.confidence,
            p.pattern,
            p.description
        );
    }
    println!("{}", style("Known-fraud patterns").bold());
    for p in &reference.fraud_patterns {
        println!("  [{:.2}] {}  ({})", p.confidence, p.pattern, p.description);
    }
    println!("{}", style("Templates").bold());
    for t in &reference.templates {
        println!(
            "  {}: requires {:?}, fields {:?}",
            t.category.as_str(),
            t.required_elements,
            t.expected_fields
        );
    }
    println!("{}", style("Blacklisted serials").bold());
    if reference.blacklisted_serials.is_empty() {
        println!("  (none)");
    }
    for serial in &reference.blacklisted_serials {
        println!("  {serial}");
    }
    Ok(())
}

fn mime_from_path(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "application/pdf",
    }
}
