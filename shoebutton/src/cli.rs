//! Command-line interface for the Shoebutton Artistry toolkit.
//!
//! All pipeline logic lives in `shoebutton-core`; this module is argument
//! parsing, credential wiring and output formatting. Failure kinds map to
//! process exit codes (see `PipelineError::exit_code`): storage backend 2,
//! bad destination 3, unexportable shape 4, local write 5, partial
//! transfers 6, storefront transport 7, anything else 1.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use shoebutton_core::catalog::{catalog_to_columns, BucketCatalog};
use shoebutton_core::contract::{
    CreationDraft, DownloadResult, Encoder, ImageInput, ObjectStore, PageRequest, Storefront,
    TransferOutcome,
};
use shoebutton_core::csv_export::write_csv;
use shoebutton_core::error::{PipelineError, StoreError};
use shoebutton_core::gcs::GcsClient;
use shoebutton_core::names::NameParser;
use shoebutton_core::similarity::{best_matches, caption, similarity_matrix, EmbeddingRecord};
use shoebutton_core::synchronise::synchronise;
use shoebutton_core::transfer::{BulkDownloader, DownloadLimits};

use crate::encoder::RemoteEncoder;
use crate::load_config::load_config;
use crate::storefront::CultsClient;

/// CLI for Shoebutton Artistry: product upload and merchandising automation.
#[derive(Parser)]
#[clap(
    name = "shoebutton",
    version,
    about = "Automation tools for Shoebutton Artistry: bucket sync, storefront publishing, artwork matching"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Verify storage credentials
    Auth {
        #[clap(subcommand)]
        command: AuthCommands,
    },
    /// Cloud storage operations
    Storage {
        #[clap(subcommand)]
        command: StorageCommands,
    },
    /// Run the full catalog → CSV → download pipeline from a config file
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Embedding and similarity utilities
    Similarity {
        #[clap(subcommand)]
        command: SimilarityCommands,
    },
    /// Storefront (Cults3D) operations
    Storefront {
        #[clap(subcommand)]
        command: StorefrontCommands,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Load a service-account key and optionally probe a bucket
    Init {
        /// Path to the service account JSON key file
        service_account_file: PathBuf,
        /// Optional bucket to test access against
        #[clap(long)]
        bucket: Option<String>,
        /// Only consider keys with this prefix during the probe
        #[clap(long)]
        prefix: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum StorageCommands {
    /// Work with objects in a bucket
    Files {
        #[clap(subcommand)]
        command: FilesCommands,
    },
}

#[derive(Subcommand)]
pub enum FilesCommands {
    /// List current files with their parsed display names
    List {
        /// Bucket to access
        #[clap(long)]
        bucket: String,
        /// Only list keys with this prefix
        #[clap(long)]
        prefix: Option<String>,
        /// Output format
        #[clap(long, value_enum, default_value = "table")]
        output: OutputFormat,
        /// Where the CSV lands when `--output csv` is chosen
        #[clap(long, default_value = "catalog.csv")]
        csv_path: PathBuf,
        /// Service account key file (falls back to SERVICE_ACCOUNT_FILE)
        #[clap(long)]
        service_account_file: Option<PathBuf>,
    },
    /// Download files from a bucket
    Download {
        /// Bucket to access
        #[clap(long)]
        bucket: String,
        /// Only download keys with this prefix
        #[clap(long)]
        prefix: Option<String>,
        /// Destination folder (must exist)
        #[clap(long, default_value = ".")]
        destination: PathBuf,
        /// Upper bound on objects per batch
        #[clap(long, default_value_t = 1000)]
        max_objects: usize,
        /// Upper bound on simultaneous transfers
        #[clap(long, default_value_t = 8)]
        max_concurrency: usize,
        /// Service account key file (falls back to SERVICE_ACCOUNT_FILE)
        #[clap(long)]
        service_account_file: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum SimilarityCommands {
    /// Encode inputs to embeddings
    Encode {
        #[clap(subcommand)]
        command: EncodeCommands,
    },
    /// Pair text embeddings with their best-matching image embeddings
    Match {
        /// Image embeddings JSON written by `similarity encode images`
        #[clap(long)]
        images: PathBuf,
        /// Text embeddings JSON written by `similarity encode text`
        #[clap(long)]
        texts: PathBuf,
        /// Destination CSV of best matches
        #[clap(long)]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum EncodeCommands {
    /// Encode images in a directory
    Images {
        /// Directory of images (png/jpg/jpeg/webp)
        directory: PathBuf,
        /// Destination JSON file
        #[clap(long)]
        output: PathBuf,
    },
    /// Encode text files in a directory
    Text {
        /// Directory of .txt description files
        directory: PathBuf,
        /// Destination JSON file
        #[clap(long)]
        output: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum StorefrontCommands {
    /// Storefront product listings
    Creations {
        #[clap(subcommand)]
        command: CreationsCommands,
    },
}

#[derive(Subcommand)]
pub enum CreationsCommands {
    /// List the account's current creations
    List {
        #[clap(long, default_value_t = 10)]
        limit: u32,
        #[clap(long, value_enum, default_value = "table")]
        output: CreationsFormat,
    },
    /// Publish a new creation from a draft file
    Create {
        /// YAML draft describing the creation
        #[clap(long)]
        draft: PathBuf,
        /// File replacing the default print-settings details template
        #[clap(long)]
        details_file: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

/// Creations have no CSV rendering; the narrower enum lets clap reject
/// anything else at parse time.
#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CreationsFormat {
    Table,
    Json,
}

/// Async CLI entrypoint, also used by integration tests.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Auth {
            command:
                AuthCommands::Init {
                    service_account_file,
                    bucket,
                    prefix,
                },
        } => auth_init(&service_account_file, bucket.as_deref(), prefix).await,
        Commands::Storage {
            command: StorageCommands::Files { command },
        } => match command {
            FilesCommands::List {
                bucket,
                prefix,
                output,
                csv_path,
                service_account_file,
            } => files_list(&bucket, prefix, output, &csv_path, service_account_file).await,
            FilesCommands::Download {
                bucket,
                prefix,
                destination,
                max_objects,
                max_concurrency,
                service_account_file,
            } => {
                let limits = DownloadLimits {
                    max_objects,
                    max_concurrency,
                };
                files_download(&bucket, prefix, &destination, limits, service_account_file).await
            }
        },
        Commands::Sync { config } => sync(&config).await,
        Commands::Similarity { command } => match command {
            SimilarityCommands::Encode {
                command: EncodeCommands::Images { directory, output },
            } => encode_images(&directory, &output).await,
            SimilarityCommands::Encode {
                command: EncodeCommands::Text { directory, output },
            } => encode_text(&directory, &output).await,
            SimilarityCommands::Match {
                images,
                texts,
                output,
            } => match_embeddings(&images, &texts, &output),
        },
        Commands::Storefront {
            command: StorefrontCommands::Creations { command },
        } => match command {
            CreationsCommands::List { limit, output } => creations_list(limit, output).await,
            CreationsCommands::Create {
                draft,
                details_file,
            } => creations_create(&draft, details_file.as_deref()).await,
        },
    }
}

/// Build the storage client from an explicit key path or the
/// `SERVICE_ACCOUNT_FILE` environment variable.
fn storage_client(explicit: Option<PathBuf>) -> Result<GcsClient, PipelineError> {
    let path = match explicit {
        Some(path) => path,
        None => std::env::var("SERVICE_ACCOUNT_FILE")
            .map(PathBuf::from)
            .map_err(|_| PipelineError::BackendUnavailable {
                source: StoreError::Credentials(
                    "no service account key: pass --service-account-file or set SERVICE_ACCOUNT_FILE"
                        .into(),
                ),
            })?,
    };
    Ok(GcsClient::from_service_account_file(&path)?)
}

async fn auth_init(key_path: &Path, bucket: Option<&str>, prefix: Option<String>) -> Result<()> {
    let client = GcsClient::from_service_account_file(key_path).map_err(PipelineError::from)?;
    println!("Loaded service account key for {}.", client.client_email());

    if let Some(bucket) = bucket {
        let page = client
            .list_page(
                bucket,
                PageRequest {
                    prefix,
                    max_results: Some(1),
                    ..PageRequest::default()
                },
            )
            .await
            .map_err(PipelineError::from)?;
        match page.objects.first() {
            Some(object) => println!("Authenticated. Sample object: {}", object.key),
            None => println!("Authenticated. Bucket is reachable but empty (or prefix had no matches)."),
        }
    }
    Ok(())
}

async fn files_list(
    bucket: &str,
    prefix: Option<String>,
    output: OutputFormat,
    csv_path: &Path,
    service_account_file: Option<PathBuf>,
) -> Result<()> {
    let client = Arc::new(storage_client(service_account_file)?);
    let catalog = BucketCatalog::new(client, NameParser::new());
    let entries = catalog.list_and_parse(bucket, prefix.as_deref()).await?;
    info!(bucket, entries = entries.len(), "Catalog listed");

    let columns = catalog_to_columns(&entries);
    match output {
        OutputFormat::Table => {
            let width = entries
                .iter()
                .map(|e| e.key.len())
                .max()
                .unwrap_or(0)
                .max("ORIGINAL".len());
            println!("{:<width$}  PARSED", "ORIGINAL");
            for entry in &entries {
                println!("{:<width$}  {}", entry.key, entry.name.display_name());
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&columns)?),
        OutputFormat::Csv => {
            write_csv(&columns, csv_path)?;
            println!("Wrote {} entries to {}.", entries.len(), csv_path.display());
        }
    }
    Ok(())
}

async fn files_download(
    bucket: &str,
    prefix: Option<String>,
    destination: &Path,
    limits: DownloadLimits,
    service_account_file: Option<PathBuf>,
) -> Result<()> {
    let client = Arc::new(storage_client(service_account_file)?);
    let downloader = BulkDownloader::new(client, limits);
    let results = downloader
        .download_all(bucket, prefix.as_deref(), destination)
        .await?;
    report_downloads(&results)?;
    Ok(())
}

/// Print every per-object outcome, then surface an aggregate failure if
/// any transfer failed so automation notices incomplete batches.
fn report_downloads(results: &[DownloadResult]) -> Result<(), PipelineError> {
    for result in results {
        match &result.outcome {
            TransferOutcome::Downloaded { path } => {
                println!("Downloaded {} to {}.", result.key, path.display());
            }
            TransferOutcome::Failed { error } => {
                println!("Failed to download {}: {}", result.key, error);
            }
        }
    }

    let failed: Vec<&DownloadResult> = results.iter().filter(|r| !r.is_success()).collect();
    if let Some(first) = failed.first() {
        return Err(PipelineError::TransferFailure {
            key: first.key.clone(),
            reason: format!("{} of {} transfers failed", failed.len(), results.len()),
        });
    }
    Ok(())
}

async fn sync(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let client = Arc::new(
        GcsClient::from_service_account_file(&config.storage.service_account_file)
            .map_err(PipelineError::from)?,
    );
    let report = synchronise(client, &config.to_sync_config()).await?;

    println!(
        "Catalogued {} objects ({} unmatched names) to {}.",
        report.entries,
        report.unmatched,
        report.csv_path.display()
    );
    report_downloads(&report.downloads)?;
    Ok(())
}

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Directory entries with one of the given extensions, sorted by name.
fn files_with_extensions(directory: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(directory)
        .with_context(|| format!("cannot read directory {}", directory.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn write_records(records: &[EmbeddingRecord], output: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(output, json).map_err(|source| PipelineError::IoFailure {
        path: output.to_path_buf(),
        source,
    })?;
    Ok(())
}

async fn encode_images(directory: &Path, output: &Path) -> Result<()> {
    let encoder = RemoteEncoder::new_from_env()?;
    let paths = files_with_extensions(directory, &IMAGE_EXTENSIONS)?;
    if paths.is_empty() {
        bail!("no images found under {}", directory.display());
    }

    let mut images = Vec::with_capacity(paths.len());
    for path in &paths {
        let bytes = std::fs::read(path)
            .with_context(|| format!("cannot read image {}", path.display()))?;
        images.push(ImageInput {
            name: stem_of(path),
            bytes,
        });
    }

    let embeddings = encoder.encode_images(&images).await?;
    let records: Vec<EmbeddingRecord> = images
        .into_iter()
        .zip(embeddings)
        .map(|(image, embedding)| EmbeddingRecord {
            name: image.name,
            embedding,
        })
        .collect();
    write_records(&records, output)?;
    println!("Encoded {} images to {}.", records.len(), output.display());
    Ok(())
}

async fn encode_text(directory: &Path, output: &Path) -> Result<()> {
    let encoder = RemoteEncoder::new_from_env()?;
    let paths = files_with_extensions(directory, &["txt"])?;
    if paths.is_empty() {
        bail!("no .txt files found under {}", directory.display());
    }

    let mut names = Vec::with_capacity(paths.len());
    let mut captions = Vec::with_capacity(paths.len());
    for path in &paths {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read text file {}", path.display()))?;
        names.push(stem_of(path));
        captions.push(caption(content.trim()));
    }

    let embeddings = encoder.encode_texts(&captions).await?;
    let records: Vec<EmbeddingRecord> = names
        .into_iter()
        .zip(embeddings)
        .map(|(name, embedding)| EmbeddingRecord { name, embedding })
        .collect();
    write_records(&records, output)?;
    println!("Encoded {} texts to {}.", records.len(), output.display());
    Ok(())
}

fn load_records(path: &Path) -> Result<Vec<EmbeddingRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read embeddings file {}", path.display()))?;
    let records: Vec<EmbeddingRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not an embeddings file", path.display()))?;
    Ok(records)
}

/// Pair each text embedding with its most similar image embedding and
/// write the pairs as CSV.
fn match_embeddings(images_path: &Path, texts_path: &Path, output: &Path) -> Result<()> {
    let images = load_records(images_path)?;
    let texts = load_records(texts_path)?;

    let text_embeddings: Vec<_> = texts.iter().map(|r| r.embedding.clone()).collect();
    let image_embeddings: Vec<_> = images.iter().map(|r| r.embedding.clone()).collect();
    let matrix = similarity_matrix(&text_embeddings, &image_embeddings)?;

    let rows: Vec<serde_json::Value> = best_matches(&matrix)
        .into_iter()
        .map(|m| {
            serde_json::json!({
                "name": texts[m.row].name,
                "best_match": images[m.column].name,
                "score": m.score,
            })
        })
        .collect();
    write_csv(&serde_json::Value::Array(rows), output)?;
    println!(
        "Matched {} names against {} images; wrote {}.",
        texts.len(),
        images.len(),
        output.display()
    );
    Ok(())
}

/// Map a storefront client/call failure into the exit-code taxonomy.
fn storefront_failure(
    operation: &str,
    source: shoebutton_core::error::StorefrontError,
) -> PipelineError {
    PipelineError::TransportFailure {
        operation: operation.to_string(),
        source,
    }
}

async fn creations_list(limit: u32, output: CreationsFormat) -> Result<()> {
    let client = CultsClient::new_from_env().map_err(|e| storefront_failure("list_creations", e))?;
    let creations = client
        .list_creations(limit)
        .await
        .map_err(|e| storefront_failure("list_creations", e))?;

    match output {
        CreationsFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&creations)?);
        }
        CreationsFormat::Table => {
            let width = creations
                .iter()
                .map(|c| c.name.len())
                .max()
                .unwrap_or(0)
                .max("NAME".len());
            println!("{:<width$}  {:>9}  {:>7}  {:>10}  URL", "NAME", "DOWNLOADS", "VIEWS", "SALES");
            for creation in &creations {
                println!(
                    "{:<width$}  {:>9}  {:>7}  {:>10}  {}",
                    creation.name,
                    creation.downloads_count,
                    creation.views_count,
                    format!("${:.2}", creation.total_sales_cents as f64 / 100.0),
                    creation.url,
                );
            }
        }
    }
    Ok(())
}

async fn creations_create(draft_path: &Path, details_file: Option<&Path>) -> Result<()> {
    let raw = std::fs::read_to_string(draft_path)
        .with_context(|| format!("cannot read draft {}", draft_path.display()))?;
    let draft: CreationDraft = serde_yaml::from_str(&raw)
        .with_context(|| format!("{} is not a valid creation draft", draft_path.display()))?;

    let mut client =
        CultsClient::new_from_env().map_err(|e| storefront_failure("create_creation", e))?;
    if let Some(details_path) = details_file {
        let template = std::fs::read_to_string(details_path)
            .with_context(|| format!("cannot read details file {}", details_path.display()))?;
        client = client.with_details_template(template);
    }

    let receipt = client
        .create_creation(&draft)
        .await
        .map_err(|e| storefront_failure("create_creation", e))?;
    println!("Published {} at {}", draft.name, receipt.url);
    Ok(())
}
