use std::{collections::HashMap, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use client_core::{
    config::{load_settings_from, SETTINGS_FILE},
    gallery::{format_confidence, format_size, PAGE_LIMIT_CHOICES},
    ClientSettings, DeleteOutcome, Gallery, GalleryFilter, HttpDocumentClient, IntakePolicy,
    Pagination, SourceFile, TrackerNotification, UploadTracker,
};
use serde_json::json;
use shared::domain::{find_classification, DocumentId, RecordId, CLASSIFICATIONS};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_stream::{
    wrappers::{BroadcastStream, WatchStream},
    StreamExt,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "classifier", about = "Classify and manage insurance documents")]
struct Cli {
    /// Settings file; missing files are ignored.
    #[arg(long, default_value = SETTINGS_FILE)]
    config: PathBuf,
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload PDF documents and wait for their classification.
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        max_files: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// List classified documents.
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value = "")]
        search: String,
        /// A classification label, or "all".
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 0.0)]
        min_confidence: f64,
        #[arg(long, default_value_t = 1.0)]
        max_confidence: f64,
        #[arg(long)]
        json: bool,
    },
    /// Delete a classified document.
    Delete {
        id: String,
        #[arg(long, short)]
        yes: bool,
    },
    /// Show the labels the service can assign.
    Categories,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match &cli.command {
        Command::Categories => {
            for info in CLASSIFICATIONS {
                println!("{:<12} {}", info.classification, info.description);
            }
            Ok(())
        }
        Command::Upload {
            files,
            max_files,
            json,
        } => {
            let settings = resolve_settings(&cli)?;
            let max_files = max_files.unwrap_or(settings.max_files);
            run_upload(&settings, files, max_files, *json).await
        }
        Command::List {
            page,
            limit,
            search,
            category,
            min_confidence,
            max_confidence,
            json,
        } => {
            let settings = resolve_settings(&cli)?;
            let filter =
                build_filter(search, category.as_deref(), *min_confidence, *max_confidence)?;
            let limit = page_limit(*limit, settings.default_page_limit)?;
            run_list(&settings, *page, limit, &filter, *json).await
        }
        Command::Delete { id, yes } => {
            let settings = resolve_settings(&cli)?;
            run_delete(&settings, DocumentId(id.clone()), *yes).await
        }
    }
}

fn resolve_settings(cli: &Cli) -> Result<ClientSettings> {
    let mut settings = load_settings_from(&cli.config, |key| std::env::var(key).ok())?;
    if let Some(v) = &cli.base_url {
        settings.base_url = v.clone();
    }
    if let Some(v) = &cli.api_key {
        settings.api_key = v.clone();
    }
    settings
        .validate()
        .context("invalid settings; check the settings file, environment and flags")?;
    Ok(settings)
}

fn build_filter(
    search: &str,
    category: Option<&str>,
    min_confidence: f64,
    max_confidence: f64,
) -> Result<GalleryFilter> {
    let category = match category {
        None => None,
        Some(raw) if raw.eq_ignore_ascii_case("all") => None,
        Some(raw) => match find_classification(raw) {
            Some(info) => Some(info.classification.to_string()),
            None => bail!("unknown category '{raw}'; see `classifier categories`"),
        },
    };
    if !(0.0..=1.0).contains(&min_confidence)
        || !(0.0..=1.0).contains(&max_confidence)
        || min_confidence > max_confidence
    {
        bail!("confidence bounds must satisfy 0 <= min <= max <= 1");
    }
    Ok(GalleryFilter {
        search: search.to_string(),
        category,
        min_confidence,
        max_confidence,
    })
}

fn page_limit(requested: Option<u32>, configured: u32) -> Result<u32> {
    let limit = requested.unwrap_or(configured);
    if !PAGE_LIMIT_CHOICES.contains(&limit) {
        bail!("--limit must be one of {PAGE_LIMIT_CHOICES:?}");
    }
    Ok(limit)
}

/// Unreadable paths are logged and left out.
async fn collect_candidates(paths: &[PathBuf]) -> Vec<SourceFile> {
    let mut candidates = Vec::with_capacity(paths.len());
    for path in paths {
        match SourceFile::from_path(path).await {
            Ok(file) => candidates.push(file),
            Err(err) => warn!(path = %path.display(), error = %err, "skipping file"),
        }
    }
    candidates
}

async fn run_upload(
    settings: &ClientSettings,
    paths: &[PathBuf],
    max_files: usize,
    json_output: bool,
) -> Result<()> {
    let candidates = collect_candidates(paths).await;
    let intake = IntakePolicy::new(max_files).screen(candidates);
    if intake.accepted.is_empty() {
        bail!("no files left to upload");
    }

    let api = HttpDocumentClient::new_shared(settings)?;
    let tracker = UploadTracker::new(api);
    let mut notifications = BroadcastStream::new(tracker.subscribe_notifications());
    let progress_task = tokio::spawn(log_progress(Arc::clone(&tracker)));

    let handles = tracker.register_and_spawn(intake.accepted);
    let mut outstanding = handles.len();
    while outstanding > 0 {
        match notifications.next().await {
            Some(Ok(notification)) => {
                outstanding -= 1;
                match &notification {
                    TrackerNotification::Classified { .. } => info!("{}", notification.summary()),
                    TrackerNotification::Failed { .. } => warn!("{}", notification.summary()),
                }
            }
            Some(Err(err)) => {
                warn!(error = %err, "missed upload notifications");
                break;
            }
            None => break,
        }
    }
    for handle in handles {
        handle.await.context("upload task failed")?;
    }
    progress_task.abort();

    let records = tracker.records();
    if json_output {
        let rows: Vec<_> = records
            .iter()
            .map(|record| {
                json!({
                    "id": record.id,
                    "name": record.name,
                    "size": record.size,
                    "status": record.status,
                    "progress": record.progress,
                    "classification": record.classification,
                    "confidence": record.confidence,
                    "error": record.error,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for record in records.iter() {
            let outcome = match (&record.classification, &record.confidence, &record.error) {
                (_, _, Some(error)) => format!("error: {error}"),
                (Some(label), Some(confidence), _) => format!("{label} ({confidence}%)"),
                _ => "pending".to_string(),
            };
            println!(
                "{:<40} {:>10} {:<10} {}",
                record.name,
                format_size(record.size),
                record.status,
                outcome
            );
        }
    }

    if !tracker.all_processed() {
        let failed = records
            .iter()
            .filter(|record| !record.status.is_terminal() || record.error.is_some())
            .count();
        bail!("{failed} of {} uploads were not classified", records.len());
    }
    Ok(())
}

async fn log_progress(tracker: Arc<UploadTracker>) {
    let mut last_seen: HashMap<RecordId, u8> = HashMap::new();
    let mut snapshots = WatchStream::new(tracker.subscribe());
    while let Some(records) = snapshots.next().await {
        for record in records.iter() {
            if last_seen.insert(record.id.clone(), record.progress) != Some(record.progress) {
                debug!(
                    file = %record.name,
                    progress = record.progress,
                    status = %record.status,
                    "upload progress"
                );
            }
        }
    }
}

async fn run_list(
    settings: &ClientSettings,
    page: u32,
    limit: u32,
    filter: &GalleryFilter,
    json_output: bool,
) -> Result<()> {
    let api = HttpDocumentClient::new_shared(settings)?;
    let mut pagination = Pagination::new(limit);
    pagination.go_to(page);
    let mut gallery = Gallery::new(api, pagination);
    gallery
        .load()
        .await
        .with_context(|| format!("failed to fetch page {page}"))?;

    let docs = gallery.filtered(filter);
    if json_output {
        println!("{}", serde_json::to_string_pretty(&docs)?);
        return Ok(());
    }

    if docs.is_empty() {
        println!("No documents found.");
    }
    for doc in &docs {
        let uploaded = doc
            .created_at
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<26} {:<40} {:<12} {:>7} {:>10} {}",
            doc.id,
            doc.original_name,
            doc.classification,
            format_confidence(doc.confidence),
            format_size(doc.size),
            uploaded
        );
    }

    let pagination = gallery.pagination();
    println!(
        "Page {} ({} of {} shown){}",
        pagination.page(),
        docs.len(),
        gallery.docs().len(),
        if gallery.has_next_page() {
            "; more with --page"
        } else {
            ""
        }
    );
    Ok(())
}

async fn confirm(prompt: &str) -> Result<bool> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(prompt.as_bytes()).await?;
    stdout.flush().await?;

    let mut answer = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut answer)
        .await?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

async fn run_delete(settings: &ClientSettings, id: DocumentId, yes: bool) -> Result<()> {
    if !yes
        && !confirm(&format!(
            "Are you sure you want to delete \"{id}\"? This action cannot be undone. [y/N] "
        ))
        .await?
    {
        println!("Cancelled.");
        return Ok(());
    }

    let api = HttpDocumentClient::new_shared(settings)?;
    let mut gallery = Gallery::new(api, Pagination::new(settings.default_page_limit));
    match gallery.delete(&id).await {
        DeleteOutcome::Deleted => {
            println!("Document successfully deleted!");
            Ok(())
        }
        DeleteOutcome::NotDeleted { reason } => bail!("Failed to delete document: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        env, fs,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    #[test]
    fn all_category_means_no_category_filter() {
        let filter = build_filter("", Some("ALL"), 0.0, 1.0).expect("filter");
        assert_eq!(filter.category, None);
        assert_eq!(filter, GalleryFilter::default());
    }

    #[test]
    fn category_lookup_ignores_case_and_keeps_canonical_label() {
        let filter = build_filter("acme", Some("loss run"), 0.2, 0.8).expect("filter");
        assert_eq!(filter.category.as_deref(), Some("Loss Run"));
        assert_eq!(filter.search, "acme");
        assert_eq!(filter.min_confidence, 0.2);
        assert_eq!(filter.max_confidence, 0.8);
    }

    #[test]
    fn unknown_category_is_rejected() {
        let err = build_filter("", Some("Receipt"), 0.0, 1.0).expect_err("unknown");
        assert!(err.to_string().contains("unknown category 'Receipt'"), "{err}");
    }

    #[test]
    fn confidence_bounds_must_be_ordered_fractions() {
        assert!(build_filter("", None, 0.5, 0.5).is_ok());
        assert!(build_filter("", None, -0.1, 1.0).is_err());
        assert!(build_filter("", None, 0.0, 1.5).is_err());
        assert!(build_filter("", None, 0.9, 0.1).is_err());
    }

    #[test]
    fn page_limit_must_be_an_offered_choice() {
        assert_eq!(page_limit(None, 50).expect("configured"), 50);
        assert_eq!(page_limit(Some(10), 50).expect("requested"), 10);
        assert!(page_limit(Some(20), 50).is_err());
        assert!(page_limit(None, 0).is_err());
    }

    #[tokio::test]
    async fn unreadable_paths_are_skipped() {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let dir = env::temp_dir().join(format!("classifier_cli_{suffix}"));
        fs::create_dir_all(&dir).expect("temp dir");
        let present = dir.join("policy.pdf");
        fs::write(&present, b"%PDF-1.7").expect("write pdf");

        let files = collect_candidates(&[dir.join("missing.pdf"), present]).await;

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name(), "policy.pdf");
        assert_eq!(files[0].content_type(), Some("application/pdf"));
        fs::remove_dir_all(dir).expect("cleanup");
    }
}
