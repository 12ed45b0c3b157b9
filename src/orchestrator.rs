//! Main orchestration: list the bucket, plan, fetch every candidate.

use crate::error::MirrorError;
use crate::fetcher::RetryingFetcher;
use crate::planner::plan;
use crate::store::ObjectStore;
use crate::types::{FetchReport, FetchResult, RemoteObjectMeta, SyncConfig, SyncReport};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};

/// Synchronizes the local directory with the store.
///
/// Only a failed listing is returned as an error. Per-object failures,
/// including unreadable local state, are logged and recorded in the report,
/// and never stop the remaining candidates.
///
/// # Example
///
/// ```no_run
/// use sigmirror::{sync_mirror, LocalObjectStore, SyncConfig};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = Arc::new(LocalObjectStore::new("/mnt/mirror"));
/// let report = sync_mirror(store, Arc::new(SyncConfig::default())).await?;
/// println!("{} verified, {} failed", report.verified(), report.failed());
/// # Ok(())
/// # }
/// ```
pub async fn sync_mirror(
    store: Arc<dyn ObjectStore>,
    config: Arc<SyncConfig>,
) -> Result<SyncReport, MirrorError> {
    info!("Listing objects in {}", store.label());
    let listing = store.list_objects().await.map_err(|e| {
        error!("Unable to list items in bucket {:?}: {}", config.mirror_bucket, e);
        e
    })?;

    let plan = plan(&listing, &config).await;
    for (key, reason) in &plan.errors {
        error!("Cannot check local state of {}: {}", key, reason);
    }
    info!(
        "{} object(s) listed, {} selected for download ({:?} mode)",
        listing.len(),
        plan.candidates.len(),
        config.mode
    );

    let pb = progress_bar(plan.candidates.len() as u64);
    let fetcher = RetryingFetcher::new(store, Arc::clone(&config));

    let reports = if config.max_concurrent_fetches <= 1 {
        fetch_sequential(&fetcher, &plan.candidates, &pb).await
    } else {
        fetch_concurrent(&fetcher, &plan.candidates, config.max_concurrent_fetches, &pb).await
    };
    pb.finish_and_clear();

    Ok(SyncReport {
        listed: listing.len(),
        candidates: plan.candidates.len(),
        reports,
        plan_errors: plan.errors,
    })
}

async fn fetch_sequential(
    fetcher: &RetryingFetcher,
    candidates: &[RemoteObjectMeta],
    pb: &ProgressBar,
) -> Vec<FetchReport> {
    let mut reports = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        pb.set_message(format!("⬇️  {}", candidate.key));
        reports.push(fetcher.fetch(candidate).await);
        pb.inc(1);
    }
    reports
}

/// Runs one task per candidate with at most `limit` transfers in flight.
/// Reports come back in listing order.
async fn fetch_concurrent(
    fetcher: &RetryingFetcher,
    candidates: &[RemoteObjectMeta],
    limit: usize,
    pb: &ProgressBar,
) -> Vec<FetchReport> {
    let semaphore = Arc::new(Semaphore::new(limit));
    let mut tasks = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let semaphore = Arc::clone(&semaphore);
        let fetcher = fetcher.clone();
        let candidate = candidate.clone();
        let pb = pb.clone();

        tasks.push(tokio::spawn(async move {
            let _permit = match semaphore.acquire().await {
                Ok(permit) => permit,
                Err(e) => return join_failure(&candidate, e.to_string()),
            };
            pb.set_message(format!("⬇️  {}", candidate.key));
            let report = fetcher.fetch(&candidate).await;
            pb.inc(1);
            report
        }));
    }

    let mut reports = Vec::with_capacity(tasks.len());
    for (task, candidate) in tasks.into_iter().zip(candidates) {
        match task.await {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!("Task join error: {}", e);
                reports.push(join_failure(candidate, e.to_string()));
            }
        }
    }
    reports
}

fn join_failure(candidate: &RemoteObjectMeta, reason: String) -> FetchReport {
    FetchReport {
        key: candidate.key.clone(),
        local_path: Default::default(),
        attempts: 0,
        result: FetchResult::Failed(MirrorError::Join(reason).to_string()),
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    if len == 0 || !atty::is(atty::Stream::Stderr) {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg} | {elapsed_precise} elapsed")
            .map(|style| style.progress_chars("█▓▒░ "))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb
}
