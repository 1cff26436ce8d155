//! Subcommand implementations.

use std::path::Path;

use file_expiry_scheduler::{
    AtQueue, AtQueueConfig, ExpiryPreset, ExpiryRequest, ExpiryScheduler, MarkerEncoder,
    ReapOutcome, reap_if_inode_matches,
};
use miette::Result;
use tracing::info;

/// Build the at-backed scheduler from CLI configuration.
pub fn build_scheduler(
    helper: &str,
    at: &str,
    atq: &str,
    atrm: &str,
) -> ExpiryScheduler<AtQueue> {
    let queue = AtQueue::with_config(AtQueueConfig {
        at: at.to_string(),
        atq: atq.to_string(),
        atrm: atrm.to_string(),
    });
    ExpiryScheduler::with_encoder(queue, MarkerEncoder::new(helper))
}

pub async fn at(scheduler: &ExpiryScheduler<AtQueue>, path: &Path, when: &str) -> Result<()> {
    apply(scheduler, path, &ExpiryRequest::At(when.to_string())).await
}

pub async fn after(scheduler: &ExpiryScheduler<AtQueue>, path: &Path, minutes: u64) -> Result<()> {
    apply(scheduler, path, &ExpiryRequest::After(minutes)).await
}

pub async fn schedule(
    scheduler: &ExpiryScheduler<AtQueue>,
    path: &Path,
    at: Option<&str>,
    after: Option<&str>,
) -> Result<()> {
    let request = ExpiryRequest::from_fields(at, after).map_err(|e| miette::miette!("{}", e))?;
    apply(scheduler, path, &request).await
}

pub async fn preset(
    scheduler: &ExpiryScheduler<AtQueue>,
    path: &Path,
    preset: ExpiryPreset,
) -> Result<()> {
    info!(%preset, "applying preset");
    apply(scheduler, path, &preset.request()).await
}

async fn apply(
    scheduler: &ExpiryScheduler<AtQueue>,
    path: &Path,
    request: &ExpiryRequest,
) -> Result<()> {
    scheduler
        .schedule(path, request)
        .await
        .map_err(|e| miette::miette!("Failed to schedule expiry: {}", e))?;

    // Report what the queue now says rather than what we asked for
    match scheduler.query(path).await {
        Ok(Some(when)) => println!("Expiry is scheduled for: {}", when),
        Ok(None) => println!("Expiry submitted, but no job is listed for this file"),
        Err(e) => tracing::warn!(error = %e, "scheduled, but failed to read back the queue"),
    }
    Ok(())
}

pub async fn cancel(scheduler: &ExpiryScheduler<AtQueue>, path: &Path) -> Result<()> {
    let removed = scheduler
        .cancel(path)
        .await
        .map_err(|e| miette::miette!("Failed to cancel expiry: {}", e))?;

    if removed == 0 {
        println!("No expiry was scheduled");
    } else {
        println!("Cancelled expiry");
    }
    Ok(())
}

pub async fn status(scheduler: &ExpiryScheduler<AtQueue>, path: &Path, json: bool) -> Result<()> {
    let status = scheduler
        .status(path)
        .await
        .map_err(|e| miette::miette!("Failed to read expiry: {}", e))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&status).map_err(|e| miette::miette!("{}", e))?
        );
        return Ok(());
    }

    match status.scheduled_for {
        Some(when) => println!("Expiry is scheduled for: {}", when),
        None => println!("No expiry scheduled"),
    }
    Ok(())
}

pub async fn dedupe(scheduler: &ExpiryScheduler<AtQueue>, path: &Path) -> Result<()> {
    let removed = scheduler
        .deduplicate(path)
        .await
        .map_err(|e| miette::miette!("Failed to deduplicate expiry jobs: {}", e))?;
    println!("Removed {} duplicate job(s)", removed);
    Ok(())
}

pub async fn reap(path: &Path, inode: u64, minutes: Option<u64>) -> Result<()> {
    info!(path = %path.display(), inode, ?minutes, "expiry job fired");

    let outcome = reap_if_inode_matches(path, inode)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    match outcome {
        ReapOutcome::Deleted => println!("Deleted {}", path.display()),
        ReapOutcome::InodeMismatch { found } => println!(
            "Kept {}: inode is now {}, expected {}",
            path.display(),
            found,
            inode
        ),
        ReapOutcome::Missing => println!("{} no longer exists", path.display()),
        ReapOutcome::NotAFile => println!("Kept {}: not a file", path.display()),
    }
    Ok(())
}
