use crate::models::SummaryRecord;
use crate::store::ArticleStore;
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

pub const SNAPSHOT_FILE: &str = "latest.json";

#[derive(Debug, Serialize)]
struct Snapshot<'a> {
    generated_at: chrono::DateTime<chrono::Utc>,
    count: usize,
    summaries: &'a [SummaryRecord],
}

/// Write the display view to `{json_output_dir}/latest.json`.
///
/// Written to a temporary file first and renamed, so readers never see a
/// half-written snapshot.
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir.display()))]
pub async fn write_snapshot(
    records: &[SummaryRecord],
    generated_at: chrono::DateTime<chrono::Utc>,
    json_output_dir: &Path,
) -> Result<PathBuf, Box<dyn Error + Send + Sync>> {
    let json = serde_json::to_string_pretty(&Snapshot {
        generated_at,
        count: records.len(),
        summaries: records,
    })?;

    if let Err(e) = fs::create_dir_all(json_output_dir).await {
        error!(error = %e, "Failed to create JSON dir");
        return Err(e.into());
    }

    let path = json_output_dir.join(SNAPSHOT_FILE);
    let tmp = json_output_dir.join(format!("{SNAPSHOT_FILE}.tmp"));
    fs::write(&tmp, json).await?;
    fs::rename(&tmp, &path).await?;
    info!(path = %path.display(), count = records.len(), "Wrote JSON snapshot");
    Ok(path)
}

/// Read the latest `limit` records from `store` and snapshot them.
pub async fn snapshot_store(
    store: &dyn ArticleStore,
    limit: usize,
    generated_at: chrono::DateTime<chrono::Utc>,
    json_output_dir: &Path,
) -> Result<PathBuf, Box<dyn Error + Send + Sync>> {
    let records = store.latest(limit).await?;
    write_snapshot(&records, generated_at, json_output_dir).await
}
