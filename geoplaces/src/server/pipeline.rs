//! Startup pipeline of a country data server.
//!
//! The pipeline runs as one worker task:
//!
//! ```text
//! init ──► checking_for_update ──► (cache fresh / etag unchanged?) ──► read cache ─┐
//!                │ no                                                              │
//!                ▼                                                                 │
//!          country_file_download ──► country_zip_file ──► country_file ──► join ───┤
//!                                                                                  ▼
//!                                                        no cities? ──► exit   running
//! ```
//!
//! Every stage runs under [`ServerContext::attend`], which races the stage
//! against the cancellation token and the command channel, so shutdown is
//! honoured mid-download and trace toggles never interrupt work. Each stage
//! contributes a fixed share of the progress bar; the shares sum to exactly
//! 100 on the full path, and the cache path jumps straight to 100.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::archive;
use super::{ProgressEvent, ServerCommand, ServerEvent, ServerExit, ServerId, Substatus};
use crate::config::Settings;
use crate::index::CountryIndex;
use crate::records::{fcp_path, join_admin_regions, scan_records, CityRecord, FcpFile, FcpHeader};
use crate::upstream::{GeonamesClient, ZipDownload};

/// Progress share of the download stage.
const DOWNLOAD_PROGRESS: u8 = 30;
/// Progress share of the archive extraction stage.
const UNZIP_PROGRESS: u8 = 20;
/// Progress share of the record scan stage.
const SCAN_PROGRESS: u8 = 30;
/// Progress share of the join-and-cache stage.
const BUILD_PROGRESS: u8 = 20;

/// Everything a worker task owns.
pub(crate) struct ServerContext<C> {
    id: ServerId,
    code: String,
    name: String,
    settings: Arc<Settings>,
    client: Arc<C>,
    events: mpsc::UnboundedSender<ServerEvent>,
    cancel: CancellationToken,
    commands: mpsc::UnboundedReceiver<ServerCommand>,
    trace: bool,
    child_seq: u32,
}

impl<C: GeonamesClient> ServerContext<C> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ServerId,
        code: &str,
        name: &str,
        settings: Arc<Settings>,
        client: Arc<C>,
        events: mpsc::UnboundedSender<ServerEvent>,
        cancel: CancellationToken,
        commands: mpsc::UnboundedReceiver<ServerCommand>,
    ) -> Self {
        Self {
            id,
            code: code.to_uppercase(),
            name: name.to_string(),
            settings,
            client,
            events,
            cancel,
            commands,
            trace: false,
            child_seq: 0,
        }
    }

    fn send(&self, event: ProgressEvent) {
        let _ = self.events.send(ServerEvent::Progress(event));
    }

    fn delta(&self, substatus: Substatus, delta: u8) {
        self.send(ProgressEvent::Delta {
            id: self.id,
            substatus,
            delta,
        });
    }

    /// Report an auxiliary task spawned during startup.
    fn child(&mut self, substatus: Substatus, label: &str) {
        self.child_seq += 1;
        let child = format!("{}:{}:{}", self.name, label, self.child_seq);
        self.send(ProgressEvent::Child {
            id: self.id,
            substatus,
            child,
        });
    }

    fn stage_log(&self, stage: &str, detail: &str) {
        if self.trace {
            info!(server = %self.name, stage = stage, "{}", detail);
        } else {
            debug!(server = %self.name, stage = stage, "{}", detail);
        }
    }

    /// Run a stage future while honouring shutdown and trace commands.
    ///
    /// Returns `Err(Stopped)` when the server is told to shut down before
    /// the stage completes; the stage future is dropped, cancelling any
    /// in-flight I/O it owned.
    async fn attend<T, F>(&mut self, fut: F) -> Result<T, ServerExit>
    where
        F: Future<Output = T>,
    {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    return Err(ServerExit::Stopped { name: self.name.clone() });
                }

                command = self.commands.recv() => match command {
                    Some(ServerCommand::Trace(enabled)) => {
                        self.trace = enabled;
                        info!(server = %self.name, trace = enabled, "trace toggled");
                    }
                    Some(ServerCommand::Shutdown) | None => {
                        return Err(ServerExit::Stopped { name: self.name.clone() });
                    }
                },

                out = &mut fut => return Ok(out),
            }
        }
    }

    fn scratch_zip_path(&self) -> PathBuf {
        self.settings.data_dir.join(format!("{}.zip", self.code))
    }
}

/// Worker entry point: build the index, announce it, then park for commands.
pub(crate) async fn run<C: GeonamesClient>(mut ctx: ServerContext<C>) -> ServerExit {
    ctx.send(ProgressEvent::Init {
        id: ctx.id,
        at: Utc::now(),
    });

    let records = match build_records(&mut ctx).await {
        Ok(records) => records,
        Err(exit) => {
            // Partial downloads are removed on orderly shutdown; failure
            // exits keep the scratch file around for diagnosis.
            if matches!(exit, ServerExit::Stopped { .. }) {
                remove_scratch(&ctx);
            }
            return exit;
        }
    };

    if records.is_empty() {
        info!(server = %ctx.name, "no qualifying cities");
        return ServerExit::NoCities {
            name: ctx.name.clone(),
        };
    }

    let index = Arc::new(CountryIndex::new(&ctx.code, records));
    info!(
        server = %ctx.name,
        cities = index.len(),
        "country index built"
    );
    ctx.send(ProgressEvent::Running {
        id: ctx.id,
        index,
        at: Utc::now(),
    });

    park(&mut ctx).await
}

/// Produce the country's record set, from cache or by a full build.
async fn build_records<C: GeonamesClient>(
    ctx: &mut ServerContext<C>,
) -> Result<Vec<CityRecord>, ServerExit> {
    let cache_path = fcp_path(&ctx.settings.data_dir, &ctx.code);

    ctx.send(ProgressEvent::CheckingForUpdate {
        code: ctx.code.clone(),
    });
    if let Some(records) = try_cache(ctx, &cache_path).await? {
        ctx.send(ProgressEvent::PhaseComplete {
            id: ctx.id,
            substatus: Substatus::FcpCountryFile,
        });
        return Ok(records);
    }

    ctx.send(ProgressEvent::Downloading {
        code: ctx.code.clone(),
    });
    let download = download_with_retry(ctx).await?;
    ctx.delta(Substatus::CountryFileDownload, DOWNLOAD_PROGRESS);

    let text = extract_dump(ctx, download.bytes).await?;
    ctx.delta(Substatus::CountryZipFile, UNZIP_PROGRESS);

    let places = scan_dump(ctx, text).await?;
    ctx.delta(Substatus::CountryFile, SCAN_PROGRESS);

    let records = join_admin_regions(places);
    let header = FcpHeader {
        etag: download.etag.unwrap_or_default(),
        fetched_at: Utc::now(),
    };
    FcpFile::write(&cache_path, &header, &records).map_err(|e| {
        ServerExit::FcpCountryFileError {
            reason: e.to_string(),
        }
    })?;
    ctx.stage_log("fcp_country_file", "cache file written");
    ctx.delta(Substatus::FcpCountryFile, BUILD_PROGRESS);

    Ok(records)
}

/// Decide whether the existing cache file can stand in for a fresh build,
/// and read it back if so.
///
/// The recorded etag timestamp is authoritative for staleness. A stale file
/// is revalidated with a HEAD request; an unreachable upstream at that point
/// just means "download" (the download stage owns retry behaviour). A cache
/// file that is chosen but unreadable is fatal.
async fn try_cache<C: GeonamesClient>(
    ctx: &mut ServerContext<C>,
    cache_path: &std::path::Path,
) -> Result<Option<Vec<CityRecord>>, ServerExit> {
    let header = match FcpFile::read_header(cache_path) {
        Ok(header) => header,
        Err(e) => {
            warn!(server = %ctx.name, error = %e, "unreadable cache header, rebuilding");
            return Ok(None);
        }
    };
    let Some(header) = header else {
        ctx.stage_log("checking_for_update", "no cache file");
        return Ok(None);
    };

    let age = Utc::now().signed_duration_since(header.fetched_at);
    let fresh = match age.to_std() {
        Ok(age) => age < ctx.settings.cache_staleness,
        // A timestamp from the future means a clock moved; the file cannot
        // be older than the threshold.
        Err(_) => true,
    };

    if !fresh {
        let client = Arc::clone(&ctx.client);
        let code = ctx.code.clone();
        let head = ctx
            .attend(async move { client.head_etag(&code).await })
            .await?;
        match head {
            Ok(Some(etag)) if etag == header.etag => {
                ctx.stage_log("checking_for_update", "validator token unchanged");
            }
            Ok(_) => {
                ctx.stage_log("checking_for_update", "upstream changed, rebuilding");
                return Ok(None);
            }
            Err(e) => {
                warn!(server = %ctx.name, error = %e, "update check failed, rebuilding");
                return Ok(None);
            }
        }
    } else {
        ctx.stage_log("checking_for_update", "cache file is fresh");
    }

    let (_, records) =
        FcpFile::read(cache_path).map_err(|e| ServerExit::FcpCountryFileError {
            reason: e.to_string(),
        })?;
    info!(server = %ctx.name, cities = records.len(), "loaded records from cache");
    Ok(Some(records))
}

/// Download the country archive, retrying a fixed number of attempts with a
/// fixed backoff. Exhaustion is terminal.
async fn download_with_retry<C: GeonamesClient>(
    ctx: &mut ServerContext<C>,
) -> Result<ZipDownload, ServerExit> {
    let attempts = ctx.settings.retry_limit.max(1);

    for attempt in 1..=attempts {
        ctx.stage_log(
            "country_file_download",
            &format!("download attempt {}/{}", attempt, attempts),
        );

        let client = Arc::clone(&ctx.client);
        let code = ctx.code.clone();
        let outcome = ctx
            .attend(async move { client.fetch_zip(&code).await })
            .await?;

        match outcome {
            Ok(download) => return Ok(download),
            Err(e) if attempt < attempts => {
                warn!(
                    server = %ctx.name,
                    attempt = attempt,
                    error = %e,
                    "download failed, backing off"
                );
                ctx.attend(tokio::time::sleep(ctx.settings.retry_wait))
                    .await?;
            }
            Err(e) => {
                warn!(server = %ctx.name, error = %e, "download attempts exhausted");
                return Err(ServerExit::RetryLimitExceeded {
                    code: ctx.code.clone(),
                    ext: "zip".to_string(),
                });
            }
        }
    }

    // The loop always returns on the final attempt; this covers the
    // degenerate zero-attempt configuration.
    Err(ServerExit::RetryLimitExceeded {
        code: ctx.code.clone(),
        ext: "zip".to_string(),
    })
}

/// Write the archive to the scratch file, extract the dump member, and
/// remove the scratch file again.
async fn extract_dump<C: GeonamesClient>(
    ctx: &mut ServerContext<C>,
    bytes: Vec<u8>,
) -> Result<String, ServerExit> {
    let zip_path = ctx.scratch_zip_path();
    if let Some(parent) = zip_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ServerExit::CountryZipFileError {
            path: zip_path.clone(),
            reason: e.to_string(),
        })?;
    }
    std::fs::write(&zip_path, &bytes).map_err(|e| ServerExit::CountryZipFileError {
        path: zip_path.clone(),
        reason: e.to_string(),
    })?;

    ctx.child(Substatus::CountryZipFile, "unzip");
    let member = archive::dump_member_name(&ctx.code);
    let task = tokio::task::spawn_blocking(move || archive::extract_member(&bytes, &member));
    let extracted = ctx.attend(task).await?;

    let text = match extracted {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            return Err(ServerExit::CountryZipFileError {
                path: zip_path,
                reason: e.to_string(),
            })
        }
        Err(e) => return Err(ServerExit::Error(format!("unzip task failed: {}", e))),
    };

    if let Err(e) = std::fs::remove_file(&zip_path) {
        warn!(server = %ctx.name, error = %e, "could not remove scratch archive");
    }
    ctx.stage_log("country_zip_file", "archive extracted");
    Ok(text)
}

/// Scan the raw dump on the blocking pool.
async fn scan_dump<C: GeonamesClient>(
    ctx: &mut ServerContext<C>,
    text: String,
) -> Result<Vec<crate::records::RawPlace>, ServerExit> {
    ctx.child(Substatus::CountryFile, "scan");
    let population_min = ctx.settings.population_min;
    let task = tokio::task::spawn_blocking(move || scan_records(&text, population_min));
    let scanned = ctx.attend(task).await?;

    match scanned {
        Ok(Ok(places)) => {
            ctx.stage_log("country_file", &format!("{} rows retained", places.len()));
            Ok(places)
        }
        Ok(Err(e)) => Err(ServerExit::CountryFileError {
            reason: e.to_string(),
        }),
        Err(e) => Err(ServerExit::Error(format!("scan task failed: {}", e))),
    }
}

/// Stay resident after startup, honouring trace and shutdown commands.
async fn park<C: GeonamesClient>(ctx: &mut ServerContext<C>) -> ServerExit {
    loop {
        tokio::select! {
            biased;

            _ = ctx.cancel.cancelled() => {
                return ServerExit::Stopped { name: ctx.name.clone() };
            }

            command = ctx.commands.recv() => match command {
                Some(ServerCommand::Trace(enabled)) => {
                    ctx.trace = enabled;
                    info!(server = %ctx.name, trace = enabled, "trace toggled");
                }
                Some(ServerCommand::Shutdown) | None => {
                    return ServerExit::Stopped { name: ctx.name.clone() };
                }
            },
        }
    }
}

/// Best-effort removal of a leftover scratch archive on orderly shutdown.
fn remove_scratch<C>(ctx: &ServerContext<C>) {
    let path = ctx.settings.data_dir.join(format!("{}.zip", ctx.code));
    if path.exists() {
        if let Err(e) = std::fs::remove_file(&path) {
            warn!(server = %ctx.name, error = %e, "could not remove scratch archive");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_shares_sum_to_exactly_100() {
        assert_eq!(
            DOWNLOAD_PROGRESS + UNZIP_PROGRESS + SCAN_PROGRESS + BUILD_PROGRESS,
            100
        );
    }
}
