//! Ingestor (spec §4.2, component C2): downloads and parses upstream
//! playlists/guides into entities, batched into the repository layer.

pub mod m3u;
pub mod time;
pub mod xmltv;
pub mod xtream;

use std::sync::Arc;

use tracing::{info, warn};

use crate::errors::{AppError, AppResult};
use crate::models::{EpgProgram, EpgSource, EpgSourceKind, Id, SourceStatus, StreamSource, StreamSourceKind};
use crate::repositories::{ChannelRepository, EpgProgramRepository, EpgSourceRepository, StreamSourceRepository};
use crate::utils::http_client_factory::HttpClientFactory;

/// Channels are upserted in bounded batches so memory stays flat regardless
/// of playlist size (spec §4.2 "e.g. 500 rows per batch").
const CHANNEL_BATCH_SIZE: usize = 500;
/// Programs have no stable identity and are bulk-replaced per source
/// (spec §4.2 "e.g. 1000 per batch").
const PROGRAM_BATCH_SIZE: usize = 1000;

/// The four sequential stages every ingest handler reports through
/// (spec §4.2 "Stages are sequential; percentages are monotone within a
/// stage"). A real subscriber lives behind the progress bus (C7); tests and
/// callers that don't care can pass [`NoopProgress`].
pub trait ProgressSink: Send + Sync {
    fn report(&self, stage: &str, stage_pct: u8, overall_pct: u8);
}

pub struct NoopProgress;
impl ProgressSink for NoopProgress {
    fn report(&self, _stage: &str, _stage_pct: u8, _overall_pct: u8) {}
}

pub struct Ingestor {
    http: Arc<HttpClientFactory>,
    channels: Arc<dyn ChannelRepository>,
    programs: Arc<dyn EpgProgramRepository>,
    stream_sources: Arc<dyn StreamSourceRepository>,
    epg_sources: Arc<dyn EpgSourceRepository>,
}

impl Ingestor {
    pub fn new(
        http: Arc<HttpClientFactory>,
        channels: Arc<dyn ChannelRepository>,
        programs: Arc<dyn EpgProgramRepository>,
        stream_sources: Arc<dyn StreamSourceRepository>,
        epg_sources: Arc<dyn EpgSourceRepository>,
    ) -> Self {
        Self { http, channels, programs, stream_sources, epg_sources }
    }

    /// Drives the M3U or Xtream handler by `source.kind` (spec §4.2
    /// `ingest_stream_source`). A download/IO error aborts the operation and
    /// is recorded on `StreamSource::last_error`; a parse error on one
    /// record is logged and skipped.
    pub async fn ingest_stream_source(&self, source_id: Id, progress: &dyn ProgressSink) -> AppResult<usize> {
        use crate::repositories::Repository;

        let mut source = self.stream_sources.get(source_id).await?;
        progress.report("download", 0, 0);

        let client = self.http.create_for_service("source_m3u").await;
        let result = self.fetch_and_persist_stream(&source, &client, progress).await;

        match result {
            Ok(count) => {
                progress.report("persist", 100, 100);

                source.status = SourceStatus::Success;
                source.last_ingested_at = Some(chrono::Utc::now());
                source.last_error = None;
                self.stream_sources.put(source).await?;
                info!(source_id = %source_id, count, "stream source ingested");
                Ok(count)
            }
            Err(err) => {
                source.status = SourceStatus::Error;
                source.last_error = Some(err.to_string());
                let _ = self.stream_sources.put(source).await;
                Err(err)
            }
        }
    }

    /// Fetches, parses and persists a stream source's channels in bounded
    /// batches: old channels are dropped once up front, then each
    /// `CHANNEL_BATCH_SIZE` chunk pulled off the parser is upserted before
    /// the next chunk is parsed, so a large playlist never sits fully
    /// materialized in memory alongside its parsed `Channel`s.
    async fn fetch_and_persist_stream(
        &self,
        source: &StreamSource,
        client: &crate::utils::http_client::ServiceHttpClient,
        progress: &dyn ProgressSink,
    ) -> AppResult<usize> {
        self.channels.delete_by_source(source.id).await?;

        match source.kind {
            StreamSourceKind::M3u => {
                let body = client.get(&source.url).await?;
                progress.report("download", 100, 25);

                let text = String::from_utf8_lossy(&body).into_owned();
                progress.report("parse", 0, 40);

                let mut total = 0usize;
                let mut batch = Vec::with_capacity(CHANNEL_BATCH_SIZE);
                for channel in m3u::parse_m3u(source.id, &text) {
                    batch.push(channel);
                    if batch.len() >= CHANNEL_BATCH_SIZE {
                        total += batch.len();
                        self.channels.upsert_batch(std::mem::replace(&mut batch, Vec::with_capacity(CHANNEL_BATCH_SIZE))).await?;
                    }
                }
                if !batch.is_empty() {
                    total += batch.len();
                    self.channels.upsert_batch(batch).await?;
                }
                progress.report("parse", 100, 50);
                progress.report("normalize", 100, 70);
                Ok(total)
            }
            StreamSourceKind::Xtream => {
                let url = xtream_live_streams_url(source)?;
                let body = client.get(&url).await?;
                progress.report("download", 100, 25);

                let text = String::from_utf8_lossy(&body);
                progress.report("parse", 50, 40);
                let channels = xtream::parse_live_streams(source.id, &text);
                progress.report("parse", 100, 50);

                let total = channels.len();
                for batch in channels.chunks(CHANNEL_BATCH_SIZE) {
                    self.channels.upsert_batch(batch.to_vec()).await?;
                }
                progress.report("normalize", 100, 70);
                Ok(total)
            }
        }
    }

    /// Drives the XMLTV or Xtream EPG handler by `source.kind` (spec §4.2
    /// `ingest_epg_source`).
    pub async fn ingest_epg_source(&self, source_id: Id, progress: &dyn ProgressSink) -> AppResult<usize> {
        use crate::repositories::Repository;

        let mut source = self.epg_sources.get(source_id).await?;
        progress.report("download", 0, 0);

        let client = self.http.create_for_service("source_epg").await;
        let result = self.fetch_and_persist_epg(&source, &client, progress).await;

        match result {
            Ok((count, detected_offset, skipped)) => {
                if skipped > 0 {
                    warn!(source_id = %source_id, skipped, "some EPG records were skipped");
                }
                progress.report("persist", 100, 100);

                source.status = SourceStatus::Success;
                if let Some(offset) = detected_offset {
                    source.detected_timezone_offset = offset;
                }
                source.last_error = None;
                source.last_ingested_at = Some(chrono::Utc::now());
                self.epg_sources.put(source).await?;
                info!(source_id = %source_id, count, "epg source ingested");
                Ok(count)
            }
            Err(err) => {
                source.status = SourceStatus::Error;
                source.last_error = Some(err.to_string());
                let _ = self.epg_sources.put(source).await;
                Err(err)
            }
        }
    }

    /// Fetches, parses and persists an XMLTV guide in bounded batches. The
    /// XML token reader runs on a blocking thread and streams completed
    /// programs back over a bounded channel `PROGRAM_BATCH_SIZE` at a time,
    /// so the async side can insert each batch as it arrives rather than
    /// waiting for the whole document to finish parsing before persistence
    /// starts.
    async fn fetch_and_persist_epg(
        &self,
        source: &EpgSource,
        client: &crate::utils::http_client::ServiceHttpClient,
        progress: &dyn ProgressSink,
    ) -> AppResult<(usize, Option<String>, u32)> {
        match source.kind {
            EpgSourceKind::Xmltv => {
                let body = client.get(&source.url).await?;
                progress.report("download", 100, 25);

                let content = decode_epg_body(&body);
                progress.report("parse", 0, 40);

                self.programs.delete_by_source(source.id).await?;

                let (tx, mut rx) = tokio::sync::mpsc::channel::<Vec<EpgProgram>>(4);
                let source_id = source.id;
                let timeshift_hours = source.timeshift_hours;
                let parse_task = tokio::task::spawn_blocking(move || {
                    let mut batch = Vec::with_capacity(PROGRAM_BATCH_SIZE);
                    let parsed = xmltv::parse_xmltv(source_id, &content, timeshift_hours, &mut |program| {
                        batch.push(program);
                        if batch.len() >= PROGRAM_BATCH_SIZE {
                            let full = std::mem::replace(&mut batch, Vec::with_capacity(PROGRAM_BATCH_SIZE));
                            let _ = tx.blocking_send(full);
                        }
                    });
                    if !batch.is_empty() {
                        let _ = tx.blocking_send(batch);
                    }
                    parsed
                });

                let mut total = 0usize;
                while let Some(batch) = rx.recv().await {
                    total += batch.len();
                    self.programs.insert_batch(batch).await?;
                }

                let parsed = parse_task.await.map_err(|e| AppError::internal(format!("xmltv parse task panicked: {e}")))?;
                progress.report("parse", 100, 50);
                progress.report("normalize", 100, 70);
                Ok((total, parsed.detected_offset, parsed.skipped_records))
            }
            EpgSourceKind::Xtream => {
                // Xtream EPG is fetched per-channel (`get_short_epg`); the
                // channel set is whatever stream sources have already been
                // ingested and is out of scope for this handler alone, so
                // this path expects the caller to drive per-channel fetches
                // upstream of the pipeline's Collect stage.
                Err(AppError::input("xtream EPG ingestion requires a channel tvg_id; use ingest_xtream_epg_for_channel"))
            }
        }
    }

    /// Fetches and parses a single channel's short EPG listing from an
    /// Xtream source (spec glossary "Xtream ... EPG through fixed
    /// endpoints").
    pub async fn ingest_xtream_epg_for_channel(&self, source: &EpgSource, channel_tvg_id: &str) -> AppResult<Vec<crate::models::EpgProgram>> {
        let client = self.http.create_for_service("source_epg").await;
        let url = xtream_short_epg_url(source, channel_tvg_id)?;
        let body = client.get(&url).await?;
        let text = String::from_utf8_lossy(&body);
        Ok(xtream::parse_short_epg(source.id, channel_tvg_id, &text))
    }
}

fn decode_epg_body(body: &bytes::Bytes) -> String {
    String::from_utf8_lossy(body).into_owned()
}

fn xtream_live_streams_url(source: &StreamSource) -> AppResult<String> {
    let username = source.credentials.username.as_deref().ok_or_else(|| AppError::input("xtream source requires a username"))?;
    let password = source.credentials.password.as_deref().ok_or_else(|| AppError::input("xtream source requires a password"))?;
    Ok(format!(
        "{}/player_api.php?username={}&password={}&action=get_live_streams",
        source.url.trim_end_matches('/'),
        username,
        password
    ))
}

fn xtream_short_epg_url(source: &EpgSource, channel_tvg_id: &str) -> AppResult<String> {
    let username = source.credentials.username.as_deref().ok_or_else(|| AppError::input("xtream source requires a username"))?;
    let password = source.credentials.password.as_deref().ok_or_else(|| AppError::input("xtream source requires a password"))?;
    Ok(format!(
        "{}/player_api.php?username={}&password={}&action=get_short_epg&stream_id={}",
        source.url.trim_end_matches('/'),
        username,
        password,
        channel_tvg_id
    ))
}
