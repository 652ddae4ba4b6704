//! Generator pipeline (spec §4.4, component C4): turns a `StreamProxy`
//! definition plus its sources' current channels/programs into the
//! materialized lists the publisher serializes.
//!
//! Stages are represented as data, not a hard-coded call sequence (each one
//! knows its own name and whether it applies to a given proxy), so the
//! orchestrator is just a loop over an ordered list.

mod collect;
mod data_mapping;
mod filter;
mod generate;
mod logo_caching;
mod numbering;

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::AppResult;
use crate::ingest::ProgressSink;
use crate::models::{Channel, EpgProgram, StreamProxy};
use crate::repositories::{
    ChannelRepository, DataMappingRuleRepository, EpgProgramRepository, EpgSourceRepository,
    FilterRepository, LogoAssetRepository, StreamSourceRepository,
};
use crate::utils::http_client_factory::HttpClientFactory;

/// Everything a stage needs but none of them owns: repositories and the
/// outbound HTTP client factory (for logo fetches).
pub struct PipelineContext {
    pub channels: Arc<dyn ChannelRepository>,
    pub programs: Arc<dyn EpgProgramRepository>,
    pub stream_sources: Arc<dyn StreamSourceRepository>,
    pub epg_sources: Arc<dyn EpgSourceRepository>,
    pub data_mapping_rules: Arc<dyn DataMappingRuleRepository>,
    pub filters: Arc<dyn FilterRepository>,
    pub logos: Arc<dyn LogoAssetRepository>,
    pub http: Arc<HttpClientFactory>,
    pub logo_storage: Arc<sandboxed_file_manager::SandboxedManager>,
}

/// The accumulator threaded through every stage. Each stage consumes the
/// previous one's output and produces the next, so only one generation's
/// worth of records is ever live (spec §4.4 "bounded memory").
#[derive(Debug, Default, Clone)]
pub struct PipelineState {
    pub channels: Vec<Channel>,
    pub programs: Vec<EpgProgram>,
    /// Non-fatal counts surfaced in the operation result (spec §4.4 "A stage
    /// may report non-fatal warnings").
    pub logo_fetch_failures: u32,
    pub dropped_orphan_programs: u32,
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this stage has anything to do for `proxy` (spec §4.4 "A stage
    /// may be skipped if its inputs are empty").
    fn applies_when(&self, _proxy: &StreamProxy) -> bool {
        true
    }

    async fn run(
        &self,
        proxy: &StreamProxy,
        ctx: &PipelineContext,
        state: PipelineState,
        progress: &dyn ProgressSink,
    ) -> AppResult<PipelineState>;
}

/// The fixed stage order from spec §4.4 steps 1-6 (step 7, Publish, is
/// handed off to the publisher once this returns).
pub fn default_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(collect::CollectStage),
        Box::new(data_mapping::DataMappingStage),
        Box::new(filter::FilterStage),
        Box::new(numbering::NumberingStage),
        Box::new(logo_caching::LogoCachingStage),
        Box::new(generate::GenerateStage),
    ]
}

/// Runs every stage that applies, in order, reporting the stage name as the
/// progress `current_stage` (spec §4.4 "Each stage emits stage start/
/// progress/end events").
pub async fn run(
    proxy: &StreamProxy,
    ctx: &PipelineContext,
    stages: &[Box<dyn Stage>],
    progress: &dyn ProgressSink,
) -> AppResult<PipelineState> {
    let mut state = PipelineState::default();
    let total = stages.len().max(1);

    for (i, stage) in stages.iter().enumerate() {
        if !stage.applies_when(proxy) {
            continue;
        }
        let overall_start = (i * 100 / total) as u8;
        progress.report(stage.name(), 0, overall_start);
        state = stage.run(proxy, ctx, state, progress).await?;
        let overall_end = ((i + 1) * 100 / total) as u8;
        progress.report(stage.name(), 100, overall_end);
    }

    Ok(state)
}
