//! Collect stage (spec §4.4 step 1).

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::AppResult;
use crate::ingest::ProgressSink;
use crate::models::StreamProxy;

use super::{PipelineContext, PipelineState, Stage};

pub struct CollectStage;

#[async_trait]
impl Stage for CollectStage {
    fn name(&self) -> &'static str {
        "collect"
    }

    async fn run(
        &self,
        proxy: &StreamProxy,
        ctx: &PipelineContext,
        mut state: PipelineState,
        _progress: &dyn ProgressSink,
    ) -> AppResult<PipelineState> {
        let source_ids: Vec<_> = proxy.source_ids.iter().copied().collect();
        let epg_source_ids: Vec<_> = proxy.epg_source_ids.iter().copied().collect();

        state.channels = ctx.channels.list_by_sources(&source_ids).await?;
        let all_programs = ctx.programs.list_by_sources(&epg_source_ids).await?;

        let known_tvg_ids: HashSet<&str> =
            state.channels.iter().filter_map(|c| c.tvg_id.as_deref()).filter(|id| !id.is_empty()).collect();

        let before = all_programs.len();
        state.programs = all_programs.into_iter().filter(|p| known_tvg_ids.contains(p.channel_tvg_id.as_str())).collect();
        state.dropped_orphan_programs = (before - state.programs.len()) as u32;

        debug!(
            channels = state.channels.len(),
            programs = state.programs.len(),
            dropped_orphans = state.dropped_orphan_programs,
            "collected proxy inputs"
        );
        Ok(state)
    }
}
