//! Filter stage (spec §4.4 step 3).

use async_trait::async_trait;
use tracing::debug;

use crate::errors::AppResult;
use crate::ingest::ProgressSink;
use crate::models::{Filter, FilterMode, RuleDomain, StreamProxy};
use crate::rules::{self, evaluate_predicate_only, NoDynamicContext, Record};

use super::{PipelineContext, PipelineState, Stage};

pub struct FilterStage;

#[async_trait]
impl Stage for FilterStage {
    fn name(&self) -> &'static str {
        "filter"
    }

    async fn run(
        &self,
        _proxy: &StreamProxy,
        ctx: &PipelineContext,
        mut state: PipelineState,
        _progress: &dyn ProgressSink,
    ) -> AppResult<PipelineState> {
        let stream_filters = ctx.filters.list_enabled_by_domain_priority(RuleDomain::Stream).await?;
        let epg_filters = ctx.filters.list_enabled_by_domain_priority(RuleDomain::Epg).await?;

        let before_channels = state.channels.len();
        state.channels.retain(|channel| keep(channel, &stream_filters, RuleDomain::Stream));

        let before_programs = state.programs.len();
        state.programs.retain(|program| keep(program, &epg_filters, RuleDomain::Epg));

        debug!(
            channels_dropped = before_channels - state.channels.len(),
            programs_dropped = before_programs - state.programs.len(),
            "applied filters"
        );
        Ok(state)
    }
}

/// A record is dropped as soon as any exclusion filter matches, or any
/// inclusion filter fails to match (spec §4.4 step 3).
fn keep<R: Record>(record: &R, filters: &[Filter], domain: RuleDomain) -> bool {
    for filter in filters {
        let Ok(expr) = rules::validate(domain, &filter.expression) else {
            continue;
        };
        let matched = evaluate_predicate_only(&expr, record, &NoDynamicContext);
        match filter.mode {
            FilterMode::Exclude if matched => return false,
            FilterMode::Include if !matched => return false,
            _ => {}
        }
    }
    true
}
