//! DataMapping stage (spec §4.4 step 2).

use async_trait::async_trait;
use tracing::debug;

use crate::errors::AppResult;
use crate::ingest::ProgressSink;
use crate::models::{RuleDomain, StreamProxy};
use crate::rules::{self, NoDynamicContext};

use super::{PipelineContext, PipelineState, Stage};

pub struct DataMappingStage;

#[async_trait]
impl Stage for DataMappingStage {
    fn name(&self) -> &'static str {
        "data_mapping"
    }

    async fn run(
        &self,
        _proxy: &StreamProxy,
        ctx: &PipelineContext,
        mut state: PipelineState,
        _progress: &dyn ProgressSink,
    ) -> AppResult<PipelineState> {
        let stream_rules = ctx.data_mapping_rules.list_enabled_by_domain_priority(RuleDomain::Stream).await?;
        let epg_rules = ctx.data_mapping_rules.list_enabled_by_domain_priority(RuleDomain::Epg).await?;

        if stream_rules.is_empty() && epg_rules.is_empty() {
            return Ok(state);
        }

        let parsed_stream: Vec<_> = stream_rules
            .iter()
            .filter_map(|r| rules::validate(RuleDomain::Stream, &r.expression).ok().map(|expr| (r, expr)))
            .collect();
        let parsed_epg: Vec<_> = epg_rules
            .iter()
            .filter_map(|r| rules::validate(RuleDomain::Epg, &r.expression).ok().map(|expr| (r, expr)))
            .collect();

        // Rules do not remove records; a predicate match just applies the
        // rule's SET action (spec §4.4 step 2), so one pass of every enabled
        // rule over every record, highest priority first.
        for channel in &mut state.channels {
            for (_, expr) in &parsed_stream {
                rules::evaluate(expr, channel, &NoDynamicContext);
            }
        }
        for program in &mut state.programs {
            for (_, expr) in &parsed_epg {
                rules::evaluate(expr, program, &NoDynamicContext);
            }
        }

        debug!(stream_rules = parsed_stream.len(), epg_rules = parsed_epg.len(), "applied data mapping rules");
        Ok(state)
    }
}
