//! Numbering stage (spec §4.4 step 4).

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::AppResult;
use crate::ingest::ProgressSink;
use crate::models::StreamProxy;

use super::{PipelineContext, PipelineState, Stage};

pub struct NumberingStage;

#[async_trait]
impl Stage for NumberingStage {
    fn name(&self) -> &'static str {
        "numbering"
    }

    async fn run(
        &self,
        proxy: &StreamProxy,
        _ctx: &PipelineContext,
        mut state: PipelineState,
        _progress: &dyn ProgressSink,
    ) -> AppResult<PipelineState> {
        let config = &proxy.numbering;

        if config.group_aware {
            let mut next_by_group: HashMap<String, i32> = HashMap::new();
            for channel in &mut state.channels {
                if config.respect_existing && channel.chno.as_deref().is_some_and(|c| !c.is_empty()) {
                    continue;
                }
                let group = channel.group.clone().unwrap_or_default();
                let next = next_by_group.entry(group).or_insert(config.starting_number);
                channel.chno = Some(next.to_string());
                *next += 1;
            }
        } else {
            let mut next = config.starting_number;
            for channel in &mut state.channels {
                if config.respect_existing && channel.chno.as_deref().is_some_and(|c| !c.is_empty()) {
                    continue;
                }
                channel.chno = Some(next.to_string());
                next += 1;
            }
        }

        debug!(channels = state.channels.len(), group_aware = config.group_aware, "assigned channel numbers");
        Ok(state)
    }
}
