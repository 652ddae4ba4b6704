//! Generate stage (spec §4.4 step 6): deterministic ordering so repeated
//! runs over unchanged input produce byte-identical output.

use async_trait::async_trait;

use crate::errors::AppResult;
use crate::ingest::ProgressSink;
use crate::models::StreamProxy;

use super::{PipelineContext, PipelineState, Stage};

pub struct GenerateStage;

#[async_trait]
impl Stage for GenerateStage {
    fn name(&self) -> &'static str {
        "generate"
    }

    async fn run(
        &self,
        _proxy: &StreamProxy,
        _ctx: &PipelineContext,
        mut state: PipelineState,
        _progress: &dyn ProgressSink,
    ) -> AppResult<PipelineState> {
        sort_deterministically(&mut state);
        Ok(state)
    }
}

fn sort_deterministically(state: &mut PipelineState) {
    state.channels.sort_by(|a, b| (chno_sort_key(a.chno.as_deref()), a.source_id, a.id).cmp(&(chno_sort_key(b.chno.as_deref()), b.source_id, b.id)));
    state.programs.sort_by(|a, b| (a.channel_tvg_id.clone(), a.source_id, a.id).cmp(&(b.channel_tvg_id.clone(), b.source_id, b.id)));
}

/// Numeric `chno` values sort numerically, not lexicographically
/// (`"2"` before `"10"`); unparseable or absent values sort last.
fn chno_sort_key(chno: Option<&str>) -> i64 {
    chno.and_then(|c| c.parse::<i64>().ok()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{new_id, Channel};

    #[test]
    fn sorts_channels_numerically_by_chno() {
        let source_id = new_id();
        let mut c1 = Channel::new(source_id, "B".to_string(), "http://b".to_string());
        c1.chno = Some("10".to_string());
        let mut c2 = Channel::new(source_id, "A".to_string(), "http://a".to_string());
        c2.chno = Some("2".to_string());

        let mut state = PipelineState { channels: vec![c1.clone(), c2.clone()], ..Default::default() };
        sort_deterministically(&mut state);

        assert_eq!(state.channels[0].id, c2.id);
        assert_eq!(state.channels[1].id, c1.id);
    }

    #[test]
    fn channels_without_chno_sort_last() {
        let source_id = new_id();
        let mut numbered = Channel::new(source_id, "A".to_string(), "http://a".to_string());
        numbered.chno = Some("1".to_string());
        let unnumbered = Channel::new(source_id, "B".to_string(), "http://b".to_string());

        let mut state = PipelineState { channels: vec![unnumbered.clone(), numbered.clone()], ..Default::default() };
        sort_deterministically(&mut state);

        assert_eq!(state.channels[0].id, numbered.id);
        assert_eq!(state.channels[1].id, unnumbered.id);
    }
}
