//! Orchestration glue above the generator pipeline (spec §4.4 step 7
//! "Publish", §7 "Generator pipeline fails the whole operation on any
//! stage's fatal error").
//!
//! [`pipeline::run`](crate::pipeline::run) only knows how to turn a
//! `StreamProxy` plus its sources into an in-memory channel/program list;
//! something has to run it, hand the result to the [`Publisher`], and write
//! the proxy's `status`/`channel_count`/`last_error` back. That's this
//! module, used by both the REST handlers (on-demand `regenerate`) and the
//! scheduler (C8).

use std::sync::Arc;

use tracing::{info, warn};

use crate::errors::AppResult;
use crate::ingest::ProgressSink;
use crate::models::{Id, ProxyStatus};
use crate::pipeline::{self, PipelineContext, Stage};
use crate::publish::Publisher;
use crate::repositories::{Repository, StreamProxyRepository};

pub struct GenerationService {
    ctx: PipelineContext,
    stages: Vec<Box<dyn Stage>>,
    publisher: Publisher,
    proxies: Arc<dyn StreamProxyRepository>,
}

impl GenerationService {
    pub fn new(ctx: PipelineContext, publisher: Publisher, proxies: Arc<dyn StreamProxyRepository>) -> Self {
        Self { ctx, stages: pipeline::default_stages(), publisher, proxies }
    }

    /// Runs the full pipeline for `proxy_id` and publishes the result (spec
    /// §4.4 "Orchestration contract": one logical operation, one
    /// `ProgressOperation`). On any stage's fatal error the proxy's status
    /// becomes `failed` and the previously published files are left
    /// untouched, since [`Publisher::publish`] is never reached.
    pub async fn generate_proxy(&self, proxy_id: Id, progress: &dyn ProgressSink) -> AppResult<()> {
        let mut proxy = self.proxies.get(proxy_id).await?;
        proxy.status = ProxyStatus::Generating;
        self.proxies.put(proxy.clone()).await?;

        match pipeline::run(&proxy, &self.ctx, &self.stages, progress).await {
            Ok(state) => {
                if let Err(err) = self.publisher.publish(&proxy, &state.channels, &state.programs).await {
                    proxy.status = ProxyStatus::Failed;
                    proxy.last_error = Some(err.to_string());
                    self.proxies.put(proxy).await?;
                    return Err(err);
                }

                if state.logo_fetch_failures > 0 || state.dropped_orphan_programs > 0 {
                    warn!(
                        proxy_id = %proxy_id,
                        logo_fetch_failures = state.logo_fetch_failures,
                        dropped_orphan_programs = state.dropped_orphan_programs,
                        "generation completed with non-fatal warnings"
                    );
                }

                proxy.status = ProxyStatus::Success;
                proxy.channel_count = state.channels.len() as u32;
                proxy.last_generated_at = Some(chrono::Utc::now());
                proxy.last_error = None;
                self.proxies.put(proxy).await?;
                info!(proxy_id = %proxy_id, channels = state.channels.len(), "proxy generated");
                Ok(())
            }
            Err(err) => {
                proxy.status = ProxyStatus::Failed;
                proxy.last_error = Some(err.to_string());
                let _ = self.proxies.put(proxy).await;
                Err(err)
            }
        }
    }
}
