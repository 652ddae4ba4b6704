//! Centralized factory for [`ServiceHttpClient`]s, decoupling callers from
//! circuit breaker management (spec §4.1 `factory.create_for_service`).

use std::sync::Arc;

use reqwest::Client;

use super::circuit_breaker::CircuitBreakerManager;
use super::http_client::{ResolvedHttpSettings, ServiceHttpClient};
use crate::config::Config;

pub struct HttpClientFactory {
    config: Arc<Config>,
    breakers: Arc<CircuitBreakerManager>,
    client: Client,
}

impl HttpClientFactory {
    pub fn new(config: Arc<Config>) -> Self {
        let breakers = Arc::new(CircuitBreakerManager::new(config.circuitbreaker.clone()));
        let client = Client::builder().build().expect("failed to build reqwest client");
        Self { config, breakers, client }
    }

    pub fn circuit_breakers(&self) -> Arc<CircuitBreakerManager> {
        self.breakers.clone()
    }

    /// Returns a client whose circuit breaker is shared by every other
    /// client created for the same `service_name` (spec §4.1).
    pub async fn create_for_service(&self, service_name: &str) -> ServiceHttpClient {
        let breaker = self.breakers.get_or_create(service_name).await;
        let base = &self.config.http_client;
        let overrides = base.services.get(service_name);

        let settings = ResolvedHttpSettings {
            timeout: base.timeout,
            max_retries: overrides.and_then(|o| o.max_retries).unwrap_or(base.max_retries),
            base_delay: base.base_delay,
            backoff_multiplier: base.backoff_multiplier,
            max_delay: base.max_delay,
            max_response_size: overrides.and_then(|o| o.max_response_size).unwrap_or(base.max_response_size),
            user_agent: base.user_agent.clone(),
            acceptable_status_codes: breaker.profile().await.acceptable_status_codes.clone(),
        };

        ServiceHttpClient::new(service_name, self.client.clone(), breaker, settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shares_breaker_across_clients_for_same_service() {
        let factory = HttpClientFactory::new(Arc::new(Config::default()));
        let a = factory.circuit_breakers().get_or_create("source_m3u").await;
        let _client = factory.create_for_service("source_m3u").await;
        let b = factory.circuit_breakers().get_or_create("source_m3u").await;
        assert!(Arc::ptr_eq(&a, &b));
    }
}
