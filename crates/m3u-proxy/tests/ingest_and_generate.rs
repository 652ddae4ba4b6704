//! End-to-end happy path: ingest an M3U source over HTTP, generate a proxy,
//! and confirm the published playlist reflects the ingested channel.

use std::sync::Arc;

use m3u_proxy::config::Config;
use m3u_proxy::ingest::{Ingestor, NoopProgress};
use m3u_proxy::models::{ProxyMode, StreamProxy, StreamSource, StreamSourceKind};
use m3u_proxy::pipeline::PipelineContext;
use m3u_proxy::publish::Publisher;
use m3u_proxy::repositories::memory::InMemoryRepositories;
use m3u_proxy::repositories::Repository;
use m3u_proxy::services::GenerationService;
use m3u_proxy::utils::http_client_factory::HttpClientFactory;
use sandboxed_file_manager::SandboxedManager;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PLAYLIST: &str = "#EXTM3U\n\
#EXTINF:-1 tvg-id=\"bbc1\" group-title=\"News\",BBC One\n\
http://upstream.example/bbc1.m3u8\n";

#[tokio::test]
async fn ingest_then_generate_publishes_the_channel() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/playlist.m3u"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PLAYLIST))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let storage = Arc::new(SandboxedManager::builder().base_directory(tmp.path()).build().await.unwrap());

    let config = Arc::new(Config::default());
    let repos = InMemoryRepositories::new();
    let http = Arc::new(HttpClientFactory::new(config.clone()));

    let ingestor = Ingestor::new(http.clone(), repos.clone(), repos.clone(), repos.clone(), repos.clone());

    let source = StreamSource::new("Test Source".to_string(), StreamSourceKind::M3u, format!("{}/playlist.m3u", server.uri()));
    let source_id = source.id;
    repos.put(source).await.unwrap();

    let ingested = ingestor.ingest_stream_source(source_id, &NoopProgress).await.unwrap();
    assert_eq!(ingested, 1);

    let channels: Vec<m3u_proxy::models::Channel> =
        m3u_proxy::repositories::ChannelRepository::list_by_source(&*repos, source_id).await.unwrap();
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].tvg_id.as_deref(), Some("bbc1"));

    let pipeline_ctx = PipelineContext {
        channels: repos.clone(),
        programs: repos.clone(),
        stream_sources: repos.clone(),
        epg_sources: repos.clone(),
        data_mapping_rules: repos.clone(),
        filters: repos.clone(),
        logos: repos.clone(),
        http: http.clone(),
        logo_storage: storage.clone(),
    };
    let publisher = Publisher::new(storage.clone(), "http://localhost:8080".to_string());
    let generation = GenerationService::new(pipeline_ctx, publisher, repos.clone());

    let mut proxy = StreamProxy::new("Test Proxy".to_string(), ProxyMode::Direct);
    proxy.source_ids.insert(source_id);
    let proxy_id = proxy.id;
    repos.put(proxy).await.unwrap();

    generation.generate_proxy(proxy_id, &NoopProgress).await.unwrap();

    let updated: StreamProxy = repos.get(proxy_id).await.unwrap();
    assert_eq!(updated.channel_count, 1);
    assert_eq!(updated.status, m3u_proxy::models::ProxyStatus::Success);

    let published = storage.read_to_string(format!("{proxy_id}/playlist.m3u")).await.unwrap();
    assert!(published.contains("BBC One"));
    assert!(published.contains("tvg-id=\"bbc1\""));
}

#[tokio::test]
async fn regenerating_a_proxy_with_no_sources_publishes_an_empty_playlist() {
    let tmp = tempfile::tempdir().unwrap();
    let storage = Arc::new(SandboxedManager::builder().base_directory(tmp.path()).build().await.unwrap());

    let config = Arc::new(Config::default());
    let repos = InMemoryRepositories::new();
    let http = Arc::new(HttpClientFactory::new(config.clone()));

    let pipeline_ctx = PipelineContext {
        channels: repos.clone(),
        programs: repos.clone(),
        stream_sources: repos.clone(),
        epg_sources: repos.clone(),
        data_mapping_rules: repos.clone(),
        filters: repos.clone(),
        logos: repos.clone(),
        http,
        logo_storage: storage.clone(),
    };
    let publisher = Publisher::new(storage.clone(), "http://localhost:8080".to_string());
    let generation = GenerationService::new(pipeline_ctx, publisher, repos.clone());

    let proxy = StreamProxy::new("Empty Proxy".to_string(), ProxyMode::Direct);
    let proxy_id = proxy.id;
    repos.put(proxy).await.unwrap();

    generation.generate_proxy(proxy_id, &NoopProgress).await.unwrap();

    let published = storage.read_to_string(format!("{proxy_id}/playlist.m3u")).await.unwrap();
    assert_eq!(published.trim(), "#EXTM3U");
}
