//! In-memory repository implementation.
//!
//! Backs every trait in [`super`] with a plain `HashMap` guarded by a
//! `tokio::sync::RwLock`. A real deployment drops a database-backed
//! implementation in behind the same traits (spec §5); this one exists so
//! the rest of the system has something to run against today.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::{AppResult, RepositoryError};
use crate::models::{
    Channel, ChannelKey, ClientDetectionRule, DataMappingRule, EncodingProfile, EpgProgram,
    EpgSource, Filter, Id, LogoAsset, RuleDomain, StreamProxy, StreamSource,
};

use super::{
    ChannelRepository, ClientDetectionRuleRepository, DataMappingRuleRepository,
    EncodingProfileRepository, EpgProgramRepository, EpgSourceRepository, FilterRepository,
    LogoAssetRepository, Repository, StreamProxyRepository, StreamSourceRepository,
};

trait HasId {
    fn id(&self) -> Id;
}

macro_rules! impl_has_id {
    ($t:ty) => {
        impl HasId for $t {
            fn id(&self) -> Id {
                self.id
            }
        }
    };
}

impl_has_id!(StreamSource);
impl_has_id!(EpgSource);
impl_has_id!(StreamProxy);
impl_has_id!(LogoAsset);
impl_has_id!(EncodingProfile);
impl_has_id!(ClientDetectionRule);
impl_has_id!(DataMappingRule);
impl_has_id!(Filter);

/// A plain id-keyed table shared by the generic [`Repository`] impls.
struct Store<T> {
    rows: RwLock<HashMap<Id, T>>,
}

impl<T: Clone + HasId + Send + Sync> Store<T> {
    fn new() -> Self {
        Self { rows: RwLock::new(HashMap::new()) }
    }

    async fn get(&self, id: Id, entity_name: &str) -> AppResult<T> {
        self.rows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound { entity: entity_name.to_string(), id: id.to_string() }.into())
    }

    async fn list(&self) -> AppResult<Vec<T>> {
        Ok(self.rows.read().await.values().cloned().collect())
    }

    async fn put(&self, entity: T) -> AppResult<T> {
        let id = entity.id();
        self.rows.write().await.insert(id, entity.clone());
        Ok(entity)
    }

    async fn delete(&self, id: Id) -> AppResult<()> {
        self.rows.write().await.remove(&id);
        Ok(())
    }
}

macro_rules! impl_simple_repository {
    ($store_field:ident, $entity:ty, $entity_name:literal, $repo_trait:ident) => {
        #[async_trait]
        impl Repository<$entity> for InMemoryRepositories {
            async fn get(&self, id: Id) -> AppResult<$entity> {
                self.$store_field.get(id, $entity_name).await
            }
            async fn list(&self) -> AppResult<Vec<$entity>> {
                self.$store_field.list().await
            }
            async fn put(&self, entity: $entity) -> AppResult<$entity> {
                self.$store_field.put(entity).await
            }
            async fn delete(&self, id: Id) -> AppResult<()> {
                self.$store_field.delete(id).await
            }
        }

        #[async_trait]
        impl $repo_trait for InMemoryRepositories {}
    };
}

pub struct InMemoryRepositories {
    stream_sources: Store<StreamSource>,
    epg_sources: Store<EpgSource>,
    proxies: Store<StreamProxy>,
    logos: Store<LogoAsset>,
    encoding_profiles: Store<EncodingProfile>,
    client_detection_rules: Store<ClientDetectionRule>,
    data_mapping_rules: Store<DataMappingRule>,
    filters: Store<Filter>,
    channels: RwLock<HashMap<Id, Channel>>,
    programs: RwLock<HashMap<Id, EpgProgram>>,
}

impl Default for InMemoryRepositories {
    fn default() -> Self {
        Self {
            stream_sources: Store::new(),
            epg_sources: Store::new(),
            proxies: Store::new(),
            logos: Store::new(),
            encoding_profiles: Store::new(),
            client_detection_rules: Store::new(),
            data_mapping_rules: Store::new(),
            filters: Store::new(),
            channels: RwLock::new(HashMap::new()),
            programs: RwLock::new(HashMap::new()),
        }
    }
}

impl InMemoryRepositories {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl_simple_repository!(stream_sources, StreamSource, "stream_source", StreamSourceRepository);
impl_simple_repository!(epg_sources, EpgSource, "epg_source", EpgSourceRepository);
impl_simple_repository!(proxies, StreamProxy, "stream_proxy", StreamProxyRepository);
impl_simple_repository!(encoding_profiles, EncodingProfile, "encoding_profile", EncodingProfileRepository);

#[async_trait]
impl Repository<LogoAsset> for InMemoryRepositories {
    async fn get(&self, id: Id) -> AppResult<LogoAsset> {
        self.logos.get(id, "logo_asset").await
    }
    async fn list(&self) -> AppResult<Vec<LogoAsset>> {
        self.logos.list().await
    }
    async fn put(&self, entity: LogoAsset) -> AppResult<LogoAsset> {
        self.logos.put(entity).await
    }
    async fn delete(&self, id: Id) -> AppResult<()> {
        self.logos.delete(id).await
    }
}

#[async_trait]
impl LogoAssetRepository for InMemoryRepositories {
    async fn find_by_content_hash(&self, content_hash: &str) -> AppResult<Option<LogoAsset>> {
        Ok(self.logos.rows.read().await.values().find(|l| l.content_hash == content_hash).cloned())
    }

    async fn find_by_origin_url(&self, origin_url: &str) -> AppResult<Option<LogoAsset>> {
        Ok(self.logos.rows.read().await.values().find(|l| l.origin_url.as_deref() == Some(origin_url)).cloned())
    }
}

#[async_trait]
impl Repository<ClientDetectionRule> for InMemoryRepositories {
    async fn get(&self, id: Id) -> AppResult<ClientDetectionRule> {
        self.client_detection_rules.get(id, "client_detection_rule").await
    }
    async fn list(&self) -> AppResult<Vec<ClientDetectionRule>> {
        self.client_detection_rules.list().await
    }
    async fn put(&self, entity: ClientDetectionRule) -> AppResult<ClientDetectionRule> {
        self.client_detection_rules.put(entity).await
    }
    async fn delete(&self, id: Id) -> AppResult<()> {
        self.client_detection_rules.delete(id).await
    }
}

#[async_trait]
impl ClientDetectionRuleRepository for InMemoryRepositories {
    async fn list_enabled_by_priority(&self) -> AppResult<Vec<ClientDetectionRule>> {
        let mut rules: Vec<_> = self.client_detection_rules.rows.read().await.values().filter(|r| r.enabled).cloned().collect();
        rules.sort_by_key(|r| r.priority);
        Ok(rules)
    }
}

#[async_trait]
impl Repository<DataMappingRule> for InMemoryRepositories {
    async fn get(&self, id: Id) -> AppResult<DataMappingRule> {
        self.data_mapping_rules.get(id, "data_mapping_rule").await
    }
    async fn list(&self) -> AppResult<Vec<DataMappingRule>> {
        self.data_mapping_rules.list().await
    }
    async fn put(&self, entity: DataMappingRule) -> AppResult<DataMappingRule> {
        self.data_mapping_rules.put(entity).await
    }
    async fn delete(&self, id: Id) -> AppResult<()> {
        self.data_mapping_rules.delete(id).await
    }
}

#[async_trait]
impl DataMappingRuleRepository for InMemoryRepositories {
    async fn list_enabled_by_domain_priority(&self, domain: RuleDomain) -> AppResult<Vec<DataMappingRule>> {
        let mut rules: Vec<_> = self
            .data_mapping_rules
            .rows
            .read()
            .await
            .values()
            .filter(|r| r.enabled && r.domain == domain)
            .cloned()
            .collect();
        // Higher priority first (spec §3 "priority (int, higher first)").
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(rules)
    }
}

#[async_trait]
impl Repository<Filter> for InMemoryRepositories {
    async fn get(&self, id: Id) -> AppResult<Filter> {
        self.filters.get(id, "filter").await
    }
    async fn list(&self) -> AppResult<Vec<Filter>> {
        self.filters.list().await
    }
    async fn put(&self, entity: Filter) -> AppResult<Filter> {
        self.filters.put(entity).await
    }
    async fn delete(&self, id: Id) -> AppResult<()> {
        self.filters.delete(id).await
    }
}

#[async_trait]
impl FilterRepository for InMemoryRepositories {
    async fn list_enabled_by_domain_priority(&self, domain: RuleDomain) -> AppResult<Vec<Filter>> {
        let mut filters: Vec<_> = self.filters.rows.read().await.values().filter(|f| f.enabled && f.domain == domain).cloned().collect();
        filters.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(filters)
    }
}

#[async_trait]
impl ChannelRepository for InMemoryRepositories {
    async fn get(&self, id: Id) -> AppResult<Channel> {
        self.channels
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound { entity: "channel".to_string(), id: id.to_string() }.into())
    }

    async fn list_by_source(&self, source_id: Id) -> AppResult<Vec<Channel>> {
        Ok(self.channels.read().await.values().filter(|c| c.source_id == source_id).cloned().collect())
    }

    async fn list_by_sources(&self, source_ids: &[Id]) -> AppResult<Vec<Channel>> {
        Ok(self.channels.read().await.values().filter(|c| source_ids.contains(&c.source_id)).cloned().collect())
    }

    async fn list(&self, source_id: Option<Id>, limit: usize, offset: usize) -> AppResult<(Vec<Channel>, usize)> {
        let rows = self.channels.read().await;
        let mut matching: Vec<_> = rows.values().filter(|c| source_id.map_or(true, |s| c.source_id == s)).cloned().collect();
        matching.sort_by(|a, b| a.id.cmp(&b.id));
        let total = matching.len();
        let page = matching.into_iter().skip(offset).take(limit.max(1)).collect();
        Ok((page, total))
    }

    async fn find_by_key(&self, key: &ChannelKey) -> AppResult<Option<Channel>> {
        Ok(self.channels.read().await.values().find(|c| &c.upsert_key() == key).cloned())
    }

    async fn upsert_batch(&self, batch: Vec<Channel>) -> AppResult<()> {
        let mut rows = self.channels.write().await;
        for incoming in batch {
            let existing_id = rows.values().find(|c| c.upsert_key() == incoming.upsert_key()).map(|c| c.id);
            match existing_id {
                Some(id) => {
                    let mut merged = incoming;
                    merged.id = id;
                    rows.insert(id, merged);
                }
                None => {
                    rows.insert(incoming.id, incoming);
                }
            }
        }
        Ok(())
    }

    async fn delete_by_source(&self, source_id: Id) -> AppResult<()> {
        self.channels.write().await.retain(|_, c| c.source_id != source_id);
        Ok(())
    }
}

#[async_trait]
impl EpgProgramRepository for InMemoryRepositories {
    async fn list_by_source(&self, source_id: Id) -> AppResult<Vec<EpgProgram>> {
        Ok(self.programs.read().await.values().filter(|p| p.source_id == source_id).cloned().collect())
    }

    async fn list_by_sources(&self, source_ids: &[Id]) -> AppResult<Vec<EpgProgram>> {
        Ok(self.programs.read().await.values().filter(|p| source_ids.contains(&p.source_id)).cloned().collect())
    }

    async fn delete_by_source(&self, source_id: Id) -> AppResult<()> {
        self.programs.write().await.retain(|_, p| p.source_id != source_id);
        Ok(())
    }

    async fn insert_batch(&self, batch: Vec<EpgProgram>) -> AppResult<()> {
        let mut rows = self.programs.write().await;
        for program in batch {
            rows.insert(program.id, program);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, StreamSourceKind};

    #[tokio::test]
    async fn channel_upsert_batch_replaces_by_key_not_id() {
        let repos = InMemoryRepositories::new();
        let source = StreamSource::new("Test".to_string(), StreamSourceKind::M3u, "http://x".to_string());
        let mut channel = Channel::new(source.id, "BBC One".to_string(), "http://x/bbc1.ts".to_string());
        channel.tvg_id = Some("bbc1".to_string());
        repos.upsert_batch(vec![channel.clone()]).await.unwrap();

        let mut updated = Channel::new(source.id, "BBC One HD".to_string(), "http://x/bbc1.ts".to_string());
        updated.tvg_id = Some("bbc1".to_string());
        repos.upsert_batch(vec![updated]).await.unwrap();

        let all = ChannelRepository::list_by_source(&*repos, source.id).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].display_name, "BBC One HD");
        assert_eq!(all[0].id, channel.id);
    }

    #[tokio::test]
    async fn delete_by_source_then_insert_batch_drops_old_generation() {
        let repos = InMemoryRepositories::new();
        let source = EpgSource::new("Guide".to_string(), crate::models::EpgSourceKind::Xmltv, "http://x".to_string());
        let p1 = EpgProgram::new(source.id, "bbc1".to_string(), chrono::Utc::now(), chrono::Utc::now(), "A".to_string()).unwrap();
        EpgProgramRepository::delete_by_source(&*repos, source.id).await.unwrap();
        repos.insert_batch(vec![p1]).await.unwrap();
        assert_eq!(EpgProgramRepository::list_by_source(&*repos, source.id).await.unwrap().len(), 1);

        let p2 = EpgProgram::new(source.id, "bbc1".to_string(), chrono::Utc::now(), chrono::Utc::now(), "B".to_string()).unwrap();
        EpgProgramRepository::delete_by_source(&*repos, source.id).await.unwrap();
        repos.insert_batch(vec![p2]).await.unwrap();
        let remaining = EpgProgramRepository::list_by_source(&*repos, source.id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].title, "B");
    }

    #[tokio::test]
    async fn insert_batch_across_multiple_calls_accumulates_without_dropping_earlier_chunks() {
        let repos = InMemoryRepositories::new();
        let source = EpgSource::new("Guide".to_string(), crate::models::EpgSourceKind::Xmltv, "http://x".to_string());
        EpgProgramRepository::delete_by_source(&*repos, source.id).await.unwrap();
        for i in 0..3 {
            let program = EpgProgram::new(source.id, format!("ch{i}"), chrono::Utc::now(), chrono::Utc::now(), format!("P{i}")).unwrap();
            repos.insert_batch(vec![program]).await.unwrap();
        }
        assert_eq!(EpgProgramRepository::list_by_source(&*repos, source.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn data_mapping_rules_filtered_and_sorted_by_priority_desc() {
        let repos = InMemoryRepositories::new();
        let low = DataMappingRule::new("low".to_string(), RuleDomain::Stream, "group equals \"x\"".to_string(), 1);
        let high = DataMappingRule::new("high".to_string(), RuleDomain::Stream, "group equals \"x\"".to_string(), 10);
        let mut disabled = DataMappingRule::new("off".to_string(), RuleDomain::Stream, "group equals \"x\"".to_string(), 100);
        disabled.enabled = false;
        repos.put(low).await.unwrap();
        repos.put(high.clone()).await.unwrap();
        repos.put(disabled).await.unwrap();

        let rules = DataMappingRuleRepository::list_enabled_by_domain_priority(&*repos, RuleDomain::Stream).await.unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].id, high.id);
    }
}
