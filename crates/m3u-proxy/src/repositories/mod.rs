//! Repository traits (spec §5 "the repository layer is transactional").
//!
//! The relational store itself is out of scope for this core (spec §1); what
//! matters here is the *shape* every other component programs against. One
//! in-memory implementation ([`memory::InMemoryRepositories`]) backs it for
//! now — a real backing store is a drop-in behind the same traits.

pub mod memory;

use async_trait::async_trait;

use crate::errors::AppResult;
use crate::models::{
    Channel, ChannelKey, ClientDetectionRule, DataMappingRule, EncodingProfile, EpgProgram,
    EpgSource, Filter, Id, LogoAsset, StreamProxy, StreamSource,
};

/// Common CRUD shape shared by every entity repository. Entities are
/// returned and accepted whole (spec §6.1: "write endpoints accept and
/// return the full entity representation"), so there is no separate
/// create/update request type.
#[async_trait]
pub trait Repository<T>: Send + Sync {
    async fn get(&self, id: Id) -> AppResult<T>;
    async fn list(&self) -> AppResult<Vec<T>>;
    async fn put(&self, entity: T) -> AppResult<T>;
    async fn delete(&self, id: Id) -> AppResult<()>;
}

#[async_trait]
pub trait StreamSourceRepository: Repository<StreamSource> {}

#[async_trait]
pub trait EpgSourceRepository: Repository<EpgSource> {}

#[async_trait]
pub trait StreamProxyRepository: Repository<StreamProxy> {}

#[async_trait]
pub trait LogoAssetRepository: Repository<LogoAsset> {
    async fn find_by_content_hash(&self, content_hash: &str) -> AppResult<Option<LogoAsset>>;
    async fn find_by_origin_url(&self, origin_url: &str) -> AppResult<Option<LogoAsset>>;
}

#[async_trait]
pub trait EncodingProfileRepository: Repository<EncodingProfile> {}

#[async_trait]
pub trait ClientDetectionRuleRepository: Repository<ClientDetectionRule> {
    /// All enabled rules ordered ascending by priority, per spec §4.6 step 1.
    async fn list_enabled_by_priority(&self) -> AppResult<Vec<ClientDetectionRule>>;
}

#[async_trait]
pub trait DataMappingRuleRepository: Repository<DataMappingRule> {
    async fn list_enabled_by_domain_priority(&self, domain: crate::models::RuleDomain) -> AppResult<Vec<DataMappingRule>>;
}

#[async_trait]
pub trait FilterRepository: Repository<Filter> {
    async fn list_enabled_by_domain_priority(&self, domain: crate::models::RuleDomain) -> AppResult<Vec<Filter>>;
}

/// Channels are owned by their source and upserted by key, not by id alone
/// (spec §4.2 "Upsert semantics"), so they get a dedicated trait rather than
/// the generic [`Repository`].
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn get(&self, id: Id) -> AppResult<Channel>;
    async fn list_by_source(&self, source_id: Id) -> AppResult<Vec<Channel>>;
    async fn list_by_sources(&self, source_ids: &[Id]) -> AppResult<Vec<Channel>>;
    async fn list(&self, source_id: Option<Id>, limit: usize, offset: usize) -> AppResult<(Vec<Channel>, usize)>;
    async fn find_by_key(&self, key: &ChannelKey) -> AppResult<Option<Channel>>;
    /// Insert-or-update in the caller's batch, keyed by [`Channel::upsert_key`].
    async fn upsert_batch(&self, batch: Vec<Channel>) -> AppResult<()>;
    /// Cascade-delete every channel owned by `source_id` (spec §3 ownership summary).
    async fn delete_by_source(&self, source_id: Id) -> AppResult<()>;
}

/// Programs have no natural stable identity, so a source's programs are
/// replaced wholesale on each ingest (spec §4.2 "bulk delete then bulk
/// insert"). The delete and the per-batch inserts are separate calls, not
/// one `replace`, so a caller streaming programs out of a parser in bounded
/// chunks can delete once up front and then insert each chunk as it arrives
/// without the later chunks wiping out the earlier ones.
#[async_trait]
pub trait EpgProgramRepository: Send + Sync {
    async fn list_by_source(&self, source_id: Id) -> AppResult<Vec<EpgProgram>>;
    async fn list_by_sources(&self, source_ids: &[Id]) -> AppResult<Vec<EpgProgram>>;
    /// Cascade-delete every program owned by `source_id`.
    async fn delete_by_source(&self, source_id: Id) -> AppResult<()>;
    async fn insert_batch(&self, batch: Vec<EpgProgram>) -> AppResult<()>;
}
