use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use csm_dashboard_shared::io::rewards_tree::RewardsTree;

use crate::cache::TtlCache;

pub mod file;
pub mod reqwest;

pub use file::FileRewardsTreeReader;
pub use reqwest::ReqwestRewardsTreeReader;

pub trait RewardsTreeReader {
    fn read_tree(&self) -> impl Future<Output = anyhow::Result<Arc<RewardsTree>>> + Send;

    /// Drops expired cached trees, returning how many were dropped.
    fn cleanup_expired(&self) -> usize {
        0
    }
}

pub enum RewardsTreeSource {
    Remote(ReqwestRewardsTreeReader),
    File(FileRewardsTreeReader),
}

impl RewardsTreeReader for RewardsTreeSource {
    async fn read_tree(&self) -> anyhow::Result<Arc<RewardsTree>> {
        match self {
            Self::Remote(reader) => reader.read_tree().await,
            Self::File(reader) => reader.read_tree().await,
        }
    }
}

/// Keeps the last successfully parsed tree for `ttl`. Failed reads are not cached, so the
/// next call retries the underlying reader.
pub struct CachedRewardsTreeReader<R> {
    inner: R,
    ttl: Duration,
    cache: TtlCache<(), Arc<RewardsTree>>,
}

impl<R: RewardsTreeReader + Sync> CachedRewardsTreeReader<R> {
    pub fn new(inner: R, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: TtlCache::new(ttl, 1),
        }
    }

    pub fn invalidate(&self) {
        self.cache.clear();
    }
}

impl<R: RewardsTreeReader + Sync> RewardsTreeReader for CachedRewardsTreeReader<R> {
    async fn read_tree(&self) -> anyhow::Result<Arc<RewardsTree>> {
        self.cache
            .get_or_try_insert_with((), self.ttl, || self.inner.read_tree())
            .await
    }

    fn cleanup_expired(&self) -> usize {
        self.cache.cleanup_expired()
    }
}

pub type DefaultRewardsTreeReader = CachedRewardsTreeReader<RewardsTreeSource>;
