// ServerKernel - core infrastructure with all dependencies
//
// The ServerKernel holds all server dependencies (pools, cache, token
// authority, services, scheduler) and is constructed once at startup.
// Components receive what they need from here instead of reaching for
// globals.

use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

use crate::common::cache::{Cache, NoopCache, RedisCache};
use crate::config::Config;
use crate::domains::attendance::AttendanceSync;
use crate::domains::auth::{
    BcryptHasher, DirectoryAuthenticator, Hasher, LoginRateLimiter, SessionManager, TokenAuthority,
};
use crate::domains::hris::{PgHrisDirectory, Replicator};
use crate::domains::meal::MealRequestEngine;
use crate::kernel::jobs::{
    Dispatcher, InProcessDispatcher, JobRegistry, QueueDispatcher, SchedulerCore, TaskQueue,
};

/// ServerKernel holds all server dependencies
pub struct ServerKernel {
    pub db_pool: PgPool,
    pub hris_pool: PgPool,
    pub cache: Arc<dyn Cache>,
    pub tokens: Arc<TokenAuthority>,
    pub sessions: Arc<SessionManager>,
    pub replicator: Arc<Replicator>,
    pub attendance: Arc<AttendanceSync>,
    pub meal_engine: MealRequestEngine,
    pub scheduler: Arc<SchedulerCore>,
    pub config: Config,
}

impl ServerKernel {
    /// Wire the full dependency graph from configuration.
    ///
    /// `directory` is the optional external credential check for HRIS users;
    /// `queue` the optional external task queue. Both default to absent.
    pub async fn build(
        config: Config,
        db_pool: PgPool,
        hris_pool: PgPool,
        directory: Option<Arc<dyn DirectoryAuthenticator>>,
        queue: Option<Arc<dyn TaskQueue>>,
    ) -> Result<Arc<Self>> {
        let cache: Arc<dyn Cache> = match &config.cache.redis_url {
            Some(url) => match RedisCache::connect(url).await {
                Ok(cache) => {
                    info!("redis cache connected");
                    Arc::new(cache)
                }
                Err(e) => {
                    tracing::warn!("redis unavailable, running without cache: {e}");
                    Arc::new(NoopCache)
                }
            },
            None => Arc::new(NoopCache),
        };

        let tokens = Arc::new(TokenAuthority::from_config(&config.auth, config.is_local())?);
        let hasher: Arc<dyn Hasher> = Arc::new(BcryptHasher::default());
        let limiter = LoginRateLimiter::from_setting(&config.login_rate_limit)
            .map_err(|e| anyhow::anyhow!("invalid LOGIN_RATE_LIMIT: {e}"))?;

        let sessions = Arc::new(SessionManager::new(
            db_pool.clone(),
            cache.clone(),
            tokens.clone(),
            hasher.clone(),
            directory,
            limiter,
            config.session.clone(),
            config.locale.clone(),
            config.cache.clone(),
        ));

        let hris_directory = Arc::new(PgHrisDirectory::new(hris_pool.clone()));
        let replicator = Arc::new(Replicator::new(db_pool.clone(), hris_directory.clone()));
        let attendance = Arc::new(AttendanceSync::new(db_pool.clone(), hris_directory));
        let meal_engine = MealRequestEngine::new(db_pool.clone(), attendance.clone());

        let registry = Arc::new(JobRegistry::new());
        let dispatcher: Arc<dyn Dispatcher> = match (config.queue_enabled, queue) {
            (true, Some(queue)) => Arc::new(QueueDispatcher::new(queue, registry.clone())),
            _ => Arc::new(InProcessDispatcher::new(registry.clone())),
        };
        let scheduler = SchedulerCore::new(
            db_pool.clone(),
            registry,
            dispatcher,
            config.scheduler.clone(),
        );

        Ok(Arc::new(Self {
            db_pool,
            hris_pool,
            cache,
            tokens,
            sessions,
            replicator,
            attendance,
            meal_engine,
            scheduler,
            config,
        }))
    }
}
