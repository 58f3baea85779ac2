use rehasport_config::{Config, ConfigError};
use rehasport_core::{
    catalog::CatalogService,
    db::{
        Db,
        store::{MemoryStore, RecordStore},
    },
    enrollment::EnrollmentService,
    feed::{BroadcastChannel, MessageService, NotificationChannel},
    identity::{IdentityGate, SessionResolver},
    obs::{SharedSink, global_sink},
    prescription::PrescriptionService,
    profile::ProfileService,
};
use std::sync::Arc;
use tracing::info;

///
/// Runtime
///
/// Constructed once at process start. Every service shares the same store
/// handle, notification channel and metrics sink.
///

#[derive(Clone)]
pub struct Runtime {
    config: Config,
    db: Db,
    channel: Arc<dyn NotificationChannel>,
    identity: IdentityGate,
    enrollment: EnrollmentService,
    catalog: CatalogService,
    prescriptions: PrescriptionService,
    profiles: ProfileService,
    messages: MessageService,
}

impl Runtime {
    /// Wire every service over `store`, reporting to the global metrics sink.
    pub fn new(
        config: Config,
        store: Arc<dyn RecordStore>,
        sessions: Arc<dyn SessionResolver>,
    ) -> Result<Self, ConfigError> {
        Self::with_sink(config, store, sessions, global_sink())
    }

    /// Runtime over a fresh [`MemoryStore`].
    pub fn in_memory(config: Config, sessions: Arc<dyn SessionResolver>) -> Result<Self, ConfigError> {
        Self::new(config, Arc::new(MemoryStore::new()), sessions)
    }

    pub fn with_sink(
        config: Config,
        store: Arc<dyn RecordStore>,
        sessions: Arc<dyn SessionResolver>,
        sink: SharedSink,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let db = Db::new(store);
        let channel: Arc<dyn NotificationChannel> = Arc::new(
            BroadcastChannel::new(config.feed.channel_capacity).with_sink(sink.clone()),
        );

        let identity =
            IdentityGate::new(db.clone(), sessions, &config.identity).with_sink(sink.clone());
        let enrollment =
            EnrollmentService::new(db.clone(), &config.enrollment).with_sink(sink.clone());
        let catalog = CatalogService::new(db.clone(), &config.enrollment);
        let prescriptions = PrescriptionService::new(db.clone(), &config.enrollment);
        let profiles = ProfileService::new(db.clone(), &config.enrollment);
        let messages =
            MessageService::new(db.clone(), channel.clone(), &config.feed).with_sink(sink);

        info!(
            max_retries = config.enrollment.max_retries,
            default_role = ?config.identity.default_role,
            "runtime started"
        );

        Ok(Self {
            config,
            db,
            channel,
            identity,
            enrollment,
            catalog,
            prescriptions,
            profiles,
            messages,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn db(&self) -> &Db {
        &self.db
    }

    #[must_use]
    pub fn channel(&self) -> &dyn NotificationChannel {
        self.channel.as_ref()
    }

    #[must_use]
    pub const fn identity(&self) -> &IdentityGate {
        &self.identity
    }

    #[must_use]
    pub const fn enrollment(&self) -> &EnrollmentService {
        &self.enrollment
    }

    #[must_use]
    pub const fn catalog(&self) -> &CatalogService {
        &self.catalog
    }

    #[must_use]
    pub const fn prescriptions(&self) -> &PrescriptionService {
        &self.prescriptions
    }

    #[must_use]
    pub const fn profiles(&self) -> &ProfileService {
        &self.profiles
    }

    #[must_use]
    pub const fn messages(&self) -> &MessageService {
        &self.messages
    }
}
