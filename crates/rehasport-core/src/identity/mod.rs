//! Session resolution, profile bootstrap and role-based routing.

mod area;
mod session;


pub use area::{Area, Decision, Viewer, authorize, home_area_of};
pub use session::{SessionClaims, SessionResolver, StaticSessionResolver};

use crate::{
    db::Db,
    error::{ErrorClass, ErrorKind, InternalError},
    model::{Principal, Profile, Role},
    obs::{MetricsEvent, SharedSink, global_sink},
    types::{PrincipalId, Timestamp},
};
use rehasport_config::IdentityConfig;
use std::sync::Arc;
use thiserror::Error as ThisError;
use tracing::{debug, error, info, warn};

///
/// IdentityError
///

#[derive(Debug, ThisError)]
pub enum IdentityError {
    #[error("authentication required for {area}")]
    Anonymous { area: Area },

    #[error("role {role} may not access {area}")]
    WrongRole { role: Role, area: Area },

    #[error(transparent)]
    Store(#[from] InternalError),
}

impl IdentityError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Anonymous { .. } | Self::WrongRole { .. } => ErrorKind::Authorization,
            Self::Store(err) => err.kind(),
        }
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Anonymous { .. } | Self::WrongRole { .. } => false,
            Self::Store(err) => err.is_transient(),
        }
    }
}

///
/// Session
///
/// Outcome of token resolution. Resolution fails closed.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Session {
    Anonymous,
    Authenticated(SessionClaims),
}

///
/// Routed
///
/// Viewer and decision for one request.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Routed {
    pub viewer: Viewer,
    pub decision: Decision,
}

///
/// IdentityGate
///

#[derive(Clone)]
pub struct IdentityGate {
    db: Db,
    sessions: Arc<dyn SessionResolver>,
    default_role: Role,
    sink: SharedSink,
}

impl IdentityGate {
    #[must_use]
    pub fn new(db: Db, sessions: Arc<dyn SessionResolver>, config: &IdentityConfig) -> Self {
        Self {
            db,
            sessions,
            default_role: config.default_role.into(),
            sink: global_sink(),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Resolve a token into session claims.
    ///
    /// Missing, unknown or expired tokens and provider failures all yield
    /// [`Session::Anonymous`].
    pub async fn resolve_session(&self, token: Option<&str>) -> Session {
        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return Session::Anonymous;
        };

        match self.sessions.resolve(token).await {
            Ok(Some(claims)) if !claims.is_expired_at(Timestamp::now()) => {
                Session::Authenticated(claims)
            }
            Ok(Some(claims)) => {
                debug!(subject = %claims.subject, "session expired");
                Session::Anonymous
            }
            Ok(None) => {
                debug!("session token not recognised");
                Session::Anonymous
            }
            Err(err) => {
                debug!(error = %err, "session resolution failed, treating as anonymous");
                self.sink.record(MetricsEvent::SessionFailed);
                Session::Anonymous
            }
        }
    }

    /// Route decision for `viewer` requesting `area`.
    #[must_use]
    pub fn authorize(&self, viewer: &Viewer, area: Area) -> Decision {
        let decision = authorize(viewer, area);
        if decision != Decision::Allow {
            self.sink.record(MetricsEvent::AccessRedirected);
        }

        decision
    }

    /// Like [`Self::authorize`], for callers that reject instead of redirecting.
    pub fn require<'a>(
        &self,
        viewer: &'a Viewer,
        area: Area,
    ) -> Result<&'a Principal, IdentityError> {
        match (viewer, authorize(viewer, area)) {
            (Viewer::Principal(principal), Decision::Allow) => Ok(principal),
            (Viewer::Principal(principal), Decision::RedirectTo(_)) => {
                Err(IdentityError::WrongRole {
                    role: principal.role,
                    area,
                })
            }
            (Viewer::Anonymous, _) => Err(IdentityError::Anonymous { area }),
        }
    }

    /// Load the principal for `id`, if a profile exists.
    ///
    /// A row that does not decode (for example a role outside the known
    /// set) is corruption and is never defaulted.
    pub async fn load_principal(&self, id: &PrincipalId) -> Result<Option<Principal>, IdentityError> {
        match self.db.load::<Profile>(id.as_str()).await {
            Ok(found) => Ok(found.map(|loaded| Principal::from(&loaded.entity))),
            Err(err) if err.class == ErrorClass::Corruption => {
                error!(principal = %id, error = %err, "profile row is corrupt");

                Err(InternalError::identity_corruption(format!(
                    "profile {id}: {}",
                    err.message
                ))
                .into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Return the principal's profile, creating it on first login.
    ///
    /// Concurrent calls for the same subject create exactly one row; the
    /// losing insert re-reads the winner's profile.
    pub async fn ensure_profile(&self, claims: &SessionClaims) -> Result<Principal, IdentityError> {
        if let Some(principal) = self.load_principal(&claims.subject).await? {
            return Ok(principal);
        }

        let role = self.signup_role(claims);
        let profile = Profile::new(claims.subject.clone(), claims.email.clone(), role);

        match self.db.insert(&profile).await {
            Ok(created) => {
                info!(principal = %claims.subject, %role, "profile created");
                self.sink.record(MetricsEvent::ProfileCreated);

                Ok(Principal::from(&created.entity))
            }
            Err(err) if err.is_unique_violation() => {
                debug!(principal = %claims.subject, "profile created concurrently");
                self.sink.record(MetricsEvent::ProfileRace);

                self.load_principal(&claims.subject).await?.ok_or_else(|| {
                    InternalError::store_invariant(format!(
                        "profile {} vanished after unique violation",
                        claims.subject
                    ))
                    .into()
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Resolve, bootstrap and authorize one request.
    ///
    /// Store failures while loading the profile send the viewer to
    /// [`Area::Unavailable`] rather than assigning a default role. Unknown
    /// paths are treated as protected and resolve to the viewer's home.
    pub async fn route(&self, token: Option<&str>, path: &str) -> Routed {
        let viewer = match self.resolve_session(token).await {
            Session::Anonymous => Viewer::Anonymous,
            Session::Authenticated(claims) => match self.ensure_profile(&claims).await {
                Ok(principal) => Viewer::Principal(principal),
                Err(err) => {
                    warn!(
                        principal = %claims.subject,
                        error = %err,
                        retryable = err.is_retryable(),
                        "profile lookup failed"
                    );
                    self.sink.record(MetricsEvent::AccessRedirected);

                    return Routed {
                        viewer: Viewer::Anonymous,
                        decision: Decision::RedirectTo(Area::Unavailable),
                    };
                }
            },
        };

        let decision = match Area::from_path(path) {
            Some(area) => self.authorize(&viewer, area),
            None => {
                self.sink.record(MetricsEvent::AccessRedirected);
                Decision::RedirectTo(
                    viewer
                        .principal()
                        .map_or(Area::Login, |principal| home_area_of(principal.role)),
                )
            }
        };

        Routed { viewer, decision }
    }

    fn signup_role(&self, claims: &SessionClaims) -> Role {
        match claims.metadata_role.as_deref() {
            None => self.default_role,
            Some(raw) => Role::parse(raw).unwrap_or_else(|| {
                warn!(principal = %claims.subject, role = raw, "unknown signup role, using default");
                self.default_role
            }),
        }
    }
}
