use crate::model::{Principal, Role};
use std::fmt;

///
/// Area
///
/// A routable section of the application. Each area is either public or
/// reserved for a set of roles.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Area {
    Login,
    AdminDashboard,
    TrainerDashboard,
    PatientDashboard,
    Courses,
    Patients,
    Prescriptions,
    Chat,
    Calendar,
    Profile,
    Unavailable,
}

impl Area {
    pub const ALL: [Self; 11] = [
        Self::Login,
        Self::AdminDashboard,
        Self::TrainerDashboard,
        Self::PatientDashboard,
        Self::Courses,
        Self::Patients,
        Self::Prescriptions,
        Self::Chat,
        Self::Calendar,
        Self::Profile,
        Self::Unavailable,
    ];

    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Login => "/auth",
            Self::AdminDashboard => "/admin",
            Self::TrainerDashboard => "/trainer",
            Self::PatientDashboard => "/patient",
            Self::Courses => "/courses",
            Self::Patients => "/patients",
            Self::Prescriptions => "/prescriptions",
            Self::Chat => "/chat",
            Self::Calendar => "/calendar",
            Self::Profile => "/profile",
            Self::Unavailable => "/error",
        }
    }

    /// Map a request path onto its area by first segment.
    /// Query strings and fragments are ignored; unknown sections yield `None`.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let first = path.trim_start_matches('/').split('/').next()?;
        let first = format!("/{first}");

        Self::ALL.into_iter().find(|area| area.path() == first)
    }

    /// Reachable without a session.
    #[must_use]
    pub const fn is_public(self) -> bool {
        matches!(self, Self::Login | Self::Unavailable)
    }

    /// Whether `role` may open this area. Public areas admit every role.
    #[must_use]
    pub const fn permits(self, role: Role) -> bool {
        match self {
            Self::Login | Self::Unavailable => true,
            Self::AdminDashboard => matches!(role, Role::Admin),
            Self::TrainerDashboard => matches!(role, Role::Trainer),
            Self::PatientDashboard => matches!(role, Role::Patient),
            Self::Courses | Self::Patients | Self::Prescriptions => role.is_staff(),
            Self::Chat | Self::Calendar | Self::Profile => true,
        }
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Dashboard an authenticated principal lands on.
#[must_use]
pub const fn home_area_of(role: Role) -> Area {
    match role {
        Role::Admin => Area::AdminDashboard,
        Role::Trainer => Area::TrainerDashboard,
        Role::Patient => Area::PatientDashboard,
    }
}

///
/// Viewer
///
/// Who is making the request.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Viewer {
    Anonymous,
    Principal(Principal),
}

impl Viewer {
    #[must_use]
    pub const fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Anonymous => None,
            Self::Principal(principal) => Some(principal),
        }
    }
}

///
/// Decision
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    Allow,
    RedirectTo(Area),
}

/// Route decision for `viewer` requesting `area`.
#[must_use]
pub const fn authorize(viewer: &Viewer, area: Area) -> Decision {
    match viewer {
        Viewer::Anonymous => {
            if area.is_public() {
                Decision::Allow
            } else {
                Decision::RedirectTo(Area::Login)
            }
        }
        Viewer::Principal(principal) => match area {
            Area::Login => Decision::RedirectTo(home_area_of(principal.role)),
            _ if area.permits(principal.role) => Decision::Allow,
            _ => Decision::RedirectTo(home_area_of(principal.role)),
        },
    }
}

///
/// TESTS
///
