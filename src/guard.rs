use crate::error::{PortalError, PortalResult};
use crate::models::{Identity, Role};
use crate::session::{SessionPhase, SessionSnapshot};

/// One guard for every role-specific area instead of a copy per role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGuard {
    pub required_role: Role,
    /// Where unauthenticated visitors are sent. Defaults to the role's login page.
    pub redirect_target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// A session operation is still in flight; decide later.
    Loading,
    Allow(Identity),
    Redirect(String),
}

impl RoleGuard {
    pub fn new(required_role: Role) -> Self {
        Self {
            required_role,
            redirect_target: format!("/login/{required_role}"),
        }
    }

    pub fn check(&self, snapshot: &SessionSnapshot) -> GuardDecision {
        match (snapshot.phase(), &snapshot.identity) {
            (SessionPhase::Authenticating, _) => GuardDecision::Loading,
            (_, None) => GuardDecision::Redirect(self.redirect_target.clone()),
            (_, Some(identity)) if identity.role != self.required_role => {
                GuardDecision::Redirect(dashboard_path(identity.role))
            }
            (_, Some(identity)) => GuardDecision::Allow(identity.clone()),
        }
    }

    /// `check` for callers that cannot wait or navigate: anything but `Allow`
    /// becomes the error explaining the refusal.
    pub fn require(&self, snapshot: &SessionSnapshot) -> PortalResult<Identity> {
        match (self.check(snapshot), &snapshot.identity) {
            (GuardDecision::Allow(identity), _) => Ok(identity),
            (_, Some(current)) => Err(PortalError::Forbidden {
                required: self.required_role,
                actual: current.role,
            }),
            (_, None) => Err(PortalError::Unauthenticated),
        }
    }
}

pub fn dashboard_path(role: Role) -> String {
    format!("/{role}/dashboard")
}
