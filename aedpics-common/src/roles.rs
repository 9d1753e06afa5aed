//! User roles and role-based permission helpers
//!
//! Permission helpers take `Option<UserRole>` so that an unauthenticated
//! caller (no role) is always denied.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Master,
    EmergencyCenterAdmin,
    RegionalEmergencyCenterAdmin,
    MinistryAdmin,
    RegionalAdmin,
    LocalAdmin,
    TemporaryInspector,
    PendingApproval,
    EmailVerified,
    Rejected,
}

impl UserRole {
    pub const ALL: [UserRole; 10] = [
        UserRole::Master,
        UserRole::EmergencyCenterAdmin,
        UserRole::RegionalEmergencyCenterAdmin,
        UserRole::MinistryAdmin,
        UserRole::RegionalAdmin,
        UserRole::LocalAdmin,
        UserRole::TemporaryInspector,
        UserRole::PendingApproval,
        UserRole::EmailVerified,
        UserRole::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Master => "master",
            UserRole::EmergencyCenterAdmin => "emergency_center_admin",
            UserRole::RegionalEmergencyCenterAdmin => "regional_emergency_center_admin",
            UserRole::MinistryAdmin => "ministry_admin",
            UserRole::RegionalAdmin => "regional_admin",
            UserRole::LocalAdmin => "local_admin",
            UserRole::TemporaryInspector => "temporary_inspector",
            UserRole::PendingApproval => "pending_approval",
            UserRole::EmailVerified => "email_verified",
            UserRole::Rejected => "rejected",
        }
    }

    /// Admin tiers: every role that manages devices for an organization
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            UserRole::Master
                | UserRole::EmergencyCenterAdmin
                | UserRole::RegionalEmergencyCenterAdmin
                | UserRole::MinistryAdmin
                | UserRole::RegionalAdmin
                | UserRole::LocalAdmin
        )
    }

    /// Roles that have not (yet) been granted access to registry data
    pub fn is_unapproved(&self) -> bool {
        matches!(
            self,
            UserRole::PendingApproval | UserRole::EmailVerified | UserRole::Rejected
        )
    }

    /// Geographic breadth of data this role may see
    pub fn scope_level(&self) -> ScopeLevel {
        match self {
            UserRole::Master | UserRole::EmergencyCenterAdmin | UserRole::MinistryAdmin => {
                ScopeLevel::National
            }
            UserRole::RegionalEmergencyCenterAdmin | UserRole::RegionalAdmin => {
                ScopeLevel::Regional
            }
            UserRole::LocalAdmin | UserRole::TemporaryInspector => ScopeLevel::Local,
            UserRole::PendingApproval | UserRole::EmailVerified | UserRole::Rejected => {
                ScopeLevel::None
            }
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UserRole::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown role: {}", s)))
    }
}

impl TryFrom<String> for UserRole {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeLevel {
    National,
    Regional,
    Local,
    None,
}

/// Immediate self-assigned inspection ("quick inspect")
pub fn can_quick_inspect(role: Option<UserRole>) -> bool {
    role.map_or(false, |r| r.is_admin())
}

/// Create inspection schedules for other users
pub fn can_schedule(role: Option<UserRole>) -> bool {
    role.map_or(false, |r| r.is_admin())
}

/// Run an inspection session on a device
pub fn can_inspect(role: Option<UserRole>) -> bool {
    role.map_or(false, |r| r.is_admin() || r == UserRole::TemporaryInspector)
}

pub fn can_approve_inspections(role: Option<UserRole>) -> bool {
    matches!(
        role,
        Some(
            UserRole::Master
                | UserRole::EmergencyCenterAdmin
                | UserRole::RegionalEmergencyCenterAdmin
                | UserRole::RegionalAdmin
                | UserRole::LocalAdmin
        )
    )
}

/// Approve or reject account requests
pub fn can_manage_users(role: Option<UserRole>) -> bool {
    matches!(
        role,
        Some(
            UserRole::Master
                | UserRole::EmergencyCenterAdmin
                | UserRole::RegionalEmergencyCenterAdmin
        )
    )
}

pub fn can_confirm_targets(role: Option<UserRole>) -> bool {
    can_approve_inspections(role)
}
