//! Database models
//!
//! Row structs map 1:1 onto tables created in [`crate::db::init`]. Status
//! columns are TEXT in the store and typed enums here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

use crate::roles::UserRole;

/// Declares a TEXT-backed status enum with string conversions
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(crate::Error::InvalidInput(format!(
                        "Unknown {}: {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = crate::Error;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

text_enum!(
    /// Lifecycle of an inspection session
    SessionStatus {
        Active => "active",
        Completed => "completed",
        Cancelled => "cancelled",
        DuplicateDetected => "duplicate_detected",
    }
);

text_enum!(
    /// Inspector's verdict for the device
    OverallStatus {
        Pass => "pass",
        Fail => "fail",
        NeedsAction => "needs_action",
    }
);

text_enum!(
    ApprovalStatus {
        Submitted => "submitted",
        Approved => "approved",
        Rejected => "rejected",
    }
);

text_enum!(
    ScheduleStatus {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
    }
);

text_enum!(
    /// Provenance of a target-device mapping
    MatchedBy {
        Auto => "auto",
        Manual => "manual",
        Verified => "verified",
    }
);

text_enum!(
    OrgType {
        Ministry => "ministry",
        EmergencyCenter => "emergency_center",
        Province => "province",
        City => "city",
        HealthCenter => "health_center",
    }
);

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Setting {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: i64,
    pub name: String,
    #[sqlx(try_from = "String")]
    pub org_type: OrgType,
    pub region_code: Option<String>,
    pub city_code: Option<String>,
    pub parent_id: Option<i64>,
}

/// Registered user; secrets never leave the server
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub full_name: String,
    #[sqlx(try_from = "String")]
    pub role: UserRole,
    pub organization_id: Option<i64>,
    #[serde(skip)]
    pub phone_encrypted: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of `aed_data`
///
/// `equipment_serial` is not unique across rows; see the duplicate report.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: i64,
    pub equipment_serial: String,
    pub management_number: String,
    pub installation_institution: String,
    #[serde(skip_serializing)]
    pub institution_normalized: String,
    pub installation_address: Option<String>,
    pub region_code: String,
    pub city_code: Option<String>,
    pub battery_expiry_date: Option<String>,
    pub patch_expiry_date: Option<String>,
    pub external_display: String,
    pub last_inspection_date: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InspectionSession {
    pub id: String,
    pub equipment_serial: String,
    pub inspector_id: String,
    #[sqlx(try_from = "String")]
    pub status: SessionStatus,
    pub current_step: i64,
    pub step_data: Json<serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Inspection {
    pub id: String,
    pub session_id: Option<String>,
    pub equipment_serial: String,
    pub inspector_id: String,
    pub inspected_at: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub overall_status: OverallStatus,
    pub notes: Option<String>,
    pub photo_paths: Json<Vec<String>>,
    #[sqlx(try_from = "String")]
    pub approval_status: ApprovalStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct InspectionSchedule {
    pub id: String,
    pub equipment_serial: String,
    pub assigned_to: String,
    pub assigned_by: String,
    pub scheduled_for: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub status: ScheduleStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Mandatory-installation institution (`target_list_2025`)
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceTarget {
    pub target_key: String,
    pub institution_name: String,
    #[serde(skip_serializing)]
    pub normalized_name: String,
    pub region_code: String,
    pub city_code: Option<String>,
    pub division: Option<String>,
    #[serde(rename = "confirmed2024")]
    pub confirmed_2024: bool,
    pub confirmed_by: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TargetDeviceMapping {
    pub target_institution_id: String,
    pub equipment_serial: String,
    #[sqlx(try_from = "String")]
    pub matched_by: MatchedBy,
    pub matched_at: DateTime<Utc>,
    pub matched_user: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: i64,
    pub actor_id: Option<String>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub detail: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub endpoint: String,
    pub user_id: String,
    pub p256dh: String,
    pub auth: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub link: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_enum_roundtrip() {
        assert_eq!("duplicate_detected".parse::<SessionStatus>().unwrap(), SessionStatus::DuplicateDetected);
        assert_eq!(ScheduleStatus::InProgress.as_str(), "in_progress");
        assert_eq!(MatchedBy::Verified.to_string(), "verified");
        assert!("archived".parse::<ApprovalStatus>().is_err());
    }

    #[test]
    fn test_text_enum_serde_matches_storage() {
        let json = serde_json::to_string(&OverallStatus::NeedsAction).unwrap();
        assert_eq!(json, format!("\"{}\"", OverallStatus::NeedsAction.as_str()));
    }
}
