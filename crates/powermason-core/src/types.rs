use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ─── Identifiers ──────────────────────────────────────────────

pub type ProjectId = i64;
pub type ScopeId = i64;
pub type BudgetId = i64;
pub type AllocationId = i64;
pub type ExpenseId = i64;
pub type CostId = i64;
pub type TaskCostId = i64;
pub type TaskId = i64;
pub type UpdateId = i64;
pub type ProgressFileId = i64;
pub type StagingId = i64;
pub type UserId = i64;
pub type ClientId = i64;

// ─── Coded enums ──────────────────────────────────────────────

/// Declares an enum persisted and transmitted by a short code, with a
/// human-readable label for messages.
macro_rules! coded_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => ($code:literal, $label:literal) ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $code)] $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn code(&self) -> &'static str {
                match self {
                    $( $name::$variant => $code ),+
                }
            }

            pub fn label(&self) -> &'static str {
                match self {
                    $( $name::$variant => $label ),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $( $code => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.code())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s).ok_or_else(|| format!("unknown {}: {}", stringify!($name), s))
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }
    };
}

coded_enum! {
    /// Where a project came from; also the prefix of its project code.
    ProjectSource {
        GeneralContractor => ("GC", "General Contractor"),
        DirectClient => ("DC", "Direct Client"),
    }
}

coded_enum! {
    ProjectCategory {
        Public => ("PUB", "Public"),
        Private => ("PRI", "Private"),
        Renovation => ("REN", "Renovation"),
        NewBuild => ("NEW", "New Build"),
    }
}

coded_enum! {
    ProjectStatus {
        Planned => ("PL", "Planned"),
        Ongoing => ("OG", "Ongoing"),
        Completed => ("CP", "Completed"),
        Cancelled => ("CN", "Cancelled"),
    }
}

coded_enum! {
    CostCategory {
        Labor => ("LAB", "Labor"),
        Materials => ("MAT", "Materials"),
        Equipment => ("EQP", "Equipment"),
        Subcontractor => ("SUB", "Subcontractor"),
        Other => ("OTH", "Other"),
    }
}

coded_enum! {
    ExpenseType {
        Material => ("material", "Material Purchase"),
        Labor => ("labor", "Labor Payment"),
        Equipment => ("equipment", "Equipment Rental"),
        Service => ("service", "Service/Contractor"),
        Other => ("other", "Other"),
    }
}

coded_enum! {
    TaskStatus {
        Planned => ("PL", "Planned"),
        Ongoing => ("OG", "Ongoing"),
        Completed => ("CP", "Completed"),
    }
}

coded_enum! {
    Role {
        Engineer => ("EG", "Engineer"),
        OperationsManager => ("OM", "Operations Manager"),
        ProjectManager => ("PM", "Project Manager"),
        Viewer => ("VO", "Client Viewer"),
    }
}

coded_enum! {
    /// Review state shared by staged projects and progress updates.
    ReviewStatus {
        Pending => ("PL", "Pending"),
        Approved => ("AP", "Approved"),
        Rejected => ("RJ", "Rejected"),
    }
}

impl ProjectStatus {
    /// Status implied by an overall progress percentage.
    pub fn from_progress(progress: Decimal) -> Self {
        if progress >= Decimal::ONE_HUNDRED {
            Self::Completed
        } else if progress > Decimal::ZERO {
            Self::Ongoing
        } else {
            Self::Planned
        }
    }
}

impl TaskStatus {
    pub fn from_progress(progress: Decimal) -> Self {
        if progress >= Decimal::ONE_HUNDRED {
            Self::Completed
        } else if progress > Decimal::ZERO {
            Self::Ongoing
        } else {
            Self::Planned
        }
    }
}

// ─── Record state ─────────────────────────────────────────────

/// Visibility of a soft-deletable row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordState {
    Active,
    Deleted { at: DateTime<Utc> },
}

impl RecordState {
    /// Rebuild from a nullable `deleted_at` column.
    pub fn from_deleted_at(deleted_at: Option<DateTime<Utc>>) -> Self {
        match deleted_at {
            Some(at) => Self::Deleted { at },
            None => Self::Active,
        }
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Active => None,
            Self::Deleted { at } => Some(*at),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_deleted(&self) -> bool {
        !self.is_active()
    }
}

// ─── People ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub full_name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub company_name: String,
    pub contact_name: Option<String>,
    pub email: String,
    pub client_type: Option<ProjectSource>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub message: String,
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn coded_enum_roundtrips_codes() {
        for source in ProjectSource::ALL {
            assert_eq!(ProjectSource::parse(source.code()), Some(*source));
        }
        assert_eq!("OTH".parse::<CostCategory>(), Ok(CostCategory::Other));
        assert!("XYZ".parse::<CostCategory>().is_err());
    }

    #[test]
    fn coded_enum_serializes_as_code() {
        let json = serde_json::to_string(&ProjectStatus::Cancelled).unwrap();
        assert_eq!(json, "\"CN\"");
        let role: Role = serde_json::from_str("\"PM\"").unwrap();
        assert_eq!(role, Role::ProjectManager);
    }

    #[test]
    fn labels_are_human_readable() {
        assert_eq!(ProjectSource::GeneralContractor.label(), "General Contractor");
        assert_eq!(ExpenseType::Service.label(), "Service/Contractor");
    }

    #[test]
    fn project_status_follows_progress() {
        assert_eq!(ProjectStatus::from_progress(Decimal::ZERO), ProjectStatus::Planned);
        assert_eq!(ProjectStatus::from_progress(Decimal::new(1, 2)), ProjectStatus::Ongoing);
        assert_eq!(
            ProjectStatus::from_progress(Decimal::ONE_HUNDRED),
            ProjectStatus::Completed
        );
    }

    #[test]
    fn task_status_follows_progress() {
        assert_eq!(TaskStatus::from_progress(Decimal::new(995, 1)), TaskStatus::Ongoing);
        assert_eq!(TaskStatus::from_progress(Decimal::new(100, 0)), TaskStatus::Completed);
    }

    #[test]
    fn record_state_from_nullable_column() {
        assert!(RecordState::from_deleted_at(None).is_active());
        let at = Utc::now();
        let state = RecordState::from_deleted_at(Some(at));
        assert!(state.is_deleted());
        assert_eq!(state.deleted_at(), Some(at));
    }
}
