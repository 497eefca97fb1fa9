//! Domain types for the benefits application
//!
//! Entities are keyed by an externally-issued string user id (the identity
//! provider subject). Singleton-per-user records carry a companion patch
//! struct whose `merge` implements coalesce-on-write: a new value overwrites
//! the stored one only when present, so a tool call that only knows the
//! user's name never erases a previously-saved address.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Closed enumerations
// ============================================================================

/// Speaker role in the visible conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Military service branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceBranch {
    Army,
    Navy,
    AirForce,
    Marines,
    CoastGuard,
    SpaceForce,
    NationalGuard,
    Reserves,
}

impl ServiceBranch {
    /// Enumerated value domain as it appears in tool schemas
    pub const VALUES: &'static [&'static str] = &[
        "army",
        "navy",
        "air_force",
        "marines",
        "coast_guard",
        "space_force",
        "national_guard",
        "reserves",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceBranch::Army => "army",
            ServiceBranch::Navy => "navy",
            ServiceBranch::AirForce => "air_force",
            ServiceBranch::Marines => "marines",
            ServiceBranch::CoastGuard => "coast_guard",
            ServiceBranch::SpaceForce => "space_force",
            ServiceBranch::NationalGuard => "national_guard",
            ServiceBranch::Reserves => "reserves",
        }
    }
}

impl std::str::FromStr for ServiceBranch {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "army" => Ok(ServiceBranch::Army),
            "navy" => Ok(ServiceBranch::Navy),
            "air_force" => Ok(ServiceBranch::AirForce),
            "marines" => Ok(ServiceBranch::Marines),
            "coast_guard" => Ok(ServiceBranch::CoastGuard),
            "space_force" => Ok(ServiceBranch::SpaceForce),
            "national_guard" => Ok(ServiceBranch::NationalGuard),
            "reserves" => Ok(ServiceBranch::Reserves),
            other => Err(format!("unknown service branch: {other}")),
        }
    }
}

/// Combat-related classification attached to a disability claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatCode {
    None,
    ArmedConflict,
    PurpleHeart,
    ExtraHazardousService,
    SimulatedWar,
    InstrumentalityOfWar,
    AgentOrangeExposure,
}

impl CombatCode {
    pub const VALUES: &'static [&'static str] = &[
        "none",
        "armed_conflict",
        "purple_heart",
        "extra_hazardous_service",
        "simulated_war",
        "instrumentality_of_war",
        "agent_orange_exposure",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CombatCode::None => "none",
            CombatCode::ArmedConflict => "armed_conflict",
            CombatCode::PurpleHeart => "purple_heart",
            CombatCode::ExtraHazardousService => "extra_hazardous_service",
            CombatCode::SimulatedWar => "simulated_war",
            CombatCode::InstrumentalityOfWar => "instrumentality_of_war",
            CombatCode::AgentOrangeExposure => "agent_orange_exposure",
        }
    }
}

impl std::str::FromStr for CombatCode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(CombatCode::None),
            "armed_conflict" => Ok(CombatCode::ArmedConflict),
            "purple_heart" => Ok(CombatCode::PurpleHeart),
            "extra_hazardous_service" => Ok(CombatCode::ExtraHazardousService),
            "simulated_war" => Ok(CombatCode::SimulatedWar),
            "instrumentality_of_war" => Ok(CombatCode::InstrumentalityOfWar),
            "agent_orange_exposure" => Ok(CombatCode::AgentOrangeExposure),
            other => Err(format!("unknown combat code: {other}")),
        }
    }
}

/// Retirement type recorded with military service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetirementType {
    None,
    Longevity,
    Medical,
    TemporaryDisability,
}

impl RetirementType {
    pub const VALUES: &'static [&'static str] =
        &["none", "longevity", "medical", "temporary_disability"];

    pub fn as_str(&self) -> &'static str {
        match self {
            RetirementType::None => "none",
            RetirementType::Longevity => "longevity",
            RetirementType::Medical => "medical",
            RetirementType::TemporaryDisability => "temporary_disability",
        }
    }
}

impl std::str::FromStr for RetirementType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(RetirementType::None),
            "longevity" => Ok(RetirementType::Longevity),
            "medical" => Ok(RetirementType::Medical),
            "temporary_disability" => Ok(RetirementType::TemporaryDisability),
            other => Err(format!("unknown retirement type: {other}")),
        }
    }
}

/// Application sections tracked by the progress state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStep {
    PersonalInfo,
    MilitaryService,
    VaDisability,
    DisabilityClaims,
    Documents,
    Review,
}

impl ApplicationStep {
    /// Every step, in display order
    pub const ALL: &'static [ApplicationStep] = &[
        ApplicationStep::PersonalInfo,
        ApplicationStep::MilitaryService,
        ApplicationStep::VaDisability,
        ApplicationStep::DisabilityClaims,
        ApplicationStep::Documents,
        ApplicationStep::Review,
    ];

    pub const VALUES: &'static [&'static str] = &[
        "personal_info",
        "military_service",
        "va_disability",
        "disability_claims",
        "documents",
        "review",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStep::PersonalInfo => "personal_info",
            ApplicationStep::MilitaryService => "military_service",
            ApplicationStep::VaDisability => "va_disability",
            ApplicationStep::DisabilityClaims => "disability_claims",
            ApplicationStep::Documents => "documents",
            ApplicationStep::Review => "review",
        }
    }
}

impl std::str::FromStr for ApplicationStep {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "personal_info" => Ok(ApplicationStep::PersonalInfo),
            "military_service" => Ok(ApplicationStep::MilitaryService),
            "va_disability" => Ok(ApplicationStep::VaDisability),
            "disability_claims" => Ok(ApplicationStep::DisabilityClaims),
            "documents" => Ok(ApplicationStep::Documents),
            "review" => Ok(ApplicationStep::Review),
            other => Err(format!("unknown application step: {other}")),
        }
    }
}

/// Per-step completion state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    NotStarted,
    InProgress,
    Completed,
    RequiresReview,
}

impl StepState {
    pub const VALUES: &'static [&'static str] =
        &["not_started", "in_progress", "completed", "requires_review"];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::NotStarted => "not_started",
            StepState::InProgress => "in_progress",
            StepState::Completed => "completed",
            StepState::RequiresReview => "requires_review",
        }
    }
}

impl std::str::FromStr for StepState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(StepState::NotStarted),
            "in_progress" => Ok(StepState::InProgress),
            "completed" => Ok(StepState::Completed),
            "requires_review" => Ok(StepState::RequiresReview),
            other => Err(format!("unknown step status: {other}")),
        }
    }
}

// ============================================================================
// User
// ============================================================================

/// Identity anchor, created on first sign-in and never hard-deleted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Externally issued stable id (identity provider subject)
    pub id: String,
    pub email: Option<String>,
    pub is_admin: bool,
    pub veteran_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPatch {
    pub email: Option<String>,
    pub is_admin: Option<bool>,
    pub veteran_verified: Option<bool>,
}

impl UserProfile {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            email: None,
            is_admin: false,
            veteran_verified: false,
            verified_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn merge(&mut self, patch: UserPatch) {
        if patch.email.is_some() {
            self.email = patch.email;
        }
        if let Some(admin) = patch.is_admin {
            self.is_admin = admin;
        }
        if let Some(verified) = patch.veteran_verified {
            // Verification timestamp tracks the transition, not every save
            if verified && !self.veteran_verified {
                self.verified_at = Some(Utc::now());
            }
            if !verified {
                self.verified_at = None;
            }
            self.veteran_verified = verified;
        }
    }
}

// ============================================================================
// Singleton-per-user records
// ============================================================================

/// Applicant identity and contact details, at most one row per user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonalInfo {
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub ssn_last_four: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

/// Partial update; every field optional
pub type PersonalInfoPatch = PersonalInfo;

impl PersonalInfo {
    /// Coalesce-on-write: new value wins only when present
    pub fn merge(&mut self, patch: PersonalInfoPatch) {
        merge_opt(&mut self.first_name, patch.first_name);
        merge_opt(&mut self.middle_name, patch.middle_name);
        merge_opt(&mut self.last_name, patch.last_name);
        merge_opt(&mut self.date_of_birth, patch.date_of_birth);
        merge_opt(&mut self.ssn_last_four, patch.ssn_last_four);
        merge_opt(&mut self.phone, patch.phone);
        merge_opt(&mut self.email, patch.email);
        merge_opt(&mut self.street_address, patch.street_address);
        merge_opt(&mut self.city, patch.city);
        merge_opt(&mut self.state, patch.state);
        merge_opt(&mut self.postal_code, patch.postal_code);
    }
}

/// Service history, at most one row per user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MilitaryService {
    pub branch: Option<ServiceBranch>,
    pub service_start_date: Option<NaiveDate>,
    pub service_end_date: Option<NaiveDate>,
    pub discharge_type: Option<String>,
    pub rank_at_separation: Option<String>,
    pub retirement_type: Option<RetirementType>,
    pub currently_serving: Option<bool>,
}

pub type MilitaryServicePatch = MilitaryService;

impl MilitaryService {
    pub fn merge(&mut self, patch: MilitaryServicePatch) {
        merge_opt(&mut self.branch, patch.branch);
        merge_opt(&mut self.service_start_date, patch.service_start_date);
        merge_opt(&mut self.service_end_date, patch.service_end_date);
        merge_opt(&mut self.discharge_type, patch.discharge_type);
        merge_opt(&mut self.rank_at_separation, patch.rank_at_separation);
        merge_opt(&mut self.retirement_type, patch.retirement_type);
        merge_opt(&mut self.currently_serving, patch.currently_serving);
    }
}

/// Existing VA rating details, at most one row per user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VaDisabilityInfo {
    pub has_existing_rating: Option<bool>,
    /// Combined rating percentage, 0-100
    pub combined_rating: Option<i16>,
    pub monthly_compensation_cents: Option<i64>,
    pub effective_date: Option<NaiveDate>,
}

pub type VaDisabilityInfoPatch = VaDisabilityInfo;

impl VaDisabilityInfo {
    pub fn merge(&mut self, patch: VaDisabilityInfoPatch) {
        merge_opt(&mut self.has_existing_rating, patch.has_existing_rating);
        merge_opt(&mut self.combined_rating, patch.combined_rating);
        merge_opt(
            &mut self.monthly_compensation_cents,
            patch.monthly_compensation_cents,
        );
        merge_opt(&mut self.effective_date, patch.effective_date);
    }
}

fn merge_opt<T>(current: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *current = incoming;
    }
}

// ============================================================================
// Disability claims (repeated per user)
// ============================================================================

/// A single claimed condition; zero or many per user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisabilityClaim {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub diagnostic_code: Option<String>,
    pub description: Option<String>,
    /// Rating percentage the applicant is claiming, 0-100
    pub claimed_rating: Option<i16>,
    pub combat_related: Option<CombatCode>,
    pub onset_date: Option<NaiveDate>,
    pub treatment_facility: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields accepted when creating a claim
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimInput {
    pub title: String,
    #[serde(default)]
    pub diagnostic_code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub claimed_rating: Option<i16>,
    #[serde(default)]
    pub combat_related: Option<CombatCode>,
    #[serde(default)]
    pub onset_date: Option<NaiveDate>,
    #[serde(default)]
    pub treatment_facility: Option<String>,
}

/// Partial update applied to an existing claim by id
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimPatch {
    pub title: Option<String>,
    pub diagnostic_code: Option<String>,
    pub description: Option<String>,
    pub claimed_rating: Option<i16>,
    pub combat_related: Option<CombatCode>,
    pub onset_date: Option<NaiveDate>,
    pub treatment_facility: Option<String>,
}

impl DisabilityClaim {
    pub fn from_input(user_id: &str, input: ClaimInput) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            title: input.title,
            diagnostic_code: input.diagnostic_code,
            description: input.description,
            claimed_rating: input.claimed_rating,
            combat_related: input.combat_related,
            onset_date: input.onset_date,
            treatment_facility: input.treatment_facility,
            created_at: Utc::now(),
        }
    }

    pub fn merge(&mut self, patch: ClaimPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        merge_opt(&mut self.diagnostic_code, patch.diagnostic_code);
        merge_opt(&mut self.description, patch.description);
        merge_opt(&mut self.claimed_rating, patch.claimed_rating);
        merge_opt(&mut self.combat_related, patch.combat_related);
        merge_opt(&mut self.onset_date, patch.onset_date);
        merge_opt(&mut self.treatment_facility, patch.treatment_facility);
    }
}

/// Deduplication key for claims collected from multiple documents:
/// diagnostic code, else title, else description, first non-empty wins.
pub fn claim_key(
    diagnostic_code: Option<&str>,
    title: Option<&str>,
    description: Option<&str>,
) -> Option<String> {
    [diagnostic_code, title, description]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
}

// ============================================================================
// Documents, conversation, steps, payments
// ============================================================================

/// Metadata for an uploaded binary; the storage path is opaque
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub user_id: String,
    pub document_type: String,
    pub filename: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentInput {
    pub document_type: String,
    pub filename: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub storage_path: String,
}

/// One visible chat turn; ordering is the store-assigned creation order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub role: Role,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// One (user, step) status row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepStatusRow {
    pub step: ApplicationStep,
    pub status: StepState,
    /// Set only when status is completed
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only payment ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub user_id: String,
    /// Payment provider reference id
    pub provider_ref: String,
    pub amount_cents: i64,
    pub status: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInput {
    pub provider_ref: String,
    pub amount_cents: i64,
    pub status: String,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce_keeps_existing_fields() {
        let mut info = PersonalInfo {
            city: Some("Austin".into()),
            ..Default::default()
        };

        info.merge(PersonalInfoPatch {
            first_name: Some("Jane".into()),
            ..Default::default()
        });

        assert_eq!(info.first_name.as_deref(), Some("Jane"));
        assert_eq!(info.city.as_deref(), Some("Austin"));
    }

    #[test]
    fn coalesce_overwrites_when_present() {
        let mut info = PersonalInfo {
            city: Some("Austin".into()),
            ..Default::default()
        };

        info.merge(PersonalInfoPatch {
            city: Some("Dallas".into()),
            ..Default::default()
        });

        assert_eq!(info.city.as_deref(), Some("Dallas"));
    }

    #[test]
    fn claim_key_prefers_diagnostic_code() {
        let key = claim_key(Some("6260"), Some("Tinnitus"), None);
        assert_eq!(key.as_deref(), Some("6260"));

        let key = claim_key(None, Some("Tinnitus"), Some("ringing in ears"));
        assert_eq!(key.as_deref(), Some("tinnitus"));

        let key = claim_key(Some("  "), None, Some("Ringing in ears"));
        assert_eq!(key.as_deref(), Some("ringing in ears"));

        assert_eq!(claim_key(None, None, None), None);
    }

    #[test]
    fn verification_timestamp_tracks_transition() {
        let mut user = UserProfile::new("idme|123");
        user.merge(UserPatch {
            veteran_verified: Some(true),
            ..Default::default()
        });
        assert!(user.veteran_verified);
        assert!(user.verified_at.is_some());

        user.merge(UserPatch {
            veteran_verified: Some(false),
            ..Default::default()
        });
        assert!(!user.veteran_verified);
        assert!(user.verified_at.is_none());
    }

    #[test]
    fn enum_strings_match_serde_representation() {
        for (value, expected) in [
            (ServiceBranch::AirForce, "\"air_force\""),
            (ServiceBranch::CoastGuard, "\"coast_guard\""),
        ] {
            assert_eq!(serde_json::to_string(&value).unwrap(), expected);
            assert_eq!(format!("\"{}\"", value.as_str()), expected);
        }

        for step in ApplicationStep::ALL {
            let json = serde_json::to_string(step).unwrap();
            assert_eq!(json, format!("\"{}\"", step.as_str()));
            assert_eq!(step.as_str().parse::<ApplicationStep>().unwrap(), *step);
        }

        assert_eq!(
            "instrumentality_of_war".parse::<CombatCode>().unwrap(),
            CombatCode::InstrumentalityOfWar
        );
        assert_eq!(
            serde_json::to_string(&CombatCode::InstrumentalityOfWar).unwrap(),
            "\"instrumentality_of_war\""
        );
    }

    #[test]
    fn military_service_merge_is_field_wise() {
        let mut svc = MilitaryService {
            branch: Some(ServiceBranch::Navy),
            ..Default::default()
        };
        svc.merge(MilitaryServicePatch {
            rank_at_separation: Some("E-5".into()),
            ..Default::default()
        });
        assert_eq!(svc.branch, Some(ServiceBranch::Navy));
        assert_eq!(svc.rank_at_separation.as_deref(), Some("E-5"));
    }
}
