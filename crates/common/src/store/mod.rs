//! Persistence layer for ClaimForge
//!
//! Provides:
//! - The `ClaimStore` trait, the single seam between the orchestration
//!   engine, the data endpoint, and the relational store
//! - `PgStore`, the SeaORM-backed Postgres implementation
//! - `MemStore`, an in-memory implementation for tests and local dev
//!
//! Semantics shared by every implementation:
//! - `get_*` returns `Ok(None)` when no row exists; absence is not failure
//! - singleton upserts apply coalesce-on-write and return the post-merge row
//! - deletes are idempotent and owner-scoped; a mismatched (id, owner) pair
//!   affects zero rows
//! - clearing conversation or step rows never touches collected data

mod mem;
mod pg;

pub use mem::MemStore;
pub use pg::{DbPool, PgStore};

use crate::errors::Result;
use crate::types::*;
use async_trait::async_trait;
use uuid::Uuid;

/// Single entry point for all data access, keyed by user id
#[async_trait]
pub trait ClaimStore: Send + Sync {
    // ------------------------------------------------------------------
    // User
    // ------------------------------------------------------------------

    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>>;

    /// Creates the row lazily on first touch, then merges the patch
    async fn upsert_user(&self, user_id: &str, patch: UserPatch) -> Result<UserProfile>;

    // ------------------------------------------------------------------
    // Singleton-per-user records
    // ------------------------------------------------------------------

    async fn get_personal_info(&self, user_id: &str) -> Result<Option<PersonalInfo>>;
    async fn upsert_personal_info(
        &self,
        user_id: &str,
        patch: PersonalInfoPatch,
    ) -> Result<PersonalInfo>;

    async fn get_military_service(&self, user_id: &str) -> Result<Option<MilitaryService>>;
    async fn upsert_military_service(
        &self,
        user_id: &str,
        patch: MilitaryServicePatch,
    ) -> Result<MilitaryService>;

    async fn get_va_disability_info(&self, user_id: &str) -> Result<Option<VaDisabilityInfo>>;
    async fn upsert_va_disability_info(
        &self,
        user_id: &str,
        patch: VaDisabilityInfoPatch,
    ) -> Result<VaDisabilityInfo>;

    // ------------------------------------------------------------------
    // Disability claims
    // ------------------------------------------------------------------

    async fn list_claims(&self, user_id: &str) -> Result<Vec<DisabilityClaim>>;
    async fn create_claim(&self, user_id: &str, input: ClaimInput) -> Result<DisabilityClaim>;

    /// Applies the patch only when the claim belongs to `user_id`;
    /// returns `Ok(None)` otherwise
    async fn update_claim(
        &self,
        user_id: &str,
        claim_id: Uuid,
        patch: ClaimPatch,
    ) -> Result<Option<DisabilityClaim>>;

    /// Idempotent; a mismatched owner deletes nothing
    async fn delete_claim(&self, user_id: &str, claim_id: Uuid) -> Result<()>;

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    async fn list_documents(&self, user_id: &str) -> Result<Vec<DocumentRecord>>;
    async fn create_document(&self, user_id: &str, input: DocumentInput)
        -> Result<DocumentRecord>;
    async fn delete_document(&self, user_id: &str, document_id: Uuid) -> Result<()>;

    // ------------------------------------------------------------------
    // Conversation
    // ------------------------------------------------------------------

    /// Turns in store-assigned creation order, ascending
    async fn list_turns(&self, user_id: &str) -> Result<Vec<ConversationTurn>>;
    async fn append_turn(&self, user_id: &str, role: Role, text: &str)
        -> Result<ConversationTurn>;
    async fn clear_turns(&self, user_id: &str) -> Result<()>;

    // ------------------------------------------------------------------
    // Step statuses
    // ------------------------------------------------------------------

    async fn list_steps(&self, user_id: &str) -> Result<Vec<StepStatusRow>>;

    /// Upserts by the unique (user, step) pair; `completed_at` is set only
    /// when the status lands on completed and cleared otherwise
    async fn set_step(
        &self,
        user_id: &str,
        step: ApplicationStep,
        status: StepState,
    ) -> Result<StepStatusRow>;

    async fn clear_steps(&self, user_id: &str) -> Result<()>;

    // ------------------------------------------------------------------
    // Payments
    // ------------------------------------------------------------------

    async fn list_payments(&self, user_id: &str) -> Result<Vec<PaymentRecord>>;
    async fn create_payment(&self, user_id: &str, input: PaymentInput) -> Result<PaymentRecord>;

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    async fn ping(&self) -> Result<()>;
}
