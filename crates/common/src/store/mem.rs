//! In-memory store for tests and local development
//!
//! Mirrors `PgStore` semantics exactly: coalesce-on-write upserts,
//! owner-scoped idempotent deletes, and insertion-ordered conversation turns.

use super::ClaimStore;
use crate::errors::Result;
use crate::types::*;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    users: HashMap<String, UserProfile>,
    personal_info: HashMap<String, PersonalInfo>,
    military_service: HashMap<String, MilitaryService>,
    va_disability: HashMap<String, VaDisabilityInfo>,
    claims: HashMap<String, Vec<DisabilityClaim>>,
    documents: HashMap<String, Vec<DocumentRecord>>,
    turns: HashMap<String, Vec<ConversationTurn>>,
    steps: HashMap<String, Vec<StepStatusRow>>,
    payments: HashMap<String, Vec<PaymentRecord>>,
}

/// In-memory `ClaimStore` implementation
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClaimStore for MemStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.inner.read().await.users.get(user_id).cloned())
    }

    async fn upsert_user(&self, user_id: &str, patch: UserPatch) -> Result<UserProfile> {
        let mut inner = self.inner.write().await;
        let user = inner
            .users
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile::new(user_id));
        user.merge(patch);
        Ok(user.clone())
    }

    async fn get_personal_info(&self, user_id: &str) -> Result<Option<PersonalInfo>> {
        Ok(self.inner.read().await.personal_info.get(user_id).cloned())
    }

    async fn upsert_personal_info(
        &self,
        user_id: &str,
        patch: PersonalInfoPatch,
    ) -> Result<PersonalInfo> {
        let mut inner = self.inner.write().await;
        let row = inner.personal_info.entry(user_id.to_string()).or_default();
        row.merge(patch);
        Ok(row.clone())
    }

    async fn get_military_service(&self, user_id: &str) -> Result<Option<MilitaryService>> {
        Ok(self
            .inner
            .read()
            .await
            .military_service
            .get(user_id)
            .cloned())
    }

    async fn upsert_military_service(
        &self,
        user_id: &str,
        patch: MilitaryServicePatch,
    ) -> Result<MilitaryService> {
        let mut inner = self.inner.write().await;
        let row = inner
            .military_service
            .entry(user_id.to_string())
            .or_default();
        row.merge(patch);
        Ok(row.clone())
    }

    async fn get_va_disability_info(&self, user_id: &str) -> Result<Option<VaDisabilityInfo>> {
        Ok(self.inner.read().await.va_disability.get(user_id).cloned())
    }

    async fn upsert_va_disability_info(
        &self,
        user_id: &str,
        patch: VaDisabilityInfoPatch,
    ) -> Result<VaDisabilityInfo> {
        let mut inner = self.inner.write().await;
        let row = inner.va_disability.entry(user_id.to_string()).or_default();
        row.merge(patch);
        Ok(row.clone())
    }

    async fn list_claims(&self, user_id: &str) -> Result<Vec<DisabilityClaim>> {
        Ok(self
            .inner
            .read()
            .await
            .claims
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_claim(&self, user_id: &str, input: ClaimInput) -> Result<DisabilityClaim> {
        let claim = DisabilityClaim::from_input(user_id, input);
        let mut inner = self.inner.write().await;
        inner
            .claims
            .entry(user_id.to_string())
            .or_default()
            .push(claim.clone());
        Ok(claim)
    }

    async fn update_claim(
        &self,
        user_id: &str,
        claim_id: Uuid,
        patch: ClaimPatch,
    ) -> Result<Option<DisabilityClaim>> {
        let mut inner = self.inner.write().await;
        let Some(claims) = inner.claims.get_mut(user_id) else {
            return Ok(None);
        };
        let Some(claim) = claims.iter_mut().find(|c| c.id == claim_id) else {
            return Ok(None);
        };
        claim.merge(patch);
        Ok(Some(claim.clone()))
    }

    async fn delete_claim(&self, user_id: &str, claim_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(claims) = inner.claims.get_mut(user_id) {
            claims.retain(|c| c.id != claim_id);
        }
        Ok(())
    }

    async fn list_documents(&self, user_id: &str) -> Result<Vec<DocumentRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .documents
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_document(
        &self,
        user_id: &str,
        input: DocumentInput,
    ) -> Result<DocumentRecord> {
        let record = DocumentRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            document_type: input.document_type,
            filename: input.filename,
            size_bytes: input.size_bytes,
            mime_type: input.mime_type,
            storage_path: input.storage_path,
            created_at: Utc::now(),
        };
        let mut inner = self.inner.write().await;
        inner
            .documents
            .entry(user_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn delete_document(&self, user_id: &str, document_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(docs) = inner.documents.get_mut(user_id) {
            docs.retain(|d| d.id != document_id);
        }
        Ok(())
    }

    async fn list_turns(&self, user_id: &str) -> Result<Vec<ConversationTurn>> {
        Ok(self
            .inner
            .read()
            .await
            .turns
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_turn(
        &self,
        user_id: &str,
        role: Role,
        text: &str,
    ) -> Result<ConversationTurn> {
        let turn = ConversationTurn {
            id: Uuid::new_v4(),
            role,
            text: text.to_string(),
            created_at: Utc::now(),
        };
        let mut inner = self.inner.write().await;
        inner
            .turns
            .entry(user_id.to_string())
            .or_default()
            .push(turn.clone());
        Ok(turn)
    }

    async fn clear_turns(&self, user_id: &str) -> Result<()> {
        self.inner.write().await.turns.remove(user_id);
        Ok(())
    }

    async fn list_steps(&self, user_id: &str) -> Result<Vec<StepStatusRow>> {
        Ok(self
            .inner
            .read()
            .await
            .steps
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_step(
        &self,
        user_id: &str,
        step: ApplicationStep,
        status: StepState,
    ) -> Result<StepStatusRow> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let rows = inner.steps.entry(user_id.to_string()).or_default();

        if let Some(row) = rows.iter_mut().find(|r| r.step == step) {
            row.completed_at = match status {
                StepState::Completed if row.status == StepState::Completed => row.completed_at,
                StepState::Completed => Some(now),
                _ => None,
            };
            row.status = status;
            row.updated_at = now;
            return Ok(row.clone());
        }

        let row = StepStatusRow {
            step,
            status,
            completed_at: (status == StepState::Completed).then_some(now),
            updated_at: now,
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn clear_steps(&self, user_id: &str) -> Result<()> {
        self.inner.write().await.steps.remove(user_id);
        Ok(())
    }

    async fn list_payments(&self, user_id: &str) -> Result<Vec<PaymentRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .payments
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_payment(&self, user_id: &str, input: PaymentInput) -> Result<PaymentRecord> {
        let record = PaymentRecord {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            provider_ref: input.provider_ref,
            amount_cents: input.amount_cents,
            status: input.status,
            paid_at: input.paid_at,
            created_at: Utc::now(),
        };
        let mut inner = self.inner.write().await;
        inner
            .payments
            .entry(user_id.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_is_coalescing_across_calls() {
        let store = MemStore::new();
        store
            .upsert_personal_info(
                "u1",
                PersonalInfoPatch {
                    city: Some("Austin".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let merged = store
            .upsert_personal_info(
                "u1",
                PersonalInfoPatch {
                    first_name: Some("Jane".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(merged.city.as_deref(), Some("Austin"));
        assert_eq!(merged.first_name.as_deref(), Some("Jane"));
    }

    #[tokio::test]
    async fn get_returns_none_for_missing_row() {
        let store = MemStore::new();
        assert!(store.get_personal_info("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_document_is_idempotent() {
        let store = MemStore::new();
        let doc = store
            .create_document(
                "u1",
                DocumentInput {
                    document_type: "dd214".into(),
                    filename: "dd214.pdf".into(),
                    size_bytes: 1024,
                    mime_type: "application/pdf".into(),
                    storage_path: "u1/dd214.pdf".into(),
                },
            )
            .await
            .unwrap();

        store.delete_document("u1", doc.id).await.unwrap();
        store.delete_document("u1", doc.id).await.unwrap();
        assert!(store.list_documents("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cross_tenant_writes_affect_zero_rows() {
        let store = MemStore::new();
        let claim = store
            .create_claim(
                "owner",
                ClaimInput {
                    title: "Tinnitus".into(),
                    diagnostic_code: Some("6260".into()),
                    description: None,
                    claimed_rating: None,
                    combat_related: None,
                    onset_date: None,
                    treatment_facility: None,
                },
            )
            .await
            .unwrap();

        // Update under the wrong owner is a no-op
        let updated = store
            .update_claim(
                "intruder",
                claim.id,
                ClaimPatch {
                    title: Some("Hearing loss".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.is_none());

        // Delete under the wrong owner deletes nothing
        store.delete_claim("intruder", claim.id).await.unwrap();
        let claims = store.list_claims("owner").await.unwrap();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].title, "Tinnitus");
    }

    #[tokio::test]
    async fn restart_clears_progress_but_not_data() {
        let store = MemStore::new();
        store
            .upsert_personal_info(
                "u1",
                PersonalInfoPatch {
                    first_name: Some("Jane".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store.append_turn("u1", Role::User, "hello").await.unwrap();
        store
            .set_step("u1", ApplicationStep::PersonalInfo, StepState::InProgress)
            .await
            .unwrap();

        store.clear_turns("u1").await.unwrap();
        store.clear_steps("u1").await.unwrap();

        assert!(store.list_turns("u1").await.unwrap().is_empty());
        assert!(store.list_steps("u1").await.unwrap().is_empty());
        assert!(store.get_personal_info("u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn completed_at_tracks_status_transitions() {
        let store = MemStore::new();
        let row = store
            .set_step("u1", ApplicationStep::MilitaryService, StepState::Completed)
            .await
            .unwrap();
        assert!(row.completed_at.is_some());

        let row = store
            .set_step(
                "u1",
                ApplicationStep::MilitaryService,
                StepState::RequiresReview,
            )
            .await
            .unwrap();
        assert!(row.completed_at.is_none());
    }

    #[tokio::test]
    async fn turns_keep_insertion_order() {
        let store = MemStore::new();
        store.append_turn("u1", Role::User, "first").await.unwrap();
        store
            .append_turn("u1", Role::Assistant, "second")
            .await
            .unwrap();
        store.append_turn("u1", Role::User, "third").await.unwrap();

        let texts: Vec<_> = store
            .list_turns("u1")
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.text)
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }
}
