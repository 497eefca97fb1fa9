//! Persistence Gateway operation dispatcher
//!
//! The data endpoint accepts a logical operation name plus actor identity
//! and performs exactly one read or write. The operation set is a closed
//! enum: each name maps 1:1 to one table and one verb, dispatch is a single
//! exhaustive match, and an unrecognized name is rejected with
//! `UnknownOperation` before any store access.
//!
//! Restart semantics live here by construction: the only clearing operations
//! are `clear_conversation` and `clear_step_statuses`. No operation erases
//! collected applicant data.

use crate::errors::{AppError, Result};
use crate::store::ClaimStore;
use crate::types::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Closed set of gateway operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    GetUser,
    UpsertUser,
    GetPersonalInfo,
    UpsertPersonalInfo,
    GetMilitaryService,
    UpsertMilitaryService,
    GetVaDisabilityInfo,
    UpsertVaDisabilityInfo,
    GetDisabilityClaims,
    CreateDisabilityClaim,
    UpdateDisabilityClaim,
    DeleteDisabilityClaim,
    GetDocuments,
    CreateDocument,
    DeleteDocument,
    GetConversation,
    AppendConversationTurn,
    ClearConversation,
    GetStepStatuses,
    UpsertStepStatus,
    ClearStepStatuses,
    GetPayments,
    CreatePayment,
}

impl Operation {
    /// Parse an operation name; unknown names fail before any store access
    pub fn parse(name: &str) -> Result<Self> {
        serde_json::from_value(Value::String(name.to_string())).map_err(|_| {
            AppError::UnknownOperation {
                operation: name.to_string(),
            }
        })
    }
}

/// Uniform `{data, error}` envelope returned by the data endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl Envelope {
    pub fn ok(data: Option<Value>) -> Self {
        Self { data, error: None }
    }

    pub fn err(message: String) -> Self {
        Self {
            data: None,
            error: Some(message),
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(payload: Option<Value>, op: Operation) -> Result<T> {
    let value = payload.ok_or_else(|| AppError::MissingField {
        field: format!("data (required by {op:?})"),
    })?;
    serde_json::from_value(value).map_err(|e| AppError::Validation {
        message: format!("invalid payload for {op:?}: {e}"),
        field: None,
    })
}

fn require_id(target_id: Option<Uuid>, op: Operation) -> Result<Uuid> {
    target_id.ok_or_else(|| AppError::MissingField {
        field: format!("id (required by {op:?})"),
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Execute one gateway operation for `actor_id`.
///
/// Reads of missing singletons yield `Ok(None)`: absence is not failure.
/// Deletes are idempotent and owner-scoped in the store itself.
pub async fn execute(
    store: &dyn ClaimStore,
    op: Operation,
    actor_id: &str,
    payload: Option<Value>,
    target_id: Option<Uuid>,
) -> Result<Option<Value>> {
    match op {
        Operation::GetUser => {
            let user = store.get_user(actor_id).await?;
            user.as_ref().map(to_json).transpose()
        }
        Operation::UpsertUser => {
            let patch: UserPatch = parse_payload(payload, op)?;
            let user = store.upsert_user(actor_id, patch).await?;
            Ok(Some(to_json(&user)?))
        }

        Operation::GetPersonalInfo => {
            let info = store.get_personal_info(actor_id).await?;
            info.as_ref().map(to_json).transpose()
        }
        Operation::UpsertPersonalInfo => {
            let patch: PersonalInfoPatch = parse_payload(payload, op)?;
            let info = store.upsert_personal_info(actor_id, patch).await?;
            Ok(Some(to_json(&info)?))
        }

        Operation::GetMilitaryService => {
            let svc = store.get_military_service(actor_id).await?;
            svc.as_ref().map(to_json).transpose()
        }
        Operation::UpsertMilitaryService => {
            let patch: MilitaryServicePatch = parse_payload(payload, op)?;
            let svc = store.upsert_military_service(actor_id, patch).await?;
            Ok(Some(to_json(&svc)?))
        }

        Operation::GetVaDisabilityInfo => {
            let info = store.get_va_disability_info(actor_id).await?;
            info.as_ref().map(to_json).transpose()
        }
        Operation::UpsertVaDisabilityInfo => {
            let patch: VaDisabilityInfoPatch = parse_payload(payload, op)?;
            let info = store.upsert_va_disability_info(actor_id, patch).await?;
            Ok(Some(to_json(&info)?))
        }

        Operation::GetDisabilityClaims => {
            let claims = store.list_claims(actor_id).await?;
            Ok(Some(to_json(&claims)?))
        }
        Operation::CreateDisabilityClaim => {
            let input: ClaimInput = parse_payload(payload, op)?;
            let claim = store.create_claim(actor_id, input).await?;
            Ok(Some(to_json(&claim)?))
        }
        Operation::UpdateDisabilityClaim => {
            let id = require_id(target_id, op)?;
            let patch: ClaimPatch = parse_payload(payload, op)?;
            let claim = store.update_claim(actor_id, id, patch).await?;
            claim.as_ref().map(to_json).transpose()
        }
        Operation::DeleteDisabilityClaim => {
            let id = require_id(target_id, op)?;
            store.delete_claim(actor_id, id).await?;
            Ok(None)
        }

        Operation::GetDocuments => {
            let docs = store.list_documents(actor_id).await?;
            Ok(Some(to_json(&docs)?))
        }
        Operation::CreateDocument => {
            let input: DocumentInput = parse_payload(payload, op)?;
            let doc = store.create_document(actor_id, input).await?;
            Ok(Some(to_json(&doc)?))
        }
        Operation::DeleteDocument => {
            let id = require_id(target_id, op)?;
            store.delete_document(actor_id, id).await?;
            Ok(None)
        }

        Operation::GetConversation => {
            let turns = store.list_turns(actor_id).await?;
            Ok(Some(to_json(&turns)?))
        }
        Operation::AppendConversationTurn => {
            #[derive(Deserialize)]
            struct TurnPayload {
                role: Role,
                text: String,
            }
            let turn: TurnPayload = parse_payload(payload, op)?;
            let appended = store.append_turn(actor_id, turn.role, &turn.text).await?;
            Ok(Some(to_json(&appended)?))
        }
        Operation::ClearConversation => {
            store.clear_turns(actor_id).await?;
            Ok(None)
        }

        Operation::GetStepStatuses => {
            let steps = store.list_steps(actor_id).await?;
            Ok(Some(to_json(&steps)?))
        }
        Operation::UpsertStepStatus => {
            #[derive(Deserialize)]
            struct StepPayload {
                step: ApplicationStep,
                status: StepState,
            }
            let body: StepPayload = parse_payload(payload, op)?;
            let row = store.set_step(actor_id, body.step, body.status).await?;
            Ok(Some(to_json(&row)?))
        }
        Operation::ClearStepStatuses => {
            store.clear_steps(actor_id).await?;
            Ok(None)
        }

        Operation::GetPayments => {
            let payments = store.list_payments(actor_id).await?;
            Ok(Some(to_json(&payments)?))
        }
        Operation::CreatePayment => {
            let input: PaymentInput = parse_payload(payload, op)?;
            let payment = store.create_payment(actor_id, input).await?;
            Ok(Some(to_json(&payment)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;
    use serde_json::json;

    #[test]
    fn unknown_operation_is_rejected() {
        let err = Operation::parse("drop_all_tables").unwrap_err();
        assert!(matches!(err, AppError::UnknownOperation { .. }));
    }

    #[test]
    fn known_operations_parse() {
        assert_eq!(
            Operation::parse("upsert_personal_info").unwrap(),
            Operation::UpsertPersonalInfo
        );
        assert_eq!(
            Operation::parse("clear_step_statuses").unwrap(),
            Operation::ClearStepStatuses
        );
    }

    #[tokio::test]
    async fn get_of_missing_row_is_null_not_error() {
        let store = MemStore::new();
        let data = execute(&store, Operation::GetPersonalInfo, "u1", None, None)
            .await
            .unwrap();
        assert!(data.is_none());
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let store = MemStore::new();
        execute(
            &store,
            Operation::UpsertPersonalInfo,
            "u1",
            Some(json!({"first_name": "Jane", "city": "Austin"})),
            None,
        )
        .await
        .unwrap();

        let data = execute(&store, Operation::GetPersonalInfo, "u1", None, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(data["first_name"], "Jane");
        assert_eq!(data["city"], "Austin");
    }

    #[tokio::test]
    async fn delete_is_idempotent_through_the_gateway() {
        let store = MemStore::new();
        let created = execute(
            &store,
            Operation::CreateDocument,
            "u1",
            Some(json!({
                "document_type": "dd214",
                "filename": "dd214.pdf",
                "size_bytes": 2048,
                "mime_type": "application/pdf",
                "storage_path": "u1/dd214.pdf"
            })),
            None,
        )
        .await
        .unwrap()
        .unwrap();

        let id: Uuid = serde_json::from_value(created["id"].clone()).unwrap();

        for _ in 0..2 {
            let result = execute(&store, Operation::DeleteDocument, "u1", None, Some(id)).await;
            assert!(result.is_ok());
        }

        let docs = execute(&store, Operation::GetDocuments, "u1", None, None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(docs.as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn bad_payload_is_a_validation_error() {
        let store = MemStore::new();
        let err = execute(
            &store,
            Operation::UpsertStepStatus,
            "u1",
            Some(json!({"step": "not_a_step", "status": "completed"})),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }
}
