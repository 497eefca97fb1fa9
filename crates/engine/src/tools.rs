//! Tool schemas and command dispatch
//!
//! The tool set is the binding contract between the model's narration and
//! the persistence layer: a closed, versioned list of five named operations
//! with strict argument schemas. Parsing yields a `ToolCommand`, and
//! execution is a single exhaustive match, so an unrecognized command is a
//! compile-time-detectable gap rather than a runtime surprise.

use crate::model::ToolDefinition;
use claimforge_common::store::ClaimStore;
use claimforge_common::types::*;
use serde::Deserialize;
use serde_json::{json, Value};

pub const SAVE_PERSONAL_INFO: &str = "save-personal-info";
pub const SAVE_MILITARY_SERVICE: &str = "save-military-service";
pub const SAVE_VA_DISABILITY_INFO: &str = "save-va-disability-info";
pub const SAVE_DISABILITY_CLAIM: &str = "save-disability-claim";
pub const UPDATE_PHASE_STATUS: &str = "update-phase-status";

/// The closed tool schema set sent with every model request
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: SAVE_PERSONAL_INFO.to_string(),
            description: "Save the applicant's personal and contact information. \
                          Only include fields the user has actually provided."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "first_name": { "type": "string" },
                    "middle_name": { "type": "string" },
                    "last_name": { "type": "string" },
                    "date_of_birth": { "type": "string", "description": "YYYY-MM-DD" },
                    "ssn_last_four": { "type": "string" },
                    "phone": { "type": "string" },
                    "email": { "type": "string" },
                    "street_address": { "type": "string" },
                    "city": { "type": "string" },
                    "state": { "type": "string" },
                    "postal_code": { "type": "string" }
                },
                "required": []
            }),
        },
        ToolDefinition {
            name: SAVE_MILITARY_SERVICE.to_string(),
            description: "Save the applicant's military service history. \
                          Only include fields the user has actually provided."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "branch": { "type": "string", "enum": ServiceBranch::VALUES },
                    "service_start_date": { "type": "string", "description": "YYYY-MM-DD" },
                    "service_end_date": { "type": "string", "description": "YYYY-MM-DD" },
                    "discharge_type": { "type": "string" },
                    "rank_at_separation": { "type": "string" },
                    "retirement_type": { "type": "string", "enum": RetirementType::VALUES },
                    "currently_serving": { "type": "boolean" }
                },
                "required": []
            }),
        },
        ToolDefinition {
            name: SAVE_VA_DISABILITY_INFO.to_string(),
            description: "Save the applicant's existing VA disability rating details."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "has_existing_rating": { "type": "boolean" },
                    "combined_rating": {
                        "type": "integer",
                        "minimum": 0,
                        "maximum": 100,
                        "description": "Combined rating percentage"
                    },
                    "monthly_compensation_cents": { "type": "integer" },
                    "effective_date": { "type": "string", "description": "YYYY-MM-DD" }
                },
                "required": []
            }),
        },
        ToolDefinition {
            name: SAVE_DISABILITY_CLAIM.to_string(),
            description: "Add one claimed condition. Call once per distinct condition; \
                          do not re-save a condition that was already saved this session."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string", "description": "Short condition name" },
                    "diagnostic_code": { "type": "string", "description": "VA diagnostic code if known" },
                    "description": { "type": "string" },
                    "claimed_rating": { "type": "integer", "minimum": 0, "maximum": 100 },
                    "combat_related": { "type": "string", "enum": CombatCode::VALUES },
                    "onset_date": { "type": "string", "description": "YYYY-MM-DD" },
                    "treatment_facility": { "type": "string" }
                },
                "required": ["title"]
            }),
        },
        ToolDefinition {
            name: UPDATE_PHASE_STATUS.to_string(),
            description: "Update the completion status of one application step. \
                          Mark a step in_progress when you start collecting it and \
                          completed once its minimum required fields are saved."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "step": { "type": "string", "enum": ApplicationStep::VALUES },
                    "status": { "type": "string", "enum": StepState::VALUES }
                },
                "required": ["step", "status"]
            }),
        },
    ]
}

#[derive(Debug, Deserialize)]
struct PhaseStatusArgs {
    step: ApplicationStep,
    status: StepState,
}

/// Parsed, typed tool invocation
#[derive(Debug)]
pub enum ToolCommand {
    SavePersonalInfo(PersonalInfoPatch),
    SaveMilitaryService(MilitaryServicePatch),
    SaveVaDisabilityInfo(VaDisabilityInfoPatch),
    SaveDisabilityClaim(ClaimInput),
    UpdatePhaseStatus {
        step: ApplicationStep,
        status: StepState,
    },
}

impl ToolCommand {
    /// Parse a tool invocation by name; failures become result text the
    /// model can see, not errors that abort the exchange
    pub fn parse(name: &str, input: Value) -> Result<Self, String> {
        match name {
            SAVE_PERSONAL_INFO => serde_json::from_value(input)
                .map(ToolCommand::SavePersonalInfo)
                .map_err(|e| format!("Invalid arguments for {name}: {e}")),
            SAVE_MILITARY_SERVICE => serde_json::from_value(input)
                .map(ToolCommand::SaveMilitaryService)
                .map_err(|e| format!("Invalid arguments for {name}: {e}")),
            SAVE_VA_DISABILITY_INFO => serde_json::from_value(input)
                .map(ToolCommand::SaveVaDisabilityInfo)
                .map_err(|e| format!("Invalid arguments for {name}: {e}")),
            SAVE_DISABILITY_CLAIM => serde_json::from_value(input)
                .map(ToolCommand::SaveDisabilityClaim)
                .map_err(|e| format!("Invalid arguments for {name}: {e}")),
            UPDATE_PHASE_STATUS => serde_json::from_value::<PhaseStatusArgs>(input)
                .map(|args| ToolCommand::UpdatePhaseStatus {
                    step: args.step,
                    status: args.status,
                })
                .map_err(|e| format!("Invalid arguments for {name}: {e}")),
            other => Err(format!("Unknown tool: {other}")),
        }
    }

    /// Execute against the store for `user_id`, producing the result text
    /// fed back to the model
    pub async fn execute(self, store: &dyn ClaimStore, user_id: &str) -> String {
        let outcome = match self {
            ToolCommand::SavePersonalInfo(patch) => store
                .upsert_personal_info(user_id, patch)
                .await
                .map(|_| "Personal information saved successfully".to_string()),
            ToolCommand::SaveMilitaryService(patch) => store
                .upsert_military_service(user_id, patch)
                .await
                .map(|_| "Military service information saved successfully".to_string()),
            ToolCommand::SaveVaDisabilityInfo(patch) => store
                .upsert_va_disability_info(user_id, patch)
                .await
                .map(|_| "VA disability information saved successfully".to_string()),
            ToolCommand::SaveDisabilityClaim(input) => {
                let title = input.title.clone();
                store
                    .create_claim(user_id, input)
                    .await
                    .map(|_| format!("Disability claim \"{title}\" saved successfully"))
            }
            ToolCommand::UpdatePhaseStatus { step, status } => store
                .set_step(user_id, step, status)
                .await
                .map(|row| {
                    format!(
                        "Step {} marked {}",
                        row.step.as_str(),
                        row.status.as_str()
                    )
                }),
        };

        match outcome {
            Ok(message) => message,
            Err(e) => format!("Error: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimforge_common::store::MemStore;

    #[test]
    fn schema_set_is_closed_and_versioned() {
        let defs = definitions();
        let names: Vec<_> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                SAVE_PERSONAL_INFO,
                SAVE_MILITARY_SERVICE,
                SAVE_VA_DISABILITY_INFO,
                SAVE_DISABILITY_CLAIM,
                UPDATE_PHASE_STATUS,
            ]
        );

        // Enumerated domains appear in the schemas verbatim
        let military = &defs[1];
        let branches = military.input_schema["properties"]["branch"]["enum"]
            .as_array()
            .unwrap();
        assert_eq!(branches.len(), ServiceBranch::VALUES.len());
    }

    #[test]
    fn unknown_tool_name_is_result_text_not_panic() {
        let err = ToolCommand::parse("delete-everything", json!({})).unwrap_err();
        assert!(err.contains("Unknown tool"));
    }

    #[test]
    fn claim_requires_a_title() {
        let err = ToolCommand::parse(SAVE_DISABILITY_CLAIM, json!({"description": "x"}))
            .unwrap_err();
        assert!(err.contains("title"));
    }

    #[tokio::test]
    async fn execute_writes_through_the_store() {
        let store = MemStore::new();
        let cmd = ToolCommand::parse(
            SAVE_PERSONAL_INFO,
            json!({"first_name": "Jane", "city": "Austin"}),
        )
        .unwrap();

        let result = cmd.execute(&store, "u1").await;
        assert_eq!(result, "Personal information saved successfully");

        let saved = store.get_personal_info("u1").await.unwrap().unwrap();
        assert_eq!(saved.first_name.as_deref(), Some("Jane"));
    }

    #[tokio::test]
    async fn bad_arguments_become_error_text() {
        let err =
            ToolCommand::parse(UPDATE_PHASE_STATUS, json!({"step": "laundry", "status": "done"}))
                .unwrap_err();
        assert!(err.contains("Invalid arguments"));
    }
}
