//! Tool-calling orchestrator
//!
//! Runs the bounded agentic loop for one user message: send the
//! conversation to the model, execute any tool invocations in wire order,
//! feed the results back, and repeat until the model stops calling tools or
//! the round budget runs out. Narration is separated from tool scaffolding
//! throughout: only the applicant-visible text is streamed and persisted,
//! tool_use and tool_result blocks live only inside the loop's working
//! message list.

use crate::model::{ContentBlock, ModelClient, ModelMessage, ModelRequest, ModelReply};
use crate::tools::{self, ToolCommand};
use claimforge_common::errors::{AppError, Result};
use claimforge_common::store::ClaimStore;
use claimforge_common::types::Role;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// One prior turn supplied by the client
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

const SYSTEM_PREAMBLE: &str = "\
You are a VA disability benefits filing assistant. You help veterans \
gather the information needed for a disability compensation application, \
one step at a time: personal details, military service, existing VA \
rating, claimed conditions, supporting documents, and final review.

Rules:
- Save information with the provided tools as soon as the user supplies \
it; never ask the user to repeat something already on file.
- Only pass fields the user actually stated. Never invent values.
- Keep replies short, plain, and respectful. One question at a time.
- Update step status as you move through the application.
- If the user wants to start the application over, tell them their saved \
information is kept and only the conversation and progress reset.";

pub struct Orchestrator {
    store: Arc<dyn ClaimStore>,
    model: Arc<dyn ModelClient>,
    max_tool_rounds: usize,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ClaimStore>,
        model: Arc<dyn ModelClient>,
        max_tool_rounds: usize,
    ) -> Self {
        Self {
            store,
            model,
            max_tool_rounds,
        }
    }

    /// Run one exchange. Returns the full narration text; if `deltas` is
    /// given, narration fragments are also sent through it as they arrive,
    /// and their concatenation equals the returned text exactly.
    ///
    /// On success exactly one user turn and one assistant turn are
    /// persisted, the assistant turn holding narration only. A failed
    /// exchange persists nothing.
    pub async fn run(
        &self,
        user_id: &str,
        message: &str,
        history: &[ChatMessage],
        deltas: Option<mpsc::Sender<String>>,
    ) -> Result<String> {
        let mut messages: Vec<ModelMessage> = history
            .iter()
            .map(|m| ModelMessage {
                role: m.role.as_str().to_string(),
                content: vec![ContentBlock::text(m.content.clone())],
            })
            .collect();
        messages.push(ModelMessage::user(vec![ContentBlock::text(message)]));

        let tools = tools::definitions();
        let mut narration = String::new();

        for round in 0..=self.max_tool_rounds {
            // Context is rebuilt every round so the model sees its own
            // saves reflected immediately
            let system = self.build_system_prompt(user_id).await?;

            let reply = self
                .model
                .complete(ModelRequest {
                    system,
                    messages: messages.clone(),
                    tools: tools.clone(),
                })
                .await?;

            self.emit_narration(&reply, &mut narration, deltas.as_ref())
                .await;

            if !reply.has_tool_use() {
                debug!(user_id, rounds = round + 1, "exchange complete");
                // The turn pair lands together so a failed exchange never
                // leaves a user turn with no reply
                self.store.append_turn(user_id, Role::User, message).await?;
                self.store
                    .append_turn(user_id, Role::Assistant, &narration)
                    .await?;
                return Ok(narration);
            }

            if round == self.max_tool_rounds {
                break;
            }

            let results = self.execute_tools(user_id, &reply).await;
            messages.push(ModelMessage::assistant(reply.blocks));
            messages.push(ModelMessage::user(results));
        }

        warn!(
            user_id,
            max_rounds = self.max_tool_rounds,
            "tool loop budget exhausted"
        );
        Err(AppError::ToolLoopExceeded {
            max_rounds: self.max_tool_rounds as u32,
        })
    }

    /// Execute every tool_use block in the order the model emitted them,
    /// sequentially. Failures become tool_result text the model can react
    /// to; they never abort the exchange.
    async fn execute_tools(&self, user_id: &str, reply: &ModelReply) -> Vec<ContentBlock> {
        let mut results = Vec::new();
        for block in &reply.blocks {
            if let ContentBlock::ToolUse { id, name, input } = block {
                info!(user_id, tool = %name, "executing tool");
                let (content, is_error) = match ToolCommand::parse(name, input.clone()) {
                    Ok(cmd) => {
                        let text = cmd.execute(self.store.as_ref(), user_id).await;
                        let failed = text.starts_with("Error:");
                        (text, failed)
                    }
                    Err(message) => (message, true),
                };
                results.push(ContentBlock::ToolResult {
                    tool_use_id: id.clone(),
                    content,
                    is_error,
                });
            }
        }
        results
    }

    async fn emit_narration(
        &self,
        reply: &ModelReply,
        narration: &mut String,
        deltas: Option<&mpsc::Sender<String>>,
    ) {
        for block in &reply.blocks {
            if let ContentBlock::Text { text } = block {
                if text.is_empty() {
                    continue;
                }
                // The separator travels inside the delta so the streamed
                // text and the persisted narration are byte-identical
                let mut piece = String::new();
                if !narration.is_empty() {
                    piece.push_str("\n\n");
                }
                piece.push_str(text);
                narration.push_str(&piece);
                if let Some(tx) = deltas {
                    // Receiver gone means the client disconnected; the
                    // exchange still runs to completion so saves land
                    let _ = tx.send(piece).await;
                }
            }
        }
    }

    /// Snapshot of what is already on file, prepended to the system prompt
    async fn build_system_prompt(&self, user_id: &str) -> Result<String> {
        let personal = self.store.get_personal_info(user_id).await?;
        let service = self.store.get_military_service(user_id).await?;
        let rating = self.store.get_va_disability_info(user_id).await?;
        let claims = self.store.list_claims(user_id).await?;

        let mut summary = String::from("\n\nOn file for this applicant:\n");
        match personal.as_ref().and_then(|p| {
            match (p.first_name.as_deref(), p.last_name.as_deref()) {
                (None, None) => None,
                (f, l) => Some(format!(
                    "{} {}",
                    f.unwrap_or_default(),
                    l.unwrap_or_default()
                )),
            }
        }) {
            Some(name) => summary.push_str(&format!("- Name: {}\n", name.trim())),
            None => summary.push_str("- Name: not yet provided\n"),
        }
        match service.as_ref().and_then(|s| s.branch) {
            Some(branch) => summary.push_str(&format!("- Branch: {}\n", branch.as_str())),
            None => summary.push_str("- Branch: not yet provided\n"),
        }
        match rating.as_ref().and_then(|r| r.combined_rating) {
            Some(pct) => summary.push_str(&format!("- Current combined rating: {}%\n", pct)),
            None => summary.push_str("- Current combined rating: none on file\n"),
        }
        summary.push_str(&format!("- Claimed conditions saved: {}\n", claims.len()));

        Ok(format!("{SYSTEM_PREAMBLE}{summary}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScriptedModel;
    use claimforge_common::store::MemStore;
    use serde_json::json;

    fn text_reply(text: &str) -> ModelReply {
        ModelReply {
            blocks: vec![ContentBlock::text(text)],
            stop_reason: Some("end_turn".into()),
        }
    }

    fn orchestrator(
        store: Arc<MemStore>,
        model: ScriptedModel,
        max_rounds: usize,
    ) -> Orchestrator {
        Orchestrator::new(store, Arc::new(model), max_rounds)
    }

    #[tokio::test]
    async fn plain_reply_persists_one_turn_pair() {
        let store = Arc::new(MemStore::new());
        let orch = orchestrator(
            store.clone(),
            ScriptedModel::new(vec![text_reply("Welcome! What's your name?")]),
            8,
        );

        let out = orch.run("u1", "hi", &[], None).await.unwrap();
        assert_eq!(out, "Welcome! What's your name?");

        let turns = store.list_turns("u1").await.unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[0].text, "hi");
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[1].text, "Welcome! What's your name?");
    }

    #[tokio::test]
    async fn tool_rounds_save_data_and_persist_narration_only() {
        let store = Arc::new(MemStore::new());
        let model = ScriptedModel::new(vec![
            ModelReply {
                blocks: vec![
                    ContentBlock::text("Saving that now."),
                    ContentBlock::ToolUse {
                        id: "tu_1".into(),
                        name: tools::SAVE_PERSONAL_INFO.into(),
                        input: json!({"first_name": "Jane", "last_name": "Doe"}),
                    },
                    ContentBlock::ToolUse {
                        id: "tu_2".into(),
                        name: tools::UPDATE_PHASE_STATUS.into(),
                        input: json!({"step": "personal_info", "status": "in_progress"}),
                    },
                ],
                stop_reason: Some("tool_use".into()),
            },
            text_reply("Got it, Jane. What branch did you serve in?"),
        ]);
        let orch = orchestrator(store.clone(), model, 8);

        let out = orch.run("u1", "I'm Jane Doe", &[], None).await.unwrap();
        assert_eq!(
            out,
            "Saving that now.\n\nGot it, Jane. What branch did you serve in?"
        );

        // Both tool calls executed, in order
        let info = store.get_personal_info("u1").await.unwrap().unwrap();
        assert_eq!(info.first_name.as_deref(), Some("Jane"));
        let steps = store.list_steps("u1").await.unwrap();
        assert_eq!(steps.len(), 1);

        // Persisted assistant turn carries no tool scaffolding
        let turns = store.list_turns("u1").await.unwrap();
        assert_eq!(turns.len(), 2);
        assert!(!turns[1].text.contains("tool_use"));
        assert!(!turns[1].text.contains("tu_1"));
    }

    #[tokio::test]
    async fn runaway_tool_loop_is_bounded() {
        let store = Arc::new(MemStore::new());
        let model = ScriptedModel::repeating(ModelReply {
            blocks: vec![ContentBlock::ToolUse {
                id: "tu_x".into(),
                name: tools::SAVE_PERSONAL_INFO.into(),
                input: json!({"first_name": "Jane"}),
            }],
            stop_reason: Some("tool_use".into()),
        });
        let orch = orchestrator(store, model, 3);

        let err = orch.run("u1", "hi", &[], None).await.unwrap_err();
        assert!(matches!(err, AppError::ToolLoopExceeded { max_rounds: 3 }));
    }

    #[tokio::test]
    async fn bad_tool_arguments_become_error_results_not_failures() {
        let store = Arc::new(MemStore::new());
        let model = ScriptedModel::new(vec![
            ModelReply {
                blocks: vec![ContentBlock::ToolUse {
                    id: "tu_1".into(),
                    name: "no-such-tool".into(),
                    input: json!({}),
                }],
                stop_reason: Some("tool_use".into()),
            },
            text_reply("Let me try that differently."),
        ]);
        let orch = orchestrator(store, model, 8);

        let out = orch.run("u1", "hi", &[], None).await.unwrap();
        assert_eq!(out, "Let me try that differently.");
    }

    #[tokio::test]
    async fn streamed_deltas_concatenate_to_the_persisted_narration() {
        let store = Arc::new(MemStore::new());
        let model = ScriptedModel::new(vec![
            ModelReply {
                blocks: vec![
                    ContentBlock::text("Saving that now."),
                    ContentBlock::ToolUse {
                        id: "tu_1".into(),
                        name: tools::SAVE_PERSONAL_INFO.into(),
                        input: json!({"first_name": "Jane"}),
                    },
                ],
                stop_reason: Some("tool_use".into()),
            },
            text_reply("Done. What branch?"),
        ]);
        let orch = orchestrator(store.clone(), model, 8);

        let (tx, mut rx) = mpsc::channel(16);
        let out = orch.run("u1", "I'm Jane", &[], Some(tx)).await.unwrap();

        let mut streamed = String::new();
        while let Some(piece) = rx.recv().await {
            streamed.push_str(&piece);
        }
        assert_eq!(streamed, out);
        assert_eq!(out, "Saving that now.\n\nDone. What branch?");

        let turns = store.list_turns("u1").await.unwrap();
        assert_eq!(turns[1].text, streamed);
    }

    #[tokio::test]
    async fn failed_exchange_persists_no_turns() {
        let store = Arc::new(MemStore::new());
        let model = ScriptedModel::repeating(ModelReply {
            blocks: vec![ContentBlock::ToolUse {
                id: "tu_x".into(),
                name: tools::UPDATE_PHASE_STATUS.into(),
                input: json!({"step": "personal_info", "status": "in_progress"}),
            }],
            stop_reason: Some("tool_use".into()),
        });
        let orch = orchestrator(store.clone(), model, 2);

        let err = orch.run("u1", "hi", &[], None).await.unwrap_err();
        assert!(matches!(err, AppError::ToolLoopExceeded { .. }));
        assert!(store.list_turns("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn narration_is_streamed_as_deltas() {
        let store = Arc::new(MemStore::new());
        let model = ScriptedModel::new(vec![text_reply("Hello there")]);
        let orch = orchestrator(store, model, 8);

        let (tx, mut rx) = mpsc::channel(16);
        let out = orch.run("u1", "hi", &[], Some(tx)).await.unwrap();
        assert_eq!(out, "Hello there");
        assert_eq!(rx.recv().await.as_deref(), Some("Hello there"));
    }
}
