//! ClaimForge Conversation Engine
//!
//! The conversational data-collection core:
//! - Model client abstraction over the Messages API (tool use + vision)
//! - Closed tool schema set and command dispatch
//! - Tool-calling orchestrator (the bounded agentic loop)
//! - Document extraction service
//! - Progress state machine
//! - Streaming frame codec and consumer

pub mod extract;
pub mod model;
pub mod orchestrator;
pub mod progress;
pub mod stream;
pub mod tools;

pub use extract::{DocumentType, ExtractionOutcome, Extractor};
pub use model::{AnthropicClient, ContentBlock, ModelClient, ModelReply, ModelRequest};
pub use orchestrator::{ChatMessage, Orchestrator};
pub use progress::ProgressReport;
pub use stream::{ChatStreamConsumer, FrameDecoder, StreamEvent};
