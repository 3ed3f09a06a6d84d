//! These models represent the objects passed around by the agent loop
//!
//! There are a few related formats we need to interact with:
//! - the transcript kept by the loop for a single user request
//! - gemini `contents`/`parts`, sent from the agent to the LLM
//! - openai messages/tools, sent from the agent to the LLM
//! - tool calls, sent from the agent to the systems providing capabilities
//!
//! Provider wire formats are always converted into these internal structs
//! immediately, so the loop never has to know which model service it talks to.
pub mod message;
pub mod role;
pub mod tool;
pub mod transcript;
