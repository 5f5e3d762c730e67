//! These models represent the objects passed around by the agents
//!
//! There are several different related formats we need to interact with:
//! - openai messages/tools, sent from the agent to the LLM (and streamed back)
//! - system requests, sent from the agent to the systems providing tools
//! - run transcripts, persisted per session and handed to the HTTP router
//!
//! We always immediately convert those data models into the internal structs
//! using to/from helpers. The transcript view in [`run`] is what callers see.
pub mod content;
pub mod message;
pub mod role;
pub mod run;
pub mod tool;
