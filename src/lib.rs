//! # Archie
//!
//! Turns a project document into a ClickUp task hierarchy.
//!
//! ## Flow
//!
//! ```text
//!   .docx ──▶ extract ──▶ structure (LLM) ──▶ review ──▶ materialize ──▶ ClickUp
//!                                                            │
//!                                                    profile store (token)
//! ```
//!
//! 1. `extract` pulls plain text out of the uploaded document
//! 2. `structure` asks the model for tasks, subtasks and dependency names
//! 3. The user reviews the proposal in the dashboard
//! 4. `materialize` creates every task and subtask, then links dependencies
//!    by name
//!
//! ## Modules
//! - `api`: HTTP server, auth and handlers
//! - `clickup`: workspace client and OAuth
//! - `profile`: per-user credential and subscription storage
//! - `billing`: Stripe checkout and customer portal
//! - `llm`: chat-completion client used by `structure`

pub mod api;
pub mod billing;
pub mod clickup;
pub mod config;
pub mod extract;
pub mod llm;
pub mod materialize;
pub mod profile;
pub mod structure;
pub mod task;

pub use config::Config;
pub use materialize::{MaterializeError, MaterializeReport, Materializer};
