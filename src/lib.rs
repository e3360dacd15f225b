//! # Event Harvester
//!
//! Backend for a browser extension that scrapes inbox and page text, asks an
//! LLM to pull out calendar-worthy events, drops events the user has already
//! seen, and streams results back as they arrive.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌─────────┐   ┌────────────┐   ┌──────────┐
//! │  emails  │──▶│ blocks  │──▶│  chunk  │──▶│  dispatch  │──▶│  NDJSON  │
//! │ (JSON)   │   │ render  │   │ ≤budget │   │ N × LLM    │   │  stream  │
//! └──────────┘   └─────────┘   └─────────┘   └─────┬──────┘   └──────────┘
//!                                                  │ filter_new
//!                                             ┌────▼─────┐
//!                                             │  SQLite  │
//!                                             │ events + │
//!                                             │ contacts │
//!                                             └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and wire shapes |
//! | [`tokens`] | Token counting (tiktoken `cl100k_base` or char estimate) |
//! | [`blocks`] | Email record → text block rendering |
//! | [`chunk`] | Token-budgeted chunking |
//! | [`prompt`] | Prompt templates |
//! | [`llm`] | Chat-completion client |
//! | [`extract`] | Response cleaning and typed validation |
//! | [`dispatch`] | Concurrent per-chunk extraction with streamed progress |
//! | [`store`] | Dedup and contact persistence |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`error`] | Error taxonomy |

pub mod blocks;
pub mod chunk;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod server;
pub mod store;
pub mod tokens;
