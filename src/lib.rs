//! # CodeAsk
//!
//! A local-first question-answering engine over a source tree.
//!
//! CodeAsk ingests a codebase into a single-file SQLite index holding both
//! embeddings and lexical term statistics, answers questions through hybrid
//! (vector + lexical) retrieval fused into one ranking, and conditions
//! answers on a user role. A fuzzy DOM locator maps free-text element
//! descriptions to concrete page elements for UI-related questions.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────────┐
//! │  Loader  │──▶│   Splitter    │──▶│    SQLite      │
//! │ walk+read│   │ chunk+embed  │   │ vectors+terms │
//! └──────────┘   └──────────────┘   └──────┬────────┘
//!                                          │
//!                       ┌──────────────────┤
//!                       ▼                  ▼
//!                 ┌───────────┐     ┌───────────┐
//!                 │ Retriever │────▶│  Session  │
//!                 │  hybrid   │     │ role+chat │
//!                 └───────────┘     └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! codeask ingest                          # build the index
//! codeask search "login validation"       # raw hybrid retrieval
//! codeask ask "how does login work?" --role developer
//! codeask chat --role tester              # interactive session
//! codeask locate http://app/orders "submit order button"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`loader`] | Source tree discovery and loading |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | SQLite index: build, swap, read |
//! | [`ingest`] | End-to-end ingest pipeline |
//! | [`retrieve`] | Hybrid vector + lexical retrieval |
//! | [`session`] | Role-conditioned conversational sessions |
//! | [`generate`] | Generation provider abstraction |
//! | [`locate`] | Fuzzy DOM element location |
//! | [`trace`] | Execution trace excerpts |
//! | [`context`] | Explicit application context |

pub mod chunk;
pub mod config;
pub mod context;
pub mod embedding;
pub mod generate;
pub mod ingest;
pub mod loader;
pub mod locate;
pub mod retrieve;
pub mod session;
pub mod store;
pub mod trace;
