//! # StackIndex
//!
//! A developer-tool intelligence backend. Given a free-text query naming one
//! or more tools ("React vs Vue", "Next.js"), it aggregates public data
//! about them — repository metrics, official documentation, community
//! signals — and hands the consolidated bundle to an LLM to produce a
//! comparison or deep-dive analysis.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────────────┐   ┌──────────────┐
//! │ HTTP / CLI   │──▶│       Orchestrator        │──▶│ Summarizer   │
//! │              │   │ parse → fan-out → merge   │   │ (messages    │
//! └──────────────┘   │      → enrich → cache     │   │  API)        │
//!                    └──────┬──────┬──────┬──────┘   └──────────────┘
//!                           ▼      ▼      ▼
//!                      ┌───────┬───────┬───────────┐
//!                      │GitHub │ Docs  │ Community │   source adapters
//!                      └───┬───┴───┬───┴─────┬─────┘
//!                          └───────┼─────────┘
//!                                  ▼
//!                      ┌───────────────────────┐
//!                      │  Tiered cache         │
//!                      │  SQLite + in-memory   │
//!                      └───────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment credentials |
//! | [`error`] | Error taxonomy |
//! | [`cache`] | Durable + volatile key-value cache |
//! | [`models`] | Bundles, analysis shapes, response metadata |
//! | [`github`] | Repository-metrics adapter |
//! | [`docs`] | Documentation scraping adapter |
//! | [`community`] | Stack Overflow / Reddit / npm adapter |
//! | [`claude`] | Summarization client |
//! | [`orchestrator`] | Fan-out, merge, enrichment, prefetch |
//! | [`app`] | Process-scoped component wiring |
//! | [`server`] | HTTP API |

pub mod app;
pub mod cache;
pub mod claude;
pub mod community;
pub mod config;
pub mod docs;
pub mod error;
pub mod github;
pub mod models;
pub mod orchestrator;
pub mod server;
