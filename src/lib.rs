//! moneyflow import core.
//!
//! The transaction import pipeline of a personal-finance tracker: tabular
//! (CSV/Excel) and document (PDF) intake, column inference, AI-assisted
//! extraction, review with ranked suggestions, and atomic commit against
//! ledger accounts. Rendering and persistence live elsewhere; this crate
//! talks to them through [`api::BackendApi`], [`doc_import::DocumentExtractor`]
//! and [`events::Notifier`].

pub mod ai;
pub mod api;
pub mod csv_import;
pub mod doc_import;
pub mod events;
pub mod models;
pub mod session;
pub mod splits;
pub mod suggestions;
