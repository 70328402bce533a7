//! CENYCA Core Library
//!
//! Shared functionality for the CENYCA reconciliation tool:
//! - CSV ingestion and validation for the captured-payments table and the bank ledger
//! - Prompt construction with the fixed matching policy
//! - Pluggable remote model backends (Gemini, mock)
//! - Defensive parsing of model replies with all-unmatched fallback
//! - Local deterministic matcher for offline runs
//! - Monthly quota gate for remote calls
//! - Fixed-header CSV export with WhatsApp outreach links

pub mod ai;
pub mod error;
pub mod export;
pub mod ingest;
pub mod matcher;
pub mod models;
pub mod policy;
pub mod prompt;
pub mod quota;
pub mod reconcile;

pub use ai::{GeminiBackend, MockBackend, ModelBackend, ModelClient};
pub use error::{Error, Result};
pub use export::{export_csv, whatsapp_link, EXPORT_HEADER};
pub use ingest::{parse_table, validate_upload, MAX_FILE_SIZE};
pub use matcher::reconcile_locally;
pub use models::{
    MatchStatus, QuotaState, ReconciliationRecord, ReconciliationResult, ReconciliationSummary,
    UploadedTable, NOT_AVAILABLE,
};
pub use prompt::{build_prompt, GenerationParams};
pub use quota::{MemoryQuota, QuotaGate, DEFAULT_MONTHLY_LIMIT};
pub use reconcile::{CsvUpload, Reconciler};
