//! veridoc - document verification and fraud-scoring pipeline.
//!
//! Ingests uploaded collateral documents (certificates, appraisals, NFT
//! proofs), extracts structured evidence via an external OCR capability,
//! scores that evidence against independent fraud detectors, and manages the
//! asynchronous lifecycle of the work: a persistent queue with priority,
//! aging, exponential-backoff retries and a supervised worker pool.
//!
//! The crate is framework-agnostic: persistence, object storage and the OCR
//! engine are capability traits injected at construction. In-memory
//! implementations ship for single-process use and tests; a tesseract
//! adapter ships for the CLI.

pub mod cli;
pub mod config;
pub mod extract;
pub mod fraud;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod repository;
pub mod storage;

pub use pipeline::{Pipeline, PipelineError};
