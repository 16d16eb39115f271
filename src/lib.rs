#![deny(missing_docs)]

//! Core library for the statement question-answering service.

/// HTTP routing and REST handlers.
pub mod api;
/// Environment-driven configuration management.
pub mod config;
/// PDF loading and statement page location.
pub mod document;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Causal language model clients.
pub mod generation;
/// Structured logging and tracing setup.
pub mod logging;
/// Request counters.
pub mod metrics;
/// Locate, extract, index, retrieve, and answer.
pub mod pipeline;
/// Qdrant vector store integration.
pub mod qdrant;
/// Vector store abstraction and in-memory backend.
pub mod store;
/// Statement table extraction and reshaping.
pub mod table;
