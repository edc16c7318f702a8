//! External adapters for the coverage domain
//!
//! - **HttpModelAdapter**: OpenAI-compatible chat-completions endpoint
//! - **MockGenerativeModel**: scripted in-memory model (see `model_port::mock`)
//!
//! ```rust,ignore
//! use domain_coverage::adapters::{HttpModelAdapter, HttpModelConfig};
//! use domain_coverage::GenerativeModelPort;
//! use std::sync::Arc;
//!
//! let adapter = HttpModelAdapter::new(HttpModelConfig::default())?;
//! let port: Arc<dyn GenerativeModelPort> = Arc::new(adapter);
//! ```

pub mod http_model;

pub use http_model::{HttpModelAdapter, HttpModelConfig};
