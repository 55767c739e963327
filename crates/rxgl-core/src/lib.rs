#![forbid(unsafe_code)]

//! Shared vocabulary for the rxgl crates: the engine error type, renderer
//! configuration and logging bootstrap. No GL, no reactivity.
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{load_renderer_config, parse_renderer_config, DrawMode, RendererConfig};
pub use error::EngineError;
pub use logging::{init_logging, LoggingConfig};
