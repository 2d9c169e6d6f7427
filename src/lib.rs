pub mod analyze;
pub mod config;
pub mod core;
pub mod domain;
pub mod extract;
pub mod llm;
pub mod utils;

pub use crate::config::{cli::LocalStorage, CliConfig};

pub use crate::core::engine::ExtractionEngine;
pub use crate::core::stage_sequence::{Stage, StageContext, StageResult, StageSequence};
pub use crate::utils::error::{Result, TaxonomyError};
