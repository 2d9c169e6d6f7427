pub mod engine;
pub mod stage_sequence;

pub use crate::domain::model::WorkbookJson;
pub use crate::domain::ports::{ConfigProvider, Storage};
pub use crate::utils::error::Result;
