pub mod cli;
pub mod prompts;
pub mod stage_config;

use crate::core::ConfigProvider;
#[cfg(feature = "cli")]
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(Parser))]
#[cfg_attr(feature = "cli", command(name = "sheet-taxonomy"))]
#[cfg_attr(
    feature = "cli",
    command(about = "Extract spreadsheet structure into JSON/CSV artifacts")
)]
pub struct CliConfig {
    /// 放置 .xlsx / .xlsm 檔案的輸入資料夾
    #[cfg_attr(feature = "cli", arg(long, default_value = "spreadsheets"))]
    pub input_folder: String,

    /// 每個檔案一個子資料夾的輸出位置
    #[cfg_attr(feature = "cli", arg(long, default_value = "spreadsheet_data"))]
    pub output_folder: String,

    #[cfg_attr(feature = "cli", arg(long, help = "Enable verbose output"))]
    pub verbose: bool,

    #[cfg_attr(feature = "cli", arg(long, help = "Enable system monitoring"))]
    pub monitor: bool,
}

impl ConfigProvider for CliConfig {
    fn input_folder(&self) -> &str {
        &self.input_folder
    }

    fn output_folder(&self) -> &str {
        &self.output_folder
    }

    fn monitor_enabled(&self) -> bool {
        self.monitor
    }
}

use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_existing_dir("input_folder", &self.input_folder)?;
        validation::validate_path("output_folder", &self.output_folder)?;
        Ok(())
    }
}
