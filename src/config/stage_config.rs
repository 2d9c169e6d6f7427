use crate::utils::error::{Result, TaxonomyError};
use crate::utils::validation::Validate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// 五個分析階段的固定名稱
pub const KNOWN_STAGES: &[&str] = &["keywords", "codes", "themes", "concepts", "conceptual_model"];

/// 分析管線的 TOML 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    pub pipeline: PipelineInfo,
    pub source: SourceConfig,
    pub stages: StagesConfig,
    pub prompts: PromptFilesConfig,
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineInfo {
    pub name: String,
    pub description: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub endpoint: String,
    pub model: String,
    /// 對齊上游 API 的部署命名：模型名前綴 "dev-"
    pub use_dev_prefix: Option<bool>,
    pub api_key: Option<String>,
    pub scenario_guid: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub headers: Option<HashMap<String, String>>,
}

impl SourceConfig {
    pub fn qualified_model(&self) -> String {
        if self.use_dev_prefix.unwrap_or(false) {
            format!("dev-{}", self.model)
        } else {
            self.model.clone()
        }
    }

    /// 配置裡留空或是未替換的 ${VAR} 都視為沒有金鑰
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty() && !key.starts_with("${"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagesConfig {
    pub execution_order: Vec<String>,
    /// 階段之間的固定等待秒數，避免打爆上游的 RPM 限制
    pub sleep_between_seconds: Option<u64>,
    /// codes 階段的關鍵字分塊大小
    pub chunk_size: Option<usize>,
    /// 帶進 codes/themes 階段的 sheetjson 取樣字元數
    pub data_sample_chars: Option<usize>,
    /// keywords 階段送出的 sheetjson 上限字元數
    pub max_data_chars: Option<usize>,
    /// "stop"（預設）或 "continue"
    pub on_stage_failure: Option<String>,
}

impl StagesConfig {
    pub fn chunk_size(&self) -> usize {
        self.chunk_size.unwrap_or(40)
    }

    pub fn data_sample_chars(&self) -> usize {
        self.data_sample_chars.unwrap_or(4000)
    }

    pub fn max_data_chars(&self) -> usize {
        self.max_data_chars.unwrap_or(20_000)
    }

    pub fn sleep_between_seconds(&self) -> u64 {
        self.sleep_between_seconds.unwrap_or(0)
    }

    pub fn continue_on_failure(&self) -> bool {
        self.on_stage_failure.as_deref() == Some("continue")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptFilesConfig {
    pub prompts_file: String,
    pub details_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub export_metrics: Option<bool>,
    pub metrics_file: Option<String>,
}

impl TaxonomyConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(TaxonomyError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 處理環境變數替換
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| TaxonomyError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${LLM_API_KEY})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").unwrap();

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        // 驗證 API 端點
        crate::utils::validation::validate_url("source.endpoint", &self.source.endpoint)?;

        crate::utils::validation::validate_non_empty_string("source.model", &self.source.model)?;

        // 驗證輸出路徑
        crate::utils::validation::validate_path("load.output_path", &self.load.output_path)?;

        // 執行順序裡只允許已知的階段
        for stage in &self.stages.execution_order {
            if !KNOWN_STAGES.contains(&stage.as_str()) {
                return Err(TaxonomyError::ConfigValidationError {
                    field: "stages.execution_order".to_string(),
                    message: format!(
                        "Unknown stage '{}'. Known stages: {}",
                        stage,
                        KNOWN_STAGES.join(", ")
                    ),
                });
            }
        }

        if self.stages.execution_order.is_empty() {
            return Err(TaxonomyError::ConfigValidationError {
                field: "stages.execution_order".to_string(),
                message: "At least one stage must be configured".to_string(),
            });
        }

        // 分塊大小必須為正
        if let Some(chunk_size) = self.stages.chunk_size {
            crate::utils::validation::validate_positive_number(
                "stages.chunk_size",
                chunk_size,
                1,
            )?;
        }

        // 失敗策略只有兩種
        if let Some(policy) = &self.stages.on_stage_failure {
            if policy != "stop" && policy != "continue" {
                return Err(TaxonomyError::InvalidConfigValueError {
                    field: "stages.on_stage_failure".to_string(),
                    value: policy.clone(),
                    reason: "Must be 'stop' or 'continue'".to_string(),
                });
            }
        }

        Ok(())
    }
}

impl Validate for TaxonomyConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
