use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaxonomyError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Workbook parsing error: {0}")]
    WorkbookError(#[from] calamine::XlsxError),

    #[error("XML parsing error: {0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("Configuration validation error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid config value for '{field}' ({value}): {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required config field: {field}")]
    MissingConfigError { field: String },

    #[error("Prompt error for stage '{stage}': {message}")]
    PromptError { stage: String, message: String },

    #[error("Extraction error in '{component}': {details}")]
    ExtractionError { component: String, details: String },

    #[error("Stage '{stage}' failed: {details}")]
    StageError { stage: String, details: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

/// 錯誤分類，用於日誌與統計
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Io,
    Parsing,
    Configuration,
    Processing,
}

/// 錯誤嚴重程度，決定 CLI 退出碼
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl TaxonomyError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            TaxonomyError::ApiError(_) => ErrorCategory::Network,
            TaxonomyError::IoError(_) | TaxonomyError::ZipError(_) => ErrorCategory::Io,
            TaxonomyError::CsvError(_)
            | TaxonomyError::SerializationError(_)
            | TaxonomyError::WorkbookError(_)
            | TaxonomyError::XmlError(_) => ErrorCategory::Parsing,
            TaxonomyError::ConfigValidationError { .. }
            | TaxonomyError::InvalidConfigValueError { .. }
            | TaxonomyError::MissingConfigError { .. }
            | TaxonomyError::PromptError { .. } => ErrorCategory::Configuration,
            TaxonomyError::ExtractionError { .. }
            | TaxonomyError::StageError { .. }
            | TaxonomyError::ProcessingError { .. }
            | TaxonomyError::ValidationError { .. } => ErrorCategory::Processing,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 網路錯誤通常可重試
            TaxonomyError::ApiError(_) => ErrorSeverity::Medium,
            // 單一檔案的解析問題不應中止整批處理
            TaxonomyError::WorkbookError(_)
            | TaxonomyError::XmlError(_)
            | TaxonomyError::CsvError(_)
            | TaxonomyError::ExtractionError { .. } => ErrorSeverity::Low,
            TaxonomyError::ConfigValidationError { .. }
            | TaxonomyError::InvalidConfigValueError { .. }
            | TaxonomyError::MissingConfigError { .. }
            | TaxonomyError::PromptError { .. } => ErrorSeverity::High,
            TaxonomyError::IoError(_) | TaxonomyError::ZipError(_) => ErrorSeverity::High,
            TaxonomyError::StageError { .. }
            | TaxonomyError::ProcessingError { .. }
            | TaxonomyError::ValidationError { .. }
            | TaxonomyError::SerializationError(_) => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            TaxonomyError::ApiError(_) => {
                "Check the API endpoint, network connectivity and the API key".to_string()
            }
            TaxonomyError::IoError(_) => {
                "Check that the input/output folders exist and are writable".to_string()
            }
            TaxonomyError::ZipError(_) | TaxonomyError::WorkbookError(_) => {
                "Make sure the file is a valid .xlsx/.xlsm workbook".to_string()
            }
            TaxonomyError::XmlError(_) => {
                "The workbook contains malformed XML parts; re-save it from a spreadsheet application".to_string()
            }
            TaxonomyError::ConfigValidationError { .. }
            | TaxonomyError::InvalidConfigValueError { .. }
            | TaxonomyError::MissingConfigError { .. } => {
                "Fix the configuration file and run again".to_string()
            }
            TaxonomyError::PromptError { stage, .. } => {
                format!("Check prompts.yaml contains a template for stage '{}'", stage)
            }
            TaxonomyError::StageError { .. } => {
                "Inspect the stage output files and re-run the failed stage".to_string()
            }
            _ => "Check the log output for details".to_string(),
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            TaxonomyError::ApiError(_) => "Could not reach the LLM API".to_string(),
            TaxonomyError::WorkbookError(_) | TaxonomyError::ZipError(_) => {
                "Could not read the workbook file".to_string()
            }
            TaxonomyError::ConfigValidationError { field, .. }
            | TaxonomyError::InvalidConfigValueError { field, .. }
            | TaxonomyError::MissingConfigError { field } => {
                format!("Configuration problem in '{}'", field)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TaxonomyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_mapping() {
        let err = TaxonomyError::MissingConfigError {
            field: "source.endpoint".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = TaxonomyError::ExtractionError {
            component: "charts".to_string(),
            details: "bad xml".to_string(),
        };
        // 抽取錯誤為低嚴重度，批次處理可以繼續
        assert_eq!(err.severity(), ErrorSeverity::Low);
    }

    #[test]
    fn test_user_friendly_message_for_config_errors() {
        let err = TaxonomyError::InvalidConfigValueError {
            field: "pipeline.chunk_size".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        };
        assert!(err.user_friendly_message().contains("pipeline.chunk_size"));
    }
}
