use crate::utils::error::{Result, TaxonomyError};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

/// 各階段的 max_tokens 預算
///
/// 後段的輸出越長，太小的預算會把 concepts / conceptual model 截斷。
pub fn max_tokens_for_stage(stage: &str) -> u32 {
    match stage {
        "keywords" => 1000,         // 逗號分隔的關鍵字列表，要求精簡
        "codes" => 2000,            // 多個 code 加上相關關鍵字
        "themes" => 2000,           // 主題加上相關 codes
        "concepts" => 3000,         // 概念定義，內容較長
        "conceptual_model" => 4000, // 完整模型描述，最長
        "system" => 500,
        _ => 2000,
    }
}

/// 提示詞庫：prompts.yaml 的模板 + prompt_details.yaml 的佔位符值
///
/// 模板裡的 [key] 先從 details 填入；執行期資料佔位符
/// （[data]、[keywords]、[codes]、[themes]）由各階段呼叫時再替換。
pub struct PromptLibrary {
    prompts: HashMap<String, String>,
    details: HashMap<String, String>,
    placeholder_re: Regex,
}

impl PromptLibrary {
    pub fn load<P: AsRef<Path>>(prompts_path: P, details_path: P) -> Result<Self> {
        let prompts_yaml = std::fs::read_to_string(&prompts_path)?;
        let details_yaml = match std::fs::read_to_string(&details_path) {
            Ok(content) => content,
            // details 檔可有可無
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(TaxonomyError::IoError(e)),
        };
        Self::from_yaml_str(&prompts_yaml, &details_yaml)
    }

    pub fn from_yaml_str(prompts_yaml: &str, details_yaml: &str) -> Result<Self> {
        let prompts: HashMap<String, String> =
            serde_saphyr::from_str(prompts_yaml).map_err(|e| TaxonomyError::PromptError {
                stage: "prompts.yaml".to_string(),
                message: format!("YAML parsing error: {}", e),
            })?;

        let details: HashMap<String, String> = if details_yaml.trim().is_empty() {
            HashMap::new()
        } else {
            serde_saphyr::from_str(details_yaml).map_err(|e| TaxonomyError::PromptError {
                stage: "prompt_details.yaml".to_string(),
                message: format!("YAML parsing error: {}", e),
            })?
        };

        Ok(Self {
            prompts,
            details,
            placeholder_re: Regex::new(r"\[([^\]]+)\]").unwrap(),
        })
    }

    /// 取出指定階段的提示詞，並填入 details 的佔位符
    ///
    /// details 裡沒有的 [key] 原樣保留，交給階段在執行期替換。
    pub fn get_prompt(&self, stage: &str) -> Result<String> {
        let template = self
            .prompts
            .get(stage)
            .ok_or_else(|| TaxonomyError::PromptError {
                stage: stage.to_string(),
                message: "Prompt not found".to_string(),
            })?;

        let filled = self
            .placeholder_re
            .replace_all(template, |caps: &regex::Captures| {
                let key = &caps[1];
                self.details
                    .get(key)
                    .cloned()
                    .unwrap_or_else(|| format!("[{}]", key))
            });

        Ok(filled.to_string())
    }

    /// 系統提示詞，沒有設定時退回預設句
    pub fn system_prompt(&self) -> String {
        self.get_prompt("system")
            .unwrap_or_else(|_| "You are a qualitative analysis assistant.".to_string())
    }

    pub fn has_prompt(&self, stage: &str) -> bool {
        self.prompts.contains_key(stage)
    }
}

/// 執行期資料佔位符的替換（[data]、[keywords] 等）
pub fn fill_placeholder(prompt: &str, key: &str, value: &str) -> String {
    prompt.replace(&format!("[{}]", key), value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROMPTS_YAML: &str = r#"
system: "You are analysing spreadsheets about [domain]."
keywords: "Extract keywords from the following data:\n[data]"
codes: "Group these keywords into codes for [domain]:\n[keywords]\nData sample:\n[data]"
"#;

    const DETAILS_YAML: &str = r#"
domain: "community energy projects"
"#;

    #[test]
    fn test_get_prompt_fills_details() {
        let library = PromptLibrary::from_yaml_str(PROMPTS_YAML, DETAILS_YAML).unwrap();

        let system = library.get_prompt("system").unwrap();
        assert_eq!(
            system,
            "You are analysing spreadsheets about community energy projects."
        );

        // 執行期佔位符原樣保留
        let keywords = library.get_prompt("keywords").unwrap();
        assert!(keywords.contains("[data]"));

        let codes = library.get_prompt("codes").unwrap();
        assert!(codes.contains("community energy projects"));
        assert!(codes.contains("[keywords]"));
    }

    #[test]
    fn test_missing_prompt_is_error() {
        let library = PromptLibrary::from_yaml_str(PROMPTS_YAML, DETAILS_YAML).unwrap();
        assert!(library.get_prompt("themes").is_err());
    }

    #[test]
    fn test_missing_details_file_is_ok() {
        let library = PromptLibrary::from_yaml_str(PROMPTS_YAML, "").unwrap();
        let system = library.get_prompt("system").unwrap();
        // details 缺漏時佔位符保留
        assert!(system.contains("[domain]"));
    }

    #[test]
    fn test_fill_placeholder() {
        let filled = fill_placeholder("keywords:\n[keywords]\n", "keywords", "solar\nwind");
        assert_eq!(filled, "keywords:\nsolar\nwind\n");
    }

    #[test]
    fn test_max_tokens_for_stage() {
        assert_eq!(max_tokens_for_stage("keywords"), 1000);
        // concepts 與 conceptual_model 需要足夠的預算避免截斷
        assert!(max_tokens_for_stage("concepts") >= 3000);
        assert!(max_tokens_for_stage("conceptual_model") >= 4000);
        assert_eq!(max_tokens_for_stage("unknown_stage"), 2000);
    }
}
