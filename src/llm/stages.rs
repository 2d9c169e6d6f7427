use crate::config::cli::LocalStorage;
use crate::config::prompts::{fill_placeholder, max_tokens_for_stage, PromptLibrary};
use crate::core::stage_sequence::{Stage, StageContext, StageResult};
use crate::core::Storage;
use crate::llm::client::ChatClient;
use crate::utils::error::{Result, TaxonomyError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 各階段共用的執行環境
#[derive(Clone)]
pub struct StageEnv {
    pub client: Arc<ChatClient>,
    pub prompts: Arc<PromptLibrary>,
    pub output_folder: PathBuf,
    storage: LocalStorage,
}

impl StageEnv {
    pub fn new(client: Arc<ChatClient>, prompts: Arc<PromptLibrary>, output_folder: PathBuf) -> Self {
        let storage = LocalStorage::new(output_folder.to_string_lossy().to_string());
        Self {
            client,
            prompts,
            output_folder,
            storage,
        }
    }

    /// 附加寫入階段輸出檔，回傳完整路徑
    async fn append_output(&self, filename: &str, content: &str) -> Result<String> {
        self.storage
            .append_file(filename, format!("{}\n", content).as_bytes())
            .await?;
        Ok(self.output_folder.join(filename).to_string_lossy().to_string())
    }

    /// 先查上下文，再退回讀取交接檔
    async fn stage_input(&self, context: &StageContext, stage_name: &str) -> Result<String> {
        if let Some(text) = context.stage_output_text(stage_name) {
            return Ok(text);
        }

        let filename = format!("{}.txt", stage_name);
        match self.storage.read_file(&filename).await {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).to_string()),
            Err(_) => Err(TaxonomyError::StageError {
                stage: stage_name.to_string(),
                details: format!(
                    "No output from stage '{}' (missing {})",
                    stage_name,
                    self.output_folder.join(filename).display()
                ),
            }),
        }
    }

    async fn complete_stage_prompt(&self, stage_name: &str, user_prompt: &str) -> Result<String> {
        self.client
            .complete(
                &self.prompts.system_prompt(),
                user_prompt,
                max_tokens_for_stage(stage_name),
            )
            .await
    }
}

/// 把階段輸出的文字拆回關鍵字列表：逗號或換行分隔，去空白、去重
pub fn parse_keywords(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut keywords = Vec::new();

    for raw in text.split(|c| c == ',' || c == '\n') {
        let keyword = raw.trim().trim_matches(|c| c == '"' || c == '\'');
        if keyword.is_empty() {
            continue;
        }
        if seen.insert(keyword.to_lowercase()) {
            keywords.push(keyword.to_string());
        }
    }

    keywords
}

/// 關鍵字分塊，codes 階段一塊送一個請求
pub fn chunk_keywords(keywords: &[String], chunk_size: usize) -> Vec<Vec<String>> {
    if chunk_size == 0 {
        return vec![keywords.to_vec()];
    }
    keywords
        .chunks(chunk_size)
        .map(|chunk| chunk.to_vec())
        .collect()
}

/// 截斷到字元邊界，帶進提示詞的資料樣本不能超過預算
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

fn read_data_sample(data_file: &Path, max_chars: usize) -> Result<String> {
    let content = std::fs::read_to_string(data_file)?;
    Ok(truncate_chars(&content, max_chars).to_string())
}

// ---------------------------------------------------------------------------
// keywords 階段：sheetjson -> 關鍵字列表
// 每份 sheetjson 一個請求，全部附加到同一份 keywords.txt
// ---------------------------------------------------------------------------

pub struct KeywordsStage {
    env: StageEnv,
    data_files: Vec<PathBuf>,
    max_data_chars: usize,
}

impl KeywordsStage {
    pub fn new(env: StageEnv, data_files: Vec<PathBuf>, max_data_chars: usize) -> Self {
        Self {
            env,
            data_files,
            max_data_chars,
        }
    }
}

#[async_trait::async_trait]
impl Stage for KeywordsStage {
    fn name(&self) -> &str {
        "keywords"
    }

    fn should_execute(&self, _context: &StageContext) -> bool {
        !self.data_files.is_empty()
    }

    async fn run(&self, _context: &StageContext) -> Result<StageResult> {
        let template = self.env.prompts.get_prompt("keywords")?;
        let mut responses = Vec::new();
        let mut output_path = String::new();

        for data_file in &self.data_files {
            tracing::info!("🔑 Creating keywords from {}", data_file.display());

            let data = match read_data_sample(data_file, self.max_data_chars) {
                Ok(data) => data,
                Err(e) => {
                    // 單份 sheetjson 讀不到就跳過，其餘照常
                    tracing::error!("❌ Cannot read {}: {}", data_file.display(), e);
                    continue;
                }
            };

            let prompt = fill_placeholder(&template, "data", &data);

            let response = self.env.complete_stage_prompt("keywords", &prompt).await?;
            output_path = self.env.append_output("keywords.txt", &response).await?;

            tracing::info!("🔑 Keywords: {}", response);
            responses.push(response);
        }

        if responses.is_empty() {
            return Err(TaxonomyError::StageError {
                stage: self.name().to_string(),
                details: "No sheetjson file could be read".to_string(),
            });
        }

        Ok(StageResult {
            stage_name: self.name().to_string(),
            output_path,
            call_count: responses.len(),
            responses,
            duration: std::time::Duration::default(),
        })
    }
}

// ---------------------------------------------------------------------------
// codes 階段：關鍵字分塊 -> codes
// ---------------------------------------------------------------------------

pub struct CodesStage {
    env: StageEnv,
    /// 提示詞裡附帶的資料樣本來源（通常是第一份 sheetjson）
    data_sample_file: Option<PathBuf>,
    chunk_size: usize,
    data_sample_chars: usize,
}

impl CodesStage {
    pub fn new(
        env: StageEnv,
        data_sample_file: Option<PathBuf>,
        chunk_size: usize,
        data_sample_chars: usize,
    ) -> Self {
        Self {
            env,
            data_sample_file,
            chunk_size,
            data_sample_chars,
        }
    }
}

#[async_trait::async_trait]
impl Stage for CodesStage {
    fn name(&self) -> &str {
        "codes"
    }

    async fn run(&self, context: &StageContext) -> Result<StageResult> {
        let keywords_text = self.env.stage_input(context, "keywords").await?;
        let keywords = parse_keywords(&keywords_text);

        if keywords.is_empty() {
            return Err(TaxonomyError::StageError {
                stage: self.name().to_string(),
                details: "Keywords stage produced no keywords".to_string(),
            });
        }

        let chunks = chunk_keywords(&keywords, self.chunk_size);
        let data_sample = match &self.data_sample_file {
            Some(file) => read_data_sample(file, self.data_sample_chars)?,
            None => String::new(),
        };

        tracing::info!(
            "🏷️ Creating codes from {} keywords in {} chunks",
            keywords.len(),
            chunks.len()
        );

        let template = self.env.prompts.get_prompt("codes")?;
        let mut responses = Vec::new();
        let mut output_path = String::new();

        for (index, chunk) in chunks.iter().enumerate() {
            let keywords_block = format!("{}\n", chunk.join("\n"));
            let data_block = format!("{}\n", data_sample);

            let prompt = fill_placeholder(&template, "keywords", &keywords_block);
            let prompt = fill_placeholder(&prompt, "data", &data_block);

            tracing::debug!("🏷️ Codes chunk {}/{}", index + 1, chunks.len());

            let response = self.env.complete_stage_prompt("codes", &prompt).await?;
            output_path = self.env.append_output("codes.txt", &response).await?;
            responses.push(response);
        }

        Ok(StageResult {
            stage_name: self.name().to_string(),
            output_path,
            call_count: responses.len(),
            responses,
            duration: std::time::Duration::default(),
        })
    }
}

// ---------------------------------------------------------------------------
// themes 階段：codes + 關鍵字樣本 -> 主題
// ---------------------------------------------------------------------------

pub struct ThemesStage {
    env: StageEnv,
    keyword_sample_size: usize,
}

impl ThemesStage {
    pub fn new(env: StageEnv, keyword_sample_size: usize) -> Self {
        Self {
            env,
            keyword_sample_size,
        }
    }
}

#[async_trait::async_trait]
impl Stage for ThemesStage {
    fn name(&self) -> &str {
        "themes"
    }

    async fn run(&self, context: &StageContext) -> Result<StageResult> {
        let codes = self.env.stage_input(context, "codes").await?;
        let keywords = parse_keywords(&self.env.stage_input(context, "keywords").await?);
        let keyword_sample: Vec<String> = keywords
            .into_iter()
            .take(self.keyword_sample_size)
            .collect();

        tracing::info!("🧵 Creating themes from codes");

        let prompt = self.env.prompts.get_prompt("themes")?;
        let prompt = fill_placeholder(&prompt, "codes", &format!("{}\n", codes));
        let prompt = fill_placeholder(&prompt, "keywords", &format!("{}\n", keyword_sample.join("\n")));

        let response = self.env.complete_stage_prompt("themes", &prompt).await?;
        let output_path = self.env.append_output("themes.txt", &response).await?;

        Ok(StageResult {
            stage_name: self.name().to_string(),
            output_path,
            call_count: 1,
            responses: vec![response],
            duration: std::time::Duration::default(),
        })
    }
}

// ---------------------------------------------------------------------------
// concepts / conceptual_model 階段：codes + keywords + themes -> 上層抽象
// 兩階段的輸入相同，只差提示詞與輸出檔
// ---------------------------------------------------------------------------

pub struct SynthesisStage {
    env: StageEnv,
    stage_name: &'static str,
    keyword_sample_size: usize,
}

impl SynthesisStage {
    pub fn concepts(env: StageEnv, keyword_sample_size: usize) -> Self {
        Self {
            env,
            stage_name: "concepts",
            keyword_sample_size,
        }
    }

    pub fn conceptual_model(env: StageEnv, keyword_sample_size: usize) -> Self {
        Self {
            env,
            stage_name: "conceptual_model",
            keyword_sample_size,
        }
    }
}

#[async_trait::async_trait]
impl Stage for SynthesisStage {
    fn name(&self) -> &str {
        self.stage_name
    }

    async fn run(&self, context: &StageContext) -> Result<StageResult> {
        let codes = self.env.stage_input(context, "codes").await?;
        let themes = self.env.stage_input(context, "themes").await?;
        let keywords = parse_keywords(&self.env.stage_input(context, "keywords").await?);
        let keyword_sample: Vec<String> = keywords
            .into_iter()
            .take(self.keyword_sample_size)
            .collect();

        tracing::info!("💡 Creating {} from themes and codes", self.stage_name);

        let prompt = self.env.prompts.get_prompt(self.stage_name)?;
        let prompt = fill_placeholder(&prompt, "codes", &format!("{}\n", codes));
        let prompt = fill_placeholder(&prompt, "themes", &format!("{}\n", themes));
        let prompt = fill_placeholder(&prompt, "keywords", &format!("{}\n", keyword_sample.join("\n")));

        let response = self
            .env
            .complete_stage_prompt(self.stage_name, &prompt)
            .await?;
        let output_path = self
            .env
            .append_output(&format!("{}.txt", self.stage_name), &response)
            .await?;

        Ok(StageResult {
            stage_name: self.stage_name.to_string(),
            output_path,
            call_count: 1,
            responses: vec![response],
            duration: std::time::Duration::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keywords_splits_and_dedupes() {
        let text = "solar, wind,\ntidal\nsolar , , Wind";
        let keywords = parse_keywords(text);
        // 大小寫視為同一關鍵字，保留先出現者
        assert_eq!(keywords, vec!["solar", "wind", "tidal"]);
    }

    #[test]
    fn test_parse_keywords_strips_quotes() {
        let keywords = parse_keywords("\"community energy\", 'grid'");
        assert_eq!(keywords, vec!["community energy", "grid"]);
    }

    #[test]
    fn test_chunk_keywords() {
        let keywords: Vec<String> = (0..95).map(|i| format!("kw{}", i)).collect();
        let chunks = chunk_keywords(&keywords, 40);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 40);
        assert_eq!(chunks[1].len(), 40);
        assert_eq!(chunks[2].len(), 15);

        // chunk_size 0 視為不分塊
        assert_eq!(chunk_keywords(&keywords, 0).len(), 1);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello", 3), "hel");
        // 多位元組字元不能切在位元組中間
        assert_eq!(truncate_chars("風力發電", 2), "風力");
    }
}
