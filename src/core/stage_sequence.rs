use crate::utils::error::{Result, TaxonomyError};
use crate::utils::monitor::SystemMonitor;
use std::collections::HashMap;
use std::time::Instant;

/// 階段執行結果
#[derive(Debug, Clone)]
pub struct StageResult {
    pub stage_name: String,
    /// 這一階段附加寫入的輸出檔
    pub output_path: String,
    /// 本階段送出的 API 呼叫數（codes 階段分塊時會大於 1）
    pub call_count: usize,
    /// 本階段收到的回應內容
    pub responses: Vec<String>,
    pub duration: std::time::Duration,
}

/// 階段執行上下文，用於在階段間傳遞前面產生的輸出
///
/// 檔案是正式的交接機制（下一階段重讀上一階段的 .txt），
/// 上下文只是同一次執行內免去重讀的捷徑。
#[derive(Debug, Clone, Default)]
pub struct StageContext {
    pub previous_results: Vec<StageResult>,
    pub shared_data: HashMap<String, serde_json::Value>,
    pub execution_id: String,
}

impl StageContext {
    pub fn new(execution_id: String) -> Self {
        Self {
            previous_results: Vec::new(),
            shared_data: HashMap::new(),
            execution_id,
        }
    }

    /// 獲取上一個階段的結果
    pub fn get_previous_result(&self) -> Option<&StageResult> {
        self.previous_results.last()
    }

    /// 獲取指定名稱的階段結果
    pub fn get_result_by_name(&self, name: &str) -> Option<&StageResult> {
        self.previous_results.iter().find(|r| r.stage_name == name)
    }

    /// 指定階段的全部回應內容，合併成一段文字
    pub fn stage_output_text(&self, name: &str) -> Option<String> {
        self.get_result_by_name(name)
            .map(|r| r.responses.join("\n"))
    }

    /// 添加共享數據
    pub fn add_shared_data(&mut self, key: String, value: serde_json::Value) {
        self.shared_data.insert(key, value);
    }

    /// 獲取共享數據
    pub fn get_shared_data(&self, key: &str) -> Option<&serde_json::Value> {
        self.shared_data.get(key)
    }

    /// 添加結果到上下文
    pub fn add_result(&mut self, result: StageResult) {
        self.previous_results.push(result);
    }
}

/// 帶上下文的分析階段介面
#[async_trait::async_trait]
pub trait Stage: Send + Sync {
    /// 用於標識階段名稱（同時是輸出檔的主檔名）
    fn name(&self) -> &str;

    /// 執行階段：組提示、呼叫 API、附加寫入輸出檔
    async fn run(&self, context: &StageContext) -> Result<StageResult>;

    /// 根據上下文決定是否執行
    fn should_execute(&self, _context: &StageContext) -> bool {
        true
    }
}

/// 階段序列，負責順序執行各分析階段
pub struct StageSequence {
    stages: Vec<Box<dyn Stage>>,
    monitor: Option<SystemMonitor>,
    monitor_enabled: bool,
    execution_id: String,
    /// 階段之間的固定等待秒數
    sleep_between_seconds: u64,
    /// 單一階段失敗時是否繼續執行後續階段
    continue_on_failure: bool,
}

impl StageSequence {
    pub fn new(execution_id: String) -> Self {
        Self {
            stages: Vec::new(),
            monitor: None,
            monitor_enabled: false,
            execution_id,
            sleep_between_seconds: 0,
            continue_on_failure: false,
        }
    }

    /// 啟用或禁用系統監控
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor_enabled = enabled;
        if enabled {
            self.monitor = Some(SystemMonitor::new(enabled));
        }
        self
    }

    pub fn with_sleep_between(mut self, seconds: u64) -> Self {
        self.sleep_between_seconds = seconds;
        self
    }

    pub fn with_continue_on_failure(mut self, enabled: bool) -> Self {
        self.continue_on_failure = enabled;
        self
    }

    /// 添加階段
    pub fn add_stage(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// 依序執行所有階段
    pub async fn execute_all(&mut self) -> Result<Vec<StageResult>> {
        let mut results = Vec::new();
        let mut context = StageContext::new(self.execution_id.clone());

        if self.monitor_enabled {
            if let Some(monitor) = &self.monitor {
                monitor.log_stats("Stage sequence started.");
            }
        }

        for (index, stage) in self.stages.iter().enumerate() {
            // 根據上下文決定是否執行
            if !stage.should_execute(&context) {
                tracing::info!("⏭️ Skipping stage: {} (condition not met)", stage.name());
                continue;
            }

            // 階段之間固定等待，避免打爆上游的速率限制
            if index > 0 && self.sleep_between_seconds > 0 {
                tracing::info!(
                    "⏳ Sleeping {}s before stage '{}'",
                    self.sleep_between_seconds,
                    stage.name()
                );
                tokio::time::sleep(std::time::Duration::from_secs(self.sleep_between_seconds))
                    .await;
            }

            let start_time = Instant::now();

            match stage.run(&context).await {
                Ok(mut result) => {
                    result.duration = start_time.elapsed();

                    tracing::info!(
                        "✅ Stage executed: {} (calls: {}, duration: {:?})",
                        result.stage_name,
                        result.call_count,
                        result.duration
                    );

                    // 將結果添加到上下文
                    context.add_result(result.clone());
                    results.push(result);
                }
                Err(e) => {
                    tracing::error!("❌ Stage '{}' failed: {}", stage.name(), e);

                    if self.continue_on_failure {
                        tracing::warn!("⚠️ Continuing despite failure (configured behavior)");
                        continue;
                    }

                    return Err(TaxonomyError::StageError {
                        stage: stage.name().to_string(),
                        details: format!("Stage execution failed: {}", e),
                    });
                }
            }
        }

        if self.monitor_enabled {
            if let Some(monitor) = &self.monitor {
                monitor.log_stats("Stage sequence completed.");
            }
        }

        Ok(results)
    }

    /// 獲取執行摘要
    pub fn get_execution_summary(results: &[StageResult]) -> HashMap<String, serde_json::Value> {
        let mut summary = HashMap::new();

        let total_stages = results.len();
        let total_calls: usize = results.iter().map(|r| r.call_count).sum();
        let total_duration: std::time::Duration = results.iter().map(|r| r.duration).sum();

        summary.insert(
            "total_stages".to_string(),
            serde_json::Value::Number(total_stages.into()),
        );
        summary.insert(
            "total_api_calls".to_string(),
            serde_json::Value::Number(total_calls.into()),
        );
        summary.insert(
            "total_duration_ms".to_string(),
            serde_json::Value::Number((total_duration.as_millis() as u64).into()),
        );

        let stage_names: Vec<serde_json::Value> = results
            .iter()
            .map(|r| serde_json::Value::String(r.stage_name.clone()))
            .collect();
        summary.insert(
            "executed_stages".to_string(),
            serde_json::Value::Array(stage_names),
        );

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockStage {
        name: String,
        should_execute: bool,
        responses: Vec<String>,
        fail: bool,
        use_previous_output: bool,
    }

    impl MockStage {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                should_execute: true,
                responses: vec![format!("{} output", name)],
                fail: false,
                use_previous_output: false,
            }
        }

        fn with_execution_condition(mut self, should_execute: bool) -> Self {
            self.should_execute = should_execute;
            self
        }

        fn with_failure(mut self) -> Self {
            self.fail = true;
            self
        }

        fn with_previous_output(mut self) -> Self {
            self.use_previous_output = true;
            self
        }
    }

    #[async_trait::async_trait]
    impl Stage for MockStage {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(&self, context: &StageContext) -> Result<StageResult> {
            if self.fail {
                return Err(TaxonomyError::ProcessingError {
                    message: "mock failure".to_string(),
                });
            }

            let responses = if self.use_previous_output {
                // 把上一階段的輸出當自己的輸入
                let previous = context
                    .get_previous_result()
                    .map(|r| r.responses.join("|"))
                    .unwrap_or_default();
                vec![format!("based on: {}", previous)]
            } else {
                self.responses.clone()
            };

            Ok(StageResult {
                stage_name: self.name.clone(),
                output_path: format!("/tmp/{}.txt", self.name),
                call_count: responses.len(),
                responses,
                duration: std::time::Duration::default(),
            })
        }

        fn should_execute(&self, _context: &StageContext) -> bool {
            self.should_execute
        }
    }

    #[tokio::test]
    async fn test_stage_sequence_execution() {
        let mut sequence = StageSequence::new("test_run".to_string());
        sequence.add_stage(Box::new(MockStage::new("keywords")));
        sequence.add_stage(Box::new(MockStage::new("codes").with_previous_output()));

        let results = sequence.execute_all().await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].stage_name, "keywords");
        assert_eq!(results[1].stage_name, "codes");
        // 第二階段看得到第一階段的輸出
        assert_eq!(results[1].responses[0], "based on: keywords output");
    }

    #[tokio::test]
    async fn test_stage_sequence_conditional_execution() {
        let mut sequence = StageSequence::new("conditional_test".to_string());
        sequence.add_stage(Box::new(MockStage::new("keywords")));
        sequence.add_stage(Box::new(
            MockStage::new("codes").with_execution_condition(false),
        ));
        sequence.add_stage(Box::new(MockStage::new("themes")));

        let results = sequence.execute_all().await.unwrap();

        // 只有 keywords 和 themes 執行
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].stage_name, "keywords");
        assert_eq!(results[1].stage_name, "themes");
    }

    #[tokio::test]
    async fn test_stage_sequence_stops_on_failure() {
        let mut sequence = StageSequence::new("failure_test".to_string());
        sequence.add_stage(Box::new(MockStage::new("keywords")));
        sequence.add_stage(Box::new(MockStage::new("codes").with_failure()));
        sequence.add_stage(Box::new(MockStage::new("themes")));

        let result = sequence.execute_all().await;
        assert!(matches!(result, Err(TaxonomyError::StageError { .. })));
    }

    #[tokio::test]
    async fn test_stage_sequence_continues_on_failure() {
        let mut sequence =
            StageSequence::new("continue_test".to_string()).with_continue_on_failure(true);
        sequence.add_stage(Box::new(MockStage::new("keywords")));
        sequence.add_stage(Box::new(MockStage::new("codes").with_failure()));
        sequence.add_stage(Box::new(MockStage::new("themes")));

        let results = sequence.execute_all().await.unwrap();

        // codes 失敗但 themes 仍執行
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].stage_name, "themes");
    }

    #[tokio::test]
    async fn test_execution_summary() {
        let results = vec![
            StageResult {
                stage_name: "keywords".to_string(),
                output_path: "/tmp/keywords.txt".to_string(),
                call_count: 1,
                responses: vec!["a, b".to_string()],
                duration: std::time::Duration::from_millis(100),
            },
            StageResult {
                stage_name: "codes".to_string(),
                output_path: "/tmp/codes.txt".to_string(),
                call_count: 3,
                responses: vec!["c1".to_string(), "c2".to_string(), "c3".to_string()],
                duration: std::time::Duration::from_millis(200),
            },
        ];

        let summary = StageSequence::get_execution_summary(&results);

        assert_eq!(
            summary.get("total_stages").unwrap(),
            &serde_json::Value::Number(2.into())
        );
        assert_eq!(
            summary.get("total_api_calls").unwrap(),
            &serde_json::Value::Number(4.into())
        );
        assert_eq!(
            summary.get("total_duration_ms").unwrap(),
            &serde_json::Value::Number(300.into())
        );
    }

    #[test]
    fn test_stage_context_lookup() {
        let mut context = StageContext::new("test".to_string());

        context.add_result(StageResult {
            stage_name: "keywords".to_string(),
            output_path: "/tmp/keywords.txt".to_string(),
            call_count: 1,
            responses: vec!["solar".to_string(), "wind".to_string()],
            duration: std::time::Duration::default(),
        });

        assert!(context.get_result_by_name("keywords").is_some());
        assert!(context.get_result_by_name("codes").is_none());
        assert_eq!(
            context.stage_output_text("keywords").unwrap(),
            "solar\nwind"
        );
        assert_eq!(
            context.get_previous_result().unwrap().stage_name,
            "keywords"
        );
    }
}
