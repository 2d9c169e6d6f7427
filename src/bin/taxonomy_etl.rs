use clap::Parser;
use sheet_taxonomy::config::prompts::PromptLibrary;
use sheet_taxonomy::config::stage_config::TaxonomyConfig;
use sheet_taxonomy::core::stage_sequence::{StageResult, StageSequence};
use sheet_taxonomy::llm::stages::{CodesStage, KeywordsStage, StageEnv, SynthesisStage, ThemesStage};
use sheet_taxonomy::llm::ChatClient;
use sheet_taxonomy::utils::logger;
use sheet_taxonomy::utils::validation::Validate;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "taxonomy-etl")]
#[command(about = "Run the LLM taxonomy stage sequence over extracted spreadsheet data")]
struct Args {
    /// Path to pipeline configuration file
    #[arg(short, long, default_value = "taxonomy-config.toml")]
    config: String,

    /// Folder containing per-spreadsheet extraction output (sheetjson.json per subfolder)
    #[arg(short, long, default_value = "spreadsheet_data")]
    data_folder: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Dry run - show execution plan without calling the API
    #[arg(long)]
    dry_run: bool,

    /// Execution ID for this run
    #[arg(long)]
    execution_id: Option<String>,

    /// Execute only specific stages (comma-separated)
    #[arg(long)]
    only: Option<String>,

    /// Skip specific stages (comma-separated)
    #[arg(long)]
    skip: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 初始化日誌
    logger::init_cli_logger(args.verbose);

    tracing::info!("🚀 Starting taxonomy stage sequence");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    // 載入配置
    let config = match TaxonomyConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");

    // 收集每份試算表的 sheetjson
    let data_files = collect_sheetjson_files(&args.data_folder);
    if data_files.is_empty() {
        eprintln!(
            "❌ No sheetjson.json files found under '{}'",
            args.data_folder
        );
        eprintln!("💡 Run the extraction tool first");
        std::process::exit(1);
    }

    // 生成執行 ID
    let execution_id = args
        .execution_id
        .clone()
        .unwrap_or_else(|| format!("taxo_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S")));

    let stages_to_run = determine_stages_to_run(&config, &args);

    display_sequence_summary(&config, &args, &execution_id, &data_files, &stages_to_run);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No API calls will be made");
        println!("✅ Dry run analysis complete.");
        return Ok(());
    }

    // 載入提示詞庫
    let prompts = match PromptLibrary::load(&config.prompts.prompts_file, &config.prompts.details_file)
    {
        Ok(prompts) => Arc::new(prompts),
        Err(e) => {
            eprintln!("❌ Failed to load prompt files: {}", e);
            std::process::exit(1);
        }
    };

    // 決定監控設定
    let monitor_enabled = args.monitor.unwrap_or_else(|| {
        config
            .monitoring
            .as_ref()
            .map(|m| m.enabled)
            .unwrap_or(false)
    });

    // 組裝序列
    let client = Arc::new(ChatClient::new(config.source.clone()));
    let output_folder = PathBuf::from(&config.load.output_path);
    let env = StageEnv::new(client, prompts, output_folder);

    let mut sequence = StageSequence::new(execution_id.clone())
        .with_monitoring(monitor_enabled)
        .with_sleep_between(config.stages.sleep_between_seconds())
        .with_continue_on_failure(config.stages.continue_on_failure());

    for stage_name in &stages_to_run {
        match stage_name.as_str() {
            "keywords" => sequence.add_stage(Box::new(KeywordsStage::new(
                env.clone(),
                data_files.clone(),
                config.stages.max_data_chars(),
            ))),
            "codes" => sequence.add_stage(Box::new(CodesStage::new(
                env.clone(),
                data_files.first().cloned(),
                config.stages.chunk_size(),
                config.stages.data_sample_chars(),
            ))),
            "themes" => sequence.add_stage(Box::new(ThemesStage::new(
                env.clone(),
                config.stages.chunk_size(),
            ))),
            "concepts" => sequence.add_stage(Box::new(SynthesisStage::concepts(
                env.clone(),
                config.stages.chunk_size(),
            ))),
            "conceptual_model" => sequence.add_stage(Box::new(SynthesisStage::conceptual_model(
                env.clone(),
                config.stages.chunk_size(),
            ))),
            other => tracing::warn!("⏭️ Unknown stage in execution order: {}", other),
        }
    }

    // 執行序列
    tracing::info!("🎬 Starting stage sequence execution");
    match sequence.execute_all().await {
        Ok(results) => {
            tracing::info!("🎉 Stage sequence completed successfully!");

            display_execution_results(&results, &execution_id);

            // 匯出執行摘要
            if let Some(monitoring) = &config.monitoring {
                if monitoring.export_metrics.unwrap_or(false) {
                    export_execution_metrics(&results, &execution_id, monitoring).await?;
                }
            }

            println!("✅ Stage sequence completed successfully!");
            println!("🆔 Execution ID: {}", execution_id);
            println!("📊 Stages executed: {}", results.len());
        }
        Err(e) => {
            tracing::error!("❌ Stage sequence failed: {}", e);
            eprintln!("❌ Stage sequence failed: {}", e);
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(1);
        }
    }

    Ok(())
}

/// 每個子資料夾找一份 sheetjson.json
fn collect_sheetjson_files(data_folder: &str) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let Ok(entries) = std::fs::read_dir(data_folder) else {
        return files;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let sheetjson = path.join("sheetjson.json");
            if sheetjson.is_file() {
                files.push(sheetjson);
            }
        }
    }

    files.sort();
    files
}

fn determine_stages_to_run(config: &TaxonomyConfig, args: &Args) -> Vec<String> {
    let mut stages = config.stages.execution_order.clone();

    // 處理 --only 參數
    if let Some(only_list) = &args.only {
        let only_names: std::collections::HashSet<&str> =
            only_list.split(',').map(|s| s.trim()).collect();
        stages.retain(|s| only_names.contains(s.as_str()));
    }

    // 處理 --skip 參數
    if let Some(skip_list) = &args.skip {
        let skip_names: std::collections::HashSet<&str> =
            skip_list.split(',').map(|s| s.trim()).collect();
        stages.retain(|s| !skip_names.contains(s.as_str()));
    }

    stages
}

fn display_sequence_summary(
    config: &TaxonomyConfig,
    args: &Args,
    execution_id: &str,
    data_files: &[PathBuf],
    stages: &[String],
) {
    println!("📋 Taxonomy Stage Sequence Summary:");
    println!(
        "  Name: {} v{}",
        config.pipeline.name, config.pipeline.version
    );
    println!("  Description: {}", config.pipeline.description);
    println!("  Execution ID: {}", execution_id);
    println!("  Model: {}", config.source.qualified_model());
    println!("  Spreadsheets: {}", data_files.len());
    println!("  Output: {}", config.load.output_path);

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    if let Some(only) = &args.only {
        println!("  🎯 Only executing: {}", only);
    }

    if let Some(skip) = &args.skip {
        println!("  ⏭️ Skipping: {}", skip);
    }

    println!();
    println!("📝 Execution Order:");
    for (index, stage_name) in stages.iter().enumerate() {
        println!("  {}. {} -> {}.txt", index + 1, stage_name, stage_name);
    }

    if config.stages.sleep_between_seconds() > 0 {
        println!(
            "  ⏳ {}s sleep between stages",
            config.stages.sleep_between_seconds()
        );
    }
    println!();
}

fn display_execution_results(results: &[StageResult], execution_id: &str) {
    println!();
    println!("📊 Execution Results Summary:");
    println!("  Execution ID: {}", execution_id);
    println!("  Completed Stages: {}", results.len());

    let total_calls: usize = results.iter().map(|r| r.call_count).sum();
    let total_duration: std::time::Duration = results.iter().map(|r| r.duration).sum();

    println!("  Total API Calls: {}", total_calls);
    println!("  Total Execution Time: {:?}", total_duration);
    println!();

    println!("📝 Stage Details:");
    for (index, result) in results.iter().enumerate() {
        println!(
            "  {}. {} - {} call(s) in {:?}",
            index + 1,
            result.stage_name,
            result.call_count,
            result.duration
        );
        println!("     Output: {}", result.output_path);
    }
    println!();
}

async fn export_execution_metrics(
    results: &[StageResult],
    execution_id: &str,
    monitoring_config: &sheet_taxonomy::config::stage_config::MonitoringConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let metrics_file = monitoring_config
        .metrics_file
        .as_deref()
        .unwrap_or("taxonomy_metrics.json");

    let mut metrics = HashMap::new();
    metrics.insert(
        "execution_id",
        serde_json::Value::String(execution_id.to_string()),
    );
    metrics.insert(
        "timestamp",
        serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
    );

    let summary = StageSequence::get_execution_summary(results);
    metrics.insert(
        "summary",
        serde_json::Value::Object(summary.into_iter().collect()),
    );

    let stage_metrics: Vec<serde_json::Value> = results
        .iter()
        .map(|result| {
            let mut stage_data = HashMap::new();
            stage_data.insert(
                "name".to_string(),
                serde_json::Value::String(result.stage_name.clone()),
            );
            stage_data.insert(
                "call_count".to_string(),
                serde_json::Value::Number(result.call_count.into()),
            );
            stage_data.insert(
                "duration_ms".to_string(),
                serde_json::Value::Number((result.duration.as_millis() as u64).into()),
            );
            stage_data.insert(
                "output_path".to_string(),
                serde_json::Value::String(result.output_path.clone()),
            );

            serde_json::Value::Object(stage_data.into_iter().collect())
        })
        .collect();

    metrics.insert("stages", serde_json::Value::Array(stage_metrics));

    let metrics_json = serde_json::to_string_pretty(&metrics)?;
    tokio::fs::write(metrics_file, metrics_json).await?;

    tracing::info!("📊 Execution metrics exported to: {}", metrics_file);
    println!("📊 Metrics exported to: {}", metrics_file);

    Ok(())
}
