use clap::Parser;
use sheet_taxonomy::utils::{logger, validation::Validate};
use sheet_taxonomy::{CliConfig, ExtractionEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CliConfig::parse();

    // 初始化日誌
    logger::init_cli_logger(config.verbose);

    tracing::info!("Starting sheet-taxonomy extraction");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let monitor_enabled = config.monitor;
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    // 創建抽取引擎並運行
    let engine = ExtractionEngine::new_with_monitoring(config, monitor_enabled);

    match engine.run().await {
        Ok(summary) => {
            tracing::info!("✅ Extraction completed successfully!");
            tracing::info!(
                "📊 {} processed, {} failed (success rate {:.1}%)",
                summary.processed_successfully,
                summary.failed_processing,
                summary.success_rate * 100.0
            );
            println!("✅ Extraction completed successfully!");
            println!("📁 Output saved to: {}", summary.output_folder);

            if summary.failed_processing > 0 {
                println!(
                    "⚠️ {} file(s) failed, see the log for details",
                    summary.failed_processing
                );
            }
        }
        Err(e) => {
            // 記錄詳細錯誤信息
            tracing::error!(
                "❌ Extraction failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            // 輸出用戶友好的錯誤信息
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            let exit_code = match e.severity() {
                sheet_taxonomy::utils::error::ErrorSeverity::Low => 0,
                sheet_taxonomy::utils::error::ErrorSeverity::Medium => 2,
                sheet_taxonomy::utils::error::ErrorSeverity::High => 1,
                sheet_taxonomy::utils::error::ErrorSeverity::Critical => 3,
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}
