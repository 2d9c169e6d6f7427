use crate::analyze::WorkbookAnalyzer;
use crate::domain::model::{
    BatchSummary, ComponentCounts, ExtractionSummary, WorkbookInfo, WorkbookJson,
};
use crate::domain::ports::ConfigProvider;
use crate::extract::{charts, hyperlinks, images, macros, metadata, prune, sheet_data, styles};
use crate::extract::{WorkbookArchive, WorkbookWalker};
use crate::utils::error::{Result, TaxonomyError};
use crate::utils::monitor::SystemMonitor;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

/// 批次抽取引擎
///
/// 走訪輸入資料夾的每份工作簿，逐檔抽取再分析。
/// 單一檔案失敗記錄後繼續，整批最後產出 batch_summary.json。
pub struct ExtractionEngine<C: ConfigProvider> {
    config: C,
    monitor: Option<SystemMonitor>,
}

impl<C: ConfigProvider> ExtractionEngine<C> {
    pub fn new(config: C) -> Self {
        Self {
            config,
            monitor: None,
        }
    }

    pub fn new_with_monitoring(config: C, monitor_enabled: bool) -> Self {
        Self {
            config,
            monitor: monitor_enabled.then(|| SystemMonitor::new(true)),
        }
    }

    /// 處理輸入資料夾內的所有工作簿
    pub async fn run(&self) -> Result<BatchSummary> {
        let input_folder = Path::new(self.config.input_folder());
        let output_folder = PathBuf::from(self.config.output_folder());
        std::fs::create_dir_all(&output_folder)?;

        let workbook_files = collect_workbook_files(input_folder)?;

        if workbook_files.is_empty() {
            tracing::warn!(
                "📭 No workbook files found in {}",
                input_folder.display()
            );
        } else {
            tracing::info!("📚 Found {} workbook files to process", workbook_files.len());
        }

        let mut processed_files = Vec::new();
        let mut failed_files = Vec::new();

        for file in &workbook_files {
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            tracing::info!("📖 Processing: {}", file_name);

            if let Some(monitor) = &self.monitor {
                monitor.log_stats(&format!("Before {}", file_name));
            }

            match self.process_file(file, &output_folder) {
                Ok(summary) => {
                    tracing::info!(
                        "✅ Extracted {} formulas, {} images, {} charts from {} sheets",
                        summary.extracted_components.formulas,
                        summary.extracted_components.images,
                        summary.extracted_components.charts,
                        summary.workbook_info.sheet_count
                    );
                    processed_files.push(file_name);
                }
                Err(e) => {
                    // 單檔失敗不中止整批
                    tracing::error!("❌ Failed to process {}: {}", file_name, e);
                    failed_files.push(file_name);
                }
            }
        }

        if let Some(monitor) = &self.monitor {
            monitor.log_final_stats();
        }

        let total = processed_files.len() + failed_files.len();
        let summary = BatchSummary {
            processing_timestamp: chrono::Utc::now().to_rfc3339(),
            total_files: total,
            processed_successfully: processed_files.len(),
            failed_processing: failed_files.len(),
            success_rate: if total > 0 {
                processed_files.len() as f64 / total as f64
            } else {
                0.0
            },
            processed_files,
            failed_files,
            output_folder: output_folder.to_string_lossy().to_string(),
        };

        std::fs::write(
            output_folder.join("batch_summary.json"),
            serde_json::to_string_pretty(&summary)?,
        )?;

        Ok(summary)
    }

    /// 處理單一工作簿：抽取全部結構，再跑指標分析
    fn process_file(&self, file: &Path, output_folder: &Path) -> Result<ExtractionSummary> {
        let file_stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| TaxonomyError::ProcessingError {
                message: format!("Invalid file name: {}", file.display()),
            })?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let output_dir = output_folder.join(&file_stem);
        std::fs::create_dir_all(&output_dir)?;

        let archive = WorkbookArchive::open(file)?;
        let mut walker = WorkbookWalker::from_bytes(archive.bytes().to_vec())?;

        // 1. sheetjson：核心走訪 + 各來源併入 + 格式剝除
        let sheetjson = self.build_sheetjson(&archive, &mut walker, &output_dir)?;

        // 2. 每張工作表的 CSV / JSON 轉存
        sheet_data::extract_sheet_data(&mut walker, &output_dir)?;

        // 3. 公式清單
        let formula_count = self.write_formulas(&mut walker, &output_dir)?;

        // 4. 樣式
        let styled_cell_count = self.write_styles(&archive, &output_dir)?;

        // 5. 嵌入圖片
        let image_infos = self.extract_images_logged(&archive, &output_dir);

        // 6. 圖表結構
        let chart_count = self.write_charts(&archive, &output_dir)?;

        // 7. VBA 巨集
        let macros_info = macros::extract_macros(&archive, &output_dir)?;
        std::fs::create_dir_all(output_dir.join("macros"))?;
        std::fs::write(
            output_dir.join("macros").join("macros_info.json"),
            serde_json::to_string_pretty(&macros_info)?,
        )?;

        // 8. 文件屬性
        let sheet_names = walker.sheet_names();
        let defined_names =
            crate::extract::parts::parse_defined_names(&archive).unwrap_or_default();
        let metadata_report =
            metadata::build_metadata_report(&archive, &sheet_names, &defined_names)?;
        std::fs::create_dir_all(output_dir.join("metadata"))?;
        std::fs::write(
            output_dir.join("metadata").join("metadata.json"),
            serde_json::to_string_pretty(&metadata_report)?,
        )?;

        // 9. 指標分析報告
        let file_size = std::fs::metadata(file).map(|m| m.len()).unwrap_or(0);
        let validation_counts: std::collections::BTreeMap<String, usize> =
            crate::extract::validation::extract_data_validation(&archive)
                .map(|rules| {
                    rules
                        .into_iter()
                        .map(|(sheet, r)| (sheet, r.validations.len()))
                        .collect()
                })
                .unwrap_or_default();
        let analyzer = WorkbookAnalyzer::new();
        analyzer.generate_report(
            &mut walker,
            &file_name,
            file_size,
            &defined_names,
            &validation_counts,
            &output_dir,
        )?;

        // 10. 抽取摘要
        let summary = ExtractionSummary {
            extraction_timestamp: chrono::Utc::now().to_rfc3339(),
            workbook_info: WorkbookInfo {
                sheet_count: sheet_names.len(),
                sheet_names,
                has_vba: macros_info
                    .get("has_vba")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            },
            extracted_components: ComponentCounts {
                data_sheets: sheetjson.worksheets.len(),
                formulas: formula_count,
                images: image_infos.len(),
                charts: chart_count,
                hyperlinks: sheetjson.hyperlink_count(),
                styled_cells: styled_cell_count,
            },
            files_created: list_created_files(&output_dir),
        };

        std::fs::write(
            output_dir.join("extraction_summary.json"),
            serde_json::to_string_pretty(&summary)?,
        )?;

        Ok(summary)
    }

    /// sheetjson 組裝：走訪 -> 圖表併入 -> 剝格式 -> 超連結/屬性/驗證併入 -> 落地
    fn build_sheetjson(
        &self,
        archive: &WorkbookArchive,
        walker: &mut WorkbookWalker,
        output_dir: &Path,
    ) -> Result<WorkbookJson> {
        let mut sheetjson = walker.to_sheetjson()?;

        // 圖表先併入，讓 prune 套用同一套剝除規則
        match charts::extract_charts(archive) {
            Ok(chart_map) => {
                for (sheet_name, sheet_charts) in chart_map {
                    if let Some(worksheet) = sheetjson.worksheets.get_mut(&sheet_name) {
                        worksheet.charts = sheet_charts;
                    }
                }
            }
            Err(e) => tracing::warn!("📈 Chart extraction failed, continuing: {}", e),
        }

        prune::remove_formatting(&mut sheetjson);

        hyperlinks::add_hyperlinks_to_sheetjson(&mut sheetjson, archive)?;
        metadata::add_metadata_to_sheetjson(&mut sheetjson, archive)?;

        if let Err(e) = crate::extract::validation::add_data_validation_to_sheetjson(
            &mut sheetjson,
            archive,
        ) {
            tracing::warn!("📋 Data validation extraction failed, continuing: {}", e);
        }

        std::fs::write(
            output_dir.join("sheetjson.json"),
            serde_json::to_string_pretty(&sheetjson)?,
        )?;

        Ok(sheetjson)
    }

    fn write_formulas(&self, walker: &mut WorkbookWalker, output_dir: &Path) -> Result<usize> {
        let mut formulas = serde_json::Map::new();
        let mut count = 0usize;

        for sheet_name in walker.sheet_names() {
            let sheet_formulas = walker.sheet_formulas(&sheet_name);
            if sheet_formulas.is_empty() {
                continue;
            }

            // 公式儲存格的快取值（工作簿最後一次計算的結果）
            let range = walker.worksheet_range(&sheet_name).ok();

            let mut sheet_map = serde_json::Map::new();
            for (cell_ref, formula) in sheet_formulas {
                let calculated_value = crate::extract::parts::parse_cell_ref(&cell_ref)
                    .and_then(|(row, col)| {
                        range
                            .as_ref()
                            .and_then(|r| r.get_value((row, col)))
                            .and_then(crate::extract::workbook::cell_value_to_json)
                    })
                    .unwrap_or(Value::Null);

                sheet_map.insert(
                    cell_ref,
                    json!({ "formula": formula, "calculated_value": calculated_value }),
                );
                count += 1;
            }
            formulas.insert(sheet_name, Value::Object(sheet_map));
        }

        if !formulas.is_empty() {
            let formulas_dir = output_dir.join("formulas");
            std::fs::create_dir_all(&formulas_dir)?;
            std::fs::write(
                formulas_dir.join("formulas.json"),
                serde_json::to_string_pretty(&Value::Object(formulas))?,
            )?;
        }

        Ok(count)
    }

    fn write_styles(&self, archive: &WorkbookArchive, output_dir: &Path) -> Result<usize> {
        let sheet_styles = styles::extract_styles(archive)?;
        let count = sheet_styles.values().map(|cells| cells.len()).sum();
        if sheet_styles.is_empty() {
            return Ok(0);
        }

        let styles_dir = output_dir.join("styles");
        std::fs::create_dir_all(&styles_dir)?;
        std::fs::write(
            styles_dir.join("styles.json"),
            serde_json::to_string_pretty(&sheet_styles)?,
        )?;
        Ok(count)
    }

    fn extract_images_logged(
        &self,
        archive: &WorkbookArchive,
        output_dir: &Path,
    ) -> Vec<crate::domain::model::ImageInfo> {
        match images::extract_images(archive, output_dir) {
            Ok(infos) => {
                if !infos.is_empty() {
                    let info_path = output_dir.join("images").join("images_info.json");
                    if let Ok(json) = serde_json::to_string_pretty(&infos) {
                        let _ = std::fs::write(info_path, json);
                    }
                }
                infos
            }
            Err(e) => {
                tracing::warn!("🖼️ Image extraction failed, continuing: {}", e);
                Vec::new()
            }
        }
    }

    fn write_charts(&self, archive: &WorkbookArchive, output_dir: &Path) -> Result<usize> {
        let chart_map = charts::extract_charts(archive)?;
        let count = chart_map.values().map(Vec::len).sum();

        if count > 0 {
            let charts_dir = output_dir.join("charts");
            std::fs::create_dir_all(&charts_dir)?;
            std::fs::write(
                charts_dir.join("charts_info.json"),
                serde_json::to_string_pretty(&chart_map)?,
            )?;
        }

        Ok(count)
    }
}

/// 收集輸入資料夾裡的工作簿檔案
fn collect_workbook_files(input_folder: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(input_folder)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("xlsx") | Some("xlsm") => files.push(path),
            Some("xls") => {
                // 舊版二進位格式走不同的解析器，不在支援範圍
                tracing::warn!(
                    "⏭️ Skipping legacy .xls file (not supported): {}",
                    path.display()
                );
            }
            _ => {}
        }
    }

    files.sort();
    Ok(files)
}

/// 遞迴列出輸出資料夾的檔案（相對路徑）
fn list_created_files(output_dir: &Path) -> Vec<String> {
    let mut files = Vec::new();
    collect_files_recursive(output_dir, output_dir, &mut files);
    files.sort();
    files
}

fn collect_files_recursive(root: &Path, dir: &Path, files: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files_recursive(root, &path, files);
        } else if let Ok(relative) = path.strip_prefix(root) {
            files.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_workbook_files_filters_extensions() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("a.xlsx"), b"x").unwrap();
        std::fs::write(temp.path().join("b.xlsm"), b"x").unwrap();
        std::fs::write(temp.path().join("c.xls"), b"x").unwrap();
        std::fs::write(temp.path().join("notes.txt"), b"x").unwrap();

        let files = collect_workbook_files(temp.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["a.xlsx", "b.xlsm"]);
    }

    #[test]
    fn test_list_created_files() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("data")).unwrap();
        std::fs::write(temp.path().join("sheetjson.json"), b"{}").unwrap();
        std::fs::write(temp.path().join("data/Sheet1.csv"), b"a,b").unwrap();

        let files = list_created_files(temp.path());
        assert_eq!(files, vec!["data/Sheet1.csv", "sheetjson.json"]);
    }
}
