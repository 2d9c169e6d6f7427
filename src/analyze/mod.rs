use crate::domain::model::{FormulaInfo, SheetDataPatterns, SheetFormulaAnalysis};
use crate::extract::workbook::WorkbookWalker;
use crate::utils::error::Result;
use calamine::Data;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// 公式複雜度超過此分數列入 complex_formulas
const COMPLEXITY_THRESHOLD: u32 = 5;

/// 工作簿指標分析器
///
/// 跟抽取器走同一份工作簿，但產出的是統計報告而不是結構轉存：
/// 儲存格型別分布、公式依賴、具名範圍。
pub struct WorkbookAnalyzer {
    cell_ref_re: Regex,
    sheet_ref_re: Regex,
    function_re: Regex,
}

impl Default for WorkbookAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkbookAnalyzer {
    pub fn new() -> Self {
        Self {
            cell_ref_re: Regex::new(r"[A-Z]+[0-9]+").unwrap(),
            sheet_ref_re: Regex::new(r"[A-Za-z0-9_]+![A-Z]+[0-9]+").unwrap(),
            function_re: Regex::new(r"([A-Z]+)\(").unwrap(),
        }
    }

    /// 各工作表的資料型別統計
    pub fn analyze_data_patterns(
        &self,
        walker: &mut WorkbookWalker,
    ) -> Result<BTreeMap<String, SheetDataPatterns>> {
        let mut patterns = BTreeMap::new();

        for sheet_name in walker.sheet_names() {
            let range = walker.worksheet_range(&sheet_name)?;
            let mut stats = SheetDataPatterns::default();

            for row in range.rows() {
                for cell in row {
                    stats.total_cells += 1;
                    match cell {
                        Data::Empty => stats.empty_cells += 1,
                        Data::Int(_) | Data::Float(_) => stats.numeric_cells += 1,
                        Data::String(_) => stats.text_cells += 1,
                        Data::Bool(_) => stats.boolean_cells += 1,
                        Data::Error(_) => stats.error_cells += 1,
                        Data::DateTime(_) | Data::DateTimeIso(_) | Data::DurationIso(_) => {
                            stats.date_cells += 1
                        }
                        #[allow(unreachable_patterns)]
                        _ => {}
                    }
                }
            }

            // 公式儲存格另外統計（值與公式並存，計數獨立於型別分布）
            stats.formula_cells = walker.sheet_formulas(&sheet_name).len();

            stats.data_density = if stats.total_cells > 0 {
                (stats.total_cells - stats.empty_cells) as f64 / stats.total_cells as f64
            } else {
                0.0
            };

            patterns.insert(sheet_name, stats);
        }

        Ok(patterns)
    }

    /// 各工作表的公式依賴分析
    pub fn analyze_formula_dependencies(
        &self,
        walker: &mut WorkbookWalker,
    ) -> BTreeMap<String, SheetFormulaAnalysis> {
        let mut dependencies = BTreeMap::new();

        for sheet_name in walker.sheet_names() {
            let mut analysis = SheetFormulaAnalysis::default();

            for (cell_ref, formula) in walker.sheet_formulas(&sheet_name) {
                let complexity = self.formula_complexity(&formula);

                let info = FormulaInfo {
                    complexity_score: complexity,
                    cell_references: self
                        .cell_ref_re
                        .find_iter(&formula)
                        .map(|m| m.as_str().to_string())
                        .collect(),
                    sheet_references: self
                        .sheet_ref_re
                        .find_iter(&formula)
                        .map(|m| m.as_str().to_string())
                        .collect(),
                    functions_used: self.extract_functions(&formula),
                    formula: formula.clone(),
                };

                if complexity > COMPLEXITY_THRESHOLD {
                    analysis.complex_formulas.push(cell_ref.clone());
                }

                // 跨活頁簿參照帶方括號
                if formula.contains('[') && formula.contains(']') {
                    analysis.external_references.push(cell_ref.clone());
                }

                analysis.formulas.insert(cell_ref, info);
            }

            if !analysis.formulas.is_empty() {
                dependencies.insert(sheet_name, analysis);
            }
        }

        dependencies
    }

    /// 複雜度評分：運算子 + 儲存格參照 + 函式呼叫的粗略計數
    pub fn formula_complexity(&self, formula: &str) -> u32 {
        let mut complexity: u32 = 0;

        for op in ["+", "-", "*", "/", "^", "&", "=", "<", ">"] {
            complexity += formula.matches(op).count() as u32;
        }

        complexity += self.cell_ref_re.find_iter(formula).count() as u32;
        complexity += self.function_re.find_iter(formula).count() as u32;

        complexity
    }

    /// 公式裡用到的函式名（去重、排序）
    pub fn extract_functions(&self, formula: &str) -> Vec<String> {
        let mut functions: Vec<String> = self
            .function_re
            .captures_iter(formula)
            .map(|c| c[1].to_string())
            .collect();
        functions.sort();
        functions.dedup();
        functions
    }

    /// 完整分析報告並寫入 analysis/comprehensive_analysis.json
    ///
    /// `validation_counts` 由抽取側提供（規則在工作表 XML 裡，
    /// walker 看不到），這裡只彙整數字。
    pub fn generate_report(
        &self,
        walker: &mut WorkbookWalker,
        file_name: &str,
        file_size: u64,
        defined_names: &[(String, String)],
        validation_counts: &BTreeMap<String, usize>,
        output_dir: &Path,
    ) -> Result<Value> {
        let sheet_names = walker.sheet_names();

        let mut named_ranges = serde_json::Map::new();
        for (name, refers_to) in defined_names {
            named_ranges.insert(name.clone(), json!({ "refers_to": refers_to }));
        }

        let report = json!({
            "analysis_timestamp": chrono::Utc::now().to_rfc3339(),
            "file_info": {
                "filename": file_name,
                "file_size": file_size,
                "sheet_count": sheet_names.len(),
                "sheet_names": sheet_names,
            },
            "data_patterns": self.analyze_data_patterns(walker)?,
            "formula_dependencies": self.analyze_formula_dependencies(walker),
            "named_ranges": named_ranges,
            "data_validation_rules": validation_counts,
        });

        let analysis_dir = output_dir.join("analysis");
        std::fs::create_dir_all(&analysis_dir)?;
        std::fs::write(
            analysis_dir.join("comprehensive_analysis.json"),
            serde_json::to_string_pretty(&report)?,
        )?;

        Ok(report)
    }
}
