use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// 工作簿的 sheetjson 中間表示
///
/// 對應一份 .xlsx 檔案的完整結構。`meta` 由 metadata 步驟填入，
/// cells/charts/tables 內保留鬆散的 JSON 物件，方便 prune 步驟
/// 以鍵為單位刪除格式資訊。
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkbookJson {
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub meta: serde_json::Map<String, Value>,
    pub worksheets: BTreeMap<String, WorksheetJson>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorksheetJson {
    /// "A1" 形式的儲存格參照 -> 儲存格物件（value / formula / Format / hyperlink）
    pub cells: BTreeMap<String, Value>,

    #[serde(rename = "mergedCells", default, skip_serializing_if = "Vec::is_empty")]
    pub merged_cells: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub charts: Vec<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<Value>,

    #[serde(rename = "namedItems", default, skip_serializing_if = "Vec::is_empty")]
    pub named_items: Vec<Value>,

    #[serde(
        rename = "worksheetProperties",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub worksheet_properties: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hyperlinks_summary: Option<HyperlinksSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_validation: Option<SheetValidationRules>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperlinksSummary {
    pub count: usize,
    pub cells_with_hyperlinks: Vec<String>,
}

/// 單一工作表的資料驗證規則集合
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetValidationRules {
    pub sheet_name: String,
    pub validations: Vec<serde_json::Map<String, Value>>,
}

/// 已抽出的嵌入圖片資訊
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInfo {
    pub sheet: String,
    pub filename: String,
    pub filepath: String,
    /// (from_col, from_row, to_col, to_row)，0-based 儲存格座標
    pub anchor: (u32, u32, u32, u32),
}

/// 單一工作表的資料型別統計
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SheetDataPatterns {
    pub empty_cells: usize,
    pub formula_cells: usize,
    pub numeric_cells: usize,
    pub text_cells: usize,
    pub date_cells: usize,
    pub boolean_cells: usize,
    pub error_cells: usize,
    pub total_cells: usize,
    pub data_density: f64,
}

/// 單一公式的依賴分析結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormulaInfo {
    pub formula: String,
    pub complexity_score: u32,
    pub cell_references: Vec<String>,
    pub sheet_references: Vec<String>,
    pub functions_used: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SheetFormulaAnalysis {
    pub formulas: BTreeMap<String, FormulaInfo>,
    pub external_references: Vec<String>,
    pub complex_formulas: Vec<String>,
}

/// 每個檔案抽取完成後的統計摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionSummary {
    pub extraction_timestamp: String,
    pub workbook_info: WorkbookInfo,
    pub extracted_components: ComponentCounts,
    pub files_created: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkbookInfo {
    pub sheet_count: usize,
    pub sheet_names: Vec<String>,
    pub has_vba: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ComponentCounts {
    pub data_sheets: usize,
    pub formulas: usize,
    pub images: usize,
    pub charts: usize,
    pub hyperlinks: usize,
    pub styled_cells: usize,
}

/// 整批處理的總結報告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processing_timestamp: String,
    pub total_files: usize,
    pub processed_successfully: usize,
    pub failed_processing: usize,
    pub success_rate: f64,
    pub processed_files: Vec<String>,
    pub failed_files: Vec<String>,
    pub output_folder: String,
}

impl WorkbookJson {
    /// 統計所有工作表中帶公式的儲存格數
    pub fn formula_count(&self) -> usize {
        self.worksheets
            .values()
            .flat_map(|ws| ws.cells.values())
            .filter(|cell| cell.get("formula").is_some())
            .count()
    }

    /// 統計所有工作表中帶超連結的儲存格數
    pub fn hyperlink_count(&self) -> usize {
        self.worksheets
            .values()
            .filter_map(|ws| ws.hyperlinks_summary.as_ref())
            .map(|s| s.count)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_workbook_json_counts() {
        let mut wb = WorkbookJson::default();
        let mut ws = WorksheetJson::default();
        ws.cells
            .insert("A1".to_string(), json!({"value": 1.0, "formula": "=B1+C1"}));
        ws.cells.insert("A2".to_string(), json!({"value": "text"}));
        ws.hyperlinks_summary = Some(HyperlinksSummary {
            count: 2,
            cells_with_hyperlinks: vec!["A1".to_string(), "B3".to_string()],
        });
        wb.worksheets.insert("Sheet1".to_string(), ws);

        assert_eq!(wb.formula_count(), 1);
        assert_eq!(wb.hyperlink_count(), 2);
    }

    #[test]
    fn test_worksheet_serialization_skips_empty() {
        let ws = WorksheetJson::default();
        let value = serde_json::to_value(&ws).unwrap();
        // 空集合不應出現在序列化結果中
        assert!(value.get("charts").is_none());
        assert!(value.get("hyperlinks_summary").is_none());
        assert!(value.get("cells").is_some());
    }
}
