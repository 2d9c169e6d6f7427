use crate::domain::model::{WorkbookJson, WorksheetJson};
use crate::extract::parts::cell_ref;
use crate::utils::error::Result;
use calamine::{Data, Range, Reader, Xlsx};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{json, Value};
use std::io::Cursor;

/// calamine 工作簿包裝，負責 sheetjson 的核心走訪
///
/// 每個工作表走訪一次：儲存格值與公式。
/// 公式範圍只抓一次再以絕對座標查詢，逐格呼叫 worksheet_formula 會非常慢。
pub struct WorkbookWalker {
    workbook: Xlsx<Cursor<Vec<u8>>>,
}

impl WorkbookWalker {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let workbook = Xlsx::new(Cursor::new(bytes))?;
        Ok(Self { workbook })
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names().to_vec()
    }

    /// 走訪整份工作簿，產出 sheetjson
    pub fn to_sheetjson(&mut self) -> Result<WorkbookJson> {
        let mut result = WorkbookJson::default();

        // 結合儲存格需要先載入
        let _ = self.workbook.load_merged_regions();

        for sheet_name in self.sheet_names() {
            let worksheet = self.walk_sheet(&sheet_name)?;
            result.worksheets.insert(sheet_name, worksheet);
        }

        Ok(result)
    }

    fn walk_sheet(&mut self, sheet_name: &str) -> Result<WorksheetJson> {
        let range = self.workbook.worksheet_range(sheet_name)?;

        // 公式範圍整張抓一次，之後用絕對座標查
        let formula_range = self.workbook.worksheet_formula(sheet_name).ok();

        let mut worksheet = WorksheetJson::default();
        let (start_row, start_col) = range.start().unwrap_or((0, 0));

        for (row_offset, row) in range.rows().enumerate() {
            for (col_offset, cell) in row.iter().enumerate() {
                let abs_row = start_row + row_offset as u32;
                let abs_col = start_col + col_offset as u32;

                let value = cell_value_to_json(cell);
                let formula = formula_at(&formula_range, abs_row, abs_col);

                if value.is_none() && formula.is_none() {
                    continue;
                }

                let mut cell_json = serde_json::Map::new();
                if let Some(v) = value {
                    cell_json.insert("value".to_string(), v);
                }
                if let Some(f) = formula {
                    cell_json.insert("formula".to_string(), Value::String(f));
                }

                worksheet
                    .cells
                    .insert(cell_ref(abs_row, abs_col), Value::Object(cell_json));
            }
        }

        worksheet.merged_cells = self.merged_regions(sheet_name);

        Ok(worksheet)
    }

    fn merged_regions(&mut self, sheet_name: &str) -> Vec<String> {
        match self.workbook.worksheet_merge_cells(sheet_name) {
            Some(Ok(regions)) => regions
                .iter()
                .map(|dims| {
                    format!(
                        "{}:{}",
                        cell_ref(dims.start.0, dims.start.1),
                        cell_ref(dims.end.0, dims.end.1)
                    )
                })
                .collect(),
            Some(Err(_)) | None => Vec::new(),
        }
    }

    /// 每張工作表的公式表：儲存格參照 -> 公式字串
    pub fn sheet_formulas(&mut self, sheet_name: &str) -> Vec<(String, String)> {
        let mut formulas = Vec::new();

        if let Ok(formula_range) = self.workbook.worksheet_formula(sheet_name) {
            let (start_row, start_col) = formula_range.start().unwrap_or((0, 0));
            for (row_offset, row) in formula_range.rows().enumerate() {
                for (col_offset, formula) in row.iter().enumerate() {
                    if formula.is_empty() {
                        continue;
                    }
                    let reference =
                        cell_ref(start_row + row_offset as u32, start_col + col_offset as u32);
                    formulas.push((reference, format!("={}", formula.trim_start_matches('='))));
                }
            }
        }

        formulas
    }

    pub fn worksheet_range(&mut self, sheet_name: &str) -> Result<Range<Data>> {
        Ok(self.workbook.worksheet_range(sheet_name)?)
    }
}

fn formula_at(formula_range: &Option<Range<String>>, row: u32, col: u32) -> Option<String> {
    let range = formula_range.as_ref()?;
    let formula = range.get_value((row, col))?;
    if formula.is_empty() {
        None
    } else {
        Some(format!("={}", formula.trim_start_matches('=')))
    }
}

/// calamine 儲存格值轉 JSON 值，空儲存格回傳 None
pub fn cell_value_to_json(cell: &Data) -> Option<Value> {
    match cell {
        Data::Int(i) => Some(json!(i)),
        Data::Float(f) => Some(json!(f)),
        Data::String(s) => Some(Value::String(s.clone())),
        Data::Bool(b) => Some(Value::Bool(*b)),
        Data::Error(e) => Some(Value::String(format!("{:?}", e))),
        Data::DateTime(dt) => Some(Value::String(
            serial_to_datetime(dt.as_f64())
                .map(|d| d.to_string())
                .unwrap_or_else(|| dt.as_f64().to_string()),
        )),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(Value::String(s.clone())),
        Data::Empty => None,
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

/// Excel 序列值轉日期時間（1900 年 epoch）
fn serial_to_datetime(value: f64) -> Option<NaiveDateTime> {
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    let days = value.floor() as i64;
    let date = epoch.checked_add_signed(Duration::days(days))?;

    let time_part = value.fract();
    let seconds_in_day = (time_part * 86400.0).round() as u32;
    let hours = (seconds_in_day / 3600).min(23);
    let minutes = (seconds_in_day % 3600) / 60;
    let seconds = seconds_in_day % 60;

    Some(NaiveDateTime::new(
        date,
        NaiveTime::from_hms_opt(hours, minutes, seconds)
            .unwrap_or_else(|| NaiveTime::from_hms_opt(0, 0, 0).unwrap()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_value_to_json() {
        assert_eq!(cell_value_to_json(&Data::Int(42)), Some(json!(42)));
        assert_eq!(cell_value_to_json(&Data::Float(1.5)), Some(json!(1.5)));
        assert_eq!(
            cell_value_to_json(&Data::String("hello".to_string())),
            Some(json!("hello"))
        );
        assert_eq!(cell_value_to_json(&Data::Bool(true)), Some(json!(true)));
        assert_eq!(cell_value_to_json(&Data::Empty), None);
    }

    #[test]
    fn test_serial_to_datetime() {
        // 2020-01-01 的 Excel 序列值
        let dt = serial_to_datetime(43831.0).unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());

        // 半天 = 中午 12:00
        let dt = serial_to_datetime(43831.5).unwrap();
        assert_eq!(dt.time(), NaiveTime::from_hms_opt(12, 0, 0).unwrap());
    }
}
