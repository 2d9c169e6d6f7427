use crate::extract::workbook::{cell_value_to_json, WorkbookWalker};
use crate::utils::error::Result;
use serde_json::{json, Value};
use std::path::Path;

/// 每張工作表輸出一份 CSV 與一份 JSON 記錄陣列，
/// 第一列當作欄名；另外彙整 sheet_info.json 的統計。
pub fn extract_sheet_data(walker: &mut WorkbookWalker, output_dir: &Path) -> Result<Value> {
    let data_dir = output_dir.join("data");
    std::fs::create_dir_all(&data_dir)?;

    let mut sheet_info = serde_json::Map::new();

    for sheet_name in walker.sheet_names() {
        let range = walker.worksheet_range(&sheet_name)?;

        let mut rows: Vec<Vec<Value>> = Vec::new();
        for row in range.rows() {
            rows.push(row.iter().map(|c| cell_value_to_json(c).unwrap_or(Value::Null)).collect());
        }

        let column_names = header_names(rows.first());
        let data_rows = if rows.is_empty() { &[][..] } else { &rows[1..] };

        write_sheet_csv(&data_dir, &sheet_name, &column_names, data_rows)?;
        write_sheet_json(&data_dir, &sheet_name, &column_names, data_rows)?;

        let non_empty: usize = data_rows
            .iter()
            .map(|row| row.iter().filter(|v| !v.is_null()).count())
            .sum();

        sheet_info.insert(
            sheet_name.clone(),
            json!({
                "rows": data_rows.len(),
                "columns": column_names.len(),
                "column_names": column_names,
                "non_empty_cells": non_empty,
            }),
        );
    }

    let info = Value::Object(sheet_info);
    std::fs::write(
        data_dir.join("sheet_info.json"),
        serde_json::to_string_pretty(&info)?,
    )?;

    Ok(info)
}

/// 第一列轉欄名；空白欄位以 Column_N 補上
fn header_names(first_row: Option<&Vec<Value>>) -> Vec<String> {
    match first_row {
        Some(row) => row
            .iter()
            .enumerate()
            .map(|(i, v)| match v {
                Value::String(s) if !s.trim().is_empty() => s.clone(),
                Value::Null => format!("Column_{}", i + 1),
                other => other.to_string(),
            })
            .collect(),
        None => Vec::new(),
    }
}

fn write_sheet_csv(
    data_dir: &Path,
    sheet_name: &str,
    column_names: &[String],
    rows: &[Vec<Value>],
) -> Result<()> {
    let csv_path = data_dir.join(format!("{}.csv", sanitize_name(sheet_name)));
    let mut writer = csv::Writer::from_path(&csv_path)?;

    writer.write_record(column_names)?;
    for row in rows {
        let record: Vec<String> = (0..column_names.len())
            .map(|i| match row.get(i) {
                Some(Value::Null) | None => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

fn write_sheet_json(
    data_dir: &Path,
    sheet_name: &str,
    column_names: &[String],
    rows: &[Vec<Value>],
) -> Result<()> {
    let records: Vec<Value> = rows
        .iter()
        .map(|row| {
            let mut record = serde_json::Map::new();
            for (i, name) in column_names.iter().enumerate() {
                record.insert(name.clone(), row.get(i).cloned().unwrap_or(Value::Null));
            }
            Value::Object(record)
        })
        .collect();

    let json_path = data_dir.join(format!("{}.json", sanitize_name(sheet_name)));
    std::fs::write(&json_path, serde_json::to_string_pretty(&records)?)?;
    Ok(())
}

/// 工作表名稱可能含路徑分隔符，落地前替換掉
fn sanitize_name(name: &str) -> String {
    name.replace(['/', '\\'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_names() {
        let row = vec![
            Value::String("Site".to_string()),
            Value::Null,
            serde_json::json!(42),
        ];
        let names = header_names(Some(&row));
        assert_eq!(names, vec!["Site", "Column_2", "42"]);

        assert!(header_names(None).is_empty());
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Sheet1"), "Sheet1");
        assert_eq!(sanitize_name("a/b\\c"), "a_b_c");
    }
}
