use crate::domain::model::WorkbookJson;
use serde_json::Value;

/// 儲存格層級的格式鍵，剝除後只留資料與結構
const CELL_FORMATTING_KEYS: &[&str] = &[
    "Format",
    "style",
    "font",
    "fill",
    "border",
    "alignment",
    "number_format",
    "protection",
];

/// 圖表層級要剝除的視覺鍵
const CHART_FORMATTING_KEYS: &[&str] = &["style", "plotArea", "chartArea"];

/// 數列層級要剝除的視覺鍵
const SERIES_FORMATTING_KEYS: &[&str] = &[
    "format",
    "marker",
    "line",
    "fill",
    "smooth",
    "dataLabels",
    "trendline",
    "errorBars",
    "pictureOptions",
];

/// 數列保留的結構鍵
const SERIES_ESSENTIAL_KEYS: &[&str] = &[
    "idx",
    "order",
    "title",
    "categories",
    "values",
    "xValues",
    "yValues",
    "bubbleSize",
];

/// 座標軸保留的功能鍵
const AXIS_FUNCTIONAL_KEYS: &[&str] = &[
    "position",
    "visible",
    "numberFormat",
    "minimum",
    "maximum",
    "majorUnit",
    "minorUnit",
    "scaleType",
    "categoryType",
];

/// 表格層級要剝除的樣式鍵
const TABLE_FORMATTING_KEYS: &[&str] = &["tableStyleInfo", "format", "predefinedTableStyle"];

/// 表格以前綴剝除的鍵（showFirstColumn、highlightLastColumn 等）
const TABLE_FORMATTING_KEY_PREFIXES: &[&str] = &["show", "highlight"];

/// 從 sheetjson 剝除所有格式資訊，只留資料與結構
///
/// 對齊下游 LLM 分析的需求：格式雜訊會吃掉 token 預算。
/// meta 會整塊移除（metadata 步驟之後會重新填入文件屬性）。
pub fn remove_formatting(sheetjson: &mut WorkbookJson) {
    sheetjson.meta.clear();

    for worksheet in sheetjson.worksheets.values_mut() {
        // 工作表顯示屬性整塊移除
        worksheet.worksheet_properties = None;

        // 儲存格：剝格式鍵，再丟掉沒有值的儲存格
        for cell in worksheet.cells.values_mut() {
            if let Value::Object(cell_obj) = cell {
                for key in CELL_FORMATTING_KEYS {
                    cell_obj.remove(*key);
                }
            }
        }
        worksheet.cells.retain(|_, cell| match cell {
            Value::Object(cell_obj) => cell_obj.contains_key("value"),
            _ => false,
        });

        // 圖表：保留資料結構，剝除視覺屬性
        for chart in worksheet.charts.iter_mut() {
            prune_chart(chart);
        }

        // 具名項目的格式欄位
        for named_item in worksheet.named_items.iter_mut() {
            if let Value::Object(obj) = named_item {
                obj.remove("format");
            }
        }

        // 表格樣式
        for table in worksheet.tables.iter_mut() {
            prune_table(table);
        }
    }
}

fn prune_chart(chart: &mut Value) {
    let Value::Object(chart_obj) = chart else {
        return;
    };

    for key in CHART_FORMATTING_KEYS {
        chart_obj.remove(*key);
    }

    // 圖例只留位置與可見性
    if let Some(Value::Object(legend)) = chart_obj.get("legend").cloned() {
        let mut essential = serde_json::Map::new();
        if let Some(position) = legend.get("position") {
            essential.insert("position".to_string(), position.clone());
        }
        if let Some(visible) = legend.get("visible") {
            essential.insert("visible".to_string(), visible.clone());
        }
        chart_obj.insert("legend".to_string(), Value::Object(essential));
    }

    // 標題只留文字與公式
    if let Some(Value::Object(title)) = chart_obj.get("title").cloned() {
        let mut essential = serde_json::Map::new();
        if let Some(text) = title.get("text") {
            essential.insert("text".to_string(), text.clone());
        }
        if let Some(formula) = title.get("formula") {
            essential.insert("formula".to_string(), formula.clone());
        }
        chart_obj.insert("title".to_string(), Value::Object(essential));
    }

    // 座標軸只留功能屬性
    if let Some(Value::Object(axes)) = chart_obj.get_mut("axes") {
        for axis in axes.values_mut() {
            if let Value::Object(axis_obj) = axis {
                axis_obj.retain(|key, _| AXIS_FUNCTIONAL_KEYS.contains(&key.as_str()));
            }
        }
    }

    // 數列：先剝視覺鍵，再只留結構鍵
    if let Some(Value::Array(series_list)) = chart_obj.get_mut("series") {
        for series in series_list.iter_mut() {
            if let Value::Object(series_obj) = series {
                for key in SERIES_FORMATTING_KEYS {
                    series_obj.remove(*key);
                }
                series_obj.retain(|key, _| SERIES_ESSENTIAL_KEYS.contains(&key.as_str()));
            }
        }
    }
}

fn prune_table(table: &mut Value) {
    let Value::Object(table_obj) = table else {
        return;
    };

    for key in TABLE_FORMATTING_KEYS {
        table_obj.remove(*key);
    }

    table_obj.retain(|key, _| {
        !TABLE_FORMATTING_KEY_PREFIXES
            .iter()
            .any(|prefix| key.starts_with(prefix))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::WorksheetJson;
    use serde_json::json;

    fn fixture() -> WorkbookJson {
        let mut wb = WorkbookJson::default();
        wb.meta
            .insert("generator".to_string(), json!("raw-walk"));

        let mut ws = WorksheetJson::default();
        ws.worksheet_properties = Some(json!({"tabColor": "FF0000"}));
        ws.cells.insert(
            "A1".to_string(),
            json!({"value": 10, "Format": {"bold": true}, "font": "Arial"}),
        );
        ws.cells
            .insert("A2".to_string(), json!({"style": "header"}));
        ws.charts.push(json!({
            "chartType": "barChart",
            "style": 5,
            "plotArea": {"layout": "auto"},
            "legend": {"position": "r", "visible": true, "font": "Calibri"},
            "title": {"text": "Output", "overlay": false},
            "axes": {"value": {"position": "l", "majorGridlines": true, "maximum": 50.0}},
            "series": [
                {"idx": 0, "values": "Sheet1!$B$2:$B$9", "marker": "circle", "line": {"w": 2}}
            ]
        }));
        ws.tables.push(json!({
            "name": "Table1",
            "ref": "A1:C10",
            "tableStyleInfo": {"name": "TableStyleMedium2"},
            "showFirstColumn": false,
            "highlightLastColumn": true
        }));
        wb.worksheets.insert("Sheet1".to_string(), ws);
        wb
    }

    #[test]
    fn test_remove_formatting_strips_cells() {
        let mut wb = fixture();
        remove_formatting(&mut wb);

        let ws = wb.worksheets.get("Sheet1").unwrap();
        // 有值的儲存格保留但剝掉格式鍵
        let a1 = ws.cells.get("A1").unwrap();
        assert_eq!(a1["value"], 10);
        assert!(a1.get("Format").is_none());
        assert!(a1.get("font").is_none());

        // 沒有值的儲存格整顆移除
        assert!(ws.cells.get("A2").is_none());

        // meta 與工作表屬性清空
        assert!(wb.meta.is_empty());
        assert!(ws.worksheet_properties.is_none());
    }

    #[test]
    fn test_remove_formatting_prunes_chart() {
        let mut wb = fixture();
        remove_formatting(&mut wb);

        let chart = &wb.worksheets["Sheet1"].charts[0];
        assert!(chart.get("style").is_none());
        assert!(chart.get("plotArea").is_none());

        assert_eq!(chart["legend"], json!({"position": "r", "visible": true}));
        assert_eq!(chart["title"], json!({"text": "Output"}));

        // 座標軸只剩功能屬性
        let value_axis = &chart["axes"]["value"];
        assert_eq!(value_axis["position"], "l");
        assert_eq!(value_axis["maximum"], 50.0);
        assert!(value_axis.get("majorGridlines").is_none());

        // 數列剝掉視覺鍵
        let series = &chart["series"][0];
        assert_eq!(series["idx"], 0);
        assert_eq!(series["values"], "Sheet1!$B$2:$B$9");
        assert!(series.get("marker").is_none());
        assert!(series.get("line").is_none());
    }

    #[test]
    fn test_remove_formatting_prunes_table() {
        let mut wb = fixture();
        remove_formatting(&mut wb);

        let table = &wb.worksheets["Sheet1"].tables[0];
        assert_eq!(table["name"], "Table1");
        assert_eq!(table["ref"], "A1:C10");
        assert!(table.get("tableStyleInfo").is_none());
        assert!(table.get("showFirstColumn").is_none());
        assert!(table.get("highlightLastColumn").is_none());
    }
}
