use crate::extract::parts::{parse_relationships, resolve_part_path, WorkbookArchive};
use crate::utils::error::Result;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// 從工作簿抽出所有圖表的結構資訊
///
/// 圖表透過 drawing 掛在工作表上：
/// worksheet rels -> drawing XML -> drawing rels -> xl/charts/chartN.xml。
/// 只取結構性欄位（類型、標題、數列參照、座標軸），視覺格式一概不收。
pub fn extract_charts(archive: &WorkbookArchive) -> Result<BTreeMap<String, Vec<Value>>> {
    let mut charts: BTreeMap<String, Vec<Value>> = BTreeMap::new();

    for (sheet_name, sheet_path) in archive.sheet_part_paths()? {
        let chart_paths = chart_paths_for_sheet(archive, &sheet_path)?;

        let mut sheet_charts = Vec::new();
        for chart_path in chart_paths {
            let Some(chart_xml) = archive.read_part(&chart_path)? else {
                continue;
            };
            sheet_charts.push(parse_chart_xml(&chart_xml));
        }

        if !sheet_charts.is_empty() {
            charts.insert(sheet_name, sheet_charts);
        }
    }

    Ok(charts)
}

fn chart_paths_for_sheet(archive: &WorkbookArchive, sheet_path: &str) -> Result<Vec<String>> {
    let Some((sheet_dir, sheet_file)) = sheet_path.rsplit_once('/') else {
        return Ok(Vec::new());
    };
    let sheet_rels = format!("{}/_rels/{}.rels", sheet_dir, sheet_file);

    let Some(rels_xml) = archive.read_part(&sheet_rels)? else {
        return Ok(Vec::new());
    };

    let Some(drawing_target) = parse_relationships(&rels_xml)
        .into_values()
        .find(|t| t.contains("drawings/"))
    else {
        return Ok(Vec::new());
    };

    let drawing_path = resolve_part_path(sheet_dir, &drawing_target);
    let Some((drawing_dir, drawing_file)) = drawing_path.rsplit_once('/') else {
        return Ok(Vec::new());
    };
    let drawing_rels = format!("{}/_rels/{}.rels", drawing_dir, drawing_file);

    let Some(drawing_rels_xml) = archive.read_part(&drawing_rels)? else {
        return Ok(Vec::new());
    };

    let mut paths: Vec<String> = parse_relationships(&drawing_rels_xml)
        .into_values()
        .filter(|t| t.contains("charts/"))
        .map(|t| resolve_part_path(drawing_dir, &t))
        .collect();
    paths.sort();

    Ok(paths)
}

/// 單一 chartN.xml 轉成圖表物件
pub fn parse_chart_xml(xml: &str) -> Value {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();

    let mut chart_type: Option<String> = None;
    let mut title_text = String::new();
    let mut title_formula: Option<String> = None;
    let mut legend_position: Option<String> = None;

    let mut series: Vec<Value> = Vec::new();
    let mut axes: serde_json::Map<String, Value> = serde_json::Map::new();

    // 狀態旗標
    let mut in_title = false;
    let mut in_series = false;
    let mut series_section: Option<&'static str> = None; // tx / cat / val
    let mut in_formula = false;
    let mut current_axis: Option<&'static str> = None;
    let mut current_axis_obj = serde_json::Map::new();

    let mut current_series = serde_json::Map::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                let qname = e.name();
                let name = local_name(qname.as_ref());
                match name {
                    // plotArea 下的第一個 *Chart 元素決定圖表類型
                    "barChart" | "lineChart" | "pieChart" | "areaChart" | "scatterChart"
                    | "bubbleChart" | "doughnutChart" | "radarChart" | "stockChart"
                    | "surfaceChart" => {
                        if chart_type.is_none() {
                            chart_type = Some(name.to_string());
                        }
                    }
                    "title" => in_title = true,
                    "ser" => {
                        in_series = true;
                        current_series = serde_json::Map::new();
                    }
                    "idx" if in_series => {
                        if let Some(v) = val_attribute(e) {
                            if let Ok(idx) = v.parse::<u64>() {
                                current_series.insert("idx".to_string(), json!(idx));
                            }
                        }
                    }
                    "order" if in_series => {
                        if let Some(v) = val_attribute(e) {
                            if let Ok(order) = v.parse::<u64>() {
                                current_series.insert("order".to_string(), json!(order));
                            }
                        }
                    }
                    "tx" if in_series => series_section = Some("title"),
                    "cat" if in_series => series_section = Some("categories"),
                    "val" if in_series => series_section = Some("values"),
                    "xVal" if in_series => series_section = Some("xValues"),
                    "yVal" if in_series => series_section = Some("yValues"),
                    "f" => in_formula = true,
                    "legendPos" => {
                        legend_position = val_attribute(e);
                    }
                    "catAx" => {
                        current_axis = Some("category");
                        current_axis_obj = serde_json::Map::new();
                    }
                    "valAx" => {
                        current_axis = Some("value");
                        current_axis_obj = serde_json::Map::new();
                    }
                    "axPos" if current_axis.is_some() => {
                        if let Some(v) = val_attribute(e) {
                            current_axis_obj.insert("position".to_string(), Value::String(v));
                        }
                    }
                    "numFmt" if current_axis.is_some() => {
                        for attr in e.attributes().filter_map(std::result::Result::ok) {
                            if attr.key.as_ref() == b"formatCode" {
                                if let Ok(code) = std::str::from_utf8(&attr.value) {
                                    current_axis_obj.insert(
                                        "numberFormat".to_string(),
                                        Value::String(code.to_string()),
                                    );
                                }
                            }
                        }
                    }
                    "max" if current_axis.is_some() => {
                        if let Some(v) = val_attribute(e).and_then(|v| v.parse::<f64>().ok()) {
                            current_axis_obj.insert("maximum".to_string(), json!(v));
                        }
                    }
                    "min" if current_axis.is_some() => {
                        if let Some(v) = val_attribute(e).and_then(|v| v.parse::<f64>().ok()) {
                            current_axis_obj.insert("minimum".to_string(), json!(v));
                        }
                    }
                    "majorUnit" if current_axis.is_some() => {
                        if let Some(v) = val_attribute(e).and_then(|v| v.parse::<f64>().ok()) {
                            current_axis_obj.insert("majorUnit".to_string(), json!(v));
                        }
                    }
                    "minorUnit" if current_axis.is_some() => {
                        if let Some(v) = val_attribute(e).and_then(|v| v.parse::<f64>().ok()) {
                            current_axis_obj.insert("minorUnit".to_string(), json!(v));
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                let Ok(text) = e.unescape() else { continue };
                let text = text.trim().to_string();
                if text.is_empty() {
                    continue;
                }

                if in_formula {
                    if in_series {
                        if let Some(section) = series_section {
                            current_series
                                .entry(section.to_string())
                                .or_insert(Value::String(text));
                        }
                    } else if in_title {
                        title_formula = Some(text);
                    }
                } else if in_title {
                    // 標題的富文字：把 <a:t> 片段串起來
                    title_text.push_str(&text);
                }
            }
            Ok(Event::End(ref e)) => {
                let qname = e.name();
                let name = local_name(qname.as_ref());
                match name {
                    "title" => in_title = false,
                    "ser" => {
                        in_series = false;
                        series.push(Value::Object(std::mem::take(&mut current_series)));
                    }
                    "tx" | "cat" | "val" | "xVal" | "yVal" => series_section = None,
                    "f" => in_formula = false,
                    "catAx" | "valAx" => {
                        if let Some(axis_name) = current_axis.take() {
                            axes.insert(
                                axis_name.to_string(),
                                Value::Object(std::mem::take(&mut current_axis_obj)),
                            );
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    let mut chart = serde_json::Map::new();
    chart.insert(
        "chartType".to_string(),
        Value::String(chart_type.unwrap_or_else(|| "unknown".to_string())),
    );

    let mut title = serde_json::Map::new();
    if !title_text.is_empty() {
        title.insert("text".to_string(), Value::String(title_text));
    }
    if let Some(formula) = title_formula {
        title.insert("formula".to_string(), Value::String(formula));
    }
    if !title.is_empty() {
        chart.insert("title".to_string(), Value::Object(title));
    }

    if let Some(position) = legend_position {
        chart.insert(
            "legend".to_string(),
            json!({ "position": position, "visible": true }),
        );
    }

    if !axes.is_empty() {
        chart.insert("axes".to_string(), Value::Object(axes));
    }

    chart.insert("series".to_string(), Value::Array(series));

    Value::Object(chart)
}

/// 去掉 "c:" / "a:" 等命名空間前綴
fn local_name(name: &[u8]) -> &str {
    let s = std::str::from_utf8(name).unwrap_or("");
    s.rsplit(':').next().unwrap_or(s)
}

fn val_attribute(e: &quick_xml::events::BytesStart<'_>) -> Option<String> {
    for attr in e.attributes().filter_map(std::result::Result::ok) {
        if attr.key.as_ref() == b"val" {
            return std::str::from_utf8(&attr.value).ok().map(String::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHART_XML: &str = r#"<?xml version="1.0"?>
<c:chartSpace xmlns:c="http://schemas.openxmlformats.org/drawingml/2006/chart"
              xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main">
  <c:chart>
    <c:title><c:tx><c:rich><a:p><a:r><a:t>Monthly Output</a:t></a:r></a:p></c:rich></c:tx></c:title>
    <c:plotArea>
      <c:barChart>
        <c:ser>
          <c:idx val="0"/>
          <c:order val="0"/>
          <c:tx><c:strRef><c:f>Sheet1!$B$1</c:f></c:strRef></c:tx>
          <c:cat><c:strRef><c:f>Sheet1!$A$2:$A$13</c:f></c:strRef></c:cat>
          <c:val><c:numRef><c:f>Sheet1!$B$2:$B$13</c:f></c:numRef></c:val>
        </c:ser>
      </c:barChart>
      <c:catAx><c:axPos val="b"/></c:catAx>
      <c:valAx><c:axPos val="l"/><c:numFmt formatCode="0.0" sourceLinked="0"/></c:valAx>
    </c:plotArea>
    <c:legend><c:legendPos val="r"/></c:legend>
  </c:chart>
</c:chartSpace>"#;

    #[test]
    fn test_parse_chart_xml() {
        let chart = parse_chart_xml(CHART_XML);

        assert_eq!(chart["chartType"], "barChart");
        assert_eq!(chart["title"]["text"], "Monthly Output");
        assert_eq!(chart["legend"]["position"], "r");

        let series = chart["series"].as_array().unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0]["idx"], 0);
        assert_eq!(series[0]["title"], "Sheet1!$B$1");
        assert_eq!(series[0]["categories"], "Sheet1!$A$2:$A$13");
        assert_eq!(series[0]["values"], "Sheet1!$B$2:$B$13");

        assert_eq!(chart["axes"]["category"]["position"], "b");
        assert_eq!(chart["axes"]["value"]["numberFormat"], "0.0");
    }

    #[test]
    fn test_parse_chart_without_title() {
        let xml = r#"<c:chartSpace xmlns:c="x"><c:chart><c:plotArea>
            <c:lineChart><c:ser><c:idx val="0"/></c:ser></c:lineChart>
        </c:plotArea></c:chart></c:chartSpace>"#;

        let chart = parse_chart_xml(xml);
        assert_eq!(chart["chartType"], "lineChart");
        assert!(chart.get("title").is_none());
        assert_eq!(chart["series"].as_array().unwrap().len(), 1);
    }
}
