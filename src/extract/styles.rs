use crate::extract::parts::WorkbookArchive;
use crate::utils::error::Result;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

/// xl/styles.xml 解析結果
#[derive(Debug, Default)]
pub struct StyleTable {
    /// numFmtId -> 格式字串（僅自訂格式，內建格式查 builtin 表）
    pub num_formats: HashMap<u32, String>,
    /// styleId（cellXfs 索引）-> 各部件索引
    pub cell_xfs: Vec<CellXf>,
    pub fonts: Vec<Value>,
    pub fills: Vec<Value>,
    pub borders: Vec<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct CellXf {
    pub num_fmt_id: u32,
    pub font_id: Option<usize>,
    pub fill_id: Option<usize>,
    pub border_id: Option<usize>,
}

impl StyleTable {
    /// styleId 轉成 styles.json 用的儲存格樣式物件
    pub fn cell_style(&self, style_id: usize) -> Option<Value> {
        let xf = self.cell_xfs.get(style_id)?;

        let mut style = serde_json::Map::new();
        if let Some(format) = self.format_code(xf.num_fmt_id) {
            style.insert("number_format".to_string(), Value::String(format));
        }
        if let Some(font) = xf.font_id.and_then(|id| self.fonts.get(id)) {
            style.insert("font".to_string(), font.clone());
        }
        if let Some(fill) = xf.fill_id.and_then(|id| self.fills.get(id)) {
            style.insert("fill".to_string(), fill.clone());
        }
        if let Some(border) = xf.border_id.and_then(|id| self.borders.get(id)) {
            style.insert("border".to_string(), border.clone());
        }

        if style.is_empty() {
            None
        } else {
            Some(Value::Object(style))
        }
    }

    pub fn format_code(&self, num_fmt_id: u32) -> Option<String> {
        if let Some(code) = self.num_formats.get(&num_fmt_id) {
            return Some(code.clone());
        }
        builtin_format(num_fmt_id).map(String::from)
    }
}

/// 取得指定屬性的值（以字串回傳）
fn attribute_value(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .filter_map(std::result::Result::ok)
        .find(|attr| attr.key.as_ref() == name)
        .and_then(|attr| std::str::from_utf8(&attr.value).ok().map(String::from))
}

/// 常用的內建數值格式（numFmtId < 164）
fn builtin_format(id: u32) -> Option<&'static str> {
    match id {
        0 => Some("General"),
        1 => Some("0"),
        2 => Some("0.00"),
        3 => Some("#,##0"),
        4 => Some("#,##0.00"),
        9 => Some("0%"),
        10 => Some("0.00%"),
        11 => Some("0.00E+00"),
        14 => Some("m/d/yyyy"),
        15 => Some("d-mmm-yy"),
        16 => Some("d-mmm"),
        17 => Some("mmm-yy"),
        18 => Some("h:mm AM/PM"),
        19 => Some("h:mm:ss AM/PM"),
        20 => Some("h:mm"),
        21 => Some("h:mm:ss"),
        22 => Some("m/d/yyyy h:mm"),
        49 => Some("@"),
        _ => None,
    }
}

/// 解析 xl/styles.xml
pub fn parse_style_table(archive: &WorkbookArchive) -> Result<StyleTable> {
    match archive.read_part("xl/styles.xml")? {
        Some(xml) => Ok(parse_style_xml(&xml)),
        None => Ok(StyleTable::default()),
    }
}

fn parse_style_xml(xml: &str) -> StyleTable {
    let mut table = StyleTable::default();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut in_num_fmts = false;
    let mut in_cell_xfs = false;
    let mut in_fonts = false;
    let mut in_fills = false;
    let mut in_borders = false;

    // 目前累積中的 font / fill / border 物件
    let mut current_font: Option<serde_json::Map<String, Value>> = None;
    let mut current_fill: Option<serde_json::Map<String, Value>> = None;
    let mut current_border: Option<serde_json::Map<String, Value>> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            // 自閉合標籤（Empty）的 font/fill/border 要立即收尾
            Ok(event @ (Event::Start(_) | Event::Empty(_))) => {
                let is_empty = matches!(&event, Event::Empty(_));
                let e = match &event {
                    Event::Start(e) | Event::Empty(e) => e,
                    _ => unreachable!(),
                };
                match e.name().as_ref() {
                    b"numFmts" => in_num_fmts = true,
                    b"numFmt" if in_num_fmts => {
                        // <numFmt numFmtId="165" formatCode="0.000"/>
                        let mut id = None;
                        let mut code = None;
                        for attr in e.attributes().filter_map(std::result::Result::ok) {
                            match attr.key.as_ref() {
                                b"numFmtId" => {
                                    id = std::str::from_utf8(&attr.value)
                                        .ok()
                                        .and_then(|s| s.parse::<u32>().ok());
                                }
                                b"formatCode" => {
                                    code =
                                        std::str::from_utf8(&attr.value).ok().map(String::from);
                                }
                                _ => {}
                            }
                        }
                        if let (Some(id), Some(code)) = (id, code) {
                            table.num_formats.insert(id, code);
                        }
                    }
                    b"cellXfs" => in_cell_xfs = true,
                    b"xf" if in_cell_xfs => {
                        // <xf numFmtId="165" fontId="0" fillId="0" borderId="0"/>
                        let mut xf = CellXf::default();
                        for attr in e.attributes().filter_map(std::result::Result::ok) {
                            let value = std::str::from_utf8(&attr.value).ok();
                            match attr.key.as_ref() {
                                b"numFmtId" => {
                                    xf.num_fmt_id =
                                        value.and_then(|s| s.parse().ok()).unwrap_or(0);
                                }
                                b"fontId" => xf.font_id = value.and_then(|s| s.parse().ok()),
                                b"fillId" => xf.fill_id = value.and_then(|s| s.parse().ok()),
                                b"borderId" => xf.border_id = value.and_then(|s| s.parse().ok()),
                                _ => {}
                            }
                        }
                        table.cell_xfs.push(xf);
                    }
                    b"fonts" => in_fonts = true,
                    b"font" if in_fonts => {
                        let font = serde_json::Map::new();
                        if is_empty {
                            table.fonts.push(Value::Object(font));
                        } else {
                            current_font = Some(font);
                        }
                    }
                    b"name" => {
                        if let Some(font) = current_font.as_mut() {
                            if let Some(val) = attribute_value(e, b"val") {
                                font.insert("name".to_string(), Value::String(val));
                            }
                        }
                    }
                    b"sz" => {
                        if let Some(font) = current_font.as_mut() {
                            if let Some(val) = attribute_value(e, b"val") {
                                if let Ok(size) = val.parse::<f64>() {
                                    font.insert("size".to_string(), json!(size));
                                }
                            }
                        }
                    }
                    b"b" => {
                        if let Some(font) = current_font.as_mut() {
                            font.insert("bold".to_string(), Value::Bool(true));
                        }
                    }
                    b"i" => {
                        if let Some(font) = current_font.as_mut() {
                            font.insert("italic".to_string(), Value::Bool(true));
                        }
                    }
                    b"u" => {
                        if let Some(font) = current_font.as_mut() {
                            let style =
                                attribute_value(e, b"val").unwrap_or_else(|| "single".to_string());
                            font.insert("underline".to_string(), Value::String(style));
                        }
                    }
                    b"color" => {
                        let rgb = attribute_value(e, b"rgb");
                        if let Some(font) = current_font.as_mut() {
                            if let Some(rgb) = rgb {
                                font.insert("color".to_string(), Value::String(rgb));
                            }
                        } else if let Some(fill) = current_fill.as_mut() {
                            if let Some(rgb) = rgb {
                                fill.insert("color".to_string(), Value::String(rgb));
                            }
                        }
                    }
                    b"fills" => in_fills = true,
                    b"fill" if in_fills => {
                        let fill = serde_json::Map::new();
                        if is_empty {
                            table.fills.push(Value::Object(fill));
                        } else {
                            current_fill = Some(fill);
                        }
                    }
                    b"patternFill" => {
                        if let Some(fill) = current_fill.as_mut() {
                            if let Some(pattern) = attribute_value(e, b"patternType") {
                                fill.insert("fill_type".to_string(), Value::String(pattern));
                            }
                        }
                    }
                    b"fgColor" => {
                        if let Some(fill) = current_fill.as_mut() {
                            if let Some(rgb) = attribute_value(e, b"rgb") {
                                fill.insert("start_color".to_string(), Value::String(rgb));
                            }
                        }
                    }
                    b"bgColor" => {
                        if let Some(fill) = current_fill.as_mut() {
                            if let Some(rgb) = attribute_value(e, b"rgb") {
                                fill.insert("end_color".to_string(), Value::String(rgb));
                            }
                        }
                    }
                    b"borders" => in_borders = true,
                    b"border" if in_borders => {
                        let border = serde_json::Map::new();
                        if is_empty {
                            table.borders.push(Value::Object(border));
                        } else {
                            current_border = Some(border);
                        }
                    }
                    b"left" | b"right" | b"top" | b"bottom" => {
                        if let Some(border) = current_border.as_mut() {
                            if let Some(style) = attribute_value(e, b"style") {
                                let side =
                                    String::from_utf8_lossy(e.name().as_ref()).to_string();
                                border.insert(side, Value::String(style));
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"numFmts" => in_num_fmts = false,
                b"cellXfs" => in_cell_xfs = false,
                b"fonts" => in_fonts = false,
                b"fills" => in_fills = false,
                b"borders" => in_borders = false,
                b"font" => {
                    if let Some(font) = current_font.take() {
                        table.fonts.push(Value::Object(font));
                    }
                }
                b"fill" => {
                    if let Some(fill) = current_fill.take() {
                        table.fills.push(Value::Object(fill));
                    }
                }
                b"border" => {
                    if let Some(border) = current_border.take() {
                        table.borders.push(Value::Object(border));
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    table
}

/// 從工作表 XML 收集各儲存格的 styleId（<c r="A1" s="2"/>）
pub fn collect_cell_style_ids(xml: &str) -> BTreeMap<String, usize> {
    let mut styles = BTreeMap::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"c" {
                    let mut cell_ref = None;
                    let mut style_id = None;

                    for attr in e.attributes().filter_map(std::result::Result::ok) {
                        match attr.key.as_ref() {
                            b"r" => {
                                cell_ref =
                                    std::str::from_utf8(&attr.value).ok().map(String::from);
                            }
                            b"s" => {
                                style_id = std::str::from_utf8(&attr.value)
                                    .ok()
                                    .and_then(|s| s.parse::<usize>().ok());
                            }
                            _ => {}
                        }
                    }

                    // styleId 0 是預設樣式，不收
                    if let (Some(cell_ref), Some(style_id)) = (cell_ref, style_id) {
                        if style_id > 0 {
                            styles.insert(cell_ref, style_id);
                        }
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    styles
}

/// styles.json：工作表 -> 儲存格參照 -> 樣式物件
pub fn extract_styles(archive: &WorkbookArchive) -> Result<BTreeMap<String, BTreeMap<String, Value>>> {
    let table = parse_style_table(archive)?;
    let mut result = BTreeMap::new();

    for (sheet_name, sheet_path) in archive.sheet_part_paths()? {
        let sheet_xml = match archive.read_part(&sheet_path)? {
            Some(xml) => xml,
            None => continue,
        };

        let mut sheet_styles = BTreeMap::new();
        for (cell_ref, style_id) in collect_cell_style_ids(&sheet_xml) {
            if let Some(style) = table.cell_style(style_id) {
                sheet_styles.insert(cell_ref, style);
            }
        }

        if !sheet_styles.is_empty() {
            result.insert(sheet_name, sheet_styles);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES_XML: &str = r#"<?xml version="1.0"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <numFmts count="1">
    <numFmt numFmtId="165" formatCode="0.000"/>
  </numFmts>
  <fonts count="2">
    <font><sz val="11"/><name val="Calibri"/></font>
    <font><b/><sz val="14"/><name val="Arial"/><color rgb="FFFF0000"/></font>
  </fonts>
  <fills count="2">
    <fill><patternFill patternType="none"/></fill>
    <fill><patternFill patternType="solid"><fgColor rgb="FFFFFF00"/></patternFill></fill>
  </fills>
  <borders count="2">
    <border/>
    <border><left style="thin"/><right style="thin"/><top style="thin"/><bottom style="thin"/></border>
  </borders>
  <cellXfs count="2">
    <xf numFmtId="0" fontId="0" fillId="0" borderId="0"/>
    <xf numFmtId="165" fontId="1" fillId="1" borderId="1"/>
  </cellXfs>
</styleSheet>"#;

    #[test]
    fn test_parse_style_xml() {
        let table = parse_style_xml(STYLES_XML);

        assert_eq!(table.num_formats.get(&165).unwrap(), "0.000");
        assert_eq!(table.fonts.len(), 2);
        assert_eq!(table.fills.len(), 2);
        assert_eq!(table.borders.len(), 2);
        assert_eq!(table.cell_xfs.len(), 2);

        // 第二個樣式指向粗體紅字 Arial、黃色填滿、細框線
        let style = table.cell_style(1).unwrap();
        assert_eq!(style["number_format"], "0.000");
        assert_eq!(style["font"]["bold"], true);
        assert_eq!(style["font"]["name"], "Arial");
        assert_eq!(style["font"]["color"], "FFFF0000");
        assert_eq!(style["fill"]["fill_type"], "solid");
        assert_eq!(style["fill"]["start_color"], "FFFFFF00");
        assert_eq!(style["border"]["left"], "thin");
    }

    #[test]
    fn test_format_code_lookup() {
        let table = parse_style_xml(STYLES_XML);
        assert_eq!(table.format_code(165).unwrap(), "0.000");
        assert_eq!(table.format_code(9).unwrap(), "0%");
        assert_eq!(table.format_code(14).unwrap(), "m/d/yyyy");
        assert!(table.format_code(150).is_none());
    }

    #[test]
    fn test_collect_cell_style_ids() {
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" s="1" t="s"><v>0</v></c><c r="B1"><v>5</v></c></row>
            <row r="2"><c r="A2" s="0"><v>1</v></c></row>
        </sheetData></worksheet>"#;

        let ids = collect_cell_style_ids(xml);
        assert_eq!(ids.len(), 1);
        assert_eq!(ids.get("A1"), Some(&1));
    }
}
