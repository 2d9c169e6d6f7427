use crate::domain::model::WorkbookJson;
use crate::extract::parts::WorkbookArchive;
use crate::utils::error::Result;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;

/// 從 docProps/core.xml 與 docProps/app.xml 讀取文件屬性
///
/// core.xml 元素名帶命名空間前綴（dc:creator、cp:keywords、dcterms:created），
/// 去掉前綴後以元素名作為屬性鍵，對齊 openpyxl 的 properties 欄位。
pub fn extract_properties(archive: &WorkbookArchive) -> Result<serde_json::Map<String, Value>> {
    let mut properties = serde_json::Map::new();

    if let Some(core_xml) = archive.read_part("docProps/core.xml")? {
        collect_element_texts(&core_xml, &mut properties);
    }

    if let Some(app_xml) = archive.read_part("docProps/app.xml")? {
        let mut app_props = serde_json::Map::new();
        collect_element_texts(&app_xml, &mut app_props);
        // app.xml 只保留常用的兩個欄位，其餘是統計雜訊
        for key in ["Application", "Company"] {
            if let Some(v) = app_props.remove(key) {
                properties.insert(lowercase_first(key), v);
            }
        }
    }

    Ok(properties)
}

/// 將文件屬性併入 sheetjson 的 meta 區塊
pub fn add_metadata_to_sheetjson(
    sheetjson: &mut WorkbookJson,
    archive: &WorkbookArchive,
) -> Result<()> {
    sheetjson.meta = extract_properties(archive)?;
    Ok(())
}

/// metadata.json 的完整內容：文件屬性 + 結構資訊
pub fn build_metadata_report(
    archive: &WorkbookArchive,
    sheet_names: &[String],
    defined_names: &[(String, String)],
) -> Result<Value> {
    let properties = extract_properties(archive)?;

    let mut defined = serde_json::Map::new();
    for (name, refers_to) in defined_names {
        defined.insert(
            name.clone(),
            serde_json::json!({ "refers_to": refers_to }),
        );
    }

    let has_vba = archive.read_part_bytes("xl/vbaProject.bin")?.is_some();

    Ok(serde_json::json!({
        "sheet_names": sheet_names,
        "sheet_count": sheet_names.len(),
        "properties": properties,
        "defined_names": defined,
        "security": { "has_vba": has_vba },
    }))
}

/// 走訪 XML，將每個葉元素的文字內容收進 map（鍵為去除前綴的元素名）
fn collect_element_texts(xml: &str, out: &mut serde_json::Map<String, Value>) {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut current_element: Option<String> = None;
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;
                if depth == 2 {
                    let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                    current_element = Some(strip_ns_prefix(&name));
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(name), Ok(text)) = (&current_element, e.unescape()) {
                    let text = text.trim();
                    if !text.is_empty() {
                        out.insert(name.clone(), Value::String(text.to_string()));
                    }
                }
            }
            Ok(Event::End(_)) => {
                if depth == 2 {
                    current_element = None;
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
}

fn strip_ns_prefix(name: &str) -> String {
    name.rsplit(':').next().unwrap_or(name).to_string()
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
