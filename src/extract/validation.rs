use crate::domain::model::{SheetValidationRules, WorkbookJson};
use crate::extract::parts::WorkbookArchive;
use crate::utils::error::Result;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::Value;
use std::collections::BTreeMap;

/// 從工作表 XML 抽出資料驗證規則
///
/// `<dataValidation>` 的屬性（type、operator、sqref、提示訊息等）
/// 原樣收進規則物件，formula1/formula2 是子元素文字。
/// 只保留有值的欄位。
pub fn extract_data_validation(
    archive: &WorkbookArchive,
) -> Result<BTreeMap<String, SheetValidationRules>> {
    let mut rules = BTreeMap::new();

    for (sheet_name, sheet_path) in archive.sheet_part_paths()? {
        let sheet_xml = match archive.read_part(&sheet_path)? {
            Some(xml) => xml,
            None => continue,
        };

        let validations = parse_sheet_validations(&sheet_xml);
        if !validations.is_empty() {
            rules.insert(
                sheet_name.clone(),
                SheetValidationRules {
                    sheet_name,
                    validations,
                },
            );
        }
    }

    Ok(rules)
}

/// 將驗證規則併入 sheetjson 的各工作表
pub fn add_data_validation_to_sheetjson(
    sheetjson: &mut WorkbookJson,
    archive: &WorkbookArchive,
) -> Result<()> {
    let rules = extract_data_validation(archive)?;

    for (sheet_name, sheet_rules) in rules {
        if let Some(worksheet) = sheetjson.worksheets.get_mut(&sheet_name) {
            worksheet.data_validation = Some(sheet_rules);
        }
    }

    Ok(())
}

fn parse_sheet_validations(xml: &str) -> Vec<serde_json::Map<String, Value>> {
    let mut validations = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut current_rule: Option<serde_json::Map<String, Value>> = None;
    let mut current_formula: Option<&'static str> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"dataValidation" => {
                    current_rule = Some(rule_from_attributes(&e));
                }
                b"formula1" if current_rule.is_some() => current_formula = Some("formula1"),
                b"formula2" if current_rule.is_some() => current_formula = Some("formula2"),
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.name().as_ref() == b"dataValidation" {
                    validations.push(rule_from_attributes(&e));
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(rule), Some(key)) = (current_rule.as_mut(), current_formula) {
                    if let Ok(text) = e.unescape() {
                        rule.insert(key.to_string(), Value::String(text.to_string()));
                    }
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"dataValidation" => {
                    if let Some(rule) = current_rule.take() {
                        validations.push(rule);
                    }
                }
                b"formula1" | b"formula2" => current_formula = None,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    validations
}

fn rule_from_attributes(e: &BytesStart<'_>) -> serde_json::Map<String, Value> {
    let mut rule = serde_json::Map::new();

    for attr in e.attributes().filter_map(std::result::Result::ok) {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        if let Ok(value) = std::str::from_utf8(&attr.value) {
            if !value.is_empty() {
                rule.insert(key, Value::String(value.to_string()));
            }
        }
    }

    rule
}
