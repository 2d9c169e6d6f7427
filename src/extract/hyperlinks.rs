use crate::domain::model::{HyperlinksSummary, WorkbookJson};
use crate::extract::parts::{parse_relationships, WorkbookArchive};
use crate::utils::error::Result;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// 從工作表 XML 抽出超連結
///
/// `<hyperlink>` 元素帶 ref 與 r:id，外部 URL 要透過該表的
/// _rels 檔解析；帶 location 屬性的是內部參照（指向其他儲存格）。
pub fn extract_hyperlinks(
    archive: &WorkbookArchive,
) -> Result<BTreeMap<String, BTreeMap<String, String>>> {
    let mut hyperlinks: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

    for (sheet_name, sheet_path) in archive.sheet_part_paths()? {
        let sheet_xml = match archive.read_part(&sheet_path)? {
            Some(xml) => xml,
            None => continue,
        };

        // 對應的 rels 檔：xl/worksheets/sheet1.xml -> xl/worksheets/_rels/sheet1.xml.rels
        let rels = sheet_rels_path(&sheet_path)
            .and_then(|rels_path| archive.read_part(&rels_path).ok().flatten())
            .map(|xml| parse_relationships(&xml))
            .unwrap_or_default();

        let sheet_links = parse_sheet_hyperlinks(&sheet_xml, &rels);
        if !sheet_links.is_empty() {
            hyperlinks.insert(sheet_name, sheet_links);
        }
    }

    Ok(hyperlinks)
}

/// 將超連結併入 sheetjson：逐儲存格加上 hyperlink.target，
/// 工作表層級加上 hyperlinks_summary
pub fn add_hyperlinks_to_sheetjson(
    sheetjson: &mut WorkbookJson,
    archive: &WorkbookArchive,
) -> Result<()> {
    let hyperlinks = extract_hyperlinks(archive)?;

    for (sheet_name, sheet_links) in hyperlinks {
        let Some(worksheet) = sheetjson.worksheets.get_mut(&sheet_name) else {
            continue;
        };

        for (cell_ref, target) in &sheet_links {
            let cell = worksheet
                .cells
                .entry(cell_ref.clone())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));

            if let Value::Object(cell_obj) = cell {
                cell_obj.insert("hyperlink".to_string(), json!({ "target": target }));
            }
        }

        worksheet.hyperlinks_summary = Some(HyperlinksSummary {
            count: sheet_links.len(),
            cells_with_hyperlinks: sheet_links.keys().cloned().collect(),
        });
    }

    Ok(())
}

fn sheet_rels_path(sheet_path: &str) -> Option<String> {
    let (dir, file) = sheet_path.rsplit_once('/')?;
    Some(format!("{}/_rels/{}.rels", dir, file))
}

fn parse_sheet_hyperlinks(
    xml: &str,
    rels: &std::collections::HashMap<String, String>,
) -> BTreeMap<String, String> {
    let mut links = BTreeMap::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut in_hyperlinks = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = e.name();
                let name_bytes = name.as_ref();

                if name_bytes == b"hyperlinks" {
                    in_hyperlinks = true;
                    continue;
                }

                // <hyperlink> 多半是自閉合標籤
                if in_hyperlinks && name_bytes == b"hyperlink" {
                    let mut cell_ref = None;
                    let mut rel_id = None;
                    let mut location = None;

                    for attr in e.attributes().filter_map(std::result::Result::ok) {
                        match attr.key.as_ref() {
                            b"ref" => {
                                cell_ref =
                                    std::str::from_utf8(&attr.value).ok().map(String::from);
                            }
                            b"r:id" => {
                                rel_id = std::str::from_utf8(&attr.value).ok().map(String::from);
                            }
                            b"location" => {
                                location =
                                    std::str::from_utf8(&attr.value).ok().map(String::from);
                            }
                            _ => {}
                        }
                    }

                    let Some(cell_ref) = cell_ref else { continue };

                    // 外部連結透過 rels 解析，內部參照直接用 location
                    let target = rel_id
                        .and_then(|id| rels.get(&id).cloned())
                        .or(location);

                    if let Some(target) = target {
                        links.insert(cell_ref, target);
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"hyperlinks" {
                    in_hyperlinks = false;
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SHEET_XML: &str = r#"<?xml version="1.0"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData/>
  <hyperlinks>
    <hyperlink ref="B2" r:id="rId1"/>
    <hyperlink ref="C3" location="Sheet2!A1"/>
  </hyperlinks>
</worksheet>"#;

    #[test]
    fn test_parse_sheet_hyperlinks() {
        let mut rels = HashMap::new();
        rels.insert("rId1".to_string(), "https://example.org/data".to_string());

        let links = parse_sheet_hyperlinks(SHEET_XML, &rels);
        assert_eq!(links.len(), 2);
        assert_eq!(links.get("B2").unwrap(), "https://example.org/data");
        assert_eq!(links.get("C3").unwrap(), "Sheet2!A1");
    }

    #[test]
    fn test_sheet_rels_path() {
        assert_eq!(
            sheet_rels_path("xl/worksheets/sheet1.xml").unwrap(),
            "xl/worksheets/_rels/sheet1.xml.rels"
        );
    }
}
