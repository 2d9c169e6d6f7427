use crate::utils::error::{Result, TaxonomyError};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;
use zip::ZipArchive;

/// .xlsx 檔案的 zip 部件存取層
///
/// calamine 不會暴露 drawings、charts、docProps 等部件，
/// 這裡保留整份檔案的 bytes，按名稱讀取個別 XML。
pub struct WorkbookArchive {
    bytes: Vec<u8>,
}

impl WorkbookArchive {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(Self { bytes })
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn archive(&self) -> Result<ZipArchive<Cursor<&[u8]>>> {
        Ok(ZipArchive::new(Cursor::new(self.bytes.as_slice()))?)
    }

    /// 讀取部件內容為字串，部件不存在時回傳 None
    pub fn read_part(&self, name: &str) -> Result<Option<String>> {
        let mut archive = self.archive()?;
        let result = match archive.by_name(name) {
            Ok(mut file) => {
                let mut content = String::new();
                file.read_to_string(&mut content)?;
                Ok(Some(content))
            }
            Err(zip::result::ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(TaxonomyError::ZipError(e)),
        };
        result
    }

    /// 讀取部件內容為 bytes（圖片、vbaProject.bin 等二進位部件）
    pub fn read_part_bytes(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let mut archive = self.archive()?;
        let result = match archive.by_name(name) {
            Ok(mut file) => {
                let mut content = Vec::new();
                file.read_to_end(&mut content)?;
                Ok(Some(content))
            }
            Err(zip::result::ZipError::FileNotFound) => Ok(None),
            Err(e) => Err(TaxonomyError::ZipError(e)),
        };
        result
    }

    pub fn part_names(&self) -> Result<Vec<String>> {
        let archive = self.archive()?;
        Ok(archive.file_names().map(|n| n.to_string()).collect())
    }

    /// 按工作簿順序取得 (工作表名稱, 工作表 XML 路徑)
    ///
    /// xl/workbook.xml 的 `<sheet>` 帶 r:id，
    /// xl/_rels/workbook.xml.rels 再把 r:id 對應到 worksheets/sheetN.xml。
    pub fn sheet_part_paths(&self) -> Result<Vec<(String, String)>> {
        let workbook_xml = match self.read_part("xl/workbook.xml")? {
            Some(xml) => xml,
            None => return Ok(Vec::new()),
        };
        let rels = match self.read_part("xl/_rels/workbook.xml.rels")? {
            Some(xml) => parse_relationships(&xml),
            None => HashMap::new(),
        };

        let mut reader = Reader::from_str(&workbook_xml);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut sheets = Vec::new();

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                    if e.name().as_ref() == b"sheet" {
                        let mut name = None;
                        let mut rel_id = None;

                        for attr in e.attributes() {
                            let attr = attr.map_err(|e| TaxonomyError::ExtractionError {
                                component: "workbook.xml".to_string(),
                                details: format!("XML attribute error: {}", e),
                            })?;
                            match attr.key.as_ref() {
                                b"name" => {
                                    name = Some(
                                        std::str::from_utf8(&attr.value)
                                            .unwrap_or_default()
                                            .to_string(),
                                    );
                                }
                                b"r:id" => {
                                    rel_id = Some(
                                        std::str::from_utf8(&attr.value)
                                            .unwrap_or_default()
                                            .to_string(),
                                    );
                                }
                                _ => {}
                            }
                        }

                        if let (Some(name), Some(rel_id)) = (name, rel_id) {
                            if let Some(target) = rels.get(&rel_id) {
                                sheets.push((name, resolve_part_path("xl", target)));
                            }
                        }
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(TaxonomyError::XmlError(e)),
                _ => {}
            }
            buf.clear();
        }

        Ok(sheets)
    }
}

/// 從 xl/workbook.xml 解析具名範圍（名稱 -> 參照文字）
///
/// Excel 的內部名稱（_xlnm.* 與篩選器）不收。
pub fn parse_defined_names(archive: &WorkbookArchive) -> Result<Vec<(String, String)>> {
    let workbook_xml = match archive.read_part("xl/workbook.xml")? {
        Some(xml) => xml,
        None => return Ok(Vec::new()),
    };

    let mut reader = Reader::from_str(&workbook_xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut defined_names = Vec::new();
    let mut in_defined_names = false;
    let mut current_name = String::new();
    let mut current_ref = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"definedNames" => in_defined_names = true,
                b"definedName" if in_defined_names => {
                    for attr in e.attributes().filter_map(std::result::Result::ok) {
                        if attr.key.as_ref() == b"name" {
                            current_name = std::str::from_utf8(&attr.value)
                                .unwrap_or_default()
                                .to_string();
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_defined_names && !current_name.is_empty() {
                    current_ref = e.unescape().unwrap_or_default().to_string();
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"definedName" if !current_name.is_empty() => {
                    // 過濾 Excel 內部名稱
                    if !current_name.starts_with("_xlnm.")
                        && !current_name.contains("_FilterDatabase")
                    {
                        defined_names.push((current_name.clone(), current_ref.clone()));
                    }
                    current_name.clear();
                    current_ref.clear();
                }
                b"definedNames" => in_defined_names = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(TaxonomyError::XmlError(e)),
            _ => {}
        }
        buf.clear();
    }

    Ok(defined_names)
}

/// 解析 .rels 檔案，回傳 Id -> Target 的對應
pub fn parse_relationships(xml: &str) -> HashMap<String, String> {
    let mut relationships = HashMap::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(e)) | Ok(Event::Start(e)) => {
                if e.name().as_ref() == b"Relationship" {
                    let mut id = None;
                    let mut target = None;

                    for attr in e.attributes().filter_map(std::result::Result::ok) {
                        match attr.key.as_ref() {
                            b"Id" => {
                                id = std::str::from_utf8(&attr.value).ok().map(String::from);
                            }
                            b"Target" => {
                                target = std::str::from_utf8(&attr.value).ok().map(String::from);
                            }
                            _ => {}
                        }
                    }

                    if let (Some(id), Some(target)) = (id, target) {
                        relationships.insert(id, target);
                    }
                }
            }
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    relationships
}

/// 將相對的部件目標轉成絕對路徑
///
/// rels 裡的 Target 相對於所屬部件的資料夾，
/// 例如 base "xl/drawings"、target "../media/image1.png" -> "xl/media/image1.png"
pub fn resolve_part_path(base_dir: &str, target: &str) -> String {
    if let Some(stripped) = target.strip_prefix('/') {
        return stripped.to_string();
    }

    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for part in target.split('/') {
        match part {
            ".." => {
                segments.pop();
            }
            "." | "" => {}
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// 0-based 欄索引轉欄字母（0 -> "A"、26 -> "AA"）
pub fn column_letters(col: u32) -> String {
    let mut col = col;
    let mut letters = String::new();
    loop {
        letters.insert(0, (b'A' + (col % 26) as u8) as char);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    letters
}

/// 0-based (row, col) 轉 "A1" 形式的儲存格參照
pub fn cell_ref(row: u32, col: u32) -> String {
    format!("{}{}", column_letters(col), row + 1)
}

/// "A1" 形式的儲存格參照轉 0-based (row, col)
pub fn parse_cell_ref(reference: &str) -> Option<(u32, u32)> {
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() {
        return None;
    }

    let mut col: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_uppercase() {
            return None;
        }
        col = col * 26 + (c as u32 - 'A' as u32 + 1);
    }

    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row - 1, col - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(27), "AB");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_letters(702), "AAA");
    }

    #[test]
    fn test_cell_ref_round_trip() {
        assert_eq!(cell_ref(0, 0), "A1");
        assert_eq!(cell_ref(9, 2), "C10");
        assert_eq!(parse_cell_ref("A1"), Some((0, 0)));
        assert_eq!(parse_cell_ref("C10"), Some((9, 2)));
        assert_eq!(parse_cell_ref("AA3"), Some((2, 26)));
        assert_eq!(parse_cell_ref("1A"), None);
        assert_eq!(parse_cell_ref(""), None);
    }

    #[test]
    fn test_resolve_part_path() {
        assert_eq!(
            resolve_part_path("xl/drawings", "../media/image1.png"),
            "xl/media/image1.png"
        );
        assert_eq!(
            resolve_part_path("xl", "worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(resolve_part_path("xl", "/xl/media/a.png"), "xl/media/a.png");
    }

    #[test]
    fn test_parse_relationships() {
        let xml = r#"<?xml version="1.0"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://example.com/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="http://example.com/image" Target="../media/image1.png"/>
</Relationships>"#;

        let rels = parse_relationships(xml);
        assert_eq!(rels.get("rId1").unwrap(), "worksheets/sheet1.xml");
        assert_eq!(rels.get("rId2").unwrap(), "../media/image1.png");
    }
}
