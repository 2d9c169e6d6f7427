use crate::extract::parts::WorkbookArchive;
use crate::utils::error::Result;
use serde_json::{json, Value};
use std::path::Path;

/// 抽出 VBA 專案
///
/// .xlsm 的巨集以 OLE 容器存在 xl/vbaProject.bin，
/// 這裡不解析內容，只偵測存在性並原樣保存 bytes。
pub fn extract_macros(archive: &WorkbookArchive, output_dir: &Path) -> Result<Value> {
    let mut info = serde_json::Map::new();

    match archive.read_part_bytes("xl/vbaProject.bin")? {
        Some(bytes) => {
            info.insert("has_vba".to_string(), Value::Bool(true));
            info.insert("vba_size_bytes".to_string(), json!(bytes.len()));

            let macros_dir = output_dir.join("macros");
            std::fs::create_dir_all(&macros_dir)?;
            let bin_path = macros_dir.join("vba_project.bin");
            std::fs::write(&bin_path, &bytes)?;

            info.insert(
                "vba_archive_saved".to_string(),
                Value::String(bin_path.to_string_lossy().to_string()),
            );
            tracing::debug!("📜 Saved VBA project ({} bytes)", bytes.len());
        }
        None => {
            info.insert("has_vba".to_string(), Value::Bool(false));
        }
    }

    Ok(Value::Object(info))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_vba_in_plain_archive() {
        // 手工組一個只有 mimetype 的 zip
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            use std::io::Write;
            let mut writer = zip::ZipWriter::new(&mut cursor);
            writer
                .start_file::<_, ()>("xl/workbook.xml", zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(b"<workbook/>").unwrap();
            writer.finish().unwrap();
        }

        let archive = WorkbookArchive::from_bytes(cursor.into_inner());
        let temp = tempfile::tempdir().unwrap();
        let info = extract_macros(&archive, temp.path()).unwrap();

        assert_eq!(info["has_vba"], false);
        assert!(info.get("vba_archive_saved").is_none());
    }
}
