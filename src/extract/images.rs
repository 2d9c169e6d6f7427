use crate::domain::model::ImageInfo;
use crate::extract::parts::{parse_relationships, resolve_part_path, WorkbookArchive};
use crate::utils::error::Result;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::Path;

/// 圖片在 drawing XML 裡的參照：relationship id + 錨點座標
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PictureRef {
    pub rel_id: String,
    /// (from_col, from_row, to_col, to_row)，0-based
    pub anchor: (u32, u32, u32, u32),
}

/// 從工作簿抽出所有嵌入圖片並寫到 output_dir/images/
///
/// 圖片存放結構：
/// - xl/drawings/drawingN.xml 描述 <xdr:pic> 與 r:embed
/// - xl/drawings/_rels/drawingN.xml.rels 把 rId 對應到 ../media/imageM.ext
/// - xl/media/ 放實際 bytes
pub fn extract_images(archive: &WorkbookArchive, output_dir: &Path) -> Result<Vec<ImageInfo>> {
    let mut extracted = Vec::new();
    let mut image_count = 0usize;

    for (sheet_name, sheet_path) in archive.sheet_part_paths()? {
        let Some(drawing_path) = drawing_path_for_sheet(archive, &sheet_path)? else {
            continue;
        };

        let Some(drawing_xml) = archive.read_part(&drawing_path)? else {
            continue;
        };

        let picture_refs = parse_drawing_for_pictures(&drawing_xml);
        if picture_refs.is_empty() {
            continue;
        }

        // drawing 的 rels 檔把 rId 對應到 media 路徑
        let rels_path = drawing_rels_path(&drawing_path);
        let rels = match archive.read_part(&rels_path)? {
            Some(xml) => parse_relationships(&xml),
            None => continue,
        };

        let drawing_dir = drawing_path.rsplit_once('/').map(|(d, _)| d).unwrap_or("xl");

        for picture in picture_refs {
            let Some(target) = rels.get(&picture.rel_id) else {
                tracing::warn!(
                    "🖼️ Unresolved image relationship '{}' in {}",
                    picture.rel_id,
                    drawing_path
                );
                continue;
            };

            let media_path = resolve_part_path(drawing_dir, target);
            let Some(bytes) = archive.read_part_bytes(&media_path)? else {
                tracing::warn!("🖼️ Missing media part: {}", media_path);
                continue;
            };

            image_count += 1;
            let filename = format!("image{}{}", image_count, sniff_image_extension(&bytes));
            let images_dir = output_dir.join("images");
            std::fs::create_dir_all(&images_dir)?;
            let filepath = images_dir.join(&filename);
            std::fs::write(&filepath, &bytes)?;

            tracing::debug!("🖼️ Extracted {} from sheet '{}'", filename, sheet_name);

            extracted.push(ImageInfo {
                sheet: sheet_name.clone(),
                filename,
                filepath: filepath.to_string_lossy().to_string(),
                anchor: picture.anchor,
            });
        }
    }

    Ok(extracted)
}

/// 依工作表的 rels 找到對應的 drawing 部件路徑
fn drawing_path_for_sheet(
    archive: &WorkbookArchive,
    sheet_path: &str,
) -> Result<Option<String>> {
    let Some((dir, file)) = sheet_path.rsplit_once('/') else {
        return Ok(None);
    };
    let rels_path = format!("{}/_rels/{}.rels", dir, file);

    let Some(rels_xml) = archive.read_part(&rels_path)? else {
        return Ok(None);
    };

    let drawing = parse_relationships(&rels_xml)
        .into_values()
        .find(|target| target.contains("drawings/"));

    Ok(drawing.map(|target| resolve_part_path(dir, &target)))
}

fn drawing_rels_path(drawing_path: &str) -> String {
    match drawing_path.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", drawing_path),
    }
}

/// 解析 drawing XML 的 <xdr:pic> 元素，取出 r:embed 與 from/to 錨點
pub fn parse_drawing_for_pictures(xml: &str) -> Vec<PictureRef> {
    let mut pictures = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut in_pic = false;
    let mut in_from = false;
    let mut in_to = false;
    let mut current_coord: Option<&'static str> = None;

    let mut current_rel_id: Option<String> = None;
    let mut from_col = 0u32;
    let mut from_row = 0u32;
    let mut to_col = 0u32;
    let mut to_row = 0u32;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"xdr:pic" | b"pic" => in_pic = true,
                b"a:blip" | b"blip" if in_pic => {
                    for attr in e.attributes().filter_map(std::result::Result::ok) {
                        let key = attr.key;
                        if key.as_ref() == b"r:embed" || key.as_ref() == b"embed" {
                            current_rel_id =
                                std::str::from_utf8(&attr.value).ok().map(String::from);
                        }
                    }
                }
                b"xdr:from" | b"from" => in_from = true,
                b"xdr:to" | b"to" => in_to = true,
                b"xdr:col" | b"col" if in_from => current_coord = Some("from_col"),
                b"xdr:row" | b"row" if in_from => current_coord = Some("from_row"),
                b"xdr:col" | b"col" if in_to => current_coord = Some("to_col"),
                b"xdr:row" | b"row" if in_to => current_coord = Some("to_row"),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if let (Some(which), Ok(text)) = (current_coord, e.unescape()) {
                    let value: u32 = text.trim().parse().unwrap_or(0);
                    match which {
                        "from_col" => from_col = value,
                        "from_row" => from_row = value,
                        "to_col" => to_col = value,
                        "to_row" => to_row = value,
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"xdr:pic" | b"pic" => {
                    if let Some(rel_id) = current_rel_id.take() {
                        pictures.push(PictureRef {
                            rel_id,
                            anchor: (from_col, from_row, to_col, to_row),
                        });
                    }
                    in_pic = false;
                    from_col = 0;
                    from_row = 0;
                    to_col = 0;
                    to_row = 0;
                }
                b"xdr:from" | b"from" => in_from = false,
                b"xdr:to" | b"to" => in_to = false,
                b"xdr:col" | b"col" | b"xdr:row" | b"row" => current_coord = None,
                _ => {}
            },
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    pictures
}

/// 用 magic bytes 判斷圖片格式，未知一律當 PNG
pub fn sniff_image_extension(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(b"\x89PNG") {
        ".png"
    } else if bytes.starts_with(b"\xff\xd8") {
        ".jpg"
    } else if bytes.starts_with(b"GIF") {
        ".gif"
    } else if bytes.starts_with(b"BM") {
        ".bmp"
    } else {
        ".png"
    }
}
