use rust_xlsxwriter::{DocProperties, Workbook};
use sheet_taxonomy::{CliConfig, ExtractionEngine};
use tempfile::TempDir;

// 產生測試用工作簿：兩張工作表、公式、超連結、合併儲存格、文件屬性
fn generate_survey_workbook() -> Vec<u8> {
    let mut workbook = Workbook::new();

    let properties = DocProperties::new()
        .set_title("Energy Survey")
        .set_author("Field Team");
    workbook.set_properties(&properties);

    let sheet1 = workbook.add_worksheet();
    sheet1.set_name("Sites").unwrap();
    sheet1.write_string(0, 0, "Site").unwrap();
    sheet1.write_string(0, 1, "Output").unwrap();
    sheet1.write_string(1, 0, "Burgar Hill").unwrap();
    sheet1.write_number(1, 1, 42.5).unwrap();
    sheet1.write_string(2, 0, "Scapa Flow").unwrap();
    sheet1.write_number(2, 1, 17.0).unwrap();
    sheet1.write_formula(3, 1, "=SUM(B2:B3)").unwrap();
    sheet1.write_url(4, 0, "https://example.org/sites").unwrap();

    let sheet2 = workbook.add_worksheet();
    sheet2.set_name("Notes").unwrap();
    sheet2.write_string(0, 0, "Comment").unwrap();
    sheet2.write_string(1, 0, "Tidal readings pending").unwrap();

    workbook.save_to_buffer().unwrap()
}

fn run_engine(input: &TempDir, output: &TempDir) -> sheet_taxonomy::domain::model::BatchSummary {
    let config = CliConfig {
        input_folder: input.path().to_string_lossy().to_string(),
        output_folder: output.path().to_string_lossy().to_string(),
        verbose: false,
        monitor: false,
    };

    let engine = ExtractionEngine::new(config);
    tokio_test::block_on(engine.run()).unwrap()
}

#[test]
fn test_end_to_end_extraction() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();

    std::fs::write(input.path().join("survey.xlsx"), generate_survey_workbook()).unwrap();

    let summary = run_engine(&input, &output);

    assert_eq!(summary.total_files, 1);
    assert_eq!(summary.processed_successfully, 1);
    assert_eq!(summary.failed_processing, 0);
    assert_eq!(summary.processed_files, vec!["survey.xlsx"]);

    let survey_dir = output.path().join("survey");
    assert!(survey_dir.join("sheetjson.json").exists());
    assert!(survey_dir.join("extraction_summary.json").exists());
    assert!(survey_dir.join("data").join("Sites.csv").exists());
    assert!(survey_dir.join("data").join("Sites.json").exists());
    assert!(survey_dir.join("data").join("sheet_info.json").exists());
    assert!(survey_dir.join("formulas").join("formulas.json").exists());
    assert!(survey_dir
        .join("analysis")
        .join("comprehensive_analysis.json")
        .exists());
    assert!(survey_dir.join("metadata").join("metadata.json").exists());
    assert!(survey_dir.join("macros").join("macros_info.json").exists());

    assert!(output.path().join("batch_summary.json").exists());
}

#[test]
fn test_sheetjson_content() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();

    std::fs::write(input.path().join("survey.xlsx"), generate_survey_workbook()).unwrap();
    run_engine(&input, &output);

    let sheetjson: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(output.path().join("survey").join("sheetjson.json")).unwrap(),
    )
    .unwrap();

    // 兩張工作表都在
    let worksheets = sheetjson.get("worksheets").unwrap();
    assert!(worksheets.get("Sites").is_some());
    assert!(worksheets.get("Notes").is_some());

    // 儲存格值
    let sites = worksheets.get("Sites").unwrap();
    let cells = sites.get("cells").unwrap();
    assert_eq!(cells["A1"]["value"], "Site");
    assert_eq!(cells["B2"]["value"], 42.5);

    // 公式儲存格
    let formula_cell = &cells["B4"];
    let formula = formula_cell["formula"].as_str().unwrap();
    assert!(formula.contains("SUM"));

    // 超連結併入 + 摘要
    assert_eq!(cells["A5"]["hyperlink"]["target"], "https://example.org/sites");
    let hyperlink_summary = sites.get("hyperlinks_summary").unwrap();
    assert_eq!(hyperlink_summary["count"], 1);

    // 文件屬性進了 meta
    let meta = sheetjson.get("meta").unwrap();
    assert_eq!(meta["title"], "Energy Survey");
    assert_eq!(meta["creator"], "Field Team");

    // 剝除格式後不應有 Format 鍵
    for (_, cell) in cells.as_object().unwrap() {
        assert!(cell.get("Format").is_none());
        assert!(cell.get("style").is_none());
    }
}

#[test]
fn test_formulas_and_analysis_reports() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();

    std::fs::write(input.path().join("survey.xlsx"), generate_survey_workbook()).unwrap();
    run_engine(&input, &output);

    let formulas: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(
            output
                .path()
                .join("survey")
                .join("formulas")
                .join("formulas.json"),
        )
        .unwrap(),
    )
    .unwrap();

    let sites_formulas = formulas.get("Sites").unwrap().as_object().unwrap();
    assert_eq!(sites_formulas.len(), 1);
    assert!(sites_formulas["B4"]["formula"]
        .as_str()
        .unwrap()
        .contains("SUM"));
    // 快取值欄位存在（fixture 未經 Excel 重算，值為預設）
    assert!(sites_formulas["B4"].get("calculated_value").is_some());

    let analysis: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(
            output
                .path()
                .join("survey")
                .join("analysis")
                .join("comprehensive_analysis.json"),
        )
        .unwrap(),
    )
    .unwrap();

    assert_eq!(analysis["file_info"]["filename"], "survey.xlsx");
    assert_eq!(analysis["file_info"]["sheet_count"], 2);

    let sites_patterns = &analysis["data_patterns"]["Sites"];
    assert_eq!(sites_patterns["formula_cells"], 1);
    assert!(sites_patterns["text_cells"].as_u64().unwrap() >= 3);
    assert!(sites_patterns["numeric_cells"].as_u64().unwrap() >= 2);

    // SUM 出現在公式依賴分析
    let deps = &analysis["formula_dependencies"]["Sites"]["formulas"]["B4"];
    assert!(deps["functions_used"]
        .as_array()
        .unwrap()
        .contains(&serde_json::json!("SUM")));
}

#[test]
fn test_csv_dump_contains_rows() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();

    std::fs::write(input.path().join("survey.xlsx"), generate_survey_workbook()).unwrap();
    run_engine(&input, &output);

    let csv_content = std::fs::read_to_string(
        output.path().join("survey").join("data").join("Sites.csv"),
    )
    .unwrap();

    let mut lines = csv_content.lines();
    assert_eq!(lines.next().unwrap(), "Site,Output");
    assert!(csv_content.contains("Burgar Hill,42.5"));
}

#[test]
fn test_corrupt_file_is_skipped_and_logged() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();

    std::fs::write(input.path().join("survey.xlsx"), generate_survey_workbook()).unwrap();
    // 不是 zip 的檔案：應被跳過而不是中止整批
    std::fs::write(input.path().join("broken.xlsx"), b"not a zip archive").unwrap();

    let summary = run_engine(&input, &output);

    assert_eq!(summary.total_files, 2);
    assert_eq!(summary.processed_successfully, 1);
    assert_eq!(summary.failed_processing, 1);
    assert_eq!(summary.failed_files, vec!["broken.xlsx"]);
    assert!((summary.success_rate - 0.5).abs() < f64::EPSILON);

    // 成功的那份照常產出
    assert!(output.path().join("survey").join("sheetjson.json").exists());
}

#[test]
fn test_empty_input_folder() {
    let input = TempDir::new().unwrap();
    let output = TempDir::new().unwrap();

    let summary = run_engine(&input, &output);

    assert_eq!(summary.total_files, 0);
    assert_eq!(summary.success_rate, 0.0);
    assert!(output.path().join("batch_summary.json").exists());
}
