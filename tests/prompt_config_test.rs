use sheet_taxonomy::config::prompts::PromptLibrary;
use sheet_taxonomy::config::stage_config::TaxonomyConfig;
use sheet_taxonomy::utils::validation::Validate;
use tempfile::TempDir;

#[test]
fn test_prompt_library_loads_from_files() {
    let temp = TempDir::new().unwrap();

    let prompts_path = temp.path().join("prompts.yaml");
    let details_path = temp.path().join("prompt_details.yaml");

    std::fs::write(
        &prompts_path,
        "system: \"Analyse [domain] spreadsheets.\"\nkeywords: \"From:\\n[data]\"\n",
    )
    .unwrap();
    std::fs::write(&details_path, "domain: \"wind farms\"\n").unwrap();

    let library = PromptLibrary::load(&prompts_path, &details_path).unwrap();

    assert_eq!(
        library.get_prompt("system").unwrap(),
        "Analyse wind farms spreadsheets."
    );
    // [data] 不在 details 裡，原樣保留給執行期替換
    assert!(library.get_prompt("keywords").unwrap().contains("[data]"));
}

#[test]
fn test_prompt_library_missing_details_file() {
    let temp = TempDir::new().unwrap();

    let prompts_path = temp.path().join("prompts.yaml");
    std::fs::write(&prompts_path, "keywords: \"From [data]\"\n").unwrap();

    // details 檔不存在也能載入
    let details_path = temp.path().join("does_not_exist.yaml");
    let library = PromptLibrary::load(&prompts_path, &details_path).unwrap();
    assert!(library.has_prompt("keywords"));
}

#[test]
fn test_repo_prompt_files_parse() {
    // 倉庫自帶的提示詞檔必須是有效的
    let library = PromptLibrary::load("prompts.yaml", "prompt_details.yaml").unwrap();

    for stage in ["keywords", "codes", "themes", "concepts", "conceptual_model"] {
        assert!(library.has_prompt(stage), "missing prompt for {}", stage);
    }

    // 領域佔位符已被填入
    let system = library.get_prompt("system").unwrap();
    assert!(!system.contains("[domain]"));
    assert!(system.contains("Orkney"));
}

#[test]
fn test_repo_taxonomy_config_parses_and_validates() {
    let config = TaxonomyConfig::from_file("taxonomy-config.toml").unwrap();
    assert!(config.validate().is_ok());

    assert_eq!(config.stages.execution_order.len(), 5);
    assert_eq!(config.stages.chunk_size(), 40);
    assert_eq!(config.stages.sleep_between_seconds(), 60);
    assert!(!config.stages.continue_on_failure());
}

#[test]
fn test_config_from_file_reports_missing_file() {
    let result = TaxonomyConfig::from_file("no_such_config.toml");
    assert!(result.is_err());
}
