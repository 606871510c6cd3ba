//! Tests for prompt templates under config/prompts

use std::fs;

#[test]
fn test_system_prompt_file_exists() {
    let path = "config/prompts/query_system.txt";
    assert!(fs::metadata(path).is_ok(), "query_system.txt prompt file missing");
}

#[test]
fn test_user_prompt_file_exists() {
    let path = "config/prompts/query_user.txt";
    assert!(fs::metadata(path).is_ok(), "query_user.txt prompt file missing");
}

#[test]
fn test_system_prompt_names_sentinels() {
    let text = fs::read_to_string("config/prompts/query_system.txt").unwrap();
    for sentinel in ["UNABLE_TO_QUERY", "MODIFICATION_NOT_ALLOWED", "OUT_OF_SCOPE"] {
        assert!(text.contains(sentinel), "query_system.txt should mention {sentinel}");
    }
}

#[test]
fn test_user_prompt_template_vars() {
    let text = fs::read_to_string("config/prompts/query_user.txt").unwrap();
    assert!(text.contains("{{schema_context}}"), "query_user.txt should contain {{schema_context}} variable");
    assert!(text.contains("{{question}}"), "query_user.txt should contain {{question}} variable");
}

#[test]
fn test_default_config_loads() {
    let cfg = docquery::config::load_from(
        std::path::Path::new("config/default.toml"),
        &docquery::config::Overrides::default(),
    )
    .unwrap();
    assert_eq!(cfg.prompts_dir, std::path::PathBuf::from("config/prompts"));
    assert_eq!(cfg.llm.provider, "ollama");
    assert_eq!(cfg.embedding.provider, "ollama");
}
