// Layered configuration: file, then environment, then validation

use reelforge_core::config::{LlmProviderKind, SpeechEngineKind};
use reelforge_core::ReelforgeConfig;
use reelforge_llm::AssistantCatalog;
use reelforge_spk::AssemblerConfig;
use std::collections::HashMap;
use std::io::Write;

#[test]
fn test_toml_file_overrides_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[server]
port = 9090

[pipeline]
words_per_second = 2.5
timeline_segments = 4

[llm]
provider = "anthropic"

[speech]
engine = "openai"
truncate_tolerance_secs = 0.2
"#
    )
    .unwrap();

    let config = ReelforgeConfig::from_file(file.path().to_str().unwrap()).unwrap();
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.pipeline.timeline_segments, 4);
    assert_eq!(config.llm.provider, LlmProviderKind::Anthropic);
    assert_eq!(config.speech.engine, SpeechEngineKind::OpenAI);
    assert_eq!(config.speech.pad_tolerance_secs, 0.5);

    let assembler = AssemblerConfig::from_config(&config.speech, &config.pipeline);
    assert_eq!(assembler.words_per_second, 2.5);
    assert_eq!(assembler.truncate_tolerance_secs, 0.2);
}

#[test]
fn test_environment_wins_over_file() {
    let mut config = ReelforgeConfig::from_str(r#"{ "server": { "port": 7000 } }"#).unwrap();
    let env: HashMap<&str, &str> = [
        ("REELFORGE_PORT", "7100"),
        ("ELEVENLABS_API_KEY", "sk_test_key"),
        ("ELEVENLABS_VOICE_ID", "voice-1"),
    ]
    .into_iter()
    .collect();
    config.apply_env_with(|key| env.get(key).map(|v| v.to_string()));

    assert_eq!(config.server.port, 7100);
    assert_eq!(config.speech.elevenlabs_api_key.as_deref(), Some("sk_test_key"));
    assert_eq!(config.speech.voice_id.as_deref(), Some("voice-1"));
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_bounds_rejected() {
    let config = ReelforgeConfig::from_str(
        r#"{ "pipeline": { "min_target_duration": 90, "max_target_duration": 60 } }"#,
    )
    .unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_default_model_applies_to_presets() {
    let catalog = AssistantCatalog::defaults().with_default_model(Some("gpt-4o-mini".to_string()));
    assert_eq!(catalog.stage_ids().len(), 8);
    for id in catalog.stage_ids() {
        assert_eq!(catalog.get(id).unwrap().model.as_deref(), Some("gpt-4o-mini"));
    }
}
