//! End-to-end instance flow: template instantiation, knowledge base wiring,
//! and the message pipeline through the instance manager.

use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use avatar_factory::core::plugin::PluginMessage;
use avatar_factory::{ServerConfig, state::AppState};

fn test_config(root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 3001,
        cors_origins: vec!["*".to_string()],
        azure_openai_endpoint: None,
        azure_openai_api_key: None,
        azure_openai_deployment: "gpt-4o-realtime-preview".to_string(),
        azure_openai_api_version: "2025-04-01-preview".to_string(),
        azure_speech_key: None,
        azure_speech_region: "westus2".to_string(),
        azure_search_endpoint: None,
        azure_search_api_key: None,
        azure_search_index: None,
        instances_root: root.join("instances"),
        templates_root: root.join("templates"),
        personas_root: root.join("personas"),
        data_root: root.join("data"),
        max_instances: 10,
        auth_api_secret: None,
        auth_required: false,
    }
}

async fn state_with_template(temp_dir: &TempDir) -> Arc<AppState> {
    let root = temp_dir.path();
    std::fs::create_dir_all(root.join("templates")).unwrap();
    std::fs::write(
        root.join("templates/support.yaml"),
        "instance:\n  environment: test\nplugins:\n  - rag_plugin\n",
    )
    .unwrap();
    std::fs::create_dir_all(root.join("personas")).unwrap();
    std::fs::write(
        root.join("personas/support.yaml"),
        "name: Support\nrole: Support Agent\nsystem_prompt: You answer support questions.\n",
    )
    .unwrap();

    AppState::new(test_config(root)).await
}

#[tokio::test]
async fn test_knowledge_base_feeds_responses() {
    let temp_dir = TempDir::new().unwrap();
    let state = state_with_template(&temp_dir).await;

    // Create the instance, then drop a document into its knowledge base
    state
        .manager
        .factory()
        .create_from_template("support", "support", None)
        .unwrap();
    std::fs::write(
        temp_dir
            .path()
            .join("instances/support/knowledge_base/refunds.md"),
        "Refunds are issued within five business days of approval.",
    )
    .unwrap();

    // Session start reloads the engine with the knowledge base wired in
    state.manager.start_session("support", None).await.unwrap();

    let response = state
        .manager
        .process_message("support", PluginMessage::text("how long do refunds take?"))
        .await
        .unwrap();

    let content = response["content"].as_str().unwrap();
    assert!(content.contains("[Source 1:"));
    assert!(content.contains("five business days"));

    let metadata = &response["metadata"];
    assert_eq!(metadata["plugin"], "rag_plugin");
    assert!(
        metadata["sources"][0]
            .as_str()
            .unwrap()
            .contains("refunds.md")
    );

    state.manager.stop_session("support").await.unwrap();
}

#[tokio::test]
async fn test_persona_template_applied() {
    let temp_dir = TempDir::new().unwrap();
    let state = state_with_template(&temp_dir).await;

    let engine = state
        .manager
        .factory()
        .create_from_template("support", "support", None)
        .unwrap();

    assert_eq!(engine.persona().name, "Support");
    let prompt = engine.persona().system_prompt();
    assert!(prompt.contains("You answer support questions."));
    assert!(prompt.contains("Your role is: Support Agent"));
}

#[tokio::test]
async fn test_restart_preserves_instance_files() {
    let temp_dir = TempDir::new().unwrap();
    let state = state_with_template(&temp_dir).await;

    state
        .manager
        .factory()
        .create_from_template("support", "support", None)
        .unwrap();

    state.manager.start_instance("support").await.unwrap();
    state.manager.restart_instance("support").await.unwrap();

    assert_eq!(
        state.manager.list_running_instances().await,
        vec!["support"]
    );
    assert!(
        temp_dir
            .path()
            .join("instances/support/config.yaml")
            .exists()
    );
}

#[tokio::test]
async fn test_transcript_accumulates_turns() {
    let temp_dir = TempDir::new().unwrap();
    let state = state_with_template(&temp_dir).await;

    state
        .manager
        .factory()
        .create_from_template("support", "support", None)
        .unwrap();
    std::fs::write(
        temp_dir
            .path()
            .join("instances/support/knowledge_base/hours.txt"),
        "Support hours are 9 to 5 on weekdays.",
    )
    .unwrap();

    state.manager.start_session("support", None).await.unwrap();

    state
        .manager
        .process_message("support", PluginMessage::text("what are your hours?"))
        .await
        .unwrap();
    state
        .manager
        .process_message("support", PluginMessage::text("weekend hours?"))
        .await
        .unwrap();

    let engine = state.manager.get_instance("support").await.unwrap();
    let history = engine.conversation_history().await;
    // Two user turns; assistant turns depend on retrieval hits
    let user_turns = history.iter().filter(|t| t.role == "user").count();
    assert_eq!(user_turns, 2);

    let result = state.manager.stop_session("support").await.unwrap();
    assert_eq!(result["metrics"]["messages_received"], 2);
}
