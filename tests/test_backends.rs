use futures::StreamExt;
use kindly::{
    builder::{Backend, ProviderBuilder},
    chat::{ChatProvider, ChatRequest},
    controller::StreamingTurnController,
    persona::PersonaConfig,
    render::{RecordingSurface, CURSOR_GLYPH},
    session,
};
use std::sync::Arc;

// Backend configuration struct to hold backend-specific settings
#[derive(Debug, Clone)]
struct BackendConfig {
    backend: Backend,
    env_key: &'static str,
    model: &'static str,
    backend_name: &'static str,
}

// Define all backend configurations
fn get_backend_configs() -> Vec<BackendConfig> {
    vec![
        BackendConfig {
            backend: Backend::OpenAI,
            env_key: "OPENAI_API_KEY",
            model: "gpt-4o-mini",
            backend_name: "openai",
        },
        BackendConfig {
            backend: Backend::Google,
            env_key: "GOOGLE_API_KEY",
            model: "gemini-2.5-flash-lite",
            backend_name: "google",
        },
    ]
}

fn persona_for(config: &BackendConfig) -> PersonaConfig {
    let mut persona = match config.backend {
        Backend::Google => PersonaConfig::friendly(),
        Backend::OpenAI => PersonaConfig::kindly(),
    }
    .with_model(config.model)
    .with_max_tokens(256);
    persona.thinking_level = None;
    persona
}

// Skips the test when the provider key is not available
fn live_provider(
    config: &BackendConfig,
    test: &str,
) -> Option<Arc<dyn ChatProvider>> {
    let api_key = match std::env::var(config.env_key) {
        Ok(key) if !key.trim().is_empty() => key,
        _ => {
            eprintln!(
                "test test_{}_{} ... ignored, {} not set",
                config.backend_name, test, config.env_key
            );
            return None;
        }
    };
    Some(
        ProviderBuilder::new()
            .backend(config.backend)
            .api_key(api_key)
            .timeout_seconds(60)
            .build()
            .expect("Failed to build provider"),
    )
}

// Generic test function for raw fragment streaming
async fn test_chat_stream(config: &BackendConfig) -> Result<(), Box<dyn std::error::Error>> {
    let Some(provider) = live_provider(config, "chat_stream") else {
        return Ok(());
    };
    let persona = persona_for(config);
    let request = ChatRequest::single_turn(&persona, "My friend ignored me at lunch.");

    let mut stream = provider.chat_stream(&request).await?;
    let mut complete_text = String::new();
    let mut fragments = 0;
    while let Some(fragment) = stream.next().await {
        complete_text.push_str(&fragment?);
        fragments += 1;
    }
    assert!(fragments > 0, "Expected at least one fragment");
    assert!(
        !complete_text.trim().is_empty(),
        "Expected response message, got empty text for {}",
        config.backend_name
    );
    Ok(())
}

// Generic test function for a full turn through the controller
async fn test_turn_commit(config: &BackendConfig) -> Result<(), Box<dyn std::error::Error>> {
    let Some(provider) = live_provider(config, "turn_commit") else {
        return Ok(());
    };
    let persona = persona_for(config);
    let session = session::create_session(persona.greeting.clone());
    let controller = StreamingTurnController::new(provider, persona);
    let mut surface = RecordingSurface::new();

    let outcome = controller
        .submit_turn(&session, "I am mad at Sam", &mut surface)
        .await?;

    assert!(!outcome.text.is_empty());
    assert_eq!(surface.commits(), vec![outcome.text.as_str()]);
    let fragments = surface.fragments();
    assert_eq!(fragments.len(), outcome.fragments);
    assert!(fragments.iter().all(|view| view.ends_with(CURSOR_GLYPH)));
    assert_eq!(session.transcript().await.len(), 3);
    Ok(())
}

// Macro to generate individual test functions for each backend
macro_rules! generate_backend_tests {
    ($($backend_name:ident),* $(,)?) => {
        $(
            paste::paste! {
                #[tokio::test]
                async fn [<test_ $backend_name _chat_stream>]() -> Result<(), Box<dyn std::error::Error>> {
                    let configs = get_backend_configs();
                    let config = configs.iter()
                        .find(|c| c.backend_name == stringify!($backend_name))
                        .expect(&format!("Backend config not found for {}", stringify!($backend_name)));
                    test_chat_stream(config).await
                }

                #[tokio::test]
                async fn [<test_ $backend_name _turn_commit>]() -> Result<(), Box<dyn std::error::Error>> {
                    let configs = get_backend_configs();
                    let config = configs.iter()
                        .find(|c| c.backend_name == stringify!($backend_name))
                        .expect(&format!("Backend config not found for {}", stringify!($backend_name)));
                    test_turn_commit(config).await
                }
            }
        )*
    };
}

// Generate tests for each backend
generate_backend_tests!(openai, google);
