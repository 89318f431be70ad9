use chorus_types::VoiceCatalog;
use chorus_voice::{TtsConfig, TtsService, VoiceError};
use std::sync::Arc;

fn service(piper_binary: impl Into<std::path::PathBuf>, voices_dir: impl Into<std::path::PathBuf>) -> TtsService {
    TtsService::new(
        TtsConfig {
            voices_dir: voices_dir.into(),
            piper_binary: piper_binary.into(),
        },
        Arc::new(VoiceCatalog::default()),
    )
}

#[tokio::test]
async fn test_tts_unknown_voice() {
    let svc = service("", "voices");

    let result = svc.synthesize("Hello", "en-US-JennyNeural", None, None).await;
    match result {
        Err(VoiceError::Tts(msg)) => assert!(msg.contains("Voice must be one of")),
        _ => panic!("Expected Tts error naming the allowed set, got {:?}", result),
    }
}

#[tokio::test]
async fn test_tts_empty_text() {
    let svc = service("", "voices");

    let result = svc.synthesize("", "en-GB-SoniaNeural", None, None).await;
    assert!(matches!(result, Err(VoiceError::Tts(_))));
}

#[tokio::test]
async fn test_tts_oversized_text() {
    let svc = service("", "voices");

    let text = "a".repeat(64 * 1024 + 1);
    let result = svc.synthesize(&text, "en-GB-SoniaNeural", None, None).await;
    match result {
        Err(VoiceError::Tts(msg)) => assert!(msg.contains("exceeds maximum size")),
        _ => panic!("Expected Tts size error, got {:?}", result),
    }
}

#[tokio::test]
async fn test_tts_invalid_rate() {
    let svc = service("", "voices");

    let result = svc
        .synthesize("Hello", "en-GB-SoniaNeural", Some("fast"), None)
        .await;
    assert!(matches!(result, Err(VoiceError::Audio(_))));
}

#[tokio::test]
async fn test_tts_missing_model_file() {
    // A piper binary that exists but a voice model that doesn't: the model
    // check must fail before anything is spawned.
    let temp_dir = tempfile::tempdir().unwrap();
    let piper_path = temp_dir.path().join("piper");
    std::fs::File::create(&piper_path).unwrap();

    let svc = service(&piper_path, temp_dir.path());

    let result = svc.synthesize("Hello", "en-GB-SoniaNeural", None, None).await;
    match result {
        Err(VoiceError::Tts(msg)) => assert!(msg.contains("Model file not found")),
        _ => panic!("Expected Tts error about missing model, got {:?}", result),
    }
}

#[tokio::test]
async fn test_tts_excessive_rate_rejected() {
    let svc = service("", "voices");

    // +250% would push the speed multiplier past the allowed range.
    let result = svc
        .synthesize("Hello", "en-GB-SoniaNeural", Some("+250%"), None)
        .await;
    assert!(result.is_err());
}
