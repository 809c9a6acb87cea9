//! Voices command - list voices on the configured TTS providers.

use crate::cli::Output;
use crate::config::Settings;
use crate::tts::TtsRegistry;
use console::style;

/// List every voice each configured provider reports.
pub async fn run_voices(settings: Settings) -> anyhow::Result<()> {
    let registry = TtsRegistry::from_settings(&settings);

    Output::header("Available Voices");

    let mut providers = registry.supported();
    providers.sort();

    for provider_name in providers {
        let provider = registry.get(provider_name)?;
        println!("\n{}", style(provider_name).bold());

        match provider.list_voices().await {
            Ok(voices) if voices.is_empty() => {
                Output::info("No voices available.");
            }
            Ok(voices) => {
                for voice in voices {
                    let mut line = format!(
                        "{} ({})",
                        style(&voice.name).bold(),
                        style(&voice.provider_voice_id).dim()
                    );
                    if voice.is_cloned {
                        line.push_str(&format!(" {}", style("[cloned]").cyan()));
                    }
                    if let Some(description) = &voice.description {
                        line.push_str(&format!(" - {}", description));
                    }
                    Output::list_item(&line);
                }
            }
            Err(e) => {
                Output::warning(&format!("Could not list voices: {}", e));
            }
        }
    }

    Ok(())
}
