//! Canned acknowledgment and bridge phrases.
//!
//! Acknowledgments play the moment a question arrives, buying time while
//! retrieval and generation run. Bridges play after the answer, easing the
//! listener back into the presentation. Both are picked uniformly at random
//! from small pools; an optional generative bridge tailors the transition to
//! the actual question and upcoming material.

use crate::error::Result;
use crate::llm::TextGenerator;
use rand::seq::SliceRandom;

/// Acknowledgment pool, personalized with the listener's name when known.
pub fn acknowledgment_pool(listener_name: Option<&str>) -> Vec<String> {
    match listener_name {
        Some(name) => vec![
            format!("Great question, {}! Let me look into that.", name),
            format!("Good one, {}. Give me just a second.", name),
            format!("Interesting question, {}! One moment.", name),
            format!("Thanks for asking, {}. Let me check on that.", name),
            format!("Let me think about that for you, {}.", name),
        ],
        None => vec![
            "Great question! Let me look into that.".to_string(),
            "Good one. Give me just a second.".to_string(),
            "Interesting question! One moment.".to_string(),
            "Thanks for asking. Let me check on that.".to_string(),
            "Let me think about that for a moment.".to_string(),
        ],
    }
}

/// Pick a random acknowledgment phrase.
pub fn acknowledgment(listener_name: Option<&str>) -> String {
    let pool = acknowledgment_pool(listener_name);
    pool.choose(&mut rand::thread_rng())
        .cloned()
        .unwrap_or_default()
}

/// Bridge pool used when generative bridges are disabled or fail.
pub fn bridge_pool() -> Vec<String> {
    vec![
        "Alright, let's get back to it.".to_string(),
        "Good, now where were we? Ah yes.".to_string(),
        "Okay, picking up where we left off.".to_string(),
        "So, back to what we were discussing.".to_string(),
        "Right, let's continue.".to_string(),
    ]
}

/// Pick a random bridge phrase.
pub fn bridge() -> String {
    bridge_pool()
        .choose(&mut rand::thread_rng())
        .cloned()
        .unwrap_or_default()
}

/// Generate a one-sentence bridge tailored to the question just answered and
/// the material about to resume.
pub async fn generative_bridge(
    generator: &dyn TextGenerator,
    question: &str,
    answer: &str,
    next_segment: &str,
    speaker: Option<&str>,
) -> Result<String> {
    let system_prompt = match speaker {
        Some(name) => format!(
            "You are {}, resuming a live presentation after answering a \
             listener's question. Write exactly one short spoken sentence that \
             transitions from the answer back into the material. No quotes, no \
             markdown.",
            name
        ),
        None => "You are a narrator resuming an audio presentation after answering a \
             listener's question. Write exactly one short spoken sentence that \
             transitions from the answer back into the material. No quotes, no \
             markdown."
            .to_string(),
    };
    let user_prompt = format!(
        "The question was: {}\nThe answer given: {}\nThe presentation resumes with: {}",
        question, answer, next_segment
    );

    let text = generator.generate(&system_prompt, &user_prompt).await?;
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed);
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[test]
    fn test_acknowledgment_comes_from_pool() {
        let phrase = acknowledgment(Some("Sam"));
        assert!(acknowledgment_pool(Some("Sam")).contains(&phrase));
        assert!(phrase.contains("Sam"));

        let anonymous = acknowledgment(None);
        assert!(acknowledgment_pool(None).contains(&anonymous));
    }

    #[test]
    fn test_bridge_comes_from_pool() {
        let phrase = bridge();
        assert!(bridge_pool().contains(&phrase));
    }

    struct Quoted;

    #[async_trait]
    impl TextGenerator for Quoted {
        async fn generate(&self, _system: &str, _user: &str) -> Result<String> {
            Ok("\"Now, back to the roadmap.\"".to_string())
        }
    }

    #[tokio::test]
    async fn test_generative_bridge_strips_quotes() {
        let text = generative_bridge(&Quoted, "q", "a", "the roadmap", None)
            .await
            .unwrap();
        assert_eq!(text, "Now, back to the roadmap.");
    }
}
