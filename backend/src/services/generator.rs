// src/services/generator.rs

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        question::{CreateQuestionRequest, QuestionType},
        quiz::Difficulty,
    },
    services::ai::{AiClient, extract_json_array},
};

static SENTENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[^.!?\n]+[.!?]?").expect("sentence pattern is valid")
});

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\p{L}{5,}").expect("word pattern is valid"));

/// Only the first part of long documents is sent to the remote model.
const MAX_PROMPT_CHARS: usize = 12_000;

const BLANK: &str = "_____";

/// Longer sentences are skipped by the local generator.
const MAX_SENTENCE_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationSource {
    Ai,
    Local,
}

impl GenerationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationSource::Ai => "ai",
            GenerationSource::Local => "local",
        }
    }
}

#[derive(Debug)]
pub struct Generated {
    pub questions: Vec<CreateQuestionRequest>,
    pub source: GenerationSource,
}

/// Generates up to `count` questions from `document`.
///
/// Uses the remote model when one is configured and falls back to the local
/// cloze generator when it is absent, fails, or returns nothing usable.
pub async fn generate_questions(
    ai: Option<&dyn AiClient>,
    document: &str,
    count: usize,
    difficulty: Difficulty,
) -> Result<Generated, AppError> {
    if let Some(ai) = ai {
        match ai.complete(SYSTEM_PROMPT, &build_prompt(document, count, difficulty)).await {
            Ok(reply) => {
                let mut questions = parse_ai_questions(&reply);
                questions.truncate(count);
                if !questions.is_empty() {
                    return Ok(Generated {
                        questions,
                        source: GenerationSource::Ai,
                    });
                }
                tracing::warn!("AI reply contained no usable questions, generating locally");
            }
            Err(e) => {
                tracing::warn!(error = %e, "AI quiz generation failed, generating locally");
            }
        }
    }

    let questions = local_questions(document, count, difficulty);
    if questions.is_empty() {
        return Err(AppError::BadRequest(
            "Document does not contain enough text to generate questions".to_string(),
        ));
    }
    Ok(Generated {
        questions,
        source: GenerationSource::Local,
    })
}

const SYSTEM_PROMPT: &str = "You write quiz questions for teachers. \
Reply with a JSON array only. Each element is an object with the keys \
\"type\" (one of \"single\", \"multiple\", \"true_false\", \"short\"), \
\"content\", \"options\" (array of strings, empty for \"short\"), \
\"answer\" (for \"multiple\", the correct options joined by \"|\") and \"explanation\".";

fn build_prompt(document: &str, count: usize, difficulty: Difficulty) -> String {
    let excerpt: String = document.chars().take(MAX_PROMPT_CHARS).collect();
    format!(
        "Write {} {} questions about the following material.\n\n---\n{}\n---",
        count,
        difficulty.as_str(),
        excerpt
    )
}

/// Parses the model reply, keeping only items that pass validation.
pub fn parse_ai_questions(reply: &str) -> Vec<CreateQuestionRequest> {
    let Some(array) = extract_json_array(reply) else {
        return Vec::new();
    };
    let Ok(items) = serde_json::from_str::<Vec<serde_json::Value>>(array) else {
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<CreateQuestionRequest>(item).ok())
        .map(|mut q| {
            if q.question_type == QuestionType::TrueFalse && q.options.is_empty() {
                q.options = vec!["True".to_string(), "False".to_string()];
            }
            q
        })
        .filter(|q| q.validate().is_ok())
        .collect()
}

struct Candidate<'a> {
    sentence: &'a str,
    word: &'a str,
    start: usize,
    end: usize,
}

fn candidates(document: &str) -> Vec<Candidate<'_>> {
    SENTENCE
        .find_iter(document)
        .map(|m| m.as_str().trim())
        .filter(|s| s.split_whitespace().count() >= 5)
        .filter(|s| s.chars().count() <= MAX_SENTENCE_CHARS)
        .filter_map(|sentence| {
            let best = WORD
                .find_iter(sentence)
                .fold(None, |best: Option<regex::Match<'_>>, m| match best {
                    Some(b) if b.as_str().chars().count() >= m.as_str().chars().count() => Some(b),
                    _ => Some(m),
                })?;
            Some(Candidate {
                sentence,
                word: best.as_str(),
                start: best.start(),
                end: best.end(),
            })
        })
        .collect()
}

/// Builds cloze and true/false questions from the document's own sentences.
pub fn local_questions(document: &str, count: usize, difficulty: Difficulty) -> Vec<CreateQuestionRequest> {
    let candidates = candidates(document);

    let mut seen = HashSet::new();
    let pool: Vec<&str> = candidates
        .iter()
        .map(|c| c.word)
        .filter(|w| seen.insert(w.to_lowercase()))
        .collect();

    let distractor_count = match difficulty {
        Difficulty::Easy => 1,
        Difficulty::Medium => 2,
        Difficulty::Hard => 3,
    };

    candidates
        .iter()
        .take(count)
        .enumerate()
        .map(|(i, c)| {
            let distractors: Vec<&str> = (1..pool.len())
                .map(|offset| pool[(i + offset) % pool.len()])
                .filter(|w| !w.eq_ignore_ascii_case(c.word))
                .take(distractor_count)
                .collect();

            if distractors.is_empty() {
                return true_false(c.sentence, true);
            }

            if i % 4 == 3 {
                let altered = format!("{}{}{}", &c.sentence[..c.start], distractors[0], &c.sentence[c.end..]);
                return true_false(&altered, false);
            }

            let mut options: Vec<String> = std::iter::once(c.word)
                .chain(distractors.iter().copied())
                .map(str::to_string)
                .collect();
            let len = options.len();
            options.rotate_right(i % len);

            CreateQuestionRequest {
                question_type: QuestionType::Single,
                content: format!(
                    "Fill in the blank: {}{}{}",
                    &c.sentence[..c.start],
                    BLANK,
                    &c.sentence[c.end..]
                ),
                options,
                answer: c.word.to_string(),
                explanation: Some(format!("From the material: \"{}\"", c.sentence)),
                points: None,
                time_limit_seconds: None,
            }
        })
        .filter(|q| q.validate().is_ok())
        .collect()
}

fn true_false(statement: &str, holds: bool) -> CreateQuestionRequest {
    CreateQuestionRequest {
        question_type: QuestionType::TrueFalse,
        content: format!("True or false: {}", statement),
        options: vec!["True".to_string(), "False".to_string()],
        answer: if holds { "True" } else { "False" }.to_string(),
        explanation: None,
        points: None,
        time_limit_seconds: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    const MATERIAL: &str = "Photosynthesis converts light energy into chemical energy. \
        Chlorophyll absorbs mostly blue and red wavelengths of light. \
        The Calvin cycle fixes carbon dioxide into sugars inside chloroplasts. \
        Mitochondria release stored energy through cellular respiration. \
        Stomata regulate the exchange of gases between leaves and the atmosphere.";

    struct FixedAi(Result<String, ()>);

    #[async_trait]
    impl AiClient for FixedAi {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, AppError> {
            self.0
                .clone()
                .map_err(|_| AppError::InternalServerError("down".to_string()))
        }
    }

    #[test]
    fn test_local_questions_are_valid() {
        let questions = local_questions(MATERIAL, 10, Difficulty::Medium);
        assert_eq!(questions.len(), 5);
        for q in &questions {
            assert!(q.validate().is_ok(), "invalid generated question: {:?}", q);
        }
    }

    #[test]
    fn test_local_cloze_blanks_the_answer() {
        let questions = local_questions(MATERIAL, 1, Difficulty::Hard);
        let q = &questions[0];
        assert_eq!(q.question_type, QuestionType::Single);
        assert_eq!(q.answer, "Photosynthesis");
        assert!(q.content.contains(BLANK));
        assert!(!q.content.contains("Photosynthesis"));
        assert_eq!(q.options.len(), 4);
        assert!(q.options.contains(&"Photosynthesis".to_string()));
    }

    #[test]
    fn test_local_fourth_question_is_false_statement() {
        let questions = local_questions(MATERIAL, 4, Difficulty::Easy);
        assert_eq!(questions[3].question_type, QuestionType::TrueFalse);
        assert_eq!(questions[3].answer, "False");
    }

    #[test]
    fn test_single_sentence_falls_back_to_true_false() {
        let questions = local_questions("Rivers carry sediment towards the ocean.", 3, Difficulty::Medium);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].question_type, QuestionType::TrueFalse);
        assert_eq!(questions[0].answer, "True");
    }

    #[test]
    fn test_run_on_sentence_is_skipped() {
        let run_on = vec!["lorem ipsum dolor sit amet"; 130].join(" ");
        let document = format!("{}. {}", run_on, MATERIAL);

        let questions = local_questions(&document, 10, Difficulty::Medium);
        assert_eq!(questions.len(), 5);
        for q in &questions {
            assert!(q.validate().is_ok());
            assert!(q.content.chars().count() <= 2000);
        }
    }

    #[test]
    fn test_short_text_produces_nothing() {
        assert!(local_questions("Too short.", 5, Difficulty::Easy).is_empty());
    }

    #[test]
    fn test_parse_ai_questions_drops_invalid_items() {
        let reply = r#"Here you go:
        [
          {"type": "single", "content": "2 + 2?", "options": ["3", "4"], "answer": "4", "explanation": "Arithmetic"},
          {"type": "single", "content": "Bad", "options": ["a", "b"], "answer": "c"},
          {"type": "true_false", "content": "The sky is blue.", "answer": "True"},
          {"type": "essay", "content": "Unknown type", "answer": "x"}
        ]"#;

        let questions = parse_ai_questions(reply);
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].answer, "4");
        assert_eq!(questions[1].options, vec!["True", "False"]);
    }

    #[tokio::test]
    async fn test_generate_uses_ai_reply() {
        let ai = FixedAi(Ok(
            r#"[{"type": "short", "content": "Name the green pigment.", "answer": "Chlorophyll"}]"#.to_string(),
        ));
        let generated = generate_questions(Some(&ai as &dyn AiClient), MATERIAL, 5, Difficulty::Easy)
            .await
            .unwrap();
        assert_eq!(generated.source, GenerationSource::Ai);
        assert_eq!(generated.questions.len(), 1);
    }

    #[tokio::test]
    async fn test_generate_falls_back_when_ai_fails() {
        let ai = FixedAi(Err(()));
        let generated = generate_questions(Some(&ai as &dyn AiClient), MATERIAL, 3, Difficulty::Easy)
            .await
            .unwrap();
        assert_eq!(generated.source, GenerationSource::Local);
        assert_eq!(generated.questions.len(), 3);
    }

    #[tokio::test]
    async fn test_generate_without_ai_or_text_fails() {
        let result = generate_questions(None, "Hi.", 3, Difficulty::Easy).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
