// src/services/insights.rs

use std::fmt::Write;

use crate::{
    error::AppError,
    models::{
        question::Question,
        quiz::Quiz,
        response::{QuestionOutcome, QuizResponse},
    },
    services::{ai::AiClient, generator::GenerationSource},
};

const SYSTEM_PROMPT: &str = "You are a supportive tutor. Given a student's quiz result, \
write short, concrete feedback in plain text: what went well, which topics to review \
and one study tip. At most 150 words.";

pub struct Insights {
    pub text: String,
    pub source: GenerationSource,
}

/// Produces feedback for a submitted response, preferring the remote model and
/// falling back to the local summary when it is unavailable.
pub async fn generate_insights(
    ai: Option<&dyn AiClient>,
    quiz: &Quiz,
    questions: &[Question],
    response: &QuizResponse,
) -> Result<Insights, AppError> {
    let outcomes: &[QuestionOutcome] = response
        .results
        .as_ref()
        .map(|r| r.0.as_slice())
        .ok_or_else(|| AppError::Conflict("Response has not been graded yet".to_string()))?;

    if let Some(ai) = ai {
        match ai.complete(SYSTEM_PROMPT, &build_prompt(quiz, questions, response, outcomes)).await {
            Ok(text) => {
                return Ok(Insights {
                    text: text.trim().to_string(),
                    source: GenerationSource::Ai,
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, response_id = response.id, "AI insights failed, using local summary");
            }
        }
    }

    Ok(Insights {
        text: local_insights(quiz, questions, response, outcomes),
        source: GenerationSource::Local,
    })
}

fn question_text(questions: &[Question], id: i64) -> &str {
    questions
        .iter()
        .find(|q| q.id == id)
        .map(|q| q.content.as_str())
        .unwrap_or("(removed question)")
}

fn build_prompt(
    quiz: &Quiz,
    questions: &[Question],
    response: &QuizResponse,
    outcomes: &[QuestionOutcome],
) -> String {
    let mut prompt = format!(
        "Quiz: {} (difficulty: {})\nScore: {}/{} ({:.1}%)\n",
        quiz.title,
        quiz.difficulty,
        response.score.unwrap_or(0),
        response.max_score.unwrap_or(0),
        response.percentage.unwrap_or(0.0)
    );

    let wrong: Vec<&QuestionOutcome> = outcomes.iter().filter(|o| !o.is_correct).collect();
    if wrong.is_empty() {
        prompt.push_str("All answers were correct.\n");
    } else {
        prompt.push_str("Incorrect or unanswered questions:\n");
        for o in wrong {
            let _ = writeln!(
                prompt,
                "- {} | student answered: {} | correct: {}",
                question_text(questions, o.question_id),
                o.answer.as_deref().unwrap_or("(no answer)"),
                o.correct_answer
            );
        }
    }
    prompt
}

/// Rule-based feedback: performance band, questions to review, time usage.
pub fn local_insights(
    quiz: &Quiz,
    questions: &[Question],
    response: &QuizResponse,
    outcomes: &[QuestionOutcome],
) -> String {
    let percentage = response.percentage.unwrap_or(0.0);
    let band = match percentage {
        p if p >= 90.0 => "Excellent work",
        p if p >= 75.0 => "Good job",
        p if p >= 60.0 => "You passed",
        p if p >= 40.0 => "Almost there",
        _ => "This topic needs more practice",
    };

    let mut text = format!(
        "{}: you scored {:.1}% on \"{}\".",
        band, percentage, quiz.title
    );

    let unanswered = outcomes.iter().filter(|o| o.answer.is_none()).count();
    let wrong: Vec<&QuestionOutcome> = outcomes
        .iter()
        .filter(|o| !o.is_correct && o.answer.is_some())
        .collect();

    if !wrong.is_empty() {
        text.push_str(" Review these questions:");
        for o in wrong.iter().take(3) {
            let _ = write!(text, " \"{}\" (correct answer: {});", question_text(questions, o.question_id), o.correct_answer);
        }
    }

    if unanswered > 0 {
        let _ = write!(
            text,
            " You left {} question{} unanswered; an educated guess never costs points.",
            unanswered,
            if unanswered == 1 { "" } else { "s" }
        );
    }

    let answered: Vec<&QuestionOutcome> = outcomes.iter().filter(|o| o.answer.is_some()).collect();
    if let Some(slowest) = answered.iter().max_by_key(|o| o.time_spent_seconds) {
        let total: i64 = answered.iter().map(|o| o.time_spent_seconds).sum();
        let average = total as f64 / answered.len() as f64;
        if slowest.time_spent_seconds as f64 > average * 1.5 && slowest.time_spent_seconds >= 30 {
            let _ = write!(
                text,
                " You spent {}s on \"{}\", well above your average of {:.0}s per question.",
                slowest.time_spent_seconds,
                question_text(questions, slowest.question_id),
                average
            );
        }
    }

    if wrong.is_empty() && unanswered == 0 {
        text.push_str(" Every answer was correct. Try a harder quiz next.");
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use sqlx::types::Json;

    struct EchoAi;

    #[async_trait]
    impl AiClient for EchoAi {
        async fn complete(&self, _system: &str, prompt: &str) -> Result<String, AppError> {
            Ok(format!("  Feedback for: {}  ", prompt.lines().next().unwrap_or("")))
        }
    }

    fn quiz() -> Quiz {
        Quiz {
            id: 1,
            owner_id: 1,
            title: "Cells".to_string(),
            description: None,
            difficulty: "medium".to_string(),
            time_limit_minutes: None,
            max_attempts: 1,
            status: "published".to_string(),
            source_document_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            published_at: None,
        }
    }

    fn question(id: i64, content: &str) -> Question {
        Question {
            id,
            quiz_id: 1,
            position: id as i32,
            question_type: "short".to_string(),
            content: content.to_string(),
            options: Json(vec![]),
            answer: "x".to_string(),
            explanation: None,
            points: 1,
            time_limit_seconds: None,
        }
    }

    fn outcome(id: i64, answer: Option<&str>, correct: bool, secs: i64) -> QuestionOutcome {
        QuestionOutcome {
            question_id: id,
            answer: answer.map(str::to_string),
            correct_answer: "x".to_string(),
            is_correct: correct,
            points_earned: correct as i32,
            points_possible: 1,
            time_spent_seconds: secs,
            explanation: None,
        }
    }

    fn response(percentage: f64, outcomes: Option<Vec<QuestionOutcome>>) -> QuizResponse {
        QuizResponse {
            id: 5,
            quiz_id: 1,
            student_id: 2,
            status: "submitted".to_string(),
            answers: Json(vec![]),
            started_at: Utc::now(),
            deadline: None,
            submitted_at: Some(Utc::now()),
            score: Some(1),
            max_score: Some(3),
            correct_count: Some(1),
            total_questions: Some(3),
            percentage: Some(percentage),
            results: outcomes.map(Json),
            insights: None,
            insights_source: None,
            insights_generated_at: None,
        }
    }

    #[test]
    fn test_local_insights_mentions_mistakes_and_gaps() {
        let questions = vec![
            question(1, "What is a cell?"),
            question(2, "Name an organelle."),
            question(3, "What does DNA encode?"),
        ];
        let outcomes = vec![
            outcome(1, Some("x"), true, 10),
            outcome(2, Some("y"), false, 90),
            outcome(3, None, false, 0),
        ];
        let resp = response(33.33, Some(outcomes.clone()));

        let text = local_insights(&quiz(), &questions, &resp, &outcomes);
        assert!(text.starts_with("This topic needs more practice"));
        assert!(text.contains("Name an organelle."));
        assert!(text.contains("1 question unanswered"));
        assert!(text.contains("You spent 90s"));
    }

    #[test]
    fn test_local_insights_perfect_score() {
        let questions = vec![question(1, "Q")];
        let outcomes = vec![outcome(1, Some("x"), true, 5)];
        let resp = response(100.0, Some(outcomes.clone()));

        let text = local_insights(&quiz(), &questions, &resp, &outcomes);
        assert!(text.starts_with("Excellent work"));
        assert!(text.contains("Every answer was correct"));
    }

    #[tokio::test]
    async fn test_generate_insights_prefers_ai() {
        let questions = vec![question(1, "Q")];
        let resp = response(100.0, Some(vec![outcome(1, Some("x"), true, 5)]));

        let insights = generate_insights(Some(&EchoAi as &dyn AiClient), &quiz(), &questions, &resp)
            .await
            .unwrap();
        assert_eq!(insights.source, GenerationSource::Ai);
        assert_eq!(insights.text, "Feedback for: Quiz: Cells (difficulty: medium)");
    }

    #[tokio::test]
    async fn test_generate_insights_requires_grading() {
        let resp = response(0.0, None);
        let result = generate_insights(None, &quiz(), &[], &resp).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }
}
