// src/services/scoring.rs

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::{
    config::PASSING_PERCENTAGE,
    models::{
        question::{MULTI_ANSWER_SEPARATOR, Question, QuestionType},
        response::{AnswerEntry, QuestionOutcome},
    },
};

/// Aggregate grade of one attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreCard {
    pub score: i32,
    pub max_score: i32,
    pub correct_count: i32,
    pub total_questions: i32,
    pub percentage: f64,
    pub passed: bool,
    pub outcomes: Vec<QuestionOutcome>,
}

/// Lowercases, trims and collapses inner whitespace.
fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn option_set(s: &str) -> BTreeSet<String> {
    s.split(MULTI_ANSWER_SEPARATOR)
        .map(normalize)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Checks a single answer against the question's key.
pub fn is_correct(question: &Question, answer: &str) -> bool {
    if answer.trim().is_empty() {
        return false;
    }
    match question.kind() {
        QuestionType::Single | QuestionType::TrueFalse | QuestionType::Short => {
            normalize(answer) == normalize(&question.answer)
        }
        QuestionType::Multiple => {
            let expected = option_set(&question.answer);
            !expected.is_empty() && option_set(answer) == expected
        }
    }
}

/// Grades an attempt.
///
/// Every question of the quiz is graded; questions without an answer entry
/// count as incorrect, so partial submissions are scored against the full
/// quiz. Answer entries for questions outside the quiz are ignored.
pub fn score_answers(questions: &[Question], answers: &[AnswerEntry]) -> ScoreCard {
    let by_question: HashMap<i64, &AnswerEntry> =
        answers.iter().map(|a| (a.question_id, a)).collect();

    let mut score = 0;
    let mut max_score = 0;
    let mut correct_count = 0;
    let mut outcomes = Vec::with_capacity(questions.len());

    for question in questions {
        let entry = by_question.get(&question.id);
        let answer = entry.and_then(|e| e.answer.clone());
        let correct = answer.as_deref().is_some_and(|a| is_correct(question, a));
        let points = question.points.max(0);

        max_score += points;
        if correct {
            score += points;
            correct_count += 1;
        }

        outcomes.push(QuestionOutcome {
            question_id: question.id,
            answer,
            correct_answer: question.answer.clone(),
            is_correct: correct,
            points_earned: if correct { points } else { 0 },
            points_possible: points,
            time_spent_seconds: entry.map(|e| e.time_spent_seconds).unwrap_or(0),
            explanation: question.explanation.clone(),
        });
    }

    let percentage = percentage(score, max_score);

    ScoreCard {
        score,
        max_score,
        correct_count,
        total_questions: questions.len() as i32,
        percentage,
        passed: percentage >= PASSING_PERCENTAGE,
        outcomes,
    }
}

/// Percentage rounded to two decimals. Zero when nothing can be earned.
pub fn percentage(score: i32, max_score: i32) -> f64 {
    if max_score <= 0 {
        return 0.0;
    }
    let raw = score as f64 / max_score as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;

    fn question(id: i64, kind: QuestionType, answer: &str, points: i32) -> Question {
        Question {
            id,
            quiz_id: 1,
            position: id as i32,
            question_type: kind.as_str().to_string(),
            content: format!("Question {}", id),
            options: Json(vec!["A".into(), "B".into(), "C".into()]),
            answer: answer.to_string(),
            explanation: Some("Because".to_string()),
            points,
            time_limit_seconds: None,
        }
    }

    fn answered(question_id: i64, answer: &str) -> AnswerEntry {
        AnswerEntry {
            answer: Some(answer.to_string()),
            ..AnswerEntry::new(question_id)
        }
    }

    #[test]
    fn test_single_choice_ignores_case_and_spacing() {
        let q = question(1, QuestionType::Single, "Option A", 1);
        assert!(is_correct(&q, "  option   a "));
        assert!(!is_correct(&q, "Option B"));
        assert!(!is_correct(&q, "   "));
    }

    #[test]
    fn test_multiple_choice_requires_exact_set() {
        let q = question(1, QuestionType::Multiple, "A|C", 1);
        assert!(is_correct(&q, "c|a"));
        assert!(is_correct(&q, "A | C"));
        assert!(!is_correct(&q, "A"));
        assert!(!is_correct(&q, "A|B|C"));
    }

    #[test]
    fn test_short_answer_collapses_whitespace() {
        let q = question(1, QuestionType::Short, "Mitochondria", 1);
        assert!(is_correct(&q, "mitochondria"));
        assert!(!is_correct(&q, "ribosome"));
    }

    #[test]
    fn test_perfect_score() {
        let questions = vec![
            question(1, QuestionType::Single, "A", 1),
            question(2, QuestionType::TrueFalse, "True", 1),
        ];
        let answers = vec![answered(1, "A"), answered(2, "true")];

        let card = score_answers(&questions, &answers);
        assert_eq!(card.score, 2);
        assert_eq!(card.correct_count, 2);
        assert_eq!(card.percentage, 100.0);
        assert!(card.passed);
    }

    #[test]
    fn test_partial_submission_counts_missing_as_wrong() {
        let questions = vec![
            question(1, QuestionType::Single, "A", 1),
            question(2, QuestionType::Single, "B", 1),
            question(3, QuestionType::Single, "C", 2),
        ];
        let answers = vec![answered(1, "A"), AnswerEntry::new(2)];

        let card = score_answers(&questions, &answers);
        assert_eq!(card.score, 1);
        assert_eq!(card.max_score, 4);
        assert_eq!(card.total_questions, 3);
        assert_eq!(card.percentage, 25.0);
        assert!(!card.passed);
        assert_eq!(card.outcomes.len(), 3);
        assert_eq!(card.outcomes[2].answer, None);
        assert!(!card.outcomes[2].is_correct);
    }

    #[test]
    fn test_weighted_points_and_pass_threshold() {
        let questions = vec![
            question(1, QuestionType::Single, "A", 3),
            question(2, QuestionType::Single, "B", 2),
        ];
        let answers = vec![answered(1, "A"), answered(2, "C")];

        let card = score_answers(&questions, &answers);
        assert_eq!(card.score, 3);
        assert_eq!(card.percentage, 60.0);
        assert!(card.passed);
    }

    #[test]
    fn test_answers_to_foreign_questions_are_ignored() {
        let questions = vec![question(1, QuestionType::Single, "A", 1)];
        let answers = vec![answered(99, "A")];

        let card = score_answers(&questions, &answers);
        assert_eq!(card.score, 0);
        assert_eq!(card.outcomes.len(), 1);
    }

    #[test]
    fn test_empty_quiz_scores_zero() {
        let card = score_answers(&[], &[]);
        assert_eq!(card.percentage, 0.0);
        assert!(!card.passed);
    }

    #[test]
    fn test_percentage_rounds_to_two_decimals() {
        assert_eq!(percentage(1, 3), 33.33);
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(0, 0), 0.0);
    }
}
