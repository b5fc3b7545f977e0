// src/services/analytics.rs

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::{
    config::PASSING_PERCENTAGE,
    models::{question::Question, response::QuizResponse},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuestionStats {
    pub question_id: i64,
    pub position: i32,
    pub content: String,
    pub attempted: usize,
    pub correct: usize,
    /// Share of correct answers among attempts, in percent.
    pub accuracy: f64,
    pub average_time_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuizAnalytics {
    pub quiz_id: i64,
    pub attempts: usize,
    pub average_percentage: f64,
    pub highest_percentage: f64,
    pub lowest_percentage: f64,
    pub pass_rate: f64,
    pub average_duration_seconds: f64,
    pub questions: Vec<QuestionStats>,
    /// Up to three questions with the lowest accuracy, hardest first.
    pub hardest_question_ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentSummary {
    /// Distinct quizzes with at least one submitted attempt.
    pub quizzes_taken: usize,
    pub attempts: usize,
    pub average_percentage: f64,
    pub best_percentage: f64,
    /// Distinct quizzes with at least one passing attempt.
    pub passed: usize,
    /// Difference between the mean of the last three attempts and the mean of
    /// the earlier ones. Positive means improving. `None` with fewer than four attempts.
    pub recent_trend: Option<f64>,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Aggregates the submitted responses of one quiz.
/// Responses that are still in progress are skipped.
pub fn summarize_quiz(quiz_id: i64, questions: &[Question], responses: &[QuizResponse]) -> QuizAnalytics {
    let submitted: Vec<&QuizResponse> = responses
        .iter()
        .filter(|r| r.submitted_at.is_some() && r.percentage.is_some())
        .collect();

    let percentages: Vec<f64> = submitted.iter().filter_map(|r| r.percentage).collect();
    let durations: Vec<f64> = submitted
        .iter()
        .filter_map(|r| r.submitted_at.map(|s| (s - r.started_at).num_seconds().max(0) as f64))
        .collect();
    let passed = percentages.iter().filter(|p| **p >= PASSING_PERCENTAGE).count();

    // question_id -> (attempted, correct, total time)
    let mut tally: HashMap<i64, (usize, usize, i64)> = HashMap::new();
    for response in &submitted {
        let Some(results) = &response.results else {
            continue;
        };
        for outcome in results.iter() {
            let slot = tally.entry(outcome.question_id).or_insert((0, 0, 0));
            if outcome.answer.is_some() {
                slot.0 += 1;
                slot.2 += outcome.time_spent_seconds;
            }
            if outcome.is_correct {
                slot.1 += 1;
            }
        }
    }

    let question_stats: Vec<QuestionStats> = questions
        .iter()
        .map(|q| {
            let (attempted, correct, time) = tally.get(&q.id).copied().unwrap_or((0, 0, 0));
            QuestionStats {
                question_id: q.id,
                position: q.position,
                content: q.content.clone(),
                attempted,
                correct,
                accuracy: if attempted == 0 {
                    0.0
                } else {
                    round2(correct as f64 / attempted as f64 * 100.0)
                },
                average_time_seconds: if attempted == 0 {
                    0.0
                } else {
                    round2(time as f64 / attempted as f64)
                },
            }
        })
        .collect();

    let mut ranked: Vec<&QuestionStats> = question_stats.iter().filter(|s| s.attempted > 0).collect();
    ranked.sort_by(|a, b| {
        a.accuracy
            .partial_cmp(&b.accuracy)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.position.cmp(&b.position))
    });
    let hardest_question_ids = ranked.iter().take(3).map(|s| s.question_id).collect();

    QuizAnalytics {
        quiz_id,
        attempts: submitted.len(),
        average_percentage: round2(mean(&percentages)),
        highest_percentage: percentages.iter().copied().fold(0.0, f64::max),
        lowest_percentage: if percentages.is_empty() {
            0.0
        } else {
            percentages.iter().copied().fold(f64::INFINITY, f64::min)
        },
        pass_rate: if percentages.is_empty() {
            0.0
        } else {
            round2(passed as f64 / percentages.len() as f64 * 100.0)
        },
        average_duration_seconds: round2(mean(&durations)),
        questions: question_stats,
        hardest_question_ids,
    }
}

/// Summarizes a student's submitted attempts, given as `(quiz_id, percentage)`
/// in chronological order.
pub fn summarize_student(attempts: &[(i64, f64)]) -> StudentSummary {
    let percentages: Vec<f64> = attempts.iter().map(|(_, p)| *p).collect();

    let recent_trend = if percentages.len() >= 4 {
        let split = percentages.len() - 3;
        Some(round2(mean(&percentages[split..]) - mean(&percentages[..split])))
    } else {
        None
    };

    let taken: HashSet<i64> = attempts.iter().map(|(quiz_id, _)| *quiz_id).collect();
    let passed: HashSet<i64> = attempts
        .iter()
        .filter(|(_, p)| *p >= PASSING_PERCENTAGE)
        .map(|(quiz_id, _)| *quiz_id)
        .collect();

    StudentSummary {
        quizzes_taken: taken.len(),
        attempts: attempts.len(),
        average_percentage: round2(mean(&percentages)),
        best_percentage: percentages.iter().copied().fold(0.0, f64::max),
        passed: passed.len(),
        recent_trend,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::response::QuestionOutcome;
    use chrono::{Duration, Utc};
    use sqlx::types::Json;

    fn question(id: i64) -> Question {
        Question {
            id,
            quiz_id: 1,
            position: id as i32,
            question_type: "single".to_string(),
            content: format!("Q{}", id),
            options: Json(vec!["A".into(), "B".into()]),
            answer: "A".to_string(),
            explanation: None,
            points: 1,
            time_limit_seconds: None,
        }
    }

    fn outcome(question_id: i64, answer: Option<&str>, correct: bool, secs: i64) -> QuestionOutcome {
        QuestionOutcome {
            question_id,
            answer: answer.map(str::to_string),
            correct_answer: "A".to_string(),
            is_correct: correct,
            points_earned: correct as i32,
            points_possible: 1,
            time_spent_seconds: secs,
            explanation: None,
        }
    }

    fn submitted(id: i64, percentage: f64, duration_secs: i64, results: Vec<QuestionOutcome>) -> QuizResponse {
        let started = Utc::now() - Duration::hours(1);
        QuizResponse {
            id,
            quiz_id: 1,
            student_id: id,
            status: "submitted".to_string(),
            answers: Json(vec![]),
            started_at: started,
            deadline: None,
            submitted_at: Some(started + Duration::seconds(duration_secs)),
            score: None,
            max_score: None,
            correct_count: None,
            total_questions: None,
            percentage: Some(percentage),
            results: Some(Json(results)),
            insights: None,
            insights_source: None,
            insights_generated_at: None,
        }
    }

    #[test]
    fn test_summarize_quiz() {
        let questions = vec![question(1), question(2)];
        let responses = vec![
            submitted(
                1,
                100.0,
                60,
                vec![outcome(1, Some("A"), true, 10), outcome(2, Some("A"), true, 20)],
            ),
            submitted(
                2,
                50.0,
                120,
                vec![outcome(1, Some("A"), true, 30), outcome(2, Some("B"), false, 40)],
            ),
            submitted(
                3,
                0.0,
                180,
                vec![outcome(1, Some("B"), false, 20), outcome(2, None, false, 0)],
            ),
        ];

        let stats = summarize_quiz(1, &questions, &responses);
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.average_percentage, 50.0);
        assert_eq!(stats.highest_percentage, 100.0);
        assert_eq!(stats.lowest_percentage, 0.0);
        assert_eq!(stats.pass_rate, 33.33);
        assert_eq!(stats.average_duration_seconds, 120.0);

        assert_eq!(stats.questions[0].attempted, 3);
        assert_eq!(stats.questions[0].correct, 2);
        assert_eq!(stats.questions[0].accuracy, 66.67);
        assert_eq!(stats.questions[0].average_time_seconds, 20.0);

        // Unanswered question 2 in the last response does not count as attempted.
        assert_eq!(stats.questions[1].attempted, 2);
        assert_eq!(stats.questions[1].accuracy, 50.0);
        assert_eq!(stats.hardest_question_ids, vec![2, 1]);
    }

    #[test]
    fn test_summarize_quiz_skips_in_progress() {
        let questions = vec![question(1)];
        let mut open = submitted(1, 80.0, 60, vec![]);
        open.submitted_at = None;
        open.percentage = None;

        let stats = summarize_quiz(1, &questions, &[open]);
        assert_eq!(stats.attempts, 0);
        assert_eq!(stats.lowest_percentage, 0.0);
        assert_eq!(stats.pass_rate, 0.0);
        assert!(stats.hardest_question_ids.is_empty());
    }

    #[test]
    fn test_summarize_student_trend() {
        let summary = summarize_student(&[(1, 40.0), (2, 50.0), (3, 70.0), (4, 80.0), (5, 90.0)]);
        assert_eq!(summary.quizzes_taken, 5);
        assert_eq!(summary.attempts, 5);
        assert_eq!(summary.best_percentage, 90.0);
        assert_eq!(summary.passed, 3);
        assert_eq!(summary.average_percentage, 66.0);
        assert_eq!(summary.recent_trend, Some(35.0));

        assert_eq!(summarize_student(&[(1, 50.0), (2, 60.0)]).recent_trend, None);
        assert_eq!(summarize_student(&[]).average_percentage, 0.0);
    }

    #[test]
    fn test_repeated_attempts_count_one_quiz() {
        let summary = summarize_student(&[(7, 30.0), (7, 55.0), (7, 75.0), (8, 65.0)]);
        assert_eq!(summary.quizzes_taken, 2);
        assert_eq!(summary.attempts, 4);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.best_percentage, 75.0);
    }
}
