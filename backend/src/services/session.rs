// src/services/session.rs

//! Quiz-taking session: answer bookkeeping, per-question timers, progress and
//! deadline handling for one attempt. Pure logic; handlers load and persist
//! the `quiz_responses` row around it.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::{
    error::AppError,
    models::{
        question::{PublicQuestion, Question},
        response::{AnswerEntry, QuizResponse, ResponseStatus, SaveAnswerRequest},
    },
};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    AlreadySubmitted,
    TimeExpired,
    QuestionTimeExpired(i64),
    UnknownQuestion(i64),
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::AlreadySubmitted => {
                AppError::Conflict("Response has already been submitted".to_string())
            }
            SessionError::TimeExpired => {
                AppError::Conflict("Time limit for this quiz has expired".to_string())
            }
            SessionError::QuestionTimeExpired(id) => {
                AppError::Conflict(format!("Time for question {} has expired", id))
            }
            SessionError::UnknownQuestion(id) => {
                AppError::BadRequest(format!("Question {} is not part of this quiz", id))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub answered: usize,
    pub total: usize,
    pub flagged: usize,
    pub percentage: f64,
}

/// Deadline of an attempt started at `started_at`, if the quiz is timed.
pub fn deadline_for(started_at: DateTime<Utc>, time_limit_minutes: Option<i32>) -> Option<DateTime<Utc>> {
    time_limit_minutes
        .filter(|m| *m > 0)
        .map(|m| started_at + Duration::minutes(m as i64))
}

/// One attempt being taken.
#[derive(Debug, Clone)]
pub struct Session {
    status: ResponseStatus,
    deadline: Option<DateTime<Utc>>,
    grace: Duration,
    /// One entry per quiz question, in quiz order.
    entries: Vec<AnswerEntry>,
}

impl Session {
    /// Rebuilds the session of `response`, aligning stored answers with the
    /// quiz's current question order.
    pub fn load(response: &QuizResponse, questions: &[Question], grace_secs: i64) -> Self {
        let entries = questions
            .iter()
            .map(|q| {
                response
                    .answers
                    .iter()
                    .find(|a| a.question_id == q.id)
                    .cloned()
                    .unwrap_or_else(|| AnswerEntry::new(q.id))
            })
            .collect();

        Self {
            status: response.status(),
            deadline: response.deadline,
            grace: Duration::seconds(grace_secs.max(0)),
            entries,
        }
    }

    pub fn entries(&self) -> &[AnswerEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<AnswerEntry> {
        self.entries
    }

    /// Seconds left before the deadline, clamped at zero. `None` when untimed.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        self.deadline.map(|d| (d - now).num_seconds().max(0))
    }

    /// True once the deadline plus the grace period has passed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| now > d + self.grace)
    }

    pub fn progress(&self) -> Progress {
        let total = self.entries.len();
        let answered = self.entries.iter().filter(|e| e.is_answered()).count();
        let flagged = self.entries.iter().filter(|e| e.flagged).count();
        let percentage = if total == 0 {
            0.0
        } else {
            (answered as f64 / total as f64 * 10000.0).round() / 100.0
        };
        Progress {
            answered,
            total,
            flagged,
            percentage,
        }
    }

    /// Records, replaces or clears one answer and adds the reported time to
    /// the question's timer.
    pub fn save_answer(
        &mut self,
        question: &Question,
        req: &SaveAnswerRequest,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        if self.status == ResponseStatus::Submitted {
            return Err(SessionError::AlreadySubmitted);
        }
        if self.is_expired(now) {
            return Err(SessionError::TimeExpired);
        }

        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.question_id == question.id)
            .ok_or(SessionError::UnknownQuestion(question.id))?;

        if let Some(limit) = question.time_limit_seconds {
            let limit = limit as i64;
            if entry.time_spent_seconds >= limit {
                return Err(SessionError::QuestionTimeExpired(question.id));
            }
            entry.time_spent_seconds = (entry.time_spent_seconds + req.time_spent_seconds).min(limit);
        } else {
            entry.time_spent_seconds += req.time_spent_seconds.max(0);
        }

        if let Some(flagged) = req.flagged {
            entry.flagged = flagged;
        }

        match req.answer.as_deref().map(str::trim) {
            Some(answer) if !answer.is_empty() => {
                entry.answer = Some(answer.to_string());
                entry.answered_at = Some(now);
            }
            _ => {
                entry.answer = None;
                entry.answered_at = None;
            }
        }

        Ok(())
    }

    pub fn view(&self, questions: &[Question], now: DateTime<Utc>) -> SessionView {
        SessionView {
            status: self.status,
            deadline: self.deadline,
            remaining_seconds: self.remaining_seconds(now),
            expired: self.is_expired(now),
            progress: self.progress(),
            questions: questions.iter().map(Question::to_public).collect(),
            answers: self.entries.clone(),
        }
    }
}

/// Session state returned to the student while taking a quiz.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub status: ResponseStatus,
    pub deadline: Option<DateTime<Utc>>,
    pub remaining_seconds: Option<i64>,
    pub expired: bool,
    pub progress: Progress,
    pub questions: Vec<PublicQuestion>,
    pub answers: Vec<AnswerEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;

    fn question(id: i64, time_limit_seconds: Option<i32>) -> Question {
        Question {
            id,
            quiz_id: 7,
            position: id as i32,
            question_type: "single".to_string(),
            content: format!("Q{}", id),
            options: Json(vec!["A".into(), "B".into()]),
            answer: "A".to_string(),
            explanation: None,
            points: 1,
            time_limit_seconds,
        }
    }

    fn response(started_at: DateTime<Utc>, deadline: Option<DateTime<Utc>>) -> QuizResponse {
        QuizResponse {
            id: 1,
            quiz_id: 7,
            student_id: 3,
            status: "in_progress".to_string(),
            answers: Json(vec![]),
            started_at,
            deadline,
            submitted_at: None,
            score: None,
            max_score: None,
            correct_count: None,
            total_questions: None,
            percentage: None,
            results: None,
            insights: None,
            insights_source: None,
            insights_generated_at: None,
        }
    }

    fn save(question_id: i64, answer: Option<&str>, secs: i64) -> SaveAnswerRequest {
        SaveAnswerRequest {
            question_id,
            answer: answer.map(str::to_string),
            time_spent_seconds: secs,
            flagged: None,
        }
    }

    #[test]
    fn test_deadline_for() {
        let start = Utc::now();
        assert_eq!(deadline_for(start, None), None);
        assert_eq!(deadline_for(start, Some(0)), None);
        assert_eq!(
            deadline_for(start, Some(15)),
            Some(start + Duration::minutes(15))
        );
    }

    #[test]
    fn test_load_aligns_entries_with_question_order() {
        let now = Utc::now();
        let questions = vec![question(1, None), question(2, None), question(3, None)];
        let mut resp = response(now, None);
        resp.answers = Json(vec![AnswerEntry {
            answer: Some("B".into()),
            ..AnswerEntry::new(2)
        }]);

        let session = Session::load(&resp, &questions, 30);
        let ids: Vec<i64> = session.entries().iter().map(|e| e.question_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(session.entries()[1].answer.as_deref(), Some("B"));
        assert_eq!(session.progress().answered, 1);
    }

    #[test]
    fn test_save_answer_tracks_progress_and_time() {
        let now = Utc::now();
        let questions = vec![question(1, None), question(2, None)];
        let mut session = Session::load(&response(now, None), &questions, 30);

        session.save_answer(&questions[0], &save(1, Some(" A "), 12), now).unwrap();
        session.save_answer(&questions[0], &save(1, Some("B"), 8), now).unwrap();

        let entry = &session.entries()[0];
        assert_eq!(entry.answer.as_deref(), Some("B"));
        assert_eq!(entry.time_spent_seconds, 20);
        assert_eq!(entry.answered_at, Some(now));

        let progress = session.progress();
        assert_eq!(progress.answered, 1);
        assert_eq!(progress.total, 2);
        assert_eq!(progress.percentage, 50.0);
    }

    #[test]
    fn test_clearing_an_answer() {
        let now = Utc::now();
        let questions = vec![question(1, None)];
        let mut session = Session::load(&response(now, None), &questions, 30);

        session.save_answer(&questions[0], &save(1, Some("A"), 1), now).unwrap();
        session.save_answer(&questions[0], &save(1, None, 1), now).unwrap();

        assert_eq!(session.entries()[0].answer, None);
        assert_eq!(session.progress().answered, 0);
    }

    #[test]
    fn test_flagging_without_answer() {
        let now = Utc::now();
        let questions = vec![question(1, None)];
        let mut session = Session::load(&response(now, None), &questions, 30);

        let req = SaveAnswerRequest {
            flagged: Some(true),
            ..save(1, None, 0)
        };
        session.save_answer(&questions[0], &req, now).unwrap();
        assert_eq!(session.progress().flagged, 1);
        assert_eq!(session.progress().answered, 0);
    }

    #[test]
    fn test_rejects_answers_after_deadline_and_grace() {
        let start = Utc::now() - Duration::minutes(20);
        let deadline = deadline_for(start, Some(10));
        let questions = vec![question(1, None)];
        let mut session = Session::load(&response(start, deadline), &questions, 30);
        let now = Utc::now();

        assert!(session.is_expired(now));
        assert_eq!(session.remaining_seconds(now), Some(0));
        assert_eq!(
            session.save_answer(&questions[0], &save(1, Some("A"), 5), now),
            Err(SessionError::TimeExpired)
        );
    }

    #[test]
    fn test_grace_period_still_accepts_answers() {
        let start = Utc::now();
        let deadline = Some(start + Duration::minutes(1));
        let questions = vec![question(1, None)];
        let mut session = Session::load(&response(start, deadline), &questions, 30);
        let within_grace = start + Duration::minutes(1) + Duration::seconds(10);

        assert!(!session.is_expired(within_grace));
        assert!(
            session
                .save_answer(&questions[0], &save(1, Some("A"), 5), within_grace)
                .is_ok()
        );
    }

    #[test]
    fn test_per_question_timer_locks_question() {
        let now = Utc::now();
        let questions = vec![question(1, Some(30))];
        let mut session = Session::load(&response(now, None), &questions, 30);

        session.save_answer(&questions[0], &save(1, Some("A"), 45), now).unwrap();
        assert_eq!(session.entries()[0].time_spent_seconds, 30);

        assert_eq!(
            session.save_answer(&questions[0], &save(1, Some("B"), 1), now),
            Err(SessionError::QuestionTimeExpired(1))
        );
        assert_eq!(session.entries()[0].answer.as_deref(), Some("A"));
    }

    #[test]
    fn test_submitted_session_is_read_only() {
        let now = Utc::now();
        let questions = vec![question(1, None)];
        let mut resp = response(now, None);
        resp.status = "submitted".to_string();
        let mut session = Session::load(&resp, &questions, 30);

        assert_eq!(
            session.save_answer(&questions[0], &save(1, Some("A"), 1), now),
            Err(SessionError::AlreadySubmitted)
        );
    }

    #[test]
    fn test_unknown_question() {
        let now = Utc::now();
        let questions = vec![question(1, None)];
        let mut session = Session::load(&response(now, None), &questions, 30);

        assert_eq!(
            session.save_answer(&question(9, None), &save(9, Some("A"), 1), now),
            Err(SessionError::UnknownQuestion(9))
        );
    }

    #[test]
    fn test_view_hides_answer_keys() {
        let now = Utc::now();
        let questions = vec![question(1, None)];
        let session = Session::load(&response(now, None), &questions, 30);
        let view = serde_json::to_value(session.view(&questions, now)).unwrap();

        assert!(view["questions"][0].get("answer").is_none());
        assert_eq!(view["status"], "in_progress");
        assert_eq!(view["remaining_seconds"], serde_json::Value::Null);
    }
}
