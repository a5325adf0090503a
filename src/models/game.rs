use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("easy") => Difficulty::Easy,
            Some("hard") => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Active,
    Finished,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameRoom {
    pub id: Uuid,
    pub user_id: Uuid,
    pub topic: String,
    pub difficulty: Difficulty,
    pub game_mode: String,
    pub status: GameStatus,
    pub score: i32,
    pub answered_count: i32,
    pub question_count: i32,
    pub used_fallback: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct GameRoomUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<GameStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answered_count: Option<i32>,
}

impl GameRoomUpdate {
    pub fn apply(&self, room: &mut GameRoom) {
        if let Some(status) = self.status {
            room.status = status;
        }
        if let Some(score) = self.score {
            room.score = score;
        }
        if let Some(answered) = self.answered_count {
            room.answered_count = answered;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameQuestion {
    pub id: Uuid,
    pub room_id: Uuid,
    pub position: i32,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: i32,
    pub explanation: Option<String>,
    pub selected_answer: Option<i32>,
}

impl GameQuestion {
    pub fn is_answered(&self) -> bool {
        self.selected_answer.is_some()
    }

    pub fn answered_correctly(&self) -> bool {
        self.selected_answer == Some(self.correct_answer)
    }
}

/// Question as sent to the player. The answer is only revealed once the
/// question has been answered or the game is over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameQuestionView {
    pub id: Uuid,
    pub position: i32,
    pub question: String,
    pub options: Vec<String>,
    pub selected_answer: Option<i32>,
    pub correct_answer: Option<i32>,
    pub explanation: Option<String>,
}

impl GameQuestionView {
    pub fn from_question(question: GameQuestion, reveal: bool) -> Self {
        let reveal = reveal || question.is_answered();
        GameQuestionView {
            id: question.id,
            position: question.position,
            question: question.question,
            options: question.options,
            selected_answer: question.selected_answer,
            correct_answer: reveal.then_some(question.correct_answer),
            explanation: if reveal { question.explanation } else { None },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRoomView {
    pub room: GameRoom,
    pub questions: Vec<GameQuestionView>,
}

impl GameRoomView {
    pub fn new(room: GameRoom, mut questions: Vec<GameQuestion>) -> Self {
        questions.sort_by_key(|q| q.position);
        let reveal = room.status == GameStatus::Finished;
        GameRoomView {
            room,
            questions: questions
                .into_iter()
                .map(|q| GameQuestionView::from_question(q, reveal))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserGameStats {
    pub user_id: Uuid,
    #[serde(default)]
    pub games_played: i32,
    #[serde(default)]
    pub questions_answered: i32,
    #[serde(default)]
    pub correct_answers: i32,
    #[serde(default)]
    pub best_score: i32,
}

impl UserGameStats {
    pub fn empty(user_id: Uuid) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    pub fn increment_games_played(&mut self) {
        self.games_played += 1;
    }

    pub fn record_answer(&mut self, correct: bool) {
        self.questions_answered += 1;
        if correct {
            self.correct_answers += 1;
        }
    }

    pub fn record_score(&mut self, score: i32) {
        self.best_score = self.best_score.max(score);
    }

    pub fn accuracy(&self) -> f64 {
        if self.questions_answered == 0 {
            0.0
        } else {
            self.correct_answers as f64 / self.questions_answered as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(selected: Option<i32>) -> GameQuestion {
        GameQuestion {
            id: Uuid::new_v4(),
            room_id: Uuid::new_v4(),
            position: 0,
            question: "Which planet is largest?".to_string(),
            options: vec!["Mars".into(), "Jupiter".into(), "Venus".into(), "Earth".into()],
            correct_answer: 1,
            explanation: Some("Jupiter is the largest planet.".to_string()),
            selected_answer: selected,
        }
    }

    #[test]
    fn unanswered_question_hides_answer() {
        let view = GameQuestionView::from_question(question(None), false);
        assert_eq!(view.correct_answer, None);
        assert_eq!(view.explanation, None);
    }

    #[test]
    fn answered_question_reveals_answer() {
        let view = GameQuestionView::from_question(question(Some(2)), false);
        assert_eq!(view.correct_answer, Some(1));
        assert!(view.explanation.is_some());
    }

    #[test]
    fn stats_accuracy() {
        let mut stats = UserGameStats::empty(Uuid::new_v4());
        stats.record_answer(true);
        stats.record_answer(false);
        stats.record_score(3);
        stats.record_score(1);
        assert_eq!(stats.accuracy(), 0.5);
        assert_eq!(stats.best_score, 3);
    }

    #[test]
    fn difficulty_defaults_to_medium() {
        assert_eq!(Difficulty::parse(Some("HARD")), Difficulty::Hard);
        assert_eq!(Difficulty::parse(Some("impossible")), Difficulty::Medium);
        assert_eq!(Difficulty::parse(None), Difficulty::Medium);
    }
}
