use log::{info, warn};
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;

use crate::ai::{AiError, AiProvider};
use crate::models::Difficulty;

use super::fallback::fallback_questions;
use super::validator::{normalize_questions, QuizQuestion, OPTION_COUNT};

pub const MIN_QUESTIONS: usize = 1;
pub const MAX_QUESTIONS: usize = 20;

#[derive(Debug, Clone)]
pub struct GeneratedQuiz {
    pub questions: Vec<QuizQuestion>,
    pub used_fallback: bool,
}

pub struct GameOrchestrator {
    ai: Arc<dyn AiProvider>,
}

const SYSTEM_PROMPT: &str = "You are a quiz master who writes accurate, unambiguous multiple-choice \
questions. Always respond with a JSON object.";

fn build_prompt(topic: &str, difficulty: Difficulty, count: usize) -> String {
    format!(
        "Create {count} {difficulty} multiple-choice questions about \"{topic}\".\n\
         Each question must have exactly 4 options and exactly one correct option.\n\
         Respond with JSON of the form:\n\
         {{\"questions\": [{{\"question\": \"...\", \"options\": [\"...\", \"...\", \"...\", \"...\"], \
         \"correct_answer\": 0, \"explanation\": \"...\"}}]}}\n\
         `correct_answer` is the zero-based index of the correct option.",
        count = count,
        difficulty = difficulty.as_str(),
        topic = topic,
    )
}

fn question_list(response: &Value) -> Result<&Vec<Value>, AiError> {
    response
        .get("questions")
        .and_then(Value::as_array)
        .or_else(|| response.as_array())
        .ok_or_else(|| AiError::InvalidResponse("missing questions array".to_string()))
}

impl GameOrchestrator {
    pub fn new(ai: Arc<dyn AiProvider>) -> Self {
        Self { ai }
    }

    pub async fn generate(&self, topic: &str, difficulty: Difficulty, count: usize) -> GeneratedQuiz {
        let offset = rand::thread_rng().gen_range(0..OPTION_COUNT);
        self.generate_with_offset(topic, difficulty, count, offset).await
    }

    pub async fn generate_with_offset(
        &self,
        topic: &str,
        difficulty: Difficulty,
        count: usize,
        offset: usize,
    ) -> GeneratedQuiz {
        let count = count.clamp(MIN_QUESTIONS, MAX_QUESTIONS);

        let mut questions = match self.ask_model(topic, difficulty, count).await {
            Ok(raw) => {
                let questions = normalize_questions(&raw, offset);
                info!("Model returned {} usable questions for '{}'", questions.len(), topic);
                questions
            }
            Err(e) => {
                warn!("Quiz generation for '{}' failed, using templates: {}", topic, e);
                Vec::new()
            }
        };
        questions.truncate(count);

        let missing = count - questions.len();
        if missing > 0 {
            info!("Topping up quiz '{}' with {} template questions", topic, missing);
            let offset = offset + questions.len();
            questions.extend(fallback_questions(topic, difficulty, missing, offset));
        }

        GeneratedQuiz {
            questions,
            used_fallback: missing > 0,
        }
    }

    async fn ask_model(&self, topic: &str, difficulty: Difficulty, count: usize) -> Result<Vec<Value>, AiError> {
        let response = self
            .ai
            .complete_json(SYSTEM_PROMPT, &build_prompt(topic, difficulty, count), 3000)
            .await?;
        Ok(question_list(&response)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubAi;
    use serde_json::json;

    fn model_question(i: usize) -> Value {
        json!({
            "question": format!("What is {} + {}?", i, i),
            "options": [format!("{}", 2 * i), "0", "1", "-1"],
            "correct_answer": "A",
            "explanation": "Doubling."
        })
    }

    #[tokio::test]
    async fn uses_model_questions_when_available() {
        let questions: Vec<Value> = (1..=5).map(model_question).collect();
        let ai = StubAi::with_json(json!({ "questions": questions }));
        let quiz = GameOrchestrator::new(Arc::new(ai))
            .generate_with_offset("Math", Difficulty::Easy, 5, 0)
            .await;

        assert!(!quiz.used_fallback);
        assert_eq!(quiz.questions.len(), 5);
        let answers: Vec<usize> = quiz.questions.iter().map(|q| q.correct_answer).collect();
        assert_eq!(answers, vec![0, 1, 2, 3, 0]);
        assert_eq!(quiz.questions[2].options[2], "6");
    }

    #[tokio::test]
    async fn accepts_top_level_array_and_tops_up() {
        let ai = StubAi::with_json(json!([model_question(1), model_question(2)]));
        let quiz = GameOrchestrator::new(Arc::new(ai))
            .generate_with_offset("Math", Difficulty::Medium, 4, 1)
            .await;

        assert!(quiz.used_fallback);
        assert_eq!(quiz.questions.len(), 4);
        assert!(quiz.questions[3].question.starts_with("Math warm-up: "));
        let answers: Vec<usize> = quiz.questions.iter().map(|q| q.correct_answer).collect();
        assert_eq!(answers, vec![1, 2, 3, 0]);
    }

    #[tokio::test]
    async fn model_failure_falls_back_entirely() {
        let ai = StubAi::failing();
        let quiz = GameOrchestrator::new(Arc::new(ai))
            .generate_with_offset("History", Difficulty::Hard, 50, 0)
            .await;

        assert!(quiz.used_fallback);
        assert_eq!(quiz.questions.len(), MAX_QUESTIONS);
        assert!(quiz.questions.iter().all(|q| q.question.starts_with("History warm-up: ")));
    }

    #[test]
    fn prompt_mentions_count_and_difficulty() {
        let prompt = build_prompt("Volcanoes", Difficulty::Hard, 7);
        assert!(prompt.contains("Create 7 hard multiple-choice questions about \"Volcanoes\""));
    }
}
