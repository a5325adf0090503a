//! Cleans up model-generated quiz questions and spreads the correct answer
//! evenly over the four option slots.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const OPTION_COUNT: usize = 4;

const FILLER_OPTIONS: [&str; 4] = [
    "None of the above",
    "All of the above",
    "Not enough information",
    "Cannot be determined",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
    pub explanation: Option<String>,
}

fn text(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// Index of the correct option. Accepts `2`, `"2"` or `"C"`; anything else is 0.
fn answer_index(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                return n;
            }
            let mut chars = s.chars();
            match (chars.next().map(|c| c.to_ascii_uppercase()), chars.next()) {
                (Some(c @ 'A'..='D'), None) => (c as u8 - b'A') as i64,
                _ => 0,
            }
        }
        _ => 0,
    }
}

fn pad_options(mut options: Vec<String>) -> Vec<String> {
    options.truncate(OPTION_COUNT);
    for filler in FILLER_OPTIONS {
        if options.len() >= OPTION_COUNT {
            break;
        }
        if !options.iter().any(|o| o.eq_ignore_ascii_case(filler)) {
            options.push(filler.to_string());
        }
    }
    options
}

/// Turns one loosely typed question object into a well-formed question, or
/// `None` when it has no question text.
pub fn sanitize_question(raw: &Value) -> Option<QuizQuestion> {
    let question = raw.get("question").and_then(text)?;

    let options = raw
        .get("options")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(text).collect())
        .unwrap_or_default();
    let options = pad_options(options);

    let correct = answer_index(raw.get("correct_answer").or_else(|| raw.get("correctAnswer")));
    let correct_answer = correct.clamp(0, OPTION_COUNT as i64 - 1) as usize;

    Some(QuizQuestion {
        question,
        options,
        correct_answer,
        explanation: raw.get("explanation").and_then(text),
    })
}

/// Rotates each question's options so question `i` has its correct option at
/// `(offset + i) % 4`. The cyclic order of the options is preserved.
pub fn rebalance(questions: Vec<QuizQuestion>, offset: usize) -> Vec<QuizQuestion> {
    questions
        .into_iter()
        .enumerate()
        .map(|(i, mut q)| {
            let target = (offset + i) % OPTION_COUNT;
            let shift = (target + OPTION_COUNT - q.correct_answer) % OPTION_COUNT;
            q.options.rotate_right(shift);
            q.correct_answer = target;
            q
        })
        .collect()
}

pub fn normalize_questions(raw: &[Value], offset: usize) -> Vec<QuizQuestion> {
    rebalance(raw.iter().filter_map(sanitize_question).collect(), offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spread(questions: &[QuizQuestion]) -> usize {
        let mut counts = [0usize; OPTION_COUNT];
        for q in questions {
            counts[q.correct_answer] += 1;
        }
        counts.iter().max().unwrap() - counts.iter().min().unwrap()
    }

    fn raw_question(i: usize, correct: Value) -> Value {
        json!({
            "question": format!("Question {}", i),
            "options": ["alpha", "beta", "gamma", "delta"],
            "correct_answer": correct,
        })
    }

    #[test]
    fn answer_spread_is_at_most_one() {
        for n in 1..=40 {
            for offset in 0..OPTION_COUNT {
                // every question claims "A" is right, the worst case
                let raw: Vec<Value> = (0..n).map(|i| raw_question(i, json!(0))).collect();
                let questions = normalize_questions(&raw, offset);
                assert_eq!(questions.len(), n);
                assert!(spread(&questions) <= 1, "n={} offset={}", n, offset);
            }
        }
    }

    #[test]
    fn rotation_keeps_the_correct_option() {
        let raw = vec![raw_question(0, json!("C"))];
        let questions = normalize_questions(&raw, 1);
        let q = &questions[0];

        assert_eq!(q.correct_answer, 1);
        assert_eq!(q.options[q.correct_answer], "gamma");
        assert_eq!(q.options, vec!["beta", "gamma", "delta", "alpha"]);
    }

    #[test]
    fn answer_formats() {
        assert_eq!(answer_index(Some(&json!(3))), 3);
        assert_eq!(answer_index(Some(&json!("2"))), 2);
        assert_eq!(answer_index(Some(&json!("b"))), 1);
        assert_eq!(answer_index(Some(&json!("D"))), 3);
        assert_eq!(answer_index(Some(&json!("E"))), 0);
        assert_eq!(answer_index(Some(&json!(null))), 0);
        assert_eq!(answer_index(None), 0);
    }

    #[test]
    fn pads_truncates_and_clamps() {
        let raw = json!({
            "question": "Pick one",
            "options": ["yes", "None of the above"],
            "correct_answer": 9
        });
        let q = sanitize_question(&raw).unwrap();
        assert_eq!(
            q.options,
            vec!["yes", "None of the above", "All of the above", "Not enough information"]
        );
        assert_eq!(q.correct_answer, 3);

        let raw = json!({
            "question": "Too many",
            "options": ["1", "2", "3", "4", "5", "6"],
            "correct_answer": -2
        });
        let q = sanitize_question(&raw).unwrap();
        assert_eq!(q.options.len(), OPTION_COUNT);
        assert_eq!(q.correct_answer, 0);
    }

    #[test]
    fn drops_questions_without_text() {
        let raw = vec![
            json!({ "question": "   ", "options": ["a", "b"] }),
            json!({ "options": ["a", "b"] }),
            raw_question(3, json!(1)),
        ];
        let questions = normalize_questions(&raw, 0);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].question, "Question 3");
    }
}
