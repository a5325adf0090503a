use crate::models::Difficulty;

use super::validator::{rebalance, QuizQuestion};

struct BankEntry {
    question: &'static str,
    options: [&'static str; 4],
    correct: usize,
    explanation: &'static str,
}

// Ordered roughly from easy to hard; difficulty picks the starting point.
const BANK: &[BankEntry] = &[
    BankEntry {
        question: "How many continents are there on Earth?",
        options: ["Five", "Six", "Seven", "Eight"],
        correct: 2,
        explanation: "The usual convention counts seven continents.",
    },
    BankEntry {
        question: "Which planet is known as the Red Planet?",
        options: ["Mars", "Venus", "Jupiter", "Mercury"],
        correct: 0,
        explanation: "Iron oxide on its surface gives Mars its reddish colour.",
    },
    BankEntry {
        question: "What is the largest ocean on Earth?",
        options: ["Atlantic", "Indian", "Arctic", "Pacific"],
        correct: 3,
        explanation: "The Pacific covers about a third of the planet's surface.",
    },
    BankEntry {
        question: "How many sides does a hexagon have?",
        options: ["Five", "Six", "Seven", "Eight"],
        correct: 1,
        explanation: "Hexa- means six.",
    },
    BankEntry {
        question: "What gas do plants absorb from the air for photosynthesis?",
        options: ["Oxygen", "Nitrogen", "Carbon dioxide", "Helium"],
        correct: 2,
        explanation: "Plants turn carbon dioxide and water into sugar using light.",
    },
    BankEntry {
        question: "Which language has the most native speakers?",
        options: ["English", "Mandarin Chinese", "Spanish", "Hindi"],
        correct: 1,
        explanation: "Mandarin has roughly a billion native speakers.",
    },
    BankEntry {
        question: "What is the chemical symbol for gold?",
        options: ["Gd", "Go", "Ag", "Au"],
        correct: 3,
        explanation: "Au comes from the Latin word aurum.",
    },
    BankEntry {
        question: "In which year did the first crewed Moon landing take place?",
        options: ["1969", "1965", "1972", "1959"],
        correct: 0,
        explanation: "Apollo 11 landed on the Moon in July 1969.",
    },
    BankEntry {
        question: "Which element has the atomic number 1?",
        options: ["Helium", "Hydrogen", "Lithium", "Carbon"],
        correct: 1,
        explanation: "Hydrogen has a single proton.",
    },
    BankEntry {
        question: "What is the smallest prime number greater than 20?",
        options: ["21", "22", "23", "25"],
        correct: 2,
        explanation: "21 = 3 x 7 and 22 = 2 x 11, so 23 is next.",
    },
    BankEntry {
        question: "Which scientist proposed the three laws of motion?",
        options: ["Galileo Galilei", "Albert Einstein", "Johannes Kepler", "Isaac Newton"],
        correct: 3,
        explanation: "Newton published them in the Principia in 1687.",
    },
    BankEntry {
        question: "What is the approximate speed of light in a vacuum?",
        options: ["300,000 km/s", "150,000 km/s", "30,000 km/s", "3,000,000 km/s"],
        correct: 0,
        explanation: "Light travels at about 299,792 km per second.",
    },
];

fn start_index(difficulty: Difficulty) -> usize {
    match difficulty {
        Difficulty::Easy => 0,
        Difficulty::Medium => BANK.len() / 3,
        Difficulty::Hard => 2 * BANK.len() / 3,
    }
}

/// Built-in general knowledge questions framed for `topic`, cycling through
/// the bank when more are requested than it holds.
fn template_questions(topic: &str, difficulty: Difficulty, count: usize) -> Vec<QuizQuestion> {
    let start = start_index(difficulty);
    (0..count)
        .map(|i| {
            let entry = &BANK[(start + i) % BANK.len()];
            QuizQuestion {
                question: format!("{} warm-up: {}", topic, entry.question),
                options: entry.options.iter().map(|o| o.to_string()).collect(),
                correct_answer: entry.correct,
                explanation: Some(entry.explanation.to_string()),
            }
        })
        .collect()
}

pub fn fallback_questions(topic: &str, difficulty: Difficulty, count: usize, offset: usize) -> Vec<QuizQuestion> {
    rebalance(template_questions(topic, difficulty, count), offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_service::validator::OPTION_COUNT;

    #[test]
    fn bank_entries_are_well_formed() {
        for entry in BANK {
            assert!(entry.correct < OPTION_COUNT);
            assert!(!entry.question.is_empty());
        }
    }

    #[test]
    fn cycles_when_count_exceeds_bank() {
        let questions = fallback_questions("Rust", Difficulty::Hard, BANK.len() + 5, 2);
        assert_eq!(questions.len(), BANK.len() + 5);
        for q in &questions {
            assert!(q.question.starts_with("Rust warm-up: "));
            assert_eq!(q.options.len(), OPTION_COUNT);
            assert!(q.explanation.is_some());
        }
        assert_eq!(questions[0].correct_answer, 2);
        assert_eq!(questions[1].correct_answer, 3);
    }

    #[test]
    fn rebalancing_keeps_the_true_answer() {
        let questions = fallback_questions("Space", Difficulty::Easy, 2, 3);
        assert_eq!(questions[1].options[questions[1].correct_answer], "Mars");
    }
}
