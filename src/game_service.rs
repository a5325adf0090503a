pub mod fallback;
pub mod orchestrator;
pub mod validator;

use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    Difficulty, GameQuestion, GameRoom, GameRoomUpdate, GameRoomView, GameStatus, UserGameStats,
};
use crate::quota::{self, Feature};
use crate::state::AppState;

pub use orchestrator::{GameOrchestrator, GeneratedQuiz, MAX_QUESTIONS, MIN_QUESTIONS};
pub use validator::QuizQuestion;

pub const POINTS_PER_CORRECT: i32 = 10;
const DEFAULT_QUESTION_COUNT: usize = 5;
const DEFAULT_GAME_MODE: &str = "solo";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameRequest {
    pub topic: String,
    pub difficulty: Option<String>,
    pub question_count: Option<usize>,
    pub game_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRequest {
    pub question_index: i32,
    pub selected_index: i32,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
    pub correct: bool,
    pub correct_index: i32,
    pub explanation: Option<String>,
    pub score: i32,
    pub answered_count: i32,
    pub finished: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatsView {
    #[serde(flatten)]
    pub stats: UserGameStats,
    pub accuracy: f64,
}

pub async fn create_game(state: &AppState, user: &AuthUser, request: CreateGameRequest) -> ApiResult<GameRoomView> {
    let topic = request.topic.trim();
    if topic.is_empty() {
        return Err(ApiError::InvalidRequest("Topic is required".to_string()));
    }
    let difficulty = Difficulty::parse(request.difficulty.as_deref());
    let count = request
        .question_count
        .unwrap_or(DEFAULT_QUESTION_COUNT)
        .clamp(MIN_QUESTIONS, MAX_QUESTIONS);

    let profile = quota::ensure_profile(state.store.as_ref(), user).await?;
    quota::reserve(state.store.as_ref(), &profile, Feature::Games, Utc::now()).await?;

    let quiz = GameOrchestrator::new(state.ai.clone())
        .generate(topic, difficulty, count)
        .await;

    let room = GameRoom {
        id: Uuid::new_v4(),
        user_id: user.id,
        topic: topic.to_string(),
        difficulty,
        game_mode: request
            .game_mode
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GAME_MODE.to_string()),
        status: GameStatus::Active,
        score: 0,
        answered_count: 0,
        question_count: quiz.questions.len() as i32,
        used_fallback: quiz.used_fallback,
        created_at: Utc::now(),
    };
    let room = state.store.insert_game_room(&room).await?;

    let questions: Vec<GameQuestion> = quiz
        .questions
        .into_iter()
        .enumerate()
        .map(|(position, q)| GameQuestion {
            id: Uuid::new_v4(),
            room_id: room.id,
            position: position as i32,
            question: q.question,
            options: q.options,
            correct_answer: q.correct_answer as i32,
            explanation: q.explanation,
            selected_answer: None,
        })
        .collect();
    state.store.insert_game_questions(&questions).await?;

    state.store.increment_games_played(user.id).await?;
    quota::record_usage(state.store.as_ref(), user.id, Feature::Games).await;

    info!(
        "Created game {} on '{}' ({} questions, fallback: {})",
        room.id, room.topic, room.question_count, room.used_fallback
    );
    Ok(GameRoomView::new(room, questions))
}

async fn load_room(state: &AppState, user: &AuthUser, room_id: Uuid) -> ApiResult<GameRoom> {
    state
        .store
        .get_game_room(room_id, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Game".to_string()))
}

pub async fn get_game(state: &AppState, user: &AuthUser, room_id: Uuid) -> ApiResult<GameRoomView> {
    let room = load_room(state, user, room_id).await?;
    let questions = state.store.list_game_questions(room.id).await?;
    Ok(GameRoomView::new(room, questions))
}

fn already_answered() -> ApiError {
    ApiError::Conflict {
        code: "ALREADY_ANSWERED",
        message: "This question has already been answered".to_string(),
    }
}

pub async fn submit_answer(
    state: &AppState,
    user: &AuthUser,
    room_id: Uuid,
    request: AnswerRequest,
) -> ApiResult<AnswerOutcome> {
    let room = load_room(state, user, room_id).await?;

    if !(0..validator::OPTION_COUNT as i32).contains(&request.selected_index) {
        return Err(ApiError::InvalidRequest(format!(
            "selectedIndex must be between 0 and {}",
            validator::OPTION_COUNT - 1
        )));
    }

    let questions = state.store.list_game_questions(room.id).await?;
    let question = questions
        .iter()
        .find(|q| q.position == request.question_index)
        .ok_or_else(|| ApiError::InvalidRequest(format!("No question at index {}", request.question_index)))?;
    if question.is_answered() {
        return Err(already_answered());
    }

    let answered = state
        .store
        .answer_game_question(question.id, request.selected_index)
        .await?
        .ok_or_else(already_answered)?;
    let correct = answered.answered_correctly();

    // Derive progress from the stored answers so concurrent answers converge.
    let questions = state.store.list_game_questions(room.id).await?;
    let answered_count = questions.iter().filter(|q| q.is_answered()).count() as i32;
    let score = questions.iter().filter(|q| q.answered_correctly()).count() as i32 * POINTS_PER_CORRECT;
    let finished = answered_count >= room.question_count;

    state
        .store
        .update_game_room(
            room.id,
            &GameRoomUpdate {
                status: finished.then_some(GameStatus::Finished),
                score: Some(score),
                answered_count: Some(answered_count),
            },
        )
        .await?;
    state.store.record_game_answer(user.id, correct, score).await?;

    if finished {
        info!("Game {} finished with score {}", room.id, score);
    }

    Ok(AnswerOutcome {
        correct,
        correct_index: answered.correct_answer,
        explanation: answered.explanation,
        score,
        answered_count,
        finished,
    })
}

pub async fn stats(state: &AppState, user: &AuthUser) -> ApiResult<GameStatsView> {
    let stats = state.store.get_game_stats(user.id).await?;
    Ok(GameStatsView {
        accuracy: stats.accuracy(),
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PlanType, UserProfile};
    use crate::store::Store;
    use crate::test_support::{test_state, TestContext};

    fn create_request(count: usize) -> CreateGameRequest {
        CreateGameRequest {
            topic: "Oceans".to_string(),
            difficulty: Some("easy".to_string()),
            question_count: Some(count),
            game_mode: None,
        }
    }

    async fn pro_user(ctx: &TestContext) -> AuthUser {
        let user = ctx.user();
        let mut profile = UserProfile::new_trial(user.id, user.email.clone());
        profile.plan_type = PlanType::Pro;
        ctx.store.insert_profile(&profile).await.unwrap();
        user
    }

    #[tokio::test]
    async fn create_hides_answers_and_counts_game() {
        let ctx = test_state();
        let user = pro_user(&ctx).await;

        let view = create_game(&ctx.state, &user, create_request(3)).await.unwrap();
        assert_eq!(view.questions.len(), 3);
        assert!(view.room.used_fallback);
        assert!(view.questions.iter().all(|q| q.correct_answer.is_none()));

        let stats = stats(&ctx.state, &user).await.unwrap();
        assert_eq!(stats.stats.games_played, 1);
    }

    #[tokio::test]
    async fn answering_twice_conflicts_and_last_answer_finishes() {
        let ctx = test_state();
        let user = pro_user(&ctx).await;
        let view = create_game(&ctx.state, &user, create_request(2)).await.unwrap();
        let room_id = view.room.id;

        let stored = ctx.store.list_game_questions(room_id).await.unwrap();
        let first = submit_answer(
            &ctx.state,
            &user,
            room_id,
            AnswerRequest {
                question_index: 0,
                selected_index: stored[0].correct_answer,
            },
        )
        .await
        .unwrap();
        assert!(first.correct);
        assert_eq!(first.score, POINTS_PER_CORRECT);
        assert!(!first.finished);

        let err = submit_answer(
            &ctx.state,
            &user,
            room_id,
            AnswerRequest {
                question_index: 0,
                selected_index: 1,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "ALREADY_ANSWERED");
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);

        let wrong = (stored[1].correct_answer + 1) % 4;
        let last = submit_answer(
            &ctx.state,
            &user,
            room_id,
            AnswerRequest {
                question_index: 1,
                selected_index: wrong,
            },
        )
        .await
        .unwrap();
        assert!(!last.correct);
        assert!(last.finished);
        assert_eq!(last.correct_index, stored[1].correct_answer);

        let view = get_game(&ctx.state, &user, room_id).await.unwrap();
        assert_eq!(view.room.status, GameStatus::Finished);
        assert!(view.questions.iter().all(|q| q.correct_answer.is_some()));

        let stats = stats(&ctx.state, &user).await.unwrap();
        assert_eq!(stats.stats.questions_answered, 2);
        assert_eq!(stats.stats.correct_answers, 1);
        assert_eq!(stats.stats.best_score, POINTS_PER_CORRECT);
        assert!((stats.accuracy - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn other_users_cannot_see_a_game() {
        let ctx = test_state();
        let owner = pro_user(&ctx).await;
        let view = create_game(&ctx.state, &owner, create_request(1)).await.unwrap();

        let stranger = ctx.user();
        let err = get_game(&ctx.state, &stranger, view.room.id).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn rejects_out_of_range_selection() {
        let ctx = test_state();
        let user = pro_user(&ctx).await;
        let view = create_game(&ctx.state, &user, create_request(1)).await.unwrap();

        let err = submit_answer(
            &ctx.state,
            &user,
            view.room.id,
            AnswerRequest {
                question_index: 0,
                selected_index: 4,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
    }
}
