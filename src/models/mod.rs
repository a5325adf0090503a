pub mod game;
pub mod images;
pub mod leads;
pub mod payments;
pub mod recordings;
pub mod users;

pub use game::{
    Difficulty, GameQuestion, GameQuestionView, GameRoom, GameRoomUpdate, GameRoomView,
    GameStatus, UserGameStats,
};
pub use images::GeneratedImage;
pub use leads::{LeadMessage, LeadResult, LeadSearch, LeadSearchStatus};
pub use payments::PaymentLink;
pub use recordings::{AnalysisKind, AnalysisResult, AudioRecording, RecordingStatus, RecordingUpdate};
pub use users::{PlanType, ProfileUpdate, UserProfile};
