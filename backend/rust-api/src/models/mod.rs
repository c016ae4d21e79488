pub mod ledger;
pub mod question;
pub mod session;
pub mod timer;

pub use ledger::{
    CategoryBest, CategoryCount, DashboardResponse, ProgressRecord, ProgressStats,
    ProgressUpdate, ScoreEvent,
};
pub use question::{CreateQuestionRequest, Difficulty, Question, QuestionDraft, QuestionFilter};
pub use session::{SessionView, StartSessionRequest, SubmitAnswerRequest};
