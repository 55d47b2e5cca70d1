mod answer;
mod coach;
mod grade_meta;
mod ids;
mod mode;
mod problem_set;
mod question;

pub use answer::{AnswerSheet, AnswerValue, is_answered};
pub use coach::{
    CoachRow, CoachView, EXPLANATION_OFFSET_MS, HINT_TWO_OFFSET_MS, MAX_STAGE, MAX_WRONG_GRADES,
};
pub use grade_meta::{GradeMeta, QuestionGradeBook, QuestionGradeMeta, TopTry};
pub use ids::{ParseIdError, QuestionId, RoomId, SetId, StudentId};
pub use mode::{ParseModeError, PracticeMode};
pub use problem_set::{
    DEFAULT_CORE_COUNT, DEFAULT_RECOMMENDED_MINUTES, MIN_QUESTION_RECOMMENDED_MS, ProblemSet,
    ProblemSetError,
};
pub use question::{Bucket, MAX_HINTS, Question, QuestionError, QuestionKind, QuestionType};
