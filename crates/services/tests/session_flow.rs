use std::sync::Arc;

use practice_core::model::{
    AnswerValue, Bucket, PracticeMode, ProblemSet, Question, QuestionId, QuestionKind, SetId,
};
use practice_core::time::{calendar_day, fixed_clock};
use services::dashboard::{DashboardIdentity, HelpOutcome, RecordingSink};
use services::{
    GradeError, SessionConfig, SessionContext, SessionError, SessionOptions, TimeboxChoice,
};
use storage::KeyValueStore;
use storage::keys;
use storage::repository::{InMemoryRepository, Storage};

fn loops_set() -> ProblemSet {
    let q1 = Question::new(
        QuestionId::new("q1"),
        QuestionKind::ShortAnswer {
            expected_text: Some("42".into()),
            accepted: Vec::new(),
        },
    )
    .unwrap()
    .with_hints(["look at the loop bound", "count the iterations"])
    .unwrap()
    .with_explanation("The loop runs 42 times.");
    let q2 = Question::new(
        QuestionId::new("q2"),
        QuestionKind::Code {
            accepted: vec!["if(n>=1&&n<=10)".into()],
        },
    )
    .unwrap()
    .with_recommended_secs(60)
    .unwrap()
    .with_explanation("Both bounds are inclusive.");
    let q3 = Question::new(
        QuestionId::new("q3"),
        QuestionKind::MultipleChoice {
            options: vec!["a".into(), "b".into(), "c".into()],
            correct_index: 2,
        },
    )
    .unwrap()
    .with_bucket(Bucket::Supplemental);

    ProblemSet::new(SetId::new("loops"), "Loops", vec![q1, q2, q3])
        .unwrap()
        .with_core_count(2)
}

fn storage() -> Storage {
    let repo = InMemoryRepository::new();
    repo.insert_set(loops_set()).unwrap();
    Storage::from_repository(repo)
}

async fn open(storage: &Storage, mode: PracticeMode) -> SessionContext {
    SessionContext::open(
        storage,
        SessionConfig::default(),
        fixed_clock(),
        SessionOptions::new(SetId::new("loops")).with_forced_mode(mode),
    )
    .await
    .unwrap()
}

fn qid(id: &str) -> QuestionId {
    QuestionId::new(id)
}

#[tokio::test]
async fn practice_mode_grades_without_cooldown() {
    let storage = storage();
    let mut session = open(&storage, PracticeMode::Practice).await;
    session.record_answer(&qid("q1"), " 42 \n".into()).await.unwrap();

    let first = session.grade_all(false).await.unwrap();
    assert_eq!(first.total, 3);
    assert_eq!(first.correct, 1);
    let second = session.grade_all(false).await.unwrap();
    assert_eq!(second.attempts_today, 2);

    let q1 = session.grading().book().get(&qid("q1")).unwrap();
    assert_eq!(q1.attempts, 1);
    assert_eq!(session.progress().correct, 1);
}

#[tokio::test]
async fn classroom_rejects_grading_inside_cooldown() {
    let storage = storage();
    let mut session = open(&storage, PracticeMode::Classroom).await;

    let report = session.grade_all(false).await.unwrap();
    assert_eq!(report.total, 2);

    session.advance_clock(10_000);
    let err = session.grade_all(false).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Grade(GradeError::CooldownActive { remaining_ms: 10_000 })
    ));
    let today = calendar_day(session.now());
    assert_eq!(session.grading().attempts_today(today), 1);

    session.advance_clock(10_000);
    assert_eq!(session.grade_all(false).await.unwrap().attempts_today, 2);
}

#[tokio::test]
async fn code_answer_is_normalized_before_grading() {
    let storage = storage();
    let mut session = open(&storage, PracticeMode::Practice).await;
    session
        .record_answer(&qid("q2"), "if (n >= 1 && n <= 10) // check".into())
        .await
        .unwrap();
    session.record_answer(&qid("q1"), "42.0".into()).await.unwrap();

    let report = session.grade_all(false).await.unwrap();
    let verdict = |id: &str| {
        report
            .verdicts
            .iter()
            .find(|v| v.question_id == qid(id))
            .map(|v| v.is_correct)
    };
    assert_eq!(verdict("q2"), Some(true));
    assert_eq!(verdict("q1"), Some(false));
}

#[tokio::test]
async fn suspicious_answers_need_confirmation_once() {
    let storage = storage();
    let mut session = open(&storage, PracticeMode::Practice).await;
    session
        .record_answer(&qid("q1"), "printf(\"%d\", 42);".into())
        .await
        .unwrap();

    let err = session.grade_all(false).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Grade(GradeError::NeedsConfirmation { suspicious: 1 })
    ));
    let today = calendar_day(session.now());
    assert_eq!(session.grading().attempts_today(today), 0);

    assert!(session.grade_all(true).await.is_ok());
}

#[tokio::test]
async fn format_check_covers_questions_outside_the_bucket() {
    let storage = storage();
    let mut session = open(&storage, PracticeMode::Classroom).await;
    session
        .record_answer(&qid("q1"), "printf(\"%d\", 42);".into())
        .await
        .unwrap();
    session.select_bucket(Bucket::Supplemental);

    let err = session.grade_all(false).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Grade(GradeError::NeedsConfirmation { suspicious: 1 })
    ));
}

#[tokio::test]
async fn explanation_unlocks_without_hints() {
    let storage = storage();
    let mut session = open(&storage, PracticeMode::Classroom).await;
    assert!(session.touch(&qid("q2")).unwrap());

    session.advance_clock(60_000);
    session.coach_tick().await;
    let view = session.coach_view(&qid("q2")).unwrap();
    assert_eq!(session.coach().row(&qid("q2")).unwrap().stage(), 0);
    assert!(view.over_time);
    assert!(!view.hint_one_visible);
    assert!(!view.explanation_available);

    session.advance_clock(239_999);
    session.coach_tick().await;
    assert!(!session.coach_view(&qid("q2")).unwrap().explanation_available);

    session.advance_clock(1);
    session.coach_tick().await;
    let view = session.coach_view(&qid("q2")).unwrap();
    assert!(view.explanation_available);
    assert!(view.nudge);

    assert_eq!(session.toggle_explanation(&qid("q2")).unwrap(), Some(true));
}

#[tokio::test]
async fn wrong_grades_open_hints_and_explanation() {
    let storage = storage();
    let mut session = open(&storage, PracticeMode::Classroom).await;
    session.record_answer(&qid("q1"), "41".into()).await.unwrap();

    session.grade_all(false).await.unwrap();
    let view = session.coach_view(&qid("q1")).unwrap();
    assert!(view.hint_one_visible);
    assert_eq!(view.wrong_grades, 1);
    assert!(!view.explanation_available);

    session.advance_clock(20_000);
    session.grade_all(false).await.unwrap();
    let view = session.coach_view(&qid("q1")).unwrap();
    assert_eq!(view.wrong_grades, 2);
    assert!(view.explanation_available);

    session.record_answer(&qid("q1"), "42".into()).await.unwrap();
    session.advance_clock(20_000);
    session.grade_all(false).await.unwrap();
    let row = session.coach().row(&qid("q1")).unwrap();
    assert!(row.solved());
    assert!(row.explain_unlocked());
}

#[tokio::test]
async fn coach_state_is_written_after_the_coalescing_window() {
    let storage = storage();
    let mut session = open(&storage, PracticeMode::Classroom).await;
    session.touch(&qid("q1")).unwrap();
    assert!(session.coach().has_pending_write());

    let key = keys::coach_state(&SetId::new("loops"));
    session.advance_clock(100);
    session.timer_tick().await;
    assert_eq!(session.store().get_raw(&key).await, None);

    session.advance_clock(200);
    session.timer_tick().await;
    let saved = session.store().get_raw(&key).await.unwrap();
    assert!(saved.contains("\"q1\""));
    assert!(!session.coach().has_pending_write());
}

#[tokio::test]
async fn timebox_prompt_fires_once_per_day() {
    let storage = storage();
    let mut session = open(&storage, PracticeMode::Classroom).await;

    session.advance_clock(899_000);
    assert_eq!(session.coach_tick().await, None);
    session.advance_clock(1_000);
    let prompt = session.coach_tick().await.unwrap();
    assert_eq!(prompt.recommended_ms, 900_000);
    assert!(!session.timer().is_running());
    assert!(session.timebox_open());
    assert_eq!(session.coach_tick().await, None);

    assert_eq!(session.resolve_timebox(TimeboxChoice::Continue).await, None);
    assert!(session.timer().is_running());
    session.close().await;

    let mut reopened = open(&storage, PracticeMode::Classroom).await;
    assert_eq!(reopened.elapsed_ms(), 900_000);
    assert_eq!(reopened.coach_tick().await, None);
}

#[tokio::test]
async fn help_toggle_respects_cooldown_and_pushes_status() {
    let storage = storage();
    let mut session = open(&storage, PracticeMode::Classroom).await;
    let sink = Arc::new(RecordingSink::new());
    let identity = DashboardIdentity::resolve(session.store(), Some("A".into()), Some("7".into()), None)
        .await
        .unwrap();
    session.attach_dashboard(identity, sink.clone()).await;
    assert_eq!(sink.statuses().len(), 1);

    session.record_answer(&qid("q2"), "x".into()).await.unwrap();
    assert_eq!(session.set_help(true).await, Some(HelpOutcome::Activated));
    let pushed = sink.statuses();
    let last = pushed.last().unwrap();
    assert!(last.help_active);
    assert_eq!(last.help_qid, "q2");
    assert_eq!(last.mode, "class");
    assert_eq!(last.bucket, "core");
    assert_eq!(last.progress.answered, 1);
    assert_eq!(last.progress.total, 3);

    session.advance_clock(10_000);
    assert_eq!(session.set_help(true).await, Some(HelpOutcome::Refreshed));
    assert_eq!(session.set_help(false).await, Some(HelpOutcome::Deactivated));
    let before = sink.statuses().len();
    assert_eq!(
        session.set_help(true).await,
        Some(HelpOutcome::CoolingDown { remaining_ms: 10_000 })
    );
    assert_eq!(sink.statuses().len(), before);
    assert!(!sink.statuses().last().unwrap().help_active);
}

#[tokio::test]
async fn timebox_help_request_raises_hand() {
    let storage = storage();
    let mut session = open(&storage, PracticeMode::Classroom).await;
    let sink = Arc::new(RecordingSink::new());
    let identity = DashboardIdentity::resolve(session.store(), None, Some("7".into()), None)
        .await
        .unwrap();
    session.attach_dashboard(identity, sink.clone()).await;

    session.advance_clock(900_000);
    assert!(session.coach_tick().await.is_some());
    assert_eq!(
        session.resolve_timebox(TimeboxChoice::RequestHelp).await,
        Some(HelpOutcome::Activated)
    );
    assert!(sink.statuses().last().unwrap().help_active);
}

#[tokio::test]
async fn reconnect_triggers_a_fresh_status_push() {
    let storage = storage();
    let mut session = open(&storage, PracticeMode::Practice).await;
    let sink = Arc::new(RecordingSink::new());
    let identity = DashboardIdentity::resolve(session.store(), None, Some("7".into()), None)
        .await
        .unwrap();
    session.attach_dashboard(identity, sink.clone()).await;
    let before = sink.statuses().len();

    session.timer_tick().await;
    assert_eq!(sink.statuses().len(), before);

    sink.mark_reconnected();
    session.advance_clock(3_000);
    session.timer_tick().await;
    assert_eq!(sink.statuses().len(), before + 1);
    assert!(sink.statuses().last().unwrap().solve_elapsed_ms >= 3_000);

    session.timer_tick().await;
    assert_eq!(sink.statuses().len(), before + 1);
}

#[tokio::test]
async fn grading_reports_top_tries() {
    let storage = storage();
    let mut session = open(&storage, PracticeMode::Practice).await;
    let sink = Arc::new(RecordingSink::new());
    let identity = DashboardIdentity::resolve(session.store(), None, Some("7".into()), Some("Kim".into()))
        .await
        .unwrap();
    session.attach_dashboard(identity, sink.clone()).await;

    session.grade_all(false).await.unwrap();
    let last = sink.statuses().pop().unwrap();
    assert_eq!(last.mode, "practice");
    assert_eq!(last.bucket, "");
    assert_eq!(last.display_name, "Kim");
    assert_eq!(last.grade_attempts_today, 1);
    assert_eq!(last.top_tries.len(), 3);
}

#[tokio::test]
async fn reset_clears_answers_meta_and_time() {
    let storage = storage();
    let mut session = open(&storage, PracticeMode::Practice).await;
    session.record_answer(&qid("q1"), "42".into()).await.unwrap();
    session.grade_all(false).await.unwrap();
    session.advance_clock(5_000);

    session.reset_answers().await;
    assert!(session.answers().sheet().is_empty());
    assert_eq!(session.grading().attempts_today(calendar_day(session.now())), 0);
    assert_eq!(session.elapsed_ms(), 0);
    let set = SetId::new("loops");
    assert_eq!(session.store().get_raw(&keys::solve_time(&set)).await.as_deref(), Some("0"));
    assert_eq!(session.store().get_raw(&keys::grade_meta(&set)).await, None);
    assert_eq!(session.progress().answered, 0);
}

#[tokio::test]
async fn leaving_classroom_discards_answers() {
    let storage = storage();
    let mut session = SessionContext::open(
        &storage,
        SessionConfig::default(),
        fixed_clock(),
        SessionOptions::new(SetId::new("loops")).with_requested_mode(PracticeMode::Classroom),
    )
    .await
    .unwrap();
    assert_eq!(session.mode(), PracticeMode::Classroom);
    session.record_answer(&qid("q1"), "42".into()).await.unwrap();

    session.switch_mode(PracticeMode::Practice).await;
    assert!(session.answers().sheet().is_empty());
    assert_eq!(
        session.store().get_raw(&keys::practice_mode()).await.as_deref(),
        Some("normal")
    );
    assert_eq!(session.progress().total, 3);
}

#[tokio::test]
async fn bucket_selection_scopes_progress() {
    let storage = storage();
    let mut session = open(&storage, PracticeMode::Classroom).await;
    session.record_answer(&qid("q3"), AnswerValue::Choice(0)).await.unwrap();
    assert_eq!(session.progress().total, 2);
    assert_eq!(session.progress().answered, 0);

    let progress = session.select_bucket(Bucket::Supplemental);
    assert_eq!(progress.total, 1);
    assert_eq!(progress.answered, 1);
}

#[tokio::test]
async fn persisted_state_survives_reopen() {
    let storage = storage();
    let mut session = open(&storage, PracticeMode::Practice).await;
    session.record_answer(&qid("q1"), "42".into()).await.unwrap();
    session.advance_clock(3_000);
    session.set_visible(false).await;
    assert!(!session.timer().is_running());

    let reopened = open(&storage, PracticeMode::Practice).await;
    assert_eq!(reopened.answers().get(&qid("q1")), Some(&AnswerValue::from("42")));
    assert_eq!(reopened.elapsed_ms(), 3_000);
}

#[tokio::test]
async fn corrupt_answers_degrade_to_empty() {
    let storage = storage();
    storage
        .values
        .set(&keys::answers(&SetId::new("loops")), "{ broken")
        .await
        .unwrap();
    let session = open(&storage, PracticeMode::Practice).await;
    assert!(session.answers().sheet().is_empty());
}

#[tokio::test]
async fn unknown_set_and_question_are_errors() {
    let storage = storage();
    let err = SessionContext::open(
        &storage,
        SessionConfig::default(),
        fixed_clock(),
        SessionOptions::new(SetId::new("missing")),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, SessionError::ProblemSet { .. }));

    let mut session = open(&storage, PracticeMode::Practice).await;
    let err = session.record_answer(&qid("nope"), "1".into()).await.unwrap_err();
    assert!(matches!(err, SessionError::UnknownQuestion(_)));
}

#[tokio::test]
async fn export_covers_every_question() {
    let storage = storage();
    let mut session = open(&storage, PracticeMode::Classroom).await;
    session.record_answer(&qid("q3"), AnswerValue::Choice(2)).await.unwrap();
    session.advance_clock(7_000);

    let export = session.export();
    assert_eq!(export.per_question.len(), 3);
    assert_eq!(export.score.correct, 1);
    assert_eq!(export.solve_elapsed_ms, 7_000);
    assert_eq!(export.lang, "c");
    assert_eq!(export.set.category_id, "");
}

#[tokio::test]
async fn reset_identity_disconnects() {
    let storage = storage();
    let mut session = open(&storage, PracticeMode::Practice).await;
    let sink = Arc::new(RecordingSink::new());
    let identity = DashboardIdentity::resolve(session.store(), Some("A".into()), Some("7".into()), None)
        .await
        .unwrap();
    session.attach_dashboard(identity, sink.clone()).await;

    session.reset_identity().await;
    assert!(session.dashboard().is_none());
    assert!(sink.is_closed());
    assert_eq!(session.store().get_raw(&keys::dashboard_student()).await, None);
    assert_eq!(session.set_help(true).await, None);
}
