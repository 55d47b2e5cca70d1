//! Line-oriented terminal front end for one practice session.

use std::fmt::Write as _;

use practice_core::model::{AnswerValue, Bucket, PracticeMode, QuestionId, QuestionKind};
use services::{
    GradeError, HelpOutcome, RuntimeEvent, SessionContext, SessionError, SessionRuntime,
    TimeboxChoice,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Answer { question: QuestionId, text: String },
    Touch(QuestionId),
    Grade { confirmed: bool },
    View(QuestionId),
    Explain(QuestionId),
    Bucket(Bucket),
    Mode(PracticeMode),
    Hand,
    Continue,
    AskForHelp,
    Hide,
    Show,
    Reset,
    Forget,
    Export,
    Status,
    Usage,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    Empty,
    Unknown(String),
    Missing(&'static str),
    Invalid { what: &'static str, raw: String },
}

impl std::fmt::Display for InputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputError::Empty => f.write_str("empty input"),
            InputError::Unknown(word) => write!(f, "unknown command: {word} (try `?`)"),
            InputError::Missing(what) => write!(f, "missing {what}"),
            InputError::Invalid { what, raw } => write!(f, "invalid {what}: {raw}"),
        }
    }
}

fn question_arg<'a>(words: &mut impl Iterator<Item = &'a str>) -> Result<QuestionId, InputError> {
    words
        .next()
        .map(QuestionId::new)
        .ok_or(InputError::Missing("question id"))
}

impl Input {
    /// Parses `line`. Answer text keeps its inner spacing.
    ///
    /// # Errors
    ///
    /// Returns `InputError` for blank, unknown or incomplete commands.
    pub fn parse(line: &str) -> Result<Self, InputError> {
        let line = line.trim();
        let mut words = line.split_whitespace();
        let command = words.next().ok_or(InputError::Empty)?;
        match command {
            "answer" | "a" => {
                let question = question_arg(&mut words)?;
                let text = line
                    .splitn(3, char::is_whitespace)
                    .nth(2)
                    .map(str::trim)
                    .unwrap_or_default()
                    .to_string();
                Ok(Input::Answer { question, text })
            }
            "touch" => Ok(Input::Touch(question_arg(&mut words)?)),
            "grade" | "g" => Ok(Input::Grade { confirmed: false }),
            "grade!" | "g!" => Ok(Input::Grade { confirmed: true }),
            "view" | "v" => Ok(Input::View(question_arg(&mut words)?)),
            "explain" => Ok(Input::Explain(question_arg(&mut words)?)),
            "bucket" => {
                let raw = words.next().ok_or(InputError::Missing("bucket"))?;
                Bucket::from_tag(raw)
                    .map(Input::Bucket)
                    .ok_or_else(|| InputError::Invalid {
                        what: "bucket",
                        raw: raw.to_string(),
                    })
            }
            "mode" => {
                let raw = words.next().ok_or(InputError::Missing("mode"))?;
                raw.parse::<PracticeMode>()
                    .map(Input::Mode)
                    .map_err(|_| InputError::Invalid {
                        what: "mode",
                        raw: raw.to_string(),
                    })
            }
            "hand" => Ok(Input::Hand),
            "continue" | "c" => Ok(Input::Continue),
            "ask" => Ok(Input::AskForHelp),
            "hide" => Ok(Input::Hide),
            "show" => Ok(Input::Show),
            "reset" => Ok(Input::Reset),
            "forget" => Ok(Input::Forget),
            "export" => Ok(Input::Export),
            "status" | "s" => Ok(Input::Status),
            "?" | "usage" => Ok(Input::Usage),
            "quit" | "q" | "exit" => Ok(Input::Quit),
            other => Err(InputError::Unknown(other.to_string())),
        }
    }
}

const USAGE: &str = "\
commands:
  a <qid> <text>     answer a question (choice index for multiple choice)
  touch <qid>        start working on a question
  g | g!             grade (g! skips the format check)
  v <qid>            coaching panel of a question
  explain <qid>      open or close the explanation
  bucket core|supp   switch bucket (classroom)
  mode class|normal  switch mode
  hand               raise or lower your hand
  continue | ask     answer the time-box prompt
  hide | show        pause or resume the clock
  reset              clear answers and time
  forget             forget the dashboard identity
  export             print the grading log
  s                  status
  q                  quit";

fn answer_value(session: &SessionContext, question: &QuestionId, text: String) -> AnswerValue {
    let choice = session
        .set()
        .question(question)
        .filter(|(_, q)| matches!(q.kind(), QuestionKind::MultipleChoice { .. }))
        .and_then(|_| text.trim().parse::<usize>().ok());
    match choice {
        Some(index) => AnswerValue::Choice(index),
        None => AnswerValue::Text(text),
    }
}

fn describe_help(outcome: Option<HelpOutcome>) -> String {
    match outcome {
        None => "no dashboard connected".into(),
        Some(HelpOutcome::Activated) => "hand raised".into(),
        Some(HelpOutcome::Refreshed) => "hand still raised".into(),
        Some(HelpOutcome::Deactivated) => "hand lowered".into(),
        Some(HelpOutcome::CoolingDown { remaining_ms }) => {
            format!("wait {}s before raising your hand again", (remaining_ms + 999) / 1000)
        }
    }
}

fn describe_status(session: &SessionContext) -> String {
    let clock = session.clock_display();
    let progress = session.progress();
    let mut out = format!(
        "{} [{}] {}/{} answered, {} correct, clock {}",
        session.set().title(),
        session.mode(),
        progress.answered,
        progress.total,
        progress.correct,
        clock.main,
    );
    if let Some(overflow) = clock.overflow {
        let _ = write!(out, " ({overflow})");
    }
    if clock.paused {
        out.push_str(" paused");
    }
    if session.mode().is_classroom() {
        let _ = write!(out, ", bucket {}", session.bucket().as_str());
    }
    out
}

fn describe_view(session: &SessionContext, question: &QuestionId) -> Result<String, SessionError> {
    let view = session.coach_view(question)?;
    let Some((_, q)) = session.set().question(question) else {
        return Err(SessionError::UnknownQuestion(question.clone()));
    };
    let mut out = format!(
        "{question}: {}s of {}s",
        view.spent_ms / 1000,
        view.recommended_ms / 1000
    );
    if view.wrong_grades > 0 {
        let _ = write!(out, ", {} wrong", view.wrong_grades);
    }
    if view.hint_one_visible {
        if let Some(hint) = q.hint(1) {
            let _ = write!(out, "\n  hint: {hint}");
        }
    }
    if view.hint_two_visible {
        if let Some(hint) = q.hint(2) {
            let _ = write!(out, "\n  hint: {hint}");
        }
    }
    if view.explanation_open {
        if let Some(text) = q.explanation() {
            let _ = write!(out, "\n  explanation: {text}");
        }
    } else if view.explanation_available {
        out.push_str("\n  explanation available (explain <qid>)");
    }
    if view.nudge {
        out.push_str("\n  stuck? try `hand`");
    }
    Ok(out)
}

enum Flow {
    Continue,
    Quit,
}

async fn apply(session: &mut SessionContext, input: Input) -> Result<(String, Flow), SessionError> {
    let reply = match input {
        Input::Answer { question, text } => {
            let value = answer_value(session, &question, text);
            let progress = session.record_answer(&question, value).await?;
            format!("saved ({}/{} answered)", progress.answered, progress.total)
        }
        Input::Touch(question) => {
            session.touch(&question)?;
            format!("working on {question}")
        }
        Input::Grade { confirmed } => match session.grade_all(confirmed).await {
            Ok(report) => {
                let mut out = format!("{}/{} correct", report.correct, report.total);
                for verdict in &report.verdicts {
                    let mark = if verdict.is_correct { "ok" } else { "x" };
                    let _ = write!(out, "\n  {mark} {}", verdict.question_id);
                }
                out
            }
            Err(SessionError::Grade(GradeError::CooldownActive { remaining_ms })) => {
                format!("grading available in {}s", (remaining_ms + 999) / 1000)
            }
            Err(SessionError::Grade(GradeError::NeedsConfirmation { suspicious })) => {
                format!("{suspicious} answer(s) look like the wrong format; `g!` to grade anyway")
            }
            Err(err) => return Err(err),
        },
        Input::View(question) => describe_view(session, &question)?,
        Input::Explain(question) => match session.toggle_explanation(&question)? {
            Some(true) => describe_view(session, &question)?,
            Some(false) => "explanation closed".into(),
            None => "explanation is still locked".into(),
        },
        Input::Bucket(bucket) => {
            let progress = session.select_bucket(bucket);
            format!("bucket {}: {} questions", bucket.as_str(), progress.total)
        }
        Input::Mode(mode) => {
            session.switch_mode(mode).await;
            format!("mode {mode}")
        }
        Input::Hand => describe_help(session.toggle_help().await),
        Input::Continue => {
            if session.timebox_open() {
                session.resolve_timebox(TimeboxChoice::Continue).await;
                "clock resumed".into()
            } else {
                "nothing to continue".into()
            }
        }
        Input::AskForHelp => {
            if session.timebox_open() {
                describe_help(session.resolve_timebox(TimeboxChoice::RequestHelp).await)
            } else {
                describe_help(session.set_help(true).await)
            }
        }
        Input::Hide => {
            session.set_visible(false).await;
            "clock paused".into()
        }
        Input::Show => {
            session.set_visible(true).await;
            describe_status(session)
        }
        Input::Reset => {
            session.reset_answers().await;
            "answers cleared".into()
        }
        Input::Forget => {
            session.reset_identity().await;
            "dashboard identity cleared".into()
        }
        Input::Export => match session.export().to_json_pretty() {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, "export failed");
                "export failed".into()
            }
        },
        Input::Status => describe_status(session),
        Input::Usage => USAGE.into(),
        Input::Quit => return Ok((String::new(), Flow::Quit)),
    };
    Ok((reply, Flow::Continue))
}

fn describe_event(event: &RuntimeEvent) -> String {
    match event {
        RuntimeEvent::Timebox(prompt) => format!(
            "time's up: {} min planned, {} min spent. `continue` or `ask` for help",
            prompt.recommended_ms / 60_000,
            prompt.elapsed_ms / 60_000
        ),
    }
}

/// Drive `session` from stdin until `q`, end of input, or ctrl-c.
///
/// # Errors
///
/// Returns the stdin read error.
pub async fn run(session: SessionContext) -> std::io::Result<()> {
    println!("{}", describe_status(&session));
    println!("`?` lists commands");
    let (runtime, mut events): (SessionRuntime, mpsc::UnboundedReceiver<RuntimeEvent>) =
        SessionRuntime::spawn(session);
    let shared = runtime.session();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            Some(event) = events.recv() => println!("{}", describe_event(&event)),
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break Ok(()),
                    Err(err) => break Err(err),
                };
                let input = match Input::parse(&line) {
                    Ok(input) => input,
                    Err(InputError::Empty) => continue,
                    Err(err) => {
                        println!("{err}");
                        continue;
                    }
                };
                let mut session = shared.lock().await;
                match apply(&mut session, input).await {
                    Ok((_, Flow::Quit)) => break Ok(()),
                    Ok((reply, Flow::Continue)) => println!("{reply}"),
                    Err(err) => println!("{err}"),
                }
            }
        }
    };
    drop(shared);
    runtime.shutdown().await;
    result
}
