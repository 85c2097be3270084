use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use exam_core::model::UNANSWERED;
use exam_core::monitor::PageSignal;
use exam_core::state::SessionState;
use exam_core::timer::format_remaining;
use services::session::status_notice;
use services::{
    ClientConfig, Clock, ExamSession, HostEvent, HttpExamCatalog, HttpScoringService,
    SessionDriver, SessionLoader, SessionUpdate, SubmissionProtocol,
};
use storage::SqliteSessionStore;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingLink,
    MissingEmail,
    UnknownArg(String),
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingLink => write!(f, "a share link is required"),
            ArgsError::MissingEmail => write!(f, "--email is required to start a new attempt"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- take <share-url> [--email <address>] [--db <sqlite_url>] [--base-url <url>]");
    eprintln!();
    eprintln!("Commands while the exam runs:");
    eprintln!("  answer <question> <option>   select an option (both 1-based)");
    eprintln!("  clear <question>             remove an answer");
    eprintln!("  submit | confirm | cancel    manual submission");
    eprintln!("  retry                        resend after a failed submission");
    eprintln!("  hide | blur                  simulate leaving the page");
    eprintln!("  quit                         close; the attempt stays resumable");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  EXAM_API_BASE_URL, EXAM_STORE_URL, EXAM_SUBMIT_TIMEOUT_SECS, EXAM_SUBMIT_ATTEMPTS");
    eprintln!("  RUST_LOG (default: info)");
}

struct Args {
    link: String,
    email: Option<String>,
    config: ClientConfig,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut config = ClientConfig::from_env();
        let mut link = None;
        let mut email = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--email" => email = Some(require_value(args, "--email")?),
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    config.store_url = value;
                }
                "--base-url" => {
                    config.base_url = require_value(args, "--base-url")?
                        .trim_end_matches('/')
                        .to_owned();
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ if arg.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ if link.is_none() => link = Some(arg),
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            link: link.ok_or(ArgsError::MissingLink)?,
            email,
            config,
        })
    }
}

/// Map a console line to a host event. 1-based indices on the console.
fn parse_command(line: &str) -> Option<HostEvent> {
    let mut words = line.split_whitespace();
    let index = |raw: Option<&str>| raw?.parse::<usize>().ok()?.checked_sub(1);

    match words.next()? {
        "answer" | "a" => {
            let question = index(words.next())?;
            let option = i32::try_from(index(words.next())?).ok()?;
            Some(HostEvent::Answer {
                question,
                value: option,
            })
        }
        "clear" => Some(HostEvent::Answer {
            question: index(words.next())?,
            value: UNANSWERED,
        }),
        "submit" => Some(HostEvent::RequestSubmit),
        "confirm" | "yes" => Some(HostEvent::ConfirmSubmit),
        "cancel" | "no" => Some(HostEvent::CancelSubmit),
        "retry" => Some(HostEvent::RetrySubmit),
        "hide" => Some(HostEvent::Page(PageSignal::Hidden)),
        "blur" => Some(HostEvent::Page(PageSignal::Blur)),
        "quit" | "exit" => Some(HostEvent::Close),
        _ => None,
    }
}

fn print_exam(session: &ExamSession) {
    let exam = session.exam();
    println!("{}", exam.title());
    if !exam.description().is_empty() {
        println!("{}", exam.description());
    }
    for (index, question) in exam.questions().iter().enumerate() {
        println!();
        println!("{}. {}", index + 1, question.prompt);
        if let Some(context) = &question.context {
            println!("   {context}");
        }
        let selected = session.answers().get(index);
        for option in 0..question.option_count() {
            let marker = if selected == i32::try_from(option).ok() {
                "*"
            } else {
                " "
            };
            let label = question.option_label(option).unwrap_or_default();
            println!("  {marker}{}) {label}", option + 1);
        }
    }
    println!();
}

fn print_update(update: &SessionUpdate) {
    match update {
        SessionUpdate::Tick { remaining } if *remaining % 60 == 0 || *remaining <= 10 => {
            println!("time left: {}", format_remaining(*remaining));
        }
        SessionUpdate::Tick { .. } => {}
        SessionUpdate::StateChanged(state) => {
            if let Some(notice) = status_notice(state) {
                println!("{notice}");
            }
        }
        SessionUpdate::ViolationDetected(violation) => {
            println!("integrity violation: {}", violation.kind);
        }
        SessionUpdate::ConfirmSubmit(prompt) => {
            println!(
                "{} of {} answered, {} unanswered. Type `confirm` to submit or `cancel`.",
                prompt.answered, prompt.total, prompt.unanswered
            );
        }
        SessionUpdate::Rejected(reason) => println!("not accepted: {reason}"),
    }
}

fn print_results(session: &ExamSession) {
    let Some(disclosure) = session.disclosure() else {
        return;
    };
    if let Some(score) = &disclosure.score {
        println!(
            "score: {}/{} ({:.1}%)",
            score.score, score.total_questions, score.percentage
        );
    }
    for entry in disclosure.answer_key.iter().flatten() {
        let selected = entry
            .selected
            .map_or_else(|| "none".to_owned(), |v| (v + 1).to_string());
        println!(
            "{}. {} | correct: {} | yours: {selected}",
            entry.question + 1,
            entry.prompt,
            entry.correct_label.as_deref().unwrap_or("?"),
        );
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1).peekable();
    match argv.peek().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some("take") => {
            argv.next();
        }
        Some(_) => {}
    }

    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let clock = Clock::default();
    let store = SqliteSessionStore::open(&args.config.store_url).await?;
    let client = reqwest::Client::new();
    let catalog = HttpExamCatalog::new(client.clone(), args.config.base_url.clone());
    let scoring = HttpScoringService::new(client, args.config.base_url.clone());
    let protocol =
        SubmissionProtocol::new(Arc::new(scoring)).with_policy(args.config.submission_policy());

    let loader = SessionLoader::new(
        clock,
        Arc::new(catalog),
        Arc::new(store),
        Arc::new(protocol),
    );
    let mut session = loader.open_url(&args.link).await?;

    if session.state() == &SessionState::NotStarted {
        let email = args.email.ok_or(ArgsError::MissingEmail)?;
        session.start(&email, clock.now()).await?;
    }
    print_exam(&session);
    println!(
        "time left: {}",
        format_remaining(session.remaining_seconds(clock.now()))
    );

    let (events, events_rx) = mpsc::channel(32);
    let (updates_tx, mut updates) = mpsc::unbounded_channel();

    let input = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line,
                _ = tokio::signal::ctrl_c() => Ok(Some("quit".to_owned())),
            };
            let event = match line {
                Ok(Some(line)) => match parse_command(&line) {
                    Some(event) => event,
                    None => {
                        eprintln!("unrecognised command: {line}");
                        continue;
                    }
                },
                Ok(None) => HostEvent::Close,
                Err(err) => {
                    tracing::warn!(error = %err, "stdin closed");
                    HostEvent::Close
                }
            };
            let closing = event == HostEvent::Close;
            if events.send(event).await.is_err() || closing {
                break;
            }
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            print_update(&update);
        }
    });

    let state = SessionDriver::new(clock)
        .with_tick_interval(Duration::from_secs(1))
        .run(&mut session, events_rx, updates_tx)
        .await;
    input.abort();
    printer.await?;

    if state.is_submitted() {
        print_results(&session);
    } else {
        println!("Progress saved. Open the same link again to resume.");
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // Exit explicitly: a pending stdin read would otherwise hold up runtime shutdown.
    let code = match run().await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{err}");
            2
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Result<Args, ArgsError> {
        Args::parse(&mut raw.iter().map(|s| (*s).to_owned()))
    }

    #[test]
    fn console_commands_use_one_based_indices() {
        assert_eq!(
            parse_command("answer 2 3"),
            Some(HostEvent::Answer {
                question: 1,
                value: 2
            })
        );
        assert_eq!(
            parse_command("clear 1"),
            Some(HostEvent::Answer {
                question: 0,
                value: UNANSWERED
            })
        );
        assert_eq!(parse_command("answer 0 1"), None);
        assert_eq!(parse_command("hide"), Some(HostEvent::Page(PageSignal::Hidden)));
        assert_eq!(parse_command("dance"), None);
    }

    #[test]
    fn parses_link_and_flags() {
        let parsed = args(&[
            "https://exams.test/take/abc",
            "--email",
            "a@b.com",
            "--base-url",
            "http://api.test/",
            "--db",
            "sqlite::memory:",
        ])
        .unwrap();
        assert_eq!(parsed.link, "https://exams.test/take/abc");
        assert_eq!(parsed.email.as_deref(), Some("a@b.com"));
        assert_eq!(parsed.config.base_url, "http://api.test");
        assert_eq!(parsed.config.store_url, "sqlite::memory:");

        assert!(matches!(args(&[]), Err(ArgsError::MissingLink)));
        assert!(matches!(
            args(&["x", "--email"]),
            Err(ArgsError::MissingValue { flag: "--email" })
        ));
        assert!(matches!(args(&["x", "y"]), Err(ArgsError::UnknownArg(_))));
    }
}
