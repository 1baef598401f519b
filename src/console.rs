//! Operator console: a tiny line-oriented command language on stdin.
//!
//! Telemetry dashboard:
//!
//! ```text
//! status                 all robots + link
//! history R2             full history ring as JSON
//! start R2 | stop R2     START / STOP to one robot
//! start all | stop all   START / STOP to every robot
//! all <text>             any command to every robot
//! R2 <text>              any command to one robot
//! ```
//!
//! Line-follower debug console:
//!
//! ```text
//! state                  sensor frame + calibration
//! send <text>            bare text to the follower
//! cal start|stop|reset   calibration session control
//! cal code               firmware snippet for the recorded bounds
//! ```
use crate::api::{ApiResult, CalibrationSignal, CommandRequest, DebugApi, TelemetryApi};
use log::{info, trace, warn};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    Status,
    State,
    History(String),
    Start(String),
    Stop(String),
    StartAll,
    StopAll,
    Broadcast(String),
    Send { device: String, text: String },
    Raw(String),
    Calibration(CalibrationSignal),
    CalibrationCode,
    Quit,
    Unknown,
    Invalid(String),
}

pub struct ConsoleParser;

impl ConsoleParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, raw: &str) -> ConsoleCommand {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return ConsoleCommand::Unknown;
        }
        let (head, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (trimmed, ""),
        };
        let cmd = match head.to_ascii_lowercase().as_str() {
            "help" | "?" => ConsoleCommand::Help,
            "status" => ConsoleCommand::Status,
            "state" => ConsoleCommand::State,
            "quit" | "exit" => ConsoleCommand::Quit,
            "history" => match rest {
                "" => ConsoleCommand::Invalid("Device required".into()),
                id => ConsoleCommand::History(id.to_string()),
            },
            "start" => match rest {
                "" => ConsoleCommand::Invalid("Device required".into()),
                all if all.eq_ignore_ascii_case("all") => ConsoleCommand::StartAll,
                id => ConsoleCommand::Start(id.to_string()),
            },
            "stop" => match rest {
                "" => ConsoleCommand::Invalid("Device required".into()),
                all if all.eq_ignore_ascii_case("all") => ConsoleCommand::StopAll,
                id => ConsoleCommand::Stop(id.to_string()),
            },
            "all" => match rest {
                "" => ConsoleCommand::Invalid("Command required".into()),
                text => ConsoleCommand::Broadcast(text.to_string()),
            },
            "send" => match rest {
                "" => ConsoleCommand::Invalid("Text required".into()),
                text => ConsoleCommand::Raw(text.to_string()),
            },
            "cal" => {
                if rest.eq_ignore_ascii_case("code") {
                    ConsoleCommand::CalibrationCode
                } else {
                    match rest.parse() {
                        Ok(signal) => ConsoleCommand::Calibration(signal),
                        Err(_) => ConsoleCommand::Invalid("Usage: cal start|stop|reset|code".into()),
                    }
                }
            }
            _ if !rest.is_empty() => ConsoleCommand::Send {
                device: head.to_string(),
                text: rest.to_string(),
            },
            _ => ConsoleCommand::Unknown,
        };
        trace!("Parsed {:?} from '{}'", cmd, raw);
        cmd
    }
}

impl Default for ConsoleParser {
    fn default() -> Self {
        Self::new()
    }
}

const TELEMETRY_HELP: &str =
    "Commands: status | history <ID> | start <ID>|all | stop <ID>|all | all <cmd> | <ID> <cmd> | quit";
const DEBUG_HELP: &str = "Commands: state | send <text> | cal start|stop|reset|code | quit";

fn render<T: Serialize>(result: ApiResult<T>) -> String {
    match result {
        Ok(value) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|e| format!("(unprintable: {})", e)),
        Err(e) => format!("error {}", e),
    }
}

/// Answer one telemetry console line. `None` means quit.
pub async fn handle_telemetry(api: &TelemetryApi, cmd: ConsoleCommand) -> Option<String> {
    let reply = match cmd {
        ConsoleCommand::Quit => return None,
        ConsoleCommand::Help | ConsoleCommand::Unknown => TELEMETRY_HELP.to_string(),
        ConsoleCommand::Invalid(why) => why,
        ConsoleCommand::Status => render(Ok(api.status())),
        ConsoleCommand::History(id) => render(api.history(&id)),
        ConsoleCommand::Start(id) => render(api.start(&id)),
        ConsoleCommand::Stop(id) => render(api.stop(&id)),
        ConsoleCommand::StartAll => render(api.start_all().await),
        ConsoleCommand::StopAll => render(api.stop_all().await),
        ConsoleCommand::Broadcast(text) => render(api.broadcast(&text).await),
        ConsoleCommand::Send { device, text } => render(api.command(&CommandRequest {
            device,
            command: text,
        })),
        ConsoleCommand::State
        | ConsoleCommand::Raw(_)
        | ConsoleCommand::Calibration(_)
        | ConsoleCommand::CalibrationCode => "Not available on the telemetry dashboard".to_string(),
    };
    Some(reply)
}

/// Answer one debug console line. `None` means quit.
pub fn handle_debug(api: &DebugApi, cmd: ConsoleCommand, poke: &str) -> Option<String> {
    let reply = match cmd {
        ConsoleCommand::Quit => return None,
        ConsoleCommand::Help | ConsoleCommand::Unknown => DEBUG_HELP.to_string(),
        ConsoleCommand::Invalid(why) => why,
        ConsoleCommand::State | ConsoleCommand::Status => render(Ok(api.snapshot())),
        ConsoleCommand::Raw(text) => render(api.send(&text)),
        ConsoleCommand::Calibration(signal) => render(Ok(api.calibration(signal, poke))),
        ConsoleCommand::CalibrationCode => api.calibration_code().code,
        _ => "Not available on the debug console".to_string(),
    };
    Some(reply)
}

/// Returns true when the operator asked to quit, false when stdin closed.
async fn read_loop<F, Fut>(mut answer: F) -> bool
where
    F: FnMut(ConsoleCommand) -> Fut,
    Fut: std::future::Future<Output = Option<String>>,
{
    let parser = ConsoleParser::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let quit = loop {
        match lines.next_line().await {
            Ok(Some(line)) => match answer(parser.parse(&line)).await {
                Some(reply) => println!("{}", reply),
                None => break true,
            },
            Ok(None) => break false,
            Err(e) => {
                warn!("Console read failed: {}", e);
                break false;
            }
        }
    };
    info!("Console closed");
    quit
}

pub async fn run_telemetry_console(api: TelemetryApi) -> bool {
    read_loop(|cmd| {
        let api = api.clone();
        async move { handle_telemetry(&api, cmd).await }
    })
    .await
}

pub async fn run_debug_console(api: DebugApi, poke: String) -> bool {
    read_loop(|cmd| {
        let reply = handle_debug(&api, cmd, &poke);
        async move { reply }
    })
    .await
}
