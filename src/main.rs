use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use isometric_narrative::dialogue::{DialogueLine, DialogueSurface, SpeakerDefaults};
use isometric_narrative::quest::{DomainEvent, RewardBundle};
use isometric_narrative::{Narrative, NarrativeConfig, RewardSink};

// ============================================================================
// Log-backed collaborators
// ============================================================================

/// Surface that writes everything it is shown to the log
struct LogSurface {
    name: String,
    open: bool,
}

impl LogSurface {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            open: false,
        }
    }
}

impl DialogueSurface for LogSurface {
    fn is_open(&self) -> bool {
        self.open
    }

    fn open(&mut self, speaker: &SpeakerDefaults) {
        self.open = true;
        info!("[{}] {} begins speaking", self.name, speaker.display_name);
    }

    fn show_line(&mut self, line: &DialogueLine) {
        info!("[{}] {}: {}", self.name, line.speaker_name, line.text);
    }

    fn close(&mut self) {
        self.open = false;
        info!("[{}] closed", self.name);
    }
}

struct LogRewards;

impl RewardSink for LogRewards {
    fn grant(&mut self, context: &str, bundle: &RewardBundle) {
        info!(
            "Reward {}: {} exp, {} gold, items {:?}",
            context,
            bundle.exp,
            bundle.gold,
            bundle
                .items
                .iter()
                .map(|i| format!("{}x{}", i.item_id, i.count))
                .collect::<Vec<_>>()
        );
    }
}

// ============================================================================
// Console commands
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("'{0}' needs a {1}")]
    MissingArgument(&'static str, &'static str),
    #[error("'{0}' is not a number")]
    BadValue(String),
}

#[derive(Debug, PartialEq, Eq)]
enum HostCommand {
    Event {
        event_type: String,
        key: Option<String>,
        value: i32,
    },
    Next(Option<String>),
    Close(Option<String>),
    Start {
        quest_id: String,
        reset_steps: bool,
    },
    Stop(String),
    Status,
    Quit,
}

impl HostCommand {
    fn parse(line: &str) -> Result<Self, CommandError> {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            return Err(CommandError::Empty);
        };
        let arg = parts.next().map(str::to_string);

        match command {
            "event" => {
                let event_type = arg.ok_or(CommandError::MissingArgument("event", "type"))?;
                let key = parts.next().map(str::to_string);
                let value = match parts.next() {
                    Some(v) => v.parse().map_err(|_| CommandError::BadValue(v.to_string()))?,
                    None => 1,
                };
                Ok(HostCommand::Event {
                    event_type,
                    key,
                    value,
                })
            }
            "next" => Ok(HostCommand::Next(arg)),
            "close" => Ok(HostCommand::Close(arg)),
            "start" => Ok(HostCommand::Start {
                quest_id: arg.ok_or(CommandError::MissingArgument("start", "quest id"))?,
                reset_steps: parts.next() != Some("keep"),
            }),
            "stop" => Ok(HostCommand::Stop(
                arg.ok_or(CommandError::MissingArgument("stop", "quest id"))?,
            )),
            "status" => Ok(HostCommand::Status),
            "quit" | "exit" => Ok(HostCommand::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }
}

/// Apply a command. Returns false when the host should exit.
fn run_command(narrative: &mut Narrative, command: HostCommand, default_surface: &str) -> bool {
    match command {
        HostCommand::Event {
            event_type,
            key,
            value,
        } => narrative.push_event(DomainEvent::new(event_type, key.as_deref(), value)),
        HostCommand::Next(surface) => {
            let surface = surface.as_deref().unwrap_or(default_surface);
            if !narrative.advance(surface) {
                warn!("No dialogue open on '{}'", surface);
            }
        }
        HostCommand::Close(surface) => {
            let surface = surface.as_deref().unwrap_or(default_surface);
            if !narrative.force_close(surface) {
                warn!("No dialogue open on '{}'", surface);
            }
        }
        HostCommand::Start {
            quest_id,
            reset_steps,
        } => {
            narrative.try_start_quest(&quest_id, reset_steps);
        }
        HostCommand::Stop(quest_id) => narrative.stop_quest(&quest_id),
        HostCommand::Status => log_status(narrative),
        HostCommand::Quit => return false,
    }
    true
}

fn log_status(narrative: &Narrative) {
    let quests = narrative.quests();
    if quests.active_ids().is_empty() {
        info!("No active quests");
    }
    for quest_id in quests.active_ids() {
        let Some(instance) = quests.instance(quest_id) else {
            continue;
        };
        let step = instance.current_step();
        info!(
            "Quest '{}' at step {} ({}), dialogue: {}",
            quest_id,
            step,
            quests.get_step_key(quest_id, step).unwrap_or_default(),
            quests.dialogue_in_flight(quest_id).unwrap_or("none")
        );
    }
    info!("Play-once dialogues seen: {}", narrative.played().len());
    for surface in narrative.sessions().surface_ids() {
        info!(
            "Surface '{}': {}",
            surface,
            if narrative.is_open(surface) { "open" } else { "idle" }
        );
    }
}

// ============================================================================
// Main
// ============================================================================

fn init_tracing(log_filter: &str) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in log_filter.split(',').filter(|d| !d.trim().is_empty()) {
        match directive.trim().parse::<tracing_subscriber::filter::Directive>() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(e) => eprintln!("Ignoring log directive '{}': {}", directive, e),
        }
    }
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() {
    let config = NarrativeConfig::from_env();
    let log_filter = match &config {
        Ok(config) => config.log_filter.clone(),
        Err(_) => NarrativeConfig::default().log_filter,
    };
    init_tracing(&log_filter);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let mut narrative = match Narrative::from_config(&config) {
        Ok(narrative) => narrative.with_rewards(Box::new(LogRewards)),
        Err(e) => {
            error!("Failed to load narrative data: {}", e);
            std::process::exit(1);
        }
    };

    for surface in config.surface_names() {
        narrative.register_surface(surface.clone(), Box::new(LogSurface::new(surface)));
    }
    for quest_id in &config.autostart {
        narrative.try_start_quest(quest_id, true);
    }

    info!(
        "Narrative host running at {} Hz; commands: event <type> [key] [value], next [surface], close [surface], start <quest> [keep], stop <quest>, status, quit",
        config.tick_rate_hz
    );

    let mut interval = tokio::time::interval(config.tick_interval());
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut last_tick = Instant::now();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Instant::now();
                narrative.tick(now.duration_since(last_tick));
                last_tick = now;
            }
            line = stdin.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => match HostCommand::parse(&line) {
                        Ok(command) => {
                            if !run_command(&mut narrative, command, &config.default_surface) {
                                break;
                            }
                        }
                        Err(CommandError::Empty) => {}
                        Err(e) => warn!("{}", e),
                    },
                    Ok(None) => {
                        info!("Stdin closed, running until interrupted");
                        stdin_open = false;
                    }
                    Err(e) => {
                        error!("Failed to read command: {}", e);
                        stdin_open = false;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    narrative.tick(Duration::ZERO);
    info!("Narrative host stopped");
}
