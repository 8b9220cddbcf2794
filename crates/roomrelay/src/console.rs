//! Line-oriented admin console on stdin.
//!
//! Each binary reads one command per line and forwards it to its loop over
//! the command channel. Output goes to stdout; logs stay on the tracing subscriber.

use std::fmt::Write as _;
use std::io::{self, BufRead};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use roomrelay_hub::{HubCommand, HubSnapshot};
use roomrelay_worker::{WorkerCommand, WorkerSnapshot};
use tokio::sync::{mpsc, oneshot};

const WORKER_HELP: &str = "\
commands:
  clients     list connected clients
  rooms       list rooms and their occupancy
  tick <ms>   change the tick interval
  config show print the settings in effect
  drain       close every room and stop
  help        show this text";

const HUB_HELP: &str = "\
commands:
  clients     list connected clients
  workers     list configured workers
  config show print the settings in effect
  help        show this text";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsoleError {
    #[error("unknown command `{0}`, try `help`")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerConsoleCommand {
    Clients,
    Rooms,
    Tick(u32),
    Config,
    Drain,
    Help,
}

/// `config show` is the only `config` subcommand.
fn config_show<'a>(mut words: impl Iterator<Item = &'a str>) -> Result<(), ConsoleError> {
    match (words.next(), words.next()) {
        (Some("show"), None) => Ok(()),
        _ => Err(ConsoleError::Usage("config show")),
    }
}

impl FromStr for WorkerConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default();
        let parsed = match command {
            "clients" => Self::Clients,
            "rooms" => Self::Rooms,
            "drain" => Self::Drain,
            "help" => Self::Help,
            "config" => {
                config_show(words)?;
                Self::Config
            }
            "tick" => {
                let ms = words
                    .next()
                    .and_then(|w| w.parse::<u32>().ok())
                    .filter(|ms| *ms > 0)
                    .ok_or(ConsoleError::Usage("tick <ms>"))?;
                Self::Tick(ms)
            }
            other => return Err(ConsoleError::Unknown(other.to_string())),
        };
        Ok(parsed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubConsoleCommand {
    Clients,
    Workers,
    Config,
    Help,
}

impl FromStr for HubConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        match words.next().unwrap_or_default() {
            "clients" => Ok(Self::Clients),
            "workers" => Ok(Self::Workers),
            "help" => Ok(Self::Help),
            "config" => config_show(words).map(|()| Self::Config),
            other => Err(ConsoleError::Unknown(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn rtt(rtt: Option<Duration>) -> String {
    rtt.map_or_else(|| "-".to_string(), |d| format!("{}ms", d.as_millis()))
}

pub fn render_worker_clients(snap: &WorkerSnapshot) -> String {
    let mut out = format!("{} client(s)\n", snap.clients.len());
    for c in &snap.clients {
        let room = c.room.map_or_else(|| "-".to_string(), |r| r.to_string());
        let role = if c.is_hub { " [hub]" } else { "" };
        let _ = writeln!(out, "  {} {} room={} rtt={}{}", c.id, c.addr, room, rtt(c.rtt), role);
    }
    out
}

pub fn render_worker_rooms(snap: &WorkerSnapshot) -> String {
    let mut out = format!(
        "worker {} {} tick={} interval={}ms reservations={}\n",
        snap.worker_id, snap.state, snap.tick, snap.tick_interval_ms, snap.reservations
    );
    for r in &snap.rooms {
        let _ = writeln!(out, "  {} {}/{} {:?}", r.room_id, r.players, r.capacity, r.status);
    }
    out
}

pub fn render_hub_clients(snap: &HubSnapshot) -> String {
    let mut out = format!("{} client(s)\n", snap.clients.len());
    for c in &snap.clients {
        let name = c.name.as_deref().unwrap_or("-");
        let _ = writeln!(out, "  {} {} name={} rtt={}", c.id, c.addr, name, rtt(c.rtt));
    }
    out
}

pub fn render_hub_workers(snap: &HubSnapshot) -> String {
    let mut out = format!("{} worker(s)\n", snap.workers.len());
    for view in &snap.workers {
        let w = &view.worker;
        let link = if view.linked { "up" } else { "down" };
        let enabled = if w.enabled { "" } else { " [disabled]" };
        let _ = writeln!(
            out,
            "  {} {} {} {} link={} rooms={}/{} players={} pending={}{}",
            w.id, w.name, w.address, w.availability, link, w.rooms, w.max_rooms, w.players, w.pending, enabled
        );
    }
    out
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

// Stdin reads cannot be cancelled, so each console runs on its own thread
// and never holds up runtime shutdown.

/// Starts the worker console. It ends at EOF or once the worker stops.
///
/// `config` is the rendered text `config show` prints.
pub fn spawn_worker_console(
    commands: mpsc::Sender<WorkerCommand>,
    config: String,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let command = match line.parse::<WorkerConsoleCommand>() {
                Ok(command) => command,
                Err(e) => {
                    println!("{e}");
                    continue;
                }
            };
            if !run_worker_command(command, &commands, &config) {
                break;
            }
        }
        tracing::debug!("worker console closed");
    })
}

/// Returns `false` once the worker no longer takes commands.
fn run_worker_command(
    command: WorkerConsoleCommand,
    commands: &mpsc::Sender<WorkerCommand>,
    config: &str,
) -> bool {
    match command {
        WorkerConsoleCommand::Help => {
            println!("{WORKER_HELP}");
            true
        }
        WorkerConsoleCommand::Config => {
            println!("{config}");
            true
        }
        WorkerConsoleCommand::Clients | WorkerConsoleCommand::Rooms => {
            let (tx, rx) = oneshot::channel();
            if commands.blocking_send(WorkerCommand::Snapshot(tx)).is_err() {
                return false;
            }
            let Ok(snap) = rx.blocking_recv() else {
                return false;
            };
            if command == WorkerConsoleCommand::Clients {
                print!("{}", render_worker_clients(&snap));
            } else {
                print!("{}", render_worker_rooms(&snap));
            }
            true
        }
        WorkerConsoleCommand::Tick(ms) => {
            let sent = commands.blocking_send(WorkerCommand::SetTickInterval(ms)).is_ok();
            if sent {
                println!("tick interval set to {ms}ms");
            }
            sent
        }
        WorkerConsoleCommand::Drain => {
            let sent = commands.blocking_send(WorkerCommand::Drain).is_ok();
            if sent {
                println!("draining");
            }
            sent
        }
    }
}

/// Starts the hub console. It ends at EOF or once the hub stops.
///
/// `config` is the rendered text `config show` prints.
pub fn spawn_hub_console(
    commands: mpsc::Sender<HubCommand>,
    config: String,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.parse::<HubConsoleCommand>() {
                Ok(HubConsoleCommand::Help) => println!("{HUB_HELP}"),
                Ok(HubConsoleCommand::Config) => println!("{config}"),
                Ok(command) => {
                    let (tx, rx) = oneshot::channel();
                    if commands.blocking_send(HubCommand::Snapshot(tx)).is_err() {
                        break;
                    }
                    let Ok(snap) = rx.blocking_recv() else {
                        break;
                    };
                    if command == HubConsoleCommand::Clients {
                        print!("{}", render_hub_clients(&snap));
                    } else {
                        print!("{}", render_hub_workers(&snap));
                    }
                }
                Err(e) => println!("{e}"),
            }
        }
        tracing::debug!("hub console closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomrelay_protocol::{RoomId, RoomLoad, RoomStatus};
    use roomrelay_transport::ClientId;
    use roomrelay_worker::{ClientInfo, WorkerState};

    // =====================================================================
    // Parsing
    // =====================================================================

    #[test]
    fn test_parse_worker_commands() {
        assert_eq!("clients".parse(), Ok(WorkerConsoleCommand::Clients));
        assert_eq!(" rooms ".parse(), Ok(WorkerConsoleCommand::Rooms));
        assert_eq!("tick 20".parse(), Ok(WorkerConsoleCommand::Tick(20)));
        assert_eq!("drain".parse(), Ok(WorkerConsoleCommand::Drain));
        assert_eq!("help".parse(), Ok(WorkerConsoleCommand::Help));
        assert_eq!("config show".parse(), Ok(WorkerConsoleCommand::Config));
    }

    #[test]
    fn test_config_needs_show() {
        let usage = Err(ConsoleError::Usage("config show"));
        assert_eq!("config".parse::<WorkerConsoleCommand>(), usage);
        assert_eq!("config edit".parse::<WorkerConsoleCommand>(), usage);
        assert_eq!("config show all".parse::<HubConsoleCommand>(), Err(ConsoleError::Usage("config show")));
        assert_eq!("config  show".parse(), Ok(HubConsoleCommand::Config));
    }

    #[test]
    fn test_tick_needs_a_positive_number() {
        let usage = Err(ConsoleError::Usage("tick <ms>"));
        assert_eq!("tick".parse::<WorkerConsoleCommand>(), usage);
        assert_eq!("tick fast".parse::<WorkerConsoleCommand>(), usage);
        assert_eq!("tick 0".parse::<WorkerConsoleCommand>(), usage);
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            "reboot".parse::<WorkerConsoleCommand>(),
            Err(ConsoleError::Unknown("reboot".into()))
        );
        assert_eq!(
            "rooms".parse::<HubConsoleCommand>(),
            Err(ConsoleError::Unknown("rooms".into()))
        );
        assert_eq!("workers".parse(), Ok(HubConsoleCommand::Workers));
    }

    // =====================================================================
    // Rendering
    // =====================================================================

    fn snapshot() -> WorkerSnapshot {
        WorkerSnapshot {
            worker_id: 2,
            state: WorkerState::Running,
            tick: 40,
            tick_interval_ms: 50,
            rooms: vec![RoomLoad {
                room_id: RoomId(1),
                players: 3,
                capacity: 4,
                status: RoomStatus::Open,
            }],
            clients: vec![ClientInfo {
                id: ClientId::new(5),
                addr: "127.0.0.1:5000".parse().unwrap(),
                room: Some(RoomId(1)),
                rtt: Some(Duration::from_millis(12)),
                is_hub: false,
            }],
            reservations: 1,
        }
    }

    #[test]
    fn test_render_worker_rooms() {
        let text = render_worker_rooms(&snapshot());
        assert!(text.starts_with("worker 2 running tick=40 interval=50ms reservations=1"));
        assert!(text.contains("3/4 Open"));
    }

    #[test]
    fn test_render_worker_clients() {
        let text = render_worker_clients(&snapshot());
        assert!(text.starts_with("1 client(s)"));
        assert!(text.contains("client-5 127.0.0.1:5000"));
        assert!(text.contains("rtt=12ms"));
    }
}
