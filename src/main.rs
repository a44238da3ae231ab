// unimidi-seq - command line player
// Plays a MIDI file and/or a saved grid project to a MIDI output port,
// passing a MIDI input through while it runs.

use clap::{Args, Parser, Subcommand};
use ringbuf::traits::{Consumer, Producer};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;
use unimidi_seq::midi::device::{self, PortSelector};
use unimidi_seq::midi::input::MidiInputSource;
use unimidi_seq::output::{MidirTransport, Transport, WireConsumer, create_output_channel};
use unimidi_seq::{
    Command, EngineConfig, NotificationLevel, PollOutcome, ProjectManager, Session,
    create_command_channel,
};

const COMMAND_CAPACITY: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "unimidi-seq", version, about = "MIDI file player and step sequencer")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// List MIDI input and output ports
    Ports,
    /// Play a MIDI file and/or a grid project
    Play(PlayArgs),
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// Standard MIDI file to play
    file: Option<PathBuf>,

    /// Grid project (.ron or .json)
    #[arg(short, long)]
    project: Option<PathBuf>,

    /// Engine config (.ron)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output port, by index or name
    #[arg(short, long)]
    out: Option<String>,

    /// Live input port, by index or name
    #[arg(short = 'i', long = "in")]
    input: Option<String>,

    /// Do not open a live input port
    #[arg(long)]
    no_input: bool,

    /// Playback speed factor
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Transpose in semitones
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    transpose: i8,

    /// Master volume, 0-127
    #[arg(long)]
    volume: Option<u8>,

    /// Stop before this bar (1-based)
    #[arg(long)]
    end_bar: Option<usize>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        CliCommand::Ports => {
            print_ports();
            Ok(())
        }
        CliCommand::Play(args) => play(args),
    };

    if let Err(e) = result {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn print_ports() {
    println!("Inputs:");
    for port in device::list_input_ports() {
        println!("  {}: {}", port.index, port.name);
    }
    println!("Outputs:");
    for port in device::list_output_ports() {
        println!("  {}: {}", port.index, port.name);
    }
}

fn play(args: PlayArgs) -> Result<(), String> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path).map_err(|e| e.to_string())?,
        None => EngineConfig::default(),
    };

    let out_selector = args.out.as_deref().map(PortSelector::parse);
    let (midi_out, out_port) = device::find_output_port(out_selector.as_ref())
        .ok_or_else(|| "No matching MIDI output port".to_string())?;
    let port_transport = MidirTransport::connect(midi_out, &out_port)?;

    let running = Arc::new(AtomicBool::new(true));
    let (wire_tx, wire_rx) = create_output_channel(config.output_queue_capacity);
    let writer = spawn_writer(wire_rx, port_transport, Arc::clone(&running));

    let (mut session, mut handles) = Session::new(&config, wire_tx);

    if let Some(path) = &args.project {
        let project = ProjectManager::new().load(path).map_err(|e| e.to_string())?;
        session.load_project(project);
    }
    if let Some(path) = &args.file {
        let bytes = std::fs::read(path).map_err(|e| format!("{}: {}", path.display(), e))?;
        session.load_smf(&bytes).map_err(|e| e.to_string())?;
    }

    // Kept alive for the whole run; dropping it closes the port
    let _input = if args.no_input {
        None
    } else {
        let selector = args.input.as_deref().map(PortSelector::parse);
        match device::find_input_port(selector.as_ref()) {
            Some((midi_in, port)) => {
                Some(MidiInputSource::connect(midi_in, &port, handles.live_input)?)
            }
            None => {
                tracing::warn!("No MIDI input port, live pass-through disabled");
                None
            }
        }
    };

    session
        .handle(Command::SetSpeed(args.speed))
        .map_err(|e| e.to_string())?;
    session
        .handle(Command::SetTranspose(args.transpose))
        .map_err(|e| e.to_string())?;
    if let Some(volume) = args.volume {
        session
            .handle(Command::SetMasterVolume(volume))
            .map_err(|e| e.to_string())?;
    }
    if let Some(bar) = args.end_bar {
        session
            .handle(Command::SetEndBar(Some(bar.saturating_sub(1))))
            .map_err(|e| e.to_string())?;
    }

    let (command_tx, mut command_rx) = create_command_channel(COMMAND_CAPACITY);
    spawn_console(command_tx, Arc::clone(&running));

    session.handle(Command::Play).map_err(|e| e.to_string())?;

    let started = Instant::now();
    let interval = Duration::from_millis(config.poll_interval_ms);
    while running.load(Ordering::Relaxed) {
        session.drain_commands(&mut command_rx);
        let now = started.elapsed().as_micros() as u64;
        let outcome = session.poll(now);

        while let Some(notification) = handles.notifications.try_pop() {
            match notification.level {
                NotificationLevel::Error => tracing::error!("{}", notification),
                NotificationLevel::Warning => tracing::warn!("{}", notification),
                NotificationLevel::Info => tracing::info!("{}", notification),
            }
        }

        if outcome == PollOutcome::Finished {
            break;
        }
        thread::sleep(interval);
    }

    let _ = session.handle(Command::Stop);
    let stats = session.stats();
    tracing::info!(
        "Sent {} messages, dropped {}, suppressed {}",
        stats.sent,
        stats.dropped,
        stats.suppressed
    );

    // Let the writer flush the final note-offs
    thread::sleep(Duration::from_millis(50));
    running.store(false, Ordering::Relaxed);
    let _ = writer.join();
    Ok(())
}

/// Drain the output queue into the port on a dedicated thread
fn spawn_writer(
    mut queue: WireConsumer,
    mut port: MidirTransport,
    running: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut failures = 0u64;
        loop {
            let mut idle = true;
            while let Some(message) = queue.try_pop() {
                idle = false;
                if port.try_send(message).is_err() {
                    failures += 1;
                    if failures == 1 {
                        tracing::error!("Writes to {} are failing", port.port_name());
                    }
                }
            }
            if idle {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
        }
    })
}

/// Read control commands from stdin
fn spawn_console(mut commands: unimidi_seq::messaging::CommandProducer, running: Arc<AtomicBool>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match parse_console_line(&line) {
                Ok(Some(command)) => {
                    if commands.try_push(command).is_err() {
                        tracing::warn!("Command queue full, '{}' ignored", line.trim());
                    }
                }
                Ok(None) => {
                    running.store(false, Ordering::Relaxed);
                    break;
                }
                Err(e) => eprintln!("{}", e),
            }
        }
    });
}

/// `Ok(None)` means quit
fn parse_console_line(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let word = words.next().unwrap_or_default();
    let arg = words.next();
    let number = |name: &str| -> Result<f64, String> {
        arg.and_then(|a| a.parse::<f64>().ok())
            .ok_or_else(|| format!("usage: {} <number>", name))
    };

    let command = match word {
        "play" | "p" => Command::Play,
        "pause" => Command::Pause,
        "stop" | "s" => Command::Stop,
        // Bars are 1-based on the console
        "seek" => Command::Seek((number("seek")? as usize).saturating_sub(1)),
        "tempo" => Command::SetTempo(number("tempo")?),
        "speed" => Command::SetSpeed(number("speed")?),
        "transpose" => Command::SetTranspose(number("transpose")? as i8),
        "volume" => Command::SetMasterVolume(number("volume")?.clamp(0.0, 127.0) as u8),
        "end" => match arg {
            Some("off") | None => Command::SetEndBar(None),
            Some(_) => Command::SetEndBar(Some((number("end")? as usize).saturating_sub(1))),
        },
        "panic" => Command::AllNotesOff,
        "quit" | "q" => return Ok(None),
        other => return Err(format!("unknown command '{}'", other)),
    };
    Ok(Some(command))
}
