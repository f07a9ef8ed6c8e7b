//! Command-line front-end for the gdbmi adapter.
//!
//! Launches a compiled simulation executable (or attaches to a running
//! one) under the debugger and prints the event stream the IDE layer
//! would normally consume.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use gdbmi::{Breakpoint, DebuggerConfig, DebuggerEvent, GdbAdapter, LaunchRequest};

#[derive(Parser, Debug)]
#[command(name = "algodbg", version, about = "GDB/MI debugger session driver", long_about = None)]
struct Cli {
    /// Path to the debugger binary.
    #[arg(long, default_value = "gdb")]
    gdb: PathBuf,

    /// Per-command timeout in seconds.
    #[arg(long, default_value_t = 40)]
    timeout: u64,

    /// Session traffic log file (JSON lines).
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a program under the debugger.
    Run {
        program: PathBuf,
        /// Breakpoints as file:line, may be repeated.
        #[arg(short, long = "break")]
        breakpoints: Vec<String>,
        #[arg(long)]
        working_dir: Option<PathBuf>,
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Attach to an existing process ID.
    Attach { pid: u32 },
}

fn parse_breakpoint(spec: &str) -> Option<Breakpoint> {
    let (file, line) = spec.rsplit_once(':')?;
    Some(Breakpoint::new(file, line.parse().ok()?))
}

#[tokio::main]
async fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .with_module_level("gdbmi", log::LevelFilter::Debug)
        .init()
        .unwrap();

    let cli = Cli::parse();
    let config = DebuggerConfig {
        gdb_path: cli.gdb.clone(),
        command_timeout: Duration::from_secs(cli.timeout),
        log_path: cli.log_file.clone(),
        ..DebuggerConfig::default()
    };

    let mut adapter = match GdbAdapter::new(config) {
        Ok(adapter) => adapter,
        Err(err) => {
            log::error!("failed to set up adapter: {err}");
            std::process::exit(1);
        }
    };
    let mut events = adapter.take_event_receiver().expect("fresh adapter");

    let session = match cli.cmd {
        Command::Run {
            program,
            breakpoints,
            working_dir,
            args,
        } => {
            let request = LaunchRequest {
                program,
                working_dir,
                arguments: args,
            };
            match adapter.launch(request).await {
                Ok(()) => {
                    for spec in &breakpoints {
                        match parse_breakpoint(spec) {
                            Some(bp) => {
                                if let Err(err) = adapter.insert_breakpoint(&bp, None).await {
                                    log::error!("failed to post breakpoint {spec}: {err}");
                                }
                            }
                            None => log::error!("ignoring malformed breakpoint spec: {spec}"),
                        }
                    }
                    adapter.exec_run().await.map(|_| ())
                }
                Err(err) => Err(err),
            }
        }
        Command::Attach { pid } => adapter.attach(pid).await,
    };
    if let Err(err) = session {
        log::error!("failed to start session: {err}");
        std::process::exit(1);
    }

    while let Some(event) = events.recv().await {
        match &event {
            DebuggerEvent::InferiorSuspended(stop) => {
                let location = stop
                    .frame
                    .as_ref()
                    .map(|frame| {
                        format!(
                            "{}:{}",
                            frame.source_path().unwrap_or("<unknown>"),
                            frame.line.unwrap_or(0)
                        )
                    })
                    .unwrap_or_else(|| "<no frame>".to_string());
                log::info!("suspended at {location}");
                // No interactive stepping here; resume until the program
                // finishes.
                if let Err(err) = adapter.exec_continue().await {
                    log::error!("failed to continue: {err}");
                    break;
                }
            }
            DebuggerEvent::StackFramesUpdated(frames) => {
                for frame in frames {
                    log::info!(
                        "  #{} {} ({})",
                        frame.level.unwrap_or(0),
                        frame.display_function().unwrap_or_default(),
                        frame.source_path().unwrap_or("?"),
                    );
                }
            }
            DebuggerEvent::TargetOutput(text) | DebuggerEvent::ConsoleOutput(text) => {
                print!("{text}");
            }
            DebuggerEvent::CommandDiagnostic {
                command, message, ..
            } => {
                log::warn!("command `{command}` failed: {message}");
            }
            DebuggerEvent::InferiorTerminated { exit_code } => {
                log::info!("inferior terminated (exit code {exit_code:?})");
            }
            DebuggerEvent::GdbFinished => break,
            _ => {}
        }
    }

    let _ = adapter.quit().await;
}
