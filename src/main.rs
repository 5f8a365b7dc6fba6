//! lamco-desktop-agent - Interactive session control for Windows
//!
//! Entry point for the agent binary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use lamco_desktop_agent::capture::CaptureBackendKind;
use lamco_desktop_agent::config::{Config, ConfigSource};

/// Command-line arguments for lamco-desktop-agent
#[derive(Parser, Debug)]
#[command(name = "lamco-desktop-agent")]
#[command(version, about = "Interactive session control for Windows remote administration", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, env = "LAMCO_AGENT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Capture backend override (gdi|dxgi|auto)
    #[arg(long, env = "LAMCO_AGENT_BACKEND")]
    pub backend: Option<CaptureBackendKind>,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Write logs to file (in addition to stdout)
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Console log layout; the log file never carries ANSI colours
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, human oriented
    Pretty,
    /// One line per event
    Compact,
    /// Newline-delimited JSON, also used for the log file
    Json,
}

/// Agent subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List capturable screens
    Displays {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List Terminal Services sessions
    Sessions {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show (and optionally switch to) the input desktop
    Desktop {
        /// Attach this process to the input desktop first
        #[arg(long)]
        switch: bool,
    },

    /// Capture one frame to a JPEG file
    Capture {
        /// Output file (default: capture-<timestamp>.jpg)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Screen name (see `displays`)
        #[arg(long)]
        screen: Option<String>,

        /// JPEG quality 1-100
        #[arg(long)]
        quality: Option<u8>,

        /// Write a thumbnail instead of a full frame
        #[arg(long)]
        thumbnail: bool,
    },

    /// Capture frames continuously until Ctrl-C
    Watch {
        /// Directory for numbered frames
        #[arg(short, long, default_value = "frames")]
        output_dir: PathBuf,

        /// Screen name (see `displays`)
        #[arg(long)]
        screen: Option<String>,

        /// Delay between frames in milliseconds
        #[arg(long, default_value = "200")]
        interval_ms: u64,

        /// Stop after this many frames
        #[arg(long)]
        frames: Option<u64>,

        /// JPEG quality 1-100
        #[arg(long)]
        quality: Option<u8>,
    },

    /// Inject one input event into the input desktop
    Input {
        /// Screen the coordinates refer to
        #[arg(long)]
        screen: Option<String>,

        /// Event to inject
        #[command(subcommand)]
        action: InputAction,
    },

    /// Launch a process in an interactive session
    Launch {
        /// Executable path
        executable: PathBuf,

        /// Arguments passed to the executable
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        /// Target session id (default: console session)
        #[arg(long)]
        session: Option<u32>,

        /// Desktop inside winsta0 (default from config)
        #[arg(long)]
        desktop: Option<String>,

        /// Give the process a console window
        #[arg(long)]
        show_window: bool,

        /// Do not redirect stdin/stdout/stderr
        #[arg(long)]
        no_redirect: bool,

        /// Wait this long for the process to exit and print its output
        #[arg(long, default_value = "5000")]
        wait_ms: u64,
    },

    /// Print the effective configuration
    Config,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Displays { .. } => "displays",
            Command::Sessions { .. } => "sessions",
            Command::Desktop { .. } => "desktop",
            Command::Capture { .. } => "capture",
            Command::Watch { .. } => "watch",
            Command::Input { .. } => "input",
            Command::Launch { .. } => "launch",
            Command::Config => "config",
        }
    }

    /// JPEG quality given on the command line, overriding `[capture] quality`
    fn quality(&self) -> Option<u8> {
        match self {
            Command::Capture { quality, .. } | Command::Watch { quality, .. } => *quality,
            _ => None,
        }
    }
}

/// Input event for the `input` subcommand
#[derive(Subcommand, Debug, Clone, Copy)]
pub enum InputAction {
    /// Move the pointer (fractions of the screen, 0-1)
    Move {
        /// Horizontal fraction
        x: f64,
        /// Vertical fraction
        y: f64,
    },
    /// Click a button (0 left, 1 middle, 2 right) at a position
    Click {
        /// Horizontal fraction
        x: f64,
        /// Vertical fraction
        y: f64,
        /// Button code
        #[arg(default_value = "0")]
        button: u8,
    },
    /// Scroll one notch (positive scrolls down)
    Wheel {
        /// Scroll direction
        #[arg(allow_hyphen_values = true)]
        delta: f64,
    },
    /// Press and release a virtual key
    Key {
        /// Virtual-key code, e.g. 13 for Enter
        virtual_key: u16,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let (config, source) = match Config::load_with_source(&config_path) {
        Ok((config, source)) => (config.with_overrides(args.backend, args.command.quality()), source),
        Err(e) => {
            eprintln!("{}", lamco_desktop_agent::utils::format_user_error(&e));
            return Err(e);
        }
    };

    // Logging settings come from the config, so the subscriber starts after loading it.
    init_logging(&args, &config)?;

    info!("════════════════════════════════════════════════════════");
    info!("  lamco-desktop-agent v{}", env!("CARGO_PKG_VERSION"));
    info!("  Built: {}", env!("BUILD_DATE"));
    info!("  Commit: {}", env!("GIT_HASH"));
    info!("  Profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });
    info!("════════════════════════════════════════════════════════");

    match source {
        ConfigSource::File => info!("Configuration loaded from {}", config_path.display()),
        ConfigSource::Defaults => warn!("Config file {} not found, using defaults", config_path.display()),
    }
    tracing::debug!("Config: {:?}", config);

    if let Err(e) = run(args.command, config).await {
        eprintln!("{}", lamco_desktop_agent::utils::format_user_error(&e));
        return Err(e);
    }

    Ok(())
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("lamco-desktop-agent").join("agent.toml"))
        .unwrap_or_else(|| PathBuf::from("agent.toml"))
}

#[cfg_attr(not(windows), allow(dead_code))]
fn default_capture_path() -> PathBuf {
    PathBuf::from(format!("capture-{}.jpg", chrono::Local::now().format("%Y%m%d-%H%M%S")))
}

#[cfg_attr(not(windows), allow(dead_code))]
fn write_frame(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
}

/// Read `reader` to the end on its own thread
#[cfg_attr(not(windows), allow(dead_code))]
fn spawn_drain<R>(label: &str, mut reader: R) -> Result<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>
where
    R: std::io::Read + Send + 'static,
{
    std::thread::Builder::new()
        .name(format!("drain-{label}"))
        .spawn(move || {
            let mut buffer = Vec::new();
            reader.read_to_end(&mut buffer).map(|_| buffer)
        })
        .with_context(|| format!("Failed to start {label} reader"))
}

async fn run(command: Command, config: Config) -> Result<()> {
    match command {
        Command::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        command => platform::run(command, config).await,
    }
}

fn init_logging(args: &Args, config: &Config) -> Result<()> {
    let level = match args.verbose {
        0 => config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };

    // RUST_LOG wins; otherwise only this crate logs below warn
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("lamco_desktop_agent={level},warn")));

    let mut layers = vec![console_layer(args.log_format)];
    let log_file = args.log_file.as_ref().or(config.logging.log_file.as_ref());
    if let Some(path) = log_file {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        layers.push(file_layer(args.log_format, std::sync::Mutex::new(file)));
    }

    tracing_subscriber::registry().with(layers).with(env_filter).init();

    if let Some(path) = log_file {
        info!("Logging to file: {}", path.display());
    }
    Ok(())
}

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

fn console_layer(format: LogFormat) -> BoxedLayer {
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);
    match format {
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

/// Plain single-line events unless JSON was requested
fn file_layer<W>(format: LogFormat, writer: W) -> BoxedLayer
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
    match format {
        LogFormat::Json => layer.json().boxed(),
        LogFormat::Pretty | LogFormat::Compact => layer.boxed(),
    }
}

#[cfg(not(windows))]
mod platform {
    use super::{Command, Config, Result};

    pub(crate) async fn run(command: Command, _config: Config) -> Result<()> {
        anyhow::bail!("Command '{}' unsupported: requires Windows", command.name())
    }
}

#[cfg(windows)]
mod platform {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use anyhow::{anyhow, Context};
    use tracing::{info, warn};

    use lamco_desktop_agent::capture::{CaptureService, ConnectionId, SystemBackend};
    use lamco_desktop_agent::desktop::system_switcher;
    use lamco_desktop_agent::input::{system_sink, InputInjector};
    use lamco_desktop_agent::launcher::{system_launcher, LaunchRequest};
    use lamco_desktop_agent::session::system_resolver;
    use lamco_desktop_agent::utils::{log_startup_diagnostics, RuntimeStats};
    use lamco_desktop_agent::DesktopAgent;

    use super::{default_capture_path, spawn_drain, write_frame, Command, Config, InputAction, Result};

    fn capture_service(config: &Config) -> Result<CaptureService<SystemBackend>> {
        let backend = SystemBackend::select(config.capture.backend, config.acquire_timeout(), config.settle_delay());
        let service = CaptureService::new(backend, system_switcher())
            .with_defaults(config.capture.quality, config.capture.draw_cursor);
        service.initialize().context("Failed to initialize capture backend")?;
        info!("Capture backend: {}", service.backend_kind());
        Ok(service)
    }

    fn open_viewer(service: &CaptureService<SystemBackend>, screen: Option<&str>) -> ConnectionId {
        let connection = ConnectionId::generate();
        service.open_connection(&connection);
        if let Some(screen) = screen {
            if let Some(selected) = service.set_selected_screen(&connection, screen) {
                if selected != screen {
                    warn!("Screen {:?} not found, using {:?}", screen, selected);
                }
            }
        }
        connection
    }

    pub(crate) async fn run(command: Command, config: Config) -> Result<()> {
        let switcher = system_switcher();
        log_startup_diagnostics(switcher.as_ref());

        match command {
            Command::Displays { json } => {
                let service = capture_service(&config)?;
                let displays = service.list_displays();
                if json {
                    let rows: Vec<_> = displays
                        .iter()
                        .map(|d| {
                            serde_json::json!({
                                "name": d.name,
                                "primary": d.is_primary,
                                "x": d.bounds.x,
                                "y": d.bounds.y,
                                "width": d.bounds.width,
                                "height": d.bounds.height,
                                "rotation": d.rotation.degrees(),
                            })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                } else {
                    for d in &displays {
                        println!(
                            "{:<24} {:>5},{:<5} {:>5}x{:<5} {:>3}°{}",
                            d.name,
                            d.bounds.x,
                            d.bounds.y,
                            d.bounds.width,
                            d.bounds.height,
                            d.rotation.degrees(),
                            if d.is_primary { "  primary" } else { "" }
                        );
                    }
                }
                Ok(())
            }

            Command::Sessions { json } => {
                let resolver = system_resolver();
                let sessions = resolver.list_sessions()?;
                let console = resolver.active_console_session_id().ok();
                if json {
                    println!("{}", serde_json::to_string_pretty(&sessions)?);
                } else {
                    for s in &sessions {
                        println!(
                            "{:>4}  {:<14} {:<20}{}",
                            s.session_id,
                            s.state.to_string(),
                            s.station_name,
                            if Some(s.session_id) == console { "  console" } else { "" }
                        );
                    }
                }
                Ok(())
            }

            Command::Desktop { switch } => {
                if switch {
                    let switched = switcher.switch_to_input_desktop();
                    println!("switched: {switched}");
                }
                match switcher.current_desktop_name() {
                    Some(name) => println!("{name}"),
                    None => println!("<unavailable>"),
                }
                Ok(())
            }

            // --quality is already folded into config.capture.quality
            Command::Capture {
                output,
                screen,
                thumbnail,
                ..
            } => {
                let service = capture_service(&config)?;
                let connection = open_viewer(&service, screen.as_deref());

                let bytes = if thumbnail {
                    service.thumbnail(
                        &connection,
                        config.capture.thumbnail_width,
                        config.capture.thumbnail_height,
                    )
                } else {
                    service.next_frame(&connection)
                }
                .ok_or_else(|| anyhow!("No frame captured (desktop switching or capture failed)"))?;

                let path = output.unwrap_or_else(default_capture_path);
                write_frame(&path, &bytes)?;
                println!("{} ({} bytes)", path.display(), bytes.len());
                Ok(())
            }

            Command::Watch {
                output_dir,
                screen,
                interval_ms,
                frames,
                ..
            } => {
                let service = Arc::new(capture_service(&config)?);
                let connection = open_viewer(&service, screen.as_deref());
                watch(service, connection, &output_dir, Duration::from_millis(interval_ms.max(1)), frames).await
            }

            Command::Input { screen, action } => {
                let service = capture_service(&config)?;
                let injector = InputInjector::new(config.input.workers, Arc::clone(&switcher), system_sink())?;
                injector.set_input_enabled(config.input.enabled);
                let agent = DesktopAgent::new(service, injector, system_launcher(), switcher);

                let connection = ConnectionId::generate();
                agent.connect(&connection);
                if let Some(screen) = screen {
                    agent.set_selected_screen(&connection, &screen);
                }

                let queued = match action {
                    InputAction::Move { x, y } => u64::from(agent.enqueue_mouse_move(&connection, x, y)),
                    InputAction::Click { x, y, button } => {
                        u64::from(agent.enqueue_mouse_button(&connection, x, y, button, true))
                            + u64::from(agent.enqueue_mouse_button(&connection, x, y, button, false))
                    }
                    InputAction::Wheel { delta } => u64::from(agent.enqueue_mouse_wheel(delta)),
                    InputAction::Key { virtual_key } => {
                        u64::from(agent.enqueue_key(virtual_key, true)) + u64::from(agent.enqueue_key(virtual_key, false))
                    }
                };

                let deadline = Instant::now() + Duration::from_secs(2);
                let stats = agent.input().stats();
                while stats.executed() + stats.failed() < queued && Instant::now() < deadline {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }

                let mut runtime = RuntimeStats::new();
                runtime.update(agent.capture().stats(), Some(stats));
                runtime.log_status();
                println!(
                    "queued {}, executed {}, failed {}, dropped {}",
                    queued,
                    stats.executed(),
                    stats.failed(),
                    stats.dropped()
                );
                if stats.failed() > 0 {
                    anyhow::bail!("{} input operation(s) failed", stats.failed());
                }
                Ok(())
            }

            Command::Launch {
                executable,
                args,
                session,
                desktop,
                show_window,
                no_redirect,
                wait_ms,
            } => {
                let request = LaunchRequest::new(executable)
                    .args(args)
                    .session(session)
                    .desktop(desktop.unwrap_or_else(|| config.launcher.desktop.clone()))
                    .hidden_window(config.launcher.hidden_window && !show_window)
                    .redirect_streams(config.launcher.redirect_streams && !no_redirect);

                let launcher = system_launcher();
                let mut handles = launcher
                    .launch(&request)
                    .map_err(|e| anyhow!(e).context(format!("Failed to launch {}", request.command_line())))?;
                println!("pid {}", handles.process_id());

                drop(handles.take_stdin());
                // Drain while waiting; a child blocked on a full pipe never exits.
                let stdout = handles.take_stdout().map(|pipe| spawn_drain("stdout", pipe)).transpose()?;
                let stderr = handles.take_stderr().map(|pipe| spawn_drain("stderr", pipe)).transpose()?;

                let exit = tokio::task::block_in_place(|| handles.wait(Duration::from_millis(wait_ms)))?;
                let Some(code) = exit else {
                    // reader threads end with the process
                    println!("still running after {wait_ms} ms");
                    return Ok(());
                };
                println!("exit code {code}");

                for (label, reader) in [("stdout", stdout), ("stderr", stderr)] {
                    let Some(reader) = reader else { continue };
                    let bytes = reader
                        .join()
                        .map_err(|_| anyhow!("{label} reader panicked"))?
                        .with_context(|| format!("Failed to read child {label}"))?;
                    let text = String::from_utf8_lossy(&bytes);
                    if !text.trim().is_empty() {
                        println!("--- {label} ---\n{}", text.trim_end());
                    }
                }
                Ok(())
            }

            Command::Config => anyhow::bail!("'{}' is handled before platform dispatch", Command::Config.name()),
        }
    }

    async fn watch(
        service: Arc<CaptureService<SystemBackend>>,
        connection: ConnectionId,
        output_dir: &Path,
        interval: Duration,
        limit: Option<u64>,
    ) -> Result<()> {
        std::fs::create_dir_all(output_dir).with_context(|| format!("Failed to create {}", output_dir.display()))?;
        info!(
            "Watching {} into {} (started {})",
            service.selected_screen(&connection).unwrap_or_default(),
            output_dir.display(),
            chrono::Local::now().to_rfc3339()
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut written = 0u64;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
                _ = ticker.tick() => {
                    let svc = Arc::clone(&service);
                    let conn = connection.clone();
                    let frame = tokio::task::spawn_blocking(move || svc.next_frame(&conn)).await?;
                    if let Some(bytes) = frame {
                        written += 1;
                        write_frame(&output_dir.join(format!("frame-{written:05}.jpg")), &bytes)?;
                    }
                    if limit.is_some_and(|limit| written >= limit) {
                        break;
                    }
                }
            }
        }

        let mut runtime = RuntimeStats::new();
        runtime.update(service.stats(), None);
        runtime.log_status();
        println!("{written} frames written to {}", output_dir.display());
        Ok(())
    }
}
