use std::{
    io::BufRead,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use pose_streamer_core::{
    osc, rig, ChannelConfig, FrameStreamer, LogSender, MemorySender, Mode, MotionLibrary,
    OscSender, StreamSettings, StreamStats, StreamerError, StreamerHandle, StreamerOptions,
    UdpOscSender,
};
use tracing_subscriber::EnvFilter;

fn main() -> pose_streamer_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Stream(args) => run_stream(args),
        Commands::Check { channels, library } => run_check(&channels, library.as_deref()),
        Commands::Scaffold { output } => run_scaffold(&output),
        Commands::Listen { bind } => run_listen(&bind),
    }
}

fn run_stream(args: StreamArgs) -> pose_streamer_core::Result<()> {
    let settings = args.settings()?;
    settings.validate()?;
    tracing::info!(
        receiver = %settings.target(),
        fps = settings.fps,
        dry_run = args.dry_run,
        mock = settings.mock,
        "starting stream"
    );

    let channels = match &settings.channels_path {
        Some(path) => ChannelConfig::from_path(path)?,
        None => {
            tracing::info!("no channel table given, using the default rig layout");
            rig::default_channels()?
        }
    };
    let library = match &settings.library_path {
        Some(path) => MotionLibrary::from_path(path)?,
        None => MotionLibrary::empty(channels.sources()),
    };
    let sender: Box<dyn OscSender> = if args.dry_run {
        Box::new(LogSender)
    } else {
        Box::new(UdpOscSender::connect(&settings.target())?)
    };

    let streamer = FrameStreamer::new(channels, library, sender, StreamerOptions::from(&settings));
    let handle = StreamerHandle::spawn(streamer, settings.frame_interval())?;

    let stats = match args.seconds {
        Some(seconds) => {
            std::thread::sleep(Duration::try_from_secs_f32(seconds.max(0.0)).unwrap_or_default());
            handle.stop()?
        }
        None => {
            println!("modes: baseline, left, right, sit; `stop` or EOF ends the session");
            drive_session(&handle, std::io::stdin().lock())?
        }
    };
    tracing::info!(frames = stats.frames, sent = stats.sent, failed = stats.failed, "stream finished");
    Ok(())
}

/// Reads commands until they end, then stops the streamer whatever the
/// outcome so the rig always receives the zero frame.
fn drive_session(
    handle: &StreamerHandle,
    input: impl BufRead,
) -> pose_streamer_core::Result<StreamStats> {
    let outcome = read_commands(handle, input);
    let stats = handle.stop()?;
    outcome.map(|()| stats)
}

/// Feeds mode names, one per line, to the streamer until `stop` or EOF.
fn read_commands(handle: &StreamerHandle, input: impl BufRead) -> pose_streamer_core::Result<()> {
    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Mode>() {
            Ok(Mode::Stopped) => break,
            Ok(mode) => handle.request_mode(mode)?,
            Err(err @ StreamerError::UnknownMode(_)) => tracing::warn!(%err, "ignoring command"),
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

fn run_check(channels: &Path, library: Option<&Path>) -> pose_streamer_core::Result<()> {
    let channels = ChannelConfig::from_path(channels)?;
    let library = match library {
        Some(path) => MotionLibrary::from_path(path)?,
        None => MotionLibrary::empty(channels.sources()),
    };

    let recorder = MemorySender::new();
    let mut streamer = FrameStreamer::new(
        channels,
        library,
        recorder.clone(),
        StreamerOptions::default(),
    );
    streamer.start(Duration::ZERO)?;
    let report = streamer.tick(Duration::ZERO)?;

    for message in recorder.messages() {
        println!("{message}");
    }
    println!("{} messages per frame", report.sent);
    Ok(())
}

fn run_scaffold(output: &PathBuf) -> pose_streamer_core::Result<()> {
    let channels = rig::default_channels()?;
    std::fs::write(output, channels.to_json()?)?;
    tracing::info!(?output, channels = channels.len(), "wrote default channel table");
    Ok(())
}

fn run_listen(bind: &str) -> pose_streamer_core::Result<()> {
    let mut received = 0u64;
    osc::listen(bind, |peer, message| {
        received += 1;
        println!("{peer} {message}");
        if received % 10 == 0 {
            tracing::info!(received, "messages received");
        }
        true
    })
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Streams rig poses to a game engine over OSC", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream frames at a fixed rate; mode names are read from stdin.
    Stream(StreamArgs),
    /// Validate a channel table and print one resolved frame.
    Check {
        /// Channel table JSON.
        #[arg(short, long)]
        channels: PathBuf,
        /// Optional motion library JSON.
        #[arg(short, long)]
        library: Option<PathBuf>,
    },
    /// Write the default rig channel table.
    Scaffold {
        /// Output path for the generated channel table.
        output: PathBuf,
    },
    /// Print OSC messages arriving on a UDP port.
    Listen {
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        bind: String,
    },
}

#[derive(Args, Debug)]
struct StreamArgs {
    /// Settings JSON; flags below override its values.
    #[arg(short, long)]
    settings: Option<PathBuf>,
    /// Channel table JSON. Defaults to the built-in rig layout.
    #[arg(short, long)]
    channels: Option<String>,
    /// Motion library JSON. Without one every feature streams zeros.
    #[arg(short, long)]
    library: Option<String>,
    #[arg(long)]
    host: Option<String>,
    #[arg(short, long)]
    port: Option<u16>,
    #[arg(long)]
    fps: Option<u32>,
    /// Ramp duration in seconds.
    #[arg(long)]
    duration: Option<f32>,
    /// Hold after each ramp, in seconds.
    #[arg(long)]
    hold: Option<f32>,
    /// Log messages instead of sending them.
    #[arg(long)]
    dry_run: bool,
    /// Send synthetic forearm signals instead of the channel table.
    #[arg(long)]
    mock: bool,
    /// Stop after this many seconds instead of reading stdin.
    #[arg(long)]
    seconds: Option<f32>,
}

impl StreamArgs {
    fn settings(&self) -> pose_streamer_core::Result<StreamSettings> {
        let mut settings = match &self.settings {
            Some(path) => StreamSettings::load(path)?,
            None => StreamSettings::default(),
        };
        if let Some(host) = &self.host {
            settings.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(fps) = self.fps {
            settings.fps = fps;
        }
        if let Some(duration) = self.duration {
            settings.ramp_duration_secs = duration;
        }
        if let Some(hold) = self.hold {
            settings.hold_secs = hold;
        }
        if self.channels.is_some() {
            settings.channels_path = self.channels.clone();
        }
        if self.library.is_some() {
            settings.library_path = self.library.clone();
        }
        if self.mock {
            settings.mock = true;
        }
        Ok(settings)
    }
}
