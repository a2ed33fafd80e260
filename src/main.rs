//! Smart mirror controller running against the simulated rig.

use anyhow::Result;
use clap::Parser;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{info, warn};
use smart_mirror::app::MirrorApp;
use smart_mirror::config::{Config, EXAMPLE_CONFIG};
use smart_mirror::focus::FocusCalibration;
use smart_mirror::hardware::{ChannelRecognizer, SpeechRecognizer};
use smart_mirror::simulation::simulated_rig;
use smart_mirror::Error;
use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Focus calibration file (JSON), overrides the configuration
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<u64>,

    /// Run without voice control
    #[arg(long)]
    no_voice: bool,

    /// Run a contrast sweep on every focus command
    #[arg(long)]
    sweep: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    if args.print_config {
        print!("{EXAMPLE_CONFIG}");
        return Ok(());
    }

    // Initialize logger
    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    info!("Smart Mirror (simulated rig)");

    // Load configuration if provided
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path.display());
        match Config::from_file(config_path).and_then(|cfg| cfg.validate().map(|()| cfg)) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("Failed to load config file: {}. Using defaults.", e);
                Config::default()
            }
        }
    } else {
        Config::default()
    };
    if let Some(path) = args.calibration {
        config.focus.calibration = path;
    }
    if args.sweep {
        config.focus.sweep.enabled = true;
    }

    let calibration = match FocusCalibration::from_file(&config.focus.calibration) {
        Ok(calibration) => calibration,
        Err(e) => {
            warn!("{}. Falling back to constant focus.", e);
            FocusCalibration::default()
        }
    };

    let (quit_tx, quit_rx) = bounded::<()>(1);
    let speech: smart_mirror::Result<Box<dyn SpeechRecognizer>> = if args.no_voice {
        Err(Error::SubsystemUnavailable("disabled with --no-voice".to_string()))
    } else {
        let (text_tx, recognizer) = ChannelRecognizer::channel();
        spawn_stdin_reader(text_tx, quit_tx)?;
        info!("Type commands (eye, lips, face, zoom out, focus) or 'quit'");
        Ok(Box::new(recognizer))
    };

    let (rig, camera) = simulated_rig(&config, calibration.clone(), speech);
    let mut app = MirrorApp::new(config, calibration, rig)?;
    app.start()?;

    let deadline = args.duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    loop {
        let wait = deadline.map_or(STATUS_INTERVAL, |d| {
            d.saturating_duration_since(Instant::now()).min(STATUS_INTERVAL)
        });
        match quit_rx.recv_timeout(wait) {
            Ok(()) => {
                info!("Exit requested by user");
                break;
            }
            Err(RecvTimeoutError::Timeout) => {}
            // stdin closed; keep running until the deadline
            Err(RecvTimeoutError::Disconnected) => thread::sleep(wait),
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("Run duration elapsed");
            break;
        }

        info!(
            "zoom {} | tracking {} | sensor crop {:?} | lens {:.2} | ticks {:?}",
            app.crop_controller().zoom_level(),
            app.crop_controller().is_tracking(),
            camera.crop(),
            camera.lens_position(),
            app.loop_ticks()
        );
    }

    info!("Application shutting down");
    app.stop();

    Ok(())
}

fn spawn_stdin_reader(text_tx: Sender<String>, quit_tx: Sender<()>) -> Result<()> {
    thread::Builder::new().name("stdin".to_string()).spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim();
            if line.eq_ignore_ascii_case("quit") {
                let _ = quit_tx.try_send(());
                break;
            }
            if !line.is_empty() && text_tx.send(line.to_string()).is_err() {
                break;
            }
        }
    })?;
    Ok(())
}
