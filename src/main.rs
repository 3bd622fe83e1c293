use clap::Parser;
use std::fs::OpenOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use stopmo_kiosk::archive::SavedArchive;
use stopmo_kiosk::capture::ScreenGrab;
use stopmo_kiosk::cli::{handle_config_action, Args, Command};
use stopmo_kiosk::clock::SystemClock;
use stopmo_kiosk::config::Config;
use stopmo_kiosk::frames::FrameStore;
use stopmo_kiosk::input::{
    InputArbiter, InputBackend, InputError, InputLines, KeyboardInput, SysfsGpio,
};
use stopmo_kiosk::power::{CommandPowerOff, PowerOff, StayOn};
use stopmo_kiosk::process::ProcessManager;
use stopmo_kiosk::session::{Session, SessionError, SessionParts};

/// Global flag for handling Ctrl+C across the application
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

fn ctrlc_received() -> bool {
    CTRLC_RECEIVED.load(Ordering::SeqCst)
}

/// Set up the Ctrl+C handler. Ctrl+C leaves the loop without powering off.
fn setup_ctrlc_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        CTRLC_RECEIVED.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, shutting down...");
    })
}

fn init_logging(args: &Args) {
    let env = env_logger::Env::default().default_filter_or(args.log_level());
    let mut builder = env_logger::Builder::from_env(env);
    builder.format_timestamp_millis();

    if let Some(path) = &args.log_file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!(
                "Cannot open log file {}: {}, logging to stderr",
                path.display(),
                e
            ),
        }
    }
    builder.init();
}

fn open_input(
    config: &Config,
    keyboard: bool,
    lines: usize,
) -> Result<Box<dyn InputLines>, InputError> {
    if keyboard || config.input.backend == InputBackend::Keyboard {
        return Ok(Box::new(KeyboardInput::start(lines)?));
    }
    let profile = config
        .input
        .button_profile()
        .map_err(|e| InputError::Unavailable(e.to_string()))?;
    Ok(Box::new(SysfsGpio::open(
        &config.input.sysfs_root,
        &profile.pins(),
        config.input.pin_offset,
    )?))
}

fn build_session(args: &Args, config: &Config) -> Result<Session, Box<dyn std::error::Error>> {
    let processes = ProcessManager::system(config.camera.policy(), config.viewer.policy())?;

    let profile = config.input.button_profile()?;
    let lines = open_input(config, args.keyboard, profile.len()).map_err(SessionError::Input)?;
    let arbiter = InputArbiter::new(
        lines,
        profile,
        config.input.polarity,
        config.input.press_interval(),
    );

    let frames = FrameStore::open(config.paths.frames_dir(), config.paths.extension.clone())?;
    let archive = SavedArchive::open(
        config.paths.saved_dir(),
        config.paths.extension.clone(),
        config.session.max_saved,
        Duration::from_secs(config.session.min_save_interval_secs),
        config.session.bypass_save_cooldown,
    )?;

    let grabber = ScreenGrab::new(
        config.camera.grab_command.clone(),
        config.camera.crop_command.clone(),
        config.camera.geometry(),
    );

    let power: Box<dyn PowerOff> = if config.shutdown.enabled {
        Box::new(CommandPowerOff::new(&config.shutdown.command)?)
    } else {
        Box::new(StayOn)
    };

    Ok(Session::new(SessionParts {
        frames,
        archive,
        processes,
        arbiter,
        grabber: Box::new(grabber),
        clock: Box::new(SystemClock),
        power,
        launchers: config.launchers(),
        settings: config.session_settings(),
    }))
}

fn run(session: &mut Session, poll_interval: Duration) -> Result<(), SessionError> {
    loop {
        if ctrlc_received() {
            log::info!("Interrupted, stopping background processes");
            session.processes_mut().stop_all();
            return Ok(());
        }

        let status = match session.tick() {
            Ok(status) => status,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                log::warn!("{}", e);
                thread::sleep(poll_interval);
                continue;
            }
        };
        log::trace!("{:?}", status);
        if status.is_shutdown() {
            return Ok(());
        }
        thread::sleep(poll_interval);
    }
}

fn main() {
    let args = Args::parse();
    init_logging(&args);

    if let Some(Command::Config { action }) = &args.command {
        if let Err(e) = handle_config_action(action.clone(), args.config.as_deref()) {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        return;
    }

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(profile) = args.profile {
        config.input.profile = profile;
    }

    if let Err(e) = setup_ctrlc_handler() {
        log::warn!("Failed to set Ctrl+C handler: {}", e);
    }

    let mut session = match build_session(&args, &config) {
        Ok(session) => session,
        Err(e) => {
            log::error!("Startup failed: {}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = session.start(config.session.keep_frames_on_start) {
        log::error!("Could not clear frames: {}", e);
    }

    if let Err(e) = run(&mut session, config.input.poll_interval()) {
        log::error!("Input lost: {}", e);
        session.processes_mut().stop_all();
        std::process::exit(1);
    }
}
