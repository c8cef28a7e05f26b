//! Massdrop ALT RGB CLI tool.
//!
//! Flashes the keyboard lighting for desktop notifications and controls individual LEDs through
//! the firmware's raw HID lighting endpoint.

use std::path::PathBuf;
use std::process::{self, ExitCode};
use std::time::Duration;

use clap::builder::EnumValueParser;
use clap::{
    crate_description, crate_name, crate_version, value_parser, Arg, ArgAction, ArgMatches, Command,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::animation::{Animation, Animator, DEFAULT_STEP};
use crate::board::KeyboardModel;
use crate::color::{ColorSpec, Policy};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::locator::DeviceLocator;
use crate::protocol::{LightState, Mode, Zone};
use crate::session::{CancelToken, Session, SessionOptions};

mod animation;
mod board;
mod color;
mod config;
mod error;
mod locator;
mod massdrop_alt;
mod massdrop_ctrl;
mod protocol;
mod session;
mod transport;
mod watch;

/// Exit status when no matching keyboard is connected.
const EXIT_DEVICE_NOT_FOUND: u8 = 2;

/// Exit status after a second interrupt.
const EXIT_INTERRUPTED: i32 = 130;

fn main() -> ExitCode {
    let matches = cli();
    init_logging(matches.get_count("verbose"));

    match run(&matches) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("\x1b[31mError:\x1b[0m {err}");
            if err.is_validation() {
                eprintln!("Use --lenient to fall back to defaults for invalid colors and modes.");
            }

            match err {
                Error::DeviceNotFound { .. } => ExitCode::from(EXIT_DEVICE_NOT_FOUND),
                _ => ExitCode::FAILURE,
            }
        },
    }
}

/// Setup `tracing` output to STDERR, `RUST_LOG` takes precedence over `--verbose`.
fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "alt_rgb=info",
        1 => "alt_rgb=debug",
        _ => "alt_rgb=trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Cancel running notifications and animations on the first Ctrl+C, exit on the second.
fn install_interrupt_handler(cancel: &CancelToken) {
    let cancel = cancel.clone();
    let result = ctrlc::set_handler(move || {
        if cancel.is_cancelled() {
            process::exit(EXIT_INTERRUPTED);
        }
        cancel.cancel();
    });

    if let Err(err) = result {
        warn!("Unable to install interrupt handler: {err}");
    }
}

/// Everything a command needs to talk to the keyboard.
struct Context {
    config: Config,
    locator: DeviceLocator,
    options: SessionOptions,
    cancel: CancelToken,
}

impl Context {
    fn from_cli(matches: &ArgMatches) -> Result<Self> {
        let mut config = Config::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;

        if matches.get_flag("strict") {
            config.policy = Policy::Strict;
        } else if matches.get_flag("lenient") {
            config.policy = Policy::Lenient;
        }

        if let Some(model) = matches.get_one::<KeyboardModel>("model") {
            config.device.model = *model;
        }

        let board = config.board();
        let options = config.session_options(&board);
        let locator = DeviceLocator::new(board.ids);
        info!("Using {} ({})", board.name, locator.ids());
        debug!("Color validation policy: {:?}", options.colors.policy());

        Ok(Self { config, locator, options, cancel: CancelToken::new() })
    }

    fn open(&self) -> Result<Session> {
        Session::open(&self.locator, self.options.clone())
    }

    /// Run an operation on a fresh session, closing it afterwards.
    fn with_session<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut Session) -> Result<()>,
    {
        let mut session = self.open()?;
        let result = op(&mut session);
        if !session.is_closed() {
            session.close()?;
        }
        result
    }

    fn color(&self, matches: &ArgMatches) -> Result<ColorSpec> {
        self.options.colors.parse(required_str(matches, "color")?)
    }

    fn duration(&self, matches: &ArgMatches) -> Duration {
        match matches.get_one::<u64>("duration") {
            Some(ms) => Duration::from_millis(*ms),
            None => self.config.notify.duration(),
        }
    }
}

fn run(matches: &ArgMatches) -> Result<()> {
    let context = Context::from_cli(matches)?;
    install_interrupt_handler(&context.cancel);

    match matches.subcommand() {
        Some(("state", matches)) => state(&context, matches),
        Some(("next-animation", _)) => context.with_session(|session| session.next_animation()),
        Some(("color", matches)) => {
            let mode = context.options.colors.resolve_mode(required_str(matches, "mode")?)?;
            let color = context.color(matches)?;
            context.with_session(|session| session.set_color_with(mode, &color))
        },
        Some(("led", matches)) => {
            let index = required::<u16>(matches, "index")?;
            let color = context.color(matches)?;
            context.with_session(|session| session.set_single_led_with(index, &color))
        },
        Some(("zone", matches)) => {
            let zone = required::<Zone>(matches, "zone")?;
            let color = context.color(matches)?;
            context.with_session(|session| session.set_zone_with(zone, &color))
        },
        Some(("animate", matches)) => animate(&context, matches),
        #[cfg(feature = "watch")]
        Some(("watch", matches)) => watch(&context, matches),
        _ => notify(&context, matches),
    }
}

/// Flash a color and restore the previous light state.
fn notify(context: &Context, matches: &ArgMatches) -> Result<()> {
    let colors = &context.options.colors;

    let mode = match matches.get_one::<String>("mode") {
        Some(mode) => colors.resolve_mode(mode)?,
        None => {
            info!("No mode specified, defaulting to {}", Mode::default());
            Mode::default()
        },
    };

    let color = match matches.get_one::<String>("color") {
        Some(color) => colors.parse(color)?,
        None => {
            info!("No color specified, defaulting to white");
            ColorSpec::Name("white".into())
        },
    };

    let duration = context.duration(matches);
    context.with_session(|session| session.notify_with(mode, &color, duration, &context.cancel))
}

/// Print or change the persistent light state.
fn state(context: &Context, matches: &ArgMatches) -> Result<()> {
    match matches.get_one::<LightState>("state") {
        Some(state) => context.with_session(|session| session.set_state(*state)),
        None => context.with_session(|session| {
            println!("{}", session.get_state()?);
            Ok(())
        }),
    }
}

/// Play a canned animation.
fn animate(context: &Context, matches: &ArgMatches) -> Result<()> {
    let animation = required::<Animation>(matches, "animation")?;
    let step = matches.get_one::<u64>("step").map_or(DEFAULT_STEP, |ms| Duration::from_millis(*ms));

    let colors = matches
        .get_many::<String>("color")
        .unwrap_or_default()
        .map(|color| context.options.colors.parse(color))
        .collect::<Result<Vec<_>>>()?;

    let board = context.config.board();
    let animator = Animator::new(&board, step, &context.cancel);
    context.with_session(|session| animator.play(session, animation, &colors))
}

/// Flash the keyboard for matching desktop notifications until interrupted.
#[cfg(feature = "watch")]
fn watch(context: &Context, matches: &ArgMatches) -> Result<()> {
    use crate::watch::bus::NotificationMonitor;
    use crate::watch::Watcher;

    let rules = context.config.watch.clone();
    if rules.is_empty() {
        warn!("No [[watch]] rules configured, all notifications will be ignored");
    }

    let monitor = NotificationMonitor::start(context.cancel.clone())?;
    let watcher = Watcher::new(rules, context.duration(matches), context.cancel.clone());
    watcher.run(|| monitor.next_event(), || context.open())
}

/// Get clap CLI parameters.
fn cli() -> ArgMatches {
    command().get_matches()
}

fn command() -> Command {
    let color_arg = || {
        Arg::new("color")
            .help("Color name, 0xRRGGBB, rgb:R,G,B or hsv:H,S,V")
            .value_name("COLOR")
    };
    let duration_arg = || {
        Arg::new("duration")
            .help("Notification duration in milliseconds")
            .long("duration")
            .short('t')
            .value_parser(value_parser!(u64))
    };

    let command = Command::new(crate_name!())
        .version(crate_version!())
        .author("Christian Duerr <contact@christianduerr.com>")
        .about(crate_description!())
        .arg(Arg::new("mode").help("Notification region [full, bottom, under]"))
        .arg(color_arg())
        .arg(duration_arg())
        .arg(
            Arg::new("config")
                .help("Configuration file")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("model")
                .help("Keyboard model")
                .long("model")
                .short('m')
                .global(true)
                .ignore_case(true)
                .value_parser(EnumValueParser::<KeyboardModel>::new()),
        )
        .arg(
            Arg::new("strict")
                .help("Reject invalid colors and modes")
                .long("strict")
                .global(true)
                .action(ArgAction::SetTrue)
                .conflicts_with("lenient"),
        )
        .arg(
            Arg::new("lenient")
                .help("Fall back to white and full for invalid colors and modes")
                .long("lenient")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .help("Increase log verbosity")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::Count),
        )
        .subcommand(
            Command::new("state").about("Print or set the persistent light state").arg(
                Arg::new("state")
                    .help("New light state")
                    .ignore_case(true)
                    .value_parser(EnumValueParser::<LightState>::new()),
            ),
        )
        .subcommand(Command::new("next-animation").about("Switch to the next firmware animation"))
        .subcommand(
            Command::new("color")
                .about("Color a region until the next state change")
                .arg(Arg::new("mode").help("Region [full, bottom, under]").required(true))
                .arg(color_arg().required(true)),
        )
        .subcommand(
            Command::new("led")
                .about("Color a single LED")
                .arg(
                    Arg::new("index")
                        .help("LED index")
                        .required(true)
                        .value_parser(value_parser!(u16)),
                )
                .arg(color_arg().required(true)),
        )
        .subcommand(
            Command::new("zone")
                .about("Color a key row or underglow edge")
                .arg(
                    Arg::new("zone")
                        .help("Zone [row1-row5, bottom, right, top, left]")
                        .required(true)
                        .value_parser(|zone: &str| zone.parse::<Zone>()),
                )
                .arg(color_arg().required(true)),
        )
        .subcommand(
            Command::new("animate")
                .about("Play an animation")
                .arg(
                    Arg::new("animation")
                        .help("Animation")
                        .required(true)
                        .ignore_case(true)
                        .value_parser(EnumValueParser::<Animation>::new()),
                )
                .arg(color_arg().help("Colors to play the animation in").num_args(0..))
                .arg(
                    Arg::new("step")
                        .help("Delay between animation steps in milliseconds")
                        .long("step")
                        .value_parser(value_parser!(u64)),
                ),
        );

    #[cfg(feature = "watch")]
    let command = command.subcommand(
        Command::new("watch")
            .about("Flash the keyboard for desktop notifications matching the configured rules")
            .arg(duration_arg()),
    );

    command
}

/// Get a required argument.
#[inline]
fn required<T>(matches: &ArgMatches, name: &'static str) -> Result<T>
where
    T: Copy + Send + Sync + 'static,
{
    matches.get_one::<T>(name).copied().ok_or(Error::MissingArgument(name))
}

/// Get a required string argument.
#[inline]
fn required_str<'a>(matches: &'a ArgMatches, name: &'static str) -> Result<&'a str> {
    matches.get_one::<String>(name).map(String::as_str).ok_or(Error::MissingArgument(name))
}
