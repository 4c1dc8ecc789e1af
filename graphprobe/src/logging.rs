//! Console logging gated by `GRAPHPROBE_TRACE`.
//!
//! `1` enables errors and trace lines, `full` adds warnings. Info and
//! critical lines always print.
use std::env;
use std::fmt::Arguments;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Verbosity {
    Off,
    Basic,
    Full,
}

#[doc(hidden)]
#[derive(Clone, Copy)]
pub enum Level {
    Info,
    Warning,
    Error,
    Critical,
    Trace,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
            Level::Trace => "TRACE",
        }
    }

    fn color(self) -> Option<&'static str> {
        match self {
            Level::Info => None,
            Level::Warning => Some("33"),
            Level::Error => Some("91"),
            Level::Critical => Some("31"),
            Level::Trace => Some("34"),
        }
    }

    fn required(self) -> Verbosity {
        match self {
            Level::Info | Level::Critical => Verbosity::Off,
            Level::Error | Level::Trace => Verbosity::Basic,
            Level::Warning => Verbosity::Full,
        }
    }
}

static VERBOSITY: OnceLock<Verbosity> = OnceLock::new();

fn parse_verbosity(value: &str) -> Verbosity {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" => Verbosity::Basic,
        "full" => Verbosity::Full,
        _ => Verbosity::Off,
    }
}

fn verbosity() -> Verbosity {
    *VERBOSITY.get_or_init(|| {
        env::var("GRAPHPROBE_TRACE")
            .map(|value| parse_verbosity(&value))
            .unwrap_or(Verbosity::Off)
    })
}

fn timestamp_hms() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        % 86_400;
    format!("{:02}:{:02}:{:02}", secs / 3_600, (secs % 3_600) / 60, secs % 60)
}

#[doc(hidden)]
pub fn emit(level: Level, args: Arguments) {
    if verbosity() < level.required() {
        return;
    }
    let ts = timestamp_hms();
    match level.color() {
        None => println!("{ts} [{}] -- {args}", level.tag()),
        Some(color) => println!("{ts} [\u{001b}[{color}m{}\u{001b}[0m] -- {args}", level.tag()),
    }
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Warning, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Error, format_args!($($arg)*))
    };
}

/// Always printed; used right before a fatal panic.
#[macro_export]
macro_rules! critical {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Critical, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::logging::emit($crate::logging::Level::Trace, format_args!($($arg)*))
    };
}
