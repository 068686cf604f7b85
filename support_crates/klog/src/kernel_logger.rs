//! A logging implementation which forwards formatted records to a console sink
use core::fmt;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

/// A function that writes already formatted text to the console.
///
/// It is called once per log record with the complete line including the trailing newline.
pub type ConsoleSink = fn(fmt::Arguments);

// TODO Improve updating the maximum log level
// Currently, only the global log:: filter is updated because that's easier that worrying about internal mutability of
// the KernelLogger struct which would be required when wanting to update internal state too

pub struct KernelLogger {
    pub initial_log_level: Level,
    sink: ConsoleSink,
}

impl KernelLogger {
    pub const fn new(max_log_level: Level, sink: ConsoleSink) -> KernelLogger {
        KernelLogger {
            initial_log_level: max_log_level,
            sink,
        }
    }

    pub fn install(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self).map(|_| log::set_max_level(self.initial_log_level.to_level_filter()))
    }

    pub fn update_log_level(&'static self, level: Level) {
        log::set_max_level(level.to_level_filter());
    }

    /// Silence all logging without uninstalling the logger
    pub fn mute(&'static self) {
        log::set_max_level(LevelFilter::Off);
    }
}

fn level_moji(level: Level) -> &'static str {
    match level {
        Level::Error => "❌",
        Level::Warn => "⚠️",
        Level::Info => "ℹ️",
        Level::Debug => "🛠️",
        Level::Trace => "👣",
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            (self.sink)(format_args!(
                "{}  {}: {}\n",
                level_moji(record.level()),
                record.target(),
                record.args(),
            ))
        }
    }

    fn flush(&self) {}
}

impl fmt::Debug for KernelLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelLogger")
            .field("initial_log_level", &self.initial_log_level)
            .finish_non_exhaustive()
    }
}
