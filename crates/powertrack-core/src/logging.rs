//! Logging utilities with indicatif integration

use indicatif::MultiProgress;

/// ANSI color code and padded label for a log level.
fn level_style(level: log::Level, color: bool) -> (&'static str, &'static str, &'static str) {
    let label = match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    };
    if !color {
        return ("", label, "");
    }
    let ansi = match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    };
    (ansi, label, "\x1b[0m")
}

/// Thread name prefix for worker-originated lines (`fetch-3`, `row-writer`)
fn thread_tag() -> String {
    match std::thread::current().name() {
        Some(name) if name != "main" => format!("[{name}] "),
        _ => String::new(),
    }
}

/// Logger that prints through indicatif MultiProgress to avoid mixing with progress bars.
struct IndicatifLogger {
    inner: env_logger::Logger,
    multi: MultiProgress,
}

impl log::Log for IndicatifLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            let (pre, label, post) = level_style(record.level(), true);
            let line = format!("[{pre}{label}{post}] {}{}", thread_tag(), record.args());
            self.multi.suspend(|| eprintln!("{line}"));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Initialize logging with optional TTY mode (indicatif integration).
///
/// `RUST_LOG` overrides the level chosen from `quiet` / `debug`.
pub fn init_logging(quiet: bool, debug: bool, multi: Option<&MultiProgress>) {
    use std::io::Write;

    let default_level = if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let env = env_logger::Env::default().default_filter_or(default_level);

    if let Some(multi) = multi {
        let logger = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .build();
        let max_level = logger.filter();

        let bridged = IndicatifLogger {
            inner: logger,
            multi: multi.clone(),
        };
        if log::set_boxed_logger(Box::new(bridged)).is_ok() {
            log::set_max_level(max_level);
        }
    } else {
        // Non-TTY: no ANSI colors, timestamp for log aggregation
        let _ = env_logger::Builder::from_env(env)
            .format(|buf, record| {
                let (_, label, _) = level_style(record.level(), false);
                writeln!(
                    buf,
                    "{} [{label}] {}{}",
                    buf.timestamp_seconds(),
                    thread_tag(),
                    record.args()
                )
            })
            .try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_style_has_no_ansi() {
        let (pre, label, post) = level_style(log::Level::Warn, false);
        assert_eq!((pre, label, post), ("", "WARN ", ""));
    }

    #[test]
    fn colored_style_resets() {
        let (pre, _, post) = level_style(log::Level::Error, true);
        assert_eq!(pre, "\x1b[31m");
        assert_eq!(post, "\x1b[0m");
    }

    #[test]
    fn named_thread_tagged() {
        let tag = std::thread::Builder::new()
            .name("fetch-2".into())
            .spawn(thread_tag)
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(tag, "[fetch-2] ");
    }

    #[test]
    fn init_twice_is_harmless() {
        init_logging(true, false, None);
        init_logging(false, true, None);
    }
}
