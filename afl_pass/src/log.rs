//! Diagnostics in the style of the AFL tools: a cyan banner, `[+]` for
//! progress, `[!] WARNING:` for problems that do not stop the build.
//!
//! Everything goes through `slog`, so library code only ever sees a
//! [`Logger`]. [`ConsoleDrain`] renders records for a terminal; tests pass a
//! discarding or capturing logger instead.

use std::io::{self, Write};

use slog::{Drain, Level, Logger, OwnedKVList, Record, info, o};

use crate::config::InstrumentationConfig;

/// Records carrying this tag are printed verbatim, without a level prefix.
pub const BANNER_TAG: &str = "banner";

const C_CYA: &str = "\x1b[0;36m";
const C_BRI: &str = "\x1b[1;97m";
const C_LGN: &str = "\x1b[1;92m";
const C_LRD: &str = "\x1b[1;91m";
const C_YEL: &str = "\x1b[1;93m";
const C_LBL: &str = "\x1b[1;94m";
const C_RST: &str = "\x1b[0m";

/// Writes records to stderr, one line each.
pub struct ConsoleDrain;

impl Drain for ConsoleDrain {
    type Ok = ();
    type Err = io::Error;

    fn log(&self, record: &Record<'_>, _values: &OwnedKVList) -> io::Result<()> {
        writeln!(io::stderr().lock(), "{}", render_record(record))
    }
}

fn render_record(record: &Record<'_>) -> String {
    render(record.level(), record.tag(), &record.msg().to_string())
}

fn render(level: Level, tag: &str, msg: &str) -> String {
    if tag == BANNER_TAG {
        return format!("{C_CYA}{msg}{C_RST}");
    }
    match level {
        Level::Critical | Level::Error => format!("{C_LRD}[-] {C_RST}{msg}"),
        Level::Warning => format!("{C_YEL}[!] {C_BRI}WARNING: {C_RST}{msg}"),
        Level::Info => format!("{C_LGN}[+] {C_RST}{msg}"),
        Level::Debug | Level::Trace => format!("{C_LBL}[*] {C_RST}{msg}"),
    }
}

/// Builds the console logger for a run. Quiet mode keeps only critical
/// records; debug mode adds per-function detail.
pub fn logger(config: &InstrumentationConfig) -> Logger {
    let level = if config.quiet() {
        Level::Critical
    } else if config.debug() {
        Level::Debug
    } else {
        Level::Info
    };
    Logger::root(ConsoleDrain.filter_level(level).fuse(), o!())
}

/// A logger that drops everything.
pub fn discard() -> Logger {
    Logger::root(slog::Discard, o!())
}

pub fn banner(log: &Logger) {
    info!(
        log,
        # "banner",
        "{} {}{}{}",
        env!("CARGO_PKG_NAME"),
        C_BRI,
        env!("CARGO_PKG_VERSION"),
        C_RST
    );
}

#[cfg(test)]
pub(crate) mod capture {
    use std::sync::{Arc, Mutex};

    use slog::{Drain, Level, Logger, OwnedKVList, Record, o};

    pub type Lines = Arc<Mutex<Vec<(Level, String)>>>;

    struct CaptureDrain(Lines);

    impl Drain for CaptureDrain {
        type Ok = ();
        type Err = slog::Never;

        fn log(&self, record: &Record<'_>, _values: &OwnedKVList) -> Result<(), slog::Never> {
            if let Ok(mut lines) = self.0.lock() {
                lines.push((record.level(), record.msg().to_string()));
            }
            Ok(())
        }
    }

    /// A logger that records every message for later inspection.
    pub fn logger() -> (Logger, Lines) {
        let lines = Lines::default();
        (Logger::root(CaptureDrain(lines.clone()), o!()), lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slog::warn;
    use std::sync::{Arc, Mutex};

    /// Collects what [`ConsoleDrain`] would print.
    struct RenderDrain(Arc<Mutex<Vec<String>>>);

    impl Drain for RenderDrain {
        type Ok = ();
        type Err = slog::Never;

        fn log(&self, record: &Record<'_>, _values: &OwnedKVList) -> Result<(), slog::Never> {
            if let Ok(mut lines) = self.0.lock() {
                lines.push(render_record(record));
            }
            Ok(())
        }
    }

    #[test]
    fn renders_afl_prefixes() {
        assert_eq!(render(Level::Info, "", "done"), "\x1b[1;92m[+] \x1b[0mdone");
        assert!(render(Level::Warning, "", "empty").contains("WARNING: "));
        assert_eq!(render(Level::Info, BANNER_TAG, "hi"), "\x1b[0;36mhi\x1b[0m");
    }

    #[test]
    fn banner_is_rendered_without_prefix() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let log = Logger::root(RenderDrain(lines.clone()), o!());
        banner(&log);
        info!(log, "Instrumented 3 locations");

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(&format!("{C_CYA}afl_pass ")));
        assert!(!lines[0].contains("[+]"));
        assert!(lines[0].ends_with(C_RST));
        assert_eq!(lines[1], format!("{C_LGN}[+] {C_RST}Instrumented 3 locations"));
    }

    #[test]
    fn capture_sees_levels() {
        let (log, lines) = capture::logger();
        banner(&log);
        warn!(log, "careful");
        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].1.starts_with("afl_pass"));
        assert_eq!(lines[1], (Level::Warning, "careful".to_string()));
    }
}
