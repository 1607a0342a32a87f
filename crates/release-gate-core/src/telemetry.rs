//! Centralised tracing initialisation for release-gate binaries.
//!
//! [`init_tracing`] configures a console-only subscriber. [`init_logging`]
//! additionally writes to a log file and uses the
//! `<timestamp> - <name> - <LEVEL> - <message>` line format, and
//! [`install_panic_hook`] routes uncaught panics through the same subscriber.
//!
//! Only the first initialisation in a process takes effect; later calls are
//! silently ignored (the global subscriber can only be set once).

use chrono::Local;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Default date format for log lines and log file names.
pub const DEFAULT_DATEFMT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Initialise the global tracing subscriber.
///
/// * `json`: when `true`, emit newline-delimited JSON log lines
///   (useful for log aggregation pipelines).
/// * `level`: default verbosity when `RUST_LOG` is not set.
///
/// Respects the `RUST_LOG` environment variable for fine-grained filtering.
/// If `RUST_LOG` is not set, falls back to the supplied `level`.
///
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}

/// Console and file logging settings.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name shown in every line and used for the default file name.
    pub root_name: String,

    /// Directory for the log file; `None` disables file logging.
    pub log_dir: Option<PathBuf>,

    /// File name inside `log_dir`; defaults to `<root_name>_<timestamp>.log`.
    pub log_file_name: Option<String>,

    pub console_level: Level,
    pub console_datefmt: String,
    /// Emit JSON on the console instead of formatted lines.
    pub console_json: bool,

    pub file_level: Level,
    pub file_datefmt: String,
}

impl LogConfig {
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            root_name: root_name.into(),
            log_dir: None,
            log_file_name: None,
            console_level: Level::DEBUG,
            console_datefmt: DEFAULT_DATEFMT.to_string(),
            console_json: false,
            file_level: Level::DEBUG,
            file_datefmt: DEFAULT_DATEFMT.to_string(),
        }
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn with_console_level(mut self, level: Level) -> Self {
        self.console_level = level;
        self
    }

    pub fn with_file_level(mut self, level: Level) -> Self {
        self.file_level = level;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.console_json = json;
        self
    }

    /// Path the file layer writes to, creating `log_dir` when missing.
    pub fn resolve_log_file(&self) -> std::io::Result<Option<PathBuf>> {
        let Some(dir) = &self.log_dir else {
            return Ok(None);
        };
        if !dir.is_dir() {
            std::fs::create_dir_all(dir)?;
        }
        let name = match &self.log_file_name {
            Some(name) => name.clone(),
            None => format!(
                "{}_{}.log",
                self.root_name,
                Local::now().format(&self.file_datefmt)
            ),
        };
        Ok(Some(dir.join(name)))
    }
}

/// What [`init_logging`] set up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogHandle {
    /// Log file in use, when file logging is enabled.
    pub log_file: Option<PathBuf>,

    /// Whether this call installed the global subscriber.
    pub installed: bool,
}

/// Formats events as `<timestamp> - <name> - <LEVEL> - <message>`.
#[derive(Debug, Clone)]
pub struct LineFormat {
    name: String,
    datefmt: String,
}

impl LineFormat {
    pub fn new(name: impl Into<String>, datefmt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            datefmt: datefmt.into(),
        }
    }
}

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "{} - {} - {} - ",
            Local::now().format(&self.datefmt),
            self.name,
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Build the subscriber described by `config` without installing it.
///
/// Returns the subscriber and the log file it writes to.
pub fn build_subscriber(
    config: &LogConfig,
) -> std::io::Result<(impl Subscriber + Send + Sync + 'static, Option<PathBuf>)> {
    let log_file = config.resolve_log_file()?;
    let file = match &log_file {
        Some(path) => Some(open_append(path)?),
        None => None,
    };

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.console_level.as_str()));

    let (console_lines, console_json) = if config.console_json {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter);
        (None, Some(layer))
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .event_format(LineFormat::new(&config.root_name, &config.console_datefmt))
            .with_writer(std::io::stderr)
            .with_filter(console_filter);
        (Some(layer), None)
    };

    let file_layer = file.map(|file| {
        tracing_subscriber::fmt::layer()
            .event_format(LineFormat::new(&config.root_name, &config.file_datefmt))
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_filter(LevelFilter::from_level(config.file_level))
    });

    let subscriber = tracing_subscriber::registry()
        .with(console_lines)
        .with(console_json)
        .with(file_layer);

    Ok((subscriber, log_file))
}

/// Install console logging and, when `log_dir` is set, file logging.
///
/// Fails only when the log directory or file cannot be created.
pub fn init_logging(config: &LogConfig) -> std::io::Result<LogHandle> {
    let (subscriber, log_file) = build_subscriber(config)?;
    let installed = subscriber.try_init().is_ok();
    Ok(LogHandle {
        log_file,
        installed,
    })
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Route uncaught panics through tracing.
///
/// Each line of the panic message and of the backtrace is logged at ERROR
/// level with a zero-padded line index.
pub fn install_panic_hook(root_name: impl Into<String>) {
    let root_name = root_name.into();
    std::panic::set_hook(Box::new(move |info| {
        for line in panic_report_lines(&root_name, info) {
            tracing::error!("{}", line);
        }
    }));
}

fn panic_report_lines(root_name: &str, info: &std::panic::PanicHookInfo<'_>) -> Vec<String> {
    let payload = info
        .payload()
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| info.payload().downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "<non-string panic payload>".to_string());

    let mut lines = vec![match info.location() {
        Some(loc) => format!("{root_name}: uncaught panic at {}:{}:", loc.file(), loc.line()),
        None => format!("{root_name}: uncaught panic:"),
    }];
    lines.extend(numbered_lines("panic", &payload));

    let backtrace = std::backtrace::Backtrace::force_capture().to_string();
    lines.extend(numbered_lines("backtrace", &backtrace));
    lines
}

/// Prefix each line of `text` with `<label> L<index>: `, zero-padding the
/// index to the width of the line count.
pub fn numbered_lines(label: &str, text: &str) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let width = zeropad_width(lines.len() as i64);
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{label} L{i:0width$}: {}", line.trim_end()))
        .collect()
}

/// Digits needed to print `maxval`, counting a leading sign for negatives.
pub fn zeropad_width(maxval: i64) -> usize {
    if maxval == 0 {
        return 1;
    }
    let sign = if maxval > 0 { 1 } else { 2 };
    sign + maxval.unsigned_abs().ilog10() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeropad_width() {
        assert_eq!(zeropad_width(0), 1);
        assert_eq!(zeropad_width(1), 1);
        assert_eq!(zeropad_width(9), 1);
        assert_eq!(zeropad_width(10), 2);
        assert_eq!(zeropad_width(99), 2);
        assert_eq!(zeropad_width(100), 3);
        assert_eq!(zeropad_width(-1), 2);
        assert_eq!(zeropad_width(-10), 3);
        assert_eq!(zeropad_width(i64::MIN), 20);
    }

    #[test]
    fn test_numbered_lines_padding() {
        let text = (0..12).map(|i| format!("line {i}  ")).collect::<Vec<_>>().join("\n");
        let lines = numbered_lines("traceback", &text);
        assert_eq!(lines.len(), 12);
        assert_eq!(lines[0], "traceback L00: line 0");
        assert_eq!(lines[11], "traceback L11: line 11");
    }

    #[test]
    fn test_numbered_lines_single() {
        assert_eq!(numbered_lines("panic", "boom"), vec!["panic L0: boom"]);
    }

    #[test]
    fn test_resolve_log_file_default_name() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("nested").join("log");
        let config = LogConfig::new("testapp").with_log_dir(&log_dir);

        let path = config.resolve_log_file().unwrap().unwrap();
        assert!(log_dir.is_dir(), "missing log dir should be created");
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("testapp_"));
        assert!(name.ends_with(".log"));
    }

    #[test]
    fn test_resolve_log_file_disabled() {
        assert_eq!(LogConfig::new("x").resolve_log_file().unwrap(), None);
    }

    #[test]
    fn test_subscriber_writes_formatted_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = LogConfig::new("testapp")
            .with_log_dir(dir.path())
            .with_console_level(Level::ERROR)
            .with_file_level(Level::INFO);
        config.log_file_name = Some("run.log".to_string());

        let (subscriber, log_file) = build_subscriber(&config).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("filtered out");
            tracing::info!("I'm a log message at info level!");
            tracing::warn!("I'm a log message at warning level!");
        });

        let log_file = log_file.unwrap();
        assert_eq!(log_file, dir.path().join("run.log"));
        let contents = std::fs::read_to_string(&log_file).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2, "{contents}");
        assert!(lines[0].ends_with(" - testapp - INFO - I'm a log message at info level!"));
        assert!(lines[1].ends_with(" - testapp - WARN - I'm a log message at warning level!"));
        assert!(!contents.contains("filtered out"));
    }
}
