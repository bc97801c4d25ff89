use crate::config::{LoggingConfig, Section};
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Flushes the non-blocking console writer on exit.
static CONSOLE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

const DEFAULT_SECTION: &str = "default";
const DEFAULT_MAX_SIZE_MB: u64 = 100;

/// Unknown level strings fall back to INFO.
fn parse_level(s: &str) -> LevelFilter {
    match s.trim().to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" | "none" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

/// `target` is `prefix` itself or one of its `prefix::` children.
fn target_under(target: &str, prefix: &str) -> bool {
    target
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

// ---------- rotating file sink ----------

#[derive(Clone)]
struct FileSink(Arc<Mutex<FileRotate<AppendTimestamp>>>);

impl FileSink {
    fn open(path: &Path, section: &Section) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let limit = match section.max_backups {
            Some(n) => FileLimit::MaxFiles(n),
            None => FileLimit::Age(chrono::Duration::days(
                i64::from(section.max_age_days.unwrap_or(1)),
            )),
        };
        let max_bytes = section.max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB) as usize * 1024 * 1024;
        let rot = FileRotate::new(
            path,
            AppendTimestamp::default(limit),
            ContentLimit::BytesSurpassed(max_bytes),
            Compression::None,
            None,
        );
        Ok(Self(Arc::new(Mutex::new(rot))))
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.0.lock() {
            Ok(mut f) => f.write(buf),
            Err(_) => Err(std::io::Error::other("log file lock poisoned")),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.0.lock() {
            Ok(mut f) => f.flush(),
            Err(_) => Err(std::io::Error::other("log file lock poisoned")),
        }
    }
}

/// Writer for one record; `None` discards it.
struct RoutedWriter(Option<FileSink>);

impl Write for RoutedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.0 {
            Some(sink) => sink.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.0 {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }
}

/// Sends each record to the file of the longest matching target prefix.
#[derive(Clone, Default)]
struct FileRouter {
    default: Option<FileSink>,
    by_target: Vec<(String, FileSink)>,
}

impl FileRouter {
    fn build(cfg: &LoggingConfig, base_dir: &Path) -> Self {
        let mut router = FileRouter::default();
        for (name, section) in cfg {
            if section.file.trim().is_empty() {
                continue;
            }
            let path = resolve_log_path(&section.file, base_dir);
            match FileSink::open(&path, section) {
                Ok(sink) if name == DEFAULT_SECTION => router.default = Some(sink),
                Ok(sink) => router.by_target.push((name.clone(), sink)),
                Err(e) => eprintln!(
                    "Failed to open log file '{}' for '{name}': {e}",
                    path.display()
                ),
            }
        }
        router
            .by_target
            .sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        router
    }

    fn resolve(&self, target: &str) -> Option<FileSink> {
        self.by_target
            .iter()
            .find(|(prefix, _)| target_under(target, prefix))
            .map(|(_, sink)| sink.clone())
            .or_else(|| self.default.clone())
    }

    fn is_empty(&self) -> bool {
        self.default.is_none() && self.by_target.is_empty()
    }
}

impl<'a> fmt::MakeWriter<'a> for FileRouter {
    type Writer = RoutedWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RoutedWriter(self.default.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        RoutedWriter(self.resolve(meta.target()))
    }
}

fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

// ---------- per-target filters ----------

fn console_targets(cfg: &LoggingConfig) -> Targets {
    let default = cfg
        .get(DEFAULT_SECTION)
        .map(|s| parse_level(&s.console_level))
        .unwrap_or(LevelFilter::INFO);
    cfg.iter()
        .filter(|(name, _)| name.as_str() != DEFAULT_SECTION)
        .fold(Targets::new().with_default(default), |t, (name, s)| {
            t.with_target(name.clone(), parse_level(&s.console_level))
        })
}

fn file_targets(cfg: &LoggingConfig, router: &FileRouter) -> Targets {
    let default = match (cfg.get(DEFAULT_SECTION), router.default.is_some()) {
        (Some(s), true) if !s.file_level.trim().is_empty() => parse_level(&s.file_level),
        (_, true) => LevelFilter::INFO,
        (_, false) => LevelFilter::OFF,
    };
    cfg.iter()
        .filter(|(name, s)| name.as_str() != DEFAULT_SECTION && !s.file.trim().is_empty())
        .fold(Targets::new().with_default(default), |t, (name, s)| {
            let level = if s.file_level.trim().is_empty() {
                LevelFilter::INFO
            } else {
                parse_level(&s.file_level)
            };
            t.with_target(name.clone(), level)
        })
}

// ---------- installation ----------

/// Installs the global subscriber: human-readable console on stderr plus
/// JSON files routed by target. `RUST_LOG`, when set, caps both sinks.
///
/// Calling it again after a subscriber is installed is a no-op.
pub fn init_logging(cfg: Option<&LoggingConfig>, base_dir: &Path) {
    // Bridge `log` records before the subscriber goes in.
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("LogTracer init skipped: {e}");
    }

    let Some(cfg) = cfg.filter(|c| !c.is_empty()) else {
        init_console_only();
        return;
    };

    let router = FileRouter::build(cfg, base_dir);
    let console_filter = console_targets(cfg);
    let file_filter = file_targets(cfg, &router);

    let (stderr, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = CONSOLE_GUARD.set(guard);

    let console = fmt::layer()
        .with_writer(stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(console_filter);

    let files = (!router.is_empty()).then(|| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(router)
            .with_filter(file_filter)
    });

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().ok())
        .with(console)
        .with(files)
        .try_init();
}

fn init_console_only() {
    let console = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().ok())
        .with(console)
        .try_init();
}
