//! Log setup for an embedding process (§9 "Design Notes": a library crate
//! shouldn't force a logging backend on its caller, so this is an opt-in
//! helper rather than something `Database::open` calls itself).
//!
//! Grounded on the teacher's `kv-cli::trace::init_logging`: a `fern`
//! dispatch chained to a daily-rotating, non-blocking `tracing-appender`
//! file sink, plus a colored stderr dispatch for warnings.

use std::io::{BufWriter, Write};
use std::str::FromStr;

use log::LevelFilter;
use remdb_core::error::{CResult, Error};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

const MAX_LOG_FILES: usize = 10;

/// Initializes process-wide logging: a daily-rotating file sink under `dir`
/// at `level`, plus a colored stderr dispatch for anything logged under the
/// `server_warnings` target. Returns the guards keeping the non-blocking
/// writer alive — dropping them flushes and stops the background writer
/// thread, so callers must hold them for the process's lifetime.
pub fn init_logging(dir: &str, level: &str) -> CResult<Vec<Box<dyn Drop + Send + Sync + 'static>>> {
    let mut guards: Vec<Box<dyn Drop + Send + Sync + 'static>> = Vec::new();
    let mut logger = fern::Dispatch::new();

    let rolling = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("remdb.log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .map_err(|e| Error::wrap(remdb_core::error::Kind::Internal, "failed to start the log file appender", e))?;
    let (non_blocking, flush_guard) = tracing_appender::non_blocking(rolling);
    let buffered_non_blocking = BufWriter::with_capacity(64 * 1024, non_blocking);

    guards.push(Box::new(flush_guard));
    let level_filter = LevelFilter::from_str(level)
        .map_err(|e| Error::wrap(remdb_core::error::Kind::Internal, format!("invalid log level '{level}'"), e))?;
    let dispatch_file = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] - {} - [{}] {}",
                chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level_filter)
        .chain(Box::new(buffered_non_blocking) as Box<dyn Write + Send>);
    logger = logger.chain(dispatch_file);

    let dispatch_stderr = fern::Dispatch::new()
        .level(LevelFilter::Warn)
        .filter(|metadata| metadata.target() == "server_warnings")
        .format(|out, message, _| {
            out.finish(format_args!("\x1B[{}m{}\x1B[0m", fern::colors::Color::Yellow.to_fg_str(), message))
        })
        .chain(std::io::stderr());
    logger = logger.chain(dispatch_stderr);

    if logger.apply().is_err() {
        log::warn!("logger has already been set; init_logging is a no-op for this process");
        return Ok(Vec::new());
    }

    Ok(guards)
}
