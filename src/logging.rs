use crate::config::{Log, LogFormat, LogOutput, LogRotation};
use anyhow::Context;
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

/// Installs the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
///
/// The returned guard flushes the log file on drop and must be held until the
/// process exits.
pub fn init(log: &Log) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log.level_directive()));
    let (writer, guard) = make_writer(log)?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(!log.writes_file());

    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    Ok(guard)
}

fn make_writer(log: &Log) -> anyhow::Result<(BoxMakeWriter, Option<WorkerGuard>)> {
    if !log.writes_file() {
        return Ok((BoxMakeWriter::new(std::io::stdout), None));
    }

    let (file, guard) = tracing_appender::non_blocking(file_appender(log)?);
    let writer = match log.output {
        LogOutput::Both => BoxMakeWriter::new(std::io::stdout.and(file)),
        _ => BoxMakeWriter::new(file),
    };
    Ok((writer, Some(guard)))
}

fn file_appender(log: &Log) -> anyhow::Result<RollingFileAppender> {
    let directory = match log.file_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = log
        .file_path
        .file_name()
        .with_context(|| format!("Log file path {} does not name a file", log.file_path.display()))?;

    fs::create_dir_all(directory)
        .with_context(|| format!("Failed to create log directory {}", directory.display()))?;

    let rotation = match log.rotation {
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    };

    RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(prefix.to_string_lossy())
        .max_log_files(log.max_backups)
        .build(directory)
        .with_context(|| format!("Failed to open log file {}", log.file_path.display()))
}
