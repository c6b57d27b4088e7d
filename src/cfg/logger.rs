// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Log output in the server's native shape.
//!
//! Text mode emits the classic `pid:role timestamp mark message` lines
//! (`.` debug, `-` verbose, `*` notice, `#` warning and up), so the log
//! reads like any other server of this family. JSON mode emits one object
//! per event for log shippers. Verbosity, destination and format come
//! from the `logging` section of the server config (`loglevel`,
//! `logfile`, `logformat`); `RUST_LOG` still overrides the filter.

use std::{
    fmt::Debug,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use serde_json::json;
use tracing::{Event, Level, Subscriber};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{
        self, FmtContext, FormatEvent, FormatFields, format::Writer,
        writer::BoxMakeWriter,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
};

use crate::cfg::{
    config::{Config, LoggingConfig},
    enums::{LogFormat, LogRotation},
};

/// Single-node servers always log as a master.
const ROLE: char = 'M';

fn level_mark(level: &Level) -> char {
    match *level {
        Level::TRACE => '.',
        Level::DEBUG => '-',
        Level::INFO => '*',
        _ => '#',
    }
}

/// `1234:M 01 Aug 2026 12:34:56.789 * Ready to accept connections`
struct TextFormat;

impl<S, N> FormatEvent<S, N> for TextFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        write!(
            writer,
            "{}:{} {} {} ",
            std::process::id(),
            ROLE,
            Local::now().format("%d %b %Y %H:%M:%S%.3f"),
            level_mark(event.metadata().level()),
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

#[derive(Serialize)]
struct JsonLine {
    timestamp: String,
    pid: u32,
    role: char,
    level: String,
    fields: serde_json::Map<String, serde_json::Value>,
}

struct FieldVisitor(serde_json::Map<String, serde_json::Value>);

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, f: &tracing::field::Field, v: &dyn Debug) {
        self.0.insert(f.name().to_string(), json!(format!("{v:?}")));
    }

    fn record_i64(&mut self, f: &tracing::field::Field, v: i64) {
        self.0.insert(f.name().to_string(), json!(v));
    }

    fn record_u64(&mut self, f: &tracing::field::Field, v: u64) {
        self.0.insert(f.name().to_string(), json!(v));
    }

    fn record_bool(&mut self, f: &tracing::field::Field, v: bool) {
        self.0.insert(f.name().to_string(), json!(v));
    }

    fn record_str(&mut self, f: &tracing::field::Field, v: &str) {
        self.0.insert(f.name().to_string(), json!(v));
    }
}

struct JsonFormat;

impl<S, N> FormatEvent<S, N> for JsonFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut visitor = FieldVisitor(serde_json::Map::new());
        event.record(&mut visitor);

        let line = JsonLine {
            timestamp: Local::now().to_rfc3339(),
            pid: std::process::id(),
            role: ROLE,
            level: event.metadata().level().to_string(),
            fields: visitor.0,
        };
        writeln!(
            writer,
            "{}",
            serde_json::to_string(&line).map_err(|_| std::fmt::Error)?
        )
    }
}

/// Installs the global subscriber per the config's `logging` section.
/// Returns the writer guard when logging to a file; dropping it flushes
/// buffered lines at shutdown.
pub fn init_logger(cfg: &Config) -> Result<Option<WorkerGuard>> {
    let logging = &cfg.logging;
    let (writer, guard) = make_writer(logging)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(logging.level.as_filter()))
        .context("failed to build log filter")?;

    match logging.format {
        LogFormat::Text => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .event_format(TextFormat);
            tracing::subscriber::set_global_default(
                Registry::default().with(filter).with(layer),
            )
            .context("failed to set global subscriber")?;
        },
        LogFormat::Json => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .event_format(JsonFormat);
            tracing::subscriber::set_global_default(
                Registry::default().with(filter).with(layer),
            )
            .context("failed to set global subscriber")?;
        },
    }
    Ok(guard)
}

fn make_writer(
    logging: &LoggingConfig,
) -> Result<(BoxMakeWriter, Option<WorkerGuard>)> {
    if logging.file.is_empty() {
        return Ok((BoxMakeWriter::new(std::io::stderr), None));
    }

    let path = PathBuf::from(&logging.file);
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let rotation = match logging.rotation {
        LogRotation::Never => Rotation::NEVER,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Hourly => Rotation::HOURLY,
    };
    let appender =
        RollingFileAppender::new(rotation, dir, path.file_name().unwrap_or_default());
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((BoxMakeWriter::new(writer), Some(guard)))
}
