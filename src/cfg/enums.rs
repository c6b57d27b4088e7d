// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// Boolean enumeration with string serialization support
///
/// Config files use "yes"/"no" switches; accept the usual spellings
/// including "true"/"false" and "1"/"0".
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum YesNo {
    #[serde(
        rename = "yes",
        alias = "Yes",
        alias = "YES",
        alias = "true",
        alias = "True",
        alias = "1"
    )]
    Yes,
    #[serde(
        rename = "no",
        alias = "No",
        alias = "NO",
        alias = "false",
        alias = "False",
        alias = "0"
    )]
    No,
}
impl fmt::Display for YesNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            YesNo::Yes => "yes",
            YesNo::No => "no",
        })
    }
}
impl From<bool> for YesNo {
    fn from(b: bool) -> Self {
        if b { YesNo::Yes } else { YesNo::No }
    }
}
impl YesNo {
    pub fn as_bool(self) -> bool {
        matches!(self, YesNo::Yes)
    }
}

/// Log verbosity in the server's own vocabulary, most to least chatty:
/// debug > verbose > notice > warning. Maps onto tracing filter levels.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    #[serde(rename = "debug", alias = "Debug", alias = "DEBUG")]
    Debug,
    #[serde(rename = "verbose", alias = "Verbose", alias = "VERBOSE")]
    Verbose,
    #[default]
    #[serde(rename = "notice", alias = "Notice", alias = "NOTICE")]
    Notice,
    #[serde(rename = "warning", alias = "Warning", alias = "WARNING")]
    Warning,
}
impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Debug => "debug",
            LogLevel::Verbose => "verbose",
            LogLevel::Notice => "notice",
            LogLevel::Warning => "warning",
        })
    }
}
impl LogLevel {
    /// Tracing filter directive for this verbosity.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "trace",
            LogLevel::Verbose => "debug",
            LogLevel::Notice => "info",
            LogLevel::Warning => "warn",
        }
    }
}

/// Shape of emitted log lines: classic text lines or one JSON object per
/// event for log shippers.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    #[serde(rename = "text", alias = "Text", alias = "TEXT")]
    Text,
    #[serde(rename = "json", alias = "Json", alias = "JSON")]
    Json,
}

/// Rotation policy for the `logfile` target.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogRotation {
    #[default]
    #[serde(rename = "never", alias = "Never", alias = "NEVER")]
    Never,
    #[serde(rename = "daily", alias = "Daily", alias = "DAILY")]
    Daily,
    #[serde(rename = "hourly", alias = "Hourly", alias = "HOURLY")]
    Hourly,
}
