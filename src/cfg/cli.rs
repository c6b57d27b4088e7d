// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Command line: `redis-server-rs [config.yaml]`. A missing config falls
/// back to built-in defaults; logging is part of the same config file.
#[derive(Debug, Default, Clone)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
}

pub fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<CliArgs> {
    let mut out = CliArgs::default();
    for arg in args {
        if arg.starts_with("--") {
            bail!("unknown flag {arg}");
        }
        if out.config_path.is_some() {
            bail!("config path given twice ({arg})");
        }
        out.config_path = Some(resolve_config_path(&arg)?);
    }
    Ok(out)
}

pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let p = Path::new(rel);

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    let canon = abs
        .canonicalize()
        .with_context(|| format!("failed to canonicalize path {abs:?}"))?;

    Ok(canon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_flags() {
        assert!(parse_args(["--daemonize".to_string()]).is_err());
    }

    #[test]
    fn empty_args_are_fine() {
        let args = parse_args(std::iter::empty::<String>()).expect("parse");
        assert!(args.config_path.is_none());
    }
}
