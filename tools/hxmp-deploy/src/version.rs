//! Semantic version bumps.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;

/// Which part of `major.minor.patch` to increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Bump {
    Major,
    Minor,
    Patch,
}

/// Bump `version`. Lower parts reset to zero.
pub fn bump_version(version: &str, bump: Bump) -> Result<String> {
    let parts: Vec<&str> = version.split('.').collect();
    let [major, minor, patch] = parts.as_slice() else {
        bail!("version {version:?} is not major.minor.patch");
    };

    let parse = |part: &str| -> Result<u64> {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            bail!("version {version:?} has a non-numeric part {part:?}");
        }
        part.parse()
            .with_context(|| format!("version part {part:?} out of range"))
    };
    let (major, minor, patch) = (parse(*major)?, parse(*minor)?, parse(*patch)?);

    let (major, minor, patch) = match bump {
        Bump::Major => (major + 1, 0, 0),
        Bump::Minor => (major, minor + 1, 0),
        Bump::Patch => (major, minor, patch + 1),
    };
    Ok(format!("{major}.{minor}.{patch}"))
}
