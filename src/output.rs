use crate::error::{RunWarning, StitchError};

use clap::ValueEnum;
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_STEM: &str = "stitched_output";
pub const DEFAULT_OUTPUT_EXTENSION: &str = "mp4";

/// What to do when the directory that should hold the output is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lower")]
pub enum DestPolicy {
    Create,
    Require,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutput {
    pub path: PathBuf,
    pub warnings: Vec<RunWarning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub path: PathBuf,
    pub parent_created: bool,
}

/// Pure part of the resolution: no filesystem access beyond reading the cwd.
///
/// An empty `output` counts as absent. A bare file name goes to `dest` when
/// given, else to `source_root`; a name with a directory component wins over
/// `dest`, which is then reported as ignored.
pub fn resolve_output_path(
    output: Option<&Path>,
    dest: Option<&Path>,
    source_root: &Path,
) -> Result<ResolvedOutput, StitchError> {
    let mut warnings = vec![];
    let default_name = PathBuf::from(format!("{DEFAULT_OUTPUT_STEM}.{DEFAULT_OUTPUT_EXTENSION}"));
    let name = output
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or(default_name);

    let has_dir = name
        .parent()
        .is_some_and(|parent| !parent.as_os_str().is_empty());

    let joined = if has_dir {
        if let Some(dest) = dest {
            warnings.push(RunWarning::DestinationIgnored(dest.to_path_buf()));
        }
        name
    } else if let Some(dest) = dest {
        dest.join(name)
    } else {
        source_root.join(name)
    };

    Ok(ResolvedOutput {
        path: std::path::absolute(joined)?,
        warnings,
    })
}

impl ResolvedOutput {
    /// Make sure the output's parent directory exists, per `policy`.
    pub fn prepare(&self, policy: DestPolicy) -> Result<OutputTarget, StitchError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => {
                return Ok(OutputTarget {
                    path: self.path.clone(),
                    parent_created: false,
                })
            }
        };

        if parent.is_dir() {
            return Ok(OutputTarget {
                path: self.path.clone(),
                parent_created: false,
            });
        }
        if parent.exists() || policy == DestPolicy::Require {
            return Err(StitchError::DestinationNotFound(parent.to_path_buf()));
        }

        std::fs::create_dir_all(parent).map_err(|source| StitchError::DestinationCreate {
            path: parent.to_path_buf(),
            source,
        })?;
        Ok(OutputTarget {
            path: self.path.clone(),
            parent_created: true,
        })
    }
}
