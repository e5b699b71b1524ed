//! # Supfile Loader
//!
//! Locates the Supfile for a run, parses it and folds every declared include
//! into it. Includes are loaded recursively: an included document is fully
//! resolved (its own includes folded in) before it becomes the base layer of
//! the document that includes it.

use crate::constants::{DEFAULT_SUPFILE, FALLBACK_SUPFILE, MAX_INCLUDE_DEPTH};
use crate::core::supfile::{self, LoadError, Supfile};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Returns the Supfile to load for a run started in `working_dir`.
///
/// An explicit path is taken as given (relative to `working_dir`). Otherwise
/// `Supfile` is preferred over `Supfile.yml`.
pub fn discover(working_dir: &Path, explicit: Option<&Path>) -> Result<PathBuf, LoadError> {
    if let Some(path) = explicit {
        return Ok(working_dir.join(path));
    }

    for candidate in [DEFAULT_SUPFILE, FALLBACK_SUPFILE] {
        let path = working_dir.join(candidate);
        if path.is_file() {
            log::debug!("Using Supfile at '{}'", path.display());
            return Ok(path);
        }
    }

    Err(LoadError::NotFound {
        dir: working_dir.display().to_string(),
        tried: format!("{}, {}", DEFAULT_SUPFILE, FALLBACK_SUPFILE),
    })
}

/// Reads and fully resolves a Supfile and everything it includes.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Canonical paths of the documents currently being resolved, outermost first.
    stack: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the document at `path` with all its includes folded in.
    ///
    /// Legacy-field notices of every loaded document go to `diagnostics`.
    pub fn load(&mut self, path: &Path, diagnostics: &mut dyn Write) -> Result<Supfile, LoadError> {
        let canonical = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

        if self.stack.contains(&canonical) {
            let chain = self
                .stack
                .iter()
                .chain(std::iter::once(&canonical))
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(LoadError::IncludeCycle { chain });
        }
        if self.stack.len() >= MAX_INCLUDE_DEPTH {
            return Err(LoadError::IncludeDepth(MAX_INCLUDE_DEPTH));
        }

        let data = fs::read(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        log::debug!("Loading Supfile '{}' ({} bytes)", path.display(), data.len());
        let mut conf = Supfile::parse(&data, diagnostics)?;

        if conf.includes.is_empty() {
            return Ok(conf);
        }

        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.stack.push(canonical);
        let result = self.fold_includes(&mut conf, &base_dir, diagnostics);
        self.stack.pop();
        result.map(|()| conf)
    }

    /// Applies every include of `conf` in declaration order. Each included
    /// document is the base layer and the growing `conf` is the override.
    fn fold_includes(
        &mut self,
        conf: &mut Supfile,
        base_dir: &Path,
        diagnostics: &mut dyn Write,
    ) -> Result<(), LoadError> {
        for include in conf.includes.clone() {
            let include_path = base_dir.join(&include.supfile);
            log::debug!(
                "Including '{}' (injecting: {:?})",
                include_path.display(),
                include.env
            );
            let included = self
                .load(&include_path, diagnostics)
                .map_err(|source| LoadError::Include {
                    path: include.supfile.clone(),
                    source: Box::new(source),
                })?;
            *conf = supfile::merge(included, conf, &include.env);
        }
        Ok(())
    }
}
