use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::MaterializationError;
use crate::language::{LanguageProfile, apply_template};

use super::ExecutableArtifact;

/// Stages submitted sources under a common work directory
#[derive(Debug, Clone)]
pub struct Materializer {
    work_root: PathBuf,
}

impl Materializer {
    /// Creates the work directory if needed and resolves it to an absolute path
    pub fn new(work_root: impl AsRef<Path>) -> io::Result<Self> {
        std::fs::create_dir_all(&work_root)?;
        let work_root = std::path::absolute(work_root)?;
        log::info!("Staging submissions under {}", work_root.display());
        Ok(Self { work_root })
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    /// Writes `source` into a fresh, uniquely named compilation unit
    ///
    /// The entry-point rule of `profile`, if any, is applied as a plain
    /// textual substitution. A missing placeholder is not an error here.
    pub async fn materialize(
        &self,
        source: &[u8],
        profile: &LanguageProfile,
    ) -> Result<CompilationUnit, MaterializationError> {
        let source = String::from_utf8(source.to_vec())?;

        let token = Uuid::new_v4().simple().to_string();
        let entry = format!("{}{}", profile.entry_prefix, token);
        let dir = self.work_root.join(&token);

        // `create_dir` fails on an existing directory, so a token collision can never share a unit
        tokio::fs::create_dir(&dir)
            .await
            .map_err(MaterializationError::Storage)?;

        // From here on the directory is owned by the unit and removed on every exit path
        let unit = CompilationUnit {
            source_path: dir.join(format!("{entry}.{}", profile.extension)),
            output_path: dir.join(&entry),
            dir,
            entry,
            removed: false,
        };

        let source = match &profile.entry_point {
            Some(rule) => {
                let replacement = rule.replacement.replace("%ENTRY%", &unit.entry);
                source.replace(&rule.placeholder, &replacement)
            }
            None => source,
        };

        tokio::fs::write(&unit.source_path, format!("{source}\n"))
            .await
            .map_err(MaterializationError::Storage)?;

        log::debug!("Materialized {}", unit.source_path.display());
        Ok(unit)
    }
}

/// The ephemeral directory holding one run's source and build products
///
/// The directory and everything in it are deleted by [`CompilationUnit::remove`],
/// or when the unit is dropped without it.
#[derive(Debug)]
pub struct CompilationUnit {
    dir: PathBuf,
    entry: String,
    source_path: PathBuf,
    output_path: PathBuf,
    removed: bool,
}

impl CompilationUnit {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Unique entry-point name, also the stem of every file in the unit
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Where a native build is expected to write its binary
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Fills a command template with this unit's paths
    pub fn render(&self, template: &[String]) -> Vec<String> {
        let input = self.source_path.to_string_lossy();
        let output = self.output_path.to_string_lossy();
        let dir = self.dir.to_string_lossy();

        let mut mapping = HashMap::<&str, &str>::new();
        mapping.insert("%INPUT%", &input);
        mapping.insert("%OUTPUT%", &output);
        mapping.insert("%ENTRY%", &self.entry);
        mapping.insert("%DIR%", &dir);
        apply_template(template, &mapping)
    }

    /// Describes how to run this unit according to `profile`
    pub fn artifact(&self, profile: &LanguageProfile) -> ExecutableArtifact {
        let mut command = self.render(&profile.run).into_iter();
        ExecutableArtifact {
            program: command.next().unwrap_or_default(),
            args: command.collect(),
            work_dir: self.dir.clone(),
        }
    }
}

impl CompilationUnit {
    /// Deletes the unit on the blocking thread pool
    pub async fn remove(mut self) {
        self.removed = true;
        let res = tokio::fs::remove_dir_all(&self.dir).await;
        log_removal(&self.dir, res);
    }
}

// Fallback for units abandoned mid-run, e.g. when the request is dropped
impl Drop for CompilationUnit {
    fn drop(&mut self) {
        if !self.removed {
            log_removal(&self.dir, std::fs::remove_dir_all(&self.dir));
        }
    }
}

fn log_removal(dir: &Path, res: io::Result<()>) {
    match res {
        Ok(()) => log::debug!("Removed compilation unit {}", dir.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove compilation unit {}: {e}", dir.display()),
    }
}
