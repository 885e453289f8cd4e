/*!
# FileTracer - File-level instrumentation driver

Reads C sources, instruments them and writes the result next to, or in a
mirror of, the input tree.
*/

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use crate::InstrumentConfig;

use super::instrument_source;

/// File-based instrumentation driver
///
/// Each file is instrumented independently. A file that fails is reported and
/// never written, so no partially instrumented output is left behind.
pub struct FileTracer {
    config: InstrumentConfig,
    source_extensions: Vec<String>,
    preserve_structure: bool,
}

impl FileTracer {
    pub fn new(config: InstrumentConfig) -> Self {
        Self {
            config,
            source_extensions: vec!["c".to_string()],
            preserve_structure: true,
        }
    }

    /// Set the file extensions to process
    pub fn source_extensions(mut self, extensions: Vec<String>) -> Self {
        self.source_extensions = extensions;
        self
    }

    /// Whether to preserve directory structure in output
    pub fn preserve_structure(mut self, preserve: bool) -> Self {
        self.preserve_structure = preserve;
        self
    }

    /// Instrument every matching file below `source_dir` into `output_dir`
    pub fn transform_directory<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        source_dir: P,
        output_dir: Q,
    ) -> Result<InstrumentationSummary> {
        let source_path = source_dir.as_ref();
        let output_path = output_dir.as_ref();

        if !source_path.is_dir() {
            return Err(anyhow!(
                "Source directory does not exist: {}",
                source_path.display()
            ));
        }

        fs::create_dir_all(output_path)?;

        let mut summary = InstrumentationSummary::new();
        self.transform_directory_recursive(source_path, output_path, source_path, &mut summary)?;

        info!(
            "instrumented {}/{} file(s) from {}",
            summary.files_instrumented,
            summary.files_processed,
            source_path.display()
        );
        Ok(summary)
    }

    /// Instrument a single file
    pub fn transform_file<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        source_file: P,
        output_file: Q,
    ) -> Result<InstrumentationSummary> {
        let source_path = source_file.as_ref();
        let output_path = output_file.as_ref();

        let source = fs::read_to_string(source_path)
            .with_context(|| format!("Failed to read {}", source_path.display()))?;
        let instrumented = instrument_source(&source, &self.config)
            .with_context(|| format!("Failed to instrument {}", source_path.display()))?;

        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(output_path, &instrumented.code)
            .with_context(|| format!("Failed to write {}", output_path.display()))?;

        for diagnostic in &instrumented.diagnostics {
            warn!("{}:{}", source_path.display(), diagnostic);
        }
        info!(
            "{} -> {} ({} insertion(s))",
            source_path.display(),
            output_path.display(),
            instrumented.patches.len()
        );

        Ok(InstrumentationSummary {
            files_processed: 1,
            files_instrumented: 1,
            insertions: instrumented.patches.len() as u64,
            diagnostics: instrumented.diagnostics.len() as u64,
            errors: Vec::new(),
        })
    }

    fn transform_directory_recursive(
        &mut self,
        current_dir: &Path,
        output_dir: &Path,
        source_root: &Path,
        summary: &mut InstrumentationSummary,
    ) -> Result<()> {
        let mut entries = fs::read_dir(current_dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort();

        for path in entries {
            if path.is_dir() {
                self.transform_directory_recursive(&path, output_dir, source_root, summary)?;
            } else if self.should_process_file(&path) {
                let output_file = if self.preserve_structure {
                    output_dir.join(path.strip_prefix(source_root)?)
                } else {
                    match path.file_name() {
                        Some(name) => output_dir.join(name),
                        None => continue,
                    }
                };

                match self.transform_file(&path, &output_file) {
                    Ok(file_summary) => summary.merge(file_summary),
                    Err(e) => {
                        warn!("{e:#}");
                        summary.files_processed += 1;
                        summary.errors.push(format!("{}: {e:#}", path.display()));
                    }
                }
            }
        }

        Ok(())
    }

    /// Check if a file should be processed based on its extension
    fn should_process_file(&self, path: &Path) -> bool {
        match path.extension() {
            Some(extension) => {
                let ext_str = extension.to_string_lossy().to_lowercase();
                self.source_extensions
                    .iter()
                    .any(|ext| ext.to_lowercase() == ext_str)
            }
            None => false,
        }
    }
}

impl Default for FileTracer {
    fn default() -> Self {
        Self::new(InstrumentConfig::default())
    }
}

/// Summary of a batch of instrumented files
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstrumentationSummary {
    pub files_processed: u64,
    pub files_instrumented: u64,
    pub insertions: u64,
    pub diagnostics: u64,
    pub errors: Vec<String>,
}

impl InstrumentationSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, other: InstrumentationSummary) {
        self.files_processed += other.files_processed;
        self.files_instrumented += other.files_instrumented;
        self.insertions += other.insertions;
        self.diagnostics += other.diagnostics;
        self.errors.extend(other.errors);
    }

    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// `dir/prog.c` becomes `dir/prog-instrumented.c`.
pub fn instrumented_path<P: AsRef<Path>>(program: P) -> PathBuf {
    let program = program.as_ref();
    let stem = program
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match program.extension() {
        Some(ext) => format!("{stem}-instrumented.{}", ext.to_string_lossy()),
        None => format!("{stem}-instrumented"),
    };
    program.with_file_name(name)
}
