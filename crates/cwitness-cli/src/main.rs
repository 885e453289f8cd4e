use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use cwitness_core::{init_tracing, instrumented_path, FileTracer, InstrumentConfig, RestorePolicy};
use tracing::error;

fn cli() -> Command {
    Command::new("cwitness-instrument")
        .version(cwitness_core::VERSION)
        .about("Instrument a C program so that it prints an execution trace to stderr")
        .arg(
            Arg::new("program")
                .value_name("PROGRAM")
                .help("C source file, or a directory of them")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .value_name("OUTPUT")
                .help("Output file (default: <name>-instrumented.c next to PROGRAM) or directory")
                .index(2),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("JSON file with instrumentation settings"),
        )
        .arg(
            Arg::new("error-function")
                .long("error-function")
                .value_name("NAME")
                .help("Additional function whose call marks a property violation")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("strict-restore")
                .long("strict-restore")
                .help("Fail when a masked construct cannot be restored")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("extension")
                .long("extension")
                .value_name("EXT")
                .help("File extension to instrument when PROGRAM is a directory (default: c)")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("flatten")
                .long("flatten")
                .help("Write every instrumented file directly into OUTPUT")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-mask")
                .long("no-mask")
                .help("Parse the program as-is, without masking GNU extensions")
                .action(ArgAction::SetTrue),
        )
}

/// Settings from `--config`, with command line flags applied on top
fn build_config(matches: &ArgMatches) -> Result<InstrumentConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {path}"))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Invalid config file {path}"))?
        }
        None => InstrumentConfig::default(),
    };

    if let Some(names) = matches.get_many::<String>("error-function") {
        for name in names {
            config = config.with_error_function(name.clone());
        }
    }
    if matches.get_flag("strict-restore") {
        config = config.with_restore_policy(RestorePolicy::Abort);
    }
    if matches.get_flag("no-mask") {
        config.mask_extensions = false;
    }
    Ok(config)
}

/// Directory walking options on top of `config`
fn build_tracer(matches: &ArgMatches, config: InstrumentConfig) -> FileTracer {
    let mut tracer = FileTracer::new(config).preserve_structure(!matches.get_flag("flatten"));
    if let Some(extensions) = matches.get_many::<String>("extension") {
        tracer = tracer.source_extensions(extensions.cloned().collect());
    }
    tracer
}

fn main() -> Result<()> {
    init_tracing();

    let matches = cli().get_matches();
    let config = build_config(&matches)?;

    let program = PathBuf::from(
        matches
            .get_one::<String>("program")
            .context("PROGRAM is required")?,
    );
    let output = matches.get_one::<String>("output").map(PathBuf::from);

    let mut tracer = build_tracer(&matches, config);
    if program.is_dir() {
        let Some(output) = output else {
            bail!("OUTPUT directory is required when PROGRAM is a directory");
        };
        let summary = tracer.transform_directory(&program, &output)?;
        for error in &summary.errors {
            error!("{error}");
        }
        if !summary.success() {
            bail!(
                "{} of {} file(s) failed",
                summary.errors.len(),
                summary.files_processed
            );
        }
    } else {
        let output = output.unwrap_or_else(|| instrumented_path(&program));
        tracer.transform_file(&program, &output)?;
        println!("{}", output.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_overlay_defaults() {
        let matches = cli()
            .try_get_matches_from([
                "cwitness-instrument",
                "prog.c",
                "--error-function",
                "fail",
                "--error-function",
                "abort_here",
                "--strict-restore",
                "--no-mask",
            ])
            .unwrap();
        let config = build_config(&matches).unwrap();

        assert!(config.is_error_function("reach_error"));
        assert!(config.is_error_function("fail"));
        assert!(config.is_error_function("abort_here"));
        assert_eq!(config.restore_policy, RestorePolicy::Abort);
        assert!(!config.mask_extensions);
    }

    #[test]
    fn test_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"error_functions": ["oops"], "header": ""}"#).unwrap();

        let matches = cli()
            .try_get_matches_from(["cwitness-instrument", "prog.c", "--config", path.to_str().unwrap()])
            .unwrap();
        let config = build_config(&matches).unwrap();

        assert_eq!(config.error_functions, vec!["oops".to_string()]);
        assert_eq!(config.header, "");
        assert_eq!(config.restore_policy, RestorePolicy::LeaveMasked);
    }

    #[test]
    fn test_directory_options() {
        let src = tempfile::TempDir::new().unwrap();
        let dst = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(src.path().join("sub")).unwrap();
        fs::write(src.path().join("sub/task.i"), "int main() {\n  x = 1;\n}\n").unwrap();
        fs::write(src.path().join("sub/skip.c"), "int main() {\n  x = 1;\n}\n").unwrap();

        let matches = cli()
            .try_get_matches_from(["cwitness-instrument", "tasks", "--extension", "i", "--flatten"])
            .unwrap();
        let mut tracer = build_tracer(&matches, InstrumentConfig::default());
        let summary = tracer.transform_directory(src.path(), dst.path()).unwrap();

        assert_eq!(summary.files_processed, 1);
        assert!(dst.path().join("task.i").exists());
        assert!(!dst.path().join("skip.c").exists());
    }

    #[test]
    fn test_program_is_required() {
        assert!(cli().try_get_matches_from(["cwitness-instrument"]).is_err());
    }
}
