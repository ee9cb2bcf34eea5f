use std::{fs::OpenOptions, path::Path, sync::Mutex};

use expensedb_core::BoxError;
use tracing_subscriber::{
    fmt::writer::{BoxMakeWriter, MakeWriterExt},
    EnvFilter,
};

use crate::config::LoggingConfig;

/// Builds one writer that copies every line to each destination. Files are
/// created if missing and appended to.
fn make_writer(outputs: &[String]) -> Result<(BoxMakeWriter, bool), BoxError> {
    let mut writer: Option<BoxMakeWriter> = None;
    let mut to_file = false;

    for output in outputs.iter().map(|o| o.trim()).filter(|o| !o.is_empty()) {
        let next = match output {
            "stderr" => BoxMakeWriter::new(std::io::stderr),
            "stdout" => BoxMakeWriter::new(std::io::stdout),
            path => {
                if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                to_file = true;
                BoxMakeWriter::new(Mutex::new(file))
            }
        };
        writer = Some(match writer {
            Some(current) => BoxMakeWriter::new(current.and(next)),
            None => next,
        });
    }

    Ok((writer.unwrap_or_else(|| BoxMakeWriter::new(std::io::stderr)), to_file))
}

/// Installs the global subscriber. `RUST_LOG` wins over the configured level.
/// Defaults to stderr so command output on stdout stays machine readable.
pub fn init(config: &LoggingConfig) -> Result<(), BoxError> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;
    let (writer, to_file) = make_writer(&config.output)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!to_file)
        .with_writer(writer);

    if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
}
