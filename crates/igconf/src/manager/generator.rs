//! Dynamic-layer generator invocation.
//!
//! A dynamic layer's final header is produced by running its generator as
//! `generator input_file output_file`. The command string is split with
//! shell-like quoting (no expansion) and awaited to completion.

use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::Error;

/// Runs a layer generator to completion.
///
/// # Errors
///
/// Returns [`Error::GeneratorCommand`] for empty/unparseable commands,
/// [`Error::GeneratorNotFound`] when the executable is missing and
/// [`Error::GeneratorFailed`] on a non-zero exit.
pub fn run_generator(
    layer: &str,
    command: &str,
    input: &Path,
    output: &Path,
) -> Result<(), Error> {
    let argv = shlex::split(command).unwrap_or_default();
    let Some((program, args)) = argv.split_first() else {
        return Err(Error::GeneratorCommand {
            layer: layer.to_string(),
        });
    };

    debug!(layer, command, output = %output.display(), "running layer generator");

    let status = Command::new(program)
        .args(args)
        .arg(input)
        .arg(output)
        .status()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::GeneratorNotFound {
                    layer: layer.to_string(),
                    command: command.to_string(),
                }
            } else {
                Error::io(Path::new(program), e)
            }
        })?;

    if !status.success() {
        return Err(Error::GeneratorFailed {
            layer: layer.to_string(),
            command: command.to_string(),
            code: status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string()),
        });
    }
    Ok(())
}
