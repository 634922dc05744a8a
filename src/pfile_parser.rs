use crate::bytecode;
use crate::descramble::descramble;
use crate::err::{PFileError, Result, StatusCode};
use crate::formatter::{BlockFormatter, FormatOptions, RawFormatter, SourceFormatter};
use crate::inflate::{DecodedBlock, inflate};
use crate::name_table::NameTable;
use crate::pfile::PFile;

use log::{debug, info};
use std::any::Any;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tempfile::NamedTempFile;

/// Extension given to decoded source files.
pub const SOURCE_EXTENSION: &str = "m";

const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

/// A flag shared between a running conversion and whoever may want to abort it.
///
/// The parser checks it between stages; a tripped token yields [`PFileError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct ParserSettings {
    /// Reject containers whose minor version tag is not `v00.00`.
    enforce_minor_version: bool,
    format_options: FormatOptions,
    /// Skip formatting and emit the decoded token text as is.
    raw_output: bool,
    /// Upper bound for the buffer pre-allocated from the header's declared size.
    max_decompressed_size: usize,
    cancellation: CancellationToken,
    formatter: Option<Arc<dyn SourceFormatter>>,
}

impl Default for ParserSettings {
    fn default() -> Self {
        ParserSettings {
            enforce_minor_version: true,
            format_options: FormatOptions::default(),
            raw_output: false,
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
            cancellation: CancellationToken::default(),
            formatter: None,
        }
    }
}

impl fmt::Debug for ParserSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserSettings")
            .field("enforce_minor_version", &self.enforce_minor_version)
            .field("format_options", &self.format_options)
            .field("raw_output", &self.raw_output)
            .field("max_decompressed_size", &self.max_decompressed_size)
            .field("cancellation", &self.cancellation)
            .field("custom_formatter", &self.formatter.is_some())
            .finish()
    }
}

impl ParserSettings {
    pub fn new() -> Self {
        ParserSettings::default()
    }

    pub fn enforce_minor_version(mut self, enforce_minor_version: bool) -> Self {
        self.enforce_minor_version = enforce_minor_version;
        self
    }

    pub fn format_options(mut self, format_options: FormatOptions) -> Self {
        self.format_options = format_options;
        self
    }

    pub fn raw_output(mut self, raw_output: bool) -> Self {
        self.raw_output = raw_output;
        self
    }

    pub fn max_decompressed_size(mut self, max_decompressed_size: usize) -> Self {
        self.max_decompressed_size = max_decompressed_size;
        self
    }

    pub fn cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Replaces the built-in [`BlockFormatter`]. Ignored when `raw_output` is set.
    pub fn formatter(mut self, formatter: Arc<dyn SourceFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn should_enforce_minor_version(&self) -> bool {
        self.enforce_minor_version
    }

    pub fn get_format_options(&self) -> &FormatOptions {
        &self.format_options
    }

    pub fn is_raw_output(&self) -> bool {
        self.raw_output
    }

    pub fn get_cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    fn format(&self, text: &str) -> String {
        match (&self.formatter, self.raw_output) {
            (_, true) => RawFormatter.format(text),
            (Some(formatter), false) => formatter.format(text),
            (None, false) => BlockFormatter::new(self.format_options).format(text),
        }
    }
}

pub struct PFileParser {
    pfile: PFile,
    config: Arc<ParserSettings>,
}

impl fmt::Debug for PFileParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PFileParser")
            .field("header", &self.pfile.header)
            .field("payload_len", &self.pfile.payload.len())
            .field("config", &self.config)
            .finish()
    }
}

impl PFileParser {
    /// Reads the whole container into memory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(PFileParser {
            pfile: PFile::from_path(path)?,
            config: Arc::new(ParserSettings::default()),
        })
    }

    pub fn from_buffer(buffer: Vec<u8>) -> Result<Self> {
        Ok(PFileParser {
            pfile: PFile::from_buffer(buffer)?,
            config: Arc::new(ParserSettings::default()),
        })
    }

    pub fn with_configuration(mut self, configuration: ParserSettings) -> Self {
        self.config = Arc::new(configuration);
        self
    }

    pub fn pfile(&self) -> &PFile {
        &self.pfile
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        if self.config.cancellation.is_cancelled() {
            return Err(PFileError::Cancelled);
        }
        Ok(())
    }

    /// Validates the header, descrambles and decompresses the payload.
    pub fn decoded_block(&self) -> Result<DecodedBlock> {
        self.ensure_not_cancelled()?;
        self.pfile.validate(self.config.enforce_minor_version)?;

        let descrambled = descramble(&self.pfile.payload, self.pfile.header.scramble_key);
        self.ensure_not_cancelled()?;

        inflate(
            &descrambled,
            self.pfile.header.decompressed_size,
            self.config.max_decompressed_size,
        )
    }

    /// Decodes the container into the raw, unformatted source text.
    pub fn decode_raw(&self) -> Result<String> {
        let block = self.decoded_block()?;
        self.ensure_not_cancelled()?;

        let names = NameTable::build(&block.counts, block.region()).map_err(PFileError::Decode)?;
        let code = &block.region()[names.code_start()..];
        debug!("Opcode stream is {} bytes", code.len());
        self.ensure_not_cancelled()?;

        bytecode::decode_to_string(code, &names).map_err(PFileError::Decode)
    }

    /// Decodes the container and runs the configured formatter over the result.
    pub fn decode_formatted(&self) -> Result<String> {
        let raw = self.decode_raw()?;
        self.ensure_not_cancelled()?;
        Ok(self.config.format(&raw))
    }

    /// Decodes and writes the formatted source to `output`, creating parent directories.
    ///
    /// Nothing is written unless every stage succeeded.
    pub fn write_to(&self, output: impl AsRef<Path>) -> Result<()> {
        let source = self.decode_formatted()?;
        self.ensure_not_cancelled()?;
        write_atomically(output.as_ref(), source.as_bytes())
    }
}

/// Writes through a temporary sibling file so a failure never leaves a partial output.
fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let write_failure = |source: io::Error| PFileError::WriteFailure {
        path: path.to_path_buf(),
        source,
    };

    if path.is_dir() {
        return Err(write_failure(io::Error::other(
            "there is a directory at the output path, refusing to overwrite",
        )));
    }

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(write_failure)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(write_failure)?;
    tmp.write_all(contents).map_err(write_failure)?;
    tmp.flush().map_err(write_failure)?;
    tmp.persist(path).map_err(|e| write_failure(e.error))?;

    Ok(())
}

/// `input` with its extension replaced by [`SOURCE_EXTENSION`].
pub fn default_output_path(input: impl AsRef<Path>) -> PathBuf {
    input.as_ref().with_extension(SOURCE_EXTENSION)
}

/// Result of a [`parse`] call: a status code and a message fit for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutcome {
    pub code: StatusCode,
    pub message: String,
}

impl ParseOutcome {
    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    fn from_error(err: &PFileError) -> Self {
        ParseOutcome {
            code: err.status_code(),
            message: err.to_string(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Converts the container at `input` into formatted source at `output`.
///
/// Never panics and never returns an error: every failure is folded into the outcome.
pub fn parse(input: impl AsRef<Path>, output: impl AsRef<Path>) -> ParseOutcome {
    parse_with_settings(input, output, ParserSettings::default())
}

pub fn parse_with_settings(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    settings: ParserSettings,
) -> ParseOutcome {
    let input = input.as_ref();
    let output = output.as_ref();

    let run = || -> Result<()> {
        PFileParser::from_path(input)?
            .with_configuration(settings)
            .write_to(output)
    };

    let result = panic::catch_unwind(AssertUnwindSafe(run)).unwrap_or_else(|payload| {
        Err(PFileError::Panicked {
            message: panic_message(payload.as_ref()),
        })
    });

    match result {
        Ok(()) => {
            info!("Decoded {} -> {}", input.display(), output.display());
            ParseOutcome {
                code: StatusCode::Success,
                message: format!("Saved to {}", output.display()),
            }
        }
        Err(e) => {
            debug!("Failed to decode {}: {}", input.display(), e);
            ParseOutcome::from_error(&e)
        }
    }
}
