//! Decoder for compiled MATLAB/Octave p-code containers.
//!
//! A container is decoded in a straight pipeline:
//! header -> descramble -> zlib inflate -> name table -> opcode stream -> text -> formatter.
//!
//! ```no_run
//! use ptom::{PFileParser, ParserSettings};
//!
//! let parser = PFileParser::from_path("model.p")?
//!     .with_configuration(ParserSettings::new().raw_output(true));
//! println!("{}", parser.decode_formatted()?);
//! # Ok::<(), ptom::err::PFileError>(())
//! ```

pub use bytecode::{BytecodeDecoder, Opcode};
pub use descramble::descramble;
pub use err::{DeserializationError, PFileError, StatusCode};
pub use formatter::{BlockFormatter, FormatOptions, IndentMode, RawFormatter, SourceFormatter};
pub use inflate::{DecodedBlock, inflate};
pub use name_table::NameTable;
pub use pfile::PFile;
pub use pfile_header::PFileHeader;
pub use pfile_parser::{
    CancellationToken, PFileParser, ParseOutcome, ParserSettings, default_output_path, parse,
    parse_with_settings,
};

pub mod bytecode;
pub mod descramble;
pub mod err;
pub mod formatter;
pub mod inflate;
pub mod name_table;
pub mod pfile;
pub mod pfile_header;
pub mod pfile_parser;
pub mod tables;

mod utils;

#[cfg(test)]
use std::sync::Once;

#[cfg(test)]
static LOGGER_INIT: Once = Once::new();

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
#[cfg(test)]
pub fn ensure_env_logger_initialized() {
    use std::io::Write;

    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .init();
    });
}
