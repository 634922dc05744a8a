#![allow(dead_code)]
use flate2::Compression;
use flate2::write::ZlibEncoder;
use std::io::Write;
use std::path::{Path, PathBuf};

use std::sync::Once;

static LOGGER_INIT: Once = Once::new();

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
pub fn ensure_env_logger_initialized() {
    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .init();
    });
}

pub const FUNCTION: u8 = 1;
pub const IF: u8 = 3;
pub const END: u8 = 8;
pub const ELSE: u8 = 9;
pub const SEMICOLON: u8 = 50;
pub const LPAREN: u8 = 52;
pub const RPAREN: u8 = 53;
pub const MINUS: u8 = 71;
pub const GT: u8 = 90;
pub const ASSIGN: u8 = 95;
pub const NEWLINE: u8 = 100;

/// Two-byte reference to name-table slot `id`.
pub fn ident(id: usize) -> [u8; 2] {
    if id < 128 {
        [0x80, 0x80 + id as u8]
    } else {
        let id = id - 128;
        [0x81 + (id / 256) as u8, (id % 256) as u8]
    }
}

/// Builds synthetic p-files: the producer side of the pipeline, run in reverse.
#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    groups: [Vec<String>; 7],
    code: Vec<u8>,
    scramble_key: u32,
    minor_version: [u8; 6],
    declared_compressed: Option<u32>,
    declared_decompressed: Option<u32>,
    raw_payload: Option<Vec<u8>>,
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        ContainerBuilder {
            groups: Default::default(),
            code: Vec::new(),
            scramble_key: 0x0002_a000,
            minor_version: *b"v00.00",
            declared_compressed: None,
            declared_decompressed: None,
            raw_payload: None,
        }
    }
}

impl ContainerBuilder {
    pub fn new() -> Self {
        ContainerBuilder::default()
    }

    pub fn names(mut self, group: usize, names: &[&str]) -> Self {
        self.groups[group].extend(names.iter().map(|s| s.to_string()));
        self
    }

    pub fn code(mut self, parts: &[&[u8]]) -> Self {
        self.code = parts.concat();
        self
    }

    pub fn scramble_key(mut self, key: u32) -> Self {
        self.scramble_key = key;
        self
    }

    pub fn minor_version(mut self, minor: &[u8; 6]) -> Self {
        self.minor_version = *minor;
        self
    }

    pub fn declared_compressed(mut self, len: u32) -> Self {
        self.declared_compressed = Some(len);
        self
    }

    pub fn declared_decompressed(mut self, len: u32) -> Self {
        self.declared_decompressed = Some(len);
        self
    }

    /// Uses `payload` verbatim (after descrambling) instead of compressing the block.
    pub fn raw_payload(mut self, payload: Vec<u8>) -> Self {
        self.raw_payload = Some(payload);
        self
    }

    /// Decompressed block: counts, NUL-terminated names, opcode stream.
    pub fn block(&self) -> Vec<u8> {
        let mut block = Vec::new();
        for group in &self.groups {
            block.extend_from_slice(&(group.len() as u32).to_be_bytes());
        }
        for name in self.groups.iter().flatten() {
            block.extend_from_slice(name.as_bytes());
            block.push(0);
        }
        block.extend_from_slice(&self.code);
        block
    }

    pub fn build(&self) -> Vec<u8> {
        let block = self.block();

        let compressed = match &self.raw_payload {
            Some(payload) => payload.clone(),
            None => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
                encoder.write_all(&block).unwrap();
                encoder.finish().unwrap()
            }
        };
        let payload = ptom::descramble(&compressed, self.scramble_key);

        let mut data = Vec::with_capacity(32 + payload.len());
        data.extend_from_slice(b"v01.00");
        data.extend_from_slice(&self.minor_version);
        data.extend_from_slice(&self.scramble_key.to_be_bytes());
        data.extend_from_slice(&[0; 8]);
        data.extend_from_slice(
            &self
                .declared_compressed
                .unwrap_or(payload.len() as u32)
                .to_be_bytes(),
        );
        data.extend_from_slice(
            &self
                .declared_decompressed
                .unwrap_or(block.len() as u32)
                .to_be_bytes(),
        );
        data.extend_from_slice(&payload);
        data
    }

    pub fn write_to(&self, dir: &Path, file_name: &str) -> PathBuf {
        let path = dir.join(file_name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

/// `x=1;`
pub fn assignment_container() -> ContainerBuilder {
    ContainerBuilder::new()
        .names(0, &["x"])
        .names(1, &["1"])
        .code(&[&ident(0), &[ASSIGN], &ident(1), &[SEMICOLON]])
}

/// A small function with an if/else block.
pub fn function_container() -> ContainerBuilder {
    // 0: y, 1: absval, 2: x, 3: 0
    ContainerBuilder::new()
        .names(0, &["y", "absval"])
        .names(2, &["x"])
        .names(5, &["0"])
        .code(&[
            &[FUNCTION],
            &ident(0),
            &[ASSIGN],
            &ident(1),
            &[LPAREN],
            &ident(2),
            &[RPAREN, NEWLINE, IF],
            &ident(2),
            &[GT],
            &ident(3),
            &[NEWLINE],
            &ident(0),
            &[ASSIGN],
            &ident(2),
            &[SEMICOLON, NEWLINE, ELSE, NEWLINE],
            &ident(0),
            &[ASSIGN, MINUS],
            &ident(2),
            &[SEMICOLON, NEWLINE, END, NEWLINE, END, NEWLINE],
        ])
}
