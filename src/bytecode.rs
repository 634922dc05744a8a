//! Opcode stream -> source text fragments.
//!
//! The stream mixes two instruction widths:
//! - a byte with the high bit clear is a one-byte token, looked up in [`TOKEN_TABLE`];
//! - a byte with the high bit set starts a two-byte reference into the [`NameTable`].
//!
//! Identifiers carry no delimiter of their own, so a single space is emitted after an identifier
//! when the next instruction is another identifier or a keyword-like token.
//!
//! [`TOKEN_TABLE`]: crate::tables::TOKEN_TABLE

use crate::err::{DeserializationError, DeserializationResult};
use crate::name_table::NameTable;
use crate::tables;

use log::trace;
use std::iter::FusedIterator;

const IDENTIFIER_FLAG: u8 = 0x80;

/// A single decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Token(u8),
    Identifier(i64),
}

#[inline]
fn is_identifier(byte: u8) -> bool {
    byte & IDENTIFIER_FLAG != 0
}

/// Name-table index of the two-byte reference `[byte0, byte1]`.
///
/// Can be negative for `byte0 == 0x80, byte1 < 0x80`; callers treat that as out of range.
#[inline]
pub fn identifier_index(byte0: u8, byte1: u8) -> i64 {
    128 + 256 * (i64::from(byte0 & !IDENTIFIER_FLAG) - 1) + i64::from(byte1)
}

/// Reads the instruction at `offset`, returning it with its width in bytes.
pub fn read_opcode(code: &[u8], offset: usize) -> DeserializationResult<Option<(Opcode, usize)>> {
    let Some(&byte0) = code.get(offset) else {
        return Ok(None);
    };

    if is_identifier(byte0) {
        let &byte1 = code
            .get(offset + 1)
            .ok_or(DeserializationError::TruncatedIdentifierReference { offset })?;
        return Ok(Some((Opcode::Identifier(identifier_index(byte0, byte1)), 2)));
    }

    if usize::from(byte0) < tables::TOKEN_COUNT {
        return Ok(Some((Opcode::Token(byte0), 1)));
    }

    Err(DeserializationError::UnknownOpcode {
        offset,
        value: byte0,
    })
}

/// Iterator over the text fragments of an opcode stream.
///
/// Empty token texts are skipped. After the first error the iterator is exhausted.
pub struct BytecodeDecoder<'a> {
    code: &'a [u8],
    names: &'a NameTable,
    pos: usize,
    pending_space: bool,
}

impl<'a> BytecodeDecoder<'a> {
    pub fn new(code: &'a [u8], names: &'a NameTable) -> Self {
        BytecodeDecoder {
            code,
            names,
            pos: 0,
            pending_space: false,
        }
    }

    /// Current offset into the opcode stream.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn space_follows_identifier(&self) -> bool {
        self.code
            .get(self.pos)
            .is_some_and(|&next| is_identifier(next) || tables::needs_space_after_identifier(next))
    }

    fn fail(&mut self, err: DeserializationError) -> Option<DeserializationResult<&'a str>> {
        self.pos = self.code.len();
        self.pending_space = false;
        Some(Err(err))
    }
}

impl<'a> Iterator for BytecodeDecoder<'a> {
    type Item = DeserializationResult<&'a str>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pending_space {
            self.pending_space = false;
            return Some(Ok(" "));
        }

        loop {
            let offset = self.pos;
            let (opcode, width) = match read_opcode(self.code, offset) {
                Ok(Some(decoded)) => decoded,
                Ok(None) => return None,
                Err(e) => return self.fail(e),
            };
            self.pos += width;

            match opcode {
                Opcode::Identifier(id) => {
                    let names = self.names;
                    let Some(name) = usize::try_from(id).ok().and_then(|i| names.get(i)) else {
                        return self.fail(DeserializationError::BadIdentifierIndex {
                            offset,
                            id,
                            table_len: names.len(),
                        });
                    };

                    self.pending_space = self.space_follows_identifier();
                    trace!(
                        "{}: identifier {} {:?} (space: {})",
                        offset, id, name, self.pending_space
                    );
                    return Some(Ok(name));
                }
                Opcode::Token(value) => {
                    let text = tables::TOKEN_TABLE[usize::from(value)];
                    if !text.is_empty() {
                        return Some(Ok(text));
                    }
                }
            }
        }
    }
}

impl FusedIterator for BytecodeDecoder<'_> {}

/// Decodes `code` into its fragments, in emission order.
pub fn decode<'a>(code: &'a [u8], names: &'a NameTable) -> DeserializationResult<Vec<&'a str>> {
    BytecodeDecoder::new(code, names).collect()
}

/// Decodes `code` into the raw, unformatted source text.
pub fn decode_to_string(code: &[u8], names: &NameTable) -> DeserializationResult<String> {
    let mut out = String::with_capacity(code.len() * 2);
    for fragment in BytecodeDecoder::new(code, names) {
        out.push_str(fragment?);
    }
    Ok(out)
}
