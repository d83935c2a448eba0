//! Text encodings for input and output tables.
//!
//! Tables in an encoding other than UTF-8 are transcoded at the stream
//! level: [`DecodeReader`] turns the input into UTF-8 before CSV parsing and
//! [`EncodeWriter`] turns the UTF-8 output back into the table's encoding.
//! UTF-8 tables pass through byte for byte.
//!
//! Labels follow the WHATWG Encoding Standard (`utf-8`, `windows-1252`,
//! `shift_jis`, `utf-16le`, ...) plus the common Python codec spellings
//! (`latin-1`, `utf_8_sig`, `utf-16-le`, `cp1252`).

use encoding_rs::{Decoder, Encoder, EncoderResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Read, Write};

/// Size of the raw input chunk decoded at a time.
const DECODE_CHUNK: usize = 64 * 1024;

/// Text encoding of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Encoding(&'static encoding_rs::Encoding);

impl Default for Encoding {
    fn default() -> Self {
        Self::utf8()
    }
}

impl Encoding {
    /// UTF-8.
    pub fn utf8() -> Self {
        Encoding(encoding_rs::UTF_8)
    }

    /// Parse an encoding label (case-insensitive).
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase().replace(['_', ' '], "-");
        let alias = match normalized.as_str() {
            "latin-1" | "latin1" | "l1" | "iso-8859-1" => "latin1",
            "utf-8-sig" | "utf8-sig" | "u8" => "utf-8",
            "utf-16-le" => "utf-16le",
            "utf-16-be" => "utf-16be",
            other => other,
        };

        let underscored = alias.replace('-', "_");
        let compact = alias.replace('-', "");
        [label.trim(), alias, underscored.as_str(), compact.as_str()]
            .iter()
            .find_map(|candidate| encoding_rs::Encoding::for_label_no_replacement(candidate.as_bytes()))
            .map(Encoding)
    }

    /// Get the canonical name (e.g. `UTF-8`, `windows-1252`).
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Check if this is UTF-8.
    pub fn is_utf8(&self) -> bool {
        self.0 == encoding_rs::UTF_8
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<String> for Encoding {
    type Error = String;

    fn try_from(label: String) -> std::result::Result<Self, Self::Error> {
        Encoding::from_label(&label).ok_or_else(|| format!("unsupported encoding: {}", label))
    }
}

impl From<Encoding> for String {
    fn from(encoding: Encoding) -> Self {
        encoding.name().to_string()
    }
}

/// Reader that transcodes its input to UTF-8.
///
/// A leading byte order mark selects UTF-8 or UTF-16 and is removed.
/// Malformed sequences become U+FFFD.
pub struct DecodeReader<R> {
    inner: R,
    decoder: Option<Decoder>,
    input: Vec<u8>,
    output: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl<R: Read> DecodeReader<R> {
    /// Wrap a reader. UTF-8 input is passed through untouched.
    pub fn new(inner: R, encoding: Encoding) -> Self {
        let decoder = (!encoding.is_utf8()).then(|| encoding.0.new_decoder());
        Self {
            inner,
            decoder,
            input: vec![0; DECODE_CHUNK],
            output: Vec::new(),
            pos: 0,
            finished: false,
        }
    }
}

impl<R: Read> Read for DecodeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let decoder = match self.decoder {
            Some(ref mut decoder) => decoder,
            None => return self.inner.read(buf),
        };

        while self.pos == self.output.len() {
            if self.finished {
                return Ok(0);
            }
            let n = self.inner.read(&mut self.input)?;
            let last = n == 0;

            let capacity = decoder.max_utf8_buffer_length(n).ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "input chunk too large to decode")
            })?;
            self.output.resize(capacity, 0);
            let (_, read, written, _) = decoder.decode_to_utf8(&self.input[..n], &mut self.output, last);
            debug_assert_eq!(read, n);
            self.output.truncate(written);
            self.pos = 0;
            self.finished = last;
        }

        let n = buf.len().min(self.output.len() - self.pos);
        buf[..n].copy_from_slice(&self.output[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

enum Target {
    Utf8,
    /// encoding_rs has no UTF-16 encoder; code units are written directly.
    Utf16 { big_endian: bool, bom_written: bool },
    Legacy(Encoder),
}

/// Writer that transcodes UTF-8 into the table's encoding.
///
/// Characters the encoding cannot represent are written as `?`. UTF-16
/// output starts with a byte order mark.
pub struct EncodeWriter<W> {
    inner: W,
    target: Target,
    pending: Vec<u8>,
    buffer: Vec<u8>,
}

impl<W: Write> EncodeWriter<W> {
    /// Wrap a writer. UTF-8 output is passed through untouched.
    pub fn new(inner: W, encoding: Encoding) -> Self {
        let target = if encoding.is_utf8() {
            Target::Utf8
        } else if encoding.0 == encoding_rs::UTF_16LE {
            Target::Utf16 {
                big_endian: false,
                bom_written: false,
            }
        } else if encoding.0 == encoding_rs::UTF_16BE {
            Target::Utf16 {
                big_endian: true,
                bom_written: false,
            }
        } else {
            Target::Legacy(encoding.0.new_encoder())
        };

        Self {
            inner,
            target,
            pending: Vec::new(),
            buffer: Vec::new(),
        }
    }
}

fn encode_text(target: &mut Target, text: &str, out: &mut Vec<u8>) {
    match target {
        Target::Utf8 => out.extend_from_slice(text.as_bytes()),
        Target::Utf16 {
            big_endian,
            bom_written,
        } => {
            let bom = (!*bom_written).then_some(0xfeff_u16);
            *bom_written = true;
            for unit in bom.into_iter().chain(text.encode_utf16()) {
                let bytes = if *big_endian {
                    unit.to_be_bytes()
                } else {
                    unit.to_le_bytes()
                };
                out.extend_from_slice(&bytes);
            }
        }
        Target::Legacy(encoder) => {
            let mut rest = text;
            loop {
                let needed = encoder
                    .max_buffer_length_from_utf8_without_replacement(rest.len())
                    .unwrap_or(rest.len() * 4);
                out.reserve(needed.max(16));
                let (result, read) = encoder.encode_from_utf8_to_vec_without_replacement(rest, out, false);
                rest = &rest[read..];
                match result {
                    EncoderResult::InputEmpty => break,
                    EncoderResult::OutputFull => {}
                    EncoderResult::Unmappable(_) => out.push(b'?'),
                }
            }
        }
    }
}

impl<W: Write> Write for EncodeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Target::Utf8 = self.target {
            return self.inner.write(buf);
        }

        // A write may end in the middle of a character; keep the tail.
        self.pending.extend_from_slice(buf);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(text) => text.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
        };

        if valid > 0 {
            let text = std::str::from_utf8(&self.pending[..valid])
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            self.buffer.clear();
            encode_text(&mut self.target, text, &mut self.buffer);
            self.inner.write_all(&self.buffer)?;
            self.pending.drain(..valid);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
