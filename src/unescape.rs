//! Decoding of backslash escapes left in exported text.
//!
//! Some exports round-trip message text through an intermediate encoding and
//! end up with literal `\u6cd5\u5f8b` or `\n` sequences in the content.
//! [`decode_escapes`] turns those back into native text; [`decode_or_raw`] is
//! the fallback combinator used everywhere else, which keeps the original
//! text whenever decoding fails.

use std::iter::Peekable;
use std::str::CharIndices;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnescapeError {
    #[error("trailing backslash at byte {0}")]
    TrailingBackslash(usize),

    #[error("truncated \\{kind} escape at byte {offset}")]
    Truncated { kind: char, offset: usize },

    #[error("invalid hex digit in \\{kind} escape at byte {offset}")]
    InvalidHex { kind: char, offset: usize },

    #[error("escape at byte {offset} is not a valid code point: {value:#x}")]
    InvalidCodePoint { offset: usize, value: u32 },

    #[error("unpaired surrogate {value:#06x} at byte {offset}")]
    LoneSurrogate { offset: usize, value: u32 },
}

/// Decode backslash escapes in `raw`.
///
/// Recognized: `\uXXXX` (surrogate pairs are combined), `\UXXXXXXXX`, `\xHH`,
/// octal `\ooo`, `\n \r \t \a \b \f \v`, `\\ \" \'` and backslash-newline,
/// which is dropped. Unknown escapes such as `\q` are kept verbatim.
pub fn decode_escapes(raw: &str) -> Result<String, UnescapeError> {
    if !raw.contains('\\') {
        return Ok(raw.to_owned());
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some((_, esc)) = chars.next() else {
            return Err(UnescapeError::TrailingBackslash(offset));
        };
        match esc {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0c}'),
            'v' => out.push('\u{0b}'),
            '\\' | '\'' | '"' => out.push(esc),
            '\n' => {}
            '0'..='7' => {
                let mut value = esc.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|&(_, d)| d.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(to_char(value, offset)?);
            }
            'x' => {
                let value = read_hex(&mut chars, 2, 'x', offset)?;
                out.push(to_char(value, offset)?);
            }
            'U' => {
                let value = read_hex(&mut chars, 8, 'U', offset)?;
                out.push(to_char(value, offset)?);
            }
            'u' => {
                let value = read_hex(&mut chars, 4, 'u', offset)?;
                out.push(decode_utf16_escape(value, &mut chars, offset)?);
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    Ok(out)
}

/// Decode `raw`, or return it unchanged if it is not decodable.
pub fn decode_or_raw(raw: &str) -> String {
    decode_escapes(raw).unwrap_or_else(|_| raw.to_owned())
}

fn read_hex(
    chars: &mut Peekable<CharIndices<'_>>,
    digits: usize,
    kind: char,
    offset: usize,
) -> Result<u32, UnescapeError> {
    let mut value = 0u32;
    for _ in 0..digits {
        let (_, c) = chars
            .next()
            .ok_or(UnescapeError::Truncated { kind, offset })?;
        let d = c
            .to_digit(16)
            .ok_or(UnescapeError::InvalidHex { kind, offset })?;
        value = value * 16 + d;
    }
    Ok(value)
}

fn to_char(value: u32, offset: usize) -> Result<char, UnescapeError> {
    char::from_u32(value).ok_or(UnescapeError::InvalidCodePoint { offset, value })
}

/// A `\u` escape may be the high half of a surrogate pair whose low half
/// follows as another `\u` escape.
fn decode_utf16_escape(
    high: u32,
    chars: &mut Peekable<CharIndices<'_>>,
    offset: usize,
) -> Result<char, UnescapeError> {
    match high {
        0xD800..=0xDBFF => {
            let mut lookahead = chars.clone();
            let low = match (lookahead.next(), lookahead.next()) {
                (Some((_, '\\')), Some((_, 'u'))) => read_hex(&mut lookahead, 4, 'u', offset).ok(),
                _ => None,
            };
            match low {
                Some(low @ 0xDC00..=0xDFFF) => {
                    *chars = lookahead;
                    let value = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                    to_char(value, offset)
                }
                _ => Err(UnescapeError::LoneSurrogate {
                    offset,
                    value: high,
                }),
            }
        }
        0xDC00..=0xDFFF => Err(UnescapeError::LoneSurrogate {
            offset,
            value: high,
        }),
        _ => to_char(high, offset),
    }
}
