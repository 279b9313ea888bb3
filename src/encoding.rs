//! Character encoding of field data.
//!
//! Position 9 of the leader says how field bytes are encoded:
//! - Space character = MARC-8
//! - 'a' = UTF-8
//!
//! UTF-8 data is decoded lossily. MARC-8 data goes through an ISO 2022 style
//! decoder that tracks the G0/G1 working sets, moves combining diacritics
//! behind their base character and returns NFC text.
//!
//! Tables cover Basic Latin, ANSEL Extended Latin, Basic Cyrillic and the
//! superscript and subscript sets. Bytes of any other designated set
//! (Greek, Hebrew, Arabic, Extended Cyrillic, EACC) decode to U+FFFD.

use unicode_normalization::UnicodeNormalization;

const ESC: u8 = 0x1B;
const REPLACEMENT: char = '\u{FFFD}';

/// Character encoding for MARC records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarcEncoding {
    /// MARC-8 encoding (legacy, mixed character sets)
    Marc8,
    /// UTF-8 encoding (modern standard)
    Utf8,
}

impl MarcEncoding {
    /// Encoding named by leader position 9.
    ///
    /// Only a blank selects MARC-8. Any other value is read as UTF-8, so a
    /// stray code cannot stop a long load.
    #[must_use]
    pub fn from_leader_char(c: char) -> Self {
        if c == ' ' {
            MarcEncoding::Marc8
        } else {
            MarcEncoding::Utf8
        }
    }
}

/// Decode field bytes in the given encoding.
#[must_use]
pub fn decode_text(bytes: &[u8], encoding: MarcEncoding) -> String {
    match encoding {
        MarcEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        MarcEncoding::Marc8 if bytes.is_ascii() && !bytes.contains(&ESC) => {
            String::from_utf8_lossy(bytes).into_owned()
        },
        MarcEncoding::Marc8 => decode_marc8(bytes),
    }
}

/// Graphic character sets reachable through MARC-8 escapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharacterSet {
    BasicLatin,
    AnselExtendedLatin,
    BasicCyrillic,
    Superscript,
    Subscript,
    /// Designated but without a table here
    Untabled,
    /// East Asian, three bytes per character
    Eacc,
}

impl CharacterSet {
    /// Set named by the final byte of a designation escape.
    fn from_final_byte(byte: u8) -> Self {
        match byte {
            b'B' | b's' => CharacterSet::BasicLatin,
            b'E' => CharacterSet::AnselExtendedLatin,
            b'N' => CharacterSet::BasicCyrillic,
            b'1' => CharacterSet::Eacc,
            _ => CharacterSet::Untabled,
        }
    }

    /// Look up one byte, returning the character and whether it combines.
    fn lookup(self, byte: u8) -> Option<(char, bool)> {
        let low = byte & 0x7F;
        match self {
            CharacterSet::BasicLatin => Some((char::from(low), false)),
            CharacterSet::AnselExtendedLatin => ansel(low | 0x80),
            CharacterSet::BasicCyrillic => basic_cyrillic(low).map(|c| (c, false)),
            CharacterSet::Superscript => superscript(low).map(|c| (c, false)),
            CharacterSet::Subscript => subscript(low).map(|c| (c, false)),
            CharacterSet::Untabled | CharacterSet::Eacc => None,
        }
    }
}

/// Working sets of the decoder.
#[derive(Debug, Clone, Copy)]
struct Marc8Decoder {
    /// Used for bytes 0x21-0x7E
    g0: CharacterSet,
    /// Used for bytes 0xA1-0xFE
    g1: CharacterSet,
}

impl Default for Marc8Decoder {
    fn default() -> Self {
        Marc8Decoder {
            g0: CharacterSet::BasicLatin,
            g1: CharacterSet::AnselExtendedLatin,
        }
    }
}

impl Marc8Decoder {
    /// Apply the escape sequence at the start of `bytes`; returns its length.
    fn escape(&mut self, bytes: &[u8]) -> usize {
        match bytes {
            // ESC ( F / ESC , F designate G0, ESC ) F / ESC - F designate G1
            [_, b'(' | b',', f, ..] => {
                self.g0 = CharacterSet::from_final_byte(*f);
                3
            },
            [_, b')' | b'-', f, ..] => {
                self.g1 = CharacterSet::from_final_byte(*f);
                3
            },
            // ESC $ F, ESC $ , F (G0) and ESC $ ) F, ESC $ - F (G1) multibyte
            [_, b'$', b',' | b'(', f, ..] => {
                self.g0 = CharacterSet::from_final_byte(*f);
                4
            },
            [_, b'$', b')' | b'-', f, ..] => {
                self.g1 = CharacterSet::from_final_byte(*f);
                4
            },
            [_, b'$', f, ..] => {
                self.g0 = CharacterSet::from_final_byte(*f);
                3
            },
            [_, b's', ..] => {
                self.g0 = CharacterSet::BasicLatin;
                2
            },
            [_, b'p', ..] => {
                self.g0 = CharacterSet::Superscript;
                2
            },
            [_, b'b', ..] => {
                self.g0 = CharacterSet::Subscript;
                2
            },
            [_, b'g', ..] => {
                self.g0 = CharacterSet::Untabled;
                2
            },
            _ => bytes.len().min(2),
        }
    }
}

/// Decode MARC-8 bytes to NFC text.
///
/// Combining marks precede their base character in MARC-8 and follow it in
/// Unicode, so marks are held until the next base character is written.
fn decode_marc8(bytes: &[u8]) -> String {
    let mut decoder = Marc8Decoder::default();
    let mut out = String::with_capacity(bytes.len());
    let mut pending: Vec<char> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        if byte == ESC {
            i += decoder.escape(&bytes[i..]);
            continue;
        }
        if byte < 0x20 || byte == 0x7F {
            i += 1;
            continue;
        }
        if byte == 0x20 {
            push_base(&mut out, &mut pending, ' ');
            i += 1;
            continue;
        }

        let set = if byte >= 0x80 { decoder.g1 } else { decoder.g0 };
        if set == CharacterSet::Eacc {
            push_base(&mut out, &mut pending, REPLACEMENT);
            i += 3;
            continue;
        }

        match set.lookup(byte) {
            Some((c, true)) => pending.push(c),
            Some((c, false)) => push_base(&mut out, &mut pending, c),
            None => push_base(&mut out, &mut pending, REPLACEMENT),
        }
        i += 1;
    }
    // Marks with nothing after them stay attached to the end.
    out.extend(pending);

    out.nfc().collect()
}

fn push_base(out: &mut String, pending: &mut Vec<char>, base: char) {
    out.push(base);
    out.extend(pending.drain(..));
}

/// ANSEL (ANSI/NISO Z39.47) in the G1 range.
fn ansel(byte: u8) -> Option<(char, bool)> {
    let spacing = |c| Some((c, false));
    let combining = |c| Some((c, true));
    match byte {
        0xA1 => spacing('\u{0141}'),
        0xA2 => spacing('\u{00D8}'),
        0xA3 => spacing('\u{0110}'),
        0xA4 => spacing('\u{00DE}'),
        0xA5 => spacing('\u{00C6}'),
        0xA6 => spacing('\u{0152}'),
        0xA7 => spacing('\u{02B9}'),
        0xA8 => spacing('\u{00B7}'),
        0xA9 => spacing('\u{266D}'),
        0xAA => spacing('\u{00AE}'),
        0xAB => spacing('\u{00B1}'),
        0xAC => spacing('\u{01A0}'),
        0xAD => spacing('\u{01AF}'),
        0xAE => spacing('\u{02BC}'),
        0xB0 => spacing('\u{02BB}'),
        0xB1 => spacing('\u{0142}'),
        0xB2 => spacing('\u{00F8}'),
        0xB3 => spacing('\u{0111}'),
        0xB4 => spacing('\u{00FE}'),
        0xB5 => spacing('\u{00E6}'),
        0xB6 => spacing('\u{0153}'),
        0xB7 => spacing('\u{02BA}'),
        0xB8 => spacing('\u{0131}'),
        0xB9 => spacing('\u{00A3}'),
        0xBA => spacing('\u{00F0}'),
        0xBC => spacing('\u{01A1}'),
        0xBD => spacing('\u{01B0}'),
        0xC0 => spacing('\u{00B0}'),
        0xC1 => spacing('\u{2113}'),
        0xC2 => spacing('\u{2117}'),
        0xC3 => spacing('\u{00A9}'),
        0xC4 => spacing('\u{266F}'),
        0xC5 => spacing('\u{00BF}'),
        0xC6 => spacing('\u{00A1}'),
        0xC7 => spacing('\u{00DF}'),
        0xC8 => spacing('\u{20AC}'),
        0xE0 => combining('\u{0309}'),
        0xE1 => combining('\u{0300}'),
        0xE2 => combining('\u{0301}'),
        0xE3 => combining('\u{0302}'),
        0xE4 => combining('\u{0303}'),
        0xE5 => combining('\u{0304}'),
        0xE6 => combining('\u{0306}'),
        0xE7 => combining('\u{0307}'),
        0xE8 => combining('\u{0308}'),
        0xE9 => combining('\u{030C}'),
        0xEA => combining('\u{030A}'),
        0xEB => combining('\u{FE20}'),
        0xEC => combining('\u{FE21}'),
        0xED => combining('\u{0315}'),
        0xEE => combining('\u{030B}'),
        0xEF => combining('\u{0310}'),
        0xF0 => combining('\u{0327}'),
        0xF1 => combining('\u{0328}'),
        0xF2 => combining('\u{0323}'),
        0xF3 => combining('\u{0324}'),
        0xF4 => combining('\u{0325}'),
        0xF5 => combining('\u{0333}'),
        0xF6 => combining('\u{0332}'),
        0xF7 => combining('\u{0326}'),
        0xF8 => combining('\u{031C}'),
        0xF9 => combining('\u{032E}'),
        0xFA => combining('\u{FE22}'),
        0xFB => combining('\u{FE23}'),
        0xFE => combining('\u{0313}'),
        _ => None,
    }
}

/// Basic Cyrillic (ISO-IR 111 order) in the G0 range.
fn basic_cyrillic(byte: u8) -> Option<char> {
    const LETTERS: [char; 32] = [
        'ю', 'а', 'б', 'ц', 'д', 'е', 'ф', 'г', 'х', 'и', 'й', 'к', 'л', 'м', 'н', 'о', 'п', 'я',
        'р', 'с', 'т', 'у', 'ж', 'в', 'ь', 'ы', 'з', 'ш', 'э', 'щ', 'ч', 'ъ',
    ];
    match byte {
        0x21..=0x3F => Some(char::from(byte)),
        0x40..=0x5F => Some(LETTERS[usize::from(byte - 0x40)]),
        0x60..=0x7E => LETTERS[usize::from(byte - 0x60)].to_uppercase().next(),
        _ => None,
    }
}

fn superscript(byte: u8) -> Option<char> {
    match byte {
        b'0' => Some('\u{2070}'),
        b'1' => Some('\u{00B9}'),
        b'2' => Some('\u{00B2}'),
        b'3' => Some('\u{00B3}'),
        b'4'..=b'9' => char::from_u32(0x2074 + u32::from(byte - b'4')),
        b'+' => Some('\u{207A}'),
        b'-' => Some('\u{207B}'),
        b'(' => Some('\u{207D}'),
        b')' => Some('\u{207E}'),
        _ => None,
    }
}

fn subscript(byte: u8) -> Option<char> {
    match byte {
        b'0'..=b'9' => char::from_u32(0x2080 + u32::from(byte - b'0')),
        b'+' => Some('\u{208A}'),
        b'-' => Some('\u{208B}'),
        b'(' => Some('\u{208D}'),
        b')' => Some('\u{208E}'),
        _ => None,
    }
}
