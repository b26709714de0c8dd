//! Text encoding and line-ending detection for loaded files.
//!
//! Documents are held in memory as UTF-8 with `\n` line breaks. The detected
//! [`Encoding`] and [`LineEnding`] are remembered per document so a save
//! writes the file back the way it was found.

use std::fmt;

use serde::{Deserialize, Serialize};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Encoding tag of a document on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
	#[default]
	Utf8,
	/// UTF-8 preceded by a byte order mark.
	Utf8Bom,
	/// ISO-8859-1; used for files that are not valid UTF-8.
	Latin1,
}

impl Encoding {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Utf8 => "utf-8",
			Self::Utf8Bom => "utf-8-bom",
			Self::Latin1 => "latin-1",
		}
	}
}

impl fmt::Display for Encoding {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Line terminator convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
	#[default]
	Lf,
	CrLf,
	Cr,
}

impl LineEnding {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Lf => "\n",
			Self::CrLf => "\r\n",
			Self::Cr => "\r",
		}
	}

	/// Detects the convention from the first line break in `text`.
	pub fn detect(text: &str) -> Option<Self> {
		let pos = text.find(['\r', '\n'])?;
		let rest = &text.as_bytes()[pos..];
		Some(match rest {
			[b'\r', b'\n', ..] => Self::CrLf,
			[b'\r', ..] => Self::Cr,
			_ => Self::Lf,
		})
	}
}

/// Decoded file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
	/// Text with every line break normalized to `\n`.
	pub text: String,
	pub encoding: Encoding,
	pub line_ending: LineEnding,
}

/// Decodes raw file bytes.
///
/// Never fails: bytes that are not UTF-8 are read as Latin-1.
pub fn decode(bytes: &[u8]) -> Decoded {
	let bom_body = bytes.strip_prefix(UTF8_BOM).and_then(|rest| std::str::from_utf8(rest).ok());
	let (raw, encoding) = match (bom_body, std::str::from_utf8(bytes)) {
		(Some(text), _) => (text.to_string(), Encoding::Utf8Bom),
		(None, Ok(text)) => (text.to_string(), Encoding::Utf8),
		// A broken BOM body is kept byte for byte, marker included.
		(None, Err(_)) => (bytes.iter().map(|&b| char::from(b)).collect(), Encoding::Latin1),
	};
	let line_ending = LineEnding::detect(&raw).unwrap_or_default();
	Decoded {
		text: normalize_line_endings(&raw),
		encoding,
		line_ending,
	}
}

/// Encodes normalized text for writing.
///
/// Returns the bytes and the encoding actually used: text with characters
/// outside Latin-1 falls back to UTF-8 rather than losing data.
pub fn encode(text: &str, encoding: Encoding, line_ending: LineEnding) -> (Vec<u8>, Encoding) {
	let text = if line_ending == LineEnding::Lf {
		text.to_string()
	} else {
		text.replace('\n', line_ending.as_str())
	};
	match encoding {
		Encoding::Utf8 => (text.into_bytes(), Encoding::Utf8),
		Encoding::Utf8Bom => {
			let mut bytes = UTF8_BOM.to_vec();
			bytes.extend_from_slice(text.as_bytes());
			(bytes, Encoding::Utf8Bom)
		}
		Encoding::Latin1 => {
			let latin: Option<Vec<u8>> = text.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect();
			match latin {
				Some(bytes) => (bytes, Encoding::Latin1),
				None => {
					tracing::warn!("text not representable in latin-1, writing utf-8");
					(text.into_bytes(), Encoding::Utf8)
				}
			}
		}
	}
}

/// Rewrites `\r\n` and lone `\r` as `\n`.
pub fn normalize_line_endings(text: &str) -> String {
	if !text.contains('\r') {
		return text.to_string();
	}
	text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Removes trailing spaces and tabs from every line.
pub fn strip_trailing_whitespace(text: &str) -> String {
	let mut out = String::with_capacity(text.len());
	for (i, line) in text.split('\n').enumerate() {
		if i > 0 {
			out.push('\n');
		}
		out.push_str(line.trim_end_matches([' ', '\t']));
	}
	out
}
