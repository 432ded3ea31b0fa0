//! Stream-embedded marker encoding and scanning
//!
//! Markers are iTerm2-style OSC 1337 sequences terminated by BEL, which
//! terminals ignore, so they travel invisibly through the pane output:
//!
//! - `ESC ] 1337 ; LogExec:<id>|<unix_ts>|<base64 command> BEL`
//! - `ESC ] 1337 ; LogEnd:<id> BEL`
//! - `ESC ] 1337 ; LogPrompt BEL`

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt;

/// OSC introducer shared by every marker
pub const OSC_PREFIX: &[u8] = b"\x1b]1337;";

/// BEL terminator
pub const TERMINATOR: u8 = 0x07;

const EXEC_TAG: &str = "LogExec:";
const END_TAG: &str = "LogEnd:";
const PROMPT_TAG: &str = "LogPrompt";

/// Identifier tying a Start marker to its End marker
///
/// Restricted to ASCII alphanumerics and `-` so it can never contain the
/// field separator or a terminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarkerId(String);

impl MarkerId {
    /// Validate and wrap an identifier
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    /// Hyphenated form of a UUID (always a valid id)
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid.hyphenated().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A command-boundary marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// A command was submitted
    Start {
        id: MarkerId,
        timestamp: i64,
        command: Vec<u8>,
    },
    /// The command with this id finished (next prompt)
    End { id: MarkerId },
    /// A prompt is about to be drawn
    Prompt,
}

impl Marker {
    /// Encode into the on-stream byte form
    pub fn encode(&self) -> Vec<u8> {
        let body = match self {
            Marker::Start {
                id,
                timestamp,
                command,
            } => format!("{}{}|{}|{}", EXEC_TAG, id, timestamp, encode_command(command)),
            Marker::End { id } => format!("{}{}", END_TAG, id),
            Marker::Prompt => PROMPT_TAG.to_string(),
        };

        let mut out = Vec::with_capacity(OSC_PREFIX.len() + body.len() + 1);
        out.extend_from_slice(OSC_PREFIX);
        out.extend_from_slice(body.as_bytes());
        out.push(TERMINATOR);
        out
    }

    /// Parse a marker body (the bytes between prefix and terminator)
    fn parse_body(body: &[u8]) -> Option<Self> {
        let body = std::str::from_utf8(body).ok()?;

        if body == PROMPT_TAG {
            return Some(Marker::Prompt);
        }
        if let Some(rest) = body.strip_prefix(END_TAG) {
            return MarkerId::parse(rest).map(|id| Marker::End { id });
        }
        if let Some(rest) = body.strip_prefix(EXEC_TAG) {
            let mut fields = rest.splitn(3, '|');
            let id = MarkerId::parse(fields.next()?)?;
            let timestamp = fields.next()?.parse().ok()?;
            let command = decode_command(fields.next()?)?;
            return Some(Marker::Start {
                id,
                timestamp,
                command,
            });
        }
        None
    }
}

/// Encode command text so it cannot collide with control sequences
///
/// Standard base64 never produces ESC, BEL or newlines.
pub fn encode_command(command: &[u8]) -> String {
    STANDARD.encode(command)
}

/// Decode a command payload, tolerating stray whitespace
pub fn decode_command(encoded: &str) -> Option<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).ok()
}

/// A marker found in a byte stream, with its byte span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedMarker {
    pub marker: Marker,
    /// Offset of the ESC byte
    pub start: usize,
    /// Offset one past the BEL byte
    pub end: usize,
}

/// Find every well-formed marker in `bytes`, in stream order
///
/// Malformed or unterminated sequences are skipped.
pub fn scan(bytes: &[u8]) -> Vec<ScannedMarker> {
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(start) = find(bytes, OSC_PREFIX, pos) {
        let body_start = start + OSC_PREFIX.len();
        let Some(rel_end) = bytes[body_start..].iter().position(|&b| b == TERMINATOR) else {
            break;
        };
        let body_end = body_start + rel_end;

        // An ESC inside the body means this sequence was cut short
        let body = &bytes[body_start..body_end];
        if let Some(esc) = body.iter().position(|&b| b == 0x1b) {
            pos = body_start + esc;
            continue;
        }

        if let Some(marker) = Marker::parse_body(body) {
            found.push(ScannedMarker {
                marker,
                start,
                end: body_end + 1,
            });
        }
        pos = body_end + 1;
    }

    found
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> MarkerId {
        MarkerId::parse(s).unwrap()
    }

    #[test]
    fn test_encode_wire_format() {
        let start = Marker::Start {
            id: id("abc-123"),
            timestamp: 1700000000,
            command: b"ls -la".to_vec(),
        };
        assert_eq!(
            start.encode(),
            b"\x1b]1337;LogExec:abc-123|1700000000|bHMgLWxh\x07".to_vec()
        );
        assert_eq!(
            Marker::End { id: id("abc-123") }.encode(),
            b"\x1b]1337;LogEnd:abc-123\x07".to_vec()
        );
        assert_eq!(Marker::Prompt.encode(), b"\x1b]1337;LogPrompt\x07".to_vec());
    }

    #[test]
    fn test_command_payload_survives_control_bytes() {
        let nasty: &[u8] = b"printf '\x1b]0;title\x07'\necho \"multi\nline\" | grep |";
        let marker = Marker::Start {
            id: id("x1"),
            timestamp: 1,
            command: nasty.to_vec(),
        };
        let bytes = marker.encode();
        // Exactly one terminator, at the end
        assert_eq!(bytes.iter().filter(|&&b| b == TERMINATOR).count(), 1);
        assert!(!bytes.contains(&b'\n'));

        let scanned = scan(&bytes);
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].marker, marker);
    }

    #[test]
    fn test_command_payload_non_utf8() {
        let raw = vec![0xff, 0xfe, 0x00, b'a'];
        let encoded = encode_command(&raw);
        assert_eq!(decode_command(&encoded), Some(raw));
    }

    #[test]
    fn test_marker_id_rejects_separators() {
        assert!(MarkerId::parse("ok-id-1").is_some());
        assert!(MarkerId::parse("").is_none());
        assert!(MarkerId::parse("a|b").is_none());
        assert!(MarkerId::parse("a\x07").is_none());
        assert!(MarkerId::parse("a b").is_none());
    }

    #[test]
    fn test_scan_mixed_stream_with_offsets() {
        let mut stream = Vec::new();
        stream.extend_from_slice(b"$ ");
        let prompt_at = stream.len();
        stream.extend_from_slice(&Marker::Prompt.encode());
        let start = Marker::Start {
            id: id("one"),
            timestamp: 5,
            command: b"echo hi".to_vec(),
        };
        let start_at = stream.len();
        stream.extend_from_slice(&start.encode());
        stream.extend_from_slice(b"hi\r\n\x1b[32mgreen\x1b[0m\r\n");
        let end_at = stream.len();
        stream.extend_from_slice(&Marker::End { id: id("one") }.encode());

        let scanned = scan(&stream);
        assert_eq!(scanned.len(), 3);
        assert_eq!(scanned[0].marker, Marker::Prompt);
        assert_eq!(scanned[0].start, prompt_at);
        assert_eq!(scanned[1].marker, start);
        assert_eq!(scanned[1].start, start_at);
        assert_eq!(scanned[2].start, end_at);
        assert_eq!(scanned[2].end, stream.len());
    }

    #[test]
    fn test_scan_skips_malformed_and_foreign_osc() {
        let mut stream = Vec::new();
        stream.extend_from_slice(b"\x1b]1337;SetBadgeFormat=Zm9v\x07");
        stream.extend_from_slice(b"\x1b]1337;LogExec:bad|notanumber|AAAA\x07");
        stream.extend_from_slice(b"\x1b]1337;LogEnd:has space\x07");
        // Cut short by a new sequence before the terminator
        stream.extend_from_slice(b"\x1b]1337;LogExec:cut");
        stream.extend_from_slice(&Marker::Prompt.encode());
        // Unterminated tail
        stream.extend_from_slice(b"\x1b]1337;LogEnd:tail");

        let scanned = scan(&stream);
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].marker, Marker::Prompt);
    }

    #[test]
    fn test_scan_empty() {
        assert!(scan(b"").is_empty());
        assert!(scan(b"plain output\n").is_empty());
    }
}
