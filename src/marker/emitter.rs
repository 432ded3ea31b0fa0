//! Marker emitter driven by the shell's preexec/precmd hooks

use rand::RngExt;
use std::io::Write;
use std::path::PathBuf;

use super::protocol::{Marker, MarkerId};

/// Kernel-provided random UUID source
const SYSTEM_UUID_SOURCE: &str = "/proc/sys/kernel/random/uuid";

/// Generates unique marker identifiers
///
/// Reads the system UUID source when present and falls back to a v4 UUID
/// built from the thread-local RNG.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    system_source: Option<PathBuf>,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self {
            system_source: Some(PathBuf::from(SYSTEM_UUID_SOURCE)),
        }
    }
}

impl IdGenerator {
    /// Use a specific system UUID source (or none)
    pub fn with_source(system_source: Option<PathBuf>) -> Self {
        Self { system_source }
    }

    /// Produce a fresh identifier
    pub fn next_id(&self) -> MarkerId {
        self.system_id().unwrap_or_else(random_id)
    }

    fn system_id(&self) -> Option<MarkerId> {
        let path = self.system_source.as_ref()?;
        let raw = std::fs::read_to_string(path).ok()?;
        MarkerId::parse(&raw)
    }
}

fn random_id() -> MarkerId {
    let mut rng = rand::rng();
    let hi: u64 = rng.random();
    let lo: u64 = rng.random();
    let bytes = ((u128::from(hi) << 64) | u128::from(lo)).to_be_bytes();
    MarkerId::from_uuid(uuid::Builder::from_random_bytes(bytes).into_uuid())
}

/// Emits Start/End/Prompt markers into a shell's output stream
///
/// Owns the session's single open-marker slot. Write failures are
/// swallowed: a missing terminal must never disturb the shell.
pub struct MarkerEmitter<W: Write> {
    out: W,
    open: Option<MarkerId>,
    ids: IdGenerator,
}

impl<W: Write> MarkerEmitter<W> {
    /// Create an emitter with no open marker
    pub fn new(out: W) -> Self {
        Self::with_open(out, None)
    }

    /// Create an emitter resuming a previously open marker
    pub fn with_open(out: W, open: Option<MarkerId>) -> Self {
        Self {
            out,
            open,
            ids: IdGenerator::default(),
        }
    }

    /// Replace the identifier generator
    pub fn with_ids(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    /// Currently open marker, if any
    pub fn open_marker(&self) -> Option<&MarkerId> {
        self.open.as_ref()
    }

    /// Consume the emitter, returning the open-marker slot
    pub fn into_open(self) -> Option<MarkerId> {
        self.open
    }

    /// "Command about to execute" trigger
    ///
    /// A marker left open (no prompt fired in between) is closed first so
    /// at most one Start is ever unmatched.
    pub fn command_started(&mut self, command: &[u8]) -> MarkerId {
        if let Some(stale) = self.open.take() {
            tracing::debug!("Closing stale marker {}", stale);
            self.emit(&Marker::End { id: stale });
        }

        let id = self.ids.next_id();
        self.emit(&Marker::Start {
            id: id.clone(),
            timestamp: chrono::Utc::now().timestamp(),
            command: command.to_vec(),
        });
        self.open = Some(id.clone());
        id
    }

    /// "Prompt about to render" trigger
    pub fn prompt_rendered(&mut self) {
        if let Some(id) = self.open.take() {
            self.emit(&Marker::End { id });
        }
        self.emit(&Marker::Prompt);
    }

    fn emit(&mut self, marker: &Marker) {
        let bytes = marker.encode();
        if let Err(e) = self.out.write_all(&bytes).and_then(|_| self.out.flush()) {
            tracing::debug!("Marker not emitted: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::protocol::scan;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }
    }

    fn markers(bytes: &[u8]) -> Vec<Marker> {
        scan(bytes).into_iter().map(|m| m.marker).collect()
    }

    #[test]
    fn test_start_payload_round_trips() {
        let commands: [&[u8]; 4] = [
            b"ls",
            b"",
            b"echo \"$(date)\" | tee /tmp/x\nsecond line",
            "printf 'caf\u{e9} \u{1f980}'".as_bytes(),
        ];

        for command in commands {
            let mut emitter = MarkerEmitter::new(Vec::new());
            let id = emitter.command_started(command);
            let out = emitter.out;

            match markers(&out).as_slice() {
                [Marker::Start {
                    id: got,
                    command: got_cmd,
                    ..
                }] => {
                    assert_eq!(got, &id);
                    assert_eq!(got_cmd.as_slice(), command);
                }
                other => panic!("unexpected markers: {:?}", other),
            }
        }
    }

    #[test]
    fn test_prompt_closes_open_marker() {
        let mut emitter = MarkerEmitter::new(Vec::new());
        let id = emitter.command_started(b"make");
        assert_eq!(emitter.open_marker(), Some(&id));

        emitter.prompt_rendered();
        assert_eq!(emitter.open_marker(), None);

        let got = markers(&emitter.out);
        assert_eq!(got.len(), 3);
        assert_eq!(got[1], Marker::End { id });
        assert_eq!(got[2], Marker::Prompt);
    }

    #[test]
    fn test_prompt_without_open_marker_emits_only_prompt() {
        let mut emitter = MarkerEmitter::new(Vec::new());
        emitter.prompt_rendered();
        emitter.prompt_rendered();
        assert_eq!(markers(&emitter.out), vec![Marker::Prompt, Marker::Prompt]);
    }

    #[test]
    fn test_at_most_one_open_marker() {
        let mut emitter = MarkerEmitter::new(Vec::new());
        let first = emitter.command_started(b"a");
        let second = emitter.command_started(b"b");
        emitter.prompt_rendered();

        // Every End closes the most recent still-open Start
        let mut open: Option<MarkerId> = None;
        let mut ends = Vec::new();
        for marker in markers(&emitter.out) {
            match marker {
                Marker::Start { id, .. } => {
                    assert!(open.is_none(), "two markers open at once");
                    open = Some(id);
                }
                Marker::End { id } => {
                    assert_eq!(open.take(), Some(id.clone()));
                    ends.push(id);
                }
                Marker::Prompt => {}
            }
        }
        assert_eq!(ends, vec![first, second]);
        assert!(open.is_none());
    }

    #[test]
    fn test_resumed_slot_is_closed() {
        let prior = MarkerId::parse("resumed-1").unwrap();
        let mut emitter = MarkerEmitter::with_open(Vec::new(), Some(prior.clone()));
        emitter.prompt_rendered();
        assert_eq!(
            markers(&emitter.out),
            vec![Marker::End { id: prior }, Marker::Prompt]
        );
    }

    #[test]
    fn test_write_failure_is_silent() {
        let mut emitter = MarkerEmitter::new(BrokenPipe);
        let id = emitter.command_started(b"vim");
        // State still tracks the marker even though nothing reached the stream
        assert_eq!(emitter.open_marker(), Some(&id));
        emitter.prompt_rendered();
        assert!(emitter.into_open().is_none());
    }

    #[test]
    fn test_ids_fall_back_without_system_source() {
        let ids = IdGenerator::with_source(Some(PathBuf::from("/nonexistent/uuid")));
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let id = ids.next_id();
            assert_eq!(id.as_str().len(), 36);
            assert!(seen.insert(id));
        }
    }

    #[test]
    fn test_emitter_uses_fallback_ids_without_system_source() {
        let ids = IdGenerator::with_source(None);
        let mut emitter = MarkerEmitter::new(Vec::new()).with_ids(ids);
        let first = emitter.command_started(b"ls");
        let second = emitter.command_started(b"pwd");

        assert_ne!(first, second);
        for id in [&first, &second] {
            assert!(uuid::Uuid::parse_str(id.as_str()).is_ok());
        }
        let starts = markers(&emitter.out)
            .into_iter()
            .filter(|m| matches!(m, Marker::Start { .. }))
            .count();
        assert_eq!(starts, 2);
    }

    #[test]
    fn test_ids_from_system_source_are_unique() {
        let ids = IdGenerator::default();
        let a = ids.next_id();
        let b = ids.next_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_ids_ignore_garbage_source() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("uuid");
        std::fs::write(&path, "not|valid\n").unwrap();
        let id = IdGenerator::with_source(Some(path)).next_id();
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
    }
}
