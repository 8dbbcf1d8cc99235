//! Content sniffing: classify a byte stream as a chemical table file.
//!
//! ## Rule order
//!
//! Reaction, RD and RG files embed complete molfiles as payload, and SD files
//! are concatenated molfiles. A plain molfile signature therefore shows up
//! inside every container format, so container rules must run first:
//!
//! 1. Magic header prefix on the raw head (`$RXN`, `$RDFILE `, `$MDL`)
//! 2. Tail patterns: `$$$$` record terminator (SD file) before `M  END`
//!    (molfile)
//! 3. The molfile counts line as a structural fingerprint of the head
//!
//! The first rule that matches wins. Each table is a slice so the order is
//! part of the type, not an accident of map iteration.

use once_cell::sync::Lazy;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// Bytes sampled from each end of a file.
pub const PROBE_LEN: usize = 1024;

/// MIME types this crate can recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChemicalMime {
    /// `chemical/x-mdl-molfile`
    Molfile,
    /// `chemical/x-mdl-sdfile`
    Sdfile,
    /// `chemical/x-mdl-rxnfile`
    Rxnfile,
    /// `chemical/x-mdl-rdfile`
    Rdfile,
    /// `chemical/x-mdl-rgfile`
    Rgfile,
}

impl ChemicalMime {
    pub const ALL: [ChemicalMime; 5] = [
        ChemicalMime::Molfile,
        ChemicalMime::Sdfile,
        ChemicalMime::Rxnfile,
        ChemicalMime::Rdfile,
        ChemicalMime::Rgfile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChemicalMime::Molfile => "chemical/x-mdl-molfile",
            ChemicalMime::Sdfile => "chemical/x-mdl-sdfile",
            ChemicalMime::Rxnfile => "chemical/x-mdl-rxnfile",
            ChemicalMime::Rdfile => "chemical/x-mdl-rdfile",
            ChemicalMime::Rgfile => "chemical/x-mdl-rgfile",
        }
    }

    /// Conventional file extension.
    pub fn extension(self) -> &'static str {
        match self {
            ChemicalMime::Molfile => "mol",
            ChemicalMime::Sdfile => "sdf",
            ChemicalMime::Rxnfile => "rxn",
            ChemicalMime::Rdfile => "rd",
            ChemicalMime::Rgfile => "rg",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == mime)
    }
}

impl fmt::Display for ChemicalMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Rule tables ──────────────────────────────────────────────────────────────

static HEADERS: &[(&[u8], ChemicalMime)] = &[
    (b"$RXN", ChemicalMime::Rxnfile),
    (b"$RDFILE ", ChemicalMime::Rdfile),
    (b"$MDL", ChemicalMime::Rgfile),
];

static TAIL_RULES: Lazy<Vec<(Regex, ChemicalMime)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"\n\s*\$\$\$\$\s*$").unwrap(),
            ChemicalMime::Sdfile,
        ),
        // Any line ending style
        (Regex::new(r"\n\s*M  END\s*$").unwrap(), ChemicalMime::Molfile),
    ]
});

// Counts line: #atoms #bonds #atom_lists [obsolete] [chiral] ... 999 V2000
static HEAD_RULES: Lazy<Vec<(Regex, ChemicalMime)>> = Lazy::new(|| {
    vec![(
        Regex::new(r"(?:\A|\n)(\s*\d{1,3}\s+){3}[^\n]*(?:\d+\s+){1,12}V\d{4,5}\n").unwrap(),
        ChemicalMime::Molfile,
    )]
});

// ── Probe ────────────────────────────────────────────────────────────────────

/// Head and tail sample of a candidate file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeBuffer {
    pub head: Vec<u8>,
    pub tail: Vec<u8>,
}

impl ProbeBuffer {
    /// Build a probe from arbitrary buffers, keeping the first and last
    /// [`PROBE_LEN`] bytes respectively.
    pub fn new(head: &[u8], tail: &[u8]) -> Self {
        Self {
            head: cap_head(head).to_vec(),
            tail: cap_tail(tail).to_vec(),
        }
    }

    /// Sample the first and last [`PROBE_LEN`] bytes of a file.
    ///
    /// Files shorter than the probe length produce overlapping head and tail.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let mut file = File::open(path.as_ref())?;
        let len = file.metadata()?.len();

        let mut head = Vec::with_capacity(PROBE_LEN);
        (&mut file).take(PROBE_LEN as u64).read_to_end(&mut head)?;

        let tail_len = len.min(PROBE_LEN as u64);
        file.seek(SeekFrom::Start(len - tail_len))?;
        let mut tail = Vec::with_capacity(tail_len as usize);
        file.take(tail_len).read_to_end(&mut tail)?;

        Ok(Self { head, tail })
    }

    pub fn classify(&self, file_label: &str) -> Option<ChemicalMime> {
        classify(&self.head, &self.tail, file_label)
    }
}

fn cap_head(head: &[u8]) -> &[u8] {
    &head[..head.len().min(PROBE_LEN)]
}

fn cap_tail(tail: &[u8]) -> &[u8] {
    &tail[tail.len().saturating_sub(PROBE_LEN)..]
}

/// Guess a chemical MIME type from the head and tail of a file.
///
/// `file_label` only appears in debug logs. Returns `None` when no rule
/// matches; callers keep whatever generic type they had.
pub fn classify(head: &[u8], tail: &[u8], file_label: &str) -> Option<ChemicalMime> {
    let head = cap_head(head);
    let tail = cap_tail(tail);

    if let Some(&(_, mime)) = HEADERS.iter().find(|(magic, _)| head.starts_with(magic)) {
        debug!("magic header in {} recognized as {}", file_label, mime);
        return Some(mime);
    }

    if let Some((_, mime)) = TAIL_RULES.iter().find(|(re, _)| re.is_match(tail)) {
        debug!("{} tail recognized by regexp as {}", file_label, mime);
        return Some(*mime);
    }

    if let Some((_, mime)) = HEAD_RULES.iter().find(|(re, _)| re.is_match(head)) {
        debug!("{} head recognized by regexp as {}", file_label, mime);
        return Some(*mime);
    }

    None
}
