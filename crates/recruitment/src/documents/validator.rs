use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::bytes::RegexSet;
use serde::Serialize;
use tracing::{debug, warn};

pub const ALLOWED_EXTENSIONS: [&str; 3] = ["pdf", "doc", "docx"];
pub const MAX_FILE_SIZE_BYTES: u64 = 5 * 1024 * 1024;
pub const HEAD_SAMPLE_BYTES: u64 = 64 * 1024;

const PDF_MAGIC: &[u8] = b"%PDF";
const DOCX_MAGIC: &[u8] = b"PK\x03\x04";
const DOC_MAGIC: &[u8] = b"\xD0\xCF\x11\xE0";
const EXE_MAGIC: &[u8] = b"MZ";

static EMBEDDED_SCRIPT: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([r"(?i-u)<script[\s>]", r"(?i-u)/JavaScript", r"(?i-u)/JS\b"])
        .expect("embedded script patterns compile")
});

static SHEBANG: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r"^#!/bin/bash",
        r"^#!/usr/bin/env bash",
        r"^#!/usr/bin/env python",
        r"^#!/bin/sh",
    ])
    .expect("shebang patterns compile")
});

/// Why an upload was refused. Every reason is terminal and user-correctable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    BadExtension,
    TooLarge,
    DisallowedType,
    InvalidFormat,
    EmbeddedScript,
    ScriptDetected,
    Unreadable,
}

impl RejectionReason {
    pub const fn code(self) -> &'static str {
        match self {
            RejectionReason::BadExtension => "bad_extension",
            RejectionReason::TooLarge => "too_large",
            RejectionReason::DisallowedType => "disallowed_type",
            RejectionReason::InvalidFormat => "invalid_format",
            RejectionReason::EmbeddedScript => "embedded_script",
            RejectionReason::ScriptDetected => "script_detected",
            RejectionReason::Unreadable => "unreadable",
        }
    }

    pub const fn message(self) -> &'static str {
        match self {
            RejectionReason::BadExtension => "file extension not allowed; use PDF, DOC or DOCX",
            RejectionReason::TooLarge => "file too large (max 5 MB)",
            RejectionReason::DisallowedType => "file type not allowed",
            RejectionReason::InvalidFormat => "file content does not match its extension",
            RejectionReason::EmbeddedScript => "PDF contains potentially dangerous JavaScript",
            RejectionReason::ScriptDetected => "file looks like a script",
            RejectionReason::Unreadable => "file could not be read",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(RejectionReason),
}

impl Verdict {
    pub fn is_accepted(self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// Lowercased extension of the final path component, without the dot.
pub fn extension_of(filename: &str) -> Option<String> {
    let lowered = filename.to_lowercase();
    Path::new(&lowered)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_string)
}

/// Seeks the wrapped stream back to where it was when the guard was taken.
struct PositionGuard<'a, S: Seek> {
    stream: &'a mut S,
    origin: u64,
}

impl<'a, S: Seek> PositionGuard<'a, S> {
    fn new(stream: &'a mut S) -> io::Result<Self> {
        let origin = stream.stream_position()?;
        Ok(Self { stream, origin })
    }
}

impl<S: Seek> Drop for PositionGuard<'_, S> {
    fn drop(&mut self) {
        if let Err(err) = self.stream.seek(SeekFrom::Start(self.origin)) {
            warn!(error = %err, "failed to restore upload stream position");
        }
    }
}

fn probe_size<S: Seek>(stream: &mut S) -> io::Result<u64> {
    let mut guard = PositionGuard::new(stream)?;
    guard.stream.seek(SeekFrom::End(0))
}

fn read_head<S: Read + Seek>(stream: &mut S) -> io::Result<Vec<u8>> {
    let mut guard = PositionGuard::new(stream)?;
    guard.stream.seek(SeekFrom::Start(0))?;
    let mut head = Vec::with_capacity(HEAD_SAMPLE_BYTES as usize);
    (&mut *guard.stream)
        .take(HEAD_SAMPLE_BYTES)
        .read_to_end(&mut head)?;
    Ok(head)
}

/// Screens candidate-submitted documents before they are persisted.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentValidator;

impl DocumentValidator {
    pub fn new() -> Self {
        Self
    }

    /// Runs the extension, size and signature checks in order, stopping at the
    /// first failure. The stream position is unchanged on return.
    pub fn validate<S: Read + Seek>(
        &self,
        filename: &str,
        stream: &mut S,
        declared_size: Option<u64>,
    ) -> Verdict {
        let verdict = match self.screen(filename, stream, declared_size) {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!(filename, error = %err, "upload stream unreadable");
                Verdict::Rejected(RejectionReason::Unreadable)
            }
        };
        if let Verdict::Rejected(reason) = verdict {
            debug!(filename, reason = reason.code(), "upload rejected");
        }
        verdict
    }

    fn screen<S: Read + Seek>(
        &self,
        filename: &str,
        stream: &mut S,
        declared_size: Option<u64>,
    ) -> io::Result<Verdict> {
        let extension = match extension_of(filename) {
            Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => ext,
            _ => return Ok(Verdict::Rejected(RejectionReason::BadExtension)),
        };

        let size = match declared_size {
            Some(size) => size,
            None => probe_size(stream)?,
        };
        if size > MAX_FILE_SIZE_BYTES {
            return Ok(Verdict::Rejected(RejectionReason::TooLarge));
        }

        let head = read_head(stream)?;
        Ok(inspect_head(&extension, &head))
    }
}

fn inspect_head(extension: &str, head: &[u8]) -> Verdict {
    if head.starts_with(EXE_MAGIC) {
        return Verdict::Rejected(RejectionReason::DisallowedType);
    }

    match extension {
        "pdf" => {
            if !head.starts_with(PDF_MAGIC) {
                return Verdict::Rejected(RejectionReason::InvalidFormat);
            }
            if EMBEDDED_SCRIPT.is_match(head) {
                return Verdict::Rejected(RejectionReason::EmbeddedScript);
            }
        }
        "docx" if !head.starts_with(DOCX_MAGIC) => {
            return Verdict::Rejected(RejectionReason::InvalidFormat);
        }
        "doc" if !head.starts_with(DOC_MAGIC) => {
            return Verdict::Rejected(RejectionReason::InvalidFormat);
        }
        _ => {}
    }

    if SHEBANG.is_match(head) {
        return Verdict::Rejected(RejectionReason::ScriptDetected);
    }

    Verdict::Accepted
}
