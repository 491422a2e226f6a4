//! Streaming MBOX splitter.
//!
//! Reads MBOX files line by line through a large buffer and hands each raw
//! message to a callback together with its byte offset, so callers can
//! re-read a single message later with [`read_message_at`].

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{Result, SnapError};

/// Size of the internal read buffer.
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Report progress every 4 MB.
const PROGRESS_INTERVAL: u64 = 4 * 1024 * 1024;

/// Streaming MBOX parser.
///
/// Tolerant of mixed `\n` / `\r\n` line endings, `From ` lines not preceded
/// by a blank line (logged), a truncated last message, and a UTF-8 BOM.
pub struct MboxParser {
    path: PathBuf,
    file_size: u64,
    max_message_size: usize,
}

impl MboxParser {
    /// Create a parser for the given MBOX file.
    pub fn new(path: impl AsRef<Path>, max_message_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SnapError::MailboxNotFound(path.clone())
            } else {
                SnapError::io(&path, e)
            }
        })?;
        Ok(Self {
            path,
            file_size: metadata.len(),
            max_message_size,
        })
    }

    /// Total size of the underlying file in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Split the file, calling `on_message(offset, length, raw_bytes)` for each message.
    ///
    /// `length` is the full on-disk length; `raw_bytes` may be shorter when the
    /// message exceeded the size limit. The callback returns `false` to stop.
    /// Returns the number of messages delivered.
    pub fn parse(
        &self,
        on_message: &mut dyn FnMut(u64, u64, &[u8]) -> bool,
        progress: Option<&dyn Fn(u64, u64)>,
    ) -> Result<u64> {
        if self.file_size == 0 {
            return Ok(0);
        }

        let file = File::open(&self.path).map_err(|e| SnapError::io(&self.path, e))?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let mut count: u64 = 0;
        let mut offset: u64 = 0;
        let mut message_start: u64 = 0;
        let mut message_buf: Vec<u8> = Vec::with_capacity(64 * 1024);
        let mut line_buf: Vec<u8> = Vec::with_capacity(4096);
        let mut prev_blank = true;
        let mut truncated = false;
        let mut last_progress: u64 = 0;

        loop {
            line_buf.clear();
            let line_len = reader
                .read_until(b'\n', &mut line_buf)
                .map_err(|e| SnapError::io(&self.path, e))? as u64;
            if line_len == 0 {
                break; // EOF
            }

            if is_mbox_separator(&line_buf) {
                if !prev_blank && offset > 0 {
                    warn!(offset, "Found 'From ' separator without preceding blank line");
                }
                if !message_buf.is_empty() {
                    if !on_message(message_start, offset - message_start, &message_buf) {
                        return Ok(count);
                    }
                    count += 1;
                }
                message_start = offset;
                message_buf.clear();
                truncated = false;
                message_buf.extend_from_slice(&line_buf);
            } else if message_buf.len() + line_buf.len() <= self.max_message_size {
                message_buf.extend_from_slice(&line_buf);
            } else if !truncated {
                warn!(
                    offset = message_start,
                    max_size = self.max_message_size,
                    "Message exceeds maximum size, truncating body"
                );
                truncated = true;
            }

            prev_blank = is_blank_line(&line_buf);
            offset += line_len;

            if let Some(cb) = progress {
                if offset - last_progress >= PROGRESS_INTERVAL {
                    cb(offset, self.file_size);
                    last_progress = offset;
                }
            }
        }

        if !message_buf.is_empty() && on_message(message_start, offset - message_start, &message_buf)
        {
            count += 1;
        }

        if let Some(cb) = progress {
            cb(self.file_size, self.file_size);
        }

        Ok(count)
    }
}

/// Read a single message at the given offset and length.
pub fn read_message_at(path: impl AsRef<Path>, offset: u64, length: u64) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| SnapError::io(path, e))?;
    file.seek(SeekFrom::Start(offset))
        .map_err(|e| SnapError::io(path, e))?;
    let mut buffer = vec![0u8; length as usize];
    file.read_exact(&mut buffer)
        .map_err(|e| SnapError::io(path, e))?;
    Ok(buffer)
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    let line = line.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(line);
    line.starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}
