use super::{CollectorError, ReadFrom};
use crate::domain::{RawLine, SourceId};
use crate::reliability::PipelineCounters;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, BufReader, SeekFrom};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const READ_CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct TailConfig {
    pub read_from: ReadFrom,
    /// Stop at end of file instead of following it.
    pub stop: bool,
    /// How long to wait at end of file before checking for new data.
    pub poll_interval: Duration,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            read_from: ReadFrom::Beginning,
            stop: false,
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Splits a byte stream into lines, holding back an unterminated tail.
#[derive(Debug, Default)]
struct LineAssembler {
    partial: Vec<u8>,
}

impl LineAssembler {
    fn push(&mut self, bytes: &[u8], out: &mut Vec<String>) {
        let mut rest = bytes;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.partial.extend_from_slice(&rest[..pos]);
            out.push(Self::decode(&self.partial));
            self.partial.clear();
            rest = &rest[pos + 1..];
        }
        self.partial.extend_from_slice(rest);
    }

    /// Hand out whatever is left without a terminator.
    fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let line = Self::decode(&self.partial);
        self.partial.clear();
        Some(line)
    }

    fn reset(&mut self) {
        self.partial.clear();
    }

    fn decode(bytes: &[u8]) -> String {
        let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
        String::from_utf8_lossy(bytes).into_owned()
    }
}

struct LineEmitter {
    source: SourceId,
    seq: u64,
    tx: mpsc::Sender<RawLine>,
    counters: Arc<PipelineCounters>,
}

impl LineEmitter {
    /// Returns false once the consumer is gone.
    async fn emit(&mut self, text: String) -> bool {
        self.seq += 1;
        PipelineCounters::incr(&self.counters.lines_read);
        self.tx
            .send(RawLine::new(self.source.clone(), self.seq, text))
            .await
            .is_ok()
    }
}

/// Read one source to completion (or until cancelled), sending its lines in
/// order. Returns the number of lines produced.
///
/// A source that fails after it has started is not fatal: the failure is
/// logged, counted in `source_errors`, and the source simply ends.
pub async fn tail_source(
    source: SourceId,
    config: TailConfig,
    tx: mpsc::Sender<RawLine>,
    counters: Arc<PipelineCounters>,
    cancel: CancellationToken,
) -> Result<u64, CollectorError> {
    let mut emitter = LineEmitter {
        source: source.clone(),
        seq: 0,
        tx,
        counters,
    };

    match &source {
        SourceId::Stdin => tail_stdin(&mut emitter, &cancel).await,
        SourceId::File(path) => tail_file(path, config, &mut emitter, &cancel).await?,
    }

    debug!(%source, lines = emitter.seq, "Source finished");
    Ok(emitter.seq)
}

async fn tail_stdin(emitter: &mut LineEmitter, cancel: &CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let next = tokio::select! {
            next = lines.next_line() => next,
            () = cancel.cancelled() => return,
        };
        match next {
            Ok(Some(line)) => {
                if !emitter.emit(line).await {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed reading standard input");
                PipelineCounters::incr(&emitter.counters.source_errors);
                return;
            }
        }
    }
}

async fn open_at(path: &Path, offset: u64) -> std::io::Result<File> {
    let mut file = File::open(path).await?;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset)).await?;
    }
    Ok(file)
}

async fn tail_file(
    path: &Path,
    config: TailConfig,
    emitter: &mut LineEmitter,
    cancel: &CancellationToken,
) -> Result<(), CollectorError> {
    let io_err = |source| CollectorError::Io {
        path: path.display().to_string(),
        source,
    };

    let mut offset = match config.read_from {
        ReadFrom::Beginning => 0,
        ReadFrom::End => fs::metadata(path).await.map_err(io_err)?.len(),
    };
    let mut file = open_at(path, offset).await.map_err(io_err)?;
    info!(path = %path.display(), offset, follow = !config.stop, "Starting tailer");

    let mut assembler = LineAssembler::default();
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    let mut lines = Vec::new();

    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let n = match file.read(&mut chunk).await {
            Ok(n) => n,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Read failed; closing source");
                PipelineCounters::incr(&emitter.counters.source_errors);
                return Ok(());
            }
        };

        if n > 0 {
            offset += n as u64;
            assembler.push(&chunk[..n], &mut lines);
            for line in lines.drain(..) {
                if !emitter.emit(line).await {
                    return Ok(());
                }
            }
            continue;
        }

        // End of file.
        if config.stop {
            if let Some(line) = assembler.finish() {
                emitter.emit(line).await;
            }
            return Ok(());
        }

        tokio::select! {
            () = sleep(config.poll_interval) => {}
            () = cancel.cancelled() => return Ok(()),
        }

        match fs::metadata(path).await {
            Ok(meta) if meta.len() < offset => {
                warn!(
                    path = %path.display(),
                    previous_offset = offset,
                    current_size = meta.len(),
                    "File truncated or rotated; reading from the start"
                );
                offset = 0;
                assembler.reset();
                file = match open_at(path, 0).await {
                    Ok(file) => file,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Reopen failed; closing source");
                        PipelineCounters::incr(&emitter.counters.source_errors);
                        return Ok(());
                    }
                };
            }
            Ok(_) => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "File vanished; closing source");
                PipelineCounters::incr(&emitter.counters.source_errors);
                return Ok(());
            }
        }
    }
}
