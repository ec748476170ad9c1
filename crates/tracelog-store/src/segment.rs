use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use tracelog_types::TraceTime;

use crate::document::Document;
use crate::error::{StoreError, StoreResult};
use crate::traits::{TailCursor, TraceStore};

/// Flush/sync strategy for segment appends.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SyncMode {
    /// `fsync` after every append (safest, highest latency).
    EveryWrite,
    /// Rely on OS page-cache buffering (fastest, least durable).
    #[default]
    OsDefault,
}

/// Configuration for the [`SegmentTraceStore`].
#[derive(Clone, Debug)]
pub struct SegmentConfig {
    /// Size bound of the segment file in bytes (default: 64 MiB).
    pub max_size_bytes: u64,
    /// Sync/flush strategy.
    pub sync_mode: SyncMode,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 64 * 1024 * 1024, // 64 MiB
            sync_mode: SyncMode::default(),
        }
    }
}

/// Header size: 4 bytes length + 4 bytes CRC.
const HEADER_SIZE: u64 = 8;

/// Outcome of reading one frame at a given offset.
enum Frame {
    /// A valid document and the offset of the following frame.
    Complete(Document, u64),
    /// An unreadable frame that can be skipped; offset of the next frame.
    Corrupt(u64),
    /// Not enough bytes yet (end of file or a write in progress).
    Incomplete,
}

/// Internal mutable state for the segment writer.
struct SegmentWriter {
    writer: BufWriter<File>,
    /// Current end-of-file offset.
    offset: u64,
}

/// File-backed, size-capped, append-only trace store.
///
/// Documents are JSON-encoded and framed as:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (JSON Document)]
/// ```
/// When the file grows past `max_size_bytes` the oldest frames are
/// compacted away, keeping roughly three quarters of the bound; cursors
/// opened before a compaction fail with
/// [`StoreError::CursorInvalidated`]. Frames failing the CRC check are
/// logged and skipped. Cursors may be opened on an empty match set.
pub struct SegmentTraceStore {
    path: PathBuf,
    writer: Mutex<SegmentWriter>,
    /// Bumped before every compaction.
    generation: Arc<AtomicU64>,
    config: SegmentConfig,
}

impl SegmentTraceStore {
    /// Open (or create) a segment file at the given path.
    pub fn open(path: &Path, config: SegmentConfig) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();

        debug!(path = %path.display(), offset, "segment store opened");
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(SegmentWriter {
                writer: BufWriter::new(file),
                offset,
            }),
            generation: Arc::new(AtomicU64::new(0)),
            config,
        })
    }

    /// Current size of the segment file in bytes.
    pub fn size(&self) -> u64 {
        self.writer.lock().expect("segment mutex poisoned").offset
    }

    /// Path to the segment file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every readable document, oldest first.
    pub fn documents(&self) -> StoreResult<Vec<Document>> {
        Ok(self.scan()?.into_iter().map(|(_, doc)| doc).collect())
    }

    /// Read all complete frames with their offsets.
    fn scan(&self) -> StoreResult<Vec<(u64, Document)>> {
        let mut file = BufReader::new(File::open(&self.path)?);
        let file_len = file.get_ref().metadata()?.len();
        let mut offset = 0;
        let mut out = Vec::new();
        loop {
            match read_frame(&mut file, offset, file_len)? {
                Frame::Complete(doc, next) => {
                    out.push((offset, doc));
                    offset = next;
                }
                Frame::Corrupt(next) => offset = next,
                Frame::Incomplete => break,
            }
        }
        Ok(out)
    }

    /// Drop the oldest frames so the file fits in three quarters of the
    /// size bound. Caller holds the writer lock.
    fn compact(&self, w: &mut SegmentWriter) -> StoreResult<()> {
        let keep_bytes = self.config.max_size_bytes / 4 * 3;
        let frames = self.scan()?;
        let cut = frames
            .iter()
            .map(|(offset, _)| *offset)
            .find(|offset| w.offset - offset <= keep_bytes)
            .unwrap_or(w.offset);

        self.generation.fetch_add(1, Ordering::SeqCst);

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(cut))?;
        let mut remaining = Vec::new();
        file.read_to_end(&mut remaining)?;
        drop(file);

        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        let mut buf_writer = BufWriter::new(file);
        buf_writer.write_all(&remaining)?;
        buf_writer.flush()?;

        // Reopen in append mode so later writes land at the new end.
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let before = w.offset;
        w.writer = BufWriter::new(file);
        w.offset = remaining.len() as u64;

        info!(
            path = %self.path.display(),
            before,
            after = w.offset,
            "segment compacted"
        );
        Ok(())
    }
}

impl TraceStore for SegmentTraceStore {
    fn insert(&self, document: Document) -> StoreResult<()> {
        let payload =
            serde_json::to_vec(&document).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len())
            .map_err(|_| StoreError::Serialization("document larger than 4 GiB".into()))?;
        let crc = crc32fast::hash(&payload);

        let mut w = self.writer.lock().expect("segment mutex poisoned");
        let mut frame = Vec::with_capacity(HEADER_SIZE as usize + payload.len());
        frame.extend_from_slice(&length.to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&payload);
        w.writer.write_all(&frame)?;
        w.writer.flush()?;
        if self.config.sync_mode == SyncMode::EveryWrite {
            w.writer.get_ref().sync_all()?;
        }
        w.offset += frame.len() as u64;

        if w.offset > self.config.max_size_bytes {
            self.compact(&mut w)?;
        }
        Ok(())
    }

    fn exists_from(&self, from: TraceTime) -> StoreResult<bool> {
        Ok(self.scan()?.iter().any(|(_, doc)| doc.time >= from))
    }

    fn tail_from(&self, from: TraceTime) -> StoreResult<Box<dyn TailCursor>> {
        let file = File::open(&self.path)?;
        Ok(Box::new(SegmentCursor {
            file: BufReader::new(file),
            offset: 0,
            from,
            generation: self.generation.load(Ordering::SeqCst),
            current: Arc::clone(&self.generation),
        }))
    }

    fn requires_anchor(&self) -> bool {
        false
    }

    fn last_serial(&self) -> StoreResult<Option<u64>> {
        Ok(self.scan()?.iter().map(|(_, doc)| doc.serial).max())
    }
}

impl std::fmt::Debug for SegmentTraceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentTraceStore")
            .field("path", &self.path)
            .field("size", &self.size())
            .finish()
    }
}

struct SegmentCursor {
    file: BufReader<File>,
    offset: u64,
    from: TraceTime,
    generation: u64,
    current: Arc<AtomicU64>,
}

impl SegmentCursor {
    fn check_generation(&self) -> StoreResult<()> {
        if self.current.load(Ordering::SeqCst) != self.generation {
            return Err(StoreError::CursorInvalidated {
                position: self.offset,
            });
        }
        Ok(())
    }
}

impl TailCursor for SegmentCursor {
    fn try_next(&mut self) -> StoreResult<Option<Document>> {
        self.check_generation()?;
        let file_len = self.file.get_ref().metadata()?.len();
        if file_len < self.offset {
            // Compacted by another process.
            return Err(StoreError::CursorInvalidated {
                position: self.offset,
            });
        }

        loop {
            let frame = read_frame(&mut self.file, self.offset, file_len)?;
            // A compaction that started during the read makes the bytes
            // meaningless.
            self.check_generation()?;
            match frame {
                Frame::Complete(doc, next) => {
                    self.offset = next;
                    if doc.time >= self.from {
                        return Ok(Some(doc));
                    }
                }
                Frame::Corrupt(next) => self.offset = next,
                Frame::Incomplete => return Ok(None),
            }
        }
    }
}

/// Read the frame starting at `offset`.
///
/// Sequential reads keep the read buffer; the reader only moves when it
/// is not already at `offset`.
fn read_frame<R: Read + Seek>(
    file: &mut BufReader<R>,
    offset: u64,
    file_len: u64,
) -> StoreResult<Frame> {
    if offset + HEADER_SIZE > file_len {
        return Ok(Frame::Incomplete);
    }
    let at = file.stream_position()?;
    if at != offset {
        file.seek_relative(offset as i64 - at as i64)?;
    }

    let mut header = [0u8; HEADER_SIZE as usize];
    match file.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Frame::Incomplete),
        Err(e) => return Err(e.into()),
    }
    let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as u64;
    let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

    let next = offset + HEADER_SIZE + length;
    if length == 0 {
        warn!(offset, "zero-length segment frame; skipping");
        return Ok(Frame::Corrupt(next));
    }
    if next > file_len {
        return Ok(Frame::Incomplete);
    }

    let mut payload = vec![0u8; length as usize];
    match file.read_exact(&mut payload) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(Frame::Incomplete),
        Err(e) => return Err(e.into()),
    }

    let actual_crc = crc32fast::hash(&payload);
    if actual_crc != expected_crc {
        warn!(
            offset,
            expected = expected_crc,
            actual = actual_crc,
            "CRC mismatch; skipping segment frame"
        );
        return Ok(Frame::Corrupt(next));
    }

    match serde_json::from_slice::<Document>(&payload) {
        Ok(doc) => Ok(Frame::Complete(doc, next)),
        Err(e) => {
            warn!(offset, error = %e, "undecodable segment frame; skipping");
            Ok(Frame::Corrupt(next))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracelog_types::time_from_millis;

    fn doc(ms: i64, serial: u64) -> Document {
        Document::new(time_from_millis(ms).unwrap(), serial, json!({ "n": serial }))
    }

    fn t(ms: i64) -> TraceTime {
        time_from_millis(ms).unwrap()
    }

    fn temp_store(config: SegmentConfig) -> (tempfile::TempDir, SegmentTraceStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentTraceStore::open(&dir.path().join("traces.seg"), config).unwrap();
        (dir, store)
    }

    #[test]
    fn insert_and_reopen() {
        let (dir, store) = temp_store(SegmentConfig::default());
        store.insert(doc(1, 1)).unwrap();
        store.insert(doc(2, 2)).unwrap();
        drop(store);

        let store =
            SegmentTraceStore::open(&dir.path().join("traces.seg"), SegmentConfig::default())
                .unwrap();
        let docs = store.documents().unwrap();
        assert_eq!(docs, vec![doc(1, 1), doc(2, 2)]);
        assert_eq!(store.last_serial().unwrap(), Some(2));
        assert!(store.size() > 0);
    }

    #[test]
    fn cursor_opens_on_empty_store_and_tails() {
        let (_dir, store) = temp_store(SegmentConfig::default());
        assert!(!store.requires_anchor());
        assert!(!store.exists_from(t(0)).unwrap());

        let mut cursor = store.tail_from(t(10)).unwrap();
        assert!(cursor.try_next().unwrap().is_none());

        store.insert(doc(5, 1)).unwrap();
        store.insert(doc(10, 2)).unwrap();
        assert_eq!(cursor.try_next().unwrap(), Some(doc(10, 2)));
        assert!(cursor.try_next().unwrap().is_none());
        assert!(store.exists_from(t(10)).unwrap());
    }

    #[test]
    fn crc_mismatch_is_skipped() {
        let (dir, store) = temp_store(SegmentConfig::default());
        store.insert(doc(1, 1)).unwrap();
        store.insert(doc(2, 2)).unwrap();
        drop(store);

        let path = dir.path().join("traces.seg");
        {
            let mut file = OpenOptions::new().write(true).read(true).open(&path).unwrap();
            file.seek(SeekFrom::Start(HEADER_SIZE)).unwrap();
            let mut buf = [0u8; 1];
            file.read_exact(&mut buf).unwrap();
            buf[0] ^= 0xFF;
            file.seek(SeekFrom::Start(HEADER_SIZE)).unwrap();
            file.write_all(&buf).unwrap();
            file.sync_all().unwrap();
        }

        let store = SegmentTraceStore::open(&path, SegmentConfig::default()).unwrap();
        assert_eq!(store.documents().unwrap(), vec![doc(2, 2)]);
    }

    /// Counts repositioning seeks reaching the underlying reader.
    struct SeekCounter<R> {
        inner: R,
        seeks: usize,
    }

    impl<R: Read> Read for SeekCounter<R> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl<R: Seek> Seek for SeekCounter<R> {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            if pos != SeekFrom::Current(0) {
                self.seeks += 1;
            }
            self.inner.seek(pos)
        }
    }

    #[test]
    fn sequential_frames_reuse_read_buffer() {
        let (dir, store) = temp_store(SegmentConfig::default());
        for i in 0..20 {
            store.insert(doc(i, i as u64)).unwrap();
        }
        let file_len = store.size();
        drop(store);

        let file = File::open(dir.path().join("traces.seg")).unwrap();
        let mut reader = BufReader::new(SeekCounter {
            inner: file,
            seeks: 0,
        });
        let mut offset = 0;
        let mut serials = Vec::new();
        while let Frame::Complete(doc, next) = read_frame(&mut reader, offset, file_len).unwrap() {
            serials.push(doc.serial);
            offset = next;
        }
        assert_eq!(serials, (0..20).collect::<Vec<u64>>());
        assert_eq!(reader.get_ref().seeks, 0);

        // Going back re-reads the same frame.
        match read_frame(&mut reader, 0, file_len).unwrap() {
            Frame::Complete(doc, _) => assert_eq!(doc.serial, 0),
            _ => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn partial_tail_frame_is_not_yet_visible() {
        let (dir, store) = temp_store(SegmentConfig::default());
        store.insert(doc(1, 1)).unwrap();
        store.insert(doc(2, 2)).unwrap();
        let total = store.size();
        drop(store);

        let path = dir.path().join("traces.seg");
        OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(total - 4)
            .unwrap();

        let store = SegmentTraceStore::open(&path, SegmentConfig::default()).unwrap();
        let mut cursor = store.tail_from(t(0)).unwrap();
        assert_eq!(cursor.try_next().unwrap(), Some(doc(1, 1)));
        assert!(cursor.try_next().unwrap().is_none());
    }

    #[test]
    fn compaction_keeps_newest_and_invalidates_cursors() {
        let (_dir, store) = temp_store(SegmentConfig {
            max_size_bytes: 512,
            sync_mode: SyncMode::EveryWrite,
        });
        let mut cursor = store.tail_from(t(0)).unwrap();

        for i in 0..40 {
            store.insert(doc(i, i as u64)).unwrap();
        }
        assert!(store.size() <= 512);

        let docs = store.documents().unwrap();
        assert!(!docs.is_empty());
        assert_eq!(docs.last().unwrap().serial, 39);
        assert!(docs.windows(2).all(|w| w[0].serial + 1 == w[1].serial));

        assert!(matches!(
            cursor.try_next(),
            Err(StoreError::CursorInvalidated { .. })
        ));

        // A fresh cursor reads the compacted file from the start.
        let mut fresh = store.tail_from(t(0)).unwrap();
        assert_eq!(fresh.try_next().unwrap(), Some(docs[0].clone()));
    }
}
