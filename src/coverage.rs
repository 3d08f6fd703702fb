//! Coverage artifact decoding and the shared coverage store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::classfile::{self, ClassFile};
use crate::error::{CoverageError, Result};

pub const MAGIC: [u8; 3] = [0x01, 0xC0, 0xC0];
pub const FORMAT_VERSION: u16 = 0x1007;

const BLOCK_HEADER: u8 = 0x01;
const BLOCK_SESSION_INFO: u8 = 0x10;
const BLOCK_EXECUTION_DATA: u8 = 0x11;

pub fn validate_header(bytes: &[u8]) -> std::result::Result<(), CoverageError> {
    let head = &bytes[..bytes.len().min(MAGIC.len())];
    if head != MAGIC {
        return Err(CoverageError::BadMagic(head.to_vec()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    pub start: i64,
    pub dump: i64,
}

/// Probe hits of one compiled class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRecord {
    pub id: i64,
    pub name: String,
    pub probes: Vec<bool>,
}

impl ExecutionRecord {
    pub fn any_hit(&self) -> bool {
        self.probes.iter().any(|&p| p)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionData {
    pub sessions: Vec<SessionInfo>,
    pub records: Vec<ExecutionRecord>,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> std::result::Result<&'a [u8], CoverageError> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.bytes.len());
        let end = end.ok_or(CoverageError::Truncated(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> std::result::Result<u8, CoverageError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> std::result::Result<u16, CoverageError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn i64(&mut self) -> std::result::Result<i64, CoverageError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(i64::from_be_bytes(buf))
    }

    fn utf(&mut self) -> std::result::Result<String, CoverageError> {
        let start = self.pos;
        let len = self.u16()? as usize;
        let raw = self.take(len)?;
        decode_modified_utf8(raw).ok_or(CoverageError::BadString(start))
    }

    fn varint(&mut self) -> std::result::Result<u32, CoverageError> {
        let mut value = 0u32;
        let mut shift = 0;
        loop {
            let start = self.pos;
            let b = self.u8()?;
            if shift > 28 {
                return Err(CoverageError::Truncated(start));
            }
            value |= u32::from(b & 0x7F) << shift;
            if b & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    fn bool_array(&mut self) -> std::result::Result<Vec<bool>, CoverageError> {
        let len = self.varint()? as usize;
        let packed = self.take(len.div_ceil(8))?;
        Ok((0..len).map(|i| packed[i / 8] & (1 << (i % 8)) != 0).collect())
    }
}

/// Java `DataInput.readUTF` payload: UTF-8 with NUL as `C0 80` and
/// supplementary characters as surrogate pairs.
fn decode_modified_utf8(raw: &[u8]) -> Option<String> {
    let mut units: Vec<u16> = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let a = raw[i] as u16;
        if a & 0x80 == 0 {
            units.push(a);
            i += 1;
        } else if a & 0xE0 == 0xC0 {
            let b = *raw.get(i + 1)? as u16;
            units.push(((a & 0x1F) << 6) | (b & 0x3F));
            i += 2;
        } else if a & 0xF0 == 0xE0 {
            let b = *raw.get(i + 1)? as u16;
            let c = *raw.get(i + 2)? as u16;
            units.push(((a & 0x0F) << 12) | ((b & 0x3F) << 6) | (c & 0x3F));
            i += 3;
        } else {
            return None;
        }
    }
    String::from_utf16(&units).ok()
}

fn encode_modified_utf8(s: &str, out: &mut Vec<u8>) {
    let mut raw = Vec::new();
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007F => raw.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                raw.push(0xC0 | (unit >> 6) as u8);
                raw.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                raw.push(0xE0 | (unit >> 12) as u8);
                raw.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                raw.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
    out.extend_from_slice(&(raw.len() as u16).to_be_bytes());
    out.extend_from_slice(&raw);
}

fn encode_varint(mut value: u32, out: &mut Vec<u8>) {
    while value & !0x7F != 0 {
        out.push(0x80 | (value & 0x7F) as u8);
        value >>= 7;
    }
    out.push(value as u8);
}

fn read_header(r: &mut Reader<'_>) -> std::result::Result<(), CoverageError> {
    let magic = r.take(MAGIC.len() - 1)?;
    if magic != &MAGIC[1..] {
        return Err(CoverageError::BadMagic(magic.to_vec()));
    }
    let version = r.u16()?;
    if version != FORMAT_VERSION {
        return Err(CoverageError::UnsupportedVersion(version));
    }
    Ok(())
}

/// Decode a whole coverage artifact, header included.
pub fn decode(bytes: &[u8]) -> std::result::Result<ExecutionData, CoverageError> {
    validate_header(bytes)?;
    let mut r = Reader { bytes, pos: 1 };
    read_header(&mut r)?;

    let mut data = ExecutionData::default();
    while r.pos < bytes.len() {
        let offset = r.pos;
        match r.u8()? {
            BLOCK_HEADER => read_header(&mut r)?,
            BLOCK_SESSION_INFO => data.sessions.push(SessionInfo {
                id: r.utf()?,
                start: r.i64()?,
                dump: r.i64()?,
            }),
            BLOCK_EXECUTION_DATA => data.records.push(ExecutionRecord {
                id: r.i64()?,
                name: r.utf()?,
                probes: r.bool_array()?,
            }),
            kind => return Err(CoverageError::UnknownBlock { kind, offset }),
        }
    }
    Ok(data)
}

impl ExecutionData {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
        for s in &self.sessions {
            out.push(BLOCK_SESSION_INFO);
            encode_modified_utf8(&s.id, &mut out);
            out.extend_from_slice(&s.start.to_be_bytes());
            out.extend_from_slice(&s.dump.to_be_bytes());
        }
        for rec in &self.records {
            out.push(BLOCK_EXECUTION_DATA);
            out.extend_from_slice(&rec.id.to_be_bytes());
            encode_modified_utf8(&rec.name, &mut out);
            encode_varint(rec.probes.len() as u32, &mut out);
            for chunk in rec.probes.chunks(8) {
                let byte = chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |acc, (i, &hit)| acc | (u8::from(hit) << i));
                out.push(byte);
            }
        }
        out
    }
}

#[derive(Debug)]
struct ClassProbes {
    name: String,
    /// Sorted distinct lines; probe `i + 1` covers `lines[i]`.
    lines: Vec<u32>,
    hits: Vec<bool>,
}

#[derive(Debug, Default)]
struct StoreInner {
    ids: HashMap<String, usize>,
    classes: Vec<ClassProbes>,
}

/// Process-wide registry of probe hits, keyed by internal class name.
///
/// All mutation goes through one lock, so a class's probe array is always
/// written as a whole.
#[derive(Debug, Default)]
pub struct CoverageStore {
    inner: Mutex<StoreInner>,
}

/// Classes and lines hit while one test ran.
pub type LineCoverage = BTreeMap<String, BTreeSet<u32>>;

impl CoverageStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a class; returns the existing id if it is already known.
    pub fn register_class(&self, name: &str, lines: Vec<u32>) -> usize {
        let mut inner = self.lock();
        if let Some(&id) = inner.ids.get(name) {
            return id;
        }
        let id = inner.classes.len();
        let probe_count = lines.len() + 1;
        inner.classes.push(ClassProbes {
            name: name.to_string(),
            lines,
            hits: vec![false; probe_count],
        });
        inner.ids.insert(name.to_string(), id);
        id
    }

    pub fn class_id(&self, name: &str) -> Option<usize> {
        self.lock().ids.get(name).copied()
    }

    pub fn probe_count(&self, id: usize) -> Option<usize> {
        self.lock().classes.get(id).map(|c| c.hits.len())
    }

    /// Mark line probes hit. `probes[i]` is probe `offset + i + 1`; probe 0
    /// (class touched) is set by any visit.
    pub fn visit_probes(&self, id: usize, offset: usize, probes: &[bool]) {
        let mut inner = self.lock();
        let Some(class) = inner.classes.get_mut(id) else {
            log::warn!("No class registered with id {}", id);
            return;
        };
        class.hits[0] = true;
        for (i, &hit) in probes.iter().enumerate() {
            if let Some(slot) = class.hits.get_mut(offset + i + 1) {
                *slot |= hit;
            }
        }
    }

    pub fn hits(&self, id: usize) -> Option<Vec<bool>> {
        self.lock().classes.get(id).map(|c| c.hits.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().classes.iter().all(|c| !c.hits.contains(&true))
    }

    /// Covered lines per class since the last reset; clears all hits.
    pub fn snapshot_and_reset(&self) -> LineCoverage {
        let mut inner = self.lock();
        let mut snapshot = LineCoverage::new();
        for class in inner.classes.iter_mut() {
            if !class.hits[0] {
                continue;
            }
            let lines = class
                .lines
                .iter()
                .zip(class.hits.iter().skip(1))
                .filter(|(_, hit)| **hit)
                .map(|(line, _)| *line)
                .collect();
            snapshot.insert(class.name.clone(), lines);
            class.hits.iter_mut().for_each(|h| *h = false);
        }
        snapshot
    }
}

/// Maps internal class names to their artifacts under a classes directory.
#[derive(Debug, Default)]
pub struct LocationIndex {
    paths: HashMap<String, PathBuf>,
}

impl LocationIndex {
    pub fn build(classes_dir: &Path) -> Result<Self> {
        let mut paths = HashMap::new();
        for artifact in classfile::scan_artifacts(classes_dir)? {
            if let Some(name) = classfile::internal_name(classes_dir, &artifact) {
                paths.insert(name, artifact);
            }
        }
        Ok(LocationIndex { paths })
    }

    pub fn locate(&self, name: &str) -> Option<&Path> {
        self.paths.get(name).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Register `name` with the store from its artifact unless already known.
fn ensure_loaded(store: &CoverageStore, index: &LocationIndex, name: &str) {
    if store.class_id(name).is_some() {
        return;
    }
    let Some(path) = index.locate(name) else {
        log::warn!("Could not load class {}: no artifact found", name);
        return;
    };
    match ClassFile::read(path) {
        Ok(class) => {
            store.register_class(name, class.lines());
        }
        Err(e) => log::warn!("Could not load class {}: {}", name, e),
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub replayed: Vec<String>,
    pub skipped: Vec<String>,
}

/// Validate, decode and replay one coverage artifact into `store`.
///
/// The artifact is fully decoded before the store is touched, so a rejected
/// artifact leaves the store as it was.
pub fn ingest(bytes: &[u8], index: &LocationIndex, store: &CoverageStore) -> Result<IngestReport> {
    if let Err(e) = validate_header(bytes) {
        log::warn!("Output is not a valid coverage file: {}", e);
        return Err(e.into());
    }
    let data = decode(bytes).inspect_err(|e| log::warn!("Could not decode coverage data: {}", e))?;

    let mut report = IngestReport::default();
    for record in data.records.iter().filter(|r| r.any_hit()) {
        ensure_loaded(store, index, &record.name);
        let Some(id) = store.class_id(&record.name) else {
            log::warn!("Class {} not found in coverage store", record.name);
            report.skipped.push(record.name.clone());
            continue;
        };
        let probe_count = store.probe_count(id).unwrap_or(0);
        if probe_count == 0 {
            log::warn!("Class {} reports no probes", record.name);
            report.skipped.push(record.name.clone());
            continue;
        }
        // Coarse replay: one observed hit marks the whole class.
        store.visit_probes(id, 0, &vec![true; probe_count - 1]);
        log::debug!("replayed {} probes for {}", probe_count - 1, record.name);
        report.replayed.push(record.name.clone());
    }
    Ok(report)
}
