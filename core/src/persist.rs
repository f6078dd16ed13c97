use crate::{Document, InvertedIndex};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

pub const SNAPSHOT_VERSION: u32 = 1;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub created_at: String,
    pub version: u32,
}

/// Everything a server needs to come up without rebuilding.
pub struct Snapshot {
    pub index: InvertedIndex,
    pub documents: Vec<Document>,
    pub meta: MetaFile,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn index(&self) -> PathBuf { self.root.join("index.bin") }
    fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

// Written next to the target and renamed into place so readers never see half a file.
// Temp names are unique per write so concurrent writers never rename each other's files.
fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("{}.{seq}.tmp", process::id()));
    let mut f = File::create(&tmp)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(buf)
}

pub fn save_index(paths: &IndexPaths, index: &InvertedIndex) -> Result<()> {
    create_dir_all(&paths.root)?;
    write_file(&paths.index(), &bincode::serialize(index)?)
}

pub fn load_index(paths: &IndexPaths) -> Result<InvertedIndex> {
    let index: InvertedIndex = bincode::deserialize(&read_file(&paths.index())?)?;
    if !index.is_consistent() {
        bail!("index snapshot in {} is inconsistent", paths.root.display());
    }
    Ok(index)
}

pub fn save_docs(paths: &IndexPaths, docs: &[Document]) -> Result<()> {
    create_dir_all(&paths.root)?;
    write_file(&paths.docs(), &bincode::serialize(docs)?)
}

pub fn load_docs(paths: &IndexPaths) -> Result<Vec<Document>> {
    let docs = bincode::deserialize(&read_file(&paths.docs())?)?;
    Ok(docs)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let json = serde_json::to_string_pretty(meta)?;
    write_file(&paths.meta(), json.as_bytes())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let buf = read_file(&paths.meta())?;
    let meta: MetaFile = serde_json::from_slice(&buf)?;
    if meta.version != SNAPSHOT_VERSION {
        bail!("unsupported snapshot version {} (expected {})", meta.version, SNAPSHOT_VERSION);
    }
    Ok(meta)
}

/// Each file is replaced atomically, but the three files are not one transaction: callers
/// that save from several threads must serialize their saves to keep them from the same
/// generation.
pub fn save_snapshot(paths: &IndexPaths, index: &InvertedIndex, docs: &[Document], created_at: String) -> Result<()> {
    save_index(paths, index)?;
    save_docs(paths, docs)?;
    let meta = MetaFile { num_docs: index.num_docs(), created_at, version: SNAPSHOT_VERSION };
    save_meta(paths, &meta)
}

pub fn load_snapshot(paths: &IndexPaths) -> Result<Snapshot> {
    let meta = load_meta(paths)?;
    let index = load_index(paths)?;
    let documents = load_docs(paths)?;
    Ok(Snapshot { index, documents, meta })
}
