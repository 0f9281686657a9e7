//! The node store: `dat/` (committed) + `cmt/` (staging) directories and
//! the two-phase commit protocol that promotes one into the other.
//!
//! A durable area the reader trusts, a staging area the writer fills,
//! and a sentinel file marking the durability decision point. Recovery
//! replays whole-file moves rather than individual log frames, since a
//! node's payload is always written whole rather than patched in place.

mod codec;

use crate::error::{Result, VsTreeError};
use crate::model::{Meta, NodeId, Record, Vector};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

const COMMIT_SENTINEL: &str = "commit";
const META_FILE: &str = "meta";

/// Owns the `dat/` and `cmt/` directories for one index.
pub struct NodeStore {
    dat: PathBuf,
    cmt: PathBuf,
}

impl NodeStore {
    /// Open (creating if missing) the store rooted at `root`, recovering
    /// any commit interrupted mid-flight.
    pub fn open(root: &Path) -> Result<Self> {
        let dat = root.join("dat");
        let cmt = root.join("cmt");
        fs::create_dir_all(&dat)?;
        fs::create_dir_all(&cmt)?;
        let store = Self { dat, cmt };
        store.recover()?;
        Ok(store)
    }

    /// If the sentinel is present, the commit's linearization point was
    /// reached — finish promoting `cmt/` into `dat/`. If absent, the
    /// cycle was never decided — discard `cmt/`.
    fn recover(&self) -> Result<()> {
        if self.cmt.join(COMMIT_SENTINEL).exists() {
            debug!("store.recover: sentinel present, replaying commit");
            self.promote()?;
        } else {
            for entry in fs::read_dir(&self.cmt)? {
                let entry = entry?;
                trace!(path = ?entry.path(), "store.recover: discarding undecided staged file");
                fs::remove_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Load a node's records and children. Searches `cmt/` first (the
    /// cache is authoritative for dirty nodes, but a cold load can still
    /// see a just-staged, not-yet-committed write), then `dat/`. A
    /// missing node is an empty leaf — this is how the root and freshly
    /// minted children bootstrap.
    pub fn load(&self, nid: &NodeId) -> Result<(Vec<Record>, Vec<(Vector, NodeId)>)> {
        for dir in [&self.cmt, &self.dat] {
            let path = dir.join(nid);
            if path.exists() {
                let bytes = fs::read(&path)?;
                return codec::decode_node(&bytes);
            }
        }
        Ok((Vec::new(), Vec::new()))
    }

    /// Stage a node's payload into `cmt/<nid>`, atomically.
    pub fn save(&self, nid: &NodeId, records: &[Record], children: &[(Vector, NodeId)]) -> Result<()> {
        let bytes = codec::encode_node(records, children);
        atomic_write(&self.cmt, nid, &bytes)
    }

    /// Load the committed meta counters, defaulting to `{size: 0, nodes: 1}`
    /// for a brand new index (the root counts as already minted).
    pub fn load_meta(&self) -> Result<Meta> {
        let path = self.dat.join(META_FILE);
        if !path.exists() {
            return Ok(Meta { size: 0, nodes: 1 });
        }
        let bytes = fs::read(&path)?;
        codec::decode_meta(&bytes)
    }

    /// Stage the meta counters into `cmt/meta`, atomically.
    pub fn stage_meta(&self, meta: Meta) -> Result<()> {
        let bytes = codec::encode_meta(meta);
        atomic_write(&self.cmt, META_FILE, &bytes)
    }

    /// The commit protocol's decisive steps: place the sentinel, then
    /// move every staged file except the sentinel into `dat/`, then
    /// clear whatever remains in `cmt/`. Once the sentinel is written,
    /// this function is safe to re-run (it is exactly what
    /// [`Self::recover`] replays after a crash).
    pub fn promote(&self) -> Result<()> {
        let sentinel = self.cmt.join(COMMIT_SENTINEL);
        if !sentinel.exists() {
            fs::write(&sentinel, b"")?;
        }
        for entry in fs::read_dir(&self.cmt)? {
            let entry = entry?;
            let path = entry.path();
            if path.file_name().and_then(|n| n.to_str()) == Some(COMMIT_SENTINEL) {
                continue;
            }
            let dest = self.dat.join(entry.file_name());
            fs::rename(&path, &dest)?;
        }
        for entry in fs::read_dir(&self.cmt)? {
            let entry = entry?;
            fs::remove_file(entry.path())?;
        }
        trace!("store.promote: commit cycle finalized");
        Ok(())
    }

    /// True if a node id currently resolves on disk in either directory
    /// (used by id minting to reject collisions with persisted nodes).
    pub fn exists_on_disk(&self, nid: &NodeId) -> bool {
        self.cmt.join(nid).exists() || self.dat.join(nid).exists()
    }
}

/// Write-then-rename: write into a sibling temp file and atomically
/// rename it over the destination, so a crash mid-write never leaves a
/// torn file at `dir/name`.
fn atomic_write(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let tmp_name = format!(".{name}.tmp-{:x}", rand::random::<u32>());
    let tmp_path = dir.join(&tmp_name);
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, dir.join(name)).map_err(|e| {
        warn!(error = %e, name, "store.atomic_write: rename failed");
        VsTreeError::Io(e)
    })?;
    Ok(())
}
