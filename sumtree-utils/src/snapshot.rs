//! Snapshot files of a key value store
//!
//! A snapshot is a json array of `[key, value]` pairs, both base64 encoded, in key order. This is
//! the format used to export stores for offline inspection and repair.
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::{
    ffi::OsString,
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
};
use sumtree::{store::KeyValue, MemStore};
use tracing::info;

#[derive(Debug, Serialize, Deserialize)]
struct Entry(String, String);

/// reads a snapshot into a new memory store
pub fn read(reader: impl io::Read) -> Result<MemStore, Error> {
    let entries: Vec<Entry> = serde_json::from_reader(reader)?;
    let mut last: Option<Box<[u8]>> = None;
    let mut pairs = Vec::with_capacity(entries.len());
    for (index, Entry(key, value)) in entries.into_iter().enumerate() {
        let key: Box<[u8]> = base64::decode(key)?.into();
        if last.as_ref().map(|last| last >= &key).unwrap_or_default() {
            return Err(Error::InvalidSnapshot {
                index,
                reason: "keys not strictly ordered".into(),
            });
        }
        last = Some(key.clone());
        pairs.push((key, base64::decode(value)?.into()));
    }
    Ok(pairs.into_iter().collect::<MemStore>())
}

/// writes all entries of a memory store as a snapshot, and flushes the writer
pub fn write(store: &MemStore, mut writer: impl io::Write) -> Result<(), Error> {
    let entries = store
        .entries()
        .into_iter()
        .map(|(key, value): KeyValue| Entry(base64::encode(key), base64::encode(value)))
        .collect::<Vec<_>>();
    serde_json::to_writer_pretty(&mut writer, &entries)?;
    writer.flush()?;
    Ok(())
}

/// loads a snapshot file. A missing file is an empty store.
pub fn load(path: &Path) -> Result<MemStore, Error> {
    match File::open(path) {
        Ok(file) => {
            let store = read(io::BufReader::new(file))?;
            info!("loaded {} entries from {}", store.len(), path.display());
            Ok(store)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("{} does not exist, starting empty", path.display());
            Ok(MemStore::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// the file a snapshot is written to before it replaces `path`
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    name.into()
}

/// saves a store to a snapshot file, replacing the file once the new content is on disk
pub fn save(store: &MemStore, path: &Path) -> Result<(), Error> {
    let tmp = tmp_path(path);
    let mut writer = io::BufWriter::new(File::create(&tmp)?);
    write(store, &mut writer)?;
    let file = writer.into_inner().map_err(io::Error::from)?;
    file.sync_all()?;
    std::fs::rename(&tmp, path)?;
    info!("saved {} entries to {}", store.len(), path.display());
    Ok(())
}
