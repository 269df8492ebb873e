//! File append sink: turns inbound file frames into append operations on an
//! abstract file store, with collision-safe destination naming.

use tracing::debug;

/// The storage capability the core needs from its host. Implementations open
/// the destination fresh for every `append` call; no handle is held across
/// polling iterations.
pub trait FileStore {
    fn exists(&self, path: &str) -> bool;
    fn make_dir(&self, path: &str) -> std::io::Result<()>;
    /// Open `path` for append, write `data`, close.
    fn append(&self, path: &str, data: &[u8]) -> std::io::Result<()>;
}

/// Failure writing an inbound file frame. Maps to the transfer's append-error
/// outcome; the receive loop halts on the first one.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("file frame arrived before the transfer announced a destination")]
    NoDestination,
    #[error("file store error: {0}")]
    Store(#[from] std::io::Error),
}

/// Receives the body frames of one file transfer. The destination name is
/// derived once, from the metadata in the head frame, and fixed thereafter.
#[derive(Debug, Default)]
pub struct FileAppendSink {
    dest: Option<String>,
}

impl FileAppendSink {
    pub fn new() -> Self {
        FileAppendSink { dest: None }
    }

    /// Destination path, once the head frame has fixed it.
    pub fn dest(&self) -> Option<&str> {
        self.dest.as_deref()
    }

    /// Append one frame's payload. `meta` is `(filename, filepath)` from the
    /// head frame; later frames pass `None` and reuse the fixed destination.
    pub fn append<S: FileStore>(
        &mut self,
        store: &S,
        meta: Option<(&str, &str)>,
        data: &[u8],
    ) -> Result<(), SinkError> {
        if self.dest.is_none() {
            let (filename, filepath) = meta.ok_or(SinkError::NoDestination)?;
            let dest = derive_destination(store, filename, filepath)?;
            debug!(dest, "receiving file");
            self.dest = Some(dest);
        }
        let dest = self.dest.as_ref().expect("destination fixed above");
        store.append(dest, data)?;
        Ok(())
    }
}

/// Pick a destination that does not collide with an existing file: create the
/// declared directory if absent, then probe `name.ext`, `name_1.ext`,
/// `name_2.ext`, … until a free name is found.
fn derive_destination<S: FileStore>(
    store: &S,
    filename: &str,
    filepath: &str,
) -> std::io::Result<String> {
    let (stem, ext) = match filename.rfind('.') {
        Some(dot) => filename.split_at(dot),
        None => (filename, ""),
    };
    if !store.exists(filepath) {
        store.make_dir(filepath)?;
    }
    let mut candidate = format!("{}/{}{}", filepath, stem, ext);
    let mut suffix = 1u32;
    while store.exists(&candidate) {
        candidate = format!("{}/{}_{}{}", filepath, stem, suffix, ext);
        suffix += 1;
    }
    Ok(candidate)
}
