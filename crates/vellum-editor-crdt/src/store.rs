//! Loro-backed replicated document store.
//!
//! The store owns one `LoroDoc` with a single text container holding the
//! serialized document. Every mutation is committed immediately and
//! announced to subscribers in commit order. Methods take `&mut self`, so a
//! subscriber can never re-enter the store from inside a notification.

use std::borrow::Cow;
use std::fmt;

use loro::{ExportMode, LoroDoc, LoroText, UndoManager, VersionVector};
use vellum_editor_core::{ContentStore, TextEdit};

use crate::StoreError;

/// Magic bytes opening every exported snapshot.
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"VLM1";

/// Envelope format version written by this build.
pub const SNAPSHOT_VERSION: u8 = 1;

const ENVELOPE_LEN: usize = SNAPSHOT_MAGIC.len() + 1;

/// Name of the text container inside the Loro document.
const CONTENT_CONTAINER: &str = "content";

/// What caused a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    Local,
    Import,
    Undo,
    Redo,
}

/// Delivered to subscribers after every committed change.
#[derive(Debug, Clone)]
pub struct StoreChange {
    /// Content after the change.
    pub content: String,
    pub origin: ChangeOrigin,
    /// Loro version vector after the change.
    pub version: VersionVector,
    /// Per-store sequence number, increasing with each notification.
    pub seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Result of a successful import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Whether the visible content changed.
    pub changed: bool,
}

type Listener = Box<dyn FnMut(&StoreChange)>;

/// The canonical document: a Loro text container plus undo history and
/// change subscribers.
pub struct DocumentStore {
    doc: LoroDoc,
    text: LoroText,
    undo: UndoManager,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
    seq: u64,
}

impl fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentStore")
            .field("peer_id", &self.doc.peer_id())
            .field("len_chars", &self.text.len_unicode())
            .field("listeners", &self.listeners.len())
            .field("seq", &self.seq)
            .finish()
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::from_doc(LoroDoc::new())
    }

    /// Create a store with a fixed peer id, for reproducible merges.
    pub fn with_peer_id(peer_id: u64) -> Result<Self, StoreError> {
        let doc = LoroDoc::new();
        doc.set_peer_id(peer_id)?;
        Ok(Self::from_doc(doc))
    }

    /// Create a store from bytes produced by [`export_snapshot`](Self::export_snapshot).
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self, StoreError> {
        let mut store = Self::new();
        store.import_snapshot(bytes)?;
        // History starts at the restored state, not before it.
        store.undo = new_undo_manager(&store.doc);
        Ok(store)
    }

    fn from_doc(doc: LoroDoc) -> Self {
        let text = doc.get_text(CONTENT_CONTAINER);
        let undo = new_undo_manager(&doc);
        Self {
            doc,
            text,
            undo,
            listeners: Vec::new(),
            next_subscription: 0,
            seq: 0,
        }
    }

    /// Get the underlying Loro document.
    pub fn doc(&self) -> &LoroDoc {
        &self.doc
    }

    pub fn peer_id(&self) -> u64 {
        self.doc.peer_id()
    }

    /// Current serialized content.
    pub fn content(&self) -> String {
        self.text.to_string()
    }

    pub fn len_chars(&self) -> usize {
        self.text.len_unicode()
    }

    pub fn is_empty(&self) -> bool {
        self.len_chars() == 0
    }

    /// Get current version vector.
    pub fn version(&self) -> VersionVector {
        self.doc.oplog_vv()
    }

    /// Replace the content with `content`, touching only the span that
    /// differs. One commit, one notification. Returns false (and notifies
    /// nobody) when the content is already equal.
    pub fn set_content(&mut self, content: &str) -> bool {
        let Some(edit) = TextEdit::between(&self.content(), content) else {
            return false;
        };
        if let Err(err) = self.apply_edit(&edit) {
            tracing::warn!(target: "vellum::store", error = %err, "set_content failed");
            return false;
        }
        self.commit(ChangeOrigin::Local);
        true
    }

    /// Insert at a char offset. Offsets past the end are clamped.
    pub fn insert_at(&mut self, pos: usize, text: &str) {
        if text.is_empty() {
            return;
        }
        let len = self.len_chars();
        if pos > len {
            tracing::debug!(target: "vellum::store", pos, len, "insert offset out of range, clamping");
        }
        let edit = TextEdit {
            start: pos.min(len),
            deleted: 0,
            inserted: text.into(),
        };
        match self.apply_edit(&edit) {
            Ok(()) => self.commit(ChangeOrigin::Local),
            Err(err) => tracing::warn!(target: "vellum::store", error = %err, "insert failed"),
        }
    }

    /// Delete `len` chars starting at `start`, clamped to the content.
    pub fn delete_range(&mut self, start: usize, len: usize) {
        let total = self.len_chars();
        let from = start.min(total);
        let to = start.saturating_add(len).min(total);
        if (from, to) != (start, start.saturating_add(len)) {
            tracing::debug!(
                target: "vellum::store",
                start,
                len,
                total,
                "delete range out of range, clamping"
            );
        }
        if from == to {
            return;
        }
        let edit = TextEdit {
            start: from,
            deleted: to - from,
            inserted: Default::default(),
        };
        match self.apply_edit(&edit) {
            Ok(()) => self.commit(ChangeOrigin::Local),
            Err(err) => tracing::warn!(target: "vellum::store", error = %err, "delete failed"),
        }
    }

    fn apply_edit(&mut self, edit: &TextEdit) -> Result<(), StoreError> {
        if edit.deleted > 0 {
            self.text.delete(edit.start, edit.deleted)?;
        }
        if !edit.inserted.is_empty() {
            self.text.insert(edit.start, &edit.inserted)?;
        }
        Ok(())
    }

    fn commit(&mut self, origin: ChangeOrigin) {
        self.doc.commit();
        self.notify(origin);
    }

    fn notify(&mut self, origin: ChangeOrigin) {
        self.seq += 1;
        if self.listeners.is_empty() {
            return;
        }
        let change = StoreChange {
            content: self.content(),
            origin,
            version: self.version(),
            seq: self.seq,
        };
        tracing::trace!(
            target: "vellum::store",
            ?origin,
            seq = change.seq,
            listeners = self.listeners.len(),
            "notifying subscribers"
        );
        for (_, listener) in self.listeners.iter_mut() {
            listener(&change);
        }
    }

    /// Register a listener called after every committed change.
    pub fn subscribe(&mut self, listener: impl FnMut(&StoreChange) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    /// Export the full state, merge metadata included, in the versioned
    /// envelope.
    pub fn export_snapshot(&self) -> Result<Vec<u8>, StoreError> {
        let payload = self
            .doc
            .export(ExportMode::Snapshot)
            .map_err(|e| StoreError::Export(e.to_string()))?;
        Ok(wrap(&payload))
    }

    /// Export updates since given version, in the same envelope.
    ///
    /// `None` when there is nothing newer than `version`.
    pub fn export_updates_since(&self, version: &VersionVector) -> Option<Vec<u8>> {
        if *version == self.doc.oplog_vv() {
            return None;
        }
        let updates = self
            .doc
            .export(ExportMode::Updates {
                from: Cow::Borrowed(version),
            })
            .ok()?;
        if updates.is_empty() {
            return None;
        }
        Some(wrap(&updates))
    }

    /// Merge a snapshot or update blob into this store.
    ///
    /// Local edits are never discarded; concurrent changes merge. On any
    /// failure the store is left untouched.
    pub fn import_snapshot(&mut self, bytes: &[u8]) -> Result<ImportOutcome, StoreError> {
        let payload = unwrap_envelope(bytes)?;

        // Trial import into a throwaway fork so a bad payload can't leave
        // the live document half-merged.
        let trial = self.doc.fork();
        trial
            .import(payload)
            .map_err(|e| StoreError::corrupt(e.to_string()))?;

        let before = self.content();
        self.doc
            .import(payload)
            .map_err(|e| StoreError::corrupt(e.to_string()))?;
        let changed = self.content() != before;

        tracing::debug!(
            target: "vellum::store",
            bytes = bytes.len(),
            changed,
            "imported snapshot"
        );
        if changed {
            self.notify(ChangeOrigin::Import);
        }
        Ok(ImportOutcome { changed })
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    /// Undo the latest local change. Remote changes are never undone.
    pub fn undo(&mut self) -> bool {
        self.step_history(ChangeOrigin::Undo)
    }

    pub fn redo(&mut self) -> bool {
        self.step_history(ChangeOrigin::Redo)
    }

    fn step_history(&mut self, origin: ChangeOrigin) -> bool {
        let before = self.content();
        let result = match origin {
            ChangeOrigin::Redo => self.undo.redo(),
            _ => self.undo.undo(),
        };
        match result {
            Ok(true) => {
                self.doc.commit();
                if self.content() != before {
                    self.notify(origin);
                }
                true
            }
            Ok(false) => false,
            Err(err) => {
                tracing::warn!(target: "vellum::store", error = %err, ?origin, "history step failed");
                false
            }
        }
    }
}

impl ContentStore for DocumentStore {
    fn content(&self) -> String {
        DocumentStore::content(self)
    }

    fn set_content(&mut self, content: &str) -> bool {
        DocumentStore::set_content(self, content)
    }

    fn len_chars(&self) -> usize {
        DocumentStore::len_chars(self)
    }
}

fn new_undo_manager(doc: &LoroDoc) -> UndoManager {
    let mut undo = UndoManager::new(doc);
    // Every commit is its own undo step.
    undo.set_merge_interval(0);
    undo
}

fn wrap(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ENVELOPE_LEN + payload.len());
    out.extend_from_slice(SNAPSHOT_MAGIC);
    out.push(SNAPSHOT_VERSION);
    out.extend_from_slice(payload);
    out
}

fn unwrap_envelope(bytes: &[u8]) -> Result<&[u8], StoreError> {
    if bytes.len() < ENVELOPE_LEN {
        return Err(StoreError::corrupt(format!(
            "{} bytes is shorter than the envelope header",
            bytes.len()
        )));
    }
    let (header, payload) = bytes.split_at(ENVELOPE_LEN);
    if &header[..SNAPSHOT_MAGIC.len()] != SNAPSHOT_MAGIC {
        return Err(StoreError::corrupt("missing VLM1 magic"));
    }
    let version = header[SNAPSHOT_MAGIC.len()];
    if version != SNAPSHOT_VERSION {
        return Err(StoreError::UnsupportedSnapshotVersion {
            found: version,
            supported: SNAPSHOT_VERSION,
        });
    }
    if payload.is_empty() {
        return Err(StoreError::corrupt("empty payload"));
    }
    Ok(payload)
}
