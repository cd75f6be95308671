//! Recursive directory traversal.
//!
//! [`TreeWalker`] turns repeated `list` queries into a lazy, pre-order,
//! depth-first sequence of entries. It keeps no state beyond the walk in
//! progress; walking again from the root starts over. Presentation is left
//! to the caller.

use serde::Serialize;

use crate::error::{ErrorReport, StorageError};
use crate::path::{join, normalize};
use crate::responses::{DirEntry, EntryKind};
use crate::session::StorageSession;
use crate::transport::Transport;

/// One file or directory found during a walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeEntry {
    /// Full normalized device path.
    pub path: String,
    /// File or directory.
    pub kind: EntryKind,
    /// Size in bytes (files only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Nesting depth below the walk root (direct children are 0).
    pub depth: usize,
}

impl TreeEntry {
    /// Get the final path component.
    pub fn name(&self) -> &str {
        crate::path::file_name(&self.path)
    }

    /// Check if this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// An item produced by [`TreeWalker`].
#[derive(Debug)]
pub enum TreeEvent {
    /// An entry was found.
    Entry(TreeEntry),
    /// The device could not list `path`; that subtree ends here and the walk
    /// continues with its siblings.
    Error {
        /// Directory whose listing failed.
        path: String,
        /// Depth the directory's children would have had.
        depth: usize,
        /// Device report.
        report: ErrorReport,
    },
    /// The transport failed. This is the last event of the walk.
    Failed(StorageError),
}

/// Entries of one directory still waiting to be yielded.
struct Frame {
    path: String,
    depth: usize,
    entries: std::vec::IntoIter<DirEntry>,
    /// Reported once the entries printed before it have been walked.
    error: Option<ErrorReport>,
}

/// Lazy pre-order walk over a device directory tree.
pub struct TreeWalker<'a, T: Transport> {
    session: &'a mut StorageSession<T>,
    /// Directory to list on the next call, before resuming the stack.
    pending: Option<(String, usize)>,
    stack: Vec<Frame>,
    finished: bool,
}

impl<'a, T: Transport> TreeWalker<'a, T> {
    /// Start a walk at `root`. Nothing is sent until the first `next`.
    pub fn new(session: &'a mut StorageSession<T>, root: &str) -> Self {
        TreeWalker {
            session,
            pending: Some((normalize(root), 0)),
            stack: Vec::new(),
            finished: false,
        }
    }

    /// List a directory and push its entries.
    fn descend(&mut self, path: String, depth: usize) -> Result<(), StorageError> {
        let listing = self.session.list(&path)?;
        self.stack.push(Frame {
            path,
            depth,
            entries: listing.entries.into_iter(),
            error: listing.error,
        });
        Ok(())
    }
}

impl<'a, T: Transport> Iterator for TreeWalker<'a, T> {
    type Item = TreeEvent;

    fn next(&mut self) -> Option<TreeEvent> {
        loop {
            if self.finished {
                return None;
            }

            if let Some((path, depth)) = self.pending.take() {
                if let Err(e) = self.descend(path, depth) {
                    self.finished = true;
                    self.stack.clear();
                    return Some(TreeEvent::Failed(e));
                }
                continue;
            }

            let frame = self.stack.last_mut()?;
            let Some(entry) = frame.entries.next() else {
                let Some(done) = self.stack.pop() else {
                    continue;
                };
                match done.error {
                    Some(report) => {
                        return Some(TreeEvent::Error {
                            path: done.path,
                            depth: done.depth,
                            report,
                        })
                    }
                    None => continue,
                }
            };

            let path = join(&frame.path, &entry.name);
            let depth = frame.depth;
            if entry.kind == EntryKind::Directory {
                self.pending = Some((path.clone(), depth + 1));
            }

            return Some(TreeEvent::Entry(TreeEntry {
                path,
                kind: entry.kind,
                size: entry.size,
                depth,
            }));
        }
    }
}

impl<T: Transport> StorageSession<T> {
    /// Walk the tree under `root` lazily, in pre-order.
    pub fn walk(&mut self, root: &str) -> TreeWalker<'_, T> {
        TreeWalker::new(self, root)
    }
}
