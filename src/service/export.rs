//! Recursive folder export as a streamed zip archive
//!
//! The entry list is planned up front from the in-memory tree, then written
//! by a blocking task into a bounded channel that feeds the response body.

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info, warn};

use super::{find_active_folder, Drive};
use crate::entity::activity::ActivityAction;
use crate::entity::{file, folder};
use crate::error::{AppError, AppResult};
use crate::ledger;
use crate::middleware::auth::CurrentUser;
use crate::permission::{self, Action, DbGrants};
use crate::storage::BlobStore;
use crate::tree::FolderTree;

/// One entry of a planned archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEntry {
    /// `a/b/`
    Dir { path: String },
    /// `a/b/report.pdf`
    File { path: String, key: String, size: i64 },
}

impl ArchiveEntry {
    pub fn path(&self) -> &str {
        match self {
            ArchiveEntry::Dir { path } | ArchiveEntry::File { path, .. } => path,
        }
    }
}

/// A running export
pub struct ExportStream {
    /// Suggested download name
    pub file_name: String,
    pub entries: usize,
    pub total_bytes: u64,
    pub body: ReceiverStream<io::Result<Vec<u8>>>,
}

/// Folder names may hold characters that would split a zip path
fn path_segment(name: &str) -> String {
    name.chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

/// Plan the entries of an archive rooted at `root`.
///
/// Depth-first; every folder becomes a directory entry followed by its
/// files. Deleted folders are skipped with their subtree, as are folders
/// for which `include` returns false. The first entry for a path wins.
pub fn plan_archive<F>(
    tree: &FolderTree,
    files: &HashMap<i32, Vec<file::Model>>,
    root: i32,
    include: F,
) -> Vec<ArchiveEntry>
where
    F: Fn(&folder::Model) -> bool,
{
    let mut entries = Vec::new();
    let mut paths = HashSet::new();
    let mut visited = HashSet::new();

    let Some(root_folder) = tree.get(root) else {
        return entries;
    };
    let mut stack = vec![(root_folder, format!("{}/", path_segment(&root_folder.name)))];

    while let Some((f, prefix)) = stack.pop() {
        if !visited.insert(f.id) {
            continue;
        }

        if paths.insert(prefix.clone()) {
            entries.push(ArchiveEntry::Dir { path: prefix.clone() });
        }

        for doc in files.get(&f.id).into_iter().flatten() {
            if doc.deleted {
                continue;
            }
            let path = format!("{}{}", prefix, doc.original_name);
            if !paths.insert(path.clone()) {
                warn!(file_id = doc.id, "Duplicate archive entry skipped: {}", path);
                continue;
            }
            entries.push(ArchiveEntry::File {
                path,
                key: doc.stored_name.clone(),
                size: doc.size,
            });
        }

        // reversed so the newest child is written first
        for child in tree.children(f.id).into_iter().rev() {
            if child.deleted || !include(child) {
                continue;
            }
            let child_prefix = format!("{}{}/", prefix, path_segment(&child.name));
            stack.push((child, child_prefix));
        }
    }

    entries
}

fn zip_err(e: zip::result::ZipError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

/// Write planned entries as a streamed zip.
///
/// `fetch` returns blob contents by key; a blob that cannot be read is
/// skipped with a warning. Writing stops with `TimedOut` once `deadline`
/// has passed.
pub fn write_archive<W, F>(
    out: W,
    entries: &[ArchiveEntry],
    mut fetch: F,
    deadline: Option<Instant>,
) -> io::Result<()>
where
    W: Write,
    F: FnMut(&str) -> io::Result<Vec<u8>>,
{
    let mut zip = zip::ZipWriter::new_stream(out);
    // no compression
    let options: zip::write::FileOptions<()> =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);

    for entry in entries {
        if deadline.map_or(false, |d| Instant::now() > d) {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "export time limit exceeded"));
        }
        match entry {
            ArchiveEntry::Dir { path } => {
                zip.add_directory(path.as_str(), options.clone()).map_err(zip_err)?;
            }
            ArchiveEntry::File { path, key, .. } => {
                let data = match fetch(key) {
                    Ok(data) => data,
                    Err(e) => {
                        warn!("Skipping {} in export, blob {} unreadable: {}", path, key, e);
                        continue;
                    }
                };
                zip.start_file(path.as_str(), options.clone()).map_err(zip_err)?;
                zip.write_all(&data)?;
            }
        }
    }

    zip.finish().map_err(zip_err)?;
    Ok(())
}

/// Bridges the blocking zip writer to the async response body.
///
/// Bytes are batched into chunks of `CHANNEL_BUFFER_SIZE`; with a channel
/// depth of 32 that caps an export's in-flight memory near 32 MiB however
/// slowly the client reads.
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Vec<u8>>>,
    buffer: Vec<u8>,
}

const CHANNEL_DEPTH: usize = 32;

/// One body chunk; large enough that per-chunk overhead is negligible
const CHANNEL_BUFFER_SIZE: usize = 1024 * 1024;

impl ChannelWriter {
    fn new(tx: mpsc::Sender<io::Result<Vec<u8>>>) -> Self {
        Self {
            tx,
            buffer: Vec::with_capacity(CHANNEL_BUFFER_SIZE),
        }
    }

    fn flush_buffer(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            let data = std::mem::take(&mut self.buffer);
            self.tx
                .blocking_send(Ok(data))
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel closed"))?;
        }
        Ok(())
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= CHANNEL_BUFFER_SIZE {
            self.flush_buffer()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer()
    }
}

impl Drop for ChannelWriter {
    fn drop(&mut self) {
        let _ = self.flush_buffer();
    }
}

impl Drive {
    /// Export a folder subtree as a zip stream.
    ///
    /// Needs `download` on the root folder. With
    /// `export.recheck_descendant_read` set, sub-folders the user neither
    /// owns nor can read are left out.
    pub async fn export_folder(&self, actor: &CurrentUser, folder_id: i32) -> AppResult<ExportStream> {
        let root = find_active_folder(&self.db, folder_id).await?;
        permission::require(&DbGrants(&self.db), &root, actor.id, Action::Download).await?;

        let tree = FolderTree::load(&self.db).await?;
        let subtree = tree.subtree_ids(root.id);
        let docs = file::Entity::find()
            .filter(file::Column::FolderId.is_in(subtree))
            .filter(file::Column::Deleted.eq(false))
            .order_by_asc(file::Column::UploadedAt)
            .order_by_asc(file::Column::Id)
            .all(&self.db)
            .await?;
        let mut by_folder: HashMap<i32, Vec<file::Model>> = HashMap::new();
        for doc in docs {
            if let Some(fid) = doc.folder_id {
                by_folder.entry(fid).or_default().push(doc);
            }
        }

        let entries = if self.config.export.recheck_descendant_read {
            let readable = permission::readable_folder_ids(&self.db, actor.id).await?;
            plan_archive(&tree, &by_folder, root.id, |f| {
                f.owner_id == actor.id || readable.contains(&f.id)
            })
        } else {
            plan_archive(&tree, &by_folder, root.id, |_| true)
        };

        let total_bytes: u64 = entries
            .iter()
            .map(|e| match e {
                ArchiveEntry::File { size, .. } => (*size).max(0) as u64,
                ArchiveEntry::Dir { .. } => 0,
            })
            .sum();
        if total_bytes > self.config.export.max_bytes {
            return Err(AppError::ExportLimit(format!(
                "folder holds {} bytes, export limit is {}",
                total_bytes, self.config.export.max_bytes
            )));
        }

        ledger::log_activity(&self.db, actor.id, ActivityAction::Downloaded, None, Some(root.id)).await?;
        info!(folder_id, entries = entries.len(), total_bytes, "Folder export started");

        let (tx, rx) = mpsc::channel::<io::Result<Vec<u8>>>(CHANNEL_DEPTH);
        let blobs: Arc<dyn BlobStore> = self.blobs.clone();
        let handle = tokio::runtime::Handle::current();
        let deadline = Instant::now() + Duration::from_secs(self.config.export.max_seconds);
        let count = entries.len();

        tokio::task::spawn_blocking(move || {
            let writer = ChannelWriter::new(tx.clone());
            let fetch = |key: &str| {
                handle
                    .block_on(blobs.read(key))
                    .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
            };
            if let Err(e) = write_archive(writer, &entries, fetch, Some(deadline)) {
                error!(folder_id, "Folder export aborted: {}", e);
                let _ = tx.blocking_send(Err(e));
            }
        });

        Ok(ExportStream {
            file_name: format!("{}.zip", path_segment(&root.name)),
            entries: count,
            total_bytes,
            body: ReceiverStream::new(rx),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::entity::user::Role;
    use crate::permission::Grant;
    use crate::service::{NewFolder, NewUpload, UserGrant};
    use crate::test_support::{fixture, fixture_with, Fixture};
    use futures::StreamExt;
    use std::io::{Cursor, Read};

    fn node(id: i32, parent_id: Option<i32>, name: &str, deleted: bool) -> folder::Model {
        folder::Model {
            id,
            name: name.to_string(),
            description: None,
            owner_id: 1,
            parent_id,
            is_personal: false,
            deleted,
            created_at: id as i64,
        }
    }

    fn doc(id: i32, folder_id: i32, name: &str) -> file::Model {
        file::Model {
            id,
            title: name.to_string(),
            stored_name: format!("blob{}", id),
            original_name: name.to_string(),
            mime_type: "text/plain".to_string(),
            size: 3,
            folder_id: Some(folder_id),
            owner_id: 1,
            visibility: "service".to_string(),
            deleted: false,
            uploaded_at: id as i64,
        }
    }

    fn paths(entries: &[ArchiveEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.path()).collect()
    }

    #[test]
    fn test_plan_skips_deleted_subtrees() {
        let tree = FolderTree::from_folders(vec![
            node(1, None, "Root", false),
            node(2, Some(1), "Kept", false),
            node(3, Some(1), "Gone", true),
            node(4, Some(3), "UnderGone", false),
            node(5, Some(2), "Empty", false),
        ]);
        let mut files = HashMap::new();
        files.insert(1, vec![doc(10, 1, "a.txt")]);
        files.insert(3, vec![doc(11, 3, "hidden.txt")]);
        files.insert(4, vec![doc(12, 4, "deeper.txt")]);

        let entries = plan_archive(&tree, &files, 1, |_| true);
        assert_eq!(
            paths(&entries),
            vec!["Root/", "Root/a.txt", "Root/Kept/", "Root/Kept/Empty/"]
        );
    }

    #[test]
    fn test_plan_first_duplicate_wins() {
        let tree = FolderTree::from_folders(vec![node(1, None, "a/b", false)]);
        let mut files = HashMap::new();
        files.insert(1, vec![doc(10, 1, "x.txt"), doc(11, 1, "x.txt")]);

        let entries = plan_archive(&tree, &files, 1, |_| true);
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[1],
            ArchiveEntry::File {
                path: "a_b/x.txt".to_string(),
                key: "blob10".to_string(),
                size: 3
            }
        );
    }

    #[test]
    fn test_plan_include_filter() {
        let tree = FolderTree::from_folders(vec![
            node(1, None, "Root", false),
            node(2, Some(1), "Private", false),
            node(3, Some(2), "Nested", false),
        ]);
        let entries = plan_archive(&tree, &HashMap::new(), 1, |f| f.id != 2);
        assert_eq!(paths(&entries), vec!["Root/"]);
    }

    #[test]
    fn test_write_archive_round_trip_and_missing_blob() {
        let entries = vec![
            ArchiveEntry::Dir { path: "Root/".into() },
            ArchiveEntry::File { path: "Root/a.txt".into(), key: "k1".into(), size: 3 },
            ArchiveEntry::File { path: "Root/lost.txt".into(), key: "missing".into(), size: 3 },
        ];
        let mut buf = Vec::new();
        write_archive(
            &mut buf,
            &entries,
            |key| match key {
                "k1" => Ok(b"abc".to_vec()),
                _ => Err(io::Error::new(io::ErrorKind::NotFound, "gone")),
            },
            None,
        )
        .unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(buf)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut content = String::new();
        archive.by_name("Root/a.txt").unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "abc");
    }

    #[test]
    fn test_write_archive_deadline() {
        let entries = vec![ArchiveEntry::Dir { path: "Root/".into() }];
        let past = Instant::now() - Duration::from_secs(1);
        let err = write_archive(Vec::new(), &entries, |_| Ok(Vec::new()), Some(past)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    async fn mkdir(fx: &Fixture, owner: &CurrentUser, name: &str, parent_id: Option<i32>) -> folder::Model {
        fx.drive
            .create_folder(
                owner,
                NewFolder {
                    name: name.to_string(),
                    description: None,
                    is_personal: false,
                    parent_id,
                    grants: Vec::new(),
                },
            )
            .await
            .unwrap()
    }

    async fn put(fx: &Fixture, owner: &CurrentUser, folder_id: i32, name: &str) -> file::Model {
        fx.drive
            .upload_file(
                owner,
                NewUpload {
                    folder_id,
                    original_name: name.to_string(),
                    mime_type: None,
                    bytes: name.as_bytes().to_vec(),
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_export_counts_live_folders_and_files() {
        let fx = fixture().await;
        let alice = CurrentUser::from(&fx.user("alice", Role::User).await);
        let root = mkdir(&fx, &alice, "Root", None).await;
        let sub = mkdir(&fx, &alice, "Sub", Some(root.id)).await;
        let gone = mkdir(&fx, &alice, "Gone", Some(root.id)).await;
        put(&fx, &alice, root.id, "one.txt").await;
        put(&fx, &alice, sub.id, "two.txt").await;
        put(&fx, &alice, sub.id, "three.txt").await;
        put(&fx, &alice, gone.id, "hidden.txt").await;
        fx.drive.soft_delete_folder(&alice, gone.id).await.unwrap();

        let export = fx.drive.export_folder(&alice, root.id).await.unwrap();
        assert_eq!(export.entries, 2 + 3);
        assert_eq!(export.file_name, "Root.zip");

        let chunks: Vec<_> = export.body.collect().await;
        let bytes: Vec<u8> = chunks.into_iter().flat_map(|c| c.unwrap()).collect();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 5);
        let mut content = String::new();
        archive
            .by_name("Root/Sub/two.txt")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "two.txt");
    }

    #[tokio::test]
    async fn test_export_needs_download_and_respects_size_limit() {
        let mut config = Config::default();
        config.export.max_bytes = 4;
        let fx = fixture_with(config).await;
        let alice = CurrentUser::from(&fx.user("alice", Role::User).await);
        let bob = CurrentUser::from(&fx.user("bob", Role::User).await);
        let root = mkdir(&fx, &alice, "Root", None).await;
        let read = Grant { read: true, ..Grant::default() };
        fx.drive
            .update_permissions(&alice, root.id, vec![UserGrant { user_id: bob.id, grant: read }])
            .await
            .unwrap();
        put(&fx, &alice, root.id, "big.txt").await;

        assert!(matches!(fx.drive.export_folder(&bob, root.id).await, Err(AppError::Forbidden)));
        assert!(matches!(
            fx.drive.export_folder(&alice, root.id).await,
            Err(AppError::ExportLimit(_))
        ));
    }

    #[test]
    fn test_channel_writer_sends_full_chunks() {
        let (tx, mut rx) = mpsc::channel(CHANNEL_DEPTH);
        let mut writer = ChannelWriter::new(tx);
        writer.write_all(&vec![7u8; CHANNEL_BUFFER_SIZE - 1]).unwrap();
        assert!(rx.try_recv().is_err());

        writer.write_all(&[7u8; 11]).unwrap();
        let first = rx.try_recv().unwrap().unwrap();
        assert_eq!(first.len(), CHANNEL_BUFFER_SIZE + 10);

        writer.write_all(b"tail").unwrap();
        drop(writer);
        assert_eq!(rx.try_recv().unwrap().unwrap(), b"tail");
        assert!(rx.try_recv().is_err());
    }
}
