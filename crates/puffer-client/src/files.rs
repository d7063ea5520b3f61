//! Server file access.
//!
//! Listing and deletion go over the daemon channel; reading and writing
//! contents go over REST.

use puffer_core::FileEntry;

use crate::{
    error::{ClientError, Result},
    server::Server,
};

/// Prefix `path` with `/` if missing.
fn absolute(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Directory containing `path`, with a trailing slash.
fn parent_dir(path: &str) -> String {
    let path = absolute(path);
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => trimmed[..=idx].to_string(),
        None => "/".to_string(),
    }
}

/// Join a directory and an entry name with exactly one slash.
fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// File operations on one server.
#[derive(Debug, Clone, Copy)]
pub struct FileManager<'a> {
    server: &'a Server,
}

impl<'a> FileManager<'a> {
    pub(crate) const fn new(server: &'a Server) -> Self {
        Self { server }
    }

    fn content_path(&self, path: &str) -> String {
        format!(
            "/proxy/daemon/server/{}/file/{}",
            self.server.id(),
            path.trim_start_matches('/')
        )
    }

    /// Regular files in `dir`; subdirectories are left out.
    ///
    /// # Errors
    /// Returns `ClientError::NotConnected`, or `ChannelError::Closed` if the
    /// channel closes first.
    pub async fn list_files(&self, dir: &str) -> Result<Vec<RemoteFile<'a>>> {
        let entries = self.server.channel()?.list_files(dir).await?;
        Ok(entries
            .into_iter()
            .map(|info| RemoteFile {
                manager: *self,
                path: join(dir, &info.name),
                info,
            })
            .collect())
    }

    /// Create an empty file and return its listing entry.
    ///
    /// # Errors
    /// Returns `ClientError::FileNotFound` if the new file does not show up
    /// in its directory listing.
    pub async fn create_file(&self, path: &str) -> Result<RemoteFile<'a>> {
        let path = absolute(path);
        self.server
            .context()
            .put_text(&self.content_path(&path), "")
            .await?;
        tracing::debug!(server = %self.server.id(), %path, "Created file");

        self.list_files(&parent_dir(&path))
            .await?
            .into_iter()
            .find(|file| file.path == path)
            .ok_or(ClientError::FileNotFound(path))
    }
}

/// A regular file on a server.
#[derive(Debug, Clone)]
pub struct RemoteFile<'a> {
    manager: FileManager<'a>,
    path: String,
    info: FileEntry,
}

impl RemoteFile<'_> {
    /// Listing metadata captured when this value was created.
    #[must_use]
    pub const fn info(&self) -> &FileEntry {
        &self.info
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Current contents.
    ///
    /// # Errors
    /// Returns the REST error if the panel rejects the request.
    pub async fn content(&self) -> Result<String> {
        self.manager
            .server
            .context()
            .get_text(&self.manager.content_path(&self.path))
            .await
    }

    /// Replace the contents.
    ///
    /// # Errors
    /// Returns the REST error if the panel rejects the request.
    pub async fn edit(&self, content: impl Into<String>) -> Result<()> {
        self.manager
            .server
            .context()
            .put_text(&self.manager.content_path(&self.path), content)
            .await
    }

    /// Delete the file; resolves on the daemon's `file` reply.
    ///
    /// # Errors
    /// Returns `ClientError::NotConnected`, or `ChannelError::Closed` if the
    /// channel closes first.
    pub async fn delete(self) -> Result<()> {
        Ok(self
            .manager
            .server
            .channel()?
            .delete_file(self.path.as_str())
            .await?)
    }
}
