//! Uploaded schema files and the schema set compiled from them.
//!
//! Every change recompiles all stored files. The new [`SchemaSet`] replaces the old one only if
//! the compilation succeeds, otherwise the change is rolled back and the error returned.

use crate::schema::{CompileError, SchemaSet};
use chrono::{DateTime, Utc};
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use std::sync::Arc;

/// Schema registry error.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum RegistryError
{
    /// No schema file with the id exists.
    #[snafu(display("Schema file '{}' not found", id))]
    FileNotFound
    {
        /// Requested id.
        id: String,
    },

    /// The files failed to compile. The registry was left unchanged.
    #[snafu(display("Schema compilation failed: {}", source))]
    Compile
    {
        /// Compiler error.
        source: CompileError,
    },
}

/// An uploaded `.proto` source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaFile
{
    /// Unique id assigned on upload.
    pub id: String,

    /// Display name. Doesn't need to be unique.
    pub name: String,

    /// Full source text.
    pub source_text: String,

    /// Time of the last upload or edit.
    pub loaded_at: DateTime<Utc>,
}

/// Owns the schema files and the current compiled schema set.
#[derive(Debug, Default)]
pub struct SchemaRegistry
{
    // Held for the whole compile and swap so writers don't interleave. Readers never take it.
    writer: Mutex<()>,
    committed: RwLock<Arc<Committed>>,
}

/// Files and the schema set compiled from exactly those files.
#[derive(Debug, Default)]
struct Committed
{
    files: Vec<SchemaFile>,
    schema: Arc<SchemaSet>,
}

impl SchemaFile
{
    fn new(name: &str, content: &str) -> Self
    {
        SchemaFile {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            source_text: content.to_string(),
            loaded_at: Utc::now(),
        }
    }
}

impl SchemaRegistry
{
    /// Creates an empty registry.
    pub fn new() -> Self
    {
        Default::default()
    }

    /// Adds a file and recompiles. Returns the id of the new file.
    pub fn add_file(&self, name: &str, content: &str) -> Result<String, RegistryError>
    {
        let mut ids = self.add_files(vec![(name, content)])?;
        Ok(ids.remove(0))
    }

    /// Adds several files with a single recompile.
    ///
    /// Used when a file arrives together with its imports, which may only compile as a group.
    /// Returns the new ids in input order.
    pub fn add_files<I, N, S>(&self, files: I) -> Result<Vec<String>, RegistryError>
    where
        I: IntoIterator<Item = (N, S)>,
        N: AsRef<str>,
        S: AsRef<str>,
    {
        let added: Vec<SchemaFile> = files
            .into_iter()
            .map(|(name, content)| SchemaFile::new(name.as_ref(), content.as_ref()))
            .collect();
        let ids: Vec<String> = added.iter().map(|f| f.id.clone()).collect();

        self.mutate(|files| {
            files.extend(added);
            Ok(())
        })?;

        info!("Added schema file(s) {:?}", ids);
        Ok(ids)
    }

    /// Replaces the name and content of a file and recompiles.
    pub fn update_file(&self, id: &str, name: &str, content: &str) -> Result<(), RegistryError>
    {
        self.mutate(|files| {
            let file = files
                .iter_mut()
                .find(|f| f.id == id)
                .ok_or_else(|| RegistryError::FileNotFound { id: id.to_string() })?;

            file.name = name.to_string();
            file.source_text = content.to_string();
            file.loaded_at = Utc::now();
            Ok(())
        })?;

        info!("Updated schema file {} ({})", id, name);
        Ok(())
    }

    /// Removes a file and recompiles.
    pub fn remove_file(&self, id: &str) -> Result<(), RegistryError>
    {
        self.mutate(|files| {
            let idx = files
                .iter()
                .position(|f| f.id == id)
                .ok_or_else(|| RegistryError::FileNotFound { id: id.to_string() })?;

            files.remove(idx);
            Ok(())
        })?;

        info!("Removed schema file {}", id);
        Ok(())
    }

    /// Snapshot of the stored files in upload order.
    pub fn files(&self) -> Vec<SchemaFile>
    {
        self.committed.read().files.clone()
    }

    /// The current compiled schema set.
    ///
    /// The snapshot stays valid and unchanged even if the registry is recompiled while it's in
    /// use.
    pub fn snapshot(&self) -> Arc<SchemaSet>
    {
        self.committed.read().schema.clone()
    }

    /// Fully qualified names of every known message type, sorted alphabetically.
    pub fn message_types(&self) -> Vec<String>
    {
        self.snapshot().message_types().to_vec()
    }

    /// True if the current schema set defines the message type.
    pub fn contains_message(&self, full_name: &str) -> bool
    {
        self.snapshot().get_message(full_name).is_some()
    }

    /// Applies a change to a copy of the file list, compiles it and commits both on success.
    fn mutate<F>(&self, change: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut Vec<SchemaFile>) -> Result<(), RegistryError>,
    {
        let _writer = self.writer.lock();

        let mut candidate = self.committed.read().files.clone();
        change(&mut candidate)?;

        let compiled = SchemaSet::compile(
            candidate
                .iter()
                .map(|f| (f.name.as_str(), f.source_text.as_str())),
        )
        .map_err(|e| {
            warn!("Rejected schema change: {}", e);
            e
        })
        .context(Compile)?;

        info!(
            "Compiled {} schema file(s) into {} message type(s)",
            candidate.len(),
            compiled.message_types().len()
        );

        *self.committed.write() = Arc::new(Committed {
            files: candidate,
            schema: Arc::new(compiled),
        });
        Ok(())
    }
}
