//! Shared LMDB environment
//!
//! One environment per directory, shared by every `LmdbDataStore` on the
//! node. Each store owns a named database inside it.

use std::fs;
use std::path::{Path, PathBuf};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crate::config::LmdbConfig;
use crate::observability::{log_event, Event};

use super::errors::LmdbResult;

pub type Table = Database<Bytes, Bytes>;

pub struct LmdbEnvironment {
    env: Env,
    path: PathBuf,
}

impl LmdbEnvironment {
    pub fn open(config: &LmdbConfig) -> LmdbResult<Self> {
        let path = config.path();
        fs::create_dir_all(&path)?;

        let map_size = usize::try_from(config.max_store_size_bytes).unwrap_or(usize::MAX);
        let mut options = EnvOpenOptions::new();
        options
            .map_size(map_size)
            .max_dbs(config.max_dbs)
            .max_readers(config.max_readers);

        // SAFETY: the directory is owned by this process and opened once;
        // the factory shares the resulting environment instead of reopening.
        let env = unsafe { options.open(&path)? };

        log_event(
            Event::LmdbEnvironmentOpened,
            &[
                ("path", &path.display().to_string()),
                ("map_size", &map_size.to_string()),
            ],
        );
        Ok(Self { env, path })
    }

    /// Create (or reopen) the named table.
    pub fn open_table(&self, name: &str) -> LmdbResult<Table> {
        let mut wtxn = self.env.write_txn()?;
        let table: Table = self.env.create_database(&mut wtxn, Some(name))?;
        wtxn.commit()?;
        Ok(table)
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
