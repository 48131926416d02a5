//! LMDB environment setup.

use std::path::{Path, PathBuf};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crate::LmdbError;

/// Default map size: 10 GiB of address space, grown lazily by the OS.
pub const DEFAULT_MAP_SIZE: usize = 10 * 1024 * 1024 * 1024;

const MAX_DBS: u32 = 2;

/// An opened environment with the two databases a store needs.
pub struct LmdbEnvironment {
    pub(crate) env: Env,
    pub(crate) entries_db: Database<Bytes, Bytes>,
    pub(crate) meta_db: Database<Bytes, Bytes>,
    path: PathBuf,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment in the directory `path`.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;

        // SAFETY: each store owns its directory and the environment is opened
        // once per process for that path.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let entries_db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some("entries"))?;
        let meta_db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some("meta"))?;
        wtxn.commit()?;

        tracing::debug!(path = %path.display(), "opened lmdb environment");
        Ok(Self {
            env,
            entries_db,
            meta_db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
