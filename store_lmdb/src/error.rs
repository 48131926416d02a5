use thiserror::Error;

#[derive(Debug, Error)]
pub enum LmdbError {
    #[error("LMDB error: {0}")]
    Heed(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database is corrupted: {0}")]
    Corruption(String),
}

impl From<heed::Error> for LmdbError {
    fn from(e: heed::Error) -> Self {
        LmdbError::Heed(e.to_string())
    }
}

impl From<LmdbError> for tangle_store::StoreError {
    fn from(e: LmdbError) -> Self {
        match e {
            LmdbError::Corruption(reason) => tangle_store::StoreError::Corruption(reason),
            other => tangle_store::StoreError::Backend(other.to_string()),
        }
    }
}
