use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No such file or directory `{path}`")]
    NotExist { path: String },

    #[error("Not a directory `{path}`")]
    NotADirectory { path: String },

    #[error("Is a directory `{path}`")]
    IsADirectory { path: String },

    #[error("No more directory entries")]
    EndOfListing,

    #[error("Hard link `{path}` points to missing target `{target}`")]
    LinkTargetMissing { path: String, target: String },

    #[error("Malformed or truncated archive")]
    Format {
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Cannot create cache directory in `{}`", .path.display())]
    CacheDirInit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Layer `{diff_id}` is not initialized")]
    NotInitialized { diff_id: String },

    #[error("Cannot create cache file `{}`", .path.display())]
    CreateCacheFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot get content of layer `{diff_id}`")]
    OpenBlob {
        diff_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot copy layer content to `{}`", .path.display())]
    CopyLayer {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot seek cache file `{}`", .path.display())]
    SeekCacheFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot index layer archive `{}`", .path.display())]
    IndexLayer {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// True when the error means the requested path is absent from the layer,
    /// as opposed to the layer itself failing to load.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotExist { .. } | Error::LinkTargetMissing { .. })
    }

    pub(crate) fn format(source: std::io::Error) -> Error {
        Error::Format { source }
    }
}
