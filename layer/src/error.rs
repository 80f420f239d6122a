use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot open layer `{}`", .path.display())]
    OpenLayer {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Layer `{}` failed to load", .path.display())]
    LoadLayer {
        path: PathBuf,
        #[source]
        source: layer_format::Error,
    },

    #[error("Path not found in layer: `{path}`")]
    NotFound {
        path: String,
        #[source]
        source: layer_format::Error,
    },

    #[error("Cannot read `{path}` from layer")]
    Read {
        path: String,
        #[source]
        source: layer_format::Error,
    },

    #[error("Cannot write output")]
    WriteOutput {
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn from_read(path: &str, source: layer_format::Error) -> Error {
        if source.is_not_found() {
            Error::NotFound {
                path: path.to_string(),
                source,
            }
        } else {
            Error::Read {
                path: path.to_string(),
                source,
            }
        }
    }
}
