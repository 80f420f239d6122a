use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use layer_format::{FileBlob, Layer, LayerCache};

use crate::error::{Error, Result};

/// Materializes the tarball at `path`, drawing a percentage on stderr.
pub fn open_layer(path: &Path, diff_id: Option<&str>, cache: &LayerCache) -> Result<Layer> {
    let blob = FileBlob::open(path).map_err(|source| Error::OpenLayer {
        path: path.to_path_buf(),
        source,
    })?;
    let blob = match diff_id {
        Some(id) => blob.with_diff_id(id),
        None => blob,
    };

    let mut layer = Layer::new(Arc::new(blob));
    tracing::debug!(path = %path.display(), diff_id = layer.diff_id(), "materializing layer");
    let stderr = std::io::stderr();

    layer
        .initialize(cache, |value| {
            let mut stderr = stderr.lock();
            let _ = write!(stderr, "\rLoading layer... {:>3.0}%", value * 100.0);
            let _ = stderr.flush();
        })
        .map_err(|source| Error::LoadLayer {
            path: path.to_path_buf(),
            source,
        })?;
    eprintln!();
    tracing::debug!(diff_id = layer.diff_id(), "layer ready");

    Ok(layer)
}

pub fn format_size(size: u64) -> String {
    use humansize::{file_size_opts as options, FileSize};

    size.file_size(options::BINARY)
        .unwrap_or_else(|_| size.to_string())
}
