use std::io::Write;
use std::path::Path;

use layer_format::LayerCache;

use crate::error::{Error, Result};
use crate::util::open_layer;

pub fn run(layer: &Path, path: &str, diff_id: Option<&str>, cache: &LayerCache) -> Result<()> {
    let layer = open_layer(layer, diff_id, cache)?;
    let content = layer
        .read_file(path)
        .map_err(|source| Error::from_read(path, source))?;

    let stdout = std::io::stdout();
    let mut stdout = stdout.lock();
    stdout
        .write_all(&content)
        .and_then(|_| stdout.flush())
        .map_err(|source| Error::WriteOutput { source })
}
