use std::io::{self, Write};
use std::path::Path;

use layer_format::{FileInfo, LayerCache};

use crate::error::{Error, Result};
use crate::util::{format_size, open_layer};

pub fn run(
    layer: &Path,
    path: &str,
    json: bool,
    diff_id: Option<&str>,
    cache: &LayerCache,
) -> Result<()> {
    let layer = open_layer(layer, diff_id, cache)?;
    let files = layer
        .list_directory(path)
        .map_err(|source| Error::from_read(path, source))?;

    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    write_listing(&mut stdout, &files, json)
}

fn write_listing<W: Write>(out: &mut W, files: &[FileInfo], json: bool) -> Result<()> {
    let result = if json {
        list_json(out, files)
    } else {
        list_long(out, files)
    };

    result
        .and_then(|_| out.flush())
        .map_err(|source| Error::WriteOutput { source })
}

fn list_long<W: Write>(out: &mut W, files: &[FileInfo]) -> io::Result<()> {
    for file in files {
        let suffix = if file.is_dir { "/" } else { "" };
        writeln!(
            out,
            "{:10}  {:>12}  {:19}  {}{}",
            file.mode,
            format_size(file.size),
            file.mod_time,
            file.name,
            suffix
        )?;
    }
    Ok(())
}

fn list_json<W: Write>(out: &mut W, files: &[FileInfo]) -> io::Result<()> {
    let entries = files
        .iter()
        .map(|file| {
            serde_json::json!({
                "name": file.name,
                "path": file.path,
                "is_dir": file.is_dir,
                "size": file.size,
                "mode": file.mode,
                "mod_time": file.mod_time,
            })
        })
        .collect::<Vec<_>>();

    serde_json::to_writer_pretty(&mut *out, &entries)?;
    writeln!(out)
}
