use crate::error::{BrickError, Result};
use flate2::read::MultiGzDecoder;
use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
};

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}

/// Opens a plain or gzip-compressed (`.gz`) input file.
pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).map_err(|e| {
        BrickError::new(
            crate::error::ErrorCode::Io,
            format!("Could not open '{}': {e}", path.display()),
        )
    })?;
    if is_gzip(path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub fn read_to_string(path: &Path) -> Result<String> {
    let mut text = String::new();
    open_reader(path)?
        .read_to_string(&mut text)
        .map_err(|e| BrickError::validation(format!("Could not read '{}': {e}", path.display())))?;
    Ok(text)
}
