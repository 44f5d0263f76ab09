use crate::{Engine, EngineError, Options};
use std::fs;
use std::path::Path;

pub fn open_rw(dir: &Path) -> Result<Engine, EngineError> {
    Engine::open(
        dir,
        Options {
            read_write: true,
            ..Options::default()
        },
    )
}

pub fn open_ro(dir: &Path) -> Result<Engine, EngineError> {
    Engine::open(dir, Options::default())
}

pub fn count_data_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == "data")
                .unwrap_or(false)
        })
        .count()
}
