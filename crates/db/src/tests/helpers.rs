use crate::{Db, DbError, DbOptions};
use engine::Options as EngineOptions;
use std::path::Path;

pub fn rw_options() -> EngineOptions {
    EngineOptions {
        read_write: true,
        ..EngineOptions::default()
    }
}

pub fn open_rw(dir: &Path) -> Result<Db, DbError> {
    Db::open(dir, rw_options(), DbOptions::default())
}

pub fn open_ro(dir: &Path) -> Result<Db, DbError> {
    Db::open(dir, EngineOptions::default(), DbOptions::default())
}
