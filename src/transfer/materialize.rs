use std::path::{Component, Path, PathBuf};

use crate::error::MkdirError;

/// Ensure `dir_path` exists (mkdir -p semantics), safe to call concurrently
/// for the same or overlapping paths.
///
/// For each level: exists as a directory -> skip; exists as a file -> error;
/// missing -> create, and if creation fails stat again, since another worker
/// may have created it in between.
pub fn ensure_dir_all(dir_path: &Path) -> Result<(), MkdirError> {
    let mut accum = PathBuf::new();
    for comp in dir_path.components() {
        accum.push(comp.as_os_str());
        match comp {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => continue,
            Component::ParentDir | Component::Normal(_) => {}
        }
        ensure_one(&accum)?;
    }
    Ok(())
}

fn ensure_one(p: &Path) -> Result<(), MkdirError> {
    match std::fs::metadata(p) {
        Ok(md) if md.is_dir() => Ok(()),
        Ok(_) => Err(MkdirError::ExistsAsFile(p.to_path_buf())),
        Err(_) => match std::fs::create_dir(p) {
            Ok(()) => Ok(()),
            Err(e) => match std::fs::metadata(p) {
                // lost the race to a sibling worker
                Ok(md) if md.is_dir() => Ok(()),
                Ok(_) => Err(MkdirError::ExistsAsFile(p.to_path_buf())),
                Err(_) => Err(MkdirError::Io(p.to_path_buf(), e.to_string())),
            },
        },
    }
}
