//! Input scanner — builds the initial task set from on-disk assembly files.
//!
//! Layout contract: `<input>/<ClassName>/<symbol>.s` (or `.asm`). The class
//! comes from the directory name, the symbol from the file stem, and the
//! assembly from the file contents. Anything else is skipped.

use std::path::Path;

use tracing::debug;

use crate::error::ScanError;
use crate::store::NewTask;

/// Scan the input directory and return the tasks to seed.
pub fn scan_input_dir(input_dir: &Path) -> Result<Vec<NewTask>, ScanError> {
    let mut tasks = Vec::new();

    for entry in read_dir(input_dir)? {
        let entry = entry.map_err(|e| io_err(input_dir, e))?;
        let class_dir = entry.path();
        if !class_dir.is_dir() {
            debug!(path = %class_dir.display(), "Skipping non-directory entry");
            continue;
        }
        let Some(class_name) = class_dir.file_name().and_then(|n| n.to_str()) else {
            debug!(path = %class_dir.display(), "Skipping non-UTF-8 directory name");
            continue;
        };
        let class_name = class_name.to_string();

        for file in read_dir(&class_dir)? {
            let file = file.map_err(|e| io_err(&class_dir, e))?;
            let path = file.path();

            let is_assembly = matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("s") | Some("asm")
            );
            if !path.is_file() || !is_assembly {
                debug!(path = %path.display(), "Skipping non-assembly entry");
                continue;
            }
            let Some(symbol_name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                debug!(path = %path.display(), "Skipping non-UTF-8 file name");
                continue;
            };

            let assembly_code =
                std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;

            tasks.push(NewTask {
                class_name: class_name.clone(),
                symbol_name: symbol_name.to_string(),
                assembly_code,
            });
        }
    }

    if tasks.is_empty() {
        return Err(ScanError::NoTasks(input_dir.to_path_buf()));
    }

    // read_dir order is platform-defined; sort so seeding (and therefore
    // task ids) are deterministic.
    tasks.sort_by(|a, b| {
        (a.class_name.as_str(), a.symbol_name.as_str())
            .cmp(&(b.class_name.as_str(), b.symbol_name.as_str()))
    });

    Ok(tasks)
}

fn read_dir(path: &Path) -> Result<std::fs::ReadDir, ScanError> {
    std::fs::read_dir(path).map_err(|e| io_err(path, e))
}

fn io_err(path: &Path, source: std::io::Error) -> ScanError {
    ScanError::Io {
        path: path.to_path_buf(),
        source,
    }
}
