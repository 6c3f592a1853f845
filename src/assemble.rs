//! Output assembly — materializes completed tasks into per-class `.m`
//! files.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use tracing::debug;

use crate::error::{AssemblyError, Error};
use crate::store::TaskStore;

/// Append every completed task's source to `<output_dir>/<class>.m`.
///
/// Rows arrive ordered by `(class, symbol)`, each file is opened once per
/// pass, and every symbol is preceded by a banner line. Returns the number
/// of symbols written; any file failure aborts the whole pass.
pub async fn assemble_files(store: &dyn TaskStore, output_dir: &Path) -> Result<u64, Error> {
    let tasks = store.completed_tasks().await?;

    let mut files: HashMap<String, File> = HashMap::new();
    let mut written = 0u64;

    for task in &tasks {
        let Some(source) = task.decompiled_source.as_deref() else {
            continue;
        };

        let path = output_dir.join(format!("{}.m", task.class_name));
        let file = match files.entry(task.class_name.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map_err(|e| AssemblyError::Io {
                        path: path.clone(),
                        source: e,
                    })?;
                debug!(path = %path.display(), "Opened output file");
                entry.insert(file)
            }
        };

        write!(file, "\n// Decompiled symbol: {}\n{}\n", task.symbol_name, source).map_err(
            |e| AssemblyError::Io {
                path: path.clone(),
                source: e,
            },
        )?;
        written += 1;
    }

    Ok(written)
}
