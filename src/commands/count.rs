use anyhow::Result;

use crate::commands::CommandReport;
use crate::error::ErrorCode;
use crate::vault::paths::resolve_paths;
use crate::vault::store::LocalStore;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let store = LocalStore::new(&paths.media_dir);
    let mut report = CommandReport::new("count");
    report.detail(format!("media_dir={}", paths.media_dir.display()));

    if !store.exists() {
        report.detail(format!(
            "{}: media directory does not exist yet",
            ErrorCode::E002StoreMissing.as_str()
        ));
    }
    let count = store.count_archived_files()?;
    report.detail(format!("archived_files={count}"));
    Ok(report)
}
