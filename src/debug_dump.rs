use chrono::Utc;
use std::path::{Path, PathBuf};

/// Optional sink for raw ERP responses.
///
/// Disabled unless `DEBUG_DUMP_DIR` is set. Write failures are logged and
/// never reach the caller.
#[derive(Debug, Clone, Default)]
pub struct DebugDump {
    dir: Option<PathBuf>,
    partner_details: bool,
}

impl DebugDump {
    pub fn new(dir: Option<PathBuf>, partner_details: bool) -> Self {
        Self {
            dir,
            partner_details,
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Partner lookups are noisy, so they have their own switch.
    pub fn dumps_partner_details(&self) -> bool {
        self.is_enabled() && self.partner_details
    }

    /// Writes `contents` to `<dir>/<label>-<timestamp>.xml`.
    pub async fn write(&self, label: &str, contents: &str) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        match write_file(dir, label, contents).await {
            Ok(path) => {
                tracing::debug!("Wrote {} debug dump to {}", label, path.display());
                Some(path)
            }
            Err(e) => {
                tracing::warn!("Failed to write {} debug dump in {}: {}", label, dir.display(), e);
                None
            }
        }
    }
}

fn file_name(label: &str) -> String {
    let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.3fZ");
    format!("{}-{}.xml", label, stamp)
}

async fn write_file(dir: &Path, label: &str, contents: &str) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(file_name(label));
    tokio::fs::write(&path, contents).await?;
    Ok(path)
}
