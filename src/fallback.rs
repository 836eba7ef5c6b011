use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::domain::NewSubscriber;
use crate::telemetry::spawn_blocking_with_tracing;

/// Append-only JSON-lines queue for signups the store could not take.
#[derive(Clone)]
pub struct FallbackLog {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct QueuedSubscriber {
    pub email: String,
    pub name: Option<String>,
    pub source: String,
    pub queued_at: DateTime<Utc>,
}

impl FallbackLog {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    #[tracing::instrument(
        name = "Queueing subscriber in the local fallback log",
        skip(self, subscriber),
        fields(subscriber_email = %subscriber.email, path = %self.path.display())
    )]
    pub async fn append(&self, subscriber: &NewSubscriber) -> Result<(), anyhow::Error> {
        let record = QueuedSubscriber {
            email: subscriber.email.as_ref().to_owned(),
            name: subscriber.name.as_ref().map(|n| n.as_ref().to_owned()),
            source: subscriber.source.as_ref().to_owned(),
            queued_at: Utc::now(),
        };
        let mut line = serde_json::to_string(&record).context("Failed to serialise the record")?;
        line.push('\n');

        let path = self.path.clone();
        let lock = self.lock.clone();
        spawn_blocking_with_tracing(move || -> Result<(), anyhow::Error> {
            let _guard = lock
                .lock()
                .map_err(|_| anyhow::anyhow!("The fallback log lock was poisoned"))?;
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            file.write_all(line.as_bytes())
                .context("Failed to append to the fallback log")?;
            Ok(())
        })
        .await
        .context("Failed to spawn blocking task")?
    }
}
