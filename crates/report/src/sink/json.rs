use crate::error::{ErrorKind, Result};
use crate::{Reporter, ScanReport};
use async_trait::async_trait;
use exn::ResultExt;
use std::path::PathBuf;
use time::UtcDateTime;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use warden_scanner::ScanContext;

/// Writes one JSON document per line, to a file (appending) or stdout.
///
/// Writes are serialized behind a lock so lines from concurrent workers
/// never interleave.
pub struct JsonReporter {
    path: Option<PathBuf>,
    output: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
}
impl JsonReporter {
    /// Write to stdout.
    pub fn stdout() -> Self {
        Self { path: None, output: Mutex::new(Box::new(tokio::io::stdout())) }
    }

    /// Append to a file, creating it if needed. The file is opened here, so
    /// an unwritable path is a construction error.
    pub fn file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .or_raise(|| ErrorKind::Config(format!("cannot open report file {}", path.display())))?;
        Ok(Self {
            path: Some(path),
            output: Mutex::new(Box::new(tokio::fs::File::from_std(file))),
        })
    }

    fn describe(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| PathBuf::from("<stdout>"))
    }
}

#[async_trait]
impl Reporter for JsonReporter {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn report(&self, ctx: &ScanContext) -> Result<()> {
        let mut line = ScanReport::new(ctx, UtcDateTime::now())?.to_json()?;
        line.push('\n');
        let mut output = self.output.lock().await;
        output.write_all(line.as_bytes()).await.or_raise(|| ErrorKind::Output(self.describe()))?;
        output.flush().await.or_raise(|| ErrorKind::Output(self.describe()))?;
        Ok(())
    }
}
