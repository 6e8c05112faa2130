use crate::error::Result;
use crate::models::ObservationFrame;
use crate::readers::FrameReader;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::info;

/// Loads several variable tables at once, one blocking task per file
pub struct ConcurrentReader {
    max_workers: usize,
    use_mmap: bool,
    missing_sentinel: Option<String>,
}

impl ConcurrentReader {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
            use_mmap: false,
            missing_sentinel: None,
        }
    }

    pub fn with_mmap(mut self, use_mmap: bool) -> Self {
        self.use_mmap = use_mmap;
        self
    }

    pub fn with_missing_sentinel(mut self, sentinel: Option<String>) -> Self {
        self.missing_sentinel = sentinel;
        self
    }

    fn frame_reader(&self) -> FrameReader {
        let reader = FrameReader::with_mmap(self.use_mmap);
        match &self.missing_sentinel {
            Some(sentinel) => reader.with_missing_sentinel(sentinel.clone()),
            None => reader,
        }
    }

    /// Read `(variable name, path)` pairs into frames keyed by variable name
    pub async fn read_variables(
        &self,
        sources: Vec<(String, PathBuf)>,
    ) -> Result<HashMap<String, ObservationFrame>> {
        let permits = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();

        for (name, path) in sources {
            let permits = permits.clone();
            let reader = self.frame_reader();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let frame = tokio::task::spawn_blocking(move || reader.read(&path)).await??;
                Ok::<_, crate::error::QcError>((name, frame))
            });
        }

        let mut frames = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (name, frame) = joined??;
            info!(
                variable = %name,
                rows = frame.n_rows(),
                stations = frame.n_stations(),
                "Loaded variable"
            );
            frames.insert(name, frame);
        }

        Ok(frames)
    }
}

impl Default for ConcurrentReader {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_variables_concurrently() -> Result<()> {
        let dir = TempDir::new()?;
        let temp_path = dir.path().join("temp.csv");
        let rh_path = dir.path().join("rh.csv");

        let mut temp = std::fs::File::create(&temp_path)?;
        writeln!(temp, "time,A,B\n2020-01-01 00:00,1.0,2.0\n2020-01-01 01:00,1.5,2.5")?;
        let mut rh = std::fs::File::create(&rh_path)?;
        writeln!(rh, "time,A\n2020-01-01 00:00,80\n2020-01-01 01:00,-99")?;

        let frames = ConcurrentReader::new(2)
            .with_missing_sentinel(Some("-99".to_string()))
            .read_variables(vec![
                ("temperature".to_string(), temp_path),
                ("humidity".to_string(), rh_path),
            ])
            .await?;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames["temperature"].shape(), (2, 2));
        assert_eq!(frames["humidity"].get(0, 0), 80.0);
        assert!(frames["humidity"].get(1, 0).is_nan());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let result = ConcurrentReader::default()
            .read_variables(vec![("x".to_string(), PathBuf::from("/nonexistent/x.csv"))])
            .await;
        assert!(result.is_err());
    }
}
