//! Durable artist output: a CSV file flushed in batches of buffered rows.

use crate::errors::InitError;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const FLUSH_THRESHOLD: usize = 100;
const HEADER: &str = "id,name,popularity,genres\n";

struct Row {
    id: String,
    name: String,
    popularity: u8,
    genres: Vec<String>,
}

/// Buffers artist rows in memory and flushes them to disk once the buffer
/// reaches [`FLUSH_THRESHOLD`] rows, or on an explicit [`ArtistWriter::flush`].
pub struct ArtistWriter {
    path: PathBuf,
    pending: Mutex<Vec<Row>>,
}

impl ArtistWriter {
    /// Open (or create) the output file. In `fresh` mode the file is
    /// truncated and the header rewritten; otherwise the header is written
    /// only if the file does not already exist.
    pub fn new(path: impl AsRef<Path>, fresh: bool) -> Result<Self, InitError> {
        let path = path.as_ref().to_path_buf();
        let needs_header = fresh || !path.exists();
        if needs_header {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)
                .map_err(|source| InitError::WriterIo {
                    path: path.display().to_string(),
                    source,
                })?;
            file.write_all(HEADER.as_bytes())
                .map_err(|source| InitError::WriterIo {
                    path: path.display().to_string(),
                    source,
                })?;
        }
        Ok(Self {
            path,
            pending: Mutex::new(Vec::with_capacity(FLUSH_THRESHOLD)),
        })
    }

    /// Append one artist row to the buffer, flushing to disk once the
    /// buffer reaches the threshold.
    pub async fn add(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        popularity: u8,
        genres: Vec<String>,
    ) -> Result<(), InitError> {
        let mut pending = self.pending.lock().await;
        pending.push(Row {
            id: id.into(),
            name: name.into(),
            popularity,
            genres,
        });
        if pending.len() >= FLUSH_THRESHOLD {
            self.flush_locked(&mut pending)?;
        }
        Ok(())
    }

    /// Force a flush of any buffered rows, e.g. at orchestrator shutdown.
    pub async fn flush(&self) -> Result<(), InitError> {
        let mut pending = self.pending.lock().await;
        self.flush_locked(&mut pending)
    }

    fn flush_locked(&self, pending: &mut Vec<Row>) -> Result<(), InitError> {
        if pending.is_empty() {
            return Ok(());
        }
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|source| InitError::WriterIo {
                path: self.path.display().to_string(),
                source,
            })?;
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        for row in pending.drain(..) {
            csv_writer
                .write_record(&[
                    row.id,
                    row.name,
                    row.popularity.to_string(),
                    row.genres.join(";"),
                ])
                .map_err(|err| InitError::WriterIo {
                    path: self.path.display().to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, err),
                })?;
        }
        csv_writer.flush().map_err(|source| InitError::WriterIo {
            path: self.path.display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;

    fn read_lines(path: &Path) -> Vec<String> {
        let file = std::fs::File::open(path).unwrap();
        std::io::BufReader::new(file)
            .lines()
            .map(|l| l.unwrap())
            .collect()
    }

    #[tokio::test]
    async fn writes_header_once_and_flushes_below_threshold_on_demand() {
        let dir = tempfile_dir();
        let path = dir.join("artists.csv");
        let writer = ArtistWriter::new(&path, true).unwrap();
        writer
            .add("A", "Alpha", 50, vec!["rock".into(), "jazz".into()])
            .await
            .unwrap();
        writer.flush().await.unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines[0], "id,name,popularity,genres");
        assert_eq!(lines[1], "A,Alpha,50,rock;jazz");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn flushes_automatically_at_threshold() {
        let dir = tempfile_dir();
        let path = dir.join("artists.csv");
        let writer = ArtistWriter::new(&path, true).unwrap();
        for i in 0..FLUSH_THRESHOLD {
            writer
                .add(format!("id{i}"), "Name", 10, vec!["pop".into()])
                .await
                .unwrap();
        }
        // No explicit flush call: the threshold crossing should have
        // already written everything to disk.
        let lines = read_lines(&path);
        assert_eq!(lines.len(), 1 + FLUSH_THRESHOLD);
        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempfile_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "catalog-crawler-test-{}-{}",
            std::process::id(),
            rand_suffix()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn rand_suffix() -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .subsec_nanos() as u64
    }
}
