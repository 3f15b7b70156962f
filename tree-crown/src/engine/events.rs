//! Scalar metrics storage and the line-delimited JSON metrics log.

use crate::common::*;
use serde_json::{Map, Value};

/// The file name of the metrics log in the logging directory.
pub const METRICS_FILE_NAME: &str = "metrics.json";

/// The number of values kept per scalar by default.
pub const DEFAULT_HISTORY_LEN: usize = 1000;

/// The bounded history of one scalar.
#[derive(Debug, Clone, Default)]
struct History {
    values: VecDeque<(usize, f64)>,
    /// The number of values ever recorded, including dropped ones.
    count: usize,
}

/// The per-worker store of scalar metrics.
///
/// Each scalar keeps its most recent values only.
#[derive(Debug, Clone)]
pub struct EventStorage {
    iter: usize,
    history_len: usize,
    history: IndexMap<String, History>,
}

impl EventStorage {
    pub fn new(start_iter: usize) -> Self {
        Self {
            iter: start_iter,
            history_len: DEFAULT_HISTORY_LEN,
            history: IndexMap::new(),
        }
    }

    pub fn with_history_len(start_iter: usize, history_len: NonZeroUsize) -> Self {
        Self {
            iter: start_iter,
            history_len: history_len.get(),
            history: IndexMap::new(),
        }
    }

    /// The iteration new scalars are recorded at.
    pub fn iter(&self) -> usize {
        self.iter
    }

    pub fn set_iter(&mut self, iter: usize) {
        self.iter = iter;
    }

    pub fn put_scalar(&mut self, name: impl Into<String>, value: f64) {
        let Self {
            iter, history_len, ..
        } = *self;
        let history = self.history.entry(name.into()).or_default();
        if history.values.len() == history_len {
            history.values.pop_front();
        }
        history.values.push_back((iter, value));
        history.count += 1;
    }

    pub fn put_scalars<I, S>(&mut self, scalars: I)
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        scalars
            .into_iter()
            .for_each(|(name, value)| self.put_scalar(name, value));
    }

    /// The kept `(iteration, value)` pairs of a scalar, oldest first.
    pub fn history(&self, name: &str) -> Option<Vec<(usize, f64)>> {
        let history = self.history.get(name)?;
        Some(history.values.iter().copied().collect())
    }

    /// The number of values ever recorded for a scalar.
    pub fn count(&self, name: &str) -> usize {
        self.history.get(name).map_or(0, |history| history.count)
    }

    /// The names of all scalars, with their record counts and latest values.
    pub fn scalars(&self) -> impl Iterator<Item = (&str, usize, Option<(usize, f64)>)> {
        self.history.iter().map(|(name, history)| {
            (
                name.as_str(),
                history.count,
                history.values.back().copied(),
            )
        })
    }

    /// The last recorded `(iteration, value)` pair of a scalar.
    pub fn latest(&self, name: &str) -> Option<(usize, f64)> {
        self.history.get(name)?.values.back().copied()
    }

    /// The latest value of every scalar recorded at or after `iter`.
    pub fn latest_since(&self, iter: usize) -> IndexMap<&str, (usize, f64)> {
        self.history
            .iter()
            .filter_map(|(name, history)| {
                let &(value_iter, value) = history.values.back()?;
                (value_iter >= iter).then(|| (name.as_str(), (value_iter, value)))
            })
            .collect()
    }
}

/// Appends the latest scalars to a line-delimited JSON file, one line per iteration.
#[derive(Debug)]
pub struct JsonWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    /// The record count of each scalar at the previous write.
    written: HashMap<String, usize>,
}

impl JsonWriter {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_owned();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open metrics file '{}'", path.display()))?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
            written: HashMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the latest value of every scalar updated since the previous write.
    pub fn write(&mut self, storage: &EventStorage) -> Result<()> {
        let mut lines: IndexMap<usize, Map<String, Value>> = IndexMap::new();

        for (name, count, latest) in storage.scalars() {
            let written = self.written.entry(name.to_string()).or_insert(0);
            if count == *written {
                continue;
            }
            *written = count;

            if let Some((iter, value)) = latest {
                lines
                    .entry(iter)
                    .or_insert_with(|| {
                        let mut line = Map::new();
                        line.insert("iteration".into(), iter.into());
                        line
                    })
                    .insert(name.to_string(), value.into());
            }
        }
        lines.sort_keys();

        for line in lines.values() {
            serde_json::to_writer(&mut self.writer, line)?;
            writeln!(self.writer)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// One line of the metrics log.
pub type MetricsLine = IndexMap<String, f64>;

/// Read a line-delimited JSON metrics log. Blank lines are skipped.
pub fn load_json_arr(path: impl AsRef<Path>) -> Result<Vec<MetricsLine>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("failed to open metrics file '{}'", path.display()))?;

    BufReader::new(file)
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let line = match line {
                Ok(line) => line,
                Err(err) => return Some(Err(Error::from(err))),
            };
            if line.trim().is_empty() {
                return None;
            }
            let parsed = serde_json::from_str(&line).with_context(|| {
                format!("invalid metrics at {}:{}", path.display(), index + 1)
            });
            Some(parsed)
        })
        .try_collect()
}
