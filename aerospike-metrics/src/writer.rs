// The metrics writer (spec §4.10): a size-capped, rotating,
// line-oriented UTF-8 log under `report_dir`. A header line records
// the schema version and the histogram parameters; one line per
// `metrics_interval` tend iterations after that.

use std::fs::{File, OpenOptions};
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use aerospike_base::{err, Error, ErrorKind, Result};

use crate::histogram::LatencyHistogram;

pub const SCHEMA_VERSION: u32 = 2;
/// Spec §6: "rotated when size exceeds the configured limit (minimum
/// 1 MB)".
pub const MIN_REPORT_SIZE_LIMIT: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct EventLoopSnapshot {
    pub process_size: u64,
    pub queue_size: u64,
}

#[derive(Debug, Clone)]
pub struct NodeLatency {
    pub op_type: String,
    pub histogram: LatencyHistogram,
}

#[derive(Debug, Clone)]
pub struct NodeSnapshot {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub sync_conn: u64,
    pub async_conn: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub latencies: Vec<NodeLatency>,
}

#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    pub name: String,
    pub cpu_pct: f64,
    pub mem_kb: u64,
    pub invalid_node_count: u64,
    pub command_count: u64,
    pub retry_count: u64,
    pub delay_queue_timeout_count: u64,
    pub event_loops: Vec<EventLoopSnapshot>,
    pub nodes: Vec<NodeSnapshot>,
}

fn render_snapshot(timestamp: i64, snapshot: &ClusterSnapshot) -> String {
    let event_loops = snapshot
        .event_loops
        .iter()
        .map(|e| format!("eventloop[{},{}]", e.process_size, e.queue_size))
        .collect::<Vec<_>>()
        .join(",");

    let nodes = snapshot
        .nodes
        .iter()
        .map(|n| {
            let latencies = n
                .latencies
                .iter()
                .map(|l| format!("latency[{}[{}]]", l.op_type, l.histogram.render()))
                .collect::<Vec<_>>()
                .join(",");
            format!(
                "node[{},{},{},{},{},{},{},{}]",
                n.name, n.host, n.port, n.sync_conn, n.async_conn, n.errors, n.timeouts, latencies
            )
        })
        .collect::<Vec<_>>()
        .join(",");

    format!(
        "{timestamp} cluster[{},{:.1},{},{},{},{},{},{},{}]",
        snapshot.name,
        snapshot.cpu_pct,
        snapshot.mem_kb,
        snapshot.invalid_node_count,
        snapshot.command_count,
        snapshot.retry_count,
        snapshot.delay_queue_timeout_count,
        event_loops,
        nodes,
    )
}

struct OpenFile {
    path: PathBuf,
    file: File,
    written: u64,
}

pub struct MetricsWriter {
    report_dir: PathBuf,
    report_size_limit: u64,
    pub latency_columns: usize,
    pub latency_shift: u32,
    current: Mutex<Option<OpenFile>>,
}

impl MetricsWriter {
    pub fn new(
        report_dir: impl Into<PathBuf>,
        report_size_limit: u64,
        latency_columns: usize,
        latency_shift: u32,
    ) -> Result<Self> {
        if report_size_limit < MIN_REPORT_SIZE_LIMIT {
            return Err(err(
                ErrorKind::Param,
                "report_size_limit below the 1 MB minimum",
            ));
        }
        Ok(Self {
            report_dir: report_dir.into(),
            report_size_limit,
            latency_columns,
            latency_shift,
            current: Mutex::new(None),
        })
    }

    fn file_name(now_epoch_ms: i64) -> String {
        format!("aerospike-metrics-{now_epoch_ms}.log")
    }

    fn open_new_file(&self, now_epoch_ms: i64) -> Result<OpenFile> {
        std::fs::create_dir_all(&self.report_dir).map_err(|e| Error::new(ErrorKind::Client, e))?;
        let path = self.report_dir.join(Self::file_name(now_epoch_ms));
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| Error::new(ErrorKind::Client, e))?;
        let header = format!(
            "schema={SCHEMA_VERSION} timestamp={now_epoch_ms} latency_columns={} latency_shift={}\n",
            self.latency_columns, self.latency_shift
        );
        file.write_all(header.as_bytes())
            .map_err(|e| Error::new(ErrorKind::Client, e))?;
        Ok(OpenFile {
            path,
            file,
            written: header.len() as u64,
        })
    }

    /// Enables the writer, opening the first report file and writing
    /// its header line.
    pub fn enable(&self, now_epoch_ms: i64) -> Result<()> {
        let opened = self.open_new_file(now_epoch_ms)?;
        *self.current.lock() = Some(opened);
        Ok(())
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        self.current.lock().as_ref().map(|f| f.path.clone())
    }

    /// Appends one snapshot line, rotating to a fresh timestamp-named
    /// file first if the current one has grown past the limit.
    pub fn write_snapshot(&self, now_epoch_ms: i64, snapshot: &ClusterSnapshot) -> Result<()> {
        let mut guard = self.current.lock();
        let needs_rotation = match guard.as_ref() {
            Some(f) => f.written >= self.report_size_limit,
            None => true,
        };
        if needs_rotation {
            *guard = Some(self.open_new_file(now_epoch_ms)?);
        }
        let opened = guard.as_mut().expect("just opened above");
        let mut line = render_snapshot(now_epoch_ms, snapshot);
        line.push('\n');
        opened
            .file
            .write_all(line.as_bytes())
            .map_err(|e| Error::new(ErrorKind::Client, e))?;
        opened.written += line.len() as u64;
        Ok(())
    }

    pub fn disable(&self) {
        *self.current.lock() = None;
    }
}

pub fn report_dir_exists(dir: &Path) -> bool {
    dir.is_dir()
}

#[cfg(test)]
mod test {
    use super::*;

    fn snapshot() -> ClusterSnapshot {
        ClusterSnapshot {
            name: "test".into(),
            cpu_pct: 12.5,
            mem_kb: 2048,
            invalid_node_count: 0,
            command_count: 10,
            retry_count: 1,
            delay_queue_timeout_count: 0,
            event_loops: vec![EventLoopSnapshot {
                process_size: 3,
                queue_size: 0,
            }],
            nodes: vec![NodeSnapshot {
                name: "BB9".into(),
                host: "127.0.0.1".into(),
                port: 3000,
                sync_conn: 2,
                async_conn: 0,
                errors: 0,
                timeouts: 0,
                latencies: vec![NodeLatency {
                    op_type: "read".into(),
                    histogram: LatencyHistogram::new(4, 1),
                }],
            }],
        }
    }

    #[test]
    fn rejects_limit_below_minimum() {
        let dir = tempfile::tempdir().unwrap();
        let e = MetricsWriter::new(dir.path(), 1024, 4, 1).unwrap_err();
        assert_eq!(e.kind(), ErrorKind::Param);
    }

    #[test]
    fn writes_header_and_snapshot_line() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MetricsWriter::new(dir.path(), MIN_REPORT_SIZE_LIMIT, 4, 1).unwrap();
        writer.enable(1_700_000_000_000).unwrap();
        writer.write_snapshot(1_700_000_001_000, &snapshot()).unwrap();
        let path = writer.current_path().unwrap();
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.starts_with("schema=2"));
        assert!(contents.contains("cluster[test"));
        assert!(contents.contains("node[BB9"));
    }

    #[test]
    fn rotates_when_past_the_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MetricsWriter::new(dir.path(), MIN_REPORT_SIZE_LIMIT, 4, 1).unwrap();
        writer.enable(1).unwrap();
        {
            let mut guard = writer.current.lock();
            guard.as_mut().unwrap().written = MIN_REPORT_SIZE_LIMIT;
        }
        writer.write_snapshot(2, &snapshot()).unwrap();
        let path = writer.current_path().unwrap();
        assert!(path.to_string_lossy().contains("aerospike-metrics-2"));
    }
}
