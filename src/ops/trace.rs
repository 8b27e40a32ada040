use super::snapshot::TickSnapshot;
use serde::Deserialize;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// event taxonomy persisted alongside snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceKind {
    Tick,
    Action,
    Solver,
    ViewportChange,
    Error,
    SystemEvent,
}

/// one line-delimited json record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub tick: u64,
    pub kind: TraceKind,
    pub data: serde_json::Value,
}

/// written once per session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub session_id: String,
    pub started_at: u64,
    pub tick_count: u64,
    pub config_hash: u64,
}

/// where structured traces go. the core only guarantees it calls these
/// with bounded frequency; persistence policy is the sink's concern.
pub trait TraceSink: Send + Sync {
    fn session(&self, meta: &SessionMeta);
    fn tick(&self, snapshot: &TickSnapshot);
    fn event(&self, event: &TraceEvent);
}

/// sink for sessions nobody wants to replay
#[derive(Debug, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn session(&self, _: &SessionMeta) {}
    fn tick(&self, _: &TickSnapshot) {}
    fn event(&self, _: &TraceEvent) {}
}

/// directory-backed sink: session.json once, events as jsonl, each
/// tick snapshot as its own binary file. failures degrade to a log
/// line; tracing never takes the pipeline down.
pub struct DiskSink {
    directory: PathBuf,
    events: Mutex<Option<std::fs::File>>,
    /// keep only every nth snapshot; 1 keeps all
    snapshot_stride: u64,
}

impl DiskSink {
    pub fn new(directory: PathBuf, snapshot_stride: u64) -> std::io::Result<Self> {
        std::fs::create_dir_all(&directory)?;
        let events = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(directory.join("events.jsonl"))?;
        Ok(Self {
            directory,
            events: Mutex::new(Some(events)),
            snapshot_stride: snapshot_stride.max(1),
        })
    }
}

impl TraceSink for DiskSink {
    fn session(&self, meta: &SessionMeta) {
        let path = self.directory.join("session.json");
        let payload = serde_json::to_vec_pretty(meta).unwrap_or_default();
        if let Err(e) = std::fs::write(&path, payload) {
            log::warn!("session metadata write failed: {}", e);
        }
    }

    fn tick(&self, snapshot: &TickSnapshot) {
        if snapshot.tick % self.snapshot_stride != 0 {
            return;
        }
        let path = self.directory.join(format!("tick_{:08}.bin", snapshot.tick));
        if let Err(e) = std::fs::write(&path, snapshot.encode()) {
            log::warn!("snapshot write failed: {}", e);
        }
    }

    fn event(&self, event: &TraceEvent) {
        let mut guard = self.events.lock().expect("event file lock");
        let Some(file) = guard.as_mut() else {
            return;
        };
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                log::warn!("event serialization failed: {}", e);
                return;
            }
        };
        if writeln!(file, "{}", line).is_err() {
            // a dead file stays dead; stop trying
            *guard = None;
            log::warn!("event log unwritable, tracing disabled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::symbol::Symbol;
    use crate::grid::tensor::TensorGrid;

    fn snapshot(tick: u64) -> TickSnapshot {
        let grid = TensorGrid::new();
        grid.set_cell((0, 0), Symbol::Number(3), 1.0, false).unwrap();
        TickSnapshot {
            tick,
            view: (*grid.solver_view()).clone(),
        }
    }

    #[test]
    fn disk_sink_lays_out_a_session() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiskSink::new(dir.path().to_path_buf(), 1).unwrap();
        sink.session(&SessionMeta {
            session_id: "s1".into(),
            started_at: 0,
            tick_count: 2,
            config_hash: 42,
        });
        sink.tick(&snapshot(0));
        sink.tick(&snapshot(1));
        sink.event(&TraceEvent {
            tick: 0,
            kind: TraceKind::Action,
            data: serde_json::json!({"kind": "reveal", "at": [1, 2]}),
        });
        sink.event(&TraceEvent {
            tick: 1,
            kind: TraceKind::Error,
            data: serde_json::json!({"message": "driver declined"}),
        });
        assert!(dir.path().join("session.json").exists());
        assert!(dir.path().join("tick_00000000.bin").exists());
        assert!(dir.path().join("tick_00000001.bin").exists());
        let events = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        let lines = events.lines().collect::<Vec<_>>();
        assert!(lines.len() == 2);
        let parsed: TraceEvent = serde_json::from_str(lines[0]).unwrap();
        assert!(parsed.kind == TraceKind::Action);
    }

    #[test]
    fn snapshot_stride_skips_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiskSink::new(dir.path().to_path_buf(), 4).unwrap();
        for tick in 0..8 {
            sink.tick(&snapshot(tick));
        }
        assert!(dir.path().join("tick_00000000.bin").exists());
        assert!(dir.path().join("tick_00000004.bin").exists());
        assert!(!dir.path().join("tick_00000001.bin").exists());
    }

    #[test]
    fn persisted_snapshots_decode() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiskSink::new(dir.path().to_path_buf(), 1).unwrap();
        sink.tick(&snapshot(7));
        let bytes = std::fs::read(dir.path().join("tick_00000007.bin")).unwrap();
        let decoded = TickSnapshot::decode(&bytes).unwrap();
        assert!(decoded.tick == 7);
        assert!(decoded.view.symbol((0, 0)) == Symbol::Number(3));
    }
}
