//! In-memory connections for pool tests.

use sqlshift_core::{
    ConnectionError, ConnectionErrorKind, Connection, Dialect, Error, Result, Row, Value,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Counters and switches shared by a factory and every connection it made.
#[derive(Debug, Default)]
pub struct FakeControl {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub live: AtomicUsize,
    pub peak: AtomicUsize,
    pub fail_connects: AtomicUsize,
    pub fail_reconnects: AtomicBool,
}

impl FakeControl {
    fn lost() -> Error {
        Error::Connection(ConnectionError {
            kind: ConnectionErrorKind::Disconnected,
            message: "fake connection is closed".to_string(),
            source: None,
        })
    }
}

#[derive(Clone, Default)]
pub struct FakeFactory {
    control: Arc<FakeControl>,
}

impl FakeFactory {
    pub fn control(&self) -> Arc<FakeControl> {
        Arc::clone(&self.control)
    }

    pub fn open(&self) -> Result<Box<dyn Connection>> {
        let pending = self.control.fail_connects.load(Ordering::SeqCst);
        if pending > 0 {
            self.control.fail_connects.store(pending - 1, Ordering::SeqCst);
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "database unreachable".to_string(),
                source: None,
            }));
        }
        self.control.opened.fetch_add(1, Ordering::SeqCst);
        let live = self.control.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.control.peak.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            control: Arc::clone(&self.control),
            active: true,
            depth: 0,
        }))
    }
}

impl crate::ConnectionFactory for FakeFactory {
    fn connect(&self) -> Result<Box<dyn Connection>> {
        self.open()
    }
}

pub struct FakeConnection {
    control: Arc<FakeControl>,
    active: bool,
    depth: usize,
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.control.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Connection for FakeConnection {
    fn adapter_name(&self) -> &str {
        "fake"
    }

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&mut self, _sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
        if self.active {
            Ok(Vec::new())
        } else {
            Err(FakeControl::lost())
        }
    }

    fn execute(&mut self, _sql: &str, _params: &[Value]) -> Result<u64> {
        if self.active {
            Ok(0)
        } else {
            Err(FakeControl::lost())
        }
    }

    fn execute_batch(&mut self, _sql: &str) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(FakeControl::lost())
        }
    }

    fn begin_transaction(&mut self) -> Result<()> {
        self.depth += 1;
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<()> {
        self.depth = self.depth.saturating_sub(1);
        Ok(())
    }

    fn rollback_transaction(&mut self) -> Result<()> {
        self.depth = self.depth.saturating_sub(1);
        Ok(())
    }

    fn transaction_depth(&self) -> usize {
        self.depth
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn reconnect(&mut self) -> Result<()> {
        if self.control.fail_reconnects.load(Ordering::SeqCst) {
            return Err(Error::Connection(ConnectionError {
                kind: ConnectionErrorKind::Connect,
                message: "database unreachable".to_string(),
                source: None,
            }));
        }
        self.active = true;
        self.depth = 0;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if self.active {
            self.control.closed.fetch_add(1, Ordering::SeqCst);
        }
        self.active = false;
        self.depth = 0;
        Ok(())
    }

    fn table_exists(&mut self, _name: &str) -> Result<bool> {
        Ok(false)
    }

    fn tables(&mut self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
