//! The agent event feed: accepts agent connections and queues their frames.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use warden_transport::{Connection, Transport, TransportError};

/// Pumps frames from every connected agent into the ingestion queue.
///
/// The queue is bounded: when the ingestor falls behind, `send` waits and
/// the agent's socket stops being read, which pushes back on the agent.
pub struct EventFeed<T: Transport> {
    transport: T,
}

impl<T: Transport> EventFeed<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Accepts agents until `stop` fires, then waits for every
    /// per-connection pump to close its socket.
    pub async fn run(mut self, queue: mpsc::Sender<Vec<u8>>, stop: CancellationToken) {
        let connections = TaskTracker::new();
        info!("event feed running");

        loop {
            let accepted = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                accepted = self.transport.accept() => accepted,
            };
            match accepted {
                Ok(conn) => {
                    connections.spawn(pump(conn, queue.clone(), stop.clone()));
                }
                Err(TransportError::Shutdown) => break,
                Err(e) => error!(error = %e, "accept failed"),
            }
        }

        connections.close();
        connections.wait().await;
        info!("event feed stopped");
    }
}

/// Reads one agent's frames into the queue until it disconnects, the
/// queue closes, or `stop` fires.
async fn pump<C: Connection>(conn: C, queue: mpsc::Sender<Vec<u8>>, stop: CancellationToken) {
    let conn_id = conn.id();
    debug!(%conn_id, "agent feed opened");

    loop {
        let received = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            received = conn.recv() => received,
        };
        let frame = match received {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!(%conn_id, "agent closed the feed");
                break;
            }
            Err(e) => {
                warn!(%conn_id, error = %e, "agent feed failed");
                break;
            }
        };

        let sent = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            sent = queue.send(frame) => sent,
        };
        if sent.is_err() {
            debug!(%conn_id, "event queue closed");
            break;
        }
    }

    if let Err(e) = conn.close().await {
        debug!(%conn_id, error = %e, "close failed");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use warden_transport::ConnectionId;

    use super::*;

    /// Hands out scripted connections, then reports shutdown.
    struct ScriptedTransport {
        pending: VecDeque<ScriptedConnection>,
    }

    impl Transport for ScriptedTransport {
        type Connection = ScriptedConnection;

        async fn accept(&mut self) -> Result<ScriptedConnection, TransportError> {
            self.pending.pop_front().ok_or(TransportError::Shutdown)
        }
    }

    struct ScriptedConnection {
        id: u64,
        frames: Mutex<VecDeque<Vec<u8>>>,
        closed: Arc<Mutex<Vec<u64>>>,
    }

    impl Connection for ScriptedConnection {
        async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
            Ok(self.frames.lock().unwrap().pop_front())
        }

        async fn close(&self) -> Result<(), TransportError> {
            self.closed.lock().unwrap().push(self.id);
            Ok(())
        }

        fn id(&self) -> ConnectionId {
            ConnectionId::new(self.id)
        }
    }

    fn conn(id: u64, frames: &[&str], closed: &Arc<Mutex<Vec<u64>>>) -> ScriptedConnection {
        ScriptedConnection {
            id,
            frames: Mutex::new(frames.iter().map(|f| f.as_bytes().to_vec()).collect()),
            closed: Arc::clone(closed),
        }
    }

    #[tokio::test]
    async fn test_run_queues_frames_and_closes_connections() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let transport = ScriptedTransport {
            pending: VecDeque::from([
                conn(1, &["a1", "a2"], &closed),
                conn(2, &["b1"], &closed),
            ]),
        };
        let (tx, mut rx) = mpsc::channel(8);

        EventFeed::new(transport).run(tx, CancellationToken::new()).await;

        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(String::from_utf8(frame).unwrap());
        }
        frames.sort();
        assert_eq!(frames, vec!["a1", "a2", "b1"]);

        let mut closed = closed.lock().unwrap().clone();
        closed.sort();
        assert_eq!(closed, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_pump_stops_when_queue_closed() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        pump(conn(5, &["x", "y"], &closed), tx, CancellationToken::new()).await;

        assert_eq!(*closed.lock().unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn test_pump_stop_signal_unblocks_full_queue() {
        let closed = Arc::new(Mutex::new(Vec::new()));
        let (tx, _rx) = mpsc::channel(1);
        let stop = CancellationToken::new();

        let task = tokio::spawn(pump(conn(9, &["1", "2", "3"], &closed), tx, stop.clone()));
        tokio::task::yield_now().await;
        stop.cancel();
        task.await.unwrap();

        assert_eq!(*closed.lock().unwrap(), vec![9]);
    }
}
