//! In-memory client harness for connection tests.

use std::path::PathBuf;
use std::sync::Arc;

use ftecho_protocol::{Frame, WireError, read_frame, write_frame};
use ftecho_transfer::Storage;
use tempfile::TempDir;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use crate::{Connection, ServerError};

pub struct Harness {
    pub dir: TempDir,
    client: DuplexStream,
    task: JoinHandle<Result<(), ServerError>>,
}

impl Harness {
    /// Serves a fresh temp store over an in-memory duplex pipe.
    pub fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::new(dir.path()));
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(server);
        let conn = Connection::new(reader, writer, storage, "test-peer");
        let task = tokio::spawn(conn.serve());
        Self { dir, client, task }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub async fn send(&mut self, frame: Frame) {
        write_frame(&mut self.client, &frame).await.unwrap();
        self.client.flush().await.unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.client.write_all(bytes).await.unwrap();
        self.client.flush().await.unwrap();
    }

    pub async fn recv(&mut self) -> Frame {
        self.try_recv().await.unwrap()
    }

    pub async fn try_recv(&mut self) -> Result<Frame, WireError> {
        read_frame(&mut self.client).await
    }

    pub async fn request(&mut self, frame: Frame) -> Frame {
        self.send(frame).await;
        self.recv().await
    }

    /// Hangs up and waits for the server side to finish.
    pub async fn finish(self) -> Result<(), ServerError> {
        drop(self.client);
        self.task.await.unwrap()
    }

    /// Like [`finish`](Self::finish), but keeps the store alive for inspection.
    pub async fn hang_up(self) -> TempDir {
        drop(self.client);
        self.task.await.unwrap().unwrap();
        self.dir
    }
}
