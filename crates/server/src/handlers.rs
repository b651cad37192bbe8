//! LIST, GET, GET-RESUME, PUT, and PUT-RESUME.
//!
//! Each handler owns one command exchange. Errors returned from here that
//! are not transport failures become a single `E` frame in the command
//! loop.

use ftecho_protocol::constants::READY_TO_RECEIVE;
use ftecho_protocol::messages::{encode_listing, from_payload, to_payload};
use ftecho_protocol::{Direction, Frame, FrameType, GetAck, PutRequest, PutResumeAck, ResumeRequest};
use ftecho_transfer::{ChunkReader, ChunkWriter, TransferError, is_hex_digest};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::ServerError;
use crate::connection::Connection;

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub(crate) async fn handle_list(&mut self) -> Result<(), ServerError> {
        let entries = self.storage.list().await?;
        self.send(Frame::ok(encode_listing(&entries))).await?;
        info!(peer = %self.peer, count = entries.len(), "LIST completed");
        Ok(())
    }

    pub(crate) async fn handle_get(&mut self, name: &str) -> Result<(), ServerError> {
        info!(peer = %self.peer, file = %name, "GET");
        let reader = self.storage.open_committed(name, 0).await?;
        let size = reader.file_size();

        let ack = GetAck { size, offset: None };
        self.send(Frame::ok(to_payload(&ack).map_err(TransferError::from)?))
            .await?;

        let sha = self.stream_file(reader).await?;
        info!(peer = %self.peer, file = %name, size, %sha, "GET completed");
        Ok(())
    }

    pub(crate) async fn handle_resume(&mut self, payload: &[u8]) -> Result<(), ServerError> {
        let req: ResumeRequest = from_payload(payload).map_err(TransferError::from)?;
        debug!(peer = %self.peer, file = %req.filename, direction = %req.direction, "RESUME");
        match req.direction {
            Direction::Get => self.handle_get_resume(&req.filename, req.offset).await,
            Direction::Put => self.handle_put_resume(&req.filename, req.offset).await,
        }
    }

    /// Streams `[offset, size)`; the `S` digest covers the whole file.
    async fn handle_get_resume(&mut self, name: &str, offset: u64) -> Result<(), ServerError> {
        info!(peer = %self.peer, file = %name, offset, "GET RESUME");
        let size = self.storage.committed_size(name).await?;
        if offset >= size {
            return Err(TransferError::OffsetOutOfRange { offset, size }.into());
        }

        let reader = self.storage.open_committed(name, offset).await?;
        let ack = GetAck {
            size,
            offset: Some(offset),
        };
        self.send(Frame::ok(to_payload(&ack).map_err(TransferError::from)?))
            .await?;

        let sha = self.stream_file(reader).await?;
        info!(peer = %self.peer, file = %name, offset, size, %sha, "GET RESUME completed");
        Ok(())
    }

    /// Sends the remaining chunks as `F` frames followed by the `S` digest.
    async fn stream_file(&mut self, mut reader: ChunkReader) -> Result<String, ServerError> {
        while let Some(chunk) = reader.next_chunk().await? {
            self.send(Frame::file_data(&chunk)).await?;
        }
        let sha = reader.finish();
        self.send(Frame::checksum(&sha)).await?;
        Ok(sha)
    }

    pub(crate) async fn handle_put(&mut self, payload: &[u8]) -> Result<(), ServerError> {
        let req: PutRequest = from_payload(payload).map_err(TransferError::from)?;
        let name = req.filename.as_str();
        info!(peer = %self.peer, file = %name, size = req.size, "PUT");

        let mut writer = self.storage.create_staged(name).await?;
        self.send(Frame::ok(READY_TO_RECEIVE)).await?;

        let client_sha = match self.receive_exact(&mut writer, req.size).await {
            Ok(sha) => sha,
            Err(e) if e.is_transport() => {
                // Leave the partial upload for a later resume.
                self.keep_partial(&mut writer).await;
                return Err(e);
            }
            Err(e) => {
                drop(writer);
                self.abandon(name).await;
                return Err(e);
            }
        };

        let server_sha = writer.digest();
        if server_sha != client_sha {
            drop(writer);
            self.abandon(name).await;
            return Err(TransferError::ChecksumMismatch {
                server: server_sha,
                client: client_sha,
            }
            .into());
        }

        let sha = self.storage.commit(name, writer).await?;
        self.send(Frame::ok(sha.as_bytes())).await?;
        info!(peer = %self.peer, file = %name, size = req.size, %sha, "PUT completed");
        Ok(())
    }

    /// Receives exactly `size` bytes of `F` frames, then the client's `S`.
    async fn receive_exact(
        &mut self,
        writer: &mut ChunkWriter,
        size: u64,
    ) -> Result<String, ServerError> {
        while writer.written() < size {
            let frame = self.recv().await?;
            if frame.frame_type != FrameType::FileData {
                return Err(TransferError::UnexpectedFrame(frame.frame_type).into());
            }
            writer.write_chunk(&frame.payload).await?;
        }
        if writer.written() != size {
            return Err(TransferError::SizeMismatch {
                expected: size,
                received: writer.written(),
            }
            .into());
        }

        let frame = self.recv().await?;
        if frame.frame_type != FrameType::Checksum {
            return Err(TransferError::UnexpectedFrame(frame.frame_type).into());
        }
        client_digest(&frame)
    }

    /// Appends to an existing `.part` whose size must equal `offset`.
    ///
    /// The `.part` survives every failure so the upload can be resumed again.
    async fn handle_put_resume(&mut self, name: &str, offset: u64) -> Result<(), ServerError> {
        info!(peer = %self.peer, file = %name, offset, "PUT RESUME");
        let current = self
            .storage
            .staged_size(name)
            .await?
            .ok_or_else(|| TransferError::NoPartialUpload(name.to_string()))?;
        if offset != current {
            return Err(TransferError::OffsetMismatch {
                expected: current,
                got: offset,
            }
            .into());
        }

        let mut writer = self.storage.append_staged(name).await?;
        let ack = PutResumeAck {
            offset,
            ready: true,
        };
        self.send(Frame::ok(to_payload(&ack).map_err(TransferError::from)?))
            .await?;

        let client_sha = match self.receive_until_checksum(&mut writer).await {
            Ok(sha) => sha,
            Err(e) => {
                self.keep_partial(&mut writer).await;
                return Err(e);
            }
        };

        let server_sha = writer.digest();
        if server_sha != client_sha {
            self.keep_partial(&mut writer).await;
            return Err(TransferError::ChecksumMismatch {
                server: server_sha,
                client: client_sha,
            }
            .into());
        }

        let total = writer.written();
        let sha = self.storage.commit(name, writer).await?;
        self.send(Frame::ok(sha.as_bytes())).await?;
        info!(peer = %self.peer, file = %name, total, %sha, "PUT RESUME completed");
        Ok(())
    }

    /// Appends `F` frames until the client's `S` arrives.
    async fn receive_until_checksum(
        &mut self,
        writer: &mut ChunkWriter,
    ) -> Result<String, ServerError> {
        loop {
            let frame = self.recv().await?;
            match frame.frame_type {
                FrameType::FileData => writer.write_chunk(&frame.payload).await?,
                FrameType::Checksum => return client_digest(&frame),
                other => return Err(TransferError::UnexpectedFrame(other).into()),
            }
        }
    }

    /// Flushes a staged upload that stays on disk for a later resume.
    async fn keep_partial(&self, writer: &mut ChunkWriter) {
        if let Err(e) = writer.flush().await {
            warn!(
                peer = %self.peer,
                path = %writer.path().display(),
                error = %e,
                "failed to flush partial upload"
            );
        }
    }

    /// Deletes a failed upload's `.part`, logging rather than failing.
    async fn abandon(&self, name: &str) {
        if let Err(e) = self.storage.discard_staged(name).await {
            warn!(peer = %self.peer, file = %name, error = %e, "failed to remove partial upload");
        }
    }
}

/// The digest carried by a client's `S` frame.
fn client_digest(frame: &Frame) -> Result<String, ServerError> {
    let digest = frame.text().trim().to_string();
    if !is_hex_digest(&digest) {
        return Err(TransferError::InvalidDigest(digest).into());
    }
    Ok(digest)
}

#[cfg(test)]
mod tests {
    use ftecho_protocol::messages::{from_payload, parse_listing, to_payload};
    use ftecho_protocol::{Direction, Frame, FrameType, GetAck, PutRequest, ResumeRequest};
    use ftecho_transfer::checksum_bytes;

    use crate::test_support::Harness;

    fn put_frame(name: &str, size: u64) -> Frame {
        let req = PutRequest {
            filename: name.into(),
            size,
        };
        Frame::new(FrameType::Put, to_payload(&req).unwrap())
    }

    fn resume_frame(name: &str, offset: u64, direction: Direction) -> Frame {
        let req = ResumeRequest {
            filename: name.into(),
            offset,
            direction,
        };
        Frame::new(FrameType::Resume, to_payload(&req).unwrap())
    }

    /// Runs a full PUT exchange and returns the server's final frame.
    async fn upload(h: &mut Harness, name: &str, data: &[u8]) -> Frame {
        let ack = h.request(put_frame(name, data.len() as u64)).await;
        assert_eq!(ack.frame_type, FrameType::Ok);
        assert_eq!(ack.text(), "Ready to receive");

        for chunk in data.chunks(4096) {
            h.send(Frame::file_data(chunk)).await;
        }
        h.request(Frame::checksum(&checksum_bytes(data))).await
    }

    /// Collects `F` frames until `S`; returns (bytes, digest).
    async fn download_body(h: &mut Harness) -> (Vec<u8>, String) {
        let mut body = Vec::new();
        loop {
            let frame = h.recv().await;
            match frame.frame_type {
                FrameType::FileData => body.extend_from_slice(&frame.payload),
                FrameType::Checksum => return (body, frame.text()),
                other => panic!("unexpected frame {other}"),
            }
        }
    }

    #[tokio::test]
    async fn put_then_get_roundtrip() {
        let mut h = Harness::start();
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let done = upload(&mut h, "data.bin", &data).await;
        assert_eq!(done.frame_type, FrameType::Ok);
        assert_eq!(done.text(), checksum_bytes(&data));
        assert_eq!(std::fs::read(h.path("data.bin")).unwrap(), data);
        assert!(!h.path("data.bin.part").exists());

        let ack = h.request(Frame::new(FrameType::Get, b"data.bin".to_vec())).await;
        assert_eq!(ack.frame_type, FrameType::Ok);
        let meta: GetAck = from_payload(&ack.payload).unwrap();
        assert_eq!(meta.size, data.len() as u64);
        assert_eq!(meta.offset, None);

        let (body, sha) = download_body(&mut h).await;
        assert_eq!(body, data);
        assert_eq!(sha, checksum_bytes(&data));
    }

    #[tokio::test]
    async fn get_trims_filename() {
        let mut h = Harness::start();
        std::fs::write(h.path("a.txt"), b"abc").unwrap();

        let ack = h.request(Frame::new(FrameType::Get, b" a.txt\n".to_vec())).await;
        assert_eq!(ack.frame_type, FrameType::Ok);
        let (body, _) = download_body(&mut h).await;
        assert_eq!(body, b"abc");
    }

    #[tokio::test]
    async fn get_missing_file_sends_only_error() {
        let mut h = Harness::start();

        let reply = h
            .request(Frame::new(FrameType::Get, b"missing.bin".to_vec()))
            .await;
        assert_eq!(reply.frame_type, FrameType::Error);
        assert_eq!(reply.text(), "File not found: missing.bin");

        // The next frame belongs to the next command.
        let reply = h.request(Frame::empty(FrameType::List)).await;
        assert_eq!(reply.frame_type, FrameType::Ok);
    }

    #[tokio::test]
    async fn empty_file_roundtrip() {
        let mut h = Harness::start();

        let done = upload(&mut h, "empty.txt", b"").await;
        assert_eq!(done.text(), checksum_bytes(b""));

        let ack = h.request(Frame::new(FrameType::Get, b"empty.txt".to_vec())).await;
        let meta: GetAck = from_payload(&ack.payload).unwrap();
        assert_eq!(meta.size, 0);
        let (body, sha) = download_body(&mut h).await;
        assert!(body.is_empty());
        assert_eq!(sha, checksum_bytes(b""));
    }

    #[tokio::test]
    async fn list_hides_partial_uploads() {
        let mut h = Harness::start();
        upload(&mut h, "one.txt", b"1").await;
        std::fs::write(h.path("two.txt.part"), b"22").unwrap();

        let reply = h.request(Frame::empty(FrameType::List)).await;
        let entries = parse_listing(&reply.payload).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "one.txt");
        assert_eq!(entries[0].size, 1);
    }

    #[tokio::test]
    async fn put_invalid_metadata() {
        let mut h = Harness::start();

        let reply = h
            .request(Frame::new(FrameType::Put, b"hello.txt|16".to_vec()))
            .await;
        assert_eq!(reply.frame_type, FrameType::Error);
        assert!(reply.text().starts_with("Invalid metadata: "));
    }

    #[tokio::test]
    async fn put_rejects_path_traversal() {
        let mut h = Harness::start();
        let reply = h.request(put_frame("../escape.txt", 1)).await;
        assert_eq!(reply.frame_type, FrameType::Error);
        assert!(reply.text().starts_with("Invalid file name"));
    }

    #[tokio::test]
    async fn put_rejects_newline_in_name() {
        let mut h = Harness::start();
        upload(&mut h, "good.txt", b"abc").await;

        let reply = h.request(put_frame("evil\nname", 3)).await;
        assert_eq!(reply.frame_type, FrameType::Error);
        assert!(reply.text().starts_with("Invalid file name: "));

        let reply = h.request(Frame::empty(FrameType::List)).await;
        let entries = parse_listing(&reply.payload).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "good.txt");
    }

    #[tokio::test]
    async fn put_non_data_frame_aborts_and_discards() {
        let mut h = Harness::start();

        let ack = h.request(put_frame("x.bin", 10)).await;
        assert_eq!(ack.frame_type, FrameType::Ok);
        h.send(Frame::file_data(b"12345")).await;

        let reply = h.request(Frame::empty(FrameType::List)).await;
        assert_eq!(reply.frame_type, FrameType::Error);
        assert_eq!(reply.text(), "Unexpected message type: L");
        assert!(!h.path("x.bin.part").exists());
        assert!(!h.path("x.bin").exists());
    }

    #[tokio::test]
    async fn put_oversized_chunk_is_size_mismatch() {
        let mut h = Harness::start();

        h.request(put_frame("x.bin", 3)).await;
        let reply = h.request(Frame::file_data(b"12345")).await;
        assert_eq!(reply.frame_type, FrameType::Error);
        assert_eq!(reply.text(), "Size mismatch: expected 3, received 5");
        assert!(!h.path("x.bin.part").exists());
    }

    #[tokio::test]
    async fn put_wrong_client_digest_discards() {
        let mut h = Harness::start();

        h.request(put_frame("x.bin", 3)).await;
        h.send(Frame::file_data(b"abc")).await;
        let reply = h.request(Frame::checksum(&checksum_bytes(b"xyz"))).await;
        assert_eq!(reply.frame_type, FrameType::Error);
        assert!(reply.text().starts_with("Checksum mismatch"));
        assert!(!h.path("x.bin.part").exists());
        assert!(!h.path("x.bin").exists());
    }

    #[tokio::test]
    async fn put_malformed_digest_is_rejected() {
        let mut h = Harness::start();

        h.request(put_frame("x.bin", 3)).await;
        h.send(Frame::file_data(b"abc")).await;
        let reply = h
            .request(Frame::new(FrameType::Checksum, b"not-a-digest".to_vec()))
            .await;
        assert_eq!(reply.frame_type, FrameType::Error);
        assert_eq!(reply.text(), "Invalid checksum: not-a-digest");
        assert!(!h.path("x.bin.part").exists());
        assert!(!h.path("x.bin").exists());
    }

    #[tokio::test]
    async fn put_resume_malformed_digest_keeps_partial() {
        let mut h = Harness::start();
        std::fs::write(h.path("r.bin.part"), b"abc").unwrap();

        h.request(resume_frame("r.bin", 3, Direction::Put)).await;
        h.send(Frame::file_data(b"def")).await;
        let digest = checksum_bytes(b"abcdef").to_uppercase();
        let reply = h.request(Frame::checksum(&digest)).await;
        assert_eq!(reply.frame_type, FrameType::Error);
        assert!(reply.text().starts_with("Invalid checksum: "));
        assert_eq!(std::fs::read(h.path("r.bin.part")).unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn put_overwrites_committed_file() {
        let mut h = Harness::start();
        upload(&mut h, "f.txt", b"first").await;
        upload(&mut h, "f.txt", b"second").await;
        assert_eq!(std::fs::read(h.path("f.txt")).unwrap(), b"second");
    }

    #[tokio::test]
    async fn disconnect_mid_put_keeps_partial() {
        let mut h = Harness::start();

        h.request(put_frame("big.bin", 100)).await;
        h.send(Frame::file_data(&[9u8; 40])).await;
        let dir = h.hang_up().await;

        let part = dir.path().join("big.bin.part");
        assert_eq!(std::fs::read(part).unwrap(), vec![9u8; 40]);
        assert!(!dir.path().join("big.bin").exists());
    }

    #[tokio::test]
    async fn put_resume_appends_and_commits() {
        let mut h = Harness::start();
        std::fs::write(h.path("r.bin.part"), b"hello ").unwrap();

        let ack = h.request(resume_frame("r.bin", 6, Direction::Put)).await;
        assert_eq!(ack.frame_type, FrameType::Ok);
        assert_eq!(ack.text(), r#"{"offset":6,"ready":true}"#);

        h.send(Frame::file_data(b"world")).await;
        let reply = h
            .request(Frame::checksum(&checksum_bytes(b"hello world")))
            .await;
        assert_eq!(reply.frame_type, FrameType::Ok);
        assert_eq!(reply.text(), checksum_bytes(b"hello world"));
        assert_eq!(std::fs::read(h.path("r.bin")).unwrap(), b"hello world");
        assert!(!h.path("r.bin.part").exists());
    }

    #[tokio::test]
    async fn put_resume_offset_mismatch_leaves_partial() {
        let mut h = Harness::start();
        std::fs::write(h.path("r.bin.part"), b"hello").unwrap();

        let reply = h.request(resume_frame("r.bin", 3, Direction::Put)).await;
        assert_eq!(reply.frame_type, FrameType::Error);
        assert_eq!(reply.text(), "Offset mismatch: expected 5, got 3");
        assert_eq!(std::fs::read(h.path("r.bin.part")).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn put_resume_without_partial() {
        let mut h = Harness::start();
        let reply = h.request(resume_frame("none.bin", 0, Direction::Put)).await;
        assert_eq!(reply.text(), "No partial file found for resume: none.bin");
    }

    #[tokio::test]
    async fn put_resume_checksum_mismatch_keeps_grown_partial() {
        let mut h = Harness::start();
        std::fs::write(h.path("r.bin.part"), b"abc").unwrap();

        h.request(resume_frame("r.bin", 3, Direction::Put)).await;
        h.send(Frame::file_data(b"def")).await;
        let reply = h.request(Frame::checksum(&checksum_bytes(b"nope"))).await;
        assert_eq!(reply.frame_type, FrameType::Error);
        assert!(reply.text().starts_with("Checksum mismatch"));

        assert_eq!(std::fs::read(h.path("r.bin.part")).unwrap(), b"abcdef");
        assert!(!h.path("r.bin").exists());

        // Resumable at the new size.
        let ack = h.request(resume_frame("r.bin", 6, Direction::Put)).await;
        assert_eq!(ack.frame_type, FrameType::Ok);
    }

    #[tokio::test]
    async fn get_resume_certifies_whole_file() {
        let mut h = Harness::start();
        let data: Vec<u8> = (0..9000u32).map(|i| (i % 7) as u8).collect();
        std::fs::write(h.path("g.bin"), &data).unwrap();

        let ack = h.request(resume_frame("g.bin", 5000, Direction::Get)).await;
        assert_eq!(ack.frame_type, FrameType::Ok);
        let meta: GetAck = from_payload(&ack.payload).unwrap();
        assert_eq!(meta.size, 9000);
        assert_eq!(meta.offset, Some(5000));

        let (body, sha) = download_body(&mut h).await;
        assert_eq!(body, &data[5000..]);
        assert_eq!(sha, checksum_bytes(&data));
    }

    #[tokio::test]
    async fn get_resume_offset_at_end_is_error() {
        let mut h = Harness::start();
        std::fs::write(h.path("g.bin"), b"0123456789").unwrap();

        let reply = h.request(resume_frame("g.bin", 10, Direction::Get)).await;
        assert_eq!(reply.frame_type, FrameType::Error);
        assert_eq!(reply.text(), "Offset 10 exceeds file size 10");
    }

    #[tokio::test]
    async fn get_resume_missing_file() {
        let mut h = Harness::start();
        let reply = h.request(resume_frame("nope.bin", 0, Direction::Get)).await;
        assert_eq!(reply.text(), "File not found: nope.bin");
    }

    #[tokio::test]
    async fn resume_with_bad_direction() {
        let mut h = Harness::start();
        let reply = h
            .request(Frame::new(
                FrameType::Resume,
                br#"{"filename":"a","offset":0,"direction":"up"}"#.to_vec(),
            ))
            .await;
        assert_eq!(reply.frame_type, FrameType::Error);
        assert!(reply.text().starts_with("Invalid metadata: "));
    }
}
