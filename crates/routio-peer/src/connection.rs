use std::fmt;
use std::os::fd::{AsRawFd, RawFd};

use routio_frame::{Frame, FrameConfig, FrameKind, FrameReader, FrameWriter};
use routio_transport::IpcStream;
use tracing::{debug, trace, warn};

use crate::error::{PeerError, Result};
use crate::hello::{Hello, HelloConfig, Role};
use crate::ioloop::Interest;

/// Identifies one connection within its owning client or router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// The peer id an acceptor hands out for this connection.
    pub fn peer_label(self) -> String {
        format!("peer-{}", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Configuration shared by every connection a client or router opens.
#[derive(Debug, Clone, Default)]
pub struct ConnectionConfig {
    /// Frame limits and the outbound high-water mark.
    pub frame: FrameConfig,
    /// Hello validation.
    pub hello: HelloConfig,
}

/// What one [`Connection::on_readable`] call produced.
#[derive(Debug, Default)]
pub struct Inbound {
    /// Complete non-HELLO frames, in arrival order.
    pub frames: Vec<Frame>,
    /// The session hello completed during this call.
    pub established: bool,
    /// The peer closed the stream; the connection is now closed.
    pub eof: bool,
}

/// One framed, non-blocking stream to another client or the router.
///
/// The first frame in each direction is a HELLO. The initiator queues its
/// hello on construction; the acceptor answers once the initiator's hello
/// validates. Frames written on the acceptor side before that are held back
/// so the hello always goes first.
pub struct Connection {
    id: ConnectionId,
    role: Role,
    reader: FrameReader<IpcStream>,
    writer: FrameWriter<IpcStream>,
    hello_config: HelloConfig,
    local: Hello,
    remote: Option<Hello>,
    deferred: Vec<Frame>,
    closed: bool,
}

impl Connection {
    /// Wrap a freshly connected stream and queue the local hello.
    pub fn initiate(
        id: ConnectionId,
        stream: IpcStream,
        config: &ConnectionConfig,
        local: Hello,
    ) -> Result<Self> {
        let mut conn = Self::open(id, Role::Initiator, stream, config, local)?;
        let hello = conn.local.to_frame()?;
        conn.writer.enqueue(&hello)?;
        Ok(conn)
    }

    /// Wrap an accepted stream; the hello reply is sent once the remote
    /// hello arrives.
    pub fn accept(
        id: ConnectionId,
        stream: IpcStream,
        config: &ConnectionConfig,
        local: Hello,
    ) -> Result<Self> {
        Self::open(id, Role::Acceptor, stream, config, local)
    }

    fn open(
        id: ConnectionId,
        role: Role,
        stream: IpcStream,
        config: &ConnectionConfig,
        local: Hello,
    ) -> Result<Self> {
        stream.set_nonblocking(true)?;
        let reader_stream = stream.try_clone()?;
        debug!(
            connection = %id,
            ?role,
            transport = stream.transport_name(),
            "connection opened"
        );

        Ok(Self {
            id,
            role,
            reader: FrameReader::with_config(reader_stream, config.frame.clone()),
            writer: FrameWriter::with_config(stream, config.frame.clone()),
            hello_config: config.hello.clone(),
            local,
            remote: None,
            deferred: Vec::new(),
            closed: false,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The remote hello, once the session is established.
    pub fn remote(&self) -> Option<&Hello> {
        self.remote.as_ref()
    }

    pub fn is_established(&self) -> bool {
        self.remote.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Readiness the event loop should poll for, `None` once closed.
    pub fn interest(&self) -> Option<Interest> {
        if self.closed {
            None
        } else if self.writer.has_pending() {
            Some(Interest::READ_WRITE)
        } else {
            Some(Interest::READABLE)
        }
    }

    /// Bytes queued for sending.
    pub fn pending_len(&self) -> usize {
        self.writer.pending_len()
    }

    /// Serialize a frame onto the outbound queue.
    ///
    /// Fails with [`PeerError::Backpressure`] when the queue is above the
    /// high-water mark; nothing is queued in that case.
    pub fn write(&mut self, frame: &Frame) -> Result<()> {
        if self.closed {
            return Err(PeerError::Closed);
        }
        if self.role == Role::Acceptor && self.remote.is_none() {
            self.writer.config().check(frame)?;
            self.deferred.push(frame.clone());
            return Ok(());
        }
        self.writer.enqueue(frame)?;
        Ok(())
    }

    /// Read everything available and reassemble complete frames.
    ///
    /// A protocol violation (bad header, oversized lengths, a bad or
    /// missing hello) closes the connection and surfaces no frame from
    /// this call.
    pub fn on_readable(&mut self) -> Result<Inbound> {
        if self.closed {
            return Err(PeerError::Closed);
        }

        let batch = match self.reader.read_available() {
            Ok(batch) => batch,
            Err(err) => return Err(self.fail(err.into())),
        };

        let mut inbound = Inbound::default();
        for frame in batch.frames {
            if self.remote.is_none() {
                if let Err(err) = self.complete_hello(&frame) {
                    return Err(self.fail(err));
                }
                inbound.established = true;
                continue;
            }
            if frame.kind == FrameKind::Hello {
                return Err(self.fail(PeerError::Protocol("duplicate HELLO".to_string())));
            }
            trace!(connection = %self.id, kind = %frame.kind, channel = %frame.channel, "frame received");
            inbound.frames.push(frame);
        }

        if batch.eof {
            if self.reader.buffered() > 0 {
                warn!(
                    connection = %self.id,
                    buffered = self.reader.buffered(),
                    "peer closed mid-frame"
                );
            }
            debug!(connection = %self.id, "peer closed connection");
            self.close();
            inbound.eof = true;
        }
        Ok(inbound)
    }

    /// Flush as much of the outbound queue as the socket accepts.
    ///
    /// Returns `Ok(true)` once the queue is empty.
    pub fn on_writable(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(true);
        }
        match self.writer.flush_pending() {
            Ok(done) => Ok(done),
            Err(err) => Err(self.fail(err.into())),
        }
    }

    /// One non-blocking flush attempt, then close.
    pub fn close_gracefully(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.writer.flush_pending() {
            debug!(connection = %self.id, error = %err, "flush on close failed");
        } else if self.writer.has_pending() {
            debug!(
                connection = %self.id,
                dropped = self.writer.pending_len(),
                "closing with unsent bytes"
            );
        }
        self.close();
    }

    /// Close immediately, dropping anything still queued. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.writer.discard_pending();
        self.deferred.clear();
        self.writer.get_ref().shutdown();
        debug!(connection = %self.id, "connection closed");
    }

    fn complete_hello(&mut self, frame: &Frame) -> Result<()> {
        let remote = Hello::from_frame(frame, &self.hello_config, self.role)?;

        if self.role == Role::Acceptor {
            let reply = self
                .local
                .clone()
                .with_peer_id(self.id.peer_label())
                .to_frame()?;
            self.writer.enqueue(&reply)?;
            for deferred in std::mem::take(&mut self.deferred) {
                if let Err(err) = self.writer.enqueue(&deferred) {
                    warn!(
                        connection = %self.id,
                        channel = %deferred.channel,
                        error = %err,
                        "dropping frame queued before hello"
                    );
                }
            }
        }

        debug!(
            connection = %self.id,
            remote = %remote.name,
            version = %remote.version,
            "session established"
        );
        self.remote = Some(remote);
        Ok(())
    }

    fn fail(&mut self, err: PeerError) -> PeerError {
        if err.is_protocol() {
            warn!(connection = %self.id, error = %err, "protocol violation, closing connection");
        } else {
            debug!(connection = %self.id, error = %err, "connection failed");
        }
        self.close();
        err
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.writer.get_ref().as_raw_fd()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("established", &self.is_established())
            .field("closed", &self.closed)
            .field("pending", &self.writer.pending_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::{Duration, Instant};

    use bytes::{BufMut, BytesMut};
    use routio_frame::MAGIC;

    use super::*;

    fn pair() -> (Connection, Connection) {
        let (left, right) = IpcStream::pair().unwrap();
        let config = ConnectionConfig::default();
        let hello = HelloConfig::default();
        let initiator = Connection::initiate(
            ConnectionId::new(1),
            left,
            &config,
            Hello::new(&hello, "client"),
        )
        .unwrap();
        let acceptor = Connection::accept(
            ConnectionId::new(7),
            right,
            &config,
            Hello::new(&hello, "server"),
        )
        .unwrap();
        (initiator, acceptor)
    }

    /// Pump both sides until `done` holds or the deadline passes.
    fn pump(
        a: &mut Connection,
        b: &mut Connection,
        mut done: impl FnMut(&[Frame], &[Frame]) -> bool,
    ) -> (Vec<Frame>, Vec<Frame>) {
        let (mut got_a, mut got_b) = (Vec::new(), Vec::new());
        let deadline = Instant::now() + Duration::from_millis(300);
        while !done(&got_a[..], &got_b[..]) && Instant::now() < deadline {
            a.on_writable().unwrap();
            b.on_writable().unwrap();
            got_b.extend(b.on_readable().unwrap().frames);
            got_a.extend(a.on_readable().unwrap().frames);
        }
        (got_a, got_b)
    }

    #[test]
    fn hello_exchange_assigns_peer_id() {
        let (mut client, mut server) = pair();
        pump(&mut client, &mut server, |_, _| false);

        assert_eq!(server.remote().unwrap().name, "client");
        assert_eq!(client.remote().unwrap().name, "server");
        assert_eq!(client.remote().unwrap().peer_id.as_deref(), Some("peer-7"));
        assert!(server.remote().unwrap().peer_id.is_none());
    }

    #[test]
    fn acceptor_writes_wait_for_hello() {
        let (mut client, mut server) = pair();
        server
            .write(&Frame::control(FrameKind::Subscribe, "temp", "f"))
            .unwrap();
        assert_eq!(server.pending_len(), 0);

        let (got_client, _) = pump(&mut client, &mut server, |a, _| !a.is_empty());
        assert_eq!(got_client.len(), 1);
        assert_eq!(got_client[0].kind, FrameKind::Subscribe);
        assert!(client.is_established());
    }

    #[test]
    fn data_flows_after_hello() {
        let (mut client, mut server) = pair();
        client
            .write(&Frame::data("temp", "f", &b"payload"[..]))
            .unwrap();

        let (_, got_server) = pump(&mut client, &mut server, |_, b| !b.is_empty());
        assert_eq!(got_server, vec![Frame::data("temp", "f", &b"payload"[..])]);
    }

    #[test]
    fn data_before_hello_is_protocol_error() {
        let (mut raw, right) = IpcStream::pair().unwrap();
        let mut server = Connection::accept(
            ConnectionId::new(3),
            right,
            &ConnectionConfig::default(),
            Hello::new(&HelloConfig::default(), "server"),
        )
        .unwrap();

        let mut wire = BytesMut::new();
        routio_frame::encode_frame(&Frame::data("temp", "f", &b"x"[..]), &mut wire).unwrap();
        raw.write_all(&wire).unwrap();

        let deadline = Instant::now() + Duration::from_secs(1);
        let err = loop {
            match server.on_readable() {
                Err(err) => break err,
                Ok(_) if Instant::now() < deadline => continue,
                Ok(_) => panic!("violation not detected"),
            }
        };
        assert!(err.is_protocol());
        assert!(server.is_closed());
        assert!(matches!(server.write(&Frame::hello(&b"{}"[..])), Err(PeerError::Closed)));
    }

    #[test]
    fn oversized_frame_closes_connection() {
        let (mut client, mut server) = pair();
        pump(&mut client, &mut server, |_, _| false);
        assert!(server.is_established());

        // Hand-written header declaring a payload above the default maximum.
        let fd_stream = client.writer.get_mut();
        let mut header = BytesMut::new();
        header.put_slice(&MAGIC);
        header.put_u8(FrameKind::Data.as_u8());
        header.put_u16_le(4);
        header.put_slice(b"temp");
        header.put_u16_le(1);
        header.put_slice(b"f");
        header.put_u32_le(routio_frame::DEFAULT_MAX_PAYLOAD as u32 + 1);
        header.put_slice(&[0u8; 64]);
        fd_stream.write_all(&header).unwrap();

        let deadline = Instant::now() + Duration::from_secs(1);
        let err = loop {
            match server.on_readable() {
                Err(err) => break err,
                Ok(inbound) => {
                    assert!(inbound.frames.is_empty());
                    assert!(Instant::now() < deadline, "violation not detected");
                }
            }
        };
        assert!(err.is_protocol());
        assert!(server.is_closed());
        assert!(server.interest().is_none());
    }

    #[test]
    fn eof_closes_connection() {
        let (mut client, mut server) = pair();
        pump(&mut client, &mut server, |_, _| false);
        client.close();
        client.close();

        let deadline = Instant::now() + Duration::from_secs(1);
        loop {
            let inbound = server.on_readable().unwrap();
            if inbound.eof {
                break;
            }
            assert!(Instant::now() < deadline, "eof not observed");
        }
        assert!(server.is_closed());
    }

    #[test]
    fn backpressure_reported_above_high_water_mark() {
        let (left, _right) = IpcStream::pair().unwrap();
        let config = ConnectionConfig {
            frame: FrameConfig {
                high_water_mark: 256,
                ..FrameConfig::default()
            },
            ..ConnectionConfig::default()
        };
        let mut conn = Connection::initiate(
            ConnectionId::new(1),
            left,
            &config,
            Hello::new(&HelloConfig::default(), "client"),
        )
        .unwrap();

        let frame = Frame::data("bulk", "bytes", vec![0u8; 200]);
        let err = conn.write(&frame).unwrap_err();
        assert!(matches!(err, PeerError::Backpressure { limit: 256, .. }));
        assert!(!conn.is_closed());
    }
}
