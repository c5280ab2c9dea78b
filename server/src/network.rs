//! Server network layer: one task multiplexing the listener, every player
//! connection and every per-session timer

use crate::coefficients::{BoxedFeed, CoefficientFile};
use crate::config::GameConfig;
use crate::error::{ConnectionError, ServerError, SessionError};
use crate::round::{final_scores, Round};
use crate::session::{Response, Session, HELLO_TIMEOUT};
use log::{debug, error, info, warn};
use shared::{ClientMessage, FillStatus, LineFramer, SERVER_LINE_CAPACITY};
use std::collections::BTreeMap;
use std::future::{poll_fn, Future};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::pin::pin;
use std::task::Poll;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

/// Unsent output a single connection may accumulate before it is dropped
pub const OUTBOUND_LIMIT: usize = 1 << 20;
/// How long a finished connection may take to drain its final output
pub const LINGER: Duration = Duration::from_secs(5);
/// Pause in accepting after the listener reported an error
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);
/// Connections taken from the backlog per wait
const ACCEPT_BATCH: usize = 64;

type ConnectionId = u64;

/// A player socket with its input framer and output queue
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    framer: LineFramer,
    outbound: Vec<u8>,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer: display_addr(peer),
            framer: LineFramer::with_capacity(SERVER_LINE_CAPACITY),
            outbound: Vec::new(),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn has_pending_output(&self) -> bool {
        !self.outbound.is_empty()
    }

    /// Appends `line` and its terminator to the output queue without writing.
    pub fn queue(&mut self, line: &str) -> Result<(), ConnectionError> {
        if self.outbound.len() + line.len() + 2 > OUTBOUND_LIMIT {
            return Err(ConnectionError::OutboundFull {
                limit: OUTBOUND_LIMIT,
            });
        }
        self.outbound.extend_from_slice(line.as_bytes());
        self.outbound.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// Writes as much queued output as the socket takes right now.
    ///
    /// Returns `true` once the queue is empty.
    pub fn flush(&mut self) -> Result<bool, ConnectionError> {
        while !self.outbound.is_empty() {
            match self.stream.try_write(&self.outbound) {
                Ok(0) => {
                    return Err(ConnectionError::Write(io::ErrorKind::WriteZero.into()));
                }
                Ok(n) => {
                    self.outbound.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ConnectionError::Write(e)),
            }
        }
        Ok(true)
    }

    pub fn send(&mut self, line: &str) -> Result<(), ConnectionError> {
        debug!("{} <- {}", self.peer, line);
        self.queue(line)?;
        self.flush().map(|_| ())
    }

    fn fill(&mut self) -> Result<FillStatus, ConnectionError> {
        let stream = &self.stream;
        Ok(self.framer.fill_with(|buf| stream.try_read(buf))?)
    }

    fn take_line(&mut self) -> Result<Option<String>, ConnectionError> {
        Ok(self.framer.try_take_line()?)
    }
}

#[derive(Debug)]
struct Peer {
    connection: Connection,
    session: Session,
}

/// A connection that already got `SCORING` and only drains its output
#[derive(Debug)]
struct Lingering {
    connection: Connection,
    deadline: Instant,
    shut_down: bool,
}

impl Lingering {
    /// Flushes, half-closes and then discards input until the peer hangs up.
    ///
    /// Returns `false` once the connection can be dropped.
    async fn advance(&mut self, now: Instant) -> bool {
        let peer = self.connection.peer;
        if now >= self.deadline {
            debug!("{} did not close within {:?}", peer, LINGER);
            return false;
        }
        match self.connection.flush() {
            Ok(true) => {}
            Ok(false) => return true,
            Err(e) => {
                debug!("{}: {}", peer, e);
                return false;
            }
        }
        if !self.shut_down {
            if let Err(e) = self.connection.stream.shutdown().await {
                debug!("{}: shutdown failed: {}", peer, e);
                return false;
            }
            self.shut_down = true;
        }

        // One read per visit; anything left is reported by the next wait.
        let mut scratch = [0u8; 1024];
        match self.connection.stream.try_read(&mut scratch) {
            Ok(0) => false,
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => true,
            Err(_) => false,
        }
    }
}

/// Everything that became ready during one wait
#[derive(Default)]
struct Readiness {
    accepted: Vec<(TcpStream, SocketAddr)>,
    accept_errors: Vec<io::Error>,
    readable: Vec<ConnectionId>,
    writable: Vec<ConnectionId>,
    lingering: bool,
    timer: bool,
}

impl Readiness {
    fn is_empty(&self) -> bool {
        self.accepted.is_empty()
            && self.accept_errors.is_empty()
            && self.readable.is_empty()
            && self.writable.is_empty()
            && !self.lingering
            && !self.timer
    }
}

/// Game server owning the listener, all sessions and the round
pub struct Server {
    listener: TcpListener,
    config: GameConfig,
    feed: BoxedFeed,
    round: Round,
    peers: BTreeMap<ConnectionId, Peer>,
    lingering: Vec<Lingering>,
    next_id: ConnectionId,
    /// Accepting is paused until this instant after a listener error
    accept_resume: Option<Instant>,
}

impl Server {
    /// Opens the coefficient file and starts listening on the configured port.
    pub async fn bind(config: GameConfig) -> Result<Self, ServerError> {
        let feed = CoefficientFile::open(&config.coefficient_file, config.degree)?;
        let listener = bind_dual_stack(config.port).await?;
        Ok(Self::with_feed(listener, config, Box::new(feed)))
    }

    pub fn with_feed(listener: TcpListener, config: GameConfig, feed: BoxedFeed) -> Self {
        Self {
            listener,
            round: Round::new(config.max_puts),
            config,
            feed,
            peers: BTreeMap::new(),
            lingering: Vec::new(),
            next_id: 1,
            accept_resume: None,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn round(&self) -> &Round {
        &self.round
    }

    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    /// Main server loop. Only returns on a condition that stops the whole server.
    pub async fn run(&mut self) -> Result<(), ServerError> {
        info!(
            "Server listening on {} (K={}, N={}, M={})",
            self.local_addr()?,
            self.config.max_point,
            self.config.degree,
            self.config.max_puts
        );

        loop {
            let deadline = self.next_deadline();
            let ready = self.wait(deadline).await;
            let now = Instant::now();

            self.note_accept_errors(&ready.accept_errors, now);
            self.fire_timers(now);
            for id in &ready.writable {
                self.flush_peer(*id);
            }
            self.service_lingering(now).await;

            for id in &ready.readable {
                self.service(*id, now)?;
            }
            if self.round.is_complete() {
                self.finish_round();
            }

            self.admit(ready.accepted, now);
            self.compact();
        }
    }

    /// The single suspension point of the loop.
    async fn wait(&self, deadline: Option<Instant>) -> Readiness {
        let mut sleep = pin!(deadline.map(|at| tokio::time::sleep_until(at.into())));
        let accepting = self.accept_resume.is_none();

        poll_fn(|cx| {
            let mut ready = Readiness::default();

            while accepting && ready.accepted.len() < ACCEPT_BATCH {
                match self.listener.poll_accept(cx) {
                    Poll::Ready(Ok(pair)) => ready.accepted.push(pair),
                    Poll::Ready(Err(e)) => {
                        ready.accept_errors.push(e);
                        break;
                    }
                    Poll::Pending => break,
                }
            }

            for (&id, peer) in &self.peers {
                let stream = &peer.connection.stream;
                if stream.poll_read_ready(cx).is_ready() {
                    ready.readable.push(id);
                }
                if peer.connection.has_pending_output() && stream.poll_write_ready(cx).is_ready()
                {
                    ready.writable.push(id);
                }
            }

            for lingering in &self.lingering {
                let stream = &lingering.connection.stream;
                let writable = lingering.connection.has_pending_output()
                    && stream.poll_write_ready(cx).is_ready();
                if stream.poll_read_ready(cx).is_ready() || writable {
                    ready.lingering = true;
                }
            }

            if let Some(sleep) = sleep.as_mut().as_pin_mut() {
                ready.timer = sleep.poll(cx).is_ready();
            }

            if ready.is_empty() {
                Poll::Pending
            } else {
                Poll::Ready(ready)
            }
        })
        .await
    }

    fn next_deadline(&self) -> Option<Instant> {
        let sessions = self
            .peers
            .values()
            .filter_map(|peer| peer.session.next_deadline());
        let lingering = self.lingering.iter().map(|lingering| lingering.deadline);
        sessions
            .chain(lingering)
            .chain(self.accept_resume)
            .min()
    }

    /// Logs listener errors and pauses accepting for [`ACCEPT_BACKOFF`], so
    /// a persistent error such as descriptor exhaustion cannot spin the loop.
    fn note_accept_errors(&mut self, errors: &[io::Error], now: Instant) {
        if errors.is_empty() {
            if self.accept_resume.is_some_and(|at| now >= at) {
                debug!("Accepting connections again");
                self.accept_resume = None;
            }
            return;
        }
        for e in errors {
            error!("Failed to accept connection: {}", e);
        }
        self.accept_resume = Some(now + ACCEPT_BACKOFF);
    }

    /// Drops sessions whose HELLO is overdue, then sends every reply that is due.
    fn fire_timers(&mut self, now: Instant) {
        let expired: Vec<ConnectionId> = self
            .peers
            .iter()
            .filter(|(_, peer)| peer.session.hello_expired(now))
            .map(|(&id, _)| id)
            .collect();
        for id in expired {
            self.terminate(id, ConnectionError::HelloTimeout(HELLO_TIMEOUT));
        }

        let mut due = Vec::new();
        for (&id, peer) in self.peers.iter_mut() {
            if let Some(message) = peer.session.fire_due(now) {
                due.push((id, message.to_string()));
            }
        }
        for (id, line) in due {
            self.deliver(id, &line);
        }
    }

    fn flush_peer(&mut self, id: ConnectionId) {
        let Some(peer) = self.peers.get_mut(&id) else {
            return;
        };
        if let Err(e) = peer.connection.flush() {
            self.terminate(id, e);
        }
    }

    async fn service_lingering(&mut self, now: Instant) {
        let mut kept = Vec::with_capacity(self.lingering.len());
        for mut lingering in std::mem::take(&mut self.lingering) {
            if lingering.advance(now).await {
                kept.push(lingering);
            } else {
                debug!("Closed {}", lingering.connection.peer);
            }
        }
        self.lingering = kept;
    }

    /// Handles the lines already buffered for one connection, then performs
    /// a single read and handles the lines it completed. Data still waiting
    /// in the socket keeps it readable for the next wait, so a busy peer
    /// cannot hold the loop away from timers and other connections.
    fn service(&mut self, id: ConnectionId, now: Instant) -> Result<(), ServerError> {
        if !self.drain_lines(id, now)? {
            return Ok(());
        }
        let Some(peer) = self.live_peer(id) else {
            return Ok(());
        };
        match peer.connection.fill() {
            Ok(FillStatus::Filled(_)) => {
                self.drain_lines(id, now)?;
            }
            Ok(FillStatus::WouldBlock) => {}
            Ok(FillStatus::Closed) => self.terminate(id, ConnectionError::Closed),
            Err(e) => self.terminate(id, e),
        }
        Ok(())
    }

    /// Dispatches every complete buffered line.
    ///
    /// Returns `false` once the session is gone or the round is complete.
    fn drain_lines(&mut self, id: ConnectionId, now: Instant) -> Result<bool, ServerError> {
        loop {
            if self.round.is_complete() {
                return Ok(false);
            }
            let Some(peer) = self.live_peer(id) else {
                return Ok(false);
            };
            match peer.connection.take_line() {
                Ok(Some(line)) => self.dispatch(id, line, now)?,
                Ok(None) => return Ok(true),
                Err(e) => {
                    self.terminate(id, e);
                    return Ok(false);
                }
            }
        }
    }

    fn live_peer(&mut self, id: ConnectionId) -> Option<&mut Peer> {
        self.peers
            .get_mut(&id)
            .filter(|peer| !peer.session.is_terminated())
    }

    fn dispatch(
        &mut self,
        id: ConnectionId,
        line: String,
        now: Instant,
    ) -> Result<(), ServerError> {
        let Some(peer) = self.peers.get_mut(&id) else {
            return Ok(());
        };
        debug!("{} -> {}", peer.connection.peer, line);

        let message = match ClientMessage::parse(&line) {
            Ok(message) => message,
            Err(source) => {
                self.terminate(id, ConnectionError::Protocol { line, source });
                return Ok(());
            }
        };

        match peer
            .session
            .handle(message, now, &self.config, self.feed.as_mut())
        {
            Ok(Response::Greeted(coeff)) => {
                info!(
                    "{} joined from {}",
                    peer.session.player_id().unwrap_or_default(),
                    peer.connection.peer
                );
                self.deliver(id, &coeff);
            }
            Ok(Response::Reply(reply)) => self.deliver(id, &reply.to_string()),
            Ok(Response::Deferred) => {}
            Ok(Response::Accepted) => self.round.record_accepted(),
            Err(SessionError::Coefficients(e)) => return Err(e.into()),
            Err(e) => self.terminate(id, ConnectionError::Session(e)),
        }
        Ok(())
    }

    fn deliver(&mut self, id: ConnectionId, line: &str) {
        let Some(peer) = self.peers.get_mut(&id) else {
            return;
        };
        if let Err(e) = peer.connection.send(line) {
            self.terminate(id, e);
        }
    }

    /// Marks a session as gone and gives its accepted puts back to the round.
    /// The connection itself is dropped by [`compact`](Self::compact).
    fn terminate(&mut self, id: ConnectionId, reason: ConnectionError) {
        let Some(peer) = self.peers.get_mut(&id) else {
            return;
        };
        if peer.session.is_terminated() {
            return;
        }
        let who = peer
            .session
            .player_id()
            .map(str::to_owned)
            .unwrap_or_else(|| peer.connection.peer.to_string());
        match reason {
            ConnectionError::Closed => info!("{} disconnected", who),
            reason => warn!("Dropping {} ({}): {}", who, peer.connection.peer, reason),
        }

        self.round.release(peer.session.accepted_puts());
        peer.session.terminate();
    }

    fn compact(&mut self) {
        self.peers.retain(|_, peer| !peer.session.is_terminated());
    }

    /// Scores every live player, sends `SCORING` to every live connection and
    /// starts the next round with an empty session table.
    fn finish_round(&mut self) {
        let scoring = final_scores(self.peers.values_mut().map(|peer| &mut peer.session));
        let line = scoring.to_string();
        info!("Round {} over: {}", self.round.number(), line);

        let deadline = Instant::now() + LINGER;
        for (_, mut peer) in std::mem::take(&mut self.peers) {
            if peer.session.is_terminated() {
                continue;
            }
            peer.session.terminate();
            match peer.connection.send(&line) {
                Ok(()) => self.lingering.push(Lingering {
                    connection: peer.connection,
                    deadline,
                    shut_down: false,
                }),
                Err(e) => warn!("Could not send scores to {}: {}", peer.connection.peer, e),
            }
        }
        self.round.reset();
    }

    fn admit(&mut self, accepted: Vec<(TcpStream, SocketAddr)>, now: Instant) {
        for (stream, addr) in accepted {
            if let Err(e) = stream.set_nodelay(true) {
                debug!("{}: cannot disable Nagle: {}", addr, e);
            }
            let connection = Connection::new(stream, addr);
            info!("New connection from {}", connection.peer);

            let id = self.next_id;
            self.next_id += 1;
            self.peers.insert(
                id,
                Peer {
                    connection,
                    session: Session::new(now),
                },
            );
        }
    }
}

/// Listens on `[::]` so IPv4 peers arrive as mapped addresses, falling back
/// to `0.0.0.0` on hosts without IPv6.
pub async fn bind_dual_stack(port: u16) -> Result<TcpListener, ServerError> {
    match TcpListener::bind((Ipv6Addr::UNSPECIFIED, port)).await {
        Ok(listener) => Ok(listener),
        Err(e) => {
            warn!("IPv6 listen failed ({}), falling back to IPv4", e);
            TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
                .await
                .map_err(|source| ServerError::Bind { port, source })
        }
    }
}

/// Shows IPv4-mapped IPv6 peers as plain IPv4.
pub fn display_addr(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(IpAddr::V4(v4), v6.port()),
            None => addr,
        },
        SocketAddr::V4(_) => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn socket_pair() -> (TcpStream, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server, addr) = listener.accept().await.unwrap();
        (server, client, addr)
    }

    fn test_server(listener: TcpListener) -> Server {
        let config = GameConfig {
            port: 0,
            max_point: 10,
            degree: 2,
            max_puts: 10,
            coefficient_file: "unused".into(),
        };
        let feed = CoefficientFile::from_reader(std::io::Cursor::new(String::new()), "empty", 2);
        Server::with_feed(listener, config, Box::new(feed))
    }

    #[tokio::test]
    async fn test_accept_error_pauses_accepting() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut server = test_server(listener);

        let now = Instant::now();
        let failure = io::Error::new(io::ErrorKind::Other, "too many open files");
        server.note_accept_errors(&[failure], now);
        assert_eq!(server.next_deadline(), Some(now + ACCEPT_BACKOFF));

        // A pending connection is not taken while paused.
        let _client = TcpStream::connect(addr).await.unwrap();
        let far = Instant::now() + Duration::from_secs(60);
        let paused = tokio::time::timeout(Duration::from_millis(50), server.wait(Some(far))).await;
        assert!(paused.is_err());

        server.note_accept_errors(&[], now + ACCEPT_BACKOFF);
        assert_eq!(server.next_deadline(), None);
        let ready = tokio::time::timeout(Duration::from_secs(5), server.wait(None))
            .await
            .unwrap();
        assert_eq!(ready.accepted.len(), 1);
    }

    #[test]
    fn test_display_addr_unmaps_ipv4() {
        let mapped: SocketAddr = "[::ffff:192.0.2.7]:4000".parse().unwrap();
        assert_eq!(display_addr(mapped), "192.0.2.7:4000".parse().unwrap());

        let v6: SocketAddr = "[2001:db8::1]:4000".parse().unwrap();
        assert_eq!(display_addr(v6), v6);

        let v4: SocketAddr = "127.0.0.1:1".parse().unwrap();
        assert_eq!(display_addr(v4), v4);
    }

    #[tokio::test]
    async fn test_send_appends_crlf() {
        let (server, mut client, addr) = socket_pair().await;
        let mut connection = Connection::new(server, addr);

        connection.send("COEFF 1 0 1").unwrap();
        assert!(!connection.has_pending_output());

        let mut buf = [0u8; 13];
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"COEFF 1 0 1\r\n");
    }

    #[tokio::test]
    async fn test_outbound_limit() {
        let (server, _client, addr) = socket_pair().await;
        let mut connection = Connection::new(server, addr);

        let line = "x".repeat(1000);
        let mut queued = 0;
        let err = loop {
            match connection.queue(&line) {
                Ok(()) => queued += line.len() + 2,
                Err(e) => break e,
            }
        };
        assert!(matches!(err, ConnectionError::OutboundFull { limit: OUTBOUND_LIMIT }));
        assert!(queued <= OUTBOUND_LIMIT);
        assert!(queued + line.len() + 2 > OUTBOUND_LIMIT);
    }

    #[tokio::test]
    async fn test_connection_reads_lines() {
        let (server, mut client, addr) = socket_pair().await;
        let mut connection = Connection::new(server, addr);

        client.write_all(b"HELLO p1\r\nPUT 1 2").await.unwrap();
        let line = loop {
            if let Some(line) = connection.take_line().unwrap() {
                break line;
            }
            connection.stream.readable().await.unwrap();
            connection.fill().unwrap();
        };
        assert_eq!(line, "HELLO p1");
        assert_eq!(connection.take_line().unwrap(), None);

        drop(client);
        loop {
            connection.stream.readable().await.unwrap();
            if connection.fill().unwrap() == FillStatus::Closed {
                break;
            }
        }
    }
}
