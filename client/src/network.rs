//! Connection setup and the client play loop

use crate::config::{ClientConfig, PlayMode};
use crate::error::ClientError;
use crate::game::ClientGame;
use crate::input::parse_put_request;
use log::{debug, info, warn};
use shared::{ClientMessage, LineFramer, ScoreEntry, ServerMessage, CLIENT_LINE_CAPACITY};
use std::io;
use std::net::SocketAddr;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, Lines,
};
use tokio::net::{lookup_host, TcpStream};

const READ_CHUNK: usize = 4096;

/// Resolves the server and connects to the first reachable address of the
/// requested family.
pub async fn connect(config: &ClientConfig) -> Result<(TcpStream, SocketAddr), ClientError> {
    let host = config.server.as_str();
    let port = config.port;
    let addrs = lookup_host((host, port))
        .await
        .map_err(|source| ClientError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?;

    let mut last_error = None;
    for addr in addrs.filter(|addr| config.family.accepts(addr)) {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                info!("Connected to {}", addr);
                return Ok((stream, addr));
            }
            Err(source) => {
                warn!("Cannot connect to {}: {}", addr, source);
                last_error = Some(ClientError::Connect { addr, source });
            }
        }
    }
    Err(last_error.unwrap_or_else(|| ClientError::NoAddress {
        host: host.to_string(),
        port,
    }))
}

/// One player session over any byte stream
pub struct Client<S> {
    stream: S,
    peer: SocketAddr,
    player_id: String,
    game: ClientGame,
    framer: LineFramer,
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, peer: SocketAddr, player_id: impl Into<String>, mode: PlayMode) -> Self {
        Self {
            stream,
            peer,
            player_id: player_id.into(),
            game: ClientGame::new(mode),
            framer: LineFramer::with_capacity(CLIENT_LINE_CAPACITY),
        }
    }

    /// Plays until `SCORING` arrives and returns the scores.
    ///
    /// `operator` supplies put requests in interactive mode. Its end of input
    /// only stops reading from it; the session continues.
    pub async fn play<I>(mut self, operator: Option<I>) -> Result<Vec<ScoreEntry>, ClientError>
    where
        I: AsyncBufRead + Unpin,
    {
        let hello = ClientMessage::Hello {
            player_id: self.player_id.clone(),
        };
        self.send(&hello).await?;

        let mut operator = operator.map(AsyncBufReadExt::lines);
        let mut chunk = vec![0u8; READ_CHUNK];

        loop {
            while let Some(line) = self.next_line()? {
                if let Some(scores) = self.handle_line(line).await? {
                    return Ok(scores);
                }
            }

            tokio::select! {
                biased;

                read = self.stream.read(&mut chunk) => {
                    let n = read?;
                    if n == 0 {
                        return Err(ClientError::UnexpectedDisconnect { peer: self.peer });
                    }
                    self.framer
                        .feed(&chunk[..n])
                        .map_err(|source| ClientError::Framer { peer: self.peer, source })?;
                }

                line = next_operator_line(&mut operator) => match line {
                    Ok(Some(line)) => self.handle_operator(&line).await?,
                    Ok(None) => {
                        info!("Operator input closed, waiting for the round to end");
                        operator = None;
                    }
                    Err(e) => {
                        warn!("Cannot read operator input: {}", e);
                        operator = None;
                    }
                },
            }
        }
    }

    fn next_line(&mut self) -> Result<Option<String>, ClientError> {
        self.framer
            .try_take_line()
            .map_err(|source| ClientError::Framer {
                peer: self.peer,
                source,
            })
    }

    async fn handle_line(&mut self, line: String) -> Result<Option<Vec<ScoreEntry>>, ClientError> {
        let message = match self.game.parse(&line) {
            Ok(message) => message,
            Err(source) => {
                return Err(ClientError::Protocol {
                    peer: self.peer,
                    line,
                    source,
                })
            }
        };
        println!("{}", line);

        if let ServerMessage::Scoring(entries) = message {
            return Ok(Some(entries));
        }
        for put in self.game.apply(&message) {
            self.send(&put).await?;
        }
        Ok(None)
    }

    async fn handle_operator(&mut self, line: &str) -> Result<(), ClientError> {
        let (point, value) = match parse_put_request(line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Ignoring `{}`: {}", line.trim(), e);
                return Ok(());
            }
        };
        match self.game.submit_put(point.clone(), value) {
            Some(put) => self.send(&put).await,
            None => {
                info!("PUT {} {} will be sent once COEFF arrives", point, value);
                Ok(())
            }
        }
    }

    async fn send(&mut self, message: &ClientMessage) -> Result<(), ClientError> {
        debug!("-> {}", message);
        self.stream.write_all(message.to_wire().as_bytes()).await?;
        Ok(())
    }
}

/// Next operator line, or never if there is no operator input left.
async fn next_operator_line<I>(operator: &mut Option<Lines<I>>) -> io::Result<Option<String>>
where
    I: AsyncBufRead + Unpin,
{
    match operator {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}
