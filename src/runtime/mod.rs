//! The tokio side: listener, connection tasks and the event loop.
//!
//! Reader tasks frame lines and send them over one mpsc channel to the
//! event loop, which owns the [`Network`] and runs every command to
//! completion. After each event the loop moves queued output into the
//! writer tasks. A writer whose channel is full leaves its connection's
//! sendq blocked until the writer drains or the periodic poll comes round.

mod io;

pub use io::MAX_LINE;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::commands::Registry;
use crate::config::Config;
use crate::state::{ConnId, Network};

const EVENT_QUEUE: usize = 4096;
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Input to the event loop.
#[derive(Debug)]
pub(crate) enum Event {
    /// A new socket, accepted or dialed. Dialed sockets name their link block.
    Connected {
        stream: TcpStream,
        addr: SocketAddr,
        link: Option<String>,
    },
    Line {
        conn: ConnId,
        line: String,
    },
    Closed {
        conn: ConnId,
        reason: String,
    },
    /// The writer drained its queue.
    Writable(ConnId),
}

struct ConnIo {
    writer: mpsc::Sender<Bytes>,
    reader: AbortHandle,
}

/// A bound daemon, ready to run.
pub struct Server {
    listener: TcpListener,
    net: Network,
    registry: Registry,
    io: HashMap<ConnId, ConnIo>,
}

impl Server {
    pub async fn bind(config: Arc<Config>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.listen.address).await?;
        info!(address = %listener.local_addr()?, "listening");
        Ok(Self {
            listener,
            net: Network::new(config),
            registry: Registry::new(),
            io: HashMap::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run until the listener fails.
    pub async fn run(mut self) -> std::io::Result<()> {
        let (events_tx, mut events) = mpsc::channel(EVENT_QUEUE);
        let listener = self.listener;
        let accept_tx = events_tx.clone();
        let acceptor = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let event = Event::Connected {
                            stream,
                            addr,
                            link: None,
                        };
                        if accept_tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        return Err(e);
                    }
                }
            }
        });

        for block in self.net.config.links.iter().filter(|l| l.autoconnect) {
            let (name, target) = (block.name.clone(), (block.hostname.clone(), block.port));
            let tx = events_tx.clone();
            tokio::spawn(async move {
                match TcpStream::connect(&target).await {
                    Ok(stream) => {
                        let addr = stream.peer_addr().unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)));
                        let _ = tx.send(Event::Connected { stream, addr, link: Some(name) }).await;
                    }
                    Err(e) => warn!(server = %name, error = %e, "autoconnect failed"),
                }
            });
        }

        let mut poll = tokio::time::interval(POLL_INTERVAL);
        let mut shell = Shell {
            net: self.net,
            registry: self.registry,
            io: self.io,
            events: events_tx,
        };
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => shell.handle(event),
                    None => break,
                },
                _ = poll.tick() => shell.unblock_all(),
            }
            shell.flush();
            if acceptor.is_finished() {
                break;
            }
        }
        match acceptor.await {
            Ok(result) => result,
            Err(e) => Err(std::io::Error::other(e)),
        }
    }
}

/// Event loop state once the listener has moved to its own task.
struct Shell {
    net: Network,
    registry: Registry,
    io: HashMap<ConnId, ConnIo>,
    events: mpsc::Sender<Event>,
}

impl Shell {
    fn handle(&mut self, event: Event) {
        match event {
            Event::Connected { stream, addr, link } => self.connected(stream, addr, link),
            Event::Line { conn, line } => self.registry.process(&mut self.net, conn, &line),
            Event::Closed { conn, reason } => {
                debug!(%conn, %reason, "connection closed");
                self.net.connection_lost(conn, &reason);
            }
            Event::Writable(conn) => {
                if let Some(c) = self.net.conns.get_mut(&conn)
                    && c.sendq.is_blocked()
                {
                    c.sendq.set_blocked(false);
                    self.net.mark_dirty(conn);
                }
            }
        }
    }

    fn connected(&mut self, stream: TcpStream, addr: SocketAddr, link: Option<String>) {
        let _ = stream.set_nodelay(true);
        let ip = addr.ip().to_string();
        let conn = self.net.add_conn(&ip, &ip);
        let (read, write) = stream.into_split();
        let (writer, chunks) = mpsc::channel(self.net.config.limits.writer_capacity.max(1));
        let reader = tokio::spawn(io::read_lines(conn, read, self.events.clone())).abort_handle();
        tokio::spawn(io::write_chunks(conn, write, chunks, self.events.clone()));
        self.io.insert(conn, ConnIo { writer, reader });

        match link {
            Some(name) => {
                info!(server = %name, %addr, "connected to peer");
                if !self.net.begin_outbound(conn, &name) {
                    self.net.connection_lost(conn, "No link block");
                }
            }
            None => debug!(%conn, %addr, "accepted connection"),
        }
    }

    /// Retry every blocked queue.
    fn unblock_all(&mut self) {
        let blocked: Vec<ConnId> = self
            .net
            .conns
            .values()
            .filter(|c| c.sendq.is_blocked())
            .map(|c| c.id)
            .collect();
        for conn in blocked {
            if let Some(c) = self.net.conns.get_mut(&conn) {
                c.sendq.set_blocked(false);
            }
            self.net.mark_dirty(conn);
        }
    }

    /// Hand queued output to writers and close what the network dropped.
    fn flush(&mut self) {
        loop {
            for (conn, last) in self.net.take_closed() {
                let Some(io) = self.io.remove(&conn) else {
                    continue;
                };
                io.reader.abort();
                if let Some(chunk) = last {
                    let _ = io.writer.try_send(chunk);
                }
            }

            let mut lost = Vec::new();
            for conn in self.net.take_dirty() {
                let (Some(io), Some(c)) = (self.io.get(&conn), self.net.conns.get_mut(&conn)) else {
                    continue;
                };
                if c.sendq.is_blocked() {
                    continue;
                }
                let Some(chunk) = c.sendq.take() else {
                    continue;
                };
                match io.writer.try_send(chunk) {
                    Ok(()) => {}
                    Err(TrySendError::Full(chunk)) => {
                        c.sendq.requeue_front(chunk);
                        c.sendq.set_blocked(true);
                    }
                    Err(TrySendError::Closed(_)) => lost.push(conn),
                }
            }
            if lost.is_empty() {
                break;
            }
            for conn in lost {
                self.net.connection_lost(conn, "Write error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    async fn spawn_server() -> SocketAddr {
        let mut config = Config::new("hub.mesh", "0HB");
        config.listen.address = SocketAddr::from(([127, 0, 0, 1], 0));
        let server = Server::bind(Arc::new(config)).await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    #[tokio::test]
    async fn registers_over_tcp() {
        let addr = spawn_server().await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        write.write_all(b"NICK alice\r\nUSER alice 0 * :Alice\r\n").await.unwrap();

        let mut lines = BufReader::new(read).lines();
        let first = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(first.starts_with(":hub.mesh 001 alice "), "{first}");
    }
}
