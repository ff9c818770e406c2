//! WebSocket front end: accepts connections and routes them to rooms.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{RwLock, watch};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::entity::PlayerId;
use crate::registry::Registry;
use crate::results::LogSink;
use crate::room::{Room, RoomHandle, run_room};

mod connection;

pub use connection::handle_connection;

/// Open connections, shared by the accept loop and connection tasks.
#[derive(Debug, Default)]
struct ConnectionState {
    per_ip: HashMap<IpAddr, usize>,
    total: usize,
}

impl ConnectionState {
    /// Count a new connection if both limits allow it.
    fn try_add_connection(&mut self, ip: IpAddr, max_total: usize, max_per_ip: usize) -> bool {
        if self.total >= max_total {
            return false;
        }
        let current = self.per_ip.get(&ip).copied().unwrap_or(0);
        if current >= max_per_ip {
            return false;
        }
        *self.per_ip.entry(ip).or_insert(0) += 1;
        self.total += 1;
        true
    }

    fn remove_connection(&mut self, ip: IpAddr) {
        if let Some(count) = self.per_ip.get_mut(&ip) {
            *count = count.saturating_sub(1);
            self.total = self.total.saturating_sub(1);
            if *count == 0 {
                self.per_ip.remove(&ip);
            }
        }
    }
}

/// Hands out player ids. Wraps and never yields 0.
#[derive(Debug)]
struct IdAllocator {
    next: PlayerId,
}

impl IdAllocator {
    fn new() -> Self {
        Self { next: 1 }
    }

    fn allocate(&mut self) -> PlayerId {
        let id = self.next;
        self.next = self.next.wrapping_add(1).max(1);
        id
    }
}

/// Run the arena server until Ctrl-C.
///
/// On Ctrl-C the listener closes and every room drains: running sessions
/// end normally or at the drain timeout, then the room tasks are joined.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let registry = Registry::from_config(&config)?;
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let listener = TcpListener::bind(&addr).await?;
    info!("{} listening on ws://{}", config.server.name, addr);
    info!(
        "{} room(s) at {} Hz, map {}x{}, up to {} players each",
        config.server.rooms,
        config.arena.tick_rate_hz,
        config.arena.map_size,
        config.arena.map_size,
        config.arena.max_players
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut rooms: Vec<RoomHandle> = Vec::with_capacity(config.server.rooms);
    let mut tasks = Vec::with_capacity(config.server.rooms);
    for id in 0..config.server.rooms {
        let (room, handle) = Room::new(id, registry.clone(), Box::new(LogSink));
        tasks.push(tokio::spawn(run_room(room, shutdown_rx.clone())));
        rooms.push(handle);
    }

    let conn_state = Arc::new(RwLock::new(ConnectionState::default()));
    let max_connections = config.server.max_connections;
    let ip_limit = config.server.ip_limit;
    let outbound_queue = config.server.outbound_queue;
    let decode_strike_limit = config.server.decode_strike_limit;
    let mut ids = IdAllocator::new();
    let mut next_room = 0usize;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        continue;
                    }
                };
                let ip = addr.ip();
                if !conn_state.write().await.try_add_connection(ip, max_connections, ip_limit) {
                    warn!("Connection rejected (limit reached): {}", addr);
                    continue;
                }

                let room = rooms[next_room % rooms.len()].clone();
                next_room = next_room.wrapping_add(1);
                let player = ids.allocate();
                let conn_state = Arc::clone(&conn_state);

                tokio::spawn(async move {
                    let result =
                        handle_connection(stream, addr, player, room, outbound_queue, decode_strike_limit).await;
                    conn_state.write().await.remove_connection(ip);
                    if let Err(e) = result {
                        error!("Connection error from {}: {}", addr, e);
                    }
                });
            }
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    error!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Shutting down, draining {} room(s)", rooms.len());
                break;
            }
        }
    }

    drop(listener);
    let _ = shutdown_tx.send(true);
    for task in tasks {
        if let Err(e) = task.await {
            error!("Room task failed: {}", e);
        }
    }
    info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn connection_limits() {
        let mut state = ConnectionState::default();
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        assert!(state.try_add_connection(a, 3, 2));
        assert!(state.try_add_connection(a, 3, 2));
        assert!(!state.try_add_connection(a, 3, 2));
        assert!(state.try_add_connection(b, 3, 2));
        assert!(!state.try_add_connection(b, 3, 2));

        state.remove_connection(a);
        assert!(state.try_add_connection(b, 3, 2));
        state.remove_connection(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(state.total, 3);
    }

    #[test]
    fn ids_skip_zero_on_wrap() {
        let mut ids = IdAllocator { next: u32::MAX };
        assert_eq!(ids.allocate(), u32::MAX);
        assert_eq!(ids.allocate(), 1);
    }
}
