//! One WebSocket client.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use protocol::packets::{self, ClientPacket};
use protocol::{BinaryWriter, DisconnectReason};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::command::{Command, CommandKind, PlayerInput};
use crate::entity::{Cosmetic, PlayerId};
use crate::room::RoomHandle;
use crate::sync::Outbound;

/// Encode a room message for the wire.
fn encode(msg: &Outbound) -> BinaryWriter {
    match msg {
        Outbound::Joined {
            player,
            tick,
            map_size,
            tick_rate_hz,
        } => packets::build_joined(*player, *tick, *map_size, *tick_rate_hz),
        Outbound::Snapshot(snapshot) => packets::build_snapshot(snapshot),
        Outbound::Delta(delta) => packets::build_delta(delta),
        Outbound::PlayerDied {
            player,
            final_score,
            cause,
        } => packets::build_player_died(*player, *final_score, *cause),
        Outbound::JoinRejected(reason) => packets::build_join_rejected(*reason),
        Outbound::Disconnected(reason) => packets::build_disconnected(*reason),
    }
}

/// Receiving end of a client's outbound queue.
///
/// The connection holds only a weak sender; the room's link owns the strong
/// one. When the room drops the link the queue closes, even if the notice
/// explaining why did not fit.
struct OutboundQueue {
    capacity: usize,
    rx: Option<mpsc::Receiver<Outbound>>,
    sender: Option<mpsc::WeakSender<Outbound>>,
    /// The room admitted this client on the current queue.
    joined: bool,
    /// The client asked to leave, so a closed queue is expected.
    leaving: bool,
}

impl OutboundQueue {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            rx: None,
            sender: None,
            joined: false,
            leaving: false,
        }
    }

    /// Sender to hand the room with a join. Reuses the queue the room still
    /// holds, or opens a fresh one. None if the room already dropped this
    /// client and the connection has not noticed yet.
    fn sender(&mut self) -> Option<mpsc::Sender<Outbound>> {
        if let Some(tx) = self.sender.as_ref().and_then(mpsc::WeakSender::upgrade) {
            self.leaving = false;
            return Some(tx);
        }

        let mut carried = Vec::new();
        if let Some(mut old) = self.rx.take() {
            while let Ok(msg) = old.try_recv() {
                self.joined |= matches!(msg, Outbound::Joined { .. });
                carried.push(msg);
            }
        }
        if self.joined && !self.leaving {
            return None;
        }

        let (tx, rx) = mpsc::channel(self.capacity);
        // Undelivered messages from the closed queue, such as a rejection.
        for msg in carried {
            if tx.try_send(msg).is_err() {
                break;
            }
        }
        self.rx = Some(rx);
        self.sender = Some(tx.downgrade());
        self.joined = false;
        self.leaving = false;
        Some(tx)
    }

    /// Next message for the client. Pending while no queue is open.
    async fn recv(&mut self) -> Option<Outbound> {
        let msg = match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        };
        self.joined |= matches!(msg, Some(Outbound::Joined { .. }));
        msg
    }

    /// Forget a queue the room closed. True if the room had admitted the
    /// client and dropped it without a leave.
    fn closed(&mut self) -> bool {
        let dropped = self.joined && !self.leaving;
        self.rx = None;
        self.sender = None;
        self.joined = false;
        self.leaving = false;
        dropped
    }
}

/// Map a decoded packet onto a room command.
fn command_for(
    player: PlayerId,
    packet: ClientPacket,
    outbound: &mut OutboundQueue,
) -> Option<Command> {
    let kind = match packet {
        ClientPacket::Join { name, skin, color } => CommandKind::Join {
            name,
            cosmetic: Cosmetic { skin, color },
            outbound: outbound.sender()?,
        },
        ClientPacket::Input { seq, heading, boost } => {
            CommandKind::Input(PlayerInput { seq, heading, boost })
        }
        ClientPacket::Ack { tick } => CommandKind::Ack { tick },
        ClientPacket::Resync => CommandKind::Resync,
        ClientPacket::Leave => {
            outbound.leaving = true;
            CommandKind::Leave
        }
    };
    Some(Command::new(player, kind))
}

/// Serve one client until it closes, the room disconnects it, or it sends
/// more than `strike_limit` undecodable frames in a row.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    player: PlayerId,
    room: RoomHandle,
    outbound_capacity: usize,
    strike_limit: u32,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    info!("New connection from {} as player {} in room {}", addr, player, room.id);

    let (mut write, mut read) = ws_stream.split();
    let mut outbound = OutboundQueue::new(outbound_capacity);
    let mut strikes = 0u32;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Binary(data))) => {
                        match ClientPacket::parse(&data) {
                            Ok(packet) => {
                                strikes = 0;
                                let Some(command) = command_for(player, packet, &mut outbound) else {
                                    info!("Player {} was dropped by room {}, closing {}", player, room.id, addr);
                                    let _ = write.close().await;
                                    break;
                                };
                                if !room.send(command) {
                                    info!("Room {} is gone, closing {}", room.id, addr);
                                    break;
                                }
                            }
                            Err(e) => {
                                strikes += 1;
                                debug!("Bad frame from {}: {} (strike {})", addr, e, strikes);
                                if strikes > strike_limit {
                                    warn!("Closing {} after {} bad frames", addr, strikes);
                                    let packet = packets::build_disconnected(DisconnectReason::ProtocolViolations);
                                    let _ = write.send(Message::Binary(packet.finish().to_vec().into())).await;
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} disconnected", addr);
                        break;
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", addr, e);
                        break;
                    }
                    None => break,
                    _ => {}
                }
            }
            msg = outbound.recv() => {
                let Some(msg) = msg else {
                    if outbound.closed() {
                        info!("Player {} was dropped by room {}, closing {}", player, room.id, addr);
                        let _ = write.close().await;
                        break;
                    }
                    continue;
                };
                let packet = encode(&msg);
                if let Err(e) = write.send(Message::Binary(packet.finish().to_vec().into())).await {
                    warn!("Failed to send to {}: {}", addr, e);
                    break;
                }
                if let Outbound::Disconnected(reason) = msg {
                    info!("Player {} disconnected by room {}: {:?}", player, room.id, reason);
                    let _ = write.close().await;
                    break;
                }
            }
        }
    }

    room.send(Command::new(player, CommandKind::Leave));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{Color, RejectReason};

    fn join_packet() -> ClientPacket {
        ClientPacket::Join {
            name: "ann".into(),
            skin: Some("stripes".into()),
            color: Color::new(1, 2, 3),
        }
    }

    fn joined() -> Outbound {
        Outbound::Joined {
            player: 4,
            tick: 1,
            map_size: 1000.0,
            tick_rate_hz: 25,
        }
    }

    #[tokio::test]
    async fn join_carries_outbound_queue() {
        let mut queue = OutboundQueue::new(2);
        let command = command_for(4, join_packet(), &mut queue).unwrap();
        assert_eq!(command.player, 4);
        let CommandKind::Join { name, cosmetic, outbound } = command.kind else {
            panic!("expected join");
        };
        assert_eq!(name, "ann");
        assert_eq!(cosmetic.skin.as_deref(), Some("stripes"));
        assert_eq!(cosmetic.color, Color::new(1, 2, 3));
        outbound
            .try_send(Outbound::Disconnected(DisconnectReason::Idle))
            .unwrap();
        assert!(matches!(queue.recv().await, Some(Outbound::Disconnected(DisconnectReason::Idle))));
    }

    #[tokio::test]
    async fn dropped_link_closes_the_queue() {
        let mut queue = OutboundQueue::new(2);
        let tx = queue.sender().unwrap();
        tx.try_send(joined()).unwrap();
        tx.try_send(Outbound::Delta(Default::default())).unwrap();
        // Full queue: the room cannot say why it is letting go.
        assert!(tx.try_send(Outbound::Disconnected(DisconnectReason::SlowConsumer)).is_err());
        drop(tx);

        assert!(matches!(queue.recv().await, Some(Outbound::Joined { .. })));
        assert!(matches!(queue.recv().await, Some(Outbound::Delta(_))));
        assert!(queue.recv().await.is_none());
        assert!(queue.closed());
    }

    #[test]
    fn join_after_unnoticed_drop_is_refused() {
        let mut queue = OutboundQueue::new(2);
        let tx = queue.sender().unwrap();
        tx.try_send(joined()).unwrap();
        drop(tx);
        assert!(command_for(4, join_packet(), &mut queue).is_none());
    }

    #[tokio::test]
    async fn rejected_join_can_retry() {
        let mut queue = OutboundQueue::new(2);
        let tx = queue.sender().unwrap();
        tx.try_send(Outbound::JoinRejected(RejectReason::Capacity)).unwrap();
        drop(tx);

        // A retry before the rejection is read still delivers it first.
        let retry = queue.sender().unwrap();
        retry.try_send(joined()).unwrap();
        assert!(matches!(queue.recv().await, Some(Outbound::JoinRejected(RejectReason::Capacity))));
        assert!(matches!(queue.recv().await, Some(Outbound::Joined { .. })));
    }

    #[tokio::test]
    async fn repeated_join_reuses_the_live_queue() {
        let mut queue = OutboundQueue::new(4);
        let first = queue.sender().unwrap();
        let second = queue.sender().unwrap();
        second.try_send(joined()).unwrap();
        assert!(first.same_channel(&second));
        assert!(matches!(queue.recv().await, Some(Outbound::Joined { .. })));
    }

    #[tokio::test]
    async fn leaving_is_not_a_drop() {
        let mut queue = OutboundQueue::new(2);
        let tx = queue.sender().unwrap();
        tx.try_send(joined()).unwrap();
        assert!(command_for(4, ClientPacket::Leave, &mut queue).is_some());
        drop(tx);

        assert!(queue.recv().await.is_some());
        assert!(queue.recv().await.is_none());
        assert!(!queue.closed());
        assert!(queue.sender().is_some());
    }

    #[test]
    fn outbound_messages_encode_with_their_opcode() {
        let bytes = encode(&Outbound::Disconnected(DisconnectReason::Shutdown)).finish();
        assert_eq!(bytes[0], packets::ServerOpcode::Disconnected as u8);
        let bytes = encode(&Outbound::Joined {
            player: 9,
            tick: 3,
            map_size: 1000.0,
            tick_rate_hz: 25,
        })
        .finish();
        assert_eq!(bytes[0], packets::ServerOpcode::Joined as u8);
    }
}
