//! Client -> Server packet parsing.

use super::{ClientOpcode, MAX_NAME_BYTES, MAX_SKIN_BYTES};
use crate::{BinaryReader, BinaryWriter, Color, ProtocolError};

/// Parsed client packet.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientPacket {
    /// Join (0x00) with display name and cosmetics.
    Join {
        name: String,
        skin: Option<String>,
        color: Color,
    },
    /// Steering input (0x10).
    Input { seq: u32, heading: f32, boost: bool },
    /// Acknowledge the given tick (0x11).
    Ack { tick: u64 },
    /// Request a full snapshot (0x12).
    Resync,
    /// Leave the arena (0x13).
    Leave,
}

impl ClientPacket {
    /// Parse one client packet. The whole frame must be consumed.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }

        let mut reader = BinaryReader::new(data.to_vec());
        let opcode = reader.read_u8()?;

        let packet = match opcode {
            0x00 => {
                let name = reader.read_string(MAX_NAME_BYTES)?;
                let skin = reader.read_string(MAX_SKIN_BYTES)?;
                let color = Color::new(reader.read_u8()?, reader.read_u8()?, reader.read_u8()?);
                ClientPacket::Join {
                    name,
                    skin: (!skin.is_empty()).then_some(skin),
                    color,
                }
            }
            0x10 => ClientPacket::Input {
                seq: reader.read_u32()?,
                heading: reader.read_f32()?,
                boost: reader.read_u8()? != 0,
            },
            0x11 => ClientPacket::Ack {
                tick: reader.read_u64()?,
            },
            0x12 => ClientPacket::Resync,
            0x13 => ClientPacket::Leave,
            _ => return Err(ProtocolError::InvalidOpcode(opcode)),
        };

        reader.finish()?;
        Ok(packet)
    }

    /// Encode the packet as a client would send it.
    pub fn encode(&self) -> BinaryWriter {
        let mut w = BinaryWriter::with_capacity(16);
        match self {
            ClientPacket::Join { name, skin, color } => {
                w.put_u8(ClientOpcode::Join as u8);
                w.put_string(name);
                w.put_string(skin.as_deref().unwrap_or(""));
                w.put_u8(color.r);
                w.put_u8(color.g);
                w.put_u8(color.b);
            }
            ClientPacket::Input {
                seq,
                heading,
                boost,
            } => {
                w.put_u8(ClientOpcode::Input as u8);
                w.put_u32(*seq);
                w.put_f32(*heading);
                w.put_u8(u8::from(*boost));
            }
            ClientPacket::Ack { tick } => {
                w.put_u8(ClientOpcode::Ack as u8);
                w.put_u64(*tick);
            }
            ClientPacket::Resync => w.put_u8(ClientOpcode::Resync as u8),
            ClientPacket::Leave => w.put_u8(ClientOpcode::Leave as u8),
        }
        w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_without_skin() {
        let packet = ClientPacket::Join {
            name: "viper".into(),
            skin: None,
            color: Color::new(10, 200, 30),
        };
        let bytes = packet.encode().finish();
        assert_eq!(ClientPacket::parse(&bytes).unwrap(), packet);
    }

    #[test]
    fn input_layout() {
        let bytes = ClientPacket::Input {
            seq: 7,
            heading: 1.5,
            boost: true,
        }
        .encode()
        .finish();
        assert_eq!(bytes.len(), 10);
        assert_eq!(bytes[0], 0x10);
        assert_eq!(&bytes[1..5], &7u32.to_le_bytes());
    }

    #[test]
    fn rejects_bad_frames() {
        assert_eq!(ClientPacket::parse(&[]), Err(ProtocolError::EmptyFrame));
        assert_eq!(
            ClientPacket::parse(&[0x99]),
            Err(ProtocolError::InvalidOpcode(0x99))
        );
        // Ack with a truncated tick.
        assert_eq!(
            ClientPacket::parse(&[0x11, 1, 2]),
            Err(ProtocolError::UnexpectedEof)
        );
        // Leave with junk after it.
        assert_eq!(
            ClientPacket::parse(&[0x13, 0]),
            Err(ProtocolError::TrailingBytes(1))
        );
    }
}
