//! Deferred command recording.
//!
//! A [`CommandBucket`] captures draws as chains of typed packets in a flat
//! arena, each chain tagged with a sort key. Recording needs no GPU access,
//! so a bucket can be filled on one thread and sorted and submitted later on
//! the thread that owns the context. Auxiliary work such as instance uploads
//! rides in the same chain, ahead of the draw it feeds.

use super::batch::draw_surface;
use super::context::{BufferId, GpuContext};
use super::sort_key::SortKey;
use super::state::StateCache;
use super::store::Surface;
use crate::asset::{Assets, Handle, RenderSource, ShadingPass};
use crate::error::{Pool, ScheduleError, ScheduleResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PacketId(u32);

/// Slice of a bucket's byte arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u32,
    pub len: u32,
}

impl ByteRange {
    fn range(&self) -> std::ops::Range<usize> {
        self.start as usize..(self.start + self.len) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    UploadConstants {
        buffer: BufferId,
        bytes: ByteRange,
    },
    Draw {
        source: Handle<RenderSource>,
        pass: Handle<ShadingPass>,
        surface: Surface,
        instance_count: u32,
    },
}

#[derive(Debug, Clone, Copy)]
struct Packet {
    next: Option<PacketId>,
    command: Command,
}

#[derive(Debug, Clone, Copy)]
struct Chain<K> {
    key: K,
    head: PacketId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubmitStats {
    pub chains: u32,
    pub uploads: u32,
    pub draws: u32,
    pub dropped: u32,
}

pub struct CommandBucket<K> {
    chains: Vec<Chain<K>>,
    packets: Vec<Packet>,
    bytes: Vec<u8>,
    packet_capacity: usize,
    byte_capacity: usize,
}

impl<K: SortKey> CommandBucket<K> {
    pub fn with_capacity(packet_capacity: usize, byte_capacity: usize) -> Self {
        Self {
            chains: Vec::with_capacity(packet_capacity),
            packets: Vec::with_capacity(packet_capacity),
            bytes: Vec::with_capacity(byte_capacity),
            packet_capacity,
            byte_capacity,
        }
    }

    fn alloc_packet(&mut self, command: Command) -> ScheduleResult<PacketId> {
        if self.packets.len() >= self.packet_capacity {
            return Err(ScheduleError::capacity(
                Pool::CommandPackets,
                self.packet_capacity,
            ));
        }
        let id = PacketId(self.packets.len() as u32);
        self.packets.push(Packet {
            next: None,
            command,
        });
        Ok(id)
    }

    /// Starts a new chain headed by `command`.
    pub fn record(&mut self, key: K, command: Command) -> ScheduleResult<PacketId> {
        let head = self.alloc_packet(command)?;
        self.chains.push(Chain { key, head });
        Ok(head)
    }

    /// Links `command` directly after `packet`, ahead of whatever followed it.
    pub fn chain_after(&mut self, packet: PacketId, command: Command) -> ScheduleResult<PacketId> {
        let after = packet.0 as usize;
        let Some(next) = self.packets.get(after).map(|p| p.next) else {
            return Err(ScheduleError::UnknownPacket { index: packet.0 });
        };
        let id = self.alloc_packet(command)?;
        self.packets[id.0 as usize].next = next;
        self.packets[after].next = Some(id);
        Ok(id)
    }

    /// Copies `data` into the byte arena.
    pub fn alloc_bytes(&mut self, data: &[u8]) -> ScheduleResult<ByteRange> {
        if self.bytes.len() + data.len() > self.byte_capacity {
            return Err(ScheduleError::capacity(
                Pool::CommandBytes,
                self.byte_capacity,
            ));
        }
        let start = self.bytes.len() as u32;
        self.bytes.extend_from_slice(data);
        Ok(ByteRange {
            start,
            len: data.len() as u32,
        })
    }

    /// `None` for a range handed out before the last [`clear`](Self::clear).
    pub fn bytes(&self, range: ByteRange) -> Option<&[u8]> {
        self.bytes.get(range.range())
    }

    /// Stable ascending sort of chains by key.
    pub fn sort(&mut self) {
        self.chains.sort_by_key(|chain| chain.key.bits());
    }

    pub fn clear(&mut self) {
        self.chains.clear();
        self.packets.clear();
        self.bytes.clear();
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    pub fn bytes_used(&self) -> usize {
        self.bytes.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        self.chains.iter().map(|chain| chain.key)
    }

    /// Commands of one chain in execution order.
    pub fn chain(&self, head: PacketId) -> impl Iterator<Item = &Command> + '_ {
        std::iter::successors(self.packets.get(head.0 as usize), move |packet| {
            packet.next.and_then(|next| self.packets.get(next.0 as usize))
        })
        .map(|packet| &packet.command)
    }

    /// Executes every chain in bucket order.
    pub fn submit<C: GpuContext + ?Sized>(
        &self,
        assets: &Assets,
        state: &mut StateCache,
        ctx: &mut C,
    ) -> SubmitStats {
        let mut stats = SubmitStats::default();
        let mut last_source = None;
        let mut last_pass = None;

        for chain in &self.chains {
            stats.chains += 1;
            for command in self.chain(chain.head) {
                match *command {
                    Command::UploadConstants { buffer, bytes } => {
                        let Some(data) = self.bytes(bytes) else {
                            log::warn!("Dropping upload of stale byte range {:?}", bytes);
                            stats.dropped += 1;
                            continue;
                        };
                        ctx.upload_constants(buffer, data);
                        stats.uploads += 1;
                    }
                    Command::Draw {
                        source,
                        pass,
                        surface,
                        instance_count,
                    } => {
                        let (Some(source_data), Some(pass_data)) =
                            (assets.sources.get(source), assets.passes.get(pass))
                        else {
                            log::warn!("Dropping recorded draw of {:?} with {:?}", source, pass);
                            stats.dropped += 1;
                            continue;
                        };
                        if last_source != Some(source) {
                            source_data.bind(state);
                            last_source = Some(source);
                        }
                        if last_pass != Some(pass) {
                            pass_data.bind(state);
                            last_pass = Some(pass);
                        }
                        draw_surface(state, ctx, source_data.is_indexed(), &surface, instance_count);
                        stats.draws += 1;
                    }
                }
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::sort_key::DepthKey;

    fn draw(instance_count: u32) -> Command {
        Command::Draw {
            source: Handle::new(0),
            pass: Handle::new(0),
            surface: Surface::triangles(0, 3),
            instance_count,
        }
    }

    #[test]
    fn chain_after_inserts_behind_the_given_packet() {
        let mut bucket = CommandBucket::<DepthKey>::with_capacity(8, 64);
        let first = bucket.alloc_bytes(&[1, 2, 3, 4]).unwrap();
        let second = bucket.alloc_bytes(&[5, 6]).unwrap();
        let upload = |bytes| Command::UploadConstants {
            buffer: BufferId(1),
            bytes,
        };

        let head = bucket.record(DepthKey::new(1.0), upload(first)).unwrap();
        let draw_id = bucket.chain_after(head, draw(2)).unwrap();
        bucket.chain_after(head, upload(second)).unwrap();

        let commands: Vec<_> = bucket.chain(head).copied().collect();
        assert_eq!(commands, vec![upload(first), upload(second), draw(2)]);
        assert_eq!(bucket.chain(draw_id).count(), 1);
        assert_eq!(bucket.bytes(second), Some(&[5u8, 6][..]));
        assert_eq!(bucket.len(), 1);
    }

    #[test]
    fn sort_orders_chains_by_key() {
        let mut bucket = CommandBucket::with_capacity(8, 0);
        for depth in [5.0f32, 1.0, 3.0] {
            bucket.record(DepthKey::new(depth), draw(1)).unwrap();
        }
        bucket.sort();
        let keys: Vec<_> = bucket.keys().map(|key| key.bits()).collect();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn capacities_are_enforced_and_clear_resets() {
        let mut bucket = CommandBucket::with_capacity(1, 2);
        bucket.record(DepthKey::new(1.0), draw(1)).unwrap();
        assert!(bucket.record(DepthKey::new(1.0), draw(1)).unwrap_err().is_capacity());
        assert!(bucket.alloc_bytes(&[0; 3]).unwrap_err().is_capacity());

        bucket.clear();
        assert!(bucket.is_empty());
        assert_eq!(bucket.packet_count(), 0);
        assert_eq!(bucket.bytes_used(), 0);
        assert!(bucket.record(DepthKey::new(1.0), draw(1)).is_ok());
    }

    #[test]
    fn handles_from_before_clear_are_rejected() {
        let mut bucket = CommandBucket::<DepthKey>::with_capacity(4, 16);
        let bytes = bucket.alloc_bytes(&[1, 2, 3]).unwrap();
        let head = bucket.record(DepthKey::new(1.0), draw(1)).unwrap();

        bucket.clear();
        assert_eq!(bucket.bytes(bytes), None);
        assert_eq!(
            bucket.chain_after(head, draw(2)).unwrap_err(),
            ScheduleError::UnknownPacket { index: 0 }
        );
        assert_eq!(bucket.packet_count(), 0);
    }
}
