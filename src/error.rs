use std::fmt;

use thiserror::Error;

/// Fixed-capacity pool that an add-operation ran out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pool {
    RenderData,
    Items,
    Surfaces,
    Instances,
    SortEntries,
    CommandPackets,
    CommandBytes,
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Pool::RenderData => "render data",
            Pool::Items => "render item",
            Pool::Surfaces => "surface",
            Pool::Instances => "instance",
            Pool::SortEntries => "sort entry",
            Pool::CommandPackets => "command packet",
            Pool::CommandBytes => "command byte",
        };
        f.write_str(name)
    }
}

/// Failure of a per-frame add or submit operation.
///
/// Nothing here is fatal: the caller drops the draw, logs it and carries on.
/// The next frame starts from cleared stores regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("{pool} capacity of {capacity} exceeded")]
    CapacityExceeded { pool: Pool, capacity: usize },
    #[error("render data index {index} was never added this frame")]
    InvalidReference { index: u32 },
    #[error("command packet {index} is not part of this bucket")]
    UnknownPacket { index: u32 },
}

impl ScheduleError {
    pub fn capacity(pool: Pool, capacity: usize) -> Self {
        Self::CapacityExceeded { pool, capacity }
    }

    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }
}

pub type ScheduleResult<T> = Result<T, ScheduleError>;
