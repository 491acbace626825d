//! Fixed-capacity command storage.

use std::fmt;

use super::record::RenderCommand;

/// Default command buffer budget, 10 MiB.
pub const DEFAULT_COMMAND_BUFFER_CAPACITY: usize = 10 * 1024 * 1024;

/// Ordered command records with a fixed byte budget.
///
/// Each record is charged its [`RenderCommand::footprint`]. The budget never
/// grows: a frame that records more than it allows is a configuration error.
pub struct CommandBuffer {
    records: Vec<RenderCommand>,
    capacity: usize,
    used: usize,
}

impl CommandBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::new(),
            capacity,
            used: 0,
        }
    }

    /// Append a record. Overflowing the byte budget is fatal.
    pub fn push(&mut self, command: RenderCommand) {
        if let Err(overflow) = self.try_push(command) {
            overflow.fail();
        }
    }

    /// Append a record, handing it back if it does not fit.
    pub fn try_push(&mut self, command: RenderCommand) -> Result<(), Overflow> {
        let size = command.footprint();
        if size > self.remaining() {
            return Err(Overflow {
                command,
                needed: size,
                remaining: self.remaining(),
                capacity: self.capacity,
            });
        }
        self.used += size;
        self.records.push(command);
        Ok(())
    }

    /// Hand out every record in submission order and reset the cursor.
    pub fn take(&mut self) -> Vec<RenderCommand> {
        self.used = 0;
        std::mem::take(&mut self.records)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn used_bytes(&self) -> usize {
        self.used
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.used
    }
}

/// A record rejected by [`CommandBuffer::try_push`].
pub struct Overflow {
    pub command: RenderCommand,
    pub needed: usize,
    pub remaining: usize,
    pub capacity: usize,
}

impl Overflow {
    pub fn fail(self) -> ! {
        crate::fatal!(
            "Command buffer overflow: '{}' needs {} bytes but only {} of {} remain",
            self.command.label(),
            self.needed,
            self.remaining,
            self.capacity
        )
    }
}

impl fmt::Debug for Overflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overflow")
            .field("command", &self.command)
            .field("needed", &self.needed)
            .field("remaining", &self.remaining)
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_BUFFER_CAPACITY)
    }
}

impl fmt::Debug for CommandBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBuffer")
            .field("records", &self.records.len())
            .field("used", &self.used)
            .field("capacity", &self.capacity)
            .finish()
    }
}
