//! Lock-free command queue from the control thread to the audio thread.
//!
//! Scalar tunables travel through atomics in
//! [`SharedParams`](crate::control::SharedParams). Anything that has to
//! touch state owned by the audio thread (read pointers, rings, the active
//! tap count) is sent as an [`EngineCommand`] instead and applied at the
//! start of the next block, before any sample of that block is produced.
//!
//! The queue is an `rtrb` ring: fixed capacity, allocated once, wait-free
//! push and pop.

/// Structural changes applied by the audio thread at a block boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCommand {
    /// Re-derive one tap's read pointer from its published delay.
    Retarget { tap: usize },
    /// Stop, then change the number of summed taps. Taps that become active
    /// are re-aligned with the write index.
    SetActiveTaps { count: usize },
    /// Zero the input ring and every feedback ring.
    Stop,
    /// Stop, re-align every tap with its (zeroed) delay and restore the
    /// default tap count.
    Reset { active_taps: usize },
}

impl EngineCommand {
    /// Short name used when a command has to be reported as dropped.
    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::Retarget { .. } => "tap delay update",
            EngineCommand::SetActiveTaps { .. } => "active tap change",
            EngineCommand::Stop => "stop",
            EngineCommand::Reset { .. } => "reset",
        }
    }
}

/// Create a bounded command channel.
///
/// Returns `(Producer, Consumer)`: the producer belongs to the
/// [`Controller`](crate::control::Controller), the consumer to the
/// [`Engine`](crate::engine::Engine).
pub fn command_channel(
    capacity: usize,
) -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_arrive_in_order() {
        let (mut tx, mut rx) = command_channel(4);

        tx.push(EngineCommand::Stop).unwrap();
        tx.push(EngineCommand::Retarget { tap: 2 }).unwrap();

        assert!(matches!(rx.pop(), Ok(EngineCommand::Stop)));
        assert!(matches!(rx.pop(), Ok(EngineCommand::Retarget { tap: 2 })));
        assert!(rx.pop().is_err());
    }

    #[test]
    fn test_full_queue_hands_command_back() {
        let (mut tx, _rx) = command_channel(1);

        tx.push(EngineCommand::Stop).unwrap();
        let Err(rtrb::PushError::Full(rejected)) = tx.push(EngineCommand::Reset { active_taps: 4 })
        else {
            panic!("push into a full queue must fail");
        };

        assert_eq!(rejected.name(), "reset");
    }

    #[test]
    fn test_command_size() {
        // Commands are copied through the ring; keep them two words wide.
        let size = std::mem::size_of::<EngineCommand>();
        assert!(size <= 16, "EngineCommand is {size} bytes, expected <= 16");
    }
}
