//! Payload source for the sender.

use crate::config::SenderConfig;
use crate::ipc::SampleRecord;

/// Produces the sample for a sender cycle.
///
/// Returning `None` ends the sender with
/// [`GatewayError::SampleExhausted`](crate::error::GatewayError::SampleExhausted).
pub trait SampleProducer: Send {
    fn produce(&mut self, cycle: usize) -> Option<SampleRecord>;
}

impl<F> SampleProducer for F
where
    F: FnMut(usize) -> Option<SampleRecord> + Send,
{
    fn produce(&mut self, cycle: usize) -> Option<SampleRecord> {
        self(cycle)
    }
}

/// Sequence `cycle + 1` with a `"<prefix> <sequence>"` payload.
#[derive(Debug, Clone)]
pub struct SequenceProducer {
    prefix: String,
}

impl SequenceProducer {
    pub fn new() -> Self {
        Self::with_prefix(SenderConfig::DEFAULT_PAYLOAD_PREFIX)
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for SequenceProducer {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleProducer for SequenceProducer {
    fn produce(&mut self, cycle: usize) -> Option<SampleRecord> {
        // Runs dry once the sequence no longer fits.
        let sequence = u32::try_from(cycle).ok()?.checked_add(1)?;
        Some(SampleRecord::new(
            sequence,
            format!("{} {}", self.prefix, sequence),
        ))
    }
}

/// Replays a fixed list of sequences, then runs dry.
#[derive(Debug, Clone)]
pub struct ScriptedProducer {
    sequences: Vec<u32>,
}

impl ScriptedProducer {
    pub fn new(sequences: impl IntoIterator<Item = u32>) -> Self {
        Self {
            sequences: sequences.into_iter().collect(),
        }
    }
}

impl SampleProducer for ScriptedProducer {
    fn produce(&mut self, cycle: usize) -> Option<SampleRecord> {
        let sequence = *self.sequences.get(cycle)?;
        Some(SampleRecord::new(
            sequence,
            format!("{} {}", SenderConfig::DEFAULT_PAYLOAD_PREFIX, sequence),
        ))
    }
}
