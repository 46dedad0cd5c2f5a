//! Sample-exchange roles used to verify the gateway end to end.
//!
//! - [`SampleReceiver`]: proxy role, subscribes and validates ordering
//! - [`SampleSender`]: skeleton role, offers and publishes
//! - [`SampleProducer`]: where the sender's payloads come from
//!
//! Both roles release their runtime registrations on every exit path,
//! including when their future is dropped.

pub mod notification;
pub mod producer;
pub mod receiver;
pub mod sender;
pub mod wake;

pub use notification::Notification;
pub use producer::{SampleProducer, ScriptedProducer, SequenceProducer};
pub use receiver::{ReceptionTally, SampleReceiver};
pub use sender::SampleSender;
pub use wake::{strategy_for, NotifiedWake, PollingWake, WakeStrategy};
