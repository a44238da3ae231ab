// Lock-free queues between the session and the threads around it
// All of them are bounded single-producer/single-consumer rings; a full
// queue refuses the push and the producer decides what to drop.

use crate::messaging::command::Command;
use crate::messaging::notification::Notification;
use ringbuf::{HeapCons, HeapProd, HeapRb, traits::Split};

/// SPSC ring of at least one slot
pub(crate) fn bounded<T>(capacity: usize) -> (HeapProd<T>, HeapCons<T>) {
    HeapRb::<T>::new(capacity.max(1)).split()
}

pub type CommandProducer = HeapProd<Command>;
pub type CommandConsumer = HeapCons<Command>;

/// Control commands into the session
pub fn create_command_channel(capacity: usize) -> (CommandProducer, CommandConsumer) {
    bounded(capacity)
}

pub type NotificationProducer = HeapProd<Notification>;
pub type NotificationConsumer = HeapCons<Notification>;

/// Notifications out to whoever displays them
pub fn create_notification_channel(
    capacity: usize,
) -> (NotificationProducer, NotificationConsumer) {
    bounded(capacity)
}
