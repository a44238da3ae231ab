// Output - dispatch to the synthesizer link

pub mod dispatcher;
pub mod transport;

pub use dispatcher::{DispatchStats, Dispatcher, scale_velocity};
pub use transport::{
    MemoryTransport, MidirTransport, Transport, TransportError, WireConsumer, WireProducer,
    create_output_channel,
};
