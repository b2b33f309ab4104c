//! Types shared between the relay server and the client: the wire bundle,
//! REST bodies and gateway events. Nothing here knows how to encrypt.

pub mod api;
pub mod events;
