//! chainsync-decoder — maps an event signature (`topics[0]`) to a
//! contract+event identity and decodes log topics and data into named,
//! normalized values.

pub mod decoder;
pub mod error;
pub mod normalize;
pub mod signature;

pub use decoder::Decoder;
pub use error::DecodeError;
pub use signature::keccak_signature;
