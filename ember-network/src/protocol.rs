//! The wire protocol: message framing, the message enum, and their
//! serialization.

pub mod external;
