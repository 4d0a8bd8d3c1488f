//! TF1 protocol engine
//!
//! Pure, radio-independent pieces of the link: the frame codec, notification
//! reassembly, characteristic selection and the transfer session.

pub mod frame;
pub mod reassembly;
pub mod selector;
pub mod transfer;
