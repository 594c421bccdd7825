//! # codec
//!
//! Bit-level encode/decode plans. [`plan()`] turns one signal into a list of
//! byte spans plus its scaling transform; [`MessagePlan`] applies the plans
//! of a whole message to frame bytes, honoring multiplexing.
//!
//! ```
//! use buscodec::codec::plan_message;
//! use buscodec::types::message::{IdFormat, Message};
//! use buscodec::types::network::{BusType, Network};
//! use buscodec::types::signal::{ByteOrder, Signal};
//!
//! let mut net = Network::new("demo", BusType::Can);
//! let mk = net.add_message(Message::new("Speed", 0x100, IdFormat::Standard, 8));
//! let mut speed = Signal::new("VehicleSpeed", 0, 16, ByteOrder::LittleEndian);
//! speed.scale = 0.1;
//! net.add_signal(mk, speed);
//!
//! let plan = plan_message(&net, mk).unwrap();
//! let (frame, _) = plan.encode_frame(&[("VehicleSpeed", 25.5)]);
//! assert_eq!(&frame[..2], &[0xFF, 0x00]);
//! ```

pub mod pack;
pub mod plan;

pub use pack::{ClampReport, RawValue};
pub use plan::{BitSpan, CodecPlan, MessagePlan, MuxCondition, Transform, plan, plan_message};
