//! Runtime packing and unpacking driven by codec plans.

use std::collections::HashMap;

use log::{trace, warn};
use serde::Serialize;
use thiserror::Error;

use crate::codec::plan::{CodecPlan, MessagePlan, width_mask};
use crate::types::signal::ValueType;

/// Raw field content produced by [`CodecPlan::encode`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum RawValue {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

impl RawValue {
    /// Field bits, truncated to `width`.
    pub fn to_bits(self, width: u16) -> u64 {
        let bits = match self {
            RawValue::Unsigned(v) => v,
            RawValue::Signed(v) => v as u64,
            RawValue::Float(v) if width == 32 => u64::from((v as f32).to_bits()),
            RawValue::Float(v) => v.to_bits(),
        };
        bits & width_mask(width)
    }
}

/// A physical value that had to be clamped into the raw domain.
#[derive(Clone, Debug, PartialEq, Error, Serialize)]
#[error("value {requested} of signal '{signal}' is outside its raw range, clamped to {clamped}")]
pub struct ClampReport {
    pub signal: String,
    /// Physical value asked for.
    pub requested: f64,
    /// Physical value actually encoded.
    pub clamped: f64,
}

impl CodecPlan {
    /// Reads the field bits out of `data`, right aligned.
    ///
    /// Bytes missing from a short `data` read as zero.
    pub fn extract_raw(&self, data: &[u8]) -> u64 {
        let mut raw = 0u64;
        for span in &self.spans {
            let Some(&byte) = data.get(usize::from(span.byte)) else {
                continue;
            };
            let chunk = u64::from((byte >> span.bit_offset) & span.mask());
            raw |= chunk << span.value_shift;
        }
        raw
    }

    /// Writes the low `width` bits of `bits` into `data`, leaving other bits untouched.
    pub fn insert_raw(&self, data: &mut [u8], bits: u64) {
        for span in &self.spans {
            let Some(byte) = data.get_mut(usize::from(span.byte)) else {
                continue;
            };
            let mask = span.mask() << span.bit_offset;
            let chunk = ((bits >> span.value_shift) as u8 & span.mask()) << span.bit_offset;
            *byte = (*byte & !mask) | chunk;
        }
    }

    /// Raw value of the field in its declared representation.
    pub fn raw_value(&self, data: &[u8]) -> RawValue {
        let raw = self.extract_raw(data);
        match self.value_type {
            ValueType::Unsigned => RawValue::Unsigned(raw),
            ValueType::Signed => {
                let mask = width_mask(self.width);
                let sign_bit = 1u64 << (self.width - 1);
                let extended = if raw & sign_bit != 0 { raw | !mask } else { raw };
                RawValue::Signed(extended as i64)
            }
            ValueType::Float32 => RawValue::Float(f64::from(f32::from_bits(raw as u32))),
            ValueType::Float64 => RawValue::Float(f64::from_bits(raw)),
        }
    }

    /// Physical value of the field.
    pub fn decode(&self, data: &[u8]) -> f64 {
        let raw = match self.raw_value(data) {
            RawValue::Unsigned(v) => v as f64,
            RawValue::Signed(v) => v as f64,
            RawValue::Float(v) => v,
        };
        self.transform.to_physical(raw)
    }

    /// Raw value for `physical`, rounded and clamped to the raw domain.
    pub fn encode(&self, physical: f64) -> (RawValue, Option<ClampReport>) {
        let exact = self.transform.to_raw(physical);
        let t = &self.transform;
        let rounded = match self.value_type {
            ValueType::Float32 | ValueType::Float64 => exact,
            _ => exact.round(),
        };
        let raw = if rounded.is_nan() {
            0.0
        } else {
            rounded.clamp(t.raw_min, t.raw_max)
        };

        let report = (raw != rounded).then(|| {
            let report = ClampReport {
                signal: self.name.clone(),
                requested: physical,
                clamped: t.to_physical(raw),
            };
            warn!("{report}");
            report
        });

        let value = match self.value_type {
            ValueType::Unsigned => RawValue::Unsigned(raw as u64),
            ValueType::Signed => RawValue::Signed(raw as i64),
            ValueType::Float32 | ValueType::Float64 => RawValue::Float(raw),
        };
        (value, report)
    }

    /// Encodes `physical` straight into `data`.
    pub fn pack(&self, data: &mut [u8], physical: f64) -> Option<ClampReport> {
        let (raw, report) = self.encode(physical);
        self.insert_raw(data, raw.to_bits(self.width));
        report
    }
}

impl MessagePlan {
    /// True when `plan` is present in `data`: every switch on its gating
    /// chain holds one of the selected values.
    fn is_active(&self, plan: &CodecPlan, data: &[u8]) -> bool {
        let chain = self.gating_chain(plan);
        if chain.len() > self.signals.len() {
            return false;
        }
        let complete = match chain.last() {
            Some((switch, _)) => switch.mux.is_none(),
            None => plan.mux.is_none(),
        };
        complete
            && chain
                .iter()
                .all(|(switch, mux)| mux.is_active(switch.extract_raw(data)))
    }

    /// Physical values of the signals present in `data`, in declaration order.
    pub fn decode_frame(&self, data: &[u8]) -> Vec<(&str, f64)> {
        let values: Vec<(&str, f64)> = self
            .signals
            .iter()
            .filter(|s| self.is_active(s, data))
            .map(|s| (s.name.as_str(), s.decode(data)))
            .collect();
        trace!("decoded {} signals of {}", values.len(), self.name);
        values
    }

    /// Packs `values` into a zeroed frame.
    ///
    /// Ungated signals are written first, then gated ones by multiplexing
    /// depth; a gated value is only written when its switch selects it.
    /// Names that are not part of the message are ignored.
    pub fn encode_frame(&self, values: &[(&str, f64)]) -> (Vec<u8>, Vec<ClampReport>) {
        let requested: HashMap<&str, f64> = values.iter().copied().collect();
        let mut data = vec![0u8; usize::from(self.byte_length)];
        let mut reports = Vec::new();

        let mut ordered: Vec<(usize, &CodecPlan)> = self
            .signals
            .iter()
            .map(|s| (self.gating_chain(s).len(), s))
            .collect();
        ordered.sort_by_key(|(depth, _)| *depth);

        for (_, plan) in ordered {
            let Some(&physical) = requested.get(plan.name.as_str()) else {
                continue;
            };
            if !self.is_active(plan, &data) {
                trace!("{}.{} not selected, skipped", self.name, plan.name);
                continue;
            }
            reports.extend(plan.pack(&mut data, physical));
        }
        (data, reports)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use crate::codec::plan::plan_message;
    use crate::types::message::{IdFormat, Message};
    use crate::types::network::{BusType, MessageKey, Network};
    use crate::types::signal::{ByteOrder, MuxInfo, MuxRole, MuxSelector, Signal, ValueType};

    use super::*;

    fn single(signal: Signal) -> (Network, MessageKey) {
        let mut net = Network::new("t", BusType::Can);
        let mk = net.add_message(Message::new("M", 0x100, IdFormat::Standard, 8));
        net.add_signal(mk, signal);
        (net, mk)
    }

    #[test]
    fn test_scaled_little_endian_signal() {
        let mut s = Signal::new("Speed", 0, 16, ByteOrder::LittleEndian);
        s.scale = 0.1;
        let (net, mk) = single(s);
        let plan = plan_message(&net, mk).unwrap();

        let (data, reports) = plan.encode_frame(&[("Speed", 25.5)]);
        assert!(reports.is_empty());
        assert_eq!(data, vec![0xFF, 0x00, 0, 0, 0, 0, 0, 0]);

        let decoded = plan.decode_frame(&data);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].0, "Speed");
        assert_abs_diff_eq!(decoded[0].1, 25.5, epsilon = 1e-9);
    }

    #[test]
    fn test_big_endian_layout() {
        // Motorola start bit 7 (MSB of byte 0), 16 bits: byte 0 high, byte 1 low.
        let (net, mk) = single(Signal::new("Rpm", 7, 16, ByteOrder::BigEndian));
        let plan = plan_message(&net, mk).unwrap();
        let (data, _) = plan.encode_frame(&[("Rpm", 4660.0)]);
        assert_eq!(&data[..2], &[0x12, 0x34]);
        assert_eq!(plan.signals[0].extract_raw(&data), 0x1234);
    }

    #[test]
    fn test_signed_sign_extension() {
        let mut s = Signal::new("Temp", 4, 8, ByteOrder::LittleEndian);
        s.value_type = ValueType::Signed;
        s.offset = -10.0;
        let (net, mk) = single(s);
        let plan = &plan_message(&net, mk).unwrap().signals[0];

        let mut data = [0u8; 8];
        plan.pack(&mut data, -15.0);
        assert_eq!(plan.raw_value(&data), RawValue::Signed(-5));
        assert_eq!(data[0], 0xB0);
        assert_eq!(data[1], 0x0F);
        assert_abs_diff_eq!(plan.decode(&data), -15.0);
    }

    #[test]
    fn test_float_signal() {
        let mut s = Signal::new("F", 0, 32, ByteOrder::LittleEndian);
        s.value_type = ValueType::Float32;
        let (net, mk) = single(s);
        let plan = &plan_message(&net, mk).unwrap().signals[0];
        let mut data = [0u8; 8];
        assert!(plan.pack(&mut data, 1.5).is_none());
        assert_eq!(&data[..4], &1.5f32.to_le_bytes());
        assert_abs_diff_eq!(plan.decode(&data), 1.5);
    }

    #[test]
    fn test_clamping_is_reported() {
        let mut s = Signal::new("Pct", 0, 8, ByteOrder::LittleEndian);
        s.scale = 0.5;
        let (net, mk) = single(s);
        let plan = &plan_message(&net, mk).unwrap().signals[0];

        let (raw, report) = plan.encode(200.0);
        assert_eq!(raw, RawValue::Unsigned(255));
        let report = report.unwrap();
        assert_eq!(report.clamped, 127.5);
        assert_eq!(
            report.to_string(),
            "value 200 of signal 'Pct' is outside its raw range, clamped to 127.5"
        );

        let (raw, report) = plan.encode(-3.0);
        assert_eq!(raw, RawValue::Unsigned(0));
        assert!(report.is_some());
        assert!(plan.encode(100.0).1.is_none());
    }

    #[test]
    fn test_clamping_at_64_bit_bounds() {
        let mut s = Signal::new("Wide", 0, 64, ByteOrder::LittleEndian);
        s.value_type = ValueType::Signed;
        let (net, mk) = single(s);
        let plan = &plan_message(&net, mk).unwrap().signals[0];
        let (raw, report) = plan.encode(2f64.powi(63));
        assert_eq!(raw, RawValue::Signed(i64::MAX - 1023));
        assert!(report.is_some());
        let (raw, report) = plan.encode(-2f64.powi(63));
        assert_eq!(raw, RawValue::Signed(i64::MIN));
        assert!(report.is_none());

        let (net, mk) = single(Signal::new("Counter", 0, 64, ByteOrder::LittleEndian));
        let plan = &plan_message(&net, mk).unwrap().signals[0];
        let (raw, report) = plan.encode(2f64.powi(64));
        assert_eq!(raw, RawValue::Unsigned(u64::MAX - 2047));
        assert!(report.is_some());

        // Past 2^53 a 60-bit field must not wrap to zero.
        let (net, mk) = single(Signal::new("Stamp", 0, 60, ByteOrder::LittleEndian));
        let plan = &plan_message(&net, mk).unwrap().signals[0];
        let mut data = [0u8; 8];
        assert!(plan.pack(&mut data, 2f64.powi(60)).is_some());
        assert_eq!(plan.extract_raw(&data), (1u64 << 60) - 128);
    }

    #[test]
    fn test_round_trip_within_half_scale() {
        let cases = [
            (ByteOrder::LittleEndian, ValueType::Unsigned, 3, 11, 0.25, 5.0),
            (ByteOrder::BigEndian, ValueType::Signed, 12, 14, 0.01, -40.0),
            (ByteOrder::LittleEndian, ValueType::Signed, 0, 64, 1.0, 0.0),
            (ByteOrder::BigEndian, ValueType::Unsigned, 39, 7, 3.0, 1.0),
        ];
        for (order, value_type, start, width, scale, offset) in cases {
            let mut s = Signal::new("S", start, width, order);
            s.value_type = value_type;
            s.scale = scale;
            s.offset = offset;
            let (net, mk) = single(s);
            let plan = &plan_message(&net, mk).unwrap().signals[0];
            let t = plan.transform;
            for step in 0..=20 {
                let raw = t.raw_min.max(-1e6) + (t.raw_max.min(1e6) - t.raw_min.max(-1e6)) * f64::from(step) / 20.0;
                let physical = t.to_physical(raw) + scale * 0.3;
                let mut data = [0u8; 8];
                let clamp = plan.pack(&mut data, physical);
                if clamp.is_none() {
                    assert!((plan.decode(&data) - physical).abs() <= scale / 2.0 + 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_insert_preserves_neighbours() {
        let (net, mk) = single(Signal::new("Nib", 2, 4, ByteOrder::LittleEndian));
        let plan = &plan_message(&net, mk).unwrap().signals[0];
        let mut data = [0xFFu8; 2];
        plan.insert_raw(&mut data, 0);
        assert_eq!(data, [0b1100_0011, 0xFF]);
    }

    #[test]
    fn test_multiplexed_frame() {
        let mut net = Network::new("t", BusType::Can);
        let mk = net.add_message(Message::new("Mux", 0x200, IdFormat::Standard, 8));
        let mut mode = Signal::new("Mode", 0, 1, ByteOrder::LittleEndian);
        mode.mux.role = MuxRole::Multiplexor;
        let mode = net.add_signal(mk, mode).unwrap();
        for (name, value) in [("A", 0), ("B", 1)] {
            let mut s = Signal::new(name, 8, 8, ByteOrder::LittleEndian);
            s.mux = MuxInfo {
                role: MuxRole::Multiplexed,
                switch: Some(mode),
                selectors: vec![MuxSelector::Value(value)],
            };
            net.add_signal(mk, s);
        }
        let plan = plan_message(&net, mk).unwrap();

        let (data, _) = plan.encode_frame(&[("A", 7.0), ("B", 9.0), ("Mode", 1.0)]);
        assert_eq!(&data[..2], &[0x01, 9]);
        let names: Vec<&str> = plan.decode_frame(&data).iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["Mode", "B"]);

        let (data, _) = plan.encode_frame(&[("A", 7.0), ("Mode", 0.0)]);
        assert_eq!(plan.decode_frame(&data), vec![("Mode", 0.0), ("A", 7.0)]);
    }
}
