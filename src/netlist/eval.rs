//! Bit-accurate evaluation of a [`NetlistBackend`].
//!
//! Signals are evaluated in creation order. Every value is kept reduced to the
//! signal's width.

use hashbrown::HashMap;
use num_bigint::BigUint;
use num_traits::{One, Zero};

use super::{Driver, InstanceKind, NetlistBackend};
use crate::core::{BitExpr, BitHeapError, BitHeapResult, SignalId, WireExpr};

/// Values of every signal, indexed by handle.
pub type SignalValues = HashMap<SignalId, BigUint>;

impl NetlistBackend {
    /// Compute every signal from the values of the primary inputs.
    ///
    /// Each primary input must be given a value; it is truncated to its width.
    pub fn evaluate(&self, inputs: &HashMap<SignalId, BigUint>) -> BitHeapResult<SignalValues> {
        let mut values = SignalValues::with_capacity(self.signals.len());

        for (i, entry) in self.signals.iter().enumerate() {
            let id = SignalId(i as u32);
            let mask = (BigUint::one() << entry.info.width as usize) - BigUint::one();
            let value = match &entry.driver {
                Driver::Input => inputs
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| BitHeapError::UnknownSignal {
                        name: entry.info.name.clone(),
                    })?,
                Driver::Wire(rhs) => wire_value(rhs, &values)?,
                Driver::Instance(inst) => match &inst.kind {
                    InstanceKind::Compressor(shape) => {
                        let mut pattern = 0u32;
                        let mut offset = 0;
                        for input in &inst.inputs {
                            let port = wire_value(input, &values)?;
                            for j in 0..input.width() {
                                if port.bit(j as u64) {
                                    pattern |= 1 << (offset + j);
                                }
                            }
                            offset += input.width();
                        }
                        BigUint::from(shape.lookup(pattern))
                    }
                    InstanceKind::Adder { width } => {
                        let mut sum = BigUint::zero();
                        for input in &inst.inputs[..2] {
                            sum += wire_value(input, &values)?;
                        }
                        let top = wire_value(&inst.inputs[2], &values)?;
                        sum + (top << (*width as usize - 1))
                    }
                },
            };
            values.insert(id, value & mask);
        }

        Ok(values)
    }
}

fn bit_value(bit: &BitExpr, values: &SignalValues) -> BitHeapResult<bool> {
    let read = |signal: SignalId, index: u32| {
        values
            .get(&signal)
            .map(|v| v.bit(index as u64))
            .ok_or_else(|| BitHeapError::UnknownSignal {
                name: signal.to_string(),
            })
    };
    match *bit {
        BitExpr::Signal { signal, index } => read(signal, index),
        BitExpr::Inverted { signal, index } => read(signal, index).map(|b| !b),
        BitExpr::One => Ok(true),
    }
}

/// Value of a wire expression, least significant element first.
pub fn wire_value(expr: &WireExpr, values: &SignalValues) -> BitHeapResult<BigUint> {
    match expr {
        WireExpr::Zero => Ok(BigUint::zero()),
        WireExpr::Bit(bit) => Ok(if bit_value(bit, values)? {
            BigUint::one()
        } else {
            BigUint::zero()
        }),
        WireExpr::Concat(parts) => {
            let mut value = BigUint::zero();
            let mut offset = 0usize;
            for part in parts {
                value += wire_value(part, values)? << offset;
                offset += part.width() as usize;
            }
            Ok(value)
        }
    }
}
